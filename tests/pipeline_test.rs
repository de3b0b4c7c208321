use anyhow::Result;
use ev_analytics::analytics::{AnalyzeFilters, AnalyzeRequest, CountyQuery, GroupBy, VehicleAnalytics, YearRange};
use ev_analytics::pipeline::storage::VehicleFilter;
use ev_analytics::pipeline::{
    CsvSource, InMemoryStore, IngestionPipeline, PipelineOptions, SqliteStore, VehicleStore,
};
use std::sync::Arc;
use tempfile::tempdir;

const HEADER: &str = "VIN (1-10),County,City,State,Postal Code,Model Year,Make,Model,Electric Vehicle Type,Clean Alternative Fuel Vehicle (CAFV) Eligibility,Electric Range,Base MSRP,Legislative District,DOL Vehicle ID,Vehicle Location,Electric Utility,2020 Census Tract";

const ROWS: &[&str] = &[
    "5YJ3E1EA1K,King,Seattle,WA,98101,2019,TESLA,Model 3,Battery Electric Vehicle (BEV),Clean Alternative Fuel Vehicle Eligible,220,0,43,100001,POINT (-122.3 47.6),CITY OF SEATTLE - (WA),53033008100",
    "5YJSA1E26K,king,Seattle,WA,98102,2023,Tesla,Model S,Battery Electric Vehicle (BEV),Clean Alternative Fuel Vehicle Eligible,405,0,43,100002,,,",
    "5YJ3E1EB4L,King ,Redmond,WA,98052,2024,TESLA,Model 3,Battery Electric Vehicle (BEV),Eligibility unknown as battery range has not been researched,NA,0,45,100003,,,",
    "1N4AZ0CP8D,Pierce,Tacoma,WA,98402,2013,NISSAN,LEAF,Battery Electric Vehicle (BEV),Clean Alternative Fuel Vehicle Eligible,75,0,27,100004,,,",
    "JTDKARFP1J,Snohomish,Everett,WA,98201,2018,TOYOTA,Prius Prime,Plug-in Hybrid Electric Vehicle (PHEV),Not eligible due to low battery range,25,0,38,100005,,,",
    "1FMCU0EZXN,King,Kent,,98030,2022,FORD,Escape,PHEV,Not eligible due to low battery range,37,0,33,100006,,,",
    // rejected: model year out of range
    "1G1RC6E42B,King,Seattle,WA,98101,1985,CHEVROLET,Volt,Plug-in Hybrid Electric Vehicle (PHEV),Clean Alternative Fuel Vehicle Eligible,35,0,43,100007,,,",
    // rejected: no make
    "KNDCE3LG1L,King,Seattle,WA,98101,2020,,Niro,Battery Electric Vehicle (BEV),Clean Alternative Fuel Vehicle Eligible,239,0,43,100008,,,",
];

fn write_csv(dir: &std::path::Path) -> Result<CsvSource> {
    let path = dir.join("Electric_Vehicle_Population_Data.csv");
    let mut content = String::from(HEADER);
    for row in ROWS {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    std::fs::write(&path, content)?;
    Ok(CsvSource::Local(path))
}

async fn load_into(store: Arc<dyn VehicleStore>, source: &CsvSource) -> Result<VehicleAnalytics> {
    let options = PipelineOptions {
        batch_size: 3,
        drop_existing: true,
    };
    IngestionPipeline::new(store.clone(), options).run(source).await?;
    Ok(VehicleAnalytics::new(store))
}

#[tokio::test]
async fn test_csv_to_sqlite_to_analytics() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = write_csv(temp_dir.path())?;
    let store: Arc<dyn VehicleStore> = Arc::new(SqliteStore::open(temp_dir.path().join("ev.db"))?);

    let outcome = IngestionPipeline::new(store.clone(), PipelineOptions::default())
        .run(&source)
        .await?;

    assert_eq!(outcome.report.total_records, 8);
    assert_eq!(outcome.report.valid_records, 6);
    assert_eq!(outcome.report.invalid_records, 2);
    assert_eq!(outcome.report.validation_errors.len(), 2);
    assert!(outcome.report.validation_errors[1].error.contains("make"));
    assert_eq!(outcome.load.inserted, 6);
    assert_eq!(outcome.load.indexes.len(), 8);

    let analytics = VehicleAnalytics::new(store.clone());

    let summary = analytics.summary().await?;
    assert_eq!(summary.total_vehicles, 6);
    assert_eq!(summary.top_10_makes[0].make, "TESLA");
    assert_eq!(summary.top_10_makes[0].count, 3);
    let type_total: usize = summary.vehicles_by_type.iter().map(|t| t.count).sum();
    assert_eq!(type_total, 6);

    let king = analytics.county_vehicles(&CountyQuery::new("king")).await?;
    assert_eq!(king.total_count, 4);
    assert_eq!(king.vehicles[0].model_year, 2024);
    // Missing state defaults to WA
    assert!(king.vehicles.iter().all(|v| v.state == "WA"));

    let tesla = analytics.make_models("Tesla").await?;
    assert_eq!(tesla.total_models, 2);
    assert_eq!(tesla.most_popular_model, "MODEL 3");
    assert_eq!(tesla.most_popular_count, 2);
    assert_eq!(tesla.models[0].average_electric_range, 110.0);

    let trends = analytics.trends().await?;
    let years: Vec<_> = trends.trends.iter().map(|t| t.model_year).collect();
    assert_eq!(years, vec![2013, 2018, 2019, 2022, 2023, 2024]);
    assert_eq!(trends.overall_growth_rate, Some(0.0));
    let ford_year = &trends.trends[3];
    assert_eq!(ford_year.phev_count, 1);
    assert_eq!(ford_year.phev_percentage, 100.0);

    Ok(())
}

#[tokio::test]
async fn test_analyze_filters_and_not_found() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = write_csv(temp_dir.path())?;
    let analytics = load_into(Arc::new(InMemoryStore::new()), &source).await?;

    let request = AnalyzeRequest {
        filters: AnalyzeFilters {
            counties: Some(vec!["king".to_string()]),
            model_years: Some(YearRange {
                start: Some(2019),
                end: None,
            }),
            ..AnalyzeFilters::default()
        },
        group_by: GroupBy::Make,
    };
    let response = analytics.analyze(&request).await?;
    assert_eq!(response.total_matching_vehicles, 4);
    assert_eq!(response.groups[0].group_value, "TESLA");
    assert_eq!(response.groups[0].count, 3);
    assert_eq!(response.groups[0].most_common_vehicle, "TESLA MODEL 3");
    assert_eq!(response.groups[1].group_value, "FORD");

    let impossible = AnalyzeRequest {
        filters: AnalyzeFilters {
            min_electric_range: Some(100_000),
            ..AnalyzeFilters::default()
        },
        group_by: GroupBy::County,
    };
    assert!(analytics.analyze(&impossible).await.unwrap_err().is_not_found());
    assert!(analytics
        .county_vehicles(&CountyQuery::new("NONEXISTENT_COUNTY"))
        .await
        .unwrap_err()
        .is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_sqlite_and_memory_stores_agree() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = write_csv(temp_dir.path())?;
    let sqlite = load_into(
        Arc::new(SqliteStore::open(temp_dir.path().join("parity.db"))?),
        &source,
    )
    .await?;
    let memory = load_into(Arc::new(InMemoryStore::new()), &source).await?;

    assert_eq!(sqlite.summary().await?, memory.summary().await?);
    assert_eq!(sqlite.trends().await?, memory.trends().await?);
    assert_eq!(sqlite.make_models("TESLA").await?, memory.make_models("TESLA").await?);
    assert_eq!(
        sqlite.county_vehicles(&CountyQuery::new("KING")).await?,
        memory.county_vehicles(&CountyQuery::new("KING")).await?
    );

    for group_by in [GroupBy::County, GroupBy::Make, GroupBy::ModelYear, GroupBy::VehicleType] {
        let request = AnalyzeRequest {
            filters: AnalyzeFilters::default(),
            group_by,
        };
        assert_eq!(sqlite.analyze(&request).await?, memory.analyze(&request).await?);
    }

    // Offset far beyond i64 still yields an empty page on both backends
    let far = CountyQuery {
        page: 100_000_000_000_000_000,
        page_size: 100,
        ..CountyQuery::new("KING")
    };
    let sqlite_far = sqlite.county_vehicles(&far).await?;
    assert!(sqlite_far.vehicles.is_empty());
    assert_eq!(sqlite_far, memory.county_vehicles(&far).await?);

    let filter = VehicleFilter {
        vehicle_types: Some(vec!["PLUG-IN HYBRID ELECTRIC VEHICLE (PHEV)".to_string()]),
        ..VehicleFilter::default()
    };
    assert_eq!(
        sqlite.store().count(&filter).await?,
        memory.store().count(&filter).await?
    );
    // The short "PHEV" code is kept as-is, so only the long label matches
    assert_eq!(sqlite.store().count(&filter).await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_reload_with_drop_existing_is_not_cumulative() -> Result<()> {
    let temp_dir = tempdir()?;
    let source = write_csv(temp_dir.path())?;
    let store: Arc<dyn VehicleStore> = Arc::new(SqliteStore::open(temp_dir.path().join("reload.db"))?);

    load_into(store.clone(), &source).await?;
    let analytics = load_into(store.clone(), &source).await?;

    assert_eq!(analytics.summary().await?.total_vehicles, 6);
    assert_eq!(store.list_indexes().await?.len(), 8);
    Ok(())
}
