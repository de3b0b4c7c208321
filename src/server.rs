use crate::analytics::{
    AnalyzeRequest, AnalyzeResponse, CountyQuery, CountyVehiclesResponse, MakeModelsResponse,
    SummaryResponse, TrendsResponse, VehicleAnalytics,
};
use crate::analytics::county::DEFAULT_PAGE_SIZE;
use crate::error::AnalyticsError;
use crate::pipeline::{CsvSource, IngestionPipeline, PipelineOptions, QualityReport};
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub analytics: VehicleAnalytics,
    /// Source used by `POST /admin/load`
    pub source: CsvSource,
    pub batch_size: usize,
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            AnalyticsError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AnalyticsError::InvalidQuery(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid query"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        let body = Json(serde_json::json!({
            "error": label,
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, AnalyticsError>;

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "ev-analytics",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "summary": "/api/v1/vehicles/summary",
            "county": "/api/v1/vehicles/county/{county_name}",
            "make_models": "/api/v1/vehicles/make/{make}/models",
            "analyze": "/api/v1/vehicles/analyze",
            "trends": "/api/v1/vehicles/trends"
        }
    }))
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Response {
    match state.analytics.store().ping().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "version": env!("CARGO_PKG_VERSION")
        }))
        .into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "detail": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

async fn summary(State(state): State<AppState>) -> ApiResult<SummaryResponse> {
    Ok(Json(state.analytics.summary().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CountyParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub model_year: Option<i32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl CountyParams {
    fn into_query(self, county: String) -> crate::error::Result<CountyQuery> {
        let mut query = CountyQuery::new(county);
        query.page = self.page.unwrap_or(1);
        query.page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        query.model_year = self.model_year;
        if let Some(sort_by) = self.sort_by {
            query.sort_by = sort_by.parse()?;
        }
        if let Some(sort_order) = self.sort_order {
            query.sort_order = sort_order.parse()?;
        }
        Ok(query)
    }
}

async fn county_vehicles(
    State(state): State<AppState>,
    Path(county_name): Path<String>,
    Query(params): Query<CountyParams>,
) -> ApiResult<CountyVehiclesResponse> {
    let query = params.into_query(county_name)?;
    Ok(Json(state.analytics.county_vehicles(&query).await?))
}

async fn make_models(
    State(state): State<AppState>,
    Path(make): Path<String>,
) -> ApiResult<MakeModelsResponse> {
    Ok(Json(state.analytics.make_models(&make).await?))
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<AnalyzeResponse> {
    Ok(Json(state.analytics.analyze(&request).await?))
}

async fn trends(State(state): State<AppState>) -> ApiResult<TrendsResponse> {
    Ok(Json(state.analytics.trends().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadParams {
    #[serde(default)]
    pub drop_existing: bool,
}

async fn admin_load(
    State(state): State<AppState>,
    Json(params): Json<LoadParams>,
) -> ApiResult<QualityReport> {
    let options = PipelineOptions {
        batch_size: state.batch_size,
        drop_existing: params.drop_existing,
    };
    let pipeline = IngestionPipeline::new(state.analytics.store().clone(), options);
    let outcome = pipeline.run(&state.source).await?;
    Ok(Json(outcome.report))
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/vehicles/summary", get(summary))
        .route("/api/v1/vehicles/county/:county_name", get(county_vehicles))
        .route("/api/v1/vehicles/make/:make/models", get(make_models))
        .route("/api/v1/vehicles/analyze", post(analyze))
        .route("/api/v1/vehicles/trends", get(trends))
        .route("/admin/load", post(admin_load))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(state);

    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_county_params_defaults() {
        let query = CountyParams::default().into_query("king".to_string()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(query.county, "king");
    }

    #[test]
    fn test_bad_sort_is_invalid_query() {
        let params = CountyParams {
            sort_by: Some("price".to_string()),
            ..CountyParams::default()
        };
        assert!(matches!(
            params.into_query("KING".to_string()),
            Err(AnalyticsError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: AnalyticsError| e.into_response().status();
        assert_eq!(status(AnalyticsError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AnalyticsError::InvalidQuery("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(AnalyticsError::StoreConnection("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
