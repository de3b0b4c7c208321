// Source extraction: reads the registration CSV from disk or over HTTP

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{AnalyticsError, Result};
use crate::metrics::ExtractionMetrics;
use crate::pipeline::processing::normalize::RawRecord;

/// Where the registration extract lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvSource {
    Local(PathBuf),
    Remote(String),
}

impl CsvSource {
    /// Public (or presigned) S3 object; requests are not signed
    pub fn s3(bucket: &str, key: &str, region: &str) -> Self {
        CsvSource::Remote(format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            bucket,
            region,
            key.trim_start_matches('/')
        ))
    }
}

impl fmt::Display for CsvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvSource::Local(path) => write!(f, "{}", path.display()),
            CsvSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Header row plus one raw record per data row
#[derive(Debug, Clone)]
pub struct Extracted {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

#[instrument(skip_all, fields(source = %source))]
pub async fn extract(source: &CsvSource) -> Result<Extracted> {
    info!("Starting data extraction");
    let start = Instant::now();

    let result = match source {
        CsvSource::Local(path) => std::fs::File::open(path)
            .map_err(|e| {
                AnalyticsError::Extraction(format!("cannot open {}: {}", path.display(), e))
            })
            .and_then(parse_csv),
        CsvSource::Remote(url) => match fetch(url).await {
            Ok(body) => parse_csv(body.as_bytes()),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(extracted) => {
            let elapsed = start.elapsed().as_secs_f64();
            ExtractionMetrics::record_extracted(extracted.rows.len(), elapsed);
            info!(
                "Extracted {} records with {} columns",
                extracted.rows.len(),
                extracted.headers.len()
            );
            Ok(extracted)
        }
        Err(e) => {
            ExtractionMetrics::record_failure();
            Err(e)
        }
    }
}

async fn fetch(url: &str) -> Result<String> {
    let client = reqwest::Client::new();
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| AnalyticsError::Extraction(format!("GET {} failed: {}", url, e)))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AnalyticsError::Extraction(format!(
            "GET {} returned {}",
            url, status
        )));
    }

    resp.text()
        .await
        .map_err(|e| AnalyticsError::Extraction(format!("reading body of {} failed: {}", url, e)))
}

/// Parse CSV text into raw records. Empty cells become null.
pub fn parse_csv<R: Read>(input: R) -> Result<Extracted> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AnalyticsError::Extraction(format!("failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AnalyticsError::Extraction("CSV has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            // +2: one for the header row, one for 1-based line numbers
            AnalyticsError::Extraction(format!("CSV error on line {}: {}", idx + 2, e))
        })?;

        let mut row = RawRecord::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(AnalyticsError::Extraction(
            "CSV contains no data rows".to_string(),
        ));
    }

    Ok(Extracted { headers, rows })
}
