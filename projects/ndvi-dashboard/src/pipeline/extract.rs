// Extraction loop: one index-service call per normalized field.
//
// The service itself is external; this module owns the calling contract
// (tag samples with the field name, keep going when a field fails) and the
// two clients the binary can be configured with.

use crate::error::{ExtractionError, ExtractionFailure};
use crate::pipeline::geometry::to_geojson;
use crate::pipeline::types::{IndexObservation, IndexSample, NormalizedField};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use crossbeam::channel;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Remote vegetation-index query scoped to one field geometry.
///
/// Implementations know nothing about field identity; the caller tags the
/// returned observations.
pub trait IndexExtractor: Send + Sync {
    fn extract(&self, field: &NormalizedField) -> Result<Vec<IndexObservation>, ExtractionError>;
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub samples: Vec<IndexSample>,
    pub failures: Vec<ExtractionFailure>,
    /// Fields that were queried successfully but returned no observations.
    pub empty_fields: Vec<String>,
}

fn tag(field: &NormalizedField, observations: Vec<IndexObservation>) -> Vec<IndexSample> {
    observations
        .into_iter()
        .map(|o| IndexSample {
            field_name: field.name.clone(),
            date: o.date,
            mean_value: o.mean,
        })
        .collect()
}

fn collect(
    fields: &[NormalizedField],
    results: Vec<Option<Result<Vec<IndexObservation>, ExtractionError>>>,
) -> ExtractionOutcome {
    let mut outcome = ExtractionOutcome::default();

    for (field, result) in fields.iter().zip(results) {
        match result.unwrap_or(Err(ExtractionError::WorkerLost)) {
            Ok(observations) if observations.is_empty() => {
                tracing::info!("Field '{}' returned no observations", field.name);
                outcome.empty_fields.push(field.name.clone());
            }
            Ok(observations) => {
                tracing::debug!(
                    "Field '{}' returned {} observation(s)",
                    field.name,
                    observations.len()
                );
                outcome.samples.extend(tag(field, observations));
            }
            Err(e) => {
                tracing::warn!("Extraction failed for field '{}': {}", field.name, e);
                outcome.failures.push(ExtractionFailure {
                    field: field.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    outcome
}

/// Run the extractor once per field.
///
/// With `workers > 1` the calls fan out over scoped threads; results are put
/// back in field order so the outcome does not depend on scheduling.
pub fn extract_all(
    fields: &[NormalizedField],
    extractor: &dyn IndexExtractor,
    workers: usize,
) -> ExtractionOutcome {
    let workers = workers.clamp(1, fields.len().max(1));

    if workers == 1 {
        let results = fields.iter().map(|f| Some(extractor.extract(f))).collect();
        return collect(fields, results);
    }

    let (job_tx, job_rx) = channel::unbounded::<usize>();
    for i in 0..fields.len() {
        // Receiver is alive for the whole block
        let _ = job_tx.send(i);
    }
    drop(job_tx);

    let (result_tx, result_rx) = channel::unbounded();
    let scope_result = crossbeam::thread::scope(|s| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move |_| {
                for i in job_rx {
                    let result = extractor.extract(&fields[i]);
                    if result_tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    if scope_result.is_err() {
        tracing::error!("An extraction worker panicked");
    }

    let mut results: Vec<Option<Result<Vec<IndexObservation>, ExtractionError>>> =
        (0..fields.len()).map(|_| None).collect();
    for (i, result) in result_rx {
        results[i] = Some(result);
    }

    collect(fields, results)
}

/// Optional date window forwarded to the index service.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Client for an HTTP index service.
///
/// POSTs `{field, geometry, start, end}` and expects a JSON array of
/// `{date, mean}` objects back. Calls are bridged onto the tokio runtime the
/// extractor was created on, so `extract` must run off the async executor
/// (e.g. inside `spawn_blocking`).
pub struct HttpIndexExtractor {
    client: reqwest::Client,
    url: String,
    window: DateWindow,
    handle: tokio::runtime::Handle,
}

impl HttpIndexExtractor {
    pub fn new(
        url: &str,
        window: DateWindow,
        timeout: Duration,
        handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build index service client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            window,
            handle,
        })
    }

    async fn fetch(&self, field: &NormalizedField) -> Result<Vec<IndexObservation>, ExtractionError> {
        let body = serde_json::json!({
            "field": field.name,
            "geometry": to_geojson(&field.geometry),
            "start": self.window.start,
            "end": self.window.end,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Rejected(format!("{}: {}", status, text)));
        }

        response
            .json::<Vec<IndexObservation>>()
            .await
            .map_err(|e| ExtractionError::Decode(e.to_string()))
    }
}

impl IndexExtractor for HttpIndexExtractor {
    fn extract(&self, field: &NormalizedField) -> Result<Vec<IndexObservation>, ExtractionError> {
        if field.geometry.0.is_empty() {
            return Err(ExtractionError::EmptyGeometry);
        }
        self.handle.block_on(self.fetch(field))
    }
}

/// Observations keyed by field name, loaded from a JSON object such as
/// `{"Lote 1": [{"date": "2024-01-01", "mean": 0.5}]}`.
#[derive(Debug, Clone, Default)]
pub struct FileIndexExtractor {
    series: HashMap<String, Vec<IndexObservation>>,
}

impl FileIndexExtractor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index samples at: {:?}", path))?;
        let series = serde_json::from_str(&content)
            .with_context(|| format!("Invalid index samples file: {:?}", path))?;
        Ok(Self { series })
    }

    pub fn from_map(series: HashMap<String, Vec<IndexObservation>>) -> Self {
        Self { series }
    }
}

impl IndexExtractor for FileIndexExtractor {
    fn extract(&self, field: &NormalizedField) -> Result<Vec<IndexObservation>, ExtractionError> {
        Ok(self.series.get(&field.name).cloned().unwrap_or_default())
    }
}
