// Pipeline orchestrator: runs one dashboard selection end to end.
//
// normalize → extract (one call per field) → reshape → interpolate → chart.
// Per-item problems (bad records, failed fields, unfittable columns) are
// collected into the report; only a total absence of data fails the run.

use crate::catalog::selection::Selection;
use crate::catalog::MetadataSource;
use crate::chart::ChartRenderer;
use crate::error::{ExtractionFailure, NormalizeError, PipelineError};
use crate::pipeline::extract::{extract_all, IndexExtractor};
use crate::pipeline::geometry::{normalize, to_geojson, FieldNameKey};
use crate::pipeline::interpolate::{interpolate_with_policy, InsufficientDataPolicy};
use crate::pipeline::reshape::{reshape, DuplicatePolicy};
use crate::pipeline::types::{FieldRecord, InterpolatedSeriesTable, WideSeriesTable};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub field_key: FieldNameKey,
    pub duplicates: DuplicatePolicy,
    pub insufficient_data: InsufficientDataPolicy,
    pub extract_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            field_key: FieldNameKey::Name,
            duplicates: DuplicatePolicy::Average,
            insufficient_data: InsufficientDataPolicy::Drop,
            extract_workers: 1,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub name: String,
    pub hectares: f64,
    pub record_ids: Vec<String>,
    pub geometry: serde_json::Value,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DroppedColumn {
    pub field: String,
    pub reason: String,
}

/// Everything one run produced, including the per-item problems it survived.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SeriesReport {
    pub fields: Vec<FieldSummary>,
    pub observed: WideSeriesTable,
    pub interpolated: InterpolatedSeriesTable,
    pub rejected_records: Vec<NormalizeError>,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub empty_fields: Vec<String>,
    pub dropped_columns: Vec<DroppedColumn>,
}

/// Run the pipeline over already-fetched field records.
pub fn run_pipeline(
    records: &[FieldRecord],
    extractor: &dyn IndexExtractor,
    config: &PipelineConfig,
) -> Result<SeriesReport, PipelineError> {
    let start = Instant::now();

    let normalized = normalize(records, config.field_key);
    if normalized.fields.is_empty() {
        return Err(PipelineError::empty(format!(
            "no fields with a usable area among {} record(s)",
            records.len()
        )));
    }
    tracing::info!(
        "Extracting index series for {} field(s) with {} worker(s)",
        normalized.fields.len(),
        config.extract_workers.max(1)
    );

    let outcome = extract_all(&normalized.fields, extractor, config.extract_workers);
    if outcome.samples.is_empty() {
        let detail = if outcome.failures.is_empty() {
            "the index service returned no observations".to_string()
        } else {
            format!(
                "extraction failed for {} of {} field(s)",
                outcome.failures.len(),
                normalized.fields.len()
            )
        };
        return Err(PipelineError::empty(detail));
    }

    let observed = reshape(&outcome.samples, config.duplicates)?;
    let (interpolated, dropped) = interpolate_with_policy(&observed, config.insufficient_data)?;
    if interpolated.fields.is_empty() {
        return Err(PipelineError::empty(
            "no field has enough observations to chart",
        ));
    }

    tracing::info!(
        "Series ready: {} date(s) x {} field(s), {} dropped, {} failed, in {:.1} ms",
        interpolated.dates.len(),
        interpolated.fields.len(),
        dropped.len(),
        outcome.failures.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(SeriesReport {
        fields: normalized
            .fields
            .iter()
            .map(|f| FieldSummary {
                name: f.name.clone(),
                hectares: f.hectares,
                record_ids: f.record_ids.clone(),
                geometry: to_geojson(&f.geometry),
            })
            .collect(),
        observed,
        interpolated,
        rejected_records: normalized.rejected,
        extraction_failures: outcome.failures,
        empty_fields: outcome.empty_fields,
        dropped_columns: dropped
            .into_iter()
            .map(|e| DroppedColumn {
                field: e.field().to_string(),
                reason: e.to_string(),
            })
            .collect(),
    })
}

#[derive(Serialize, Debug, Clone)]
pub struct DashboardRun<C> {
    pub selection: Selection,
    pub report: SeriesReport,
    pub chart: C,
}

/// Fetch the fields of `selection`, run the pipeline and render the result.
///
/// The renderer is only invoked when the pipeline produced a table.
pub fn run_selection<R: ChartRenderer>(
    selection: &Selection,
    catalog: &dyn MetadataSource,
    extractor: &dyn IndexExtractor,
    renderer: &R,
    config: &PipelineConfig,
) -> Result<DashboardRun<R::Output>, PipelineError> {
    tracing::info!("Running pipeline for {}", selection);
    let records = catalog.fields(selection.season_id, selection.farm_id)?;
    let report = run_pipeline(&records, extractor, config)?;
    let chart = renderer.render(&report.interpolated);

    Ok(DashboardRun {
        selection: *selection,
        report,
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::json_catalog::{CatalogDocument, FieldListing, JsonCatalog};
    use crate::chart::LineChartRenderer;
    use crate::error::{ExtractionError, InterpolationError};
    use crate::pipeline::extract::FileIndexExtractor;
    use crate::pipeline::types::{IndexObservation, NormalizedField};
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::collections::HashMap;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn square(x0: f64) -> String {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[x0, 0.0], [x0 + 1.0, 0.0], [x0 + 1.0, 1.0], [x0, 1.0], [x0, 0.0]]]
        })
        .to_string()
    }

    fn record(id: &str, name: &str, x0: f64, hectares: f64) -> FieldRecord {
        FieldRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            geometry: Some(square(x0)),
            hectares: Some(hectares),
            crop_name: None,
            hybrid_name: None,
        }
    }

    fn scenario_records() -> Vec<FieldRecord> {
        vec![
            record("1", "A", 0.0, 2.0),
            record("2", "A", 0.5, 3.0),
            record("3", "B", 5.0, 0.0),
            record("4", "C", 10.0, 4.0),
        ]
    }

    fn scenario_extractor() -> FileIndexExtractor {
        let mut series = HashMap::new();
        series.insert(
            "A".to_string(),
            vec![
                IndexObservation { date: d(1), mean: Some(0.5) },
                IndexObservation { date: d(15), mean: Some(0.7) },
            ],
        );
        series.insert(
            "C".to_string(),
            vec![IndexObservation { date: d(1), mean: Some(0.3) }],
        );
        FileIndexExtractor::from_map(series)
    }

    struct CountingRenderer {
        calls: Cell<usize>,
    }

    impl ChartRenderer for CountingRenderer {
        type Output = usize;

        fn render(&self, table: &InterpolatedSeriesTable) -> usize {
            self.calls.set(self.calls.get() + 1);
            table.fields.len()
        }
    }

    #[test]
    fn test_end_to_end_scenario_drop_policy() {
        let report =
            run_pipeline(&scenario_records(), &scenario_extractor(), &PipelineConfig::default())
                .unwrap();

        let names: Vec<_> = report.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!((report.fields[0].hectares - 5.0).abs() < 1e-9);
        assert!((report.fields[1].hectares - 4.0).abs() < 1e-9);

        assert_eq!(report.observed.dates, vec![d(1), d(15)]);
        assert_eq!(report.observed.fields, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(report.observed.get(d(15), "C"), None);

        assert_eq!(report.interpolated.fields, vec!["A".to_string()]);
        assert_eq!(report.interpolated.get(d(1), "A"), Some(0.5));
        assert_eq!(report.interpolated.get(d(15), "A"), Some(0.7));
        assert_eq!(report.dropped_columns.len(), 1);
        assert_eq!(report.dropped_columns[0].field, "C");
    }

    #[test]
    fn test_end_to_end_scenario_abort_policy() {
        let config = PipelineConfig {
            insufficient_data: InsufficientDataPolicy::Abort,
            ..PipelineConfig::default()
        };
        let err = run_pipeline(&scenario_records(), &scenario_extractor(), &config).unwrap_err();
        match err {
            PipelineError::Interpolation(InterpolationError::InsufficientData { field, known }) => {
                assert_eq!(field, "C");
                assert_eq!(known, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_field_contributes_no_column() {
        let records = vec![
            record("1", "Z", 20.0, 1.0),
            record("2", "C", 10.0, 4.0),
            record("3", "A", 0.0, 2.0),
        ];
        let mut series = HashMap::new();
        series.insert(
            "C".to_string(),
            vec![
                IndexObservation { date: d(15), mean: Some(0.4) },
                IndexObservation { date: d(1), mean: Some(0.3) },
            ],
        );
        series.insert(
            "A".to_string(),
            vec![
                IndexObservation { date: d(1), mean: Some(0.5) },
                IndexObservation { date: d(15), mean: Some(0.7) },
            ],
        );
        let config = PipelineConfig {
            insufficient_data: InsufficientDataPolicy::Abort,
            ..PipelineConfig::default()
        };

        let report =
            run_pipeline(&records, &FileIndexExtractor::from_map(series), &config).unwrap();

        let sent: Vec<_> = report.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(sent, vec!["Z", "C", "A"]);
        assert_eq!(report.observed.fields, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(report.interpolated.fields, report.observed.fields);
        assert_eq!(report.empty_fields, vec!["Z".to_string()]);
        assert!(report.extraction_failures.is_empty());
        assert!(report.dropped_columns.is_empty());
    }

    #[test]
    fn test_zero_fields_is_empty_result_and_chart_not_invoked() {
        let catalog = JsonCatalog::from_document(CatalogDocument {
            fields: vec![FieldListing {
                season_id: 1,
                farm_id: 2,
                fields: vec![],
            }],
            ..CatalogDocument::default()
        });
        let selection = Selection {
            domain_id: 1,
            area_id: None,
            workspace_id: 1,
            season_id: 1,
            farm_id: 2,
        };
        let renderer = CountingRenderer { calls: Cell::new(0) };

        let err = run_selection(
            &selection,
            &catalog,
            &scenario_extractor(),
            &renderer,
            &PipelineConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyResult { .. }));
        assert_eq!(renderer.calls.get(), 0);
    }

    #[test]
    fn test_run_selection_renders_once() {
        let catalog = JsonCatalog::from_document(CatalogDocument {
            fields: vec![FieldListing {
                season_id: 1,
                farm_id: 2,
                fields: scenario_records(),
            }],
            ..CatalogDocument::default()
        });
        let selection = Selection {
            domain_id: 1,
            area_id: Some(3),
            workspace_id: 1,
            season_id: 1,
            farm_id: 2,
        };
        let renderer = CountingRenderer { calls: Cell::new(0) };

        let run = run_selection(
            &selection,
            &catalog,
            &scenario_extractor(),
            &renderer,
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(run.chart, 1);
        assert_eq!(run.selection, selection);

        let chart = LineChartRenderer::default().render(&run.report.interpolated);
        assert_eq!(chart.traces[0].name, "A");
    }

    #[test]
    fn test_all_extractions_failing_is_empty_result() {
        struct Down;
        impl IndexExtractor for Down {
            fn extract(
                &self,
                _field: &NormalizedField,
            ) -> Result<Vec<IndexObservation>, ExtractionError> {
                Err(ExtractionError::Request("connection refused".to_string()))
            }
        }

        let err = run_pipeline(&scenario_records(), &Down, &PipelineConfig::default()).unwrap_err();
        match err {
            PipelineError::EmptyResult { detail } => {
                assert_eq!(detail, "extraction failed for 2 of 2 field(s)")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_failure_is_reported() {
        struct OnlyA(FileIndexExtractor);
        impl IndexExtractor for OnlyA {
            fn extract(
                &self,
                field: &NormalizedField,
            ) -> Result<Vec<IndexObservation>, ExtractionError> {
                if field.name == "C" {
                    Err(ExtractionError::EmptyGeometry)
                } else {
                    self.0.extract(field)
                }
            }
        }

        let report = run_pipeline(
            &scenario_records(),
            &OnlyA(scenario_extractor()),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.extraction_failures.len(), 1);
        assert_eq!(report.extraction_failures[0].field, "C");
        assert_eq!(report.observed.fields, vec!["A".to_string()]);
        assert!(report.dropped_columns.is_empty());
    }
}
