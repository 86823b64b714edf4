use crate::error::ReshapeError;
use crate::pipeline::types::{IndexSample, WideSeriesTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What to do when a field has more than one sample for the same date.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Mean of the non-null values.
    #[default]
    Average,
    Reject,
}

#[derive(Default)]
struct Cell {
    values: Vec<f64>,
    samples: usize,
}

impl Cell {
    fn resolve(mut self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        // Sum in a fixed order so the result does not depend on sample order
        self.values.sort_by(f64::total_cmp);
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }
}

/// Pivot per-field samples into a wide table.
///
/// Rows are the union of all sample dates (ascending), columns are the
/// distinct field names (sorted). A null mean still contributes its date.
pub fn reshape(
    samples: &[IndexSample],
    policy: DuplicatePolicy,
) -> Result<WideSeriesTable, ReshapeError> {
    let mut dates = BTreeSet::new();
    let mut fields = BTreeSet::new();
    let mut cells: BTreeMap<(NaiveDate, &str), Cell> = BTreeMap::new();

    for sample in samples {
        dates.insert(sample.date);
        fields.insert(sample.field_name.as_str());

        let cell = cells
            .entry((sample.date, sample.field_name.as_str()))
            .or_default();
        cell.samples += 1;
        if let Some(value) = sample.mean_value.filter(|v| v.is_finite()) {
            cell.values.push(value);
        }
    }

    if policy == DuplicatePolicy::Reject {
        // Earliest (date, field) key, whatever the sample order
        if let Some(((date, field), _)) = cells.iter().find(|(_, cell)| cell.samples > 1) {
            return Err(ReshapeError::DuplicateSample {
                field: field.to_string(),
                date: *date,
            });
        }
    }

    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let fields: Vec<&str> = fields.into_iter().collect();

    let mut table_cells = vec![vec![None; fields.len()]; dates.len()];
    for ((date, field), cell) in cells {
        // Both keys were inserted into the sorted sets above
        let row = dates.binary_search(&date).unwrap_or_default();
        let col = fields.binary_search(&field).unwrap_or_default();
        table_cells[row][col] = cell.resolve();
    }

    Ok(WideSeriesTable {
        dates,
        fields: fields.into_iter().map(str::to_string).collect(),
        cells: table_cells,
    })
}
