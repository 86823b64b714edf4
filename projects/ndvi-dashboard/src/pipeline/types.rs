// Pipeline data model: raw field rows in, dense per-date index series out.
//
// Every stage produces a new value; nothing here is mutated after construction.

use chrono::NaiveDate;
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A field row as returned by the field-listing query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Serialized GeoJSON polygon, if the field has been drawn.
    #[serde(default)]
    pub geometry: Option<String>,
    #[serde(default, alias = "has")]
    pub hectares: Option<f64>,
    #[serde(default)]
    pub crop_name: Option<String>,
    #[serde(default)]
    pub hybrid_name: Option<String>,
}

/// One named field after dissolving duplicate rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub hectares: f64,
    pub record_ids: Vec<String>,
}

/// A single (date, mean) observation as returned by an index service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IndexObservation {
    pub date: NaiveDate,
    #[serde(default)]
    pub mean: Option<f64>,
}

/// An observation tagged with the field it was extracted for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexSample {
    pub field_name: String,
    pub date: NaiveDate,
    pub mean_value: Option<f64>,
}

/// Dates as rows, fields as columns, `None` where a field has no observation.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct WideSeriesTable {
    pub dates: Vec<NaiveDate>,
    pub fields: Vec<String>,
    /// Row-major: `cells[row][column]`.
    pub cells: Vec<Vec<Option<f64>>>,
}

impl WideSeriesTable {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.fields.is_empty()
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn get(&self, date: NaiveDate, field: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.column_index(field)?;
        self.cells[row][col]
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
        self.dates
            .iter()
            .zip(self.cells.iter())
            .map(move |(date, row)| (*date, row[col]))
    }

    /// Writes the table as CSV: a `date` column followed by one column per field.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.fields.len() + 1);
        header.push("date".to_string());
        header.extend(self.fields.iter().cloned());
        wtr.write_record(&header)?;

        for (date, row) in self.dates.iter().zip(self.cells.iter()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(date.to_string());
            record.extend(row.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

/// Same shape as [`WideSeriesTable`] with every cell filled.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct InterpolatedSeriesTable {
    pub dates: Vec<NaiveDate>,
    pub fields: Vec<String>,
    pub values: Vec<Vec<f64>>,
    /// `true` where the value is an original observation rather than an estimate.
    pub observed: Vec<Vec<bool>>,
}

impl InterpolatedSeriesTable {
    pub fn get(&self, date: NaiveDate, field: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.fields.iter().position(|f| f == field)?;
        Some(self.values[row][col])
    }
}
