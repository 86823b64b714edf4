use crate::pipeline::types::InterpolatedSeriesTable;
use chrono::NaiveDate;
use serde::Serialize;

/// Consumer of the final dense table.
pub trait ChartRenderer {
    type Output;

    fn render(&self, table: &InterpolatedSeriesTable) -> Self::Output;
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LineTrace {
    pub name: String,
    pub mode: &'static str,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
    /// Per point: original observation (`true`) or fitted estimate.
    pub observed: Vec<bool>,
}

/// Line chart spec with one trace per field.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LineChart {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub legend_title: String,
    pub traces: Vec<LineTrace>,
}

#[derive(Debug, Clone)]
pub struct LineChartRenderer {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub legend_title: String,
}

impl Default for LineChartRenderer {
    fn default() -> Self {
        Self {
            title: "Mean NDVI per field over time".to_string(),
            x_title: "Date".to_string(),
            y_title: "Mean NDVI".to_string(),
            legend_title: "Field".to_string(),
        }
    }
}

impl ChartRenderer for LineChartRenderer {
    type Output = LineChart;

    fn render(&self, table: &InterpolatedSeriesTable) -> LineChart {
        let traces = table
            .fields
            .iter()
            .enumerate()
            .map(|(col, name)| LineTrace {
                name: name.clone(),
                mode: "lines+markers",
                x: table.dates.clone(),
                y: table.values.iter().map(|row| row[col]).collect(),
                observed: table.observed.iter().map(|row| row[col]).collect(),
            })
            .collect();

        LineChart {
            title: self.title.clone(),
            x_title: self.x_title.clone(),
            y_title: self.y_title.clone(),
            legend_title: self.legend_title.clone(),
            traces,
        }
    }
}
