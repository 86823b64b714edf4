// Per-column temporal interpolation of a wide series table.
//
// Each column is fitted with a 1-D thin-plate-spline RBF plus a linear tail.
// Positions are rescaled to the unit interval before both the kernel and the
// tail are evaluated.

use crate::error::InterpolationError;
use crate::pipeline::types::{InterpolatedSeriesTable, WideSeriesTable};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// What the orchestrator does with a column that cannot be fitted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientDataPolicy {
    /// Leave the field out of the interpolated table and report it.
    #[default]
    Drop,
    /// Fail the whole run.
    Abort,
}

const MIN_KNOWN_POINTS: usize = 2;

fn kernel(r: f64) -> f64 {
    if r == 0.0 {
        0.0
    } else {
        r * r * r.ln()
    }
}

/// A fitted thin-plate-spline interpolant over scalar positions.
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    /// Knots, already rescaled.
    centers: Vec<f64>,
    weights: Vec<f64>,
    constant: f64,
    slope: f64,
    shift: f64,
    scale: f64,
}

impl ThinPlateSpline {
    /// Fit through `(x, y)` pairs. `x` values must be distinct; returns
    /// `None` when fewer than two points are given or the system is singular.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < MIN_KNOWN_POINTS || n != y.len() {
            return None;
        }

        let min = x.iter().copied().fold(f64::INFINITY, f64::min);
        let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let shift = min;
        let scale = if max > min { max - min } else { 1.0 };
        let centers: Vec<f64> = x.iter().map(|v| (v - shift) / scale).collect();

        // [K P; P^T 0] [w; c] = [y; 0]
        let size = n + 2;
        let a = DMatrix::from_fn(size, size, |i, j| match (i < n, j < n) {
            (true, true) => kernel((centers[i] - centers[j]).abs()),
            (true, false) if j == n => 1.0,
            (true, false) => centers[i],
            (false, true) if i == n => 1.0,
            (false, true) => centers[j],
            (false, false) => 0.0,
        });
        let b = DVector::from_iterator(size, y.iter().copied().chain([0.0, 0.0]));

        let solution = a.lu().solve(&b)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }

        Some(Self {
            centers,
            weights: solution.as_slice()[..n].to_vec(),
            constant: solution[n],
            slope: solution[n + 1],
            shift,
            scale,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        let radial: f64 = self
            .centers
            .iter()
            .zip(self.weights.iter())
            .map(|(c, w)| w * kernel((u - c).abs()))
            .sum();
        radial + self.constant + self.slope * u
    }
}

fn day_offsets(table: &WideSeriesTable) -> Vec<f64> {
    let Some(origin) = table.dates.first().copied() else {
        return Vec::new();
    };
    table
        .dates
        .iter()
        .map(|d| d.signed_duration_since(origin).num_days() as f64)
        .collect()
}

/// Fit one column and evaluate it at every row of the table.
///
/// Observed cells are returned verbatim; only missing cells take fitted values.
pub fn interpolate_column(table: &WideSeriesTable, col: usize) -> Result<Vec<f64>, InterpolationError> {
    let field = &table.fields[col];
    let offsets = day_offsets(table);

    let (known_x, known_y): (Vec<f64>, Vec<f64>) = table
        .cells
        .iter()
        .zip(offsets.iter())
        .filter_map(|(row, x)| row[col].map(|y| (*x, y)))
        .unzip();

    if known_x.len() < MIN_KNOWN_POINTS {
        return Err(InterpolationError::InsufficientData {
            field: field.clone(),
            known: known_x.len(),
        });
    }

    let spline = ThinPlateSpline::fit(&known_x, &known_y)
        .ok_or_else(|| InterpolationError::Singular { field: field.clone() })?;

    Ok(table
        .cells
        .iter()
        .zip(offsets.iter())
        .map(|(row, x)| row[col].unwrap_or_else(|| spline.evaluate(*x)))
        .collect())
}

fn assemble(table: &WideSeriesTable, columns: Vec<(usize, Vec<f64>)>) -> InterpolatedSeriesTable {
    let fields = columns.iter().map(|(col, _)| table.fields[*col].clone()).collect();
    let values = (0..table.dates.len())
        .map(|row| columns.iter().map(|(_, values)| values[row]).collect())
        .collect();
    let observed = table
        .cells
        .iter()
        .map(|row| columns.iter().map(|(col, _)| row[*col].is_some()).collect())
        .collect();

    InterpolatedSeriesTable {
        dates: table.dates.clone(),
        fields,
        values,
        observed,
    }
}

/// Interpolate every column; fails on the first column that cannot be fitted.
pub fn interpolate(table: &WideSeriesTable) -> Result<InterpolatedSeriesTable, InterpolationError> {
    let columns = (0..table.fields.len())
        .map(|col| interpolate_column(table, col).map(|values| (col, values)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(table, columns))
}

/// Interpolate every column that can be fitted.
///
/// Under [`InsufficientDataPolicy::Drop`] unfittable columns are left out and
/// returned alongside the table; under `Abort` the first one is an error.
pub fn interpolate_with_policy(
    table: &WideSeriesTable,
    policy: InsufficientDataPolicy,
) -> Result<(InterpolatedSeriesTable, Vec<InterpolationError>), InterpolationError> {
    let mut columns = Vec::with_capacity(table.fields.len());
    let mut dropped = Vec::new();

    for col in 0..table.fields.len() {
        match interpolate_column(table, col) {
            Ok(values) => columns.push((col, values)),
            Err(e) if policy == InsufficientDataPolicy::Drop => {
                tracing::warn!("Dropping column: {}", e);
                dropped.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok((assemble(table, columns), dropped))
}
