//! Log transform and z-score standardization.
//!
//! Standardization skips missing (`NaN`) entries when computing means and standard deviations
//! and leaves them missing in the output. A lane whose variance is zero or undefined cannot be
//! scaled; its finite entries are set to `0.0` instead.

use ndarray::{Array2, ArrayViewMut1, Axis};

use crate::data::ExpressionMatrix;
use crate::testing::utils::finite_mean_sd;

/// Output of the transform stage; all three share the row and column identity of the input.
#[derive(Debug, Clone)]
pub struct TransformedExpression {
    pub log2: ExpressionMatrix,
    /// Each sample (column) z-scored.
    pub sample_standardized: ExpressionMatrix,
    /// Each gene (row) of `sample_standardized` z-scored.
    pub gene_standardized: ExpressionMatrix,
}

pub fn log2_transform(values: &Array2<f64>) -> Array2<f64> {
    values.mapv(|v| (v + 1.0).log2())
}

/// Returns how many lanes were degenerate.
fn standardize_lanes(values: &mut Array2<f64>, axis: Axis) -> usize {
    let mut degenerate = 0;
    for lane in values.lanes_mut(axis) {
        if !standardize_lane(lane) {
            degenerate += 1;
        }
    }
    degenerate
}

fn standardize_lane(mut lane: ArrayViewMut1<f64>) -> bool {
    let (mean, sd, _) = finite_mean_sd(lane.view());
    let scalable = sd.is_finite() && sd > 0.0;
    lane.mapv_inplace(|v| {
        if !v.is_finite() {
            f64::NAN
        } else if scalable {
            (v - mean) / sd
        } else {
            0.0
        }
    });
    scalable
}

/// Z-score every column.
pub fn standardize_columns(values: &Array2<f64>) -> Array2<f64> {
    let mut out = values.clone();
    let degenerate = standardize_lanes(&mut out, Axis(0));
    if degenerate > 0 {
        log::warn!("{} samples have zero variance; set to 0", degenerate);
    }
    out
}

/// Z-score every row.
pub fn standardize_rows(values: &Array2<f64>) -> Array2<f64> {
    let mut out = values.clone();
    let degenerate = standardize_lanes(&mut out, Axis(1));
    if degenerate > 0 {
        log::warn!("{} genes have zero variance; set to 0", degenerate);
    }
    out
}

pub fn transform(matrix: &ExpressionMatrix) -> anyhow::Result<TransformedExpression> {
    let log2 = log2_transform(matrix.values());
    let sample_z = standardize_columns(&log2);
    let gene_z = standardize_rows(&sample_z);

    Ok(TransformedExpression {
        log2: matrix.with_values(log2)?,
        sample_standardized: matrix.with_values(sample_z)?,
        gene_standardized: matrix.with_values(gene_z)?,
    })
}
