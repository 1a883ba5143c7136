//! Gene retention by zero fraction and log-scale variability.

use ndarray::ArrayView1;

use crate::config::FilterConfig;
use crate::data::{DatasetSource, ExpressionMatrix};
use crate::error::PipelineError;
use crate::testing::utils::finite_mean_sd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneVerdict {
    Keep,
    TooManyZeros,
    LowVariance,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub n_input: usize,
    pub kept: usize,
    pub dropped_zero: usize,
    pub dropped_variance: usize,
}

/// Fraction of entries that are exactly zero.
pub fn zero_fraction(row: ArrayView1<f64>) -> f64 {
    if row.is_empty() {
        return f64::NAN;
    }
    row.iter().filter(|&&v| v == 0.0).count() as f64 / row.len() as f64
}

/// Sample standard deviation of `log2(x + 1)`.
pub fn log_sd(row: ArrayView1<f64>) -> f64 {
    let logged = row.mapv(|v| (v + 1.0).log2());
    finite_mean_sd(logged.view()).1
}

pub fn gene_verdict(row: ArrayView1<f64>, config: &FilterConfig) -> GeneVerdict {
    // NaN comparisons are false, so undefined statistics drop the gene.
    if !(zero_fraction(row) <= config.max_zero_fraction) {
        GeneVerdict::TooManyZeros
    } else if !(log_sd(row) > config.min_log_sd) {
        GeneVerdict::LowVariance
    } else {
        GeneVerdict::Keep
    }
}

/// Keep genes passing both thresholds, preserving row order.
pub fn filter_genes(matrix: &ExpressionMatrix, config: &FilterConfig) -> (ExpressionMatrix, FilterReport) {
    let mut report = FilterReport {
        n_input: matrix.n_genes(),
        ..FilterReport::default()
    };
    let mut keep = Vec::with_capacity(matrix.n_genes());

    for (g, row) in matrix.values().rows().into_iter().enumerate() {
        match gene_verdict(row, config) {
            GeneVerdict::Keep => keep.push(g),
            GeneVerdict::TooManyZeros => report.dropped_zero += 1,
            GeneVerdict::LowVariance => report.dropped_variance += 1,
        }
    }
    report.kept = keep.len();

    log::info!(
        "kept {} of {} genes ({} mostly zero, {} low variance)",
        report.kept,
        report.n_input,
        report.dropped_zero,
        report.dropped_variance
    );
    (matrix.select_genes(&keep), report)
}

/// Restrict to `sample_ids` then filter genes.
pub fn filter_expression<S: AsRef<str>>(
    matrix: &ExpressionMatrix,
    sample_ids: &[S],
    config: &FilterConfig,
) -> anyhow::Result<(ExpressionMatrix, FilterReport)> {
    if sample_ids.is_empty() {
        return Err(PipelineError::invalid("no samples requested for expression filtering").into());
    }
    let selected = matrix.select_samples(sample_ids)?;
    Ok(filter_genes(&selected, config))
}

/// Fetch the expression dataset and keep only the columns of `sample_ids`.
pub fn load_expression<D, S>(source: &D, dataset_id: &str, sample_ids: &[S]) -> anyhow::Result<ExpressionMatrix>
where
    D: DatasetSource + ?Sized,
    S: AsRef<str>,
{
    let raw = source
        .fetch(dataset_id, None)
        .map_err(|e| PipelineError::DataUnavailable {
            dataset: dataset_id.to_string(),
            reason: format!("{:#}", e),
        })?;
    let matrix = ExpressionMatrix::from_table(&raw)?;
    log::info!(
        "loaded expression: {} genes x {} samples",
        matrix.n_genes(),
        matrix.n_samples()
    );
    matrix.select_samples(sample_ids)
}
