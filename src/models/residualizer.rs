//! Per-gene removal of confounder effects.
//!
//! Each gene is regressed on the confounders over the samples where its expression and every
//! confounder are known, and the residuals replace its expression on those samples. Other
//! samples are left missing. A gene whose fit cannot be made gets an all-missing row and a
//! [`FitFailure`]; the remaining genes are unaffected.

use nalgebra::DVector;
use ndarray::{Array2, ArrayView1};

use crate::config::ResidualizerConfig;
use crate::data::{Covariate, CovariateTable, ExpressionMatrix};
use crate::models::design::{build_design, complete_cases};
use crate::models::ols::{FitError, LeastSquares};
use crate::parallel::{BatchReport, FitFailure, WorkerPool};

#[derive(Debug, Clone)]
pub struct Residualization {
    pub residuals: ExpressionMatrix,
    pub confounders: Vec<String>,
    pub report: BatchReport,
}

/// Read-only state shared by every per-gene fit.
struct ResidualContext<'a> {
    confounders: Vec<&'a Covariate>,
    known: Vec<bool>,
    /// Fit over every sample with known confounders, reused for genes without missing values.
    shared: Option<LeastSquares>,
    rank_tolerance: f64,
}

impl ResidualContext<'_> {
    fn fit_gene(&self, y: ArrayView1<f64>) -> Result<Vec<f64>, FitError> {
        let samples: Vec<usize> = (0..y.len())
            .filter(|&s| self.known[s] && y[s].is_finite())
            .collect();
        if samples.is_empty() {
            return Err(FitError::NoObservations);
        }

        let built;
        let ls = match &self.shared {
            Some(shared) if shared.samples() == samples.as_slice() => shared,
            _ => {
                built = LeastSquares::new(build_design(&self.confounders, &samples), self.rank_tolerance)?;
                &built
            }
        };

        let response = DVector::from_iterator(samples.len(), samples.iter().map(|&s| y[s]));
        let fit = ls.fit(&response);

        let mut row = vec![f64::NAN; y.len()];
        for (&s, &r) in samples.iter().zip(fit.residuals.iter()) {
            row[s] = r;
        }
        Ok(row)
    }
}

/// Regress `confounders` out of every gene of `expression`.
///
/// `covariates` must describe every sample of `expression`; the confounder columns must exist.
pub fn residualize(
    expression: &ExpressionMatrix,
    covariates: &CovariateTable,
    config: &ResidualizerConfig,
    pool: &WorkerPool,
) -> anyhow::Result<Residualization> {
    let aligned = covariates.subset(expression.sample_ids())?;
    let confounders = aligned.require(&config.confounders, "confounder columns")?;

    let n_samples = expression.n_samples();
    let known = complete_cases(&confounders, n_samples);
    let all_known: Vec<usize> = (0..n_samples).filter(|&s| known[s]).collect();
    let shared = match LeastSquares::new(build_design(&confounders, &all_known), config.rank_tolerance) {
        Ok(ls) => Some(ls),
        Err(e) => {
            log::warn!("confounder design over all samples unusable: {}", e);
            None
        }
    };
    log::info!(
        "residualizing {} genes on {:?} ({} of {} samples with known confounders)",
        expression.n_genes(),
        config.confounders,
        all_known.len(),
        n_samples
    );

    let ctx = ResidualContext {
        confounders,
        known,
        shared,
        rank_tolerance: config.rank_tolerance,
    };

    let values = expression.values();
    let outcomes = pool.map_indexed(expression.n_genes(), |g| ctx.fit_gene(values.row(g)));

    let mut residuals = Array2::from_elem((expression.n_genes(), n_samples), f64::NAN);
    let mut report = BatchReport::default();
    for (g, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(row) => {
                residuals
                    .row_mut(g)
                    .iter_mut()
                    .zip(row)
                    .for_each(|(cell, r)| *cell = r);
                report.record_success();
            }
            Err(e) => {
                log::debug!("gene {}: {}", expression.gene_ids()[g], e);
                report.record_failure(FitFailure {
                    gene_index: g,
                    gene_id: expression.gene_ids()[g].clone(),
                    context: "residualize".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report.log_summary("residualizer");

    Ok(Residualization {
        residuals: expression.with_values(residuals)?,
        confounders: config.confounders.clone(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn covariates() -> CovariateTable {
        let mut table = CovariateTable::new(ids("s", 6)).unwrap();
        table
            .add_categorical(
                "donorsex",
                ["M", "F", "M", "F", "M", "F"].iter().map(|s| Some(s.to_string())).collect(),
            )
            .unwrap();
        table
    }

    fn config() -> ResidualizerConfig {
        ResidualizerConfig {
            confounders: vec!["donorsex".to_string()],
            ..ResidualizerConfig::default()
        }
    }

    #[test]
    fn removes_group_means() {
        let expr = ExpressionMatrix::new(
            array![[1.0, 10.0, 3.0, 12.0, 5.0, 14.0]],
            ids("g", 1),
            ids("s", 6),
        )
        .unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let out = residualize(&expr, &covariates(), &config(), &pool).unwrap();
        let row = out.residuals.values().row(0).to_owned();
        assert_abs_diff_eq!(row[0], -2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(row[1], -2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-10);
        assert_eq!(out.report.n_succeeded, 1);
    }

    #[test]
    fn square_design_leaves_gene_missing() {
        let mut table = CovariateTable::new(ids("s", 2)).unwrap();
        table
            .add_categorical("donorsex", vec![Some("M".to_string()), Some("F".to_string())])
            .unwrap();
        let expr = ExpressionMatrix::new(array![[3.0, 7.0]], ids("g", 1), ids("s", 2)).unwrap();
        let pool = WorkerPool::new(1).unwrap();

        let out = residualize(&expr, &table, &config(), &pool).unwrap();
        assert!(out.residuals.values().row(0).iter().all(|v| v.is_nan()));
        assert_eq!(out.report.n_failed(), 1);
        assert_eq!(out.report.n_succeeded, 0);
    }

    #[test]
    fn missing_confounder_column_is_schema_error() {
        let expr = ExpressionMatrix::new(array![[1.0; 6]], ids("g", 1), ids("s", 6)).unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let bad = ResidualizerConfig {
            confounders: vec!["cnv".to_string()],
            ..ResidualizerConfig::default()
        };
        let err = residualize(&expr, &covariates(), &bad, &pool).unwrap_err();
        assert!(err.to_string().contains("cnv"));
    }

    #[test]
    fn missing_expression_only_blanks_that_sample() {
        let expr = ExpressionMatrix::new(
            array![[1.0, 10.0, f64::NAN, 12.0, 5.0, 14.0]],
            ids("g", 1),
            ids("s", 6),
        )
        .unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let out = residualize(&expr, &covariates(), &config(), &pool).unwrap();
        let row = out.residuals.values().row(0);
        assert!(row[2].is_nan());
        assert_abs_diff_eq!(row[0], -2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(row[4], 2.0, epsilon = 1e-10);
    }
}
