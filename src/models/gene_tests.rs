//! Per-gene single-factor linear models.
//!
//! For every gene and every factor separately, expression is regressed on that factor alone and
//! the overall F-test p-value of the fit is kept. Factors are never combined into one model.

use nalgebra::DVector;
use ndarray::{Array2, ArrayView1};

use crate::config::TesterConfig;
use crate::data::{Covariate, CovariateTable, ExpressionMatrix};
use crate::models::design::build_design;
use crate::models::ols::{FitError, LeastSquares};
use crate::parallel::{BatchReport, FitFailure, WorkerPool};
use crate::testing::correction::adjust_finite;
use crate::testing::inference::parametric::overall_f_test;
use crate::testing::{MultipleTestResults, TestResult};

/// p-values per gene and factor, in the row order of the tested matrix.
#[derive(Debug, Clone)]
pub struct GeneModelResults {
    pub gene_ids: Vec<String>,
    pub symbols: Vec<String>,
    pub factors: Vec<String>,
    /// One entry per factor, each holding one value per gene.
    pub results: Vec<MultipleTestResults<f64>>,
    pub report: BatchReport,
}

impl GeneModelResults {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn factor(&self, name: &str) -> Option<&MultipleTestResults<f64>> {
        self.factors
            .iter()
            .position(|f| f == name)
            .map(|i| &self.results[i])
    }

    /// genes x factors matrix of raw p-values.
    pub fn p_values(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_genes(), self.factors.len()), |(g, f)| {
            self.results[f].p_values[g]
        })
    }

    pub fn p_value(&self, gene_id: &str, factor: &str) -> Option<f64> {
        let g = self.gene_ids.iter().position(|id| id == gene_id)?;
        self.factor(factor).map(|r| r.p_values[g])
    }

    /// Symbols of the `n` genes most associated with `factor`.
    pub fn top_genes(&self, factor: &str, n: usize) -> Vec<String> {
        self.factor(factor)
            .map(|r| {
                r.top_features(n)
                    .into_iter()
                    .map(|g| self.symbols[g].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Fit of one factor, shared by the genes without missing expression.
struct FactorModel<'a> {
    covariate: &'a Covariate,
    shared: Option<LeastSquares>,
}

struct TestContext<'a> {
    factors: Vec<FactorModel<'a>>,
    rank_tolerance: f64,
}

impl TestContext<'_> {
    fn test_factor(&self, model: &FactorModel<'_>, y: ArrayView1<f64>) -> Result<TestResult<f64>, FitError> {
        let samples: Vec<usize> = (0..y.len())
            .filter(|&s| model.covariate.is_known(s) && y[s].is_finite())
            .collect();
        if samples.is_empty() {
            return Err(FitError::NoObservations);
        }

        let built;
        let ls = match &model.shared {
            Some(shared) if shared.samples() == samples.as_slice() => shared,
            _ => {
                built = LeastSquares::new(build_design(&[model.covariate], &samples), self.rank_tolerance)?;
                &built
            }
        };

        let response = DVector::from_iterator(samples.len(), samples.iter().map(|&s| y[s]));
        let fit = ls.fit(&response);
        let result = overall_f_test(fit.tss, fit.rss, fit.n_obs, fit.n_params);
        if result.is_defined() {
            Ok(result)
        } else {
            Err(FitError::Undefined(format!(
                "{} observations, {} parameters, total variance {:.3e}",
                fit.n_obs, fit.n_params, fit.tss
            )))
        }
    }

    fn test_gene(&self, y: ArrayView1<f64>) -> Vec<Result<TestResult<f64>, FitError>> {
        self.factors
            .iter()
            .map(|model| self.test_factor(model, y))
            .collect()
    }
}

/// F-test p-values of every gene of `expression` against each configured factor.
pub fn test_gene_factors(
    expression: &ExpressionMatrix,
    covariates: &CovariateTable,
    config: &TesterConfig,
    pool: &WorkerPool,
) -> anyhow::Result<GeneModelResults> {
    let aligned = covariates.subset(expression.sample_ids())?;
    let factor_columns = aligned.require(&config.factors, "factor columns")?;

    let factors = factor_columns
        .into_iter()
        .map(|covariate| {
            let samples: Vec<usize> = (0..aligned.n_samples())
                .filter(|&s| covariate.is_known(s))
                .collect();
            let shared = LeastSquares::new(build_design(&[covariate], &samples), config.rank_tolerance).ok();
            FactorModel { covariate, shared }
        })
        .collect();
    let ctx = TestContext {
        factors,
        rank_tolerance: config.rank_tolerance,
    };

    log::info!(
        "testing {} genes against {:?} on {} workers",
        expression.n_genes(),
        config.factors,
        pool.n_workers()
    );
    let values = expression.values();
    let outcomes = pool.map_indexed(expression.n_genes(), |g| ctx.test_gene(values.row(g)));

    let n_genes = expression.n_genes();
    let mut statistics = vec![vec![f64::NAN; n_genes]; config.factors.len()];
    let mut p_values = vec![vec![f64::NAN; n_genes]; config.factors.len()];
    let mut report = BatchReport::default();

    for (g, per_factor) in outcomes.into_iter().enumerate() {
        for (f, outcome) in per_factor.into_iter().enumerate() {
            match outcome {
                Ok(result) => {
                    statistics[f][g] = result.statistic;
                    p_values[f][g] = result.p_value;
                    report.record_success();
                }
                Err(e) => report.record_failure(FitFailure {
                    gene_index: g,
                    gene_id: expression.gene_ids()[g].clone(),
                    context: config.factors[f].clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }
    report.log_summary("gene factor tests");

    let mut results = Vec::with_capacity(config.factors.len());
    for (f, (stats, ps)) in statistics.into_iter().zip(p_values).enumerate() {
        let adjusted = adjust_finite(&ps, config.correction)?;
        let factor_results = MultipleTestResults::new(stats, ps)
            .with_adjusted_p_values(adjusted)
            .with_global_metadata("test_type", "ols_f_test")
            .with_global_metadata("factor", &config.factors[f]);
        log::info!(
            "{}: {} genes significant at {}",
            config.factors[f],
            factor_results.num_significant(config.alpha),
            config.alpha
        );
        results.push(factor_results);
    }

    Ok(GeneModelResults {
        gene_ids: expression.gene_ids().to_vec(),
        symbols: (0..n_genes)
            .map(|g| expression.display_name(g).to_string())
            .collect(),
        factors: config.factors.clone(),
        results,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn covariates() -> CovariateTable {
        let mut table = CovariateTable::new(ids("s", 8)).unwrap();
        table
            .add_categorical(
                "origcell",
                ["fib", "fib", "fib", "fib", "ucb", "ucb", "ucb", "ucb"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            )
            .unwrap();
        table
            .add_categorical(
                "inductiongenes",
                ["OSK", "OSKM", "OSK", "OSKM", "OSK", "OSKM", "OSK", "OSKM"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            )
            .unwrap();
        table
    }

    #[test]
    fn each_factor_tested_separately() {
        let expr = ExpressionMatrix::new(
            array![
                [1.0, 1.2, 0.9, 1.1, 5.0, 5.2, 4.9, 5.1],
                [1.0, 3.0, 1.1, 3.1, 0.9, 2.9, 1.0, 3.0],
            ],
            ids("g", 2),
            ids("s", 8),
        )
        .unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let out = test_gene_factors(&expr, &covariates(), &TesterConfig::default(), &pool).unwrap();

        assert!(out.p_value("g0", "origcell").unwrap() < 1e-6);
        assert!(out.p_value("g0", "inductiongenes").unwrap() > 0.5);
        assert!(out.p_value("g1", "inductiongenes").unwrap() < 1e-6);
        assert!(out.p_value("g1", "origcell").unwrap() > 0.5);
        assert_eq!(out.top_genes("origcell", 1), vec!["g0".to_string()]);
        assert_eq!(out.report.n_failed(), 0);
    }

    #[test]
    fn constant_gene_is_recorded_not_raised() {
        let expr = ExpressionMatrix::new(
            array![[2.0; 8], [1.0, 1.2, 0.9, 1.1, 5.0, 5.2, 4.9, 5.1]],
            ids("g", 2),
            ids("s", 8),
        )
        .unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let out = test_gene_factors(&expr, &covariates(), &TesterConfig::default(), &pool).unwrap();
        assert!(out.p_values()[[0, 0]].is_nan());
        assert!(out.p_values()[[1, 0]].is_finite());
        assert_eq!(out.report.failed_genes(), vec![0]);
        assert_eq!(out.report.n_succeeded, 2);
    }
}
