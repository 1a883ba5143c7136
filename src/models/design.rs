//! Design matrices for linear models over covariates.
//!
//! Numeric covariates enter as a single column. Categorical covariates are treatment coded: the
//! first level in sorted order among the fitted samples is the reference and every other level
//! gets an indicator column named `name[T.level]`.

use nalgebra::DMatrix;

use crate::data::{Covariate, CovariateValues};
use crate::testing::utils::extract_levels;

#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub matrix: DMatrix<f64>,
    pub column_names: Vec<String>,
    /// Sample positions of the design rows.
    pub samples: Vec<usize>,
}

impl DesignMatrix {
    pub fn n_obs(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Per sample, whether every term is known.
pub fn complete_cases(terms: &[&Covariate], n_samples: usize) -> Vec<bool> {
    (0..n_samples)
        .map(|s| terms.iter().all(|c| c.is_known(s)))
        .collect()
}

/// Intercept plus the coded `terms`, restricted to `samples`.
///
/// Every term must be known on every sample in `samples`.
pub fn build_design(terms: &[&Covariate], samples: &[usize]) -> DesignMatrix {
    let n = samples.len();
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
    let mut column_names = vec!["Intercept".to_string()];

    for term in terms {
        match &term.values {
            CovariateValues::Numeric(_) => {
                columns.push(
                    samples
                        .iter()
                        .map(|&s| term.number(s).unwrap_or(f64::NAN))
                        .collect(),
                );
                column_names.push(term.name.clone());
            }
            CovariateValues::Categorical(values) => {
                let labels: Vec<&str> = samples
                    .iter()
                    .map(|&s| values[s].as_deref().unwrap_or_default())
                    .collect();
                let (levels, codes) = extract_levels(&labels);
                for (level_idx, level) in levels.iter().enumerate().skip(1) {
                    columns.push(
                        codes
                            .iter()
                            .map(|&c| if c == level_idx { 1.0 } else { 0.0 })
                            .collect(),
                    );
                    column_names.push(format!("{}[T.{}]", term.name, level));
                }
            }
        }
    }

    let p = columns.len();
    let matrix = DMatrix::from_fn(n, p, |i, j| columns[j][i]);
    DesignMatrix {
        matrix,
        column_names,
        samples: samples.to_vec(),
    }
}
