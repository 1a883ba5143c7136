//! Association of component scores with sample covariates.

use nalgebra::DVector;
use ndarray::Array2;

use crate::decomposition::Decomposition;
use crate::models::design::build_design;
use crate::models::ols::LeastSquares;
use crate::testing::inference::parametric::overall_f_test;

/// covariates x components p-values; `NaN` where the test is undefined.
#[derive(Debug, Clone)]
pub struct ComponentAssociations {
    pub covariates: Vec<String>,
    pub components: Vec<String>,
    pub p_values: Array2<f64>,
}

impl ComponentAssociations {
    pub fn log10_p_values(&self) -> Array2<f64> {
        self.p_values.mapv(f64::log10)
    }

    pub fn p_value(&self, covariate: &str, component: usize) -> Option<f64> {
        let row = self.covariates.iter().position(|c| c == covariate)?;
        self.p_values
            .get([row, component])
            .copied()
            .filter(|p| p.is_finite())
    }

    /// The covariate most associated with `component`, if any test was defined.
    pub fn strongest(&self, component: usize) -> Option<(&str, f64)> {
        (0..self.covariates.len())
            .filter_map(|r| {
                let p = *self.p_values.get([r, component])?;
                p.is_finite().then_some((self.covariates[r].as_str(), p))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Single-covariate F-tests of the first `k` component scores of `decomposition`.
pub fn component_associations(
    decomposition: &Decomposition,
    k: usize,
    rank_tolerance: f64,
) -> anyhow::Result<ComponentAssociations> {
    let k = k.min(decomposition.n_components());
    let table = &decomposition.covariates;
    let mut p_values = Array2::from_elem((table.n_columns(), k), f64::NAN);

    for (r, covariate) in table.columns().iter().enumerate() {
        let samples: Vec<usize> = (0..table.n_samples())
            .filter(|&s| covariate.is_known(s))
            .collect();
        let ls = match LeastSquares::new(build_design(&[covariate], &samples), rank_tolerance) {
            Ok(ls) => ls,
            Err(e) => {
                log::debug!("covariate {} not testable against components: {}", covariate.name, e);
                continue;
            }
        };
        for c in 0..k {
            let y = DVector::from_iterator(
                samples.len(),
                samples.iter().map(|&s| decomposition.scores[[s, c]]),
            );
            let fit = ls.fit(&y);
            p_values[[r, c]] = overall_f_test(fit.tss, fit.rss, fit.n_obs, fit.n_params).p_value;
        }
    }

    Ok(ComponentAssociations {
        covariates: table.column_names().into_iter().map(String::from).collect(),
        components: (0..k).map(Decomposition::component_name).collect(),
        p_values,
    })
}
