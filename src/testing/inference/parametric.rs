//! Parametric tests on linear model fits.

use crate::testing::TestResult;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Overall F-test of a linear model with intercept against the intercept-only model.
///
/// # Arguments
///
/// * `tss` - Total sum of squares around the mean
/// * `rss` - Residual sum of squares of the fitted model
/// * `n_obs` - Number of observations used in the fit
/// * `n_params` - Number of fitted coefficients including the intercept
///
/// # Returns
///
/// `TestResult` with the F statistic, its upper-tail p-value, `(df_model, df_resid)` and R² as
/// effect size. The result is undefined without model or residual degrees of freedom, or when
/// the response is constant.
pub fn overall_f_test(tss: f64, rss: f64, n_obs: usize, n_params: usize) -> TestResult<f64> {
    if n_params < 2 || n_obs <= n_params || !tss.is_finite() || !rss.is_finite() {
        return TestResult::undefined();
    }

    let df_model = (n_params - 1) as f64;
    let df_resid = (n_obs - n_params) as f64;
    let tol = 1e-12 * tss.max(1.0);
    if tss <= tol {
        return TestResult::undefined();
    }

    let rss = rss.max(0.0);
    let ess = (tss - rss).max(0.0);
    let r_squared = ess / tss;

    if rss <= tol {
        // perfect fit
        return TestResult::new(f64::INFINITY, 0.0)
            .with_degrees_of_freedom(df_model, df_resid)
            .with_effect_size(1.0);
    }

    let f_stat = (ess / df_model) / (rss / df_resid);
    let p_value = match FisherSnedecor::new(df_model, df_resid) {
        Ok(dist) => dist.sf(f_stat).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };

    TestResult::new(f_stat, p_value)
        .with_degrees_of_freedom(df_model, df_resid)
        .with_effect_size(r_squared)
}
