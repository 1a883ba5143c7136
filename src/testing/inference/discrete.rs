use crate::testing::TestResult;
use ndarray::ArrayView2;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Pearson chi-square test of independence on an r x c contingency table.
///
/// Degrees of freedom are `(r - 1)(c - 1)`. With one degree of freedom and `yates_correction`
/// set, every observed count is moved half a unit towards its expectation (never past it).
/// The p-value is the upper tail of the chi-square distribution. Tables with a single category
/// on either axis, or without any observations, give an undefined result. Small tables are not
/// switched to an exact test; the chi-square approximation is used uniformly.
pub fn chi_square_contingency(counts: ArrayView2<f64>, yates_correction: bool) -> TestResult<f64> {
    let (n_rows, n_cols) = counts.dim();
    let total: f64 = counts.sum();
    if n_rows < 2 || n_cols < 2 || total <= 0.0 {
        return TestResult::undefined();
    }

    let row_sums: Vec<f64> = counts.rows().into_iter().map(|r| r.sum()).collect();
    let col_sums: Vec<f64> = counts.columns().into_iter().map(|c| c.sum()).collect();
    if row_sums.iter().chain(col_sums.iter()).any(|&m| m <= 0.0) {
        // an empty level would give a zero expectation
        return TestResult::undefined();
    }

    let dof = ((n_rows - 1) * (n_cols - 1)) as f64;
    let correct = yates_correction && n_rows == 2 && n_cols == 2;

    let mut chi_square = 0.0;
    for ((i, j), &observed) in counts.indexed_iter() {
        let expected = row_sums[i] * col_sums[j] / total;
        let mut diff = (observed - expected).abs();
        if correct {
            diff = (diff - 0.5).max(0.0);
        }
        chi_square += diff * diff / expected;
    }

    let p_value = chi_square_p_value(chi_square, dof);
    TestResult::new(chi_square, p_value)
        .with_degrees_of_freedom(dof, 0.0)
        .with_metadata("n", total)
}

fn chi_square_p_value(chi_square: f64, df: f64) -> f64 {
    if !chi_square.is_finite() {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(chi_dist) => chi_dist.sf(chi_square).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn balanced_table_has_no_association() {
        let result = chi_square_contingency(array![[1.0, 1.0], [1.0, 1.0]].view(), true);
        assert_relative_eq!(result.statistic, 0.0);
        assert_relative_eq!(result.p_value, 1.0);
    }

    #[test]
    fn yates_correction_shrinks_statistic() {
        let table = array![[10.0, 2.0], [3.0, 12.0]];
        let plain = chi_square_contingency(table.view(), false);
        let corrected = chi_square_contingency(table.view(), true);
        assert!(corrected.statistic < plain.statistic);
        assert!(corrected.p_value > plain.p_value);
        assert_relative_eq!(plain.statistic, 10.710989, epsilon = 1e-5);
        assert_relative_eq!(corrected.statistic, 8.324382, epsilon = 1e-5);
    }

    #[test]
    fn larger_table_uses_full_dof() {
        let result = chi_square_contingency(
            array![[8.0, 1.0, 1.0], [1.0, 8.0, 1.0], [1.0, 1.0, 8.0]].view(),
            true,
        );
        assert_eq!(result.degrees_of_freedom, Some((4.0, 0.0)));
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn single_category_is_undefined() {
        let result = chi_square_contingency(array![[3.0, 4.0]].view(), true);
        assert!(result.p_value.is_nan());
        assert!(!result.is_defined());
    }
}
