use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Multiple testing correction applied to per-gene p-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMethod {
    Bonferroni,
    BenjaminiHochberg,
}

fn validate(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

/// Apply Bonferroni correction to p-values
///
/// Each p-value is multiplied by the number of tests and capped at 1.0.
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();
    Ok(p_values.iter().map(|&p| (p * n as f64).min(1.0)).collect())
}

/// Apply the Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// # Example
/// ```
/// use confound_stats::testing::correction::benjamini_hochberg_correction;
/// let adjusted = benjamini_hochberg_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// ```
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();

    let mut indexed_p_values: Vec<(usize, f64)> =
        p_values.iter().enumerate().map(|(i, &p)| (i, p)).collect();
    indexed_p_values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    // Walk from the largest p-value down, keeping the running minimum
    let mut adjusted_p_values = vec![0.0; n];
    let mut current_min = 1.0;
    for i in (0..n).rev() {
        let (orig_idx, p_val) = indexed_p_values[i];
        let rank = i + 1;
        let adjustment = (p_val * n as f64 / rank as f64).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted_p_values[orig_idx] = current_min;
    }

    Ok(adjusted_p_values)
}

/// Correct the finite p-values of `p_values`; `NaN` entries stay `NaN` and do not count as tests.
pub fn adjust_finite(p_values: &[f64], method: CorrectionMethod) -> Result<Vec<f64>> {
    let positions: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    let mut adjusted = vec![f64::NAN; p_values.len()];
    if positions.is_empty() {
        return Ok(adjusted);
    }

    let finite: Vec<f64> = positions.iter().map(|&i| p_values[i]).collect();
    let corrected = match method {
        CorrectionMethod::Bonferroni => bonferroni_correction(&finite)?,
        CorrectionMethod::BenjaminiHochberg => benjamini_hochberg_correction(&finite)?,
    };
    for (&i, q) in positions.iter().zip(corrected) {
        adjusted[i] = q;
    }
    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec_relative_eq(a: &[f64], b: &[f64], epsilon: f64) {
        assert_eq!(a.len(), b.len(), "Vectors have different lengths");
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            if (x - y).abs() > epsilon {
                panic!("Vectors differ at index {}: {} != {}", i, x, y);
            }
        }
    }

    #[test]
    fn test_bonferroni() {
        let p_values = vec![0.01, 0.02, 0.03, 0.1, 0.2];
        let expected = vec![0.05, 0.1, 0.15, 0.5, 1.0];
        let adjusted = bonferroni_correction(&p_values).unwrap();
        assert_vec_relative_eq(&adjusted, &expected, 1e-10);
    }

    #[test]
    fn test_benjamini_hochberg() {
        let p_values = vec![0.01, 0.04, 0.03, 0.2];
        let expected = vec![0.04, 0.0533333333, 0.0533333333, 0.2];
        let adjusted = benjamini_hochberg_correction(&p_values).unwrap();
        assert_vec_relative_eq(&adjusted, &expected, 1e-9);
    }

    #[test]
    fn test_benjamini_hochberg_invalid_pvalues() {
        let result = benjamini_hochberg_correction(&[0.01, -0.5, 0.03]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid p-value at index 1")
        );
        assert!(benjamini_hochberg_correction(&[]).is_err());
    }

    #[test]
    fn test_adjust_skips_missing() {
        let adjusted =
            adjust_finite(&[0.01, f64::NAN, 0.04], CorrectionMethod::BenjaminiHochberg).unwrap();
        assert_relative_eq!(adjusted[0], 0.02, epsilon = 1e-12);
        assert!(adjusted[1].is_nan());
        assert_relative_eq!(adjusted[2], 0.04, epsilon = 1e-12);

        let none = adjust_finite(&[f64::NAN], CorrectionMethod::Bonferroni).unwrap();
        assert!(none[0].is_nan());
    }
}
