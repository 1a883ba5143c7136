use single_utilities::traits::FloatOps;
use std::collections::HashMap;

pub mod association;
pub mod correction;
pub mod inference;

pub mod utils;

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (chi-square, F)
    pub statistic: T,
    /// The p-value of the test; `NaN` when the test is undefined
    pub p_value: T,
    /// Degrees of freedom as (numerator, denominator); the denominator is zero for chi-square
    pub degrees_of_freedom: Option<(T, T)>,
    /// Effect size measurement (R² for linear models)
    pub effect_size: Option<T>,
    /// Additional test-specific information
    pub metadata: HashMap<String, T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            degrees_of_freedom: None,
            effect_size: None,
            metadata: HashMap::new(),
        }
    }

    /// Result of a test that cannot be computed
    pub fn undefined() -> Self {
        Self::new(<T as num_traits::Float>::nan(), <T as num_traits::Float>::nan())
    }

    pub fn with_degrees_of_freedom(mut self, df1: T, df2: T) -> Self {
        self.degrees_of_freedom = Some((df1, df2));
        self
    }

    pub fn with_effect_size(mut self, effect_size: T) -> Self {
        self.effect_size = Some(effect_size);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: T) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_defined(&self) -> bool {
        num_traits::Float::is_finite(self.p_value)
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: T) -> bool {
        self.p_value < alpha
    }
}

#[derive(Debug, Clone)]
pub struct MultipleTestResults<T> {
    /// Test statistics for each feature/gene
    pub statistics: Vec<T>,
    /// Raw (unadjusted) p-values, `NaN` for failed fits
    pub p_values: Vec<T>,
    /// Adjusted p-values (after multiple testing correction)
    pub adjusted_p_values: Option<Vec<T>>,
    /// Global metadata about the test
    pub global_metadata: HashMap<String, String>,
}

impl<T> MultipleTestResults<T>
where
    T: FloatOps,
{
    /// Create a new results object from p-values
    pub fn new(statistics: Vec<T>, p_values: Vec<T>) -> Self {
        MultipleTestResults {
            statistics,
            p_values,
            adjusted_p_values: None,
            global_metadata: HashMap::new(),
        }
    }

    pub fn with_adjusted_p_values(mut self, adjusted_p_values: Vec<T>) -> Self {
        self.adjusted_p_values = Some(adjusted_p_values);
        self
    }

    pub fn with_global_metadata(mut self, key: &str, value: &str) -> Self {
        self.global_metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    fn ranking_p_values(&self) -> &[T] {
        match &self.adjusted_p_values {
            Some(adj_p) => adj_p,
            None => &self.p_values,
        }
    }

    /// Get indices of significant features at the given threshold
    pub fn significant_indices(&self, alpha: T) -> Vec<usize> {
        self.ranking_p_values()
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| if p < alpha { Some(i) } else { None })
            .collect()
    }

    /// Get the number of significant features at the given threshold
    pub fn num_significant(&self, alpha: T) -> usize {
        self.significant_indices(alpha).len()
    }

    /// Number of features whose test could not be computed
    pub fn num_undefined(&self) -> usize {
        self.p_values.iter().filter(|&&p| !num_traits::Float::is_finite(p)).count()
    }

    /// Get top n features by p-value; undefined p-values are never selected
    pub fn top_features(&self, n: usize) -> Vec<usize> {
        let p_values = self.ranking_p_values();

        let mut indices: Vec<usize> = (0..p_values.len())
            .filter(|&i| num_traits::Float::is_finite(p_values[i]))
            .collect();
        indices.sort_by(|&a, &b| {
            p_values[a]
                .partial_cmp(&p_values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(n);
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_features_skip_undefined() {
        let results = MultipleTestResults::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.5, f64::NAN, 0.01, 0.2]);
        assert_eq!(results.top_features(3), vec![2, 3, 0]);
        assert_eq!(results.num_undefined(), 1);
        assert_eq!(results.num_significant(0.05), 1);
    }

    #[test]
    fn undefined_result_is_not_significant() {
        let r: TestResult<f64> = TestResult::undefined();
        assert!(!r.is_defined());
        assert!(!r.is_significant(0.05));
    }
}
