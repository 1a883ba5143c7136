use crate::data::ContingencyTable;
use crate::testing::TestResult;

pub mod discrete;

pub mod parametric;

/// Independence tests on a cross-tabulation of two covariates.
pub trait ContingencyTests {
    fn chi_square_test(&self, yates_correction: bool) -> TestResult<f64>;

    /// True when either axis has fewer than two observed categories.
    fn is_degenerate(&self) -> bool;
}

impl ContingencyTests for ContingencyTable {
    fn chi_square_test(&self, yates_correction: bool) -> TestResult<f64> {
        discrete::chi_square_contingency(self.counts.view(), yates_correction)
    }

    fn is_degenerate(&self) -> bool {
        let (rows, cols) = self.shape();
        rows < 2 || cols < 2
    }
}
