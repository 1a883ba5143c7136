//! Per-gene linear models: confounder removal and single-factor association tests.

pub mod design;
pub mod gene_tests;
pub mod ols;
pub mod residualizer;

pub use design::{DesignMatrix, build_design, complete_cases};
pub use gene_tests::{GeneModelResults, test_gene_factors};
pub use ols::{FitError, LeastSquares, OlsFit};
pub use residualizer::{Residualization, residualize};
