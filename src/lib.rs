//! # confound-stats
//!
//! Confounding analysis of bulk gene expression from stem-cell derived samples.
//!
//! The crate tests which sample covariates are entangled with each other, cleans and
//! standardizes a gene by sample expression matrix, looks at its principal components in the
//! light of those covariates, and removes confounder-driven variance gene by gene before the
//! remaining signal is tested against the biological factors of interest.
//!
//! ## Core Features
//!
//! - **Covariate association**: pairwise chi-square independence tests over all metadata columns
//! - **Expression filtering and standardization**: zero-fraction and log-variance filters, log2
//!   transform, sample and gene z-scores with missing values skipped
//! - **Decomposition**: SVD of standardized expression with component/covariate F-tests
//! - **Residualization**: per-gene OLS against confounders on a sized worker pool
//! - **Per-gene factor tests**: single-factor F-test p-values with Benjamini-Hochberg adjustment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confound_stats::prelude::*;
//!
//! let source = TsvDirectorySource::new("data");
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//! let ids = DatasetIds {
//!     metadata: "metadata".to_string(),
//!     metadata_query: Some("select * from metadata where diffnameshort==\"SC\"".to_string()),
//!     expression: "expression".to_string(),
//! };
//! let outcome = pipeline.run(&source, &ids).unwrap();
//! println!("{:?}", outcome.gene_tests.top_genes("origcell", 10));
//! ```
//!
//! ## Module Organization
//!
//! - **[`data`]**: dataset sources, covariate table loading, expression matrix
//! - **[`testing`]**: test results, chi-square and F-tests, multiple testing correction
//! - **[`preprocessing`]**: gene filter and transform stage
//! - **[`decomposition`]**: SVD and covariate overlay
//! - **[`models`]**: design matrices, least squares, residualizer, per-gene tester
//! - **[`enrichment`]**: gene list queries for an external enrichment service
//! - **[`pipeline`]**: the full run

pub mod config;
pub mod data;
pub mod decomposition;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod parallel;
pub mod pipeline;
pub mod preprocessing;
pub mod testing;

pub mod prelude {
    pub use crate::config::{
        AssociationConfig, DecompositionConfig, FilterConfig, LoaderConfig, PipelineConfig,
        ResidualizerConfig, TesterConfig,
    };
    pub use crate::data::{CovariateTable, DatasetSource, ExpressionMatrix, RawTable, TsvDirectorySource};
    pub use crate::decomposition::{Decomposition, decompose};
    pub use crate::enrichment::{EnrichmentQuery, EnrichmentReport, EnrichmentService, run_queries};
    pub use crate::error::PipelineError;
    pub use crate::models::{GeneModelResults, Residualization, residualize, test_gene_factors};
    pub use crate::parallel::{BatchReport, WorkerPool};
    pub use crate::pipeline::{DatasetIds, Pipeline, PipelineOutcome};
    pub use crate::testing::association::{AssociationMatrix, association_matrix};
    pub use crate::testing::correction::CorrectionMethod;
    pub use crate::testing::{MultipleTestResults, TestResult};
}
