//! Input tables: sample covariates, expression levels and the collaborator that serves them.

pub mod covariates;
pub mod expression;
pub mod labels;
pub mod source;

pub use covariates::{
    ContingencyTable, Covariate, CovariateTable, CovariateValues, covariates_from_table, load_covariates,
};
pub use expression::ExpressionMatrix;
pub use labels::LabelCanonicalizer;
pub use source::{DatasetSource, RawTable, RowPredicate, TsvDirectorySource, read_tsv};
