//! Expression filtering and normalization ahead of decomposition and model fitting.

pub mod filter;
pub mod transform;

pub use filter::{FilterReport, GeneVerdict, filter_expression, filter_genes, gene_verdict, load_expression};
pub use transform::{TransformedExpression, log2_transform, standardize_columns, standardize_rows, transform};
