//! Gene x sample expression matrix with gene annotations.

use std::collections::HashMap;

use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, ArrayView1, Axis};
use single_utilities::traits::FloatOpsTS;

use crate::data::source::RawTable;
use crate::error::PipelineError;

/// Rows are genes, columns are samples. Derived matrices may hold `NaN` for missing entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    values: Array2<f64>,
    gene_ids: Vec<String>,
    symbols: Option<Vec<String>>,
    loci: Option<Vec<String>>,
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    pub fn new(values: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> anyhow::Result<Self> {
        let (n_genes, n_samples) = values.dim();
        if gene_ids.len() != n_genes {
            return Err(PipelineError::DimensionMismatch {
                expected: format!("{} gene ids", n_genes),
                got: format!("{} gene ids", gene_ids.len()),
            }
            .into());
        }
        if sample_ids.len() != n_samples {
            return Err(PipelineError::DimensionMismatch {
                expected: format!("{} sample ids", n_samples),
                got: format!("{} sample ids", sample_ids.len()),
            }
            .into());
        }
        Ok(ExpressionMatrix {
            values,
            gene_ids,
            symbols: None,
            loci: None,
            sample_ids,
        })
    }

    /// Raw expression levels must be finite and non-negative.
    pub fn new_raw(values: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> anyhow::Result<Self> {
        if let Some(((g, s), v)) = values
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(PipelineError::invalid(format!(
                "expression level {} at gene {} sample {} is not a non-negative number",
                v, g, s
            ))
            .into());
        }
        Self::new(values, gene_ids, sample_ids)
    }

    pub fn with_annotations(mut self, symbols: Vec<String>, loci: Vec<String>) -> anyhow::Result<Self> {
        let n = self.n_genes();
        if symbols.len() != n || loci.len() != n {
            return Err(PipelineError::DimensionMismatch {
                expected: format!("{} symbols and loci", n),
                got: format!("{} symbols, {} loci", symbols.len(), loci.len()),
            }
            .into());
        }
        self.symbols = Some(symbols);
        self.loci = Some(loci);
        Ok(self)
    }

    /// Parse the expression file layout: gene id, `symbol`, `locus`, then one column per sample.
    pub fn from_table(raw: &RawTable) -> anyhow::Result<Self> {
        let missing: Vec<String> = ["symbol", "locus"]
            .iter()
            .enumerate()
            .filter(|&(i, &name)| {
                raw.header
                    .get(i + 1)
                    .is_none_or(|h| !h.trim().eq_ignore_ascii_case(name))
            })
            .map(|(_, name)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema("expression table annotation columns", missing).into());
        }

        let sample_ids: Vec<String> = raw.header[3..].to_vec();
        let mut gene_ids = Vec::with_capacity(raw.n_rows());
        let mut symbols = Vec::with_capacity(raw.n_rows());
        let mut loci = Vec::with_capacity(raw.n_rows());
        let mut values = Array2::zeros((raw.n_rows(), sample_ids.len()));

        for (g, row) in raw.rows.iter().enumerate() {
            gene_ids.push(row[0].clone());
            symbols.push(row[1].clone());
            loci.push(row[2].clone());
            for (s, field) in row[3..].iter().enumerate() {
                values[[g, s]] = field.parse::<f64>().map_err(|_| {
                    PipelineError::invalid(format!(
                        "invalid expression value '{}' for gene {} sample {}",
                        field, row[0], sample_ids[s]
                    ))
                })?;
            }
        }

        Self::new_raw(values, gene_ids, sample_ids)?.with_annotations(symbols, loci)
    }

    /// Dense copy of a sparse genes x samples count matrix.
    pub fn from_csr<T>(matrix: &CsrMatrix<T>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> anyhow::Result<Self>
    where
        T: FloatOpsTS,
    {
        let mut values = Array2::zeros((matrix.nrows(), matrix.ncols()));
        for (row, col, v) in matrix.triplet_iter() {
            values[[row, col]] = v
                .to_f64()
                .ok_or_else(|| PipelineError::invalid("non-representable expression value"))?;
        }
        Self::new_raw(values, gene_ids, sample_ids)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn symbols(&self) -> Option<&[String]> {
        self.symbols.as_deref()
    }

    pub fn loci(&self) -> Option<&[String]> {
        self.loci.as_deref()
    }

    /// Display name of a gene: its symbol when annotated, else its id.
    pub fn display_name(&self, gene: usize) -> &str {
        match &self.symbols {
            Some(symbols) if !symbols[gene].is_empty() => &symbols[gene],
            _ => &self.gene_ids[gene],
        }
    }

    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    pub fn gene_row(&self, gene: usize) -> ArrayView1<'_, f64> {
        self.values.row(gene)
    }

    /// Same annotations and ids around new values of the same shape.
    pub fn with_values(&self, values: Array2<f64>) -> anyhow::Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(PipelineError::DimensionMismatch {
                expected: format!("{:?}", self.values.dim()),
                got: format!("{:?}", values.dim()),
            }
            .into());
        }
        Ok(ExpressionMatrix {
            values,
            gene_ids: self.gene_ids.clone(),
            symbols: self.symbols.clone(),
            loci: self.loci.clone(),
            sample_ids: self.sample_ids.clone(),
        })
    }

    pub fn select_genes(&self, rows: &[usize]) -> ExpressionMatrix {
        let pick = |v: &Vec<String>| rows.iter().map(|&r| v[r].clone()).collect::<Vec<_>>();
        ExpressionMatrix {
            values: self.values.select(Axis(0), rows),
            gene_ids: pick(&self.gene_ids),
            symbols: self.symbols.as_ref().map(pick),
            loci: self.loci.as_ref().map(pick),
            sample_ids: self.sample_ids.clone(),
        }
    }

    /// Columns for `sample_ids`, in that order. Every requested sample must be present.
    pub fn select_samples<S: AsRef<str>>(&self, sample_ids: &[S]) -> anyhow::Result<ExpressionMatrix> {
        let position: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut cols = Vec::with_capacity(sample_ids.len());
        let mut missing = Vec::new();
        for id in sample_ids {
            match position.get(id.as_ref()) {
                Some(&c) => cols.push(c),
                None => missing.push(id.as_ref().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::schema("expression sample columns", missing).into());
        }

        Ok(ExpressionMatrix {
            values: self.values.select(Axis(1), &cols),
            gene_ids: self.gene_ids.clone(),
            symbols: self.symbols.clone(),
            loci: self.loci.clone(),
            sample_ids: cols.iter().map(|&c| self.sample_ids[c].clone()).collect(),
        })
    }

    /// Drop every sample column holding a missing value.
    pub fn drop_incomplete_samples(&self) -> (ExpressionMatrix, Vec<String>) {
        let mut keep = Vec::new();
        let mut dropped = Vec::new();
        for (c, col) in self.values.axis_iter(Axis(1)).enumerate() {
            if col.iter().all(|v| v.is_finite()) {
                keep.push(c);
            } else {
                dropped.push(self.sample_ids[c].clone());
            }
        }
        let matrix = ExpressionMatrix {
            values: self.values.select(Axis(1), &keep),
            gene_ids: self.gene_ids.clone(),
            symbols: self.symbols.clone(),
            loci: self.loci.clone(),
            sample_ids: keep.iter().map(|&c| self.sample_ids[c].clone()).collect(),
        };
        (matrix, dropped)
    }
}
