//! Singular value decomposition of standardized expression with a covariate overlay.
//!
//! Genes without any value and samples holding a missing value are removed before the rows are
//! centred and decomposed. Components are returned in order of decreasing singular value and
//! oriented so that the largest-magnitude loading of each is positive.

pub mod overlay;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};

use crate::config::DecompositionConfig;
use crate::data::{CovariateTable, ExpressionMatrix};
use crate::error::PipelineError;

pub use overlay::{ComponentAssociations, component_associations};

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub gene_ids: Vec<String>,
    pub symbols: Vec<String>,
    pub sample_ids: Vec<String>,
    /// genes x components
    pub loadings: Array2<f64>,
    /// Non-negative, descending.
    pub singular_values: Array1<f64>,
    /// samples x components, each column scaled by its singular value
    pub scores: Array2<f64>,
    /// Share of total variance per kept component, relative to all components.
    pub explained_variance_ratio: Array1<f64>,
    pub dropped_genes: Vec<String>,
    pub dropped_samples: Vec<String>,
    /// Covariates of the decomposed samples, without the excluded overlay columns.
    pub covariates: CovariateTable,
}

impl Decomposition {
    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    pub fn component_name(component: usize) -> String {
        format!("PC{}", component + 1)
    }

    /// Symbols of the `n` most negative and the `n` most positive loadings of `component`.
    ///
    /// The negative list starts with the most negative gene, the positive list with the most
    /// positive one.
    pub fn top_loading_genes(&self, component: usize, n: usize) -> anyhow::Result<(Vec<String>, Vec<String>)> {
        if component >= self.n_components() {
            return Err(PipelineError::invalid(format!(
                "component {} requested, {} available",
                component,
                self.n_components()
            ))
            .into());
        }
        let column = self.loadings.column(component);
        let mut order: Vec<usize> = (0..column.len()).collect();
        order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

        let n = n.min(order.len());
        let negative = order[..n].iter().map(|&g| self.symbols[g].clone()).collect();
        let positive = order[order.len() - n..]
            .iter()
            .rev()
            .map(|&g| self.symbols[g].clone())
            .collect();
        Ok((negative, positive))
    }

    /// Overall F-test p-values of the first `k` component scores against every covariate.
    pub fn component_associations(&self, k: usize, rank_tolerance: f64) -> anyhow::Result<ComponentAssociations> {
        component_associations(self, k, rank_tolerance)
    }
}

fn center_rows(values: &Array2<f64>) -> Array2<f64> {
    let mut centered = values.clone();
    for mut row in centered.axis_iter_mut(Axis(0)) {
        let mean = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - mean);
    }
    centered
}

/// Decompose `matrix` (genes x samples). Neither input is modified.
pub fn decompose(
    matrix: &ExpressionMatrix,
    covariates: &CovariateTable,
    config: &DecompositionConfig,
) -> anyhow::Result<Decomposition> {
    let mut kept_genes = Vec::with_capacity(matrix.n_genes());
    let mut dropped_genes = Vec::new();
    for g in 0..matrix.n_genes() {
        if matrix.gene_row(g).iter().any(|v| v.is_finite()) {
            kept_genes.push(g);
        } else {
            dropped_genes.push(matrix.gene_ids()[g].clone());
        }
    }
    if !dropped_genes.is_empty() {
        log::warn!("{} genes without any value left out of the decomposition", dropped_genes.len());
    }

    let (complete, dropped_samples) = matrix.select_genes(&kept_genes).drop_incomplete_samples();
    if !dropped_samples.is_empty() {
        log::info!(
            "dropped {} samples with missing values: {:?}",
            dropped_samples.len(),
            dropped_samples
        );
    }

    let (n_genes, n_samples) = (complete.n_genes(), complete.n_samples());
    if n_genes == 0 || n_samples < 2 {
        return Err(PipelineError::DegenerateStatistic {
            context: format!("decomposition of {} genes x {} complete samples", n_genes, n_samples),
        }
        .into());
    }

    let centered = center_rows(complete.values());
    let x = DMatrix::from_fn(n_genes, n_samples, |i, j| centered[[i, j]]);
    let svd = x.try_svd(true, true, f64::EPSILON, 0).ok_or_else(|| PipelineError::DegenerateStatistic {
        context: "singular value decomposition did not converge".to_string(),
    })?;
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        anyhow::bail!("SVD did not return singular vectors");
    };
    let sv = svd.singular_values;

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));
    let sorted: Vec<f64> = order.iter().map(|&c| sv[c]).collect();
    if sorted.iter().any(|s| !s.is_finite() || *s < 0.0) || sorted.windows(2).any(|w| w[0] < w[1]) {
        return Err(PipelineError::DegenerateStatistic {
            context: format!("singular values not non-negative and descending: {:?}", sorted),
        }
        .into());
    }

    let total: f64 = sorted.iter().map(|s| s * s).sum();
    let k = match config.n_components {
        0 => sorted.len(),
        n => n.min(sorted.len()),
    };

    let mut loadings = Array2::zeros((n_genes, k));
    let mut scores = Array2::zeros((n_samples, k));
    for (c, &src) in order.iter().take(k).enumerate() {
        let column = u.column(src);
        let pivot = column.iamax();
        let sign = if column[pivot] < 0.0 { -1.0 } else { 1.0 };
        for g in 0..n_genes {
            loadings[[g, c]] = sign * column[g];
        }
        for s in 0..n_samples {
            scores[[s, c]] = sign * v_t[(src, s)] * sorted[c];
        }
    }

    let explained_variance_ratio = Array1::from_iter(sorted.iter().take(k).map(|s| {
        if total > 0.0 { s * s / total } else { 0.0 }
    }));

    let overlay = covariates
        .subset(complete.sample_ids())?
        .without_columns(&config.overlay_exclude);

    log::info!(
        "decomposed {} genes x {} samples into {} components (first explains {:.1}%)",
        n_genes,
        n_samples,
        k,
        explained_variance_ratio.get(0).copied().unwrap_or(0.0) * 100.0
    );

    Ok(Decomposition {
        gene_ids: complete.gene_ids().to_vec(),
        symbols: (0..n_genes).map(|g| complete.display_name(g).to_string()).collect(),
        sample_ids: complete.sample_ids().to_vec(),
        loadings,
        singular_values: Array1::from_vec(sorted.into_iter().take(k).collect()),
        scores,
        explained_variance_ratio,
        dropped_genes,
        dropped_samples,
        covariates: overlay,
    })
}
