//! Ordinary least squares through a precomputed pseudo-inverse.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::models::design::DesignMatrix;

/// Why a single fit could not be made. Recorded per gene, never raised across the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("no samples with complete data")]
    NoObservations,

    #[error("design is rank deficient (rank {rank} < {n_params} columns)")]
    RankDeficient { rank: usize, n_params: usize },

    #[error("decomposition of the design failed: {0}")]
    Decomposition(String),

    #[error("test statistic undefined: {0}")]
    Undefined(String),
}

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: DVector<f64>,
    pub residuals: DVector<f64>,
    pub rss: f64,
    pub tss: f64,
    pub n_obs: usize,
    pub n_params: usize,
}

/// A full-rank design ready to be fitted against many responses.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    design: DesignMatrix,
    pinv: DMatrix<f64>,
}

impl LeastSquares {
    pub fn new(design: DesignMatrix, rank_tolerance: f64) -> Result<Self, FitError> {
        let (n, p) = design.matrix.shape();
        if n == 0 {
            return Err(FitError::NoObservations);
        }
        // no residual degrees of freedom left
        if n <= p {
            return Err(FitError::RankDeficient { rank: n.min(p), n_params: p });
        }

        let svd = design.matrix.clone().svd(true, true);
        let s_max = svd.singular_values.max();
        let cutoff = rank_tolerance * s_max.max(f64::MIN_POSITIVE);
        let rank = svd.singular_values.iter().filter(|&&s| s > cutoff).count();
        if rank < p {
            return Err(FitError::RankDeficient { rank, n_params: p });
        }

        let pinv = svd
            .pseudo_inverse(cutoff)
            .map_err(|e| FitError::Decomposition(e.to_string()))?;
        Ok(LeastSquares { design, pinv })
    }

    pub fn design(&self) -> &DesignMatrix {
        &self.design
    }

    pub fn samples(&self) -> &[usize] {
        &self.design.samples
    }

    /// Fit `y`, whose entries are aligned with the design rows.
    pub fn fit(&self, y: &DVector<f64>) -> OlsFit {
        let coefficients = &self.pinv * y;
        let fitted = &self.design.matrix * &coefficients;
        let residuals = y - fitted;

        let mean = y.mean();
        let tss = y.iter().map(|v| (v - mean) * (v - mean)).sum();
        let rss = residuals.norm_squared();

        OlsFit {
            coefficients,
            residuals,
            rss,
            tss,
            n_obs: self.design.n_obs(),
            n_params: self.design.n_params(),
        }
    }
}
