//! Run configuration.
//!
//! Every threshold the pipeline applies lives here rather than in the stage that uses it. All
//! structs deserialize with `#[serde(default)]`, so a JSON file only needs the keys it overrides.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::testing::correction::CorrectionMethod;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Column holding the sample identifier.
    pub index_column: String,
    /// Administrative columns removed after indexing. Absent ones are ignored.
    pub drop_columns: Vec<String>,
    /// Literal tokens that mean "unknown".
    pub missing_tokens: Vec<String>,
    /// Columns that must be present after dropping.
    pub required_columns: Vec<String>,
    /// column -> (synonym -> canonical label)
    pub label_synonyms: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let mut diff = BTreeMap::new();
        diff.insert("EB-LF".to_string(), "EB".to_string());
        diff.insert("SC-LF".to_string(), "SC".to_string());
        diff.insert("SC-hpx".to_string(), "SC".to_string());
        let mut label_synonyms = BTreeMap::new();
        label_synonyms.insert("diffnameshort".to_string(), diff);

        LoaderConfig {
            index_column: "decoratedName".to_string(),
            drop_columns: [
                "name",
                "passqc",
                "bamId",
                "fastqId",
                "approvedfordiff",
                "pub",
                "projdiff",
                "projdifforiginlab",
                "predifferentiatedcellname",
                "project",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            missing_tokens: ["None", "none", "NA", "nan", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            required_columns: Vec::new(),
            label_synonyms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Pairs with fewer jointly known samples are flagged instead of tested.
    pub min_samples: usize,
    /// Apply Yates' continuity correction to 2x2 tables.
    pub yates_correction: bool,
    /// Columns left out of the pairwise matrix.
    pub exclude_columns: Vec<String>,
    /// Pairs with log10 p below this are reported with their contingency tables.
    pub strong_log10_threshold: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        AssociationConfig {
            min_samples: 5,
            yates_correction: true,
            exclude_columns: Vec::new(),
            strong_log10_threshold: -8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// A gene is kept only if at most this fraction of samples is exactly zero.
    pub max_zero_fraction: f64,
    /// A gene is kept only if sd(log2(x + 1)) across samples exceeds this.
    pub min_log_sd: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            max_zero_fraction: 0.2,
            min_log_sd: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Number of components kept; 0 keeps all.
    pub n_components: usize,
    /// Components tested against covariates.
    pub n_associated_components: usize,
    /// Leading components turned into enrichment queries.
    pub enrichment_components: usize,
    /// Genes taken from each end of a component, and per factor, for enrichment.
    pub top_genes: usize,
    /// Covariates left out of the overlay, e.g. the class used to select samples.
    pub overlay_exclude: Vec<String>,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        DecompositionConfig {
            n_components: 0,
            n_associated_components: 10,
            enrichment_components: 2,
            top_genes: 100,
            overlay_exclude: vec!["diffnameshort".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualizerConfig {
    pub confounders: Vec<String>,
    /// Relative singular value cutoff used to decide design rank.
    pub rank_tolerance: f64,
}

impl Default for ResidualizerConfig {
    fn default() -> Self {
        ResidualizerConfig {
            confounders: vec!["donorsex".to_string(), "cnv".to_string()],
            rank_tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub factors: Vec<String>,
    pub rank_tolerance: f64,
    /// Significance level used when summarising results.
    pub alpha: f64,
    pub correction: CorrectionMethod,
}

impl Default for TesterConfig {
    fn default() -> Self {
        TesterConfig {
            factors: vec!["origcell".to_string(), "inductiongenes".to_string()],
            rank_tolerance: 1e-10,
            alpha: 0.05,
            correction: CorrectionMethod::BenjaminiHochberg,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub association: AssociationConfig,
    pub filter: FilterConfig,
    pub decomposition: DecompositionConfig,
    pub residualizer: ResidualizerConfig,
    pub tester: TesterConfig,
    /// Size of the per-gene worker pool; 0 lets rayon pick.
    pub n_workers: usize,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("cannot read config {}: {}", path.as_ref().display(), e)
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let f = &self.filter;
        if !(0.0..=1.0).contains(&f.max_zero_fraction) {
            return Err(PipelineError::invalid(format!(
                "max_zero_fraction must be in [0, 1], got {}",
                f.max_zero_fraction
            ))
            .into());
        }
        if !f.min_log_sd.is_finite() || f.min_log_sd < 0.0 {
            return Err(PipelineError::invalid(format!(
                "min_log_sd must be a non-negative number, got {}",
                f.min_log_sd
            ))
            .into());
        }
        if self.association.min_samples < 2 {
            return Err(PipelineError::invalid("association.min_samples must be at least 2").into());
        }
        for tol in [self.residualizer.rank_tolerance, self.tester.rank_tolerance] {
            if !(tol > 0.0 && tol < 1.0) {
                return Err(
                    PipelineError::invalid(format!("rank tolerance out of range: {}", tol)).into(),
                );
            }
        }
        if !(0.0..=1.0).contains(&self.tester.alpha) {
            return Err(PipelineError::invalid(format!("alpha out of range: {}", self.tester.alpha)).into());
        }
        if self.loader.index_column.is_empty() {
            return Err(PipelineError::invalid("loader.index_column is empty").into());
        }
        Ok(())
    }
}
