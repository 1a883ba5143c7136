//! End-to-end confounding analysis.
//!
//! ```text
//! metadata ─► covariates ─► association matrix
//!                 │
//! expression ─► filter ─► transform ─► decomposition (raw)
//!                            │
//!                            └─► residualize ─► decomposition (corrected)
//!                                      └──────► per-gene factor tests
//! ```

use crate::config::PipelineConfig;
use crate::data::{CovariateTable, DatasetSource, load_covariates};
use crate::decomposition::{ComponentAssociations, Decomposition, decompose};
use crate::enrichment::{EnrichmentQuery, factor_queries, loading_queries};
use crate::models::{GeneModelResults, Residualization, residualize, test_gene_factors};
use crate::parallel::WorkerPool;
use crate::preprocessing::{FilterReport, TransformedExpression, filter_genes, load_expression, transform};
use crate::testing::association::{AssociationMatrix, StrongAssociation, association_matrix, strong_associations};

/// Where the inputs of a run come from.
#[derive(Debug, Clone)]
pub struct DatasetIds {
    pub metadata: String,
    /// Row predicate handed to the source with the metadata request.
    pub metadata_query: Option<String>,
    pub expression: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub covariates: CovariateTable,
    pub associations: AssociationMatrix,
    pub strong_associations: Vec<StrongAssociation>,
    pub filter_report: FilterReport,
    pub transformed: TransformedExpression,
    pub raw_decomposition: Decomposition,
    pub raw_components: ComponentAssociations,
    pub residualization: Residualization,
    pub corrected_decomposition: Decomposition,
    pub corrected_components: ComponentAssociations,
    pub gene_tests: GeneModelResults,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loading queries of the leading corrected components, then one query per tested factor.
    /// Sizes come from `decomposition.enrichment_components` and `decomposition.top_genes`.
    pub fn enrichment_queries(&self, outcome: &PipelineOutcome) -> anyhow::Result<Vec<EnrichmentQuery>> {
        let decomposition = &self.config.decomposition;
        let mut queries = loading_queries(
            &outcome.corrected_decomposition,
            decomposition.enrichment_components,
            decomposition.top_genes,
        )?;
        queries.extend(factor_queries(&outcome.gene_tests, decomposition.top_genes));
        Ok(queries)
    }

    pub fn run<S>(&self, source: &S, ids: &DatasetIds) -> anyhow::Result<PipelineOutcome>
    where
        S: DatasetSource + ?Sized,
    {
        let config = &self.config;

        let covariates = load_covariates(source, &ids.metadata, ids.metadata_query.as_deref(), &config.loader)?;
        let associations = association_matrix(&covariates, &config.association)?;
        let strong = strong_associations(&covariates, &associations, config.association.strong_log10_threshold)?;
        for pair in &strong {
            log::info!("{} - {}: log10 p = {:.1}", pair.a, pair.b, pair.log10_p);
        }

        let expression = load_expression(source, &ids.expression, covariates.sample_ids())?;
        let (filtered, filter_report) = filter_genes(&expression, &config.filter);
        let transformed = transform(&filtered)?;

        let decomposition = &config.decomposition;
        let raw_decomposition = decompose(&transformed.gene_standardized, &covariates, decomposition)?;
        let raw_components = raw_decomposition
            .component_associations(decomposition.n_associated_components, config.tester.rank_tolerance)?;

        let pool = WorkerPool::new(config.n_workers)?;
        let residualization = residualize(
            &transformed.sample_standardized,
            &covariates,
            &config.residualizer,
            &pool,
        )?;
        let corrected_decomposition = decompose(&residualization.residuals, &covariates, decomposition)?;
        let corrected_components = corrected_decomposition
            .component_associations(decomposition.n_associated_components, config.tester.rank_tolerance)?;
        let gene_tests = test_gene_factors(&residualization.residuals, &covariates, &config.tester, &pool)?;
        drop(pool);

        Ok(PipelineOutcome {
            covariates,
            associations,
            strong_associations: strong,
            filter_report,
            transformed,
            raw_decomposition,
            raw_components,
            residualization,
            corrected_decomposition,
            corrected_components,
            gene_tests,
        })
    }
}
