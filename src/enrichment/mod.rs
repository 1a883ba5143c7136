//! Gene lists for an external functional enrichment service.
//!
//! Queries are built from component loadings or from per-gene test results and handed to an
//! [`EnrichmentService`]. Reports come back opaque and are only collected, never read by later
//! stages.

use crate::decomposition::Decomposition;
use crate::models::GeneModelResults;

/// A labelled gene list submitted for enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentQuery {
    pub label: String,
    pub genes: Vec<String>,
}

impl EnrichmentQuery {
    pub fn new(label: impl Into<String>, genes: Vec<String>) -> Self {
        EnrichmentQuery {
            label: label.into(),
            genes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub label: String,
    /// Rendered by the service; not interpreted here.
    pub body: String,
}

pub trait EnrichmentService {
    fn enrich(&self, genes: &[String], label: &str) -> anyhow::Result<EnrichmentReport>;
}

/// Bottom and top `n` genes of each of the first `n_components` components.
///
/// Each component yields an `Anti-Correlated PC<k>` query followed by a `Correlated PC<k>` query.
pub fn loading_queries(
    decomposition: &Decomposition,
    n_components: usize,
    n: usize,
) -> anyhow::Result<Vec<EnrichmentQuery>> {
    let mut queries = Vec::new();
    for c in 0..n_components.min(decomposition.n_components()) {
        let (negative, positive) = decomposition.top_loading_genes(c, n)?;
        let name = Decomposition::component_name(c);
        queries.push(EnrichmentQuery::new(format!("Anti-Correlated {}", name), negative));
        queries.push(EnrichmentQuery::new(format!("Correlated {}", name), positive));
    }
    Ok(queries)
}

/// The `n` genes most associated with each tested factor.
pub fn factor_queries(results: &GeneModelResults, n: usize) -> Vec<EnrichmentQuery> {
    results
        .factors
        .iter()
        .map(|f| EnrichmentQuery::new(format!("{} associated", f), results.top_genes(f, n)))
        .filter(|q| !q.genes.is_empty())
        .collect()
}

/// Submit every query. A failed submission is logged and skipped.
pub fn run_queries<E>(service: &E, queries: &[EnrichmentQuery]) -> Vec<EnrichmentReport>
where
    E: EnrichmentService + ?Sized,
{
    let mut reports = Vec::with_capacity(queries.len());
    for query in queries {
        match service.enrich(&query.genes, &query.label) {
            Ok(report) => reports.push(report),
            Err(e) => log::warn!("enrichment of '{}' failed: {}", query.label, e),
        }
    }
    log::info!("{} of {} enrichment queries answered", reports.len(), queries.len());
    reports
}
