//! Worker pool for per-gene model fitting.
//!
//! The pool is owned by the caller, sized explicitly, and its threads exit when it is dropped.
//! Work is expressed as a function of a gene index; results come back in index order no matter
//! which worker finished first.

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::PipelineError;

pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// `n_workers == 0` uses rayon's default thread count.
    pub fn new(n_workers: usize) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("gene-worker-{}", i))
            .build()?;
        log::debug!("started worker pool with {} threads", pool.current_num_threads());
        Ok(WorkerPool { pool })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate `f(0..n)` on the pool; element `i` of the output is `f(i)`.
    pub fn map_indexed<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.pool
            .install(|| (0..n).into_par_iter().map(&f).collect())
    }
}

/// A unit of per-gene work that could not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub struct FitFailure {
    pub gene_index: usize,
    pub gene_id: String,
    /// Factor or stage the fit belonged to.
    pub context: String,
    pub reason: String,
}

impl FitFailure {
    pub fn to_error(&self) -> PipelineError {
        PipelineError::WorkerFailure {
            gene: self.gene_id.clone(),
            reason: format!("{} ({})", self.reason, self.context),
        }
    }
}

/// Success and failure counts of a batch of per-gene fits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub n_total: usize,
    pub n_succeeded: usize,
    pub failures: Vec<FitFailure>,
}

impl BatchReport {
    pub fn n_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn record_success(&mut self) {
        self.n_total += 1;
        self.n_succeeded += 1;
    }

    pub fn record_failure(&mut self, failure: FitFailure) {
        self.n_total += 1;
        self.failures.push(failure);
    }

    pub fn failed_genes(&self) -> Vec<usize> {
        let mut genes: Vec<usize> = self.failures.iter().map(|f| f.gene_index).collect();
        genes.sort_unstable();
        genes.dedup();
        genes
    }

    pub fn log_summary(&self, stage: &str) {
        if self.failures.is_empty() {
            log::info!("{}: {} fits succeeded", stage, self.n_succeeded);
        } else {
            log::warn!(
                "{}: {} of {} fits failed, first: {}",
                stage,
                self.n_failed(),
                self.n_total,
                self.failures[0].to_error()
            );
        }
    }
}
