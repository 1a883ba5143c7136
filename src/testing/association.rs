//! Pairwise independence tests between covariates.
//!
//! Every unordered pair of distinct columns is tested once, over the samples where both values
//! are known, and the result is written to both `(i, j)` and `(j, i)`. Because the sample subset
//! and the chi-square statistic are both invariant to swapping the two columns, the matrix is
//! symmetric by construction.

use ndarray::Array2;

use crate::config::AssociationConfig;
use crate::data::{ContingencyTable, CovariateTable};
use crate::testing::inference::ContingencyTests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    Diagonal,
    Tested,
    /// One of the columns has a single known category over the shared samples.
    SingleCategory,
    /// Fewer jointly known samples than `min_samples`.
    TooFewSamples,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairTest {
    pub statistic: f64,
    pub dof: f64,
    /// `NaN` unless `status` is `Tested`.
    pub p_value: f64,
    pub log10_p: f64,
    pub n_samples: usize,
    pub status: PairStatus,
}

impl PairTest {
    fn undefined(n_samples: usize, status: PairStatus) -> Self {
        PairTest {
            statistic: f64::NAN,
            dof: f64::NAN,
            p_value: f64::NAN,
            log10_p: f64::NAN,
            n_samples,
            status,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.status == PairStatus::Tested && self.p_value.is_finite()
    }
}

#[derive(Debug, Clone)]
pub struct AssociationMatrix {
    names: Vec<String>,
    cells: Vec<PairTest>,
}

impl AssociationMatrix {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn cell(&self, i: usize, j: usize) -> &PairTest {
        &self.cells[i * self.names.len() + j]
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&PairTest> {
        Some(self.cell(self.position(a)?, self.position(b)?))
    }

    /// The p-value of a tested pair; `None` for unknown names and undefined cells.
    pub fn p_value(&self, a: &str, b: &str) -> Option<f64> {
        self.get(a, b)
            .filter(|cell| cell.is_defined())
            .map(|cell| cell.p_value)
    }

    /// Dense p-values with `NaN` for undefined cells and the diagonal.
    pub fn p_values(&self) -> Array2<f64> {
        let n = self.len();
        Array2::from_shape_fn((n, n), |(i, j)| self.cell(i, j).p_value)
    }

    pub fn log10_p_values(&self) -> Array2<f64> {
        let n = self.len();
        Array2::from_shape_fn((n, n), |(i, j)| self.cell(i, j).log10_p)
    }

    pub fn count(&self, status: PairStatus) -> usize {
        let n = self.len();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.cell(i, j).status == status)
            .count()
    }

    /// Unordered pairs whose log10 p-value falls below `log10_threshold`, most significant first.
    pub fn strong_pairs(&self, log10_threshold: f64) -> Vec<(String, String, f64)> {
        let n = self.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let cell = self.cell(i, j);
                if cell.is_defined() && cell.log10_p < log10_threshold {
                    pairs.push((self.names[i].clone(), self.names[j].clone(), cell.log10_p));
                }
            }
        }
        pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        pairs
    }
}

fn jointly_known(table: &CovariateTable, a: usize, b: usize) -> usize {
    let (ca, cb) = (&table.columns()[a], &table.columns()[b]);
    (0..table.n_samples())
        .filter(|&s| ca.is_known(s) && cb.is_known(s))
        .count()
}

fn test_pair(table: &CovariateTable, a: usize, b: usize, config: &AssociationConfig) -> anyhow::Result<PairTest> {
    let n_samples = jointly_known(table, a, b);
    if n_samples < config.min_samples {
        return Ok(PairTest::undefined(n_samples, PairStatus::TooFewSamples));
    }

    let names = table.column_names();
    let crosstab = table.crosstab(names[a], names[b])?;
    if crosstab.is_degenerate() {
        return Ok(PairTest::undefined(n_samples, PairStatus::SingleCategory));
    }

    let result = crosstab.chi_square_test(config.yates_correction);
    if !result.is_defined() {
        return Ok(PairTest::undefined(n_samples, PairStatus::SingleCategory));
    }

    Ok(PairTest {
        statistic: result.statistic,
        dof: result.degrees_of_freedom.map(|d| d.0).unwrap_or(f64::NAN),
        p_value: result.p_value,
        log10_p: result.p_value.log10(),
        n_samples,
        status: PairStatus::Tested,
    })
}

/// Chi-square p-values between every pair of covariate columns.
pub fn association_matrix(table: &CovariateTable, config: &AssociationConfig) -> anyhow::Result<AssociationMatrix> {
    let table = table.without_columns(&config.exclude_columns);
    let names: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    let n = names.len();

    let mut cells = vec![PairTest::undefined(table.n_samples(), PairStatus::Diagonal); n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let cell = test_pair(&table, i, j, config)?;
            match cell.status {
                PairStatus::SingleCategory => {
                    log::debug!("{} - {}: single category, p undefined", names[i], names[j])
                }
                PairStatus::TooFewSamples => log::warn!(
                    "{} - {}: only {} jointly known samples, not tested",
                    names[i],
                    names[j],
                    cell.n_samples
                ),
                _ => {}
            }
            cells[j * n + i] = cell.clone();
            cells[i * n + j] = cell;
        }
    }

    let matrix = AssociationMatrix { names, cells };
    log::info!(
        "tested {} covariate pairs ({} single-category, {} too small)",
        matrix.count(PairStatus::Tested),
        matrix.count(PairStatus::SingleCategory),
        matrix.count(PairStatus::TooFewSamples)
    );
    Ok(matrix)
}

/// A strongly associated pair together with its cross-tabulation.
#[derive(Debug, Clone)]
pub struct StrongAssociation {
    pub a: String,
    pub b: String,
    pub log10_p: f64,
    pub table: ContingencyTable,
}

/// Contingency tables of the pairs whose log10 p-value is below `log10_threshold`.
pub fn strong_associations(
    table: &CovariateTable,
    matrix: &AssociationMatrix,
    log10_threshold: f64,
) -> anyhow::Result<Vec<StrongAssociation>> {
    matrix
        .strong_pairs(log10_threshold)
        .into_iter()
        .map(|(a, b, log10_p)| {
            let crosstab = table.crosstab(&a, &b)?;
            Ok(StrongAssociation {
                a,
                b,
                log10_p,
                table: crosstab,
            })
        })
        .collect()
}
