//! Sample covariate table and its loader.

use std::collections::{BTreeMap, HashMap, HashSet};

use ndarray::Array2;

use crate::config::LoaderConfig;
use crate::data::labels::LabelCanonicalizer;
use crate::data::source::{DatasetSource, RawTable};
use crate::error::PipelineError;

/// Values of one covariate, `None` marking an unknown value.
#[derive(Debug, Clone, PartialEq)]
pub enum CovariateValues {
    Categorical(Vec<Option<String>>),
    Numeric(Vec<Option<f64>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub name: String,
    pub values: CovariateValues,
}

impl Covariate {
    pub fn categorical(name: &str, values: Vec<Option<String>>) -> Self {
        Covariate {
            name: name.to_string(),
            values: CovariateValues::Categorical(values),
        }
    }

    pub fn numeric(name: &str, values: Vec<Option<f64>>) -> Self {
        Covariate {
            name: name.to_string(),
            values: CovariateValues::Numeric(values),
        }
    }

    pub fn len(&self) -> usize {
        match &self.values {
            CovariateValues::Categorical(v) => v.len(),
            CovariateValues::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.values, CovariateValues::Numeric(_))
    }

    pub fn is_known(&self, sample: usize) -> bool {
        match &self.values {
            CovariateValues::Categorical(v) => v[sample].is_some(),
            CovariateValues::Numeric(v) => v[sample].is_some_and(|x| x.is_finite()),
        }
    }

    pub fn n_known(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_known(i)).count()
    }

    /// Value of `sample` as a label; numbers are rendered with `Display`.
    pub fn label(&self, sample: usize) -> Option<String> {
        match &self.values {
            CovariateValues::Categorical(v) => v[sample].clone(),
            CovariateValues::Numeric(v) => v[sample].filter(|x| x.is_finite()).map(|x| x.to_string()),
        }
    }

    pub fn number(&self, sample: usize) -> Option<f64> {
        match &self.values {
            CovariateValues::Numeric(v) => v[sample].filter(|x| x.is_finite()),
            CovariateValues::Categorical(_) => None,
        }
    }

    /// Sorted distinct known labels.
    pub fn levels(&self) -> Vec<String> {
        match &self.values {
            CovariateValues::Categorical(v) => {
                let mut levels: Vec<String> = v.iter().flatten().cloned().collect();
                levels.sort();
                levels.dedup();
                levels
            }
            CovariateValues::Numeric(v) => {
                let mut nums: Vec<f64> = v.iter().flatten().copied().filter(|x| x.is_finite()).collect();
                nums.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                nums.dedup();
                nums.iter().map(|x| x.to_string()).collect()
            }
        }
    }

    fn take(&self, rows: &[usize]) -> Covariate {
        let values = match &self.values {
            CovariateValues::Categorical(v) => {
                CovariateValues::Categorical(rows.iter().map(|&r| v[r].clone()).collect())
            }
            CovariateValues::Numeric(v) => {
                CovariateValues::Numeric(rows.iter().map(|&r| v[r]).collect())
            }
        };
        Covariate {
            name: self.name.clone(),
            values,
        }
    }
}

/// Cross-tabulation of two covariates over samples where both are known.
#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyTable {
    pub row_variable: String,
    pub col_variable: String,
    pub row_levels: Vec<String>,
    pub col_levels: Vec<String>,
    pub counts: Array2<f64>,
}

impl ContingencyTable {
    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.counts.dim()
    }
}

/// Covariates indexed by unique sample id.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateTable {
    sample_ids: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Covariate>,
}

impl CovariateTable {
    pub fn new(sample_ids: Vec<String>) -> anyhow::Result<Self> {
        let mut index = HashMap::with_capacity(sample_ids.len());
        let mut duplicates = Vec::new();
        for (i, id) in sample_ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                duplicates.push(id.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(PipelineError::schema("sample index (ids must be unique)", duplicates).into());
        }
        Ok(CovariateTable {
            sample_ids,
            index,
            columns: Vec::new(),
        })
    }

    pub fn push(&mut self, covariate: Covariate) -> anyhow::Result<()> {
        if covariate.len() != self.sample_ids.len() {
            return Err(PipelineError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values for '{}'", covariate.len(), covariate.name),
            }
            .into());
        }
        if self.column(&covariate.name).is_some() {
            return Err(PipelineError::invalid(format!("duplicate column '{}'", covariate.name)).into());
        }
        self.columns.push(covariate);
        Ok(())
    }

    pub fn add_categorical(&mut self, name: &str, values: Vec<Option<String>>) -> anyhow::Result<()> {
        self.push(Covariate::categorical(name, values))
    }

    pub fn add_numeric(&mut self, name: &str, values: Vec<Option<f64>>) -> anyhow::Result<()> {
        self.push(Covariate::numeric(name, values))
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Covariate] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Covariate> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, sample_id: &str) -> Option<usize> {
        self.index.get(sample_id).copied()
    }

    pub fn contains_sample(&self, sample_id: &str) -> bool {
        self.index.contains_key(sample_id)
    }

    /// Look up several columns at once, reporting every missing one.
    pub fn require<S: AsRef<str>>(&self, names: &[S], context: &str) -> anyhow::Result<Vec<&Covariate>> {
        let missing: Vec<String> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| self.column(n).is_none())
            .map(|n| n.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema(context, missing).into());
        }
        Ok(names
            .iter()
            .filter_map(|n| self.column(n.as_ref()))
            .collect())
    }

    /// Rows for `sample_ids`, in that order.
    pub fn subset<S: AsRef<str>>(&self, sample_ids: &[S]) -> anyhow::Result<CovariateTable> {
        let mut rows = Vec::with_capacity(sample_ids.len());
        let mut missing = Vec::new();
        for id in sample_ids {
            match self.position(id.as_ref()) {
                Some(r) => rows.push(r),
                None => missing.push(id.as_ref().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::schema("covariate sample index", missing).into());
        }

        let mut table = CovariateTable::new(rows.iter().map(|&r| self.sample_ids[r].clone()).collect())?;
        table.columns = self.columns.iter().map(|c| c.take(&rows)).collect();
        Ok(table)
    }

    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> anyhow::Result<CovariateTable> {
        let picked = self.require(names, "covariate selection")?;
        let mut table = self.clone();
        table.columns = picked.into_iter().cloned().collect();
        Ok(table)
    }

    pub fn without_columns<S: AsRef<str>>(&self, names: &[S]) -> CovariateTable {
        let mut table = self.clone();
        table
            .columns
            .retain(|c| !names.iter().any(|n| n.as_ref() == c.name));
        table
    }

    /// Contingency table of `a` against `b` over samples where both are known.
    pub fn crosstab(&self, a: &str, b: &str) -> anyhow::Result<ContingencyTable> {
        let cols = self.require(&[a, b], "crosstab")?;
        let (ca, cb) = (cols[0], cols[1]);

        let mut pairs = Vec::new();
        for s in 0..self.n_samples() {
            if let (Some(la), Some(lb)) = (ca.label(s), cb.label(s)) {
                pairs.push((la, lb));
            }
        }

        let mut row_index: BTreeMap<&str, usize> = BTreeMap::new();
        let mut col_index: BTreeMap<&str, usize> = BTreeMap::new();
        for (la, lb) in &pairs {
            row_index.insert(la.as_str(), 0);
            col_index.insert(lb.as_str(), 0);
        }
        for (i, v) in row_index.values_mut().enumerate() {
            *v = i;
        }
        for (j, v) in col_index.values_mut().enumerate() {
            *v = j;
        }

        let mut counts = Array2::zeros((row_index.len(), col_index.len()));
        for (la, lb) in &pairs {
            counts[[row_index[la.as_str()], col_index[lb.as_str()]]] += 1.0;
        }

        Ok(ContingencyTable {
            row_variable: a.to_string(),
            col_variable: b.to_string(),
            row_levels: row_index.keys().map(|s| s.to_string()).collect(),
            col_levels: col_index.keys().map(|s| s.to_string()).collect(),
            counts,
        })
    }
}

/// Fetch sample metadata and clean it into a [`CovariateTable`].
pub fn load_covariates<S>(
    source: &S,
    dataset_id: &str,
    query: Option<&str>,
    config: &LoaderConfig,
) -> anyhow::Result<CovariateTable>
where
    S: DatasetSource + ?Sized,
{
    let raw = source
        .fetch(dataset_id, query)
        .map_err(|e| PipelineError::DataUnavailable {
            dataset: dataset_id.to_string(),
            reason: format!("{:#}", e),
        })?;
    covariates_from_table(&raw, config)
}

pub fn covariates_from_table(raw: &RawTable, config: &LoaderConfig) -> anyhow::Result<CovariateTable> {
    let dropped: HashSet<&str> = config.drop_columns.iter().map(|s| s.as_str()).collect();

    let mut missing = Vec::new();
    if raw.column_index(&config.index_column).is_none() {
        missing.push(config.index_column.clone());
    }
    for required in &config.required_columns {
        if dropped.contains(required.as_str()) || raw.column_index(required).is_none() {
            missing.push(required.clone());
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::schema("sample metadata", missing).into());
    }

    let is_missing = |s: &str| config.missing_tokens.iter().any(|t| t == s);

    let index_col = raw.column_index(&config.index_column).unwrap_or_default();
    let mut sample_ids = Vec::with_capacity(raw.n_rows());
    for (i, row) in raw.rows.iter().enumerate() {
        let id = row[index_col].trim();
        if is_missing(id) {
            return Err(PipelineError::invalid(format!("row {} has no sample id", i)).into());
        }
        sample_ids.push(id.to_string());
    }
    let mut table = CovariateTable::new(sample_ids)?;
    let canon = LabelCanonicalizer::from_config(&config.label_synonyms);

    let mut skipped = Vec::new();
    for (c, name) in raw.header.iter().enumerate() {
        if c == index_col {
            continue;
        }
        if dropped.contains(name.as_str()) {
            skipped.push(name.as_str());
            continue;
        }

        let mut values: Vec<Option<String>> = raw
            .rows
            .iter()
            .map(|row| {
                let v = row[c].trim();
                if is_missing(v) { None } else { Some(v.to_string()) }
            })
            .collect();
        let changed = canon.apply(name, &mut values);
        if changed > 0 {
            log::debug!("canonicalized {} labels in '{}'", changed, name);
        }

        table.push(infer_column(name, values))?;
    }

    log::debug!("dropped administrative columns: {:?}", skipped);
    log::info!(
        "loaded covariates: {} samples x {} columns",
        table.n_samples(),
        table.n_columns()
    );
    Ok(table)
}

fn infer_column(name: &str, values: Vec<Option<String>>) -> Covariate {
    let parsed: Vec<Option<Option<f64>>> = values
        .iter()
        .map(|v| match v {
            Some(s) => s.parse::<f64>().ok().filter(|x| x.is_finite()).map(Some),
            None => Some(None),
        })
        .collect();

    let any_known = values.iter().any(|v| v.is_some());
    if any_known && parsed.iter().all(|p| p.is_some()) {
        Covariate::numeric(name, parsed.into_iter().map(|p| p.flatten()).collect())
    } else {
        Covariate::categorical(name, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    impl DatasetSource for FailingSource {
        fn fetch(&self, _dataset_id: &str, _query: Option<&str>) -> anyhow::Result<RawTable> {
            anyhow::bail!("connection refused")
        }
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn raw_metadata() -> RawTable {
        RawTable::new(
            vec![s("decoratedName"), s("name"), s("donorsex"), s("diffnameshort"), s("ratio"), s("passqc")],
            vec![
                vec![s("S1"), s("f1"), s("M"), s("SC-LF"), s("0.5"), s("PASS")],
                vec![s("S2"), s("f2"), s("None"), s("SC"), s("0.7"), s("PASS")],
                vec![s("S3"), s("f3"), s("F"), s("SC-hpx"), s("None"), s("PASS")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn loader_cleans_metadata() {
        let table = covariates_from_table(&raw_metadata(), &LoaderConfig::default()).unwrap();
        assert_eq!(table.sample_ids(), &[s("S1"), s("S2"), s("S3")]);
        assert_eq!(table.column_names(), vec!["donorsex", "diffnameshort", "ratio"]);

        let sex = table.column("donorsex").unwrap();
        assert_eq!(sex.label(1), None);
        assert_eq!(sex.levels(), vec![s("F"), s("M")]);

        let diff = table.column("diffnameshort").unwrap();
        assert_eq!(diff.levels(), vec![s("SC")]);

        let ratio = table.column("ratio").unwrap();
        assert!(ratio.is_numeric());
        assert_eq!(ratio.number(0), Some(0.5));
        assert_eq!(ratio.number(2), None);
    }

    #[test]
    fn missing_required_columns_are_listed() {
        let mut config = LoaderConfig::default();
        config.required_columns = vec![s("donorsex"), s("cnv"), s("passqc")];
        let err = covariates_from_table(&raw_metadata(), &config).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, &vec![s("cnv"), s("passqc")]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn duplicate_sample_ids_rejected() {
        let raw = RawTable::new(
            vec![s("decoratedName"), s("x")],
            vec![vec![s("A"), s("1")], vec![s("A"), s("2")]],
        )
        .unwrap();
        let err = covariates_from_table(&raw, &LoaderConfig::default()).unwrap_err();
        let inner = err.downcast_ref::<PipelineError>().unwrap();
        assert!(inner.is_fatal());
        match inner {
            PipelineError::SchemaMismatch { missing, .. } => assert_eq!(missing, &vec![s("A")]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn fetch_failure_is_data_unavailable() {
        let err = load_covariates(&FailingSource, "syn2248030", None, &LoaderConfig::default())
            .unwrap_err();
        let inner = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(inner, PipelineError::DataUnavailable { dataset, .. } if dataset == "syn2248030"));
    }

    #[test]
    fn crosstab_excludes_unknowns_per_pair() {
        let mut table = CovariateTable::new(vec![s("a"), s("b"), s("c"), s("d")]).unwrap();
        table
            .add_categorical("A", vec![Some(s("x")), Some(s("x")), Some(s("y")), None])
            .unwrap();
        table
            .add_categorical("B", vec![Some(s("p")), Some(s("q")), Some(s("p")), Some(s("q"))])
            .unwrap();
        let ct = table.crosstab("A", "B").unwrap();
        assert_eq!(ct.row_levels, vec![s("x"), s("y")]);
        assert_eq!(ct.col_levels, vec![s("p"), s("q")]);
        assert_eq!(ct.total(), 3.0);
        assert_eq!(ct.counts[[0, 0]], 1.0);
        assert_eq!(ct.counts[[1, 1]], 0.0);
    }

    #[test]
    fn subset_reorders_and_checks_ids() {
        let mut table = CovariateTable::new(vec![s("a"), s("b"), s("c")]).unwrap();
        table.add_numeric("n", vec![Some(1.0), Some(2.0), Some(3.0)]).unwrap();
        let sub = table.subset(&["c", "a"]).unwrap();
        assert_eq!(sub.sample_ids(), &[s("c"), s("a")]);
        assert_eq!(sub.column("n").unwrap().number(0), Some(3.0));
        assert!(table.subset(&["z"]).is_err());
    }
}
