use ndarray::ArrayView1;

/// Sorted distinct labels and, for each input position, the index of its label.
pub fn extract_levels<S: AsRef<str>>(labels: &[S]) -> (Vec<String>, Vec<usize>) {
    let mut levels: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
    levels.sort();
    levels.dedup();

    let codes = labels
        .iter()
        .map(|l| {
            levels
                .binary_search_by(|probe| probe.as_str().cmp(l.as_ref()))
                .unwrap_or_default()
        })
        .collect();

    (levels, codes)
}

/// Mean, sample standard deviation (n - 1) and count over the finite entries of `values`.
///
/// The standard deviation is `NaN` with fewer than two finite entries.
pub fn finite_mean_sd(values: ArrayView1<f64>) -> (f64, f64, usize) {
    let mut n = 0usize;
    let mut sum = 0.0;
    for &v in values.iter().filter(|v| v.is_finite()) {
        n += 1;
        sum += v;
    }
    if n == 0 {
        return (f64::NAN, f64::NAN, 0);
    }

    let mean = sum / n as f64;
    if n < 2 {
        return (mean, f64::NAN, n);
    }

    let ss: f64 = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v - mean) * (v - mean))
        .sum();
    (mean, (ss / (n - 1) as f64).sqrt(), n)
}
