//! Goodness-of-fit checks for the sampler tests.

/// Pearson's chi-square statistic of `counts` against the uniform distribution over
/// `counts.len()` categories.
pub fn chi_square(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    let expected = total as f64 / counts.len() as f64;
    counts
        .iter()
        .map(|&observed| {
            let diff = observed as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

/// Upper-tail standard normal quantile for a significance level of 0.001.
const Z_0_999: f64 = 3.090_232;

/// Critical value of the chi-square distribution with `df` degrees of freedom at a
/// significance level of 0.001, using the Wilson-Hilferty approximation.
pub fn chi_square_critical(df: usize) -> f64 {
    let k = df as f64;
    let c = 2.0 / (9.0 * k);
    k * (1.0 - c + Z_0_999 * c.sqrt()).powi(3)
}

/// Whether `counts` are consistent with a uniform distribution at significance 0.001.
pub fn looks_uniform(counts: &[u64]) -> bool {
    chi_square(counts) < chi_square_critical(counts.len() - 1)
}
