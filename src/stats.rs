//! P-value estimation, multiple-testing correction and p-value combination.

/// Monte Carlo p-value with the +1 correction; never zero.
#[inline]
#[must_use]
pub fn empirical_p_value(num_extreme: usize, num_permutations: usize) -> f64 {
    (1 + num_extreme) as f64 / (1 + num_permutations) as f64
}

/// Benjamini-Hochberg adjusted p-values, in input order.
///
/// Matches R's `p.adjust(p, method = "BH")`: scale by `n / rank`, take the
/// cumulative minimum from the largest p-value down, clamp to 1.
#[must_use]
pub fn bh_fdr(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n_f = n as f64;
    let mut adjusted = vec![0.0; n];
    let mut prev = f64::INFINITY;
    for i in (0..n).rev() {
        let rank = (i + 1) as f64;
        let adj = (p_values[indices[i]] * n_f / rank).min(prev).min(1.0);
        adjusted[indices[i]] = adj;
        prev = adj;
    }
    adjusted
}

/// Survival function of the chi-squared distribution with `2k` degrees of freedom.
#[must_use]
pub fn chi2_sf_even(x: f64, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    if x <= 0.0 {
        return 1.0;
    }
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for i in 1..k {
        term *= half / i as f64;
        sum += term;
    }
    ((-half).exp() * sum).min(1.0)
}

/// Fisher's method: `-2 sum(ln p)` against chi-squared with `2k` degrees of freedom.
///
/// Empty input combines to 1.
#[must_use]
pub fn fishers_method(p_values: &[f64]) -> f64 {
    if p_values.is_empty() {
        return 1.0;
    }
    let x: f64 = -2.0 * p_values.iter().map(|p| p.ln()).sum::<f64>();
    chi2_sf_even(x, p_values.len())
}

/// Replace zero p-values by the smallest value `num_permutations` can resolve.
#[must_use]
pub fn clamp_p_values(p_values: &[f64], num_permutations: usize) -> Vec<f64> {
    let floor = 1.0 / (num_permutations as f64 + 1.0);
    p_values
        .iter()
        .map(|&p| if p <= 0.0 { floor } else { p })
        .collect()
}

/// Shannon entropy of `counts`, normalized by its maximum `ln(total)`.
///
/// Fewer than two events carry no positional information and give 1.
#[must_use]
pub fn normalized_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total < 2 {
        return 1.0;
    }
    let t = total as f64;
    let entropy: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / t;
            -p * p.ln()
        })
        .sum();
    entropy / t.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn p_value_bounds() {
        assert!((empirical_p_value(0, 999) - 0.001).abs() < TOL);
        assert!((empirical_p_value(999, 999) - 1.0).abs() < TOL);
        assert!((empirical_p_value(0, 0) - 1.0).abs() < TOL);
        for extreme in 0..=100 {
            let p = empirical_p_value(extreme, 100);
            assert!(p >= 1.0 / 101.0 && p <= 1.0);
        }
    }

    #[test]
    fn bh_known() {
        let p = [0.01, 0.04, 0.03, 0.005];
        let adj = bh_fdr(&p);
        assert!((adj[3] - 0.02).abs() < TOL);
        assert!((adj[0] - 0.02).abs() < TOL);
        assert!((adj[2] - 0.04).abs() < TOL);
        assert!((adj[1] - 0.04).abs() < TOL);
    }

    #[test]
    fn bh_monotonic_in_input_order() {
        let p = [0.1, 0.001, 0.05, 0.01, 0.5, 0.05];
        let adj = bh_fdr(&p);
        let mut pairs: Vec<(f64, f64)> = p.iter().copied().zip(adj.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(w[1].1 >= w[0].1 - TOL);
        }
        for (q, p) in adj.iter().zip(p) {
            assert!(*q >= p - TOL && *q <= 1.0);
        }
    }

    #[test]
    fn bh_edge_cases() {
        assert!(bh_fdr(&[]).is_empty());
        assert_eq!(bh_fdr(&[0.3]), vec![0.3]);
        assert_eq!(bh_fdr(&[0.9, 0.95]), vec![0.95, 0.95]);
    }

    #[test]
    fn chi2_matches_closed_forms() {
        // df = 2 is exponential with mean 2
        assert!((chi2_sf_even(3.0, 1) - (-1.5f64).exp()).abs() < TOL);
        assert!((chi2_sf_even(0.0, 3) - 1.0).abs() < TOL);
        // df = 4: exp(-x/2) (1 + x/2)
        assert!((chi2_sf_even(4.0, 2) - 3.0 * (-2.0f64).exp()).abs() < TOL);
    }

    #[test]
    fn fisher_combination() {
        assert!((fishers_method(&[0.2]) - 0.2).abs() < 1e-12);
        let expected = 0.0025 * (1.0 - 0.0025f64.ln());
        assert!((fishers_method(&[0.05, 0.05]) - expected).abs() < 1e-12);
        assert!((fishers_method(&[1.0, 1.0]) - 1.0).abs() < TOL);
        assert!((fishers_method(&[]) - 1.0).abs() < TOL);
    }

    #[test]
    fn zero_p_values_are_clamped() {
        let clamped = clamp_p_values(&[0.0, 0.5], 9);
        assert_eq!(clamped, vec![0.1, 0.5]);
        assert!(fishers_method(&clamped) > 0.0);
    }

    #[test]
    fn entropy_normalization() {
        assert!((normalized_entropy(&[1, 1, 1, 1]) - 1.0).abs() < TOL);
        assert!(normalized_entropy(&[4]).abs() < TOL);
        assert!((normalized_entropy(&[1]) - 1.0).abs() < TOL);
        assert!((normalized_entropy(&[]) - 1.0).abs() < TOL);
        let mid = normalized_entropy(&[3, 1]);
        assert!(mid > 0.0 && mid < 1.0);
    }
}
