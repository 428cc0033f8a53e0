//! Pairwise correlation coefficients.
//!
//! All functions take two equally long sample vectors that are already
//! restricted to pairwise-complete observations, and return a finite value in
//! [-1, 1]. Undefined coefficients (fewer than two samples, zero variance)
//! are 0.

use std::cmp::Ordering;

/// Pearson product-moment correlation.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    if is_constant(&x[..n]) || is_constant(&y[..n]) {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    finish(sxy, sxx, syy)
}

/// Spearman rank correlation: Pearson over average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Kendall's tau-b, which corrects for ties in either variable.
pub fn kendall(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut tied_x = 0i64;
    let mut tied_y = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            match (dx == 0.0, dy == 0.0) {
                (true, true) => {}
                (true, false) => tied_x += 1,
                (false, true) => tied_y += 1,
                (false, false) => {
                    if (dx > 0.0) == (dy > 0.0) {
                        concordant += 1;
                    } else {
                        discordant += 1;
                    }
                }
            }
        }
    }
    let n_x = (concordant + discordant + tied_x) as f64;
    let n_y = (concordant + discordant + tied_y) as f64;
    let denom = (n_x * n_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    clamp_unit((concordant - discordant) as f64 / denom)
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end (0-based) share ranks start+1..=end
        let avg = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        start = end;
    }
    ranks
}

/// Pearson from centered sums; zero variance yields 0.
pub(crate) fn finish(sxy: f64, sxx: f64, syy: f64) -> f64 {
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let r = sxy / denom;
    if r.is_nan() {
        0.0
    } else {
        clamp_unit(r)
    }
}

#[inline]
pub(crate) fn clamp_unit(r: f64) -> f64 {
    r.clamp(-1.0, 1.0)
}

/// Whether every finite value of `values` is the same.
///
/// Decided on the raw values: centering a constant column whose mean is not
/// exactly representable leaves rounding residue, not zeros.
pub(crate) fn is_constant(values: &[f64]) -> bool {
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    match finite.next() {
        Some(first) => finite.all(|v| v == first),
        None => true,
    }
}

/// Restrict two columns to samples where both are present.
pub(crate) fn complete_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}
