//! Similarity and correlation measures between deviation sequences.
//!
//! Three measures feed the output matrices:
//! - banded DTW distance between two timeframes of the same asset,
//! - order-statistic distance between two assets on the same timeframe,
//! - Spearman rank correlation between two assets on the same timeframe.

use crate::domain::errors::EngineError;
use crate::domain::market::Matrix;
use std::cmp::Ordering;

/// Result of one DTW run. The cumulative matrix is kept so a configured
/// timeframe pair can be dumped for inspection.
#[derive(Debug, Clone)]
pub struct SelfSimilarity {
    pub distance: f64,
    pub cumulative: Matrix,
}

fn min3(a: f64, b: f64, c: f64) -> f64 {
    a.min(b).min(c)
}

/// Banded dynamic-time-warping distance between two price-deviation
/// sequences, normalized by the longer length.
///
/// Alignment paths whose index divergence reaches `band_width` are forbidden
/// outright: cells outside the band hold +infinity, so no path can cross
/// them.
pub fn self_similarity(
    dev_1: &[f64],
    dev_2: &[f64],
    band_width: usize,
) -> Result<SelfSimilarity, EngineError> {
    let n = dev_1.len();
    let m = dev_2.len();
    if n == 0 || m == 0 {
        return Err(EngineError::domain("empty deviation sequence in DTW"));
    }

    let mut distances = Matrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            distances.set(i, j, (dev_1[i] - dev_2[j]).abs());
        }
    }

    let mut cumulative = Matrix::zeros(n, m);
    cumulative.set(0, 0, distances.get(0, 0));
    for i in 1..n {
        cumulative.set(i, 0, distances.get(i, 0) + cumulative.get(i - 1, 0));
    }
    for j in 1..m {
        cumulative.set(0, j, distances.get(0, j) + cumulative.get(0, j - 1));
    }

    for i in 1..n {
        for j in 1..m {
            if (i as i64 - j as i64).abs() < band_width as i64 {
                let best = min3(
                    cumulative.get(i - 1, j - 1),
                    cumulative.get(i - 1, j),
                    cumulative.get(i, j - 1),
                );
                cumulative.set(i, j, distances.get(i, j) + best);
            } else {
                cumulative.set(i, j, f64::INFINITY);
            }
        }
    }

    let distance = cumulative.get(n - 1, m - 1) / n.max(m) as f64;
    Ok(SelfSimilarity {
        distance,
        cumulative,
    })
}

/// Aligned most-recent suffix of a deviation sequence, newest value first.
fn recent_suffix(devs: &[f64], size: usize) -> Vec<f64> {
    devs.iter().rev().take(size).copied().collect()
}

fn sort_ascending(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Distributional closeness of two assets' recent deviations: both aligned
/// suffixes are sorted independently and the element-wise absolute
/// differences averaged. Temporal alignment plays no part.
pub fn pair_similarity(dev_1: &[f64], dev_2: &[f64]) -> Result<f64, EngineError> {
    let size = dev_1.len().min(dev_2.len());
    if size == 0 {
        return Err(EngineError::domain("empty deviation sequence in pair similarity"));
    }

    let mut suffix_1 = recent_suffix(dev_1, size);
    let mut suffix_2 = recent_suffix(dev_2, size);
    sort_ascending(&mut suffix_1);
    sort_ascending(&mut suffix_2);

    let total: f64 = suffix_1
        .iter()
        .zip(&suffix_2)
        .map(|(a, b)| (a - b).abs())
        .sum();
    Ok(total / size as f64)
}

/// Spearman rank correlation of two assets' recent deviations.
///
/// Ranks are 1-based positions in the scan over the aligned suffixes; ties
/// keep scan order rather than being averaged.
pub fn pair_correlation(dev_1: &[f64], dev_2: &[f64]) -> Result<f64, EngineError> {
    let size = dev_1.len().min(dev_2.len());
    if size < 2 {
        return Err(EngineError::domain(
            "pair correlation needs at least two aligned values",
        ));
    }

    let rank_pairs = |devs: &[f64]| -> Vec<(f64, i64)> {
        let mut pairs: Vec<(f64, i64)> = recent_suffix(devs, size)
            .into_iter()
            .zip(1..)
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        pairs
    };

    let sorted_1 = rank_pairs(dev_1);
    let sorted_2 = rank_pairs(dev_2);

    let squared_rank_distance: f64 = sorted_1
        .iter()
        .zip(&sorted_2)
        .map(|(a, b)| ((a.1 - b.1) as f64).powi(2))
        .sum();

    let size = size as f64;
    Ok(1.0 - 6.0 * squared_rank_distance / (size * (size * size - 1.0)))
}
