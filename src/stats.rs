//! Small descriptive-statistics helpers shared by the estimation stages.
//!
//! All standard deviations here are population deviations (divide by `n`).

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Standard deviation of the mirrored population `X ∪ -X`.
///
/// Mirroring forces a zero mean, so one tail of a skewed signal yields its
/// own noise scale. Returns `None` when `values` is empty.
pub fn mirrored_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mirrored: Vec<f64> = values.iter().copied().chain(values.iter().map(|v| -v)).collect();
    population_std(&mirrored)
}

/// Running second moment of a mirrored population.
///
/// Equivalent to [`mirrored_std`] over everything pushed, but mergeable, so
/// per-day moments can be combined over sliding multi-day windows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MirroredMoments {
    sum_sq: f64,
    count: usize,
}

impl MirroredMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.sum_sq += value * value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &MirroredMoments) {
        self.sum_sq += other.sum_sq;
        self.count += other.count;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mirrored standard deviation, `None` if nothing was pushed.
    pub fn std(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum_sq / self.count as f64).sqrt())
    }
}

/// Percentile with linear interpolation between closest ranks
/// (`q` in `[0, 100]`). `None` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Weighted mean. Falls back to the plain mean when all weights are zero.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.is_empty() || values.len() != weights.len() {
        return None;
    }
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return mean(values);
    }
    let sum: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Some(sum / total_weight)
}
