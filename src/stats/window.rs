//! Bounded sample windows and order statistics

use std::collections::VecDeque;

/// Interpolated percentile of `samples`, `p` in `0..=100`
///
/// Sorts a copy and interpolates linearly between the two bracketing ranks,
/// so `percentile(&[10., 20., 30., 40.], 50.)` is `25`. Returns `None` for an
/// empty slice.
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let p = if p.is_nan() { 50.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Arithmetic mean, `None` when empty
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Fixed-capacity window of samples; the oldest sample is evicted on overflow
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.to_vec(), p)
    }

    pub fn mean(&self) -> Option<f64> {
        mean(&self.to_vec())
    }
}

/// Simple moving average over the last `span` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: SampleWindow,
}

impl MovingAverage {
    pub fn new(span: usize) -> Self {
        Self {
            window: SampleWindow::new(span),
        }
    }

    /// Add a value and return the updated average
    pub fn push(&mut self, value: f64) -> f64 {
        self.window.push(value);
        self.value().unwrap_or(value)
    }

    pub fn value(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
