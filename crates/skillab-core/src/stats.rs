//! Statistical engine: bootstrap confidence intervals, significance and
//! Wilson score intervals.
//!
//! Everything here is pure and deterministic; the bootstrap draws from a
//! seeded splitmix64 stream so the same input and seed reproduce the same
//! interval bit for bit.

use crate::domain::ConfidenceInterval;

pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 10_000;
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
pub const DEFAULT_SEED: u64 = 0x5EED_5C1A_B000_0001;

/// Deterministic splitmix64 generator.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform index in `0..n`. `n` must be nonzero.
    pub fn index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sanitize_level(level: f64) -> f64 {
    if level > 0.0 && level < 1.0 {
        level
    } else {
        DEFAULT_CONFIDENCE_LEVEL
    }
}

/// Percentile-bootstrap confidence interval for the mean of `data`.
///
/// Empty input yields `[0, 0]`; a single observation yields a point
/// interval; zero iterations fall back to the default count.
pub fn bootstrap_ci(data: &[f64], level: f64, iterations: usize, seed: u64) -> ConfidenceInterval {
    let level = sanitize_level(level);
    match data {
        [] => {
            return ConfidenceInterval {
                low: 0.0,
                high: 0.0,
                level,
            }
        }
        [only] => {
            return ConfidenceInterval {
                low: *only,
                high: *only,
                level,
            }
        }
        _ => {}
    }

    let iterations = if iterations == 0 {
        DEFAULT_BOOTSTRAP_ITERATIONS
    } else {
        iterations
    };
    let n = data.len();
    let mut rng = SeededRng::new(seed);
    let mut means = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let mut sum = 0.0;
        for _ in 0..n {
            sum += data[rng.index(n)];
        }
        means.push(sum / n as f64);
    }
    means.sort_by(f64::total_cmp);

    let alpha = 1.0 - level;
    let last = iterations - 1;
    let low_idx = ((iterations as f64) * (alpha / 2.0)).floor() as usize;
    let high_idx = (((iterations as f64) * (1.0 - alpha / 2.0)).ceil() as usize).saturating_sub(1);
    let high_idx = high_idx.min(last);

    ConfidenceInterval {
        low: means[low_idx.min(high_idx)],
        high: means[high_idx],
        level,
    }
}

/// An interval is significant when it excludes zero. Touching zero is not.
pub fn is_statistically_significant(ci: &ConfidenceInterval) -> bool {
    ci.low > 0.0 || ci.high < 0.0
}

/// Two-sided z for the supported confidence levels; 1.96 otherwise.
pub fn z_for_level(level: f64) -> f64 {
    const TABLE: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];
    TABLE
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(1.96)
}

/// Wilson score interval for a binomial proportion, clamped to [0, 1].
pub fn wilson_interval(successes: u64, total: u64, level: f64) -> ConfidenceInterval {
    let level = sanitize_level(level);
    if total == 0 {
        return ConfidenceInterval {
            low: 0.0,
            high: 0.0,
            level,
        };
    }
    let n = total as f64;
    let p = successes.min(total) as f64 / n;
    let z = z_for_level(level);
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;

    ConfidenceInterval {
        low: (center - margin).clamp(0.0, 1.0),
        high: (center + margin).clamp(0.0, 1.0),
        level,
    }
}
