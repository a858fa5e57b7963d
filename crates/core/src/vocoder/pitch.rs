//! Normalised-autocorrelation pitch estimator.

/// Normalised correlation a lag must reach to count as voiced.
pub const VOICING_THRESHOLD: f64 = 0.5;

/// RMS (PCM units) below which a segment is treated as silence.
pub const SILENCE_RMS: f64 = 30.0;

/// Peaks within this ratio of the best one are preferred at shorter lags,
/// which keeps period doubling out of the estimate.
const PEAK_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Hz, or 0 when unvoiced.
    pub f0: f64,
    /// Correlation at the chosen lag, in [0, 1].
    pub periodicity: f64,
}

impl PitchEstimate {
    pub const UNVOICED: Self = Self {
        f0: 0.0,
        periodicity: 0.0,
    };

    pub fn is_voiced(&self) -> bool {
        self.f0 > 0.0
    }
}

fn correlation(segment: &[f64], lag: usize) -> f64 {
    let head = &segment[..segment.len() - lag];
    let tail = &segment[lag..];
    let (mut cross, mut head_energy, mut tail_energy) = (0.0, 0.0, 0.0);
    for (a, b) in head.iter().zip(tail) {
        cross += a * b;
        head_energy += a * a;
        tail_energy += b * b;
    }
    let denom = (head_energy * tail_energy).sqrt();
    if denom > 0.0 {
        cross / denom
    } else {
        0.0
    }
}

pub fn estimate(segment: &[f64], sample_rate: u32, min_f0: f64, max_f0: f64) -> PitchEstimate {
    if segment.is_empty() {
        return PitchEstimate::UNVOICED;
    }
    let rms = (segment.iter().map(|x| x * x).sum::<f64>() / segment.len() as f64).sqrt();
    if rms < SILENCE_RMS {
        return PitchEstimate::UNVOICED;
    }

    let fs = sample_rate as f64;
    let min_lag = ((fs / max_f0).ceil() as usize).max(1);
    let max_lag = ((fs / min_f0).floor() as usize).min(segment.len() / 2);
    if min_lag >= max_lag {
        return PitchEstimate::UNVOICED;
    }

    // One extra lag on each side so the range ends can be judged as peaks.
    let lo = min_lag.saturating_sub(1).max(1);
    let hi = max_lag + 1;
    let scores: Vec<(usize, f64)> = (lo..=hi).map(|lag| (lag, correlation(segment, lag))).collect();

    let best = scores
        .iter()
        .filter(|(lag, _)| (min_lag..=max_lag).contains(lag))
        .map(|&(_, r)| r)
        .fold(f64::NEG_INFINITY, f64::max);
    if best < VOICING_THRESHOLD {
        return PitchEstimate::UNVOICED;
    }

    let chosen = scores
        .windows(3)
        .map(|w| (w[1], w[0].1, w[2].1))
        .find(|&((lag, r), prev, next)| {
            (min_lag..=max_lag).contains(&lag) && r >= PEAK_RATIO * best && r >= prev && r >= next
        })
        .map(|((lag, r), _, _)| (lag, r))
        .or_else(|| {
            scores
                .iter()
                .copied()
                .filter(|(lag, _)| (min_lag..=max_lag).contains(lag))
                .find(|&(_, r)| r == best)
        });

    match chosen {
        Some((lag, r)) => PitchEstimate {
            f0: fs / lag as f64,
            periodicity: r.clamp(0.0, 1.0),
        },
        None => PitchEstimate::UNVOICED,
    }
}
