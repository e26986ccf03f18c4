use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::progress::TRANSFER_CEILING;

/// Fake upload trickle for the gap before byte-level progress shows up.
///
/// Emits a non-decreasing percent on the upload band every tick, using
/// random increments of up to `max_step`, until it reaches the ceiling or
/// `stop` is cancelled (a real transfer signal arrived).
pub struct LocalPhaseSimulator {
    tick: Duration,
    max_step: f64,
    rng: StdRng,
}

impl LocalPhaseSimulator {
    pub fn new(tick: Duration, max_step: f64) -> Self {
        Self {
            tick,
            max_step,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic increments, for tests
    pub fn with_seed(tick: Duration, max_step: f64, seed: u64) -> Self {
        Self {
            tick,
            max_step,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Run until the ceiling is reached or `stop` fires. Returns the last emitted percent.
    pub async fn run<F>(mut self, stop: CancellationToken, mut emit: F) -> u8
    where
        F: FnMut(u8),
    {
        let ceiling = f64::from(TRANSFER_CEILING);
        let mut current = 0.0_f64;
        let mut last = 0u8;

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::debug!(percent = last, "simulator superseded");
                    return last;
                }
                _ = tokio::time::sleep(self.tick) => {}
            }

            current += self.rng.gen::<f64>() * self.max_step;
            if current >= ceiling {
                emit(TRANSFER_CEILING);
                return TRANSFER_CEILING;
            }

            let percent = current.floor() as u8;
            if percent > last {
                last = percent;
                emit(percent);
            }
        }
    }
}
