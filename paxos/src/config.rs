//! Proposer tuning knobs.

use std::{convert::TryFrom, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with jitter between failed rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff after the first failed round.
    pub initial: Duration,
    /// Upper bound before jitter.
    pub max: Duration,
    /// Growth per failed round.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Backoff after `failures` failed rounds, scaled by 50% to 150%.
    pub fn duration(&self, failures: u32, rng: &mut impl Rng) -> Duration {
        let exp = i32::try_from(failures).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exp);
        let capped = base.min(self.max.as_secs_f64());
        Duration::from_secs_f64(capped * rng.gen_range(0.5..1.5))
    }
}

/// Configuration of a [`Paxos`](crate::Paxos) peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ballot numbers of peer `i` are `i + k * stride`, so a cluster may hold
    /// at most `stride` peers.
    pub stride: i64,
    /// Attempts per peer per round before the peer is skipped for the round.
    pub call_retries: u32,
    /// Pause between attempts to the same peer.
    pub retry_interval: Duration,
    /// Backoff between failed rounds.
    pub backoff: BackoffConfig,
    /// Extra backoff factor when the competing ballot belongs to a peer with a
    /// greater index.
    pub rival_penalty: f64,
    /// Pause between rounds of decide notifications.
    pub decide_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stride: 10000,
            call_retries: 3,
            retry_interval: Duration::from_millis(10),
            backoff: BackoffConfig::default(),
            rival_penalty: 2.0,
            decide_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_backoff_bounds() {
        let backoff = BackoffConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for failures in 0..64 {
            let d = backoff.duration(failures, &mut rng);
            assert!(d >= Duration::from_millis(5), "{:?}", d);
            assert!(d <= Duration::from_millis(1500), "{:?}", d);
        }
    }

    #[test]
    fn test_backoff_grows() {
        let backoff = BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        };
        let mut rng = StdRng::seed_from_u64(1);
        // Jitter ranges of round 0 and round 3 do not overlap.
        assert!(backoff.duration(0, &mut rng) < Duration::from_millis(15));
        assert!(backoff.duration(3, &mut rng) >= Duration::from_millis(40));
    }

    #[test]
    fn test_config_serde() {
        let config = Config::default();
        let s = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&s).unwrap();
        assert_eq!(config, back);
    }
}
