use std::time::Duration;

use common::{CadenceConfig, SessionConfig, SettlementMode};

/// Derives the decision-generation period from the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadencePolicy {
    /// `max(min_period, expiry × per_expiry_sec)`.
    Scaled {
        expiry_secs: u64,
        min_period: Duration,
        per_expiry_sec: Duration,
    },
    /// Period used as configured.
    Fixed { interval: Duration },
}

impl CadencePolicy {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        match cfg.mode {
            SettlementMode::Binary => Self::scaled(cfg.expiry_secs, &cfg.cadence),
            SettlementMode::Position => Self::Fixed {
                interval: Duration::from_secs(cfg.interval_secs),
            },
        }
    }

    pub fn scaled(expiry_secs: u64, cadence: &CadenceConfig) -> Self {
        Self::Scaled {
            expiry_secs,
            min_period: Duration::from_millis(cadence.min_period_ms),
            per_expiry_sec: Duration::from_millis(cadence.ms_per_expiry_sec),
        }
    }

    pub fn period(&self) -> Duration {
        match *self {
            Self::Scaled {
                expiry_secs,
                min_period,
                per_expiry_sec,
            } => {
                let factor = u32::try_from(expiry_secs).unwrap_or(u32::MAX);
                let scaled = per_expiry_sec.saturating_mul(factor);
                // A zero period would spin the scheduler.
                scaled.max(min_period).max(Duration::from_millis(1))
            }
            Self::Fixed { interval } => interval.max(Duration::from_millis(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_expiry_hits_floor() {
        let policy = CadencePolicy::scaled(30, &CadenceConfig::default());
        assert_eq!(policy.period(), Duration::from_millis(15_000));

        let policy = CadencePolicy::scaled(5, &CadenceConfig::default());
        assert_eq!(policy.period(), Duration::from_millis(5_000));
    }

    #[test]
    fn long_expiry_scales() {
        let policy = CadencePolicy::scaled(300, &CadenceConfig::default());
        assert_eq!(policy.period(), Duration::from_secs(150));
    }

    #[test]
    fn position_mode_uses_interval() {
        let cfg = SessionConfig {
            mode: SettlementMode::Position,
            interval_secs: 7,
            ..SessionConfig::default()
        };
        assert_eq!(CadencePolicy::from_config(&cfg).period(), Duration::from_secs(7));
    }

    #[test]
    fn zero_configuration_never_yields_zero_period() {
        let cadence = CadenceConfig {
            min_period_ms: 0,
            ms_per_expiry_sec: 0,
        };
        assert!(CadencePolicy::scaled(60, &cadence).period() > Duration::ZERO);
    }
}
