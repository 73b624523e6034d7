use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Breathing exercise timing: inhale, hold, exhale, repeated `cycles` times.
#[derive(Debug, Clone, PartialEq)]
pub struct BreathingPattern {
    pub inhale: Duration,
    pub hold: Duration,
    pub exhale: Duration,
    pub cycles: u32,
}

impl Default for BreathingPattern {
    fn default() -> Self {
        Self {
            inhale: Duration::from_secs(4),
            hold: Duration::from_secs(4),
            exhale: Duration::from_secs(6),
            cycles: 3,
        }
    }
}

impl BreathingPattern {
    pub fn total(&self) -> Duration {
        (self.inhale + self.hold + self.exhale) * self.cycles
    }
}

/// Daily responder budget and the count at which the operator gets warned.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderQuota {
    pub daily_limit: u32,
    pub alert_threshold: u32,
}

impl Default for ResponderQuota {
    fn default() -> Self {
        Self { daily_limit: 50, alert_threshold: 49 }
    }
}

/// Tunables for the guided flows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub rating_min: u8,
    pub rating_max: u8,
    /// Ratings at or below this count as low distress.
    pub low_threshold: u8,
    /// Ratings at or above this get the urgent recommendation.
    pub high_threshold: u8,
    /// A drop of at least this much between two panic ratings counts as improvement.
    pub improvement_delta: u8,
    pub attempt_cap: u32,
    pub max_text_chars: usize,
    pub transcript_limit: usize,
    pub breathing: BreathingPattern,
    pub quota: ResponderQuota,
    pub session_idle: Option<Duration>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            rating_min: 0,
            rating_max: 10,
            low_threshold: 3,
            high_threshold: 8,
            improvement_delta: 2,
            attempt_cap: 2,
            max_text_chars: 2000,
            transcript_limit: 20,
            breathing: BreathingPattern::default(),
            quota: ResponderQuota::default(),
            session_idle: None,
        }
    }
}

impl FlowConfig {
    /// Read overrides from `CALMLINE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_secs(parse_or(&lookup, key, default.as_secs())?))
        };

        let idle_secs: u64 = parse_or(&lookup, "CALMLINE_SESSION_IDLE_SECS", 0)?;
        let config = Self {
            rating_min: parse_or(&lookup, "CALMLINE_RATING_MIN", d.rating_min)?,
            rating_max: parse_or(&lookup, "CALMLINE_RATING_MAX", d.rating_max)?,
            low_threshold: parse_or(&lookup, "CALMLINE_LOW_THRESHOLD", d.low_threshold)?,
            high_threshold: parse_or(&lookup, "CALMLINE_HIGH_THRESHOLD", d.high_threshold)?,
            improvement_delta: parse_or(&lookup, "CALMLINE_IMPROVEMENT_DELTA", d.improvement_delta)?,
            attempt_cap: parse_or(&lookup, "CALMLINE_ATTEMPT_CAP", d.attempt_cap)?,
            max_text_chars: parse_or(&lookup, "CALMLINE_MAX_TEXT_CHARS", d.max_text_chars)?,
            transcript_limit: parse_or(&lookup, "CALMLINE_TRANSCRIPT_LIMIT", d.transcript_limit)?,
            breathing: BreathingPattern {
                inhale: secs("CALMLINE_BREATH_INHALE_SECS", d.breathing.inhale)?,
                hold: secs("CALMLINE_BREATH_HOLD_SECS", d.breathing.hold)?,
                exhale: secs("CALMLINE_BREATH_EXHALE_SECS", d.breathing.exhale)?,
                cycles: parse_or(&lookup, "CALMLINE_BREATH_CYCLES", d.breathing.cycles)?,
            },
            quota: ResponderQuota {
                daily_limit: parse_or(&lookup, "CALMLINE_RESPONDER_DAILY_LIMIT", d.quota.daily_limit)?,
                alert_threshold: parse_or(
                    &lookup,
                    "CALMLINE_RESPONDER_ALERT_THRESHOLD",
                    d.quota.alert_threshold,
                )?,
            },
            session_idle: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rating_min >= self.rating_max {
            return Err(anyhow!(
                "rating range {}..={} is empty",
                self.rating_min,
                self.rating_max
            ));
        }
        let in_range = |v: u8| (self.rating_min..=self.rating_max).contains(&v);
        if !in_range(self.low_threshold) || !in_range(self.high_threshold) {
            return Err(anyhow!("thresholds must lie inside the rating range"));
        }
        if self.low_threshold >= self.high_threshold {
            return Err(anyhow!(
                "low threshold {} must be below high threshold {}",
                self.low_threshold,
                self.high_threshold
            ));
        }
        if self.attempt_cap == 0 {
            return Err(anyhow!("attempt cap must be at least 1"));
        }
        if self.breathing.cycles == 0 {
            return Err(anyhow!("breathing needs at least one cycle"));
        }
        if self.quota.alert_threshold > self.quota.daily_limit {
            return Err(anyhow!("responder alert threshold exceeds the daily limit"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = FlowConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FlowConfig::default());
        assert_eq!(config.breathing.total(), Duration::from_secs(42));
        assert!(config.session_idle.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = FlowConfig::from_lookup(lookup(&[
            ("CALMLINE_ATTEMPT_CAP", "4"),
            ("CALMLINE_BREATH_CYCLES", " 2 "),
            ("CALMLINE_SESSION_IDLE_SECS", "900"),
        ]))
        .unwrap();
        assert_eq!(config.attempt_cap, 4);
        assert_eq!(config.breathing.cycles, 2);
        assert_eq!(config.session_idle, Some(Duration::from_secs(900)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = FlowConfig::from_lookup(lookup(&[("CALMLINE_ATTEMPT_CAP", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CALMLINE_ATTEMPT_CAP"));
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let result = FlowConfig::from_lookup(lookup(&[
            ("CALMLINE_LOW_THRESHOLD", "8"),
            ("CALMLINE_HIGH_THRESHOLD", "3"),
        ]));
        assert!(result.is_err());
    }
}
