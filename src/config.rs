//! Engine configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Thresholds that are part of the
//! business contract (absence counts of 2 and 3, homework weights, the
//! streak bonus rule) are fixed constants in their services and are
//! deliberately not configurable here.

/// Top-level engine configuration.
///
/// Loaded once at startup via [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the event outbox broadcast channel.
    pub event_bus_capacity: usize,

    /// Upper bound for any single points value; submissions above this are
    /// rejected as validation errors.
    pub max_points: i64,

    /// Number of leading entries carried by the rankings-changed event.
    pub ranking_top_n: usize,

    /// Behavioral incidents within one calendar month that trigger a
    /// behavioral warning.
    pub monthly_incident_threshold: usize,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or fails to
    /// parse. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000),
            max_points: parse_env("MAX_POINTS", 100_000),
            ranking_top_n: parse_env("RANKING_TOP_N", 10),
            monthly_incident_threshold: parse_env("MONTHLY_INCIDENT_THRESHOLD", 3),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: 10_000,
            max_points: 100_000,
            ranking_top_n: 10,
            monthly_incident_threshold: 3,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_from_env_without_vars() {
        let config = EngineConfig::default();
        assert_eq!(config.event_bus_capacity, 10_000);
        assert_eq!(config.max_points, 100_000);
        assert_eq!(config.ranking_top_n, 10);
        assert_eq!(config.monthly_incident_threshold, 3);
    }

    #[test]
    fn parse_env_falls_back_when_unset() {
        let parsed: usize = parse_env("FASEE7_TEST_UNSET_KEY", 42);
        assert_eq!(parsed, 42);
    }
}
