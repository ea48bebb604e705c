//! Application-level configuration loading: matchmaking band, expiry windows and sweep cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LINK_RACE_CONFIG_PATH";

const DEFAULT_RANK_BAND: u32 = 200;
const DEFAULT_QUEUE_MAX_AGE_MINUTES: u64 = 30;
const DEFAULT_CHALLENGE_TTL_HOURS: u64 = 24;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_MATCH_ATTEMPTS: u32 = 3;
const DEFAULT_RANDOM_PAIR_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rank_band: u32,
    queue_max_age: Duration,
    challenge_ttl: Duration,
    sweep_interval: Duration,
    max_match_attempts: u32,
    random_pair_attempts: u32,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rank_band = config.rank_band,
                        sweep_interval_secs = config.sweep_interval.as_secs(),
                        "loaded game rules from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Widest rank distance two queued players may have and still be paired.
    pub fn rank_band(&self) -> u32 {
        self.rank_band
    }

    /// Queue entries older than this are removed by the sweeper.
    pub fn queue_max_age(&self) -> Duration {
        self.queue_max_age
    }

    /// Lifetime of a pending challenge.
    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// How many times a join re-runs its search after losing a claim race.
    pub fn max_match_attempts(&self) -> u32 {
        self.max_match_attempts
    }

    /// How many draws are spent looking for a target distinct from the start topic.
    pub fn random_pair_attempts(&self) -> u32 {
        self.random_pair_attempts
    }

    pub fn with_rank_band(mut self, rank_band: u32) -> Self {
        self.rank_band = rank_band;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rank_band: DEFAULT_RANK_BAND,
            queue_max_age: minutes(DEFAULT_QUEUE_MAX_AGE_MINUTES),
            challenge_ttl: hours(DEFAULT_CHALLENGE_TTL_HOURS),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_match_attempts: DEFAULT_MAX_MATCH_ATTEMPTS,
            random_pair_attempts: DEFAULT_RANDOM_PAIR_ATTEMPTS,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    rank_band: u32,
    queue_max_age_minutes: u64,
    challenge_ttl_hours: u64,
    #[serde_as(as = "DurationSeconds<u64>")]
    sweep_interval_secs: Duration,
    max_match_attempts: u32,
    random_pair_attempts: u32,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            rank_band: DEFAULT_RANK_BAND,
            queue_max_age_minutes: DEFAULT_QUEUE_MAX_AGE_MINUTES,
            challenge_ttl_hours: DEFAULT_CHALLENGE_TTL_HOURS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL,
            max_match_attempts: DEFAULT_MAX_MATCH_ATTEMPTS,
            random_pair_attempts: DEFAULT_RANDOM_PAIR_ATTEMPTS,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            rank_band: value.rank_band,
            queue_max_age: minutes(value.queue_max_age_minutes),
            // A zero TTL would expire challenges on creation.
            challenge_ttl: hours(value.challenge_ttl_hours.max(1)),
            // A zero period would make the sweeper spin.
            sweep_interval: value.sweep_interval_secs.max(Duration::from_secs(1)),
            max_match_attempts: value.max_match_attempts.max(1),
            random_pair_attempts: value.random_pair_attempts.max(1),
        }
    }
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count * 60)
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count * 60 * 60)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
