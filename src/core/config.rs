//! Battle configuration.
//!
//! `BattleConfig` holds every tunable the engine reads: health, mana, hand
//! sizes, timers and the turn-timeout policy. Defaults match the production
//! game settings; tests override fields with the `with_*` builders.
//!
//! ## Loading
//!
//! The server binary resolves configuration in three layers:
//!
//! 1. `BattleConfig::default()`
//! 2. A TOML file named by `CCG_ARENA_CONFIG` (every key optional)
//! 3. `CCG_ARENA_*` environment variables
//!
//! and validates the result.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_VAR: &str = "CCG_ARENA_CONFIG";

/// What happens when a turn timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnTimeoutPolicy {
    /// Notify the room only; the idle player keeps the turn.
    Advisory,
    /// Notify the room, then end the idle player's turn.
    AutoEndTurn,
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BattleConfig {
    /// Hit points every player starts with; also the hp ceiling.
    pub starting_health: u32,
    /// Mana at the start of the match.
    pub starting_mana: u32,
    /// Mana cap.
    pub max_mana: u32,
    /// Cards drawn into the opening hand.
    pub initial_hand_size: usize,
    /// Hand size cap.
    pub max_hand_size: usize,
    /// Largest deck accepted at the queue boundary.
    pub max_deck_size: usize,
    /// Turn timer duration.
    pub turn_timeout: Duration,
    /// No-accepted-action window before a session is abandoned.
    pub inactivity_timeout: Duration,
    /// Delay before the AI opponent acts.
    pub ai_turn_delay: Duration,
    pub turn_timeout_policy: TurnTimeoutPolicy,
    pub max_chat_length: usize,
    pub max_display_name: usize,
    /// Events buffered per connection before a slow reader is dropped.
    pub outbound_buffer: usize,
    /// Root seed for hand draws. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub listen_addr: SocketAddr,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            starting_health: 30,
            starting_mana: 1,
            max_mana: 10,
            initial_hand_size: 4,
            max_hand_size: 10,
            max_deck_size: 30,
            turn_timeout: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(5 * 60),
            ai_turn_delay: Duration::from_secs(2),
            turn_timeout_policy: TurnTimeoutPolicy::Advisory,
            max_chat_length: 200,
            max_display_name: 32,
            outbound_buffer: 256,
            seed: None,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

impl BattleConfig {
    /// Set starting (and maximum) health.
    #[must_use]
    pub fn with_starting_health(mut self, hp: u32) -> Self {
        self.starting_health = hp;
        self
    }

    /// Set starting mana.
    #[must_use]
    pub fn with_starting_mana(mut self, mana: u32) -> Self {
        self.starting_mana = mana;
        self
    }

    /// Set the mana cap.
    #[must_use]
    pub fn with_max_mana(mut self, mana: u32) -> Self {
        self.max_mana = mana;
        self
    }

    /// Set the opening hand size.
    #[must_use]
    pub fn with_initial_hand_size(mut self, size: usize) -> Self {
        self.initial_hand_size = size;
        self
    }

    /// Set the turn timer duration.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Set the inactivity window.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the AI think delay.
    #[must_use]
    pub fn with_ai_turn_delay(mut self, delay: Duration) -> Self {
        self.ai_turn_delay = delay;
        self
    }

    /// Set the turn-timeout policy.
    #[must_use]
    pub fn with_turn_timeout_policy(mut self, policy: TurnTimeoutPolicy) -> Self {
        self.turn_timeout_policy = policy;
        self
    }

    /// Set the per-connection event buffer.
    #[must_use]
    pub fn with_outbound_buffer(mut self, events: usize) -> Self {
        self.outbound_buffer = events;
        self
    }

        /// Set a deterministic seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load from `CCG_ARENA_CONFIG` and `CCG_ARENA_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load_with(path.as_deref().map(Path::new), |key| std::env::var(key).ok())
    }

    /// Load from an optional TOML file and an environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(path) = path {
            let text = std::fs::read_to_string(path)?;
            cfg.apply_file(toml::from_str(&text)?);
        }

        cfg.apply_env(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_file(toml::from_str(text)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.starting_health {
            self.starting_health = v;
        }
        if let Some(v) = file.starting_mana {
            self.starting_mana = v;
        }
        if let Some(v) = file.max_mana {
            self.max_mana = v;
        }
        if let Some(v) = file.initial_hand_size {
            self.initial_hand_size = v;
        }
        if let Some(v) = file.max_hand_size {
            self.max_hand_size = v;
        }
        if let Some(v) = file.max_deck_size {
            self.max_deck_size = v;
        }
        if let Some(v) = file.turn_timeout_secs {
            self.turn_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.inactivity_timeout_secs {
            self.inactivity_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.ai_turn_delay_ms {
            self.ai_turn_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.turn_timeout_policy {
            self.turn_timeout_policy = v;
        }
        if let Some(v) = file.max_chat_length {
            self.max_chat_length = v;
        }
        if let Some(v) = file.max_display_name {
            self.max_display_name = v;
        }
        if let Some(v) = file.outbound_buffer {
            self.outbound_buffer = v;
        }
        if let Some(v) = file.seed {
            self.seed = Some(v);
        }
        if let Some(v) = file.listen_addr {
            self.listen_addr = v;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| env(key).filter(|v| !v.is_empty());

        if let Some(v) = var("CCG_ARENA_STARTING_HEALTH") {
            self.starting_health = parse_var("CCG_ARENA_STARTING_HEALTH", &v)?;
        }
        if let Some(v) = var("CCG_ARENA_STARTING_MANA") {
            self.starting_mana = parse_var("CCG_ARENA_STARTING_MANA", &v)?;
        }
        if let Some(v) = var("CCG_ARENA_MAX_MANA") {
            self.max_mana = parse_var("CCG_ARENA_MAX_MANA", &v)?;
        }
        if let Some(v) = var("CCG_ARENA_INITIAL_HAND_SIZE") {
            self.initial_hand_size = parse_var("CCG_ARENA_INITIAL_HAND_SIZE", &v)?;
        }
        if let Some(v) = var("CCG_ARENA_TURN_TIMEOUT_SECS") {
            self.turn_timeout = Duration::from_secs(parse_var("CCG_ARENA_TURN_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("CCG_ARENA_INACTIVITY_TIMEOUT_SECS") {
            self.inactivity_timeout =
                Duration::from_secs(parse_var("CCG_ARENA_INACTIVITY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("CCG_ARENA_TURN_TIMEOUT_POLICY") {
            self.turn_timeout_policy = match v.to_ascii_lowercase().as_str() {
                "advisory" => TurnTimeoutPolicy::Advisory,
                "auto_end_turn" | "auto" => TurnTimeoutPolicy::AutoEndTurn,
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "CCG_ARENA_TURN_TIMEOUT_POLICY: unknown policy '{v}'"
                    )))
                }
            };
        }
        if let Some(v) = var("CCG_ARENA_SEED") {
            self.seed = Some(parse_var("CCG_ARENA_SEED", &v)?);
        }
        if let Some(v) = var("CCG_ARENA_LISTEN") {
            self.listen_addr = parse_var("CCG_ARENA_LISTEN", &v)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_health == 0 {
            return Err(ConfigError::Invalid("starting_health must be > 0".into()));
        }
        if self.max_mana == 0 || self.starting_mana > self.max_mana {
            return Err(ConfigError::Invalid(
                "starting_mana must not exceed max_mana (and max_mana must be > 0)".into(),
            ));
        }
        if self.initial_hand_size > self.max_hand_size {
            return Err(ConfigError::Invalid(
                "initial_hand_size must not exceed max_hand_size".into(),
            ));
        }
        if self.turn_timeout.is_zero() || self.inactivity_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// On-disk layout; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    starting_health: Option<u32>,
    starting_mana: Option<u32>,
    max_mana: Option<u32>,
    initial_hand_size: Option<usize>,
    max_hand_size: Option<usize>,
    max_deck_size: Option<usize>,
    turn_timeout_secs: Option<u64>,
    inactivity_timeout_secs: Option<u64>,
    ai_turn_delay_ms: Option<u64>,
    turn_timeout_policy: Option<TurnTimeoutPolicy>,
    max_chat_length: Option<usize>,
    max_display_name: Option<usize>,
    outbound_buffer: Option<usize>,
    seed: Option<u64>,
    listen_addr: Option<SocketAddr>,
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse '{value}'")))
}
