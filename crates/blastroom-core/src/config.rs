//! Configuration loading and typed config structures for a Blastroom peer.
//!
//! The configuration lives in `blastroom.yaml`. Every field has a default,
//! so an empty file (or no file at all) describes a playable room. After
//! parsing, a few environment variables override the YAML:
//!
//! - `NATS_URL` overrides `nats_url`
//! - `BLASTROOM_ROOM` overrides `room`
//! - `BLASTROOM_PLAYER` overrides `player`

use std::path::Path;
use std::time::Duration;

use blastroom_net::ClientSettings;
use blastroom_types::Grid;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level peer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Room to join; also the primary channel name.
    #[serde(default = "default_room")]
    pub room: String,

    /// Local player identity, unique within the room.
    #[serde(default = "default_player")]
    pub player: String,

    /// Display attribute announced with the player.
    #[serde(default = "default_attribute")]
    pub attribute: String,

    /// Arena geometry.
    #[serde(default)]
    pub grid: GridConfig,

    /// Timer and animation durations.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Obstacle layout parameters.
    #[serde(default)]
    pub obstacles: ObstacleConfig,

    /// Queue sizes.
    #[serde(default)]
    pub queues: QueueConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            room: default_room(),
            player: default_player(),
            attribute: default_attribute(),
            grid: GridConfig::default(),
            timing: TimingConfig::default(),
            obstacles: ObstacleConfig::default(),
            queues: QueueConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with(yaml, |name| std::env::var(name).ok())
    }

    /// Like [`RoomConfig::parse`], reading overrides from `lookup` instead of
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse_with(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(lookup);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Replace fields with values from `lookup` (`NATS_URL`,
    /// `BLASTROOM_ROOM`, `BLASTROOM_PLAYER`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("NATS_URL") {
            self.nats_url = val;
        }
        if let Some(val) = lookup("BLASTROOM_ROOM") {
            self.room = val;
        }
        if let Some(val) = lookup("BLASTROOM_PLAYER") {
            self.player = val;
        }
    }

    /// Make the player name safe to embed in bomb names.
    ///
    /// Bomb names are `<player>-<suffix>` and the owner is everything before
    /// the first `-`, so the player name itself must not contain one.
    pub fn normalize(&mut self) {
        self.player = self.player.replace('-', "_");
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("room", &self.room, true)?;
        check_name("player", &self.player, false)?;
        self.grid()?;
        if self.obstacles.density_ratio == 0 {
            return Err(invalid("obstacles.density_ratio must be positive"));
        }
        if self.queues.outbound_capacity == 0 || self.queues.inbound_capacity == 0 {
            return Err(invalid("queue capacities must be positive"));
        }
        let t = &self.timing;
        for (field, value) in [
            ("timing.obstacle_refresh_ms", t.obstacle_refresh_ms),
            ("timing.push_interval_ms", t.push_interval_ms),
            ("timing.tick_ms", t.tick_ms),
        ] {
            if value == 0 {
                return Err(invalid(&format!("{field} must be positive")));
            }
        }
        Ok(())
    }

    /// The arena described by `grid.width` and `grid.height`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for empty or oversized grids.
    pub fn grid(&self) -> Result<Grid, ConfigError> {
        Grid::new(self.grid.width, self.grid.height).map_err(|e| invalid(&format!("grid: {e}")))
    }

    /// How long a lease survives without renewal.
    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.timing.obstacle_refresh_ms.saturating_mul(3))
    }

    /// Settings for the distribution client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the grid is unusable.
    pub fn client_settings(&self) -> Result<ClientSettings, ConfigError> {
        Ok(ClientSettings {
            room: self.room.clone(),
            identity: self.player.clone(),
            grid: self.grid()?,
            density_ratio: self.obstacles.density_ratio,
            obstacle_refresh: self.timing.obstacle_refresh(),
            outbound_capacity: self.queues.outbound_capacity,
            inbound_capacity: self.queues.inbound_capacity,
        })
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_owned())
}

/// Names become broker subjects and bucket keys: keep them to
/// `[A-Za-z0-9_]`, plus `-` where allowed.
fn check_name(field: &str, value: &str, allow_dash: bool) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(&format!("{field} must not be empty")));
    }
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-'));
    if ok {
        Ok(())
    } else {
        Err(invalid(&format!("{field} {value:?} contains unsupported characters")))
    }
}

/// Arena geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// Columns.
    #[serde(default = "default_grid_width")]
    pub width: u32,

    /// Rows.
    #[serde(default = "default_grid_height")]
    pub height: u32,

    /// Cells reached along each axis by an explosion.
    #[serde(default = "default_blast_length")]
    pub blast_length: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_width(),
            height: default_grid_height(),
            blast_length: default_blast_length(),
        }
    }
}

/// Timer and animation durations, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Delay between placing a bomb and its explosion.
    #[serde(default = "default_fuse_ms")]
    pub fuse_ms: u64,

    /// How long flames stay lethal after an explosion.
    #[serde(default = "default_flame_ms")]
    pub flame_ms: u64,

    /// Lease renewal and obstacle republish interval.
    #[serde(default = "default_obstacle_refresh_ms")]
    pub obstacle_refresh_ms: u64,

    /// Delay between steps of a pushed bomb.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    /// Maximum cells a pushed bomb travels.
    #[serde(default = "default_push_steps")]
    pub push_steps: u32,

    /// Interval between random bombs; zero disables them.
    #[serde(default = "default_random_bomb_ms")]
    pub random_bomb_ms: u64,

    /// Frame interval of the host loop.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl TimingConfig {
    /// Fuse duration.
    pub const fn fuse(&self) -> Duration {
        Duration::from_millis(self.fuse_ms)
    }

    /// Flame lifetime.
    pub const fn flame(&self) -> Duration {
        Duration::from_millis(self.flame_ms)
    }

    /// Obstacle refresh interval.
    pub const fn obstacle_refresh(&self) -> Duration {
        Duration::from_millis(self.obstacle_refresh_ms)
    }

    /// Push step interval.
    pub const fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    /// Random bomb interval, if enabled.
    pub const fn random_bomb(&self) -> Option<Duration> {
        if self.random_bomb_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.random_bomb_ms))
        }
    }

    /// Host frame interval.
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fuse_ms: default_fuse_ms(),
            flame_ms: default_flame_ms(),
            obstacle_refresh_ms: default_obstacle_refresh_ms(),
            push_interval_ms: default_push_interval_ms(),
            push_steps: default_push_steps(),
            random_bomb_ms: default_random_bomb_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

/// Obstacle layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ObstacleConfig {
    /// One cell in this many is an obstacle.
    #[serde(default = "default_density_ratio")]
    pub density_ratio: u32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            density_ratio: default_density_ratio(),
        }
    }
}

/// Queue sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Outbound events beyond this many are dropped.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Received events buffered between frames.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            inbound_capacity: default_inbound_capacity(),
        }
    }
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}
fn default_room() -> String {
    "lobby".to_owned()
}
fn default_player() -> String {
    "player".to_owned()
}
fn default_attribute() -> String {
    "fff".to_owned()
}
const fn default_grid_width() -> u32 {
    10
}
const fn default_grid_height() -> u32 {
    10
}
const fn default_blast_length() -> u32 {
    8
}
const fn default_fuse_ms() -> u64 {
    2000
}
const fn default_flame_ms() -> u64 {
    2000
}
const fn default_obstacle_refresh_ms() -> u64 {
    3000
}
const fn default_push_interval_ms() -> u64 {
    500
}
const fn default_push_steps() -> u32 {
    8
}
const fn default_random_bomb_ms() -> u64 {
    2000
}
const fn default_tick_ms() -> u64 {
    16
}
const fn default_density_ratio() -> u32 {
    5
}
const fn default_outbound_capacity() -> usize {
    20
}
const fn default_inbound_capacity() -> usize {
    256
}
