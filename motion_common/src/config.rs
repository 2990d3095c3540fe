//! Configuration structures for the motion server (§2.1, §3 `LoadedConfig`).
//!
//! All config types use `serde::Deserialize` for TOML loading. Numeric
//! parameters are bounds-checked in `validate`; optional fields use
//! `#[serde(default)]` for forward-compatible deserialization, following
//! the same conventions as the rest of this codebase's config layer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{
    INTERPOLATION_PERIOD_MS_DEFAULT, MAX_AXES_PER_GROUP, MAX_CONNECTIONS_DEFAULT,
    MOTION_START_CHECK_PERIOD_MS_DEFAULT, MOTION_START_TIMEOUT_MS_DEFAULT,
    MOTION_STOP_TIMEOUT_MS_DEFAULT, QUEUE_CAPACITY_DEFAULT, Q_LOCK_TIMEOUT_MS_DEFAULT,
};
use crate::error::ConfigError;

/// Top-level server configuration (§2.1).
///
/// Loaded from TOML at startup. Immutable once the Controller starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP address to listen on, e.g. "0.0.0.0:50240".
    pub listen_address: String,

    /// Interpolation period, in milliseconds (default: 4).
    #[serde(default = "default_period_ms")]
    pub interpolation_period_ms: u32,

    /// Increment queue capacity per group (default: 200).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum number of concurrently connected clients (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Queue mutex acquisition timeout, in milliseconds.
    #[serde(default = "default_q_lock_timeout_ms")]
    pub queue_lock_timeout_ms: u64,

    /// Bound on polling for servo-on / trajectory-mode-ready, in milliseconds.
    #[serde(default = "default_motion_start_timeout_ms")]
    pub motion_start_timeout_ms: u64,

    /// Period between motion-ready poll attempts, in milliseconds.
    #[serde(default = "default_motion_start_check_period_ms")]
    pub motion_start_check_period_ms: u64,

    /// Bound on polling for queues to drain during stop-motion, in milliseconds.
    #[serde(default = "default_motion_stop_timeout_ms")]
    pub motion_stop_timeout_ms: u64,
}

fn default_period_ms() -> u32 {
    INTERPOLATION_PERIOD_MS_DEFAULT
}
fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY_DEFAULT
}
fn default_max_connections() -> usize {
    MAX_CONNECTIONS_DEFAULT
}
fn default_q_lock_timeout_ms() -> u64 {
    Q_LOCK_TIMEOUT_MS_DEFAULT
}
fn default_motion_start_timeout_ms() -> u64 {
    MOTION_START_TIMEOUT_MS_DEFAULT
}
fn default_motion_start_check_period_ms() -> u64 {
    MOTION_START_CHECK_PERIOD_MS_DEFAULT
}
fn default_motion_stop_timeout_ms() -> u64 {
    MOTION_STOP_TIMEOUT_MS_DEFAULT
}

impl ServerConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpolation_period_ms == 0 {
            return Err(ConfigError::Validation(
                "interpolation_period_ms must be > 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Validation("queue_capacity must be > 0".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Validation("max_connections must be > 0".to_string()));
        }
        if self.listen_address.is_empty() {
            return Err(ConfigError::Validation("listen_address must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Per-group configuration (§3 `ControlGroup`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group index (0-based).
    pub group_no: u8,

    /// Human-readable name (e.g. "Arm", "Positioner").
    pub name: String,

    /// Number of active axes in this group, `1..=MAX_AXES_PER_GROUP`.
    pub num_axes: usize,

    /// Maximum per-cycle pulse increment, per axis.
    pub max_increment: [i32; MAX_AXES_PER_GROUP],

    /// Maximum axis speed [rad/s], per axis.
    pub max_speed: [f64; MAX_AXES_PER_GROUP],

    /// Pulse-per-radian conversion factor, per axis.
    pub pulse_per_radian: [f64; MAX_AXES_PER_GROUP],

    /// Whether axis index 2 (B) is mechanically slaved to axes 0 and 1 (L, U).
    #[serde(default)]
    pub b_axis_slave: bool,
}

impl GroupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_axes == 0 || self.num_axes > MAX_AXES_PER_GROUP {
            return Err(ConfigError::Validation(format!(
                "group {} num_axes {} out of range [1, {}]",
                self.group_no, self.num_axes, MAX_AXES_PER_GROUP
            )));
        }
        for i in 0..self.num_axes {
            if self.max_speed[i] <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "group {} axis {} max_speed must be > 0",
                    self.group_no, i
                )));
            }
            if self.pulse_per_radian[i] <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "group {} axis {} pulse_per_radian must be > 0",
                    self.group_no, i
                )));
            }
        }
        Ok(())
    }
}

/// The fully parsed and validated configuration (§3 `LoadedConfig`).
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub groups: Vec<GroupConfig>,
}

/// Raw deserialization shape of `motion_server.toml` before cross-field validation.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    server: ServerConfig,
    #[serde(default)]
    groups: Vec<GroupConfig>,
}

impl LoadedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.groups.is_empty() {
            return Err(ConfigError::Validation("at least one group is required".to_string()));
        }
        for g in &self.groups {
            g.validate()?;
        }
        Ok(())
    }
}

/// Load and validate configuration from a TOML file on disk.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    load_config_from_str(&text)
}

/// Load and validate configuration from an in-memory TOML string (used by tests).
pub fn load_config_from_str(text: &str) -> Result<LoadedConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let config = LoadedConfig {
        server: raw.server,
        groups: raw.groups,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen_address = "0.0.0.0:50240"
        interpolation_period_ms = 4

        [[groups]]
        group_no = 0
        name = "Arm"
        num_axes = 6
        max_increment = [500, 500, 500, 500, 500, 500, 0, 0]
        max_speed = [3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 0.0, 0.0]
        pulse_per_radian = [10000.0, 10000.0, 10000.0, 10000.0, 10000.0, 10000.0, 1.0, 1.0]
    "#;

    #[test]
    fn loads_valid_config() {
        let cfg = load_config_from_str(SAMPLE).unwrap();
        assert_eq!(cfg.server.interpolation_period_ms, 4);
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].num_axes, 6);
    }

    #[test]
    fn rejects_zero_period() {
        let bad = SAMPLE.replace("interpolation_period_ms = 4", "interpolation_period_ms = 0");
        let err = load_config_from_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_no_groups() {
        let bad = r#"
            [server]
            listen_address = "0.0.0.0:50240"
        "#;
        let err = load_config_from_str(bad).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_bad_axis_bounds() {
        let bad = SAMPLE.replace("num_axes = 6", "num_axes = 0");
        let err = load_config_from_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn applies_defaults() {
        let minimal = r#"
            [server]
            listen_address = "127.0.0.1:50240"

            [[groups]]
            group_no = 0
            name = "Arm"
            num_axes = 1
            max_increment = [500, 0, 0, 0, 0, 0, 0, 0]
            max_speed = [3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            pulse_per_radian = [10000.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        "#;
        let cfg = load_config_from_str(minimal).unwrap();
        assert_eq!(cfg.server.interpolation_period_ms, INTERPOLATION_PERIOD_MS_DEFAULT);
        assert_eq!(cfg.server.queue_capacity, QUEUE_CAPACITY_DEFAULT);
    }
}
