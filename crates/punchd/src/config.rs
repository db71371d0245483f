use std::path::PathBuf;

use punch_core::{LivenessConfig, SessionConfig};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file (users + attendance log).
    pub db_path: PathBuf,
    /// Path to the JSON encoding file holding the embedding gallery.
    pub encodings_path: PathBuf,
    /// Maximum embedding distance for a positive match (lower = stricter).
    pub tolerance: f32,
    /// Consecutive confirmed frames required before a toggle attempt.
    pub confirm_frames: u32,
    /// Minimum seconds between attendance events for one employee.
    pub min_punch_interval_secs: u64,
    /// Whether blink detection contributes to the liveness verdict.
    pub blink_detection: bool,
    /// Whether texture/color/movement detection contributes to the
    /// liveness verdict.
    pub movement_detection: bool,
    /// Whether the daemon registers on the session bus (development mode)
    /// instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `PUNCHD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("punchd");

        let db_path = std::env::var("PUNCHD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let encodings_path = std::env::var("PUNCHD_ENCODINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("encodings.json"));

        Self {
            db_path,
            encodings_path,
            tolerance: env_f32("PUNCHD_TOLERANCE", 0.6),
            confirm_frames: env_u32("PUNCHD_CONFIRM_FRAMES", 3),
            min_punch_interval_secs: env_u64("PUNCHD_MIN_PUNCH_INTERVAL_SECS", 30),
            blink_detection: env_flag("PUNCHD_BLINK_DETECTION", true),
            movement_detection: env_flag("PUNCHD_MOVEMENT_DETECTION", true),
            session_bus: std::env::var("PUNCHD_SESSION_BUS").is_ok(),
        }
    }

    /// Session tuning derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tolerance: self.tolerance,
            confirm_frames: self.confirm_frames,
            liveness: LivenessConfig {
                blink_detection: self.blink_detection,
                movement_detection: self.movement_detection,
                ..LivenessConfig::default()
            },
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
