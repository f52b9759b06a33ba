use crate::session::DEFAULT_SESSION_TIMEOUT;
use rccar_shared::{Profile, ProfileError};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Profile file picked up from the working directory when none is configured.
pub const DEFAULT_PROFILE_PATH: &str = "profile.json";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Simulation steps per second; each step advances 1/tick_rate_hz of simulated time
    pub tick_rate_hz: u32,
    /// Silence after which a session is reclaimed
    pub session_timeout: Duration,
    /// Explicit profile document. `None` falls back to ./profile.json, then defaults.
    pub profile_path: Option<PathBuf>,
    /// Client asset directory served at `/`
    pub assets_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            tick_rate_hz: 1000,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            profile_path: None,
            assets_dir: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `RCCAR_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(addr) = lookup("RCCAR_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(raw) = lookup("RCCAR_TICK_HZ") {
            config.tick_rate_hz = raw
                .parse()
                .map_err(|_| format!("RCCAR_TICK_HZ must be an integer, got '{raw}'"))?;
        }
        if let Some(raw) = lookup("RCCAR_SESSION_TIMEOUT") {
            let secs: f64 = raw
                .parse()
                .map_err(|_| format!("RCCAR_SESSION_TIMEOUT must be seconds, got '{raw}'"))?;
            config.session_timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| format!("RCCAR_SESSION_TIMEOUT out of range: '{raw}'"))?;
        }
        config.profile_path = lookup("RCCAR_PROFILE").map(PathBuf::from);
        config.assets_dir = lookup("RCCAR_ASSETS").map(PathBuf::from);
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".into());
        }
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".into());
        }
        if self.session_timeout.is_zero() {
            return Err("session_timeout must be > 0".into());
        }
        if self.session_timeout < self.tick_duration() {
            return Err("session_timeout must be at least one tick".into());
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }

    /// Resolve and validate the vehicle/world profile.
    pub fn load_profile(&self) -> Result<Profile, ProfileError> {
        let profile = match &self.profile_path {
            Some(path) => Profile::load(path)?,
            None if Path::new(DEFAULT_PROFILE_PATH).is_file() => {
                Profile::load(DEFAULT_PROFILE_PATH)?
            }
            None => Profile::default(),
        };
        profile.validate().map_err(ProfileError::Invalid)?;
        Ok(profile)
    }
}
