use crate::error::BridgeError;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_ENV: &str = "PULSEJACK_CONFIG";
pub const CLIENT_NAME_ENV: &str = "PULSEJACK_CLIENT_NAME";
pub const NO_START_SERVER_ENV: &str = "PULSEJACK_NO_START_SERVER";
pub const RT_PRIORITY_ENV: &str = "PULSEJACK_RT_PRIORITY";
pub const NO_MIRROR_ENV: &str = "PULSEJACK_NO_MIRROR";
pub const PULSE_SERVER_ENV: &str = "PULSEJACK_PULSE_SERVER";

fn parse_flag(value: &str) -> bool {
    let s = value.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// JACK client name; also the PulseAudio application name.
    pub client_name: String,
    /// JACK client whose connections get mirrored.
    pub system_client: String,
    pub start_server: bool,
    pub server_command: Vec<String>,
    pub server_retries: u32,
    pub server_retry_delay_ms: u64,
    /// SCHED_FIFO priority for the PulseAudio mainloop thread, 0 disables.
    pub realtime_priority: i32,
    pub mirror_connections: bool,
    pub pulse_server: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: "JACK over PulseAudio".to_string(),
            system_client: "system".to_string(),
            start_server: true,
            server_command: ["jackd", "-T", "-d", "dummy", "-p", "1024"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            server_retries: 5,
            server_retry_delay_ms: 1000,
            realtime_priority: 10,
            mirror_connections: true,
            pulse_server: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml(text: &str) -> Result<Self, BridgeError> {
        toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Loads `path` (or `PULSEJACK_CONFIG` when no path is given) and applies
    /// the environment overrides. With neither, the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, BridgeError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(std::path::PathBuf::from);
        let mut config = match path.or(from_env.as_deref()) {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), BridgeError> {
        if let Some(name) = lookup(CLIENT_NAME_ENV) {
            self.client_name = name;
        }
        if lookup(NO_START_SERVER_ENV).is_some_and(|v| parse_flag(&v)) {
            self.start_server = false;
        }
        if lookup(NO_MIRROR_ENV).is_some_and(|v| parse_flag(&v)) {
            self.mirror_connections = false;
        }
        if let Some(prio) = lookup(RT_PRIORITY_ENV) {
            self.realtime_priority = prio.trim().parse().map_err(|e| {
                BridgeError::Config(format!("{RT_PRIORITY_ENV}={prio:?}: {e}"))
            })?;
        }
        if let Some(server) = lookup(PULSE_SERVER_ENV) {
            self.pulse_server = Some(server);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.client_name.trim().is_empty() {
            return Err(BridgeError::Config("client_name is empty".to_string()));
        }
        if self.client_name.contains(':') {
            return Err(BridgeError::Config(format!(
                "client_name {:?} contains ':'",
                self.client_name
            )));
        }
        if self.start_server && self.server_command.is_empty() {
            return Err(BridgeError::Config(
                "start_server is set but server_command is empty".to_string(),
            ));
        }
        if !(0..=99).contains(&self.realtime_priority) {
            return Err(BridgeError::Config(format!(
                "realtime_priority {} is outside 0..=99",
                self.realtime_priority
            )));
        }
        Ok(())
    }
}
