use crate::net::channel::ChannelConfig;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 14002;
pub const DEFAULT_SERVICE_NAME: &str = "DIRECT_FEED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Ping timeout offered to clients, in seconds.
    pub ping_timeout: u16,
    /// Lower bound for the negotiated ping timeout, in seconds.
    pub min_ping_timeout: u16,
    pub max_fragment_size: u32,
    /// Queued output in bytes above which the channel refuses further buffers.
    pub output_capacity: u32,
    pub accept_timeout_secs: u64,
    pub init_timeout_secs: u64,
    pub loop_timeout_ms: u64,
    pub max_clients: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub id: u16,
    pub vendor: String,
    pub host_name: String,
    pub application_id: String,
    pub application_name: String,
    /// Domains offered by the service.
    pub capabilities: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub field_file: String,
    pub enum_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    // Plain values have to precede the tables in TOML
    pub runtime_secs: u64,
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub dictionary: DictionaryConfig,
}

impl Default for ProviderConfig {
    fn default() -> ProviderConfig {
        ProviderConfig {
            runtime_secs: 300,
            server: ServerConfig {
                address: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                ping_timeout: 60,
                min_ping_timeout: 30,
                max_fragment_size: 6144,
                output_capacity: 262_144,
                accept_timeout_secs: 60,
                init_timeout_secs: 60,
                loop_timeout_ms: 1000,
                max_clients: 64,
            },
            service: ServiceConfig {
                name: DEFAULT_SERVICE_NAME.to_string(),
                id: 1,
                vendor: "Pulsar".to_string(),
                host_name: "localhost".to_string(),
                application_id: "256".to_string(),
                application_name: "iprovider".to_string(),
                capabilities: vec![5, 6, 7, 10, 22],
            },
            dictionary: DictionaryConfig {
                field_file: "RDMFieldDictionary".to_string(),
                enum_file: "enumtype.def".to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Load(serdeconv::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Load(err) => write!(f, "failed to load configuration: {}", err),
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serdeconv::Error> for ConfigError {
    #[inline]
    fn from(err: serdeconv::Error) -> Self {
        ConfigError::Load(err)
    }
}

impl ProviderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ProviderConfig, ConfigError> {
        let config: ProviderConfig = serdeconv::from_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml: &str) -> Result<ProviderConfig, ConfigError> {
        let config: ProviderConfig = serdeconv::from_toml_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        serdeconv::to_toml_string(self).map_err(Into::into)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_fragment_size < 64 {
            return Err(ConfigError::Invalid("max_fragment_size must be at least 64"));
        }

        if self.server.min_ping_timeout == 0 || self.server.ping_timeout < self.server.min_ping_timeout {
            return Err(ConfigError::Invalid("ping_timeout must be at least min_ping_timeout > 0"));
        }

        if self.server.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be positive"));
        }

        Ok(())
    }

    /// Rebases relative dictionary paths onto `install_dir` when they are missing from the
    /// working directory but present there.
    pub fn locate_files(&mut self, install_dir: &Path) {
        let dictionary = &mut self.dictionary;

        dictionary.field_file = locate(&dictionary.field_file, install_dir);
        dictionary.enum_file = locate(&dictionary.enum_file, install_dir);
    }

    #[inline]
    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            ping_timeout: Duration::from_secs(u64::from(self.server.ping_timeout)),
            min_ping_timeout: Duration::from_secs(u64::from(self.server.min_ping_timeout)),
            max_fragment_size: self.server.max_fragment_size as usize,
            output_capacity: self.server.output_capacity as usize,
        }
    }

    #[inline]
    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime_secs)
    }

    #[inline]
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_secs(self.server.accept_timeout_secs)
    }

    #[inline]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.server.init_timeout_secs)
    }

    #[inline]
    pub fn loop_timeout(&self) -> Duration {
        Duration::from_millis(self.server.loop_timeout_ms)
    }
}

/// The path itself if it resolves from the working directory, else the same name under
/// `install_dir` if that exists.
pub fn locate(path: &str, install_dir: &Path) -> String {
    let candidate = Path::new(path);

    if candidate.is_absolute() || candidate.exists() {
        return path.to_string();
    }

    let installed: PathBuf = install_dir.join(candidate);
    match installed.exists() {
        true => installed.to_string_lossy().into_owned(),
        false => path.to_string(),
    }
}
