use crate::{
  backend::{Server, SimpleServer},
  error::ConfigurationError,
  load_balancer::LoadBalancer,
};
use log::info;
use serde::Deserialize;
use std::{
  fs,
  net::SocketAddr,
  path::Path,
  sync::Arc,
};

const DEFAULT_PORT: u16 = 8001;
const DEFAULT_BACKENDS: [&str; 3] = [
  "https://www.github.com",
  "https://www.amazon.com",
  "https://www.medium.com",
];

/// Start-up configuration. Read once, there is no reload.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub listen_address: SocketAddr,
  pub backends: Vec<String>,
  pub client: ClientConfig,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      listen_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
      backends: DEFAULT_BACKENDS.iter().map(|backend| backend.to_string()).collect(),
      client: ClientConfig::default(),
    }
  }
}

/// Timeouts in milliseconds for the connections to the backends
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
  pub connect_timeout: u64,
  pub read_timeout: u64,
  pub write_timeout: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    ClientConfig {
      connect_timeout: 5_000,
      read_timeout: 30_000,
      write_timeout: 30_000,
    }
  }
}

impl Config {
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigurationError> {
    let path = path.as_ref();
    let toml_str = fs::read_to_string(path).map_err(|error| ConfigurationError::Read {
      path: path.to_path_buf(),
      error,
    })?;
    let config: Config = toml::from_str(&toml_str).map_err(|error| ConfigurationError::Parse {
      path: path.to_path_buf(),
      error,
    })?;

    info!("Successfully parsed configuration {}", path.display());
    Ok(config)
  }

  /// Applies command line arguments on top of the configuration.
  /// Backends given on the command line replace the configured ones.
  pub fn apply_overrides(&mut self, port: Option<u16>, backends: Vec<String>) {
    if let Some(port) = port {
      self.listen_address.set_port(port);
    }
    if !backends.is_empty() {
      self.backends = backends;
    }
  }

  /// Fails on the first malformed address, so a bad configuration never starts partially.
  pub fn build_load_balancer(&self) -> Result<LoadBalancer, ConfigurationError> {
    let servers = self
      .backends
      .iter()
      .map(|address| SimpleServer::new(address, &self.client).map(|server| Arc::new(server) as Arc<dyn Server>))
      .collect::<Result<Vec<_>, _>>()?;

    LoadBalancer::new(servers)
  }
}
