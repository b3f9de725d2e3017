use std::{error::Error, fmt, io, path::PathBuf};

/// Everything that can prevent the load balancer from starting up.
#[derive(Debug)]
pub enum ConfigurationError {
  InvalidAddress { address: String, reason: String },
  EmptyPool,
  InvalidLogLevel(String),
  Logging(String),
  Read { path: PathBuf, error: io::Error },
  Parse { path: PathBuf, error: toml::de::Error },
}

impl fmt::Display for ConfigurationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ConfigurationError::InvalidAddress { address, reason } => {
        write!(f, "invalid backend address {:?}: {}", address, reason)
      }
      ConfigurationError::EmptyPool => write!(f, "at least one backend address is required"),
      ConfigurationError::InvalidLogLevel(level) => write!(f, "invalid log level: {}", level),
      ConfigurationError::Logging(message) => write!(f, "failed to initialize logging: {}", message),
      ConfigurationError::Read { path, error } => {
        write!(f, "error occurred when reading configuration file {}: {}", path.display(), error)
      }
      ConfigurationError::Parse { path, error } => {
        write!(f, "error occurred when parsing configuration file {}: {}", path.display(), error)
      }
    }
  }
}

impl Error for ConfigurationError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ConfigurationError::Read { error, .. } => Some(error),
      ConfigurationError::Parse { error, .. } => Some(error),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerError {
  /// Every server of the pool was probed once and none of them is alive.
  AllServersDown,
}

impl fmt::Display for LoadBalancerError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      LoadBalancerError::AllServersDown => write!(f, "all backend servers are down"),
    }
  }
}

impl Error for LoadBalancerError {}
