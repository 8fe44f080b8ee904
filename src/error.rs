//! Error types for configuration loading and placeholder resolution

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetloginError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed network config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid profile for network '{network}': {reason}")]
    InvalidProfile { network: String, reason: String },

    #[error("No configuration for network: {0}")]
    UnknownNetwork(String),

    /// Only raised by non-Linux builds
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    #[error("not implemented on this platform: {0}")]
    Unsupported(&'static str),

    #[error("could not resolve {what}: {reason}")]
    Resolve { what: &'static str, reason: String },
}

pub type NetloginResult<T> = Result<T, NetloginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = NetloginError::Unsupported("client MAC address lookup");
        assert_eq!(
            err.to_string(),
            "not implemented on this platform: client MAC address lookup"
        );

        let err = NetloginError::Read {
            path: PathBuf::from("/etc/netlogin/networks.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err
            .to_string()
            .starts_with("failed to read /etc/netlogin/networks.json: "));
    }
}
