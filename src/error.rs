//! Error types for the connection path and for startup.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Outcome of driving one client's input. Every variant is terminal: the
/// server destroys the connection regardless of which one comes back.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Malformed(&'static str),

    #[error("end of file")]
    EndOfFile,

    #[error("quit")]
    Quit,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<irczt_reader::ReassembleError> for ClientError {
    fn from(e: irczt_reader::ReassembleError) -> Self {
        match e {
            irczt_reader::ReassembleError::EndOfFile => ClientError::EndOfFile,
            irczt_reader::ReassembleError::Malformed(m) => ClientError::Malformed(m),
            irczt_reader::ReassembleError::Io(e) => ClientError::Io(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid listen address {0:?}: {1}")]
    AddrParse(String, std::net::AddrParseError),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    #[error("readiness facility failure: {0}")]
    Poll(std::io::Error),
}
