use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed bitstream: {0}")]
    Bitstream(String),

    #[error("reference dependency violation: {0}")]
    Dependency(String),

    #[error("external codec failed: {0}")]
    Codec(String),

    #[error("frame store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// A truncated read while parsing the bitstream is a bitstream error,
    /// not a generic IO failure. The whole decode aborts on it.
    pub fn from_read(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::Bitstream(format!("unexpected end of stream while reading {what}"))
        } else {
            DecodeError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
