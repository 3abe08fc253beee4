use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorFsError>;

#[derive(Error, Debug)]
pub enum MirrorFsError {
    #[error("Storage root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FUSE error: {0}")]
    Fuse(String),
}

impl From<toml::de::Error> for MirrorFsError {
    fn from(err: toml::de::Error) -> Self {
        MirrorFsError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = MirrorFsError::Config("unknown charset 'klingon'".to_string());
        assert_eq!(err.to_string(), "Config error: unknown charset 'klingon'");
    }

    #[test]
    fn test_toml_error_becomes_config_error() {
        let parse_err = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err: MirrorFsError = parse_err.into();
        assert!(matches!(err, MirrorFsError::Config(_)));
    }
}
