use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Platform API error: {0}")]
    Platform(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_websocket_error() {
        let err: AppError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, AppError::Other(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Io(_)));
        assert!(err.to_string().contains("file gone"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AppError::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn test_display_platform_variant() {
        let err = AppError::Platform("retcode 102".to_string());
        assert_eq!(err.to_string(), "Platform API error: retcode 102");
    }

    #[test]
    fn test_display_config_variant() {
        let err = AppError::Config("bad policy".to_string());
        assert_eq!(err.to_string(), "Config error: bad policy");
    }
}
