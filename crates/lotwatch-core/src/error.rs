//! Error taxonomy shared by the forecasting and RAG services.
//!
//! Collaborators (stores, embedders, model clients) report failures as
//! `anyhow::Error`; the services fold those into [`ServeError`] at their
//! boundary so the HTTP layer only has three cases to map.

/// Errors surfaced to callers of the serving layer.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// A required request field is missing, empty, or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// The forecasting model could not be loaded.
    ///
    /// Only produced at startup; a running server always holds a model.
    #[error("forecast model unavailable: {0}")]
    ModelUnavailable(String),

    /// The similarity store, embedder, or generative model failed.
    ///
    /// The message is generic and safe to return to clients.
    #[error("{0}")]
    Generation(String),
}

impl ServeError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServeError::InvalidInput(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        ServeError::Generation(message.into())
    }

    /// True for errors caused by the caller rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServeError::InvalidInput(_))
    }
}

pub type ServeResult<T> = std::result::Result<T, ServeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_client_error() {
        let err = ServeError::invalid_input("query is missing");
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "query is missing");
    }

    #[test]
    fn test_generation_is_server_error() {
        let err = ServeError::generation("failed to generate a response");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_model_unavailable_message() {
        let err = ServeError::ModelUnavailable("file not found".into());
        assert!(err.to_string().contains("file not found"));
        assert!(!err.is_client_error());
    }
}
