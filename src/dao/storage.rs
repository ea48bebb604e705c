use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
///
/// A conditional write that does not apply is not an error; backends report it as `false`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend returned a record that violates a model invariant.
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Wrap any backend failure as [`StorageError::Unavailable`].
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn unavailable_keeps_its_source() {
        let err = StorageError::unavailable(
            "ping failed".into(),
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.to_string(), "storage unavailable: ping failed");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("refused"));
    }
}
