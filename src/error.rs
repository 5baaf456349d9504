use thiserror::Error;

/// Main error type for quire operations
#[derive(Error, Debug)]
pub enum QuireError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Index corruption: {0}")]
    Corruption(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Term too long: {length} bytes (max {max})")]
    TermTooLong { length: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for quire operations
pub type Result<T> = std::result::Result<T, QuireError>;

impl QuireError {
    /// Check if this error indicates a transient failure the caller may retry.
    ///
    /// Only directory failures qualify; nothing inside the crate retries.
    pub fn is_retriable(&self) -> bool {
        matches!(self, QuireError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuireError::UnknownFormat("Missing".to_string());
        assert_eq!(err.to_string(), "Unknown format: Missing");

        let err = QuireError::TermTooLong {
            length: 40000,
            max: 32766,
        };
        assert_eq!(err.to_string(), "Term too long: 40000 bytes (max 32766)");
    }

    #[test]
    fn test_retriable_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(QuireError::Io(io).is_retriable());
        assert!(!QuireError::Config("no format".to_string()).is_retriable());
        assert!(!QuireError::Corruption("bad suffix".to_string()).is_retriable());
    }
}
