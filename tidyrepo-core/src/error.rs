//! Error types for the tidyrepo engine.

use std::{error::Error, fmt};

/// Error type for repository intelligence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TidyError {
    /// A requested repository, path, or file does not exist upstream.
    NotFound(String),
    /// Content could not be decoded as text or as the expected format.
    Decode(String),
    /// The accessor could not complete a request (auth, rate limit, network).
    Accessor(String),
    /// A catch-all error with a message.
    Other(String),
}

impl TidyError {
    /// Whether the error means "no signal" rather than a real failure.
    ///
    /// Leaf extractors and traversal steps turn these into empty results.
    pub fn is_no_signal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Decode(_))
    }
}

impl fmt::Display for TidyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Decode(message) => write!(f, "decode failure: {message}"),
            Self::Accessor(message) => write!(f, "accessor failure: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for TidyError {}

impl From<std::string::FromUtf8Error> for TidyError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Convenience result type for tidyrepo core.
pub type Result<T> = std::result::Result<T, TidyError>;

/// Decode fetched bytes as UTF-8 text.
pub fn decode_text(bytes: Vec<u8>) -> Result<String> {
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::{TidyError, decode_text};

    #[test]
    fn not_found_formats_message() {
        let error = TidyError::NotFound("README.md".to_string());
        assert_eq!(format!("{error}"), "not found: README.md");
    }

    #[test]
    fn other_error_formats_message() {
        let error = TidyError::Other("tidyrepo failed".to_string());
        assert_eq!(format!("{error}"), "tidyrepo failed");
    }

    #[test]
    fn only_not_found_and_decode_are_no_signal() {
        assert!(TidyError::NotFound("x".into()).is_no_signal());
        assert!(TidyError::Decode("x".into()).is_no_signal());
        assert!(!TidyError::Accessor("rate limited".into()).is_no_signal());
        assert!(!TidyError::Other("x".into()).is_no_signal());
    }

    #[test]
    fn invalid_utf8_maps_to_decode_variant() {
        let error = decode_text(vec![0xff, 0xfe, 0x00]).unwrap_err();
        match error {
            TidyError::Decode(_) => {}
            other => panic!("expected Decode variant, got {other:?}"),
        }
        assert_eq!(decode_text(b"ok".to_vec()).expect("utf8"), "ok");
    }
}
