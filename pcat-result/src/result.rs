use crate::error::Error;

/// Result type alias used throughout pcat.
pub type Result<T> = std::result::Result<T, Error>;
