use std::fmt;

/// Failures surfaced by the memory lifecycle.
///
/// None of these are fatal: validation blocks a save, an empty jar becomes a
/// user notice, and a persistence failure leaves the collection as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JarError {
    /// The draft is missing its text or media payload.
    Validation(&'static str),
    /// A pop was requested on a jar with no memories.
    EmptyCollection,
    /// A record with this id is already in the collection.
    DuplicateId(String),
    /// The backing store refused or failed the write.
    Persistence(String),
    /// Serialized state could not be decoded.
    InvalidData(String),
}

impl fmt::Display for JarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JarError::Validation(msg) => write!(f, "invalid draft: {msg}"),
            JarError::EmptyCollection => write!(f, "the jar is empty"),
            JarError::DuplicateId(id) => write!(f, "duplicate memory id: {id}"),
            JarError::Persistence(msg) => write!(f, "persistence failed: {msg}"),
            JarError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for JarError {}

pub type Result<T> = std::result::Result<T, JarError>;
