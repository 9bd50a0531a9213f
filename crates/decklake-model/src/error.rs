use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    /// A tag was registered twice.
    DuplicateTag(String),
    /// The constructor registered under a tag produced a payload with another tag.
    TagMismatch { registered: String, produced: String },
    UnregisteredTag(String),
    Decode(String),
    Encode(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTag(tag) => write!(f, "collection type already registered: {tag}"),
            Self::TagMismatch {
                registered,
                produced,
            } => write!(
                f,
                "constructor registered as {registered} produces payload tagged {produced}"
            ),
            Self::UnregisteredTag(tag) => write!(f, "unregistered collection type: {tag}"),
            Self::Decode(msg) => write!(f, "collection decode failed: {msg}"),
            Self::Encode(msg) => write!(f, "collection encode failed: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}
