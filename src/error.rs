use thiserror::Error;

/// Errors raised by the search core.
///
/// Expected outcomes of a search (a defective network, a program without
/// executable events, an unreachable target) are plain values and never
/// surface here.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Fitness was requested for a chromosome that has not been executed yet.
    #[error("no execution trace available, the chromosome has not been evaluated")]
    TraceNotAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A search algorithm was built without one of its required parts.
    #[error("search algorithm is missing its {0}")]
    MissingComponent(&'static str),

    #[error("node `{0}` is not part of the graph")]
    UnknownNode(String),

    #[error("event `{0}` is not available in the program under test")]
    UnknownEvent(String),

    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
