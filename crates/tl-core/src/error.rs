use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("unknown event kind: {value}")]
    UnknownKind { value: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
    #[error("query failed: {message}")]
    Query { message: String },
    #[error("stored value could not be decoded: {message}")]
    Decode { message: String },
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("admin access required")]
    Forbidden,
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },
}

#[derive(Debug, Error)]
pub enum TallyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
