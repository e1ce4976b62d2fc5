use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused a write (rules, quota, offline rejection).
    #[error("write to {path} rejected: {reason}")]
    WriteRejected { path: String, reason: String },

    /// A conditional update kept losing the race and gave up.
    #[error("transaction on {path} abandoned after {attempts} attempts")]
    TransactionContention { path: String, attempts: u32 },

    #[error("invalid path segment {0:?}")]
    InvalidPath(String),

    #[error("undecodable value at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
