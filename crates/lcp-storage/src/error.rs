//! Storage-layer error type for `lcp-storage`.

/// Errors surfaced by the SQLite-backed repositories.
///
/// This is the lowest layer of the error taxonomy; callers in
/// `lcp-core` and above wrap it into their own domain error enums rather than
/// matching on it directly.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The underlying SQLite connection or query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be decoded into its Rust representation (corrupt JSON
    /// column, unexpected enum tag, etc).
    #[error("malformed row in {table}: {reason}")]
    Malformed { table: &'static str, reason: String },
}
