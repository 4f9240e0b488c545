use thiserror::Error;

/// Errors produced by the store layer.
///
/// The request-handling layers map each variant to a stable user-readable
/// message and status classification; the `Display` strings here are the
/// canonical texts.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A user tried to send a connection request to themselves.
    #[error("You cannot connect with yourself")]
    SelfConnection,

    /// An accepted connection already exists between the pair.
    #[error("Already connected with this user")]
    AlreadyConnected,

    /// The caller already has a pending request towards this user.
    #[error("Connection request already sent")]
    RequestAlreadySent,

    /// The other user already has a pending request towards the caller.
    #[error("This user has already sent you a connection request")]
    RequestAlreadyReceived,

    /// Accept/reject requires a pending request in that exact direction.
    #[error("No connection request from this user")]
    NoSuchRequest,

    /// Messaging (or removal) requires an accepted connection.
    #[error("Not connected with this user")]
    NotConnected,

    /// Message content was blank after trimming.
    #[error("Message cannot be empty")]
    EmptyContent,

    /// Referenced user does not exist.
    #[error("User not found")]
    UserNotFound,

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking thread.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
