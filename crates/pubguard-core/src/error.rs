//! Error types for the approval, publishing, and recovery core.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to SQLite database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },
}

/// Errors from the approval state machine.
///
/// These are the draft-facing outcomes described by the transition table:
/// a transition is either applied, or rejected for one of these reasons.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    /// No draft exists with the given id.
    #[error("draft not found: {draft_id}")]
    NotFound {
        /// The id that was looked up.
        draft_id: String,
    },

    /// The requested transition is not in the allowed-transitions table.
    #[error("cannot transition draft {draft_id} from {from} to {to}")]
    InvalidTransition {
        /// The draft being transitioned.
        draft_id: String,
        /// The draft's current status.
        from: String,
        /// The requested target status.
        to: String,
    },

    /// The draft is not in the state this operation requires.
    #[error("draft {draft_id} is in state {actual}, expected {expected}")]
    InvalidState {
        /// The draft being operated on.
        draft_id: String,
        /// The state the operation required.
        expected: String,
        /// The state the draft was actually in.
        actual: String,
    },

    /// A concurrent writer changed the draft between read and commit.
    #[error("draft {draft_id} was concurrently modified")]
    Conflict {
        /// The draft that raced.
        draft_id: String,
    },

    /// The underlying store could not be reached.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// Handing the newly approved draft to the scheduler failed. Boxed
    /// because `SchedulerError` itself can wrap a `TransitionError`
    /// (the executor reports a dispatch success back through C3) -- without
    /// boxing, the two enums would recurse into each other at compile time.
    #[error("scheduling failed: {source}")]
    SchedulingFailed {
        /// The underlying scheduler error.
        #[source]
        source: Box<SchedulerError>,
    },
}

/// Errors raised by the in-process event bus.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// The subscriber ceiling (default 16) has been reached.
    #[error("too many subscribers: limit of {limit} reached")]
    TooManySubscribers {
        /// The configured subscriber ceiling.
        limit: usize,
    },
}

/// Errors from the per-platform rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The platform's sliding window is exhausted.
    #[error("rate limit exceeded for {platform}, next available at {next_available}")]
    Exceeded {
        /// The platform whose quota was exhausted.
        platform: String,
        /// RFC 3339 timestamp of the next available slot.
        next_available: String,
    },
}

/// Errors from the publishing scheduler and executor.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// No queue entry exists with the given id.
    #[error("queue entry not found: {entry_id}")]
    NotFound {
        /// The id that was looked up.
        entry_id: String,
    },

    /// The draft being scheduled has no cadence slot available.
    #[error("no cadence slot available for client {client_id} on {platform} before {before}")]
    NoCadenceSlot {
        /// The client the entry belongs to.
        client_id: String,
        /// The target platform.
        platform: String,
        /// The horizon the search gave up at.
        before: String,
    },

    /// The draft is missing an image required by its platform.
    #[error("draft {draft_id} is missing a required image for {platform}")]
    ImageMissing {
        /// The draft missing the image.
        draft_id: String,
        /// The platform that requires one.
        platform: String,
    },

    /// The underlying store could not be reached.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// A successful dispatch could not be reflected back onto the draft.
    #[error("failed to transition draft after dispatch: {source}")]
    TransitionFailed {
        /// The underlying transition error.
        #[source]
        source: TransitionError,
    },
}

/// Errors returned by a platform adapter's `publish`/`delete` operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A retryable failure: network blip, 5xx, timeout.
    #[error("transient adapter error on {platform}: {message}")]
    Transient {
        /// The platform the call targeted.
        platform: String,
        /// Details of the failure.
        message: String,
    },

    /// A non-retryable failure: invalid content, revoked token, 4xx.
    #[error("permanent adapter error on {platform}: {message}")]
    Permanent {
        /// The platform the call targeted.
        platform: String,
        /// Details of the failure.
        message: String,
    },

    /// The platform does not support the requested operation (e.g. delete).
    #[error("{operation} is unsupported on {platform}")]
    Unsupported {
        /// The platform the call targeted.
        platform: String,
        /// The operation that has no implementation on this platform.
        operation: String,
    },
}

/// Errors from the recovery service.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// No draft exists with the given id.
    #[error("draft not found: {draft_id}")]
    NotFound {
        /// The id that was looked up.
        draft_id: String,
    },

    /// Recovery was requested for a draft that is not published.
    #[error("draft {draft_id} is in state {actual}, recovery requires published")]
    InvalidState {
        /// The draft being recovered.
        draft_id: String,
        /// The draft's actual status.
        actual: String,
    },

    /// The underlying store could not be reached.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },
}

impl From<StorageError> for TransitionError {
    fn from(source: StorageError) -> Self {
        TransitionError::StoreUnavailable { source }
    }
}

impl From<SchedulerError> for TransitionError {
    fn from(source: SchedulerError) -> Self {
        TransitionError::SchedulingFailed {
            source: Box::new(source),
        }
    }
}

impl From<StorageError> for SchedulerError {
    fn from(source: StorageError) -> Self {
        SchedulerError::StoreUnavailable { source }
    }
}

impl From<StorageError> for RecoveryError {
    fn from(source: StorageError) -> Self {
        RecoveryError::StoreUnavailable { source }
    }
}

impl From<TransitionError> for SchedulerError {
    fn from(source: TransitionError) -> Self {
        SchedulerError::TransitionFailed { source }
    }
}
