//! Error type definitions for the channel engine
//!
//! A hierarchical error system: one enum per layer (channel lifecycle,
//! content resolution, scheduling, storage, catalog upstream, setup), chained
//! into a top-level [`RetuneError`]. Every error exposes a stable `kind()`
//! string so an external mapper can translate it into user-visible messaging
//! and recovery actions; the core only emits kinds and descriptive messages.

use thiserror::Error;
use uuid::Uuid;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum RetuneError {
    /// Channel lifecycle errors (CRUD validation, lookup)
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Content resolution errors
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// Schedule construction/lookup errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Persistence layer errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Upstream catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Channel setup errors
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),
}

impl RetuneError {
    /// Stable kind identifier for external message mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Channel(e) => e.kind(),
            Self::Content(e) => e.kind(),
            Self::Schedule(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Catalog(e) => e.kind(),
            Self::Setup(e) => e.kind(),
        }
    }
}

/// Channel lifecycle errors
#[derive(Error, Debug)]
pub enum ChannelError {
    /// No channel with the given id exists
    #[error("Channel not found: {id}")]
    NotFound { id: Uuid },

    /// No channel with the given number exists
    #[error("Channel number not found: {number}")]
    NumberNotFound { number: u16 },

    /// The requested channel number is already taken
    #[error("Duplicate channel number: {number}")]
    DuplicateNumber { number: u16 },

    /// Channel number outside the allowed range
    #[error("Invalid channel number: {number} (allowed {min}-{max})")]
    InvalidNumber { number: u16, min: u16, max: u16 },

    /// A channel cannot exist without a content source
    #[error("A content source is required to create a channel")]
    ContentSourceRequired,

    /// The content source failed structural validation
    #[error("Invalid content source: {message}")]
    InvalidContentSource { message: String },

    /// The store already holds the maximum number of channels
    #[error("Maximum channel count reached ({max})")]
    MaxChannelsReached { max: usize },

    /// An import document had an unusable shape
    #[error("Invalid import data: {message}")]
    InvalidImportData { message: String },

    /// Persistence failure surfaced from a create/update
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ChannelError {
    pub fn invalid_source<M: Into<String>>(message: M) -> Self {
        Self::InvalidContentSource {
            message: message.into(),
        }
    }

    pub fn invalid_import<M: Into<String>>(message: M) -> Self {
        Self::InvalidImportData {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::NumberNotFound { .. } => "channel-not-found",
            Self::DuplicateNumber { .. } => "duplicate-number",
            Self::InvalidNumber { .. } => "invalid-number",
            Self::ContentSourceRequired => "content-source-required",
            Self::InvalidContentSource { .. } => "invalid-content-source",
            Self::MaxChannelsReached { .. } => "max-channels-reached",
            Self::InvalidImportData { .. } => "invalid-import-data",
            Self::Storage(e) => e.kind(),
        }
    }
}

/// Content resolution errors
#[derive(Error, Debug)]
pub enum ContentError {
    /// The source resolved to nothing upstream (vanished library, deleted
    /// playlist). Recoverable: stale cache may be served.
    #[error("Content unavailable: {message}")]
    Unavailable { message: String },

    /// Configured filters removed every item. Never masked by cache.
    #[error("Channel has no playable items after filtering")]
    EmptyChannel,

    /// The content source failed structural validation during resolution
    #[error("Invalid content source: {message}")]
    InvalidSource { message: String },

    /// The operation was cancelled; never user-visible
    #[error("Content resolution aborted")]
    Aborted,

    /// Upstream catalog failure, propagated unchanged
    #[error("Catalog failure: {0}")]
    Catalog(#[from] CatalogError),
}

impl ContentError {
    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid_source<M: Into<String>>(message: M) -> Self {
        Self::InvalidSource {
            message: message.into(),
        }
    }

    /// True for the error classes that fall back to cached content.
    pub fn is_network_class(&self) -> bool {
        matches!(self, Self::Catalog(e) if e.is_network_class())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "content-unavailable",
            Self::EmptyChannel => "scheduler-empty-channel",
            Self::InvalidSource { .. } => "invalid-content-source",
            Self::Aborted => "aborted",
            Self::Catalog(e) => e.kind(),
        }
    }
}

/// Schedule construction and lookup errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Empty item list or non-positive loop duration
    #[error("Invalid schedule: {message}")]
    InvalidTime { message: String },
}

impl ScheduleError {
    pub fn invalid<M: Into<String>>(message: M) -> Self {
        Self::InvalidTime {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        "scheduler-invalid-time"
    }
}

/// Persistence layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend rejected a write for lack of space
    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    /// A stored document could not be understood at all
    #[error("Corrupted record at {key}: {message}")]
    Corrupted { key: String, message: String },

    /// Underlying I/O failure
    #[error("Storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn corrupted<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Corrupted {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota-exceeded",
            Self::Corrupted { .. } => "corrupted",
            Self::Io(_) | Self::Serialization(_) => "storage-failure",
        }
    }
}

/// Upstream catalog errors
///
/// The catalog collaborator maps its transport failures onto these variants;
/// the engine only inspects the class, never the transport detail.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog request timed out: {message}")]
    Timeout { message: String },

    #[error("Catalog is offline")]
    Offline,

    #[error("Catalog unreachable: {message}")]
    Unreachable { message: String },

    #[error("Catalog temporarily unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Catalog rejected credentials")]
    Unauthorized,

    #[error("Catalog resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Catalog response could not be parsed: {message}")]
    Parse { message: String },

    #[error("Catalog server error: {message}")]
    Server { message: String },

    #[error("Catalog rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Endpoint not supported by this catalog (older servers)
    #[error("Catalog does not support {feature}")]
    Unsupported { feature: String },
}

impl CatalogError {
    pub fn timeout<M: Into<String>>(message: M) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn unreachable<M: Into<String>>(message: M) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>>(resource: R) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn unsupported<F: Into<String>>(feature: F) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Timeouts, offline, unreachable and transiently unavailable upstreams
    /// are the classes that trigger cache fallback plus a queued retry.
    pub fn is_network_class(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Offline
                | Self::Unreachable { .. }
                | Self::ServiceUnavailable { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Offline => "offline",
            Self::Unreachable { .. } => "unreachable",
            Self::ServiceUnavailable { .. } => "unavailable",
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not-found",
            Self::Parse { .. } => "parse-error",
            Self::Server { .. } => "server-error",
            Self::RateLimited { .. } => "rate-limited",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}

/// Channel setup errors
#[derive(Error, Debug)]
pub enum SetupError {
    /// Setup was cancelled; surfaced as a summary, never as a failure
    #[error("Setup aborted")]
    Aborted,

    #[error("Channel error during setup: {0}")]
    Channel(#[from] ChannelError),

    #[error("Catalog error during setup: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error during setup: {0}")]
    Storage(#[from] StorageError),
}

impl SetupError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::Channel(e) => e.kind(),
            Self::Catalog(e) => e.kind(),
            Self::Storage(e) => e.kind(),
        }
    }
}

/// Convenience alias used across the crate
pub type RetuneResult<T> = Result<T, RetuneError>;
