//! Error types

pub mod types;

pub use types::{
    CatalogError, ChannelError, ContentError, RetuneError, RetuneResult, ScheduleError, SetupError,
    StorageError,
};
