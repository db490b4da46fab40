//! Domain models

pub mod channel;
pub mod content;
pub mod schedule;
pub mod setup;

pub use channel::{
    ChannelConfig, ChannelContentSource, ChannelDraft, ChannelLibraryType, ChannelPatch,
    ContentFilter, FilterField, FilterOp, FilterValue, ManualItem, MixMode, PlaybackMode,
    SortOrder,
};
pub use content::{
    CacheReason, MediaKind, MediaTechInfo, ResolvedChannelContent, ResolvedContentItem,
};
pub use schedule::{ScheduleConfig, ScheduleIndex, ScheduledProgram};
pub use setup::{
    ActorStudioCombineMode, BuildMode, ChannelBuildSummary, ChannelPlan, ChannelSetupConfig,
    PendingChannel, PlanDiff, SetupProgress, SetupRecord, SetupStrategy, SetupTask,
};
