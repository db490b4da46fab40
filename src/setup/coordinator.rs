//! Setup coordinator
//!
//! Drives a setup run end to end: fetch the planner's inputs, build the
//! plan, create channels into an ephemeral builder store, apply them under
//! the configured build mode, refresh the guide, record completion.
//! Cancellation is checked between every upstream call and every created
//! channel; the builder's temporary keys are removed on every exit path.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogProvider, LibraryItemsQuery, LibraryKind};
use crate::clock::SharedClock;
use crate::config::RetuneConfig;
use crate::errors::{CatalogError, SetupError};
use crate::manager::ChannelManager;
use crate::models::channel::{ChannelConfig, ChannelDraft, ChannelLibraryType};
use crate::models::setup::{
    BuildMode, ChannelBuildSummary, ChannelSetupConfig, PendingChannel, SetupProgress,
    SetupStrategy, SetupTask,
};
use crate::setup::planner::{self, LibraryPlanInput, PlanInputs};
use crate::setup::record::SetupRecordStore;
use crate::storage::SharedStorage;
use crate::store::ChannelStore;

const BUILDER_PREFIX: &str = "retune_channels_build_tmp_v1";

/// Guide collaborator notified once a new lineup is applied.
#[async_trait]
pub trait EpgNotifier: Send + Sync {
    async fn refresh_guide(&self);
}

struct RunState {
    last_task: SetupTask,
    created: usize,
    skipped: usize,
    error_count: usize,
    reached_max_channels: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            last_task: SetupTask::FetchPlaylists,
            created: 0,
            skipped: 0,
            error_count: 0,
            reached_max_channels: false,
        }
    }

    fn summary(&self, canceled: bool) -> ChannelBuildSummary {
        ChannelBuildSummary {
            canceled,
            last_task: self.last_task,
            created: self.created,
            skipped: self.skipped,
            error_count: self.error_count,
        }
    }
}

pub struct SetupCoordinator<C: CatalogProvider + 'static> {
    manager: Arc<ChannelManager<C>>,
    catalog: Arc<C>,
    storage: SharedStorage,
    records: SetupRecordStore,
    clock: SharedClock,
    config: RetuneConfig,
    progress: broadcast::Sender<SetupProgress>,
    epg: Option<Arc<dyn EpgNotifier>>,
}

impl<C: CatalogProvider + 'static> SetupCoordinator<C> {
    pub fn new(
        manager: Arc<ChannelManager<C>>,
        catalog: Arc<C>,
        storage: SharedStorage,
        clock: SharedClock,
        config: RetuneConfig,
        epg: Option<Arc<dyn EpgNotifier>>,
    ) -> Self {
        Self {
            manager,
            catalog,
            records: SetupRecordStore::new(storage.clone()),
            storage,
            clock,
            config,
            progress: broadcast::channel(128).0,
            epg,
        }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<SetupProgress> {
        self.progress.subscribe()
    }

    pub fn records(&self) -> &SetupRecordStore {
        &self.records
    }

    /// Run setup to completion or cancellation. Aborts produce a canceled
    /// summary, never an error; upstream failures count into `error_count`
    /// and degrade the plan instead of failing the run.
    pub async fn create_channels_from_setup(
        &self,
        setup: &ChannelSetupConfig,
        token: &CancellationToken,
    ) -> Result<ChannelBuildSummary, SetupError> {
        let mut state = RunState::new();
        let builder_namespace = format!("{BUILDER_PREFIX}:{}", self.clock.now_ms());

        let result = self
            .run_phases(setup, token, &builder_namespace, &mut state)
            .await;

        // Temporary builder keys never outlive the run, success or not.
        self.cleanup_builder(&builder_namespace).await;

        match result {
            Ok(()) => {
                state.last_task = SetupTask::Done;
                self.emit(SetupTask::Done, "Channel setup complete", None, 1, Some(1));
                if let Err(e) = self
                    .records
                    .mark_setup_complete(setup, self.clock.now_utc())
                    .await
                {
                    warn!(error = %e, "failed to record setup completion");
                    state.error_count += 1;
                }
                Ok(state.summary(false))
            }
            Err(SetupError::Aborted) => {
                info!(last_task = %state.last_task, "channel setup canceled");
                Ok(state.summary(true))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_phases(
        &self,
        setup: &ChannelSetupConfig,
        token: &CancellationToken,
        builder_namespace: &str,
        state: &mut RunState,
    ) -> Result<(), SetupError> {
        let mut inputs = PlanInputs::default();

        // Phase: playlists (server-wide).
        state.last_task = SetupTask::FetchPlaylists;
        self.emit(
            SetupTask::FetchPlaylists,
            "Fetching playlists",
            None,
            0,
            None,
        );
        self.check(token)?;
        if setup.strategy_enabled(SetupStrategy::Playlists) {
            match self.catalog.get_playlists(token).await {
                Ok(playlists) => inputs.playlists = playlists,
                Err(e) => self.note_failure(token, state, "playlists", e)?,
            }
        }

        // Phase: libraries and their collections.
        state.last_task = SetupTask::FetchCollections;
        self.emit(
            SetupTask::FetchCollections,
            "Fetching collections",
            None,
            0,
            None,
        );
        self.check(token)?;
        let mut libraries = match self.catalog.get_libraries(token).await {
            Ok(libraries) => libraries,
            Err(e) => {
                self.note_failure(token, state, "libraries", e)?;
                Vec::new()
            }
        };
        libraries.retain(|lib| {
            setup.selected_library_ids.contains(&lib.id)
                && matches!(lib.kind, LibraryKind::Movie | LibraryKind::Show)
        });
        libraries.sort_by(|a, b| a.title.cmp(&b.title));

        let total_libraries = libraries.len() as u64;
        for (position, info) in libraries.iter().enumerate() {
            self.check(token)?;
            self.emit(
                SetupTask::FetchCollections,
                "Fetching collections",
                Some(info.title.clone()),
                position as u64 + 1,
                Some(total_libraries),
            );
            let collections = if setup.strategy_enabled(SetupStrategy::Collections) {
                match self.catalog.get_collections(&info.id, token).await {
                    Ok(collections) => collections,
                    Err(e) => {
                        self.note_failure(token, state, "collections", e)?;
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            let library_type = match info.kind {
                LibraryKind::Show => ChannelLibraryType::Show,
                _ => ChannelLibraryType::Movie,
            };
            inputs.libraries.push(LibraryPlanInput {
                info: info.clone(),
                collections,
                tag_items: Vec::new(),
                leaf_items: Vec::new(),
                item_count: None,
                studios: Vec::new(),
                actors: Vec::new(),
                library_type,
            });
        }

        // Phase: bounded per-library scans and tag directories.
        state.last_task = SetupTask::ScanLibraryItems;
        let scan_limit = self.config.setup.library_scan_limit;
        let need_tags = setup.strategy_enabled(SetupStrategy::Genres)
            || setup.strategy_enabled(SetupStrategy::Directors);
        let need_leaves = setup.strategy_enabled(SetupStrategy::Decades)
            || setup.strategy_enabled(SetupStrategy::RuntimeBuckets);
        for position in 0..inputs.libraries.len() {
            self.check(token)?;
            let (library_id, library_type, title, content_count) = {
                let library = &inputs.libraries[position];
                (
                    library.info.id.clone(),
                    library.library_type,
                    library.info.title.clone(),
                    library.info.content_count,
                )
            };
            self.emit(
                SetupTask::ScanLibraryItems,
                "Scanning library items",
                Some(title),
                position as u64 + 1,
                Some(total_libraries),
            );

            if need_tags || need_leaves {
                let tag_filter = match library_type {
                    ChannelLibraryType::Show => Some("type=show".to_string()),
                    ChannelLibraryType::Movie => None,
                };
                let query = LibraryItemsQuery {
                    filter: tag_filter,
                    limit: Some(scan_limit),
                };
                match self.catalog.get_library_items(&library_id, &query, token).await {
                    Ok(items) => {
                        let library = &mut inputs.libraries[position];
                        // Movie scans serve both purposes.
                        if library_type == ChannelLibraryType::Movie {
                            library.leaf_items = items.clone();
                        }
                        library.tag_items = items;
                    }
                    Err(e) => self.note_failure(token, state, "library scan", e)?,
                }

                if need_leaves && library_type == ChannelLibraryType::Show {
                    self.check(token)?;
                    let query = LibraryItemsQuery {
                        filter: Some("type=episode".to_string()),
                        limit: Some(scan_limit),
                    };
                    match self.catalog.get_library_items(&library_id, &query, token).await {
                        Ok(items) => inputs.libraries[position].leaf_items = items,
                        Err(e) => self.note_failure(token, state, "episode scan", e)?,
                    }
                }
            }

            if setup.strategy_enabled(SetupStrategy::LibraryFallback) && content_count.is_none() {
                self.check(token)?;
                match self
                    .catalog
                    .get_library_item_count(&library_id, None, token)
                    .await
                {
                    Ok(count) => inputs.libraries[position].item_count = Some(count),
                    Err(e) => self.note_failure(token, state, "item count", e)?,
                }
            }

            if setup.strategy_enabled(SetupStrategy::Studios) {
                self.check(token)?;
                match self.catalog.get_studios(&library_id, token).await {
                    Ok(studios) => inputs.libraries[position].studios = studios,
                    Err(CatalogError::Unsupported { feature }) => {
                        inputs
                            .warnings
                            .push(format!("studio directory unsupported: {feature}"));
                    }
                    Err(e) => self.note_failure(token, state, "studios", e)?,
                }
            }
            if setup.strategy_enabled(SetupStrategy::Actors) {
                self.check(token)?;
                match self.catalog.get_actors(&library_id, token).await {
                    Ok(actors) => inputs.libraries[position].actors = actors,
                    Err(CatalogError::Unsupported { feature }) => {
                        inputs
                            .warnings
                            .push(format!("actor directory unsupported: {feature}"));
                    }
                    Err(e) => self.note_failure(token, state, "actors", e)?,
                }
            }
        }

        // Phase: plan assembly and diff.
        state.last_task = SetupTask::BuildPending;
        self.emit(SetupTask::BuildPending, "Building channel plan", None, 0, None);
        self.check(token)?;
        let plan = planner::build_plan(setup, &inputs);
        state.reached_max_channels |= plan.reached_max_channels;
        let existing = self.manager.list_channels().await;
        let diff = planner::plan_diff(&existing, &plan.pending);
        debug!(
            pending = plan.pending.len(),
            created = diff.created.len(),
            unchanged = diff.unchanged.len(),
            removed = diff.removed.len(),
            "channel plan assembled"
        );
        self.emit(
            SetupTask::BuildPending,
            "Channel plan ready",
            Some(format!(
                "{} planned, {} new, {} unchanged",
                plan.pending.len(),
                diff.created.len(),
                diff.unchanged.len()
            )),
            plan.pending.len() as u64,
            Some(plan.pending.len() as u64),
        );

        // Phase: create into the ephemeral builder store.
        state.last_task = SetupTask::CreateChannels;
        let capacity = self.build_capacity(setup, &existing);
        let mut builder = ChannelStore::new(self.storage.clone(), builder_namespace.to_string());
        let total_planned = plan.pending.len();
        for (position, pending) in plan.pending.iter().enumerate() {
            self.check(token)?;
            if builder.len() >= capacity {
                state.skipped += 1;
                state.reached_max_channels = true;
                continue;
            }
            let number = (builder.len() + 1) as u16;
            match self.materialize(pending, number) {
                Ok(channel) => {
                    builder.insert(channel);
                    state.created += 1;
                }
                Err(e) => {
                    warn!(name = %pending.name, error = %e, "failed to build pending channel");
                    state.error_count += 1;
                    state.skipped += 1;
                }
            }
            self.emit(
                SetupTask::CreateChannels,
                "Creating channels",
                Some(pending.name.clone()),
                position as u64 + 1,
                Some(total_planned as u64),
            );
        }
        if let Err(e) = builder.save(self.clock.now_ms()).await {
            warn!(error = %e, "failed to persist builder store");
            state.error_count += 1;
        }

        // Phase: apply under the configured build mode.
        state.last_task = SetupTask::ApplyChannels;
        self.emit(SetupTask::ApplyChannels, "Applying channels", None, 0, None);
        self.check(token)?;
        let built: Vec<ChannelConfig> = builder.ordered().into_iter().cloned().collect();
        self.apply(setup, existing, built, state).await;

        // Phase: guide refresh.
        state.last_task = SetupTask::RefreshEpg;
        self.emit(SetupTask::RefreshEpg, "Refreshing guide", None, 0, None);
        if let Some(epg) = &self.epg {
            epg.refresh_guide().await;
        }

        Ok(())
    }

    /// Apply the built list. Replace installs it verbatim; append keeps the
    /// existing lineup and assigns free numbers; merge rewrites identity
    /// matches in place and appends the rest.
    async fn apply(
        &self,
        setup: &ChannelSetupConfig,
        existing: Vec<ChannelConfig>,
        built: Vec<ChannelConfig>,
        state: &mut RunState,
    ) {
        let current = self.manager.current_channel().await.map(|c| c.id);
        let lineup = match setup.build_mode {
            BuildMode::Replace => built,
            BuildMode::Append => {
                let mut lineup = existing;
                self.append_on_free_numbers(&mut lineup, built, state);
                lineup
            }
            BuildMode::Merge => {
                let mut lineup = existing;
                let by_identity: HashMap<String, usize> = lineup
                    .iter()
                    .enumerate()
                    .map(|(position, channel)| {
                        (
                            planner::identity_key(
                                &channel.content_source,
                                &channel.content_filters,
                            ),
                            position,
                        )
                    })
                    .collect();
                let mut additions = Vec::new();
                let mut rewritten: HashSet<usize> = HashSet::new();
                let now = self.clock.now_utc();
                for channel in built {
                    let key =
                        planner::identity_key(&channel.content_source, &channel.content_filters);
                    match by_identity.get(&key) {
                        Some(&position) if !rewritten.contains(&position) => {
                            rewritten.insert(position);
                            let target = &mut lineup[position];
                            if target.is_auto_generated {
                                target.name = channel.name;
                            }
                            target.content_source = channel.content_source;
                            target.playback_mode = channel.playback_mode;
                            target.shuffle_seed = channel.shuffle_seed;
                            target.content_filters = channel.content_filters;
                            target.sort_order = channel.sort_order;
                            target.updated_at = now;
                        }
                        _ => additions.push(channel),
                    }
                }
                self.append_on_free_numbers(&mut lineup, additions, state);
                lineup
            }
        };
        self.manager.replace_all_channels(lineup, current).await;
    }

    fn append_on_free_numbers(
        &self,
        lineup: &mut Vec<ChannelConfig>,
        additions: Vec<ChannelConfig>,
        state: &mut RunState,
    ) {
        let min = self.config.channels.min_number;
        let max = self.config.channels.max_number;
        let mut taken: HashSet<u16> = lineup.iter().map(|c| c.number).collect();
        let mut cursor = min;
        for mut channel in additions {
            let number = (cursor..=max).find(|n| !taken.contains(n));
            match number {
                Some(number) => {
                    taken.insert(number);
                    cursor = number;
                    channel.number = number;
                    lineup.push(channel);
                }
                None => {
                    state.reached_max_channels = true;
                    state.skipped += 1;
                    state.created = state.created.saturating_sub(1);
                    warn!(name = %channel.name, "no free channel numbers left; dropping channel");
                }
            }
        }
    }

    fn build_capacity(&self, setup: &ChannelSetupConfig, existing: &[ChannelConfig]) -> usize {
        let configured = setup.max_channels.min(self.config.channels.max_channels);
        match setup.build_mode {
            BuildMode::Replace => configured,
            BuildMode::Append | BuildMode::Merge => {
                let span = usize::from(self.config.channels.max_number)
                    - usize::from(self.config.channels.min_number)
                    + 1;
                configured.min(span.saturating_sub(existing.len()))
            }
        }
    }

    fn materialize(
        &self,
        pending: &PendingChannel,
        number: u16,
    ) -> Result<ChannelConfig, crate::errors::ChannelError> {
        let draft = ChannelDraft {
            name: Some(pending.name.clone()),
            content_source: Some(pending.content_source.clone()),
            playback_mode: Some(pending.playback_mode),
            shuffle_seed: Some(pending.shuffle_seed),
            content_filters: pending.content_filters.clone(),
            sort_order: pending.sort_order,
            is_auto_generated: pending.is_auto_generated,
            ..Default::default()
        };
        ChannelConfig::from_draft(draft, number, self.clock.now_utc())
    }

    async fn cleanup_builder(&self, namespace: &str) {
        for key in [namespace.to_string(), format!("{namespace}:current")] {
            if let Err(e) = self.storage.remove(&key).await {
                warn!(key = %key, error = %e, "failed to remove temporary builder key");
            }
        }
    }

    fn check(&self, token: &CancellationToken) -> Result<(), SetupError> {
        if token.is_cancelled() {
            Err(SetupError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Record a non-abort upstream failure and continue; turn failures seen
    /// after cancellation into a silent abort instead.
    fn note_failure(
        &self,
        token: &CancellationToken,
        state: &mut RunState,
        what: &str,
        error: CatalogError,
    ) -> Result<(), SetupError> {
        if token.is_cancelled() {
            return Err(SetupError::Aborted);
        }
        warn!(what, error = %error, "setup upstream call failed");
        state.error_count += 1;
        Ok(())
    }

    fn emit(
        &self,
        task: SetupTask,
        label: &str,
        detail: Option<String>,
        current: u64,
        total: Option<u64>,
    ) {
        let _ = self.progress.send(SetupProgress {
            task,
            label: label.to_string(),
            detail,
            current,
            total,
        });
    }
}
