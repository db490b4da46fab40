//! Channel manager
//!
//! CRUD over the channel lineup, the per-channel content cache, and the
//! tiered fallback that keeps channels watchable when the catalog is
//! unreachable. Events are emitted synchronously once state is consistent;
//! an error in one subscriber cannot affect the others (broadcast channel
//! semantics).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::CatalogProvider;
use crate::clock::SharedClock;
use crate::config::RetuneConfig;
use crate::errors::{ChannelError, ContentError, RetuneError, StorageError};
use crate::models::channel::{ChannelConfig, ChannelDraft, ChannelPatch};
use crate::models::content::{CacheReason, ResolvedChannelContent};
use crate::resolver::{ContentResolver, filters, playback, sort};
use crate::store::ChannelStore;

/// Events emitted by the manager. Subscribers observe mutations in program
/// order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Created(ChannelConfig),
    Updated(ChannelConfig),
    Deleted(Uuid),
    Switch {
        channel: ChannelConfig,
        index: usize,
    },
    ContentResolved {
        channel_id: Uuid,
        item_count: usize,
        total_duration_ms: i64,
    },
}

/// Aggregate lineup numbers for guide surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineupStats {
    pub channel_count: usize,
    pub auto_generated_count: usize,
    pub total_items: usize,
    pub total_duration_ms: i64,
}

pub struct ChannelManager<C: CatalogProvider> {
    store: Mutex<ChannelStore>,
    resolver: ContentResolver<C>,
    content_cache: Mutex<HashMap<Uuid, ResolvedChannelContent>>,
    pending_retries: std::sync::Mutex<HashMap<Uuid, CancellationToken>>,
    events: broadcast::Sender<ChannelEvent>,
    clock: SharedClock,
    config: RetuneConfig,
    self_ref: Weak<Self>,
}

impl<C: CatalogProvider + 'static> ChannelManager<C> {
    pub fn new(
        store: ChannelStore,
        catalog: Arc<C>,
        clock: SharedClock,
        config: RetuneConfig,
    ) -> Arc<Self> {
        let resolver = ContentResolver::new(
            catalog,
            clock.clone(),
            config.cache.show_decoration_ttl,
        );
        Arc::new_cyclic(|self_ref| Self {
            store: Mutex::new(store),
            resolver,
            content_cache: Mutex::new(HashMap::new()),
            pending_retries: std::sync::Mutex::new(HashMap::new()),
            events: broadcast::channel(256).0,
            clock,
            config,
            self_ref: self_ref.clone(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ChannelEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create a channel from a draft and persist the lineup. The first
    /// content resolution is attempted but never fails the create.
    pub async fn create_channel(&self, draft: ChannelDraft) -> Result<ChannelConfig, ChannelError> {
        let source = draft
            .content_source
            .as_ref()
            .ok_or(ChannelError::ContentSourceRequired)?;
        source.validate()?;

        let created = {
            let mut store = self.store.lock().await;
            let max = self.config.channels.max_channels;
            if store.len() >= max {
                return Err(ChannelError::MaxChannelsReached { max });
            }
            let number = self.pick_number(&store, draft.number, None)?;
            let channel = ChannelConfig::from_draft(draft, number, self.clock.now_utc())?;
            store.insert(channel.clone());
            if let Err(e) = self.persist_lineup(&mut store).await {
                // Roll the insert back so a failed save leaves no phantom.
                store.remove(&channel.id);
                return Err(e.into());
            }
            channel
        };

        self.emit(ChannelEvent::Created(created.clone()));
        info!(id = %created.id, number = created.number, name = %created.name, "channel created");

        // Best-effort initial resolve warms the cache and derived counts.
        if let Err(e) = self
            .resolve_channel_content(created.id, &CancellationToken::new())
            .await
        {
            debug!(id = %created.id, error = %e, "initial content resolution failed");
        }

        let store = self.store.lock().await;
        Ok(store.get(&created.id).cloned().unwrap_or(created))
    }

    /// Merge a patch into an existing channel. A changed content source
    /// invalidates the cache and triggers a best-effort re-resolve.
    pub async fn update_channel(
        &self,
        id: Uuid,
        patch: ChannelPatch,
    ) -> Result<ChannelConfig, ChannelError> {
        if let Some(source) = &patch.content_source {
            source.validate()?;
        }

        let (updated, source_changed, content_affected) = {
            let mut store = self.store.lock().await;
            let existing = store.get(&id).ok_or(ChannelError::NotFound { id })?.clone();

            let number = match patch.number {
                Some(number) if number != existing.number => {
                    self.pick_number(&store, Some(number), Some(&id))?
                }
                _ => existing.number,
            };

            let mut next = existing.clone();
            next.number = number;
            if let Some(name) = patch.name {
                if !name.trim().is_empty() {
                    next.name = name;
                }
            }
            let source_changed = match patch.content_source {
                Some(source) if source != existing.content_source => {
                    next.content_source = source;
                    true
                }
                _ => false,
            };
            if let Some(mode) = patch.playback_mode {
                next.playback_mode = mode;
            }
            if let Some(seed) = patch.shuffle_seed {
                next.shuffle_seed = seed;
            }
            if let Some(seed) = patch.phase_seed {
                next.phase_seed = seed;
            }
            if let Some(anchor) = patch.start_time_anchor {
                next.start_time_anchor = anchor;
            }
            if let Some(filters) = patch.content_filters {
                next.content_filters = filters;
            }
            if let Some(sort_order) = patch.sort_order {
                next.sort_order = sort_order;
            }
            if let Some(min) = patch.min_episode_runtime_ms {
                next.min_episode_runtime_ms = min;
            }
            if let Some(max) = patch.max_episode_runtime_ms {
                next.max_episode_runtime_ms = max;
            }
            if let Some(skip) = patch.skip_intros {
                next.skip_intros = skip;
            }
            if let Some(skip) = patch.skip_credits {
                next.skip_credits = skip;
            }
            next.updated_at = self.clock.now_utc();

            // Anything that changes what resolution produces invalidates
            // the cached item list, not just a source swap.
            let content_affected = source_changed
                || next.content_filters != existing.content_filters
                || next.sort_order != existing.sort_order
                || next.playback_mode != existing.playback_mode
                || next.shuffle_seed != existing.shuffle_seed
                || next.min_episode_runtime_ms != existing.min_episode_runtime_ms
                || next.max_episode_runtime_ms != existing.max_episode_runtime_ms;

            store.insert(next.clone());
            if let Err(e) = self.persist_lineup(&mut store).await {
                store.insert(existing);
                return Err(e.into());
            }
            (next, source_changed, content_affected)
        };

        if content_affected {
            self.content_cache.lock().await.remove(&id);
            self.cancel_retry(&id);
        }

        self.emit(ChannelEvent::Updated(updated.clone()));

        if source_changed {
            if let Err(e) = self
                .resolve_channel_content(id, &CancellationToken::new())
                .await
            {
                debug!(id = %id, error = %e, "re-resolve after source change failed");
            }
        }

        let store = self.store.lock().await;
        Ok(store.get(&id).cloned().unwrap_or(updated))
    }

    pub async fn delete_channel(&self, id: Uuid) -> Result<(), ChannelError> {
        {
            let mut store = self.store.lock().await;
            store.remove(&id).ok_or(ChannelError::NotFound { id })?;
            if let Err(e) = self.persist_lineup(&mut store).await {
                warn!(id = %id, error = %e, "failed to persist lineup after delete");
            }
            if let Err(e) = store.save_current().await {
                warn!(error = %e, "failed to persist current channel after delete");
            }
        }
        self.content_cache.lock().await.remove(&id);
        self.cancel_retry(&id);
        self.emit(ChannelEvent::Deleted(id));
        Ok(())
    }

    /// Atomically replace the whole lineup in memory; persistence is
    /// best-effort. Invalid entries are skipped with a warning and seeds are
    /// re-derived when zeroed out.
    pub async fn replace_all_channels(
        &self,
        channels: Vec<ChannelConfig>,
        current: Option<Uuid>,
    ) -> usize {
        let mut accepted: Vec<ChannelConfig> = Vec::with_capacity(channels.len());
        let mut numbers = std::collections::HashSet::new();
        for mut channel in channels {
            if let Err(e) = channel.content_source.validate() {
                warn!(id = %channel.id, error = %e, "skipping invalid channel in lineup replacement");
                continue;
            }
            if channel.number < self.config.channels.min_number
                || channel.number > self.config.channels.max_number
                || !numbers.insert(channel.number)
            {
                warn!(id = %channel.id, number = channel.number,
                      "skipping channel with unusable number in lineup replacement");
                continue;
            }
            channel.normalize_seeds(channel.shuffle_seed != 0, channel.phase_seed != 0);
            accepted.push(channel);
        }
        let count = accepted.len();

        let retained: std::collections::HashSet<Uuid> =
            accepted.iter().map(|c| c.id).collect();
        {
            let mut store = self.store.lock().await;
            store.replace_all(accepted, current);
            if let Err(e) = self.persist_lineup(&mut store).await {
                warn!(error = %e, "failed to persist replaced lineup");
            }
            if let Err(e) = store.save_current().await {
                warn!(error = %e, "failed to persist current channel");
            }
        }
        self.content_cache
            .lock()
            .await
            .retain(|id, _| retained.contains(id));
        self.cancel_pending_retries();
        count
    }

    /// Update lineup order; unknown ids are ignored. Persistence failures
    /// are logged, not surfaced.
    pub async fn reorder_channels(&self, ordered_ids: Vec<Uuid>) {
        let mut store = self.store.lock().await;
        store.reorder(&ordered_ids);
        if let Err(e) = store.save(self.clock.now_ms()).await {
            warn!(error = %e, "failed to persist channel order");
        }
    }

    pub async fn set_current_channel(&self, id: Uuid) -> Result<(), ChannelError> {
        let (channel, index) = {
            let mut store = self.store.lock().await;
            let channel = store.get(&id).ok_or(ChannelError::NotFound { id })?.clone();
            store.set_current(Some(id));
            if let Err(e) = store.save_current().await {
                warn!(id = %id, error = %e, "failed to persist current channel");
            }
            let index = store.position_of(&id).unwrap_or(0);
            (channel, index)
        };
        self.emit(ChannelEvent::Switch { channel, index });
        Ok(())
    }

    pub async fn get_channel(&self, id: Uuid) -> Option<ChannelConfig> {
        self.store.lock().await.get(&id).cloned()
    }

    pub async fn get_channel_by_number(&self, number: u16) -> Option<ChannelConfig> {
        self.store.lock().await.by_number(number).cloned()
    }

    pub async fn list_channels(&self) -> Vec<ChannelConfig> {
        self.store
            .lock()
            .await
            .ordered()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn current_channel(&self) -> Option<ChannelConfig> {
        let store = self.store.lock().await;
        store
            .current_channel_id()
            .and_then(|id| store.get(&id).cloned())
    }

    /// Next channel in lineup order, wrapping around.
    pub async fn get_next_channel(&self) -> Option<ChannelConfig> {
        self.neighbor(1).await
    }

    /// Previous channel in lineup order, wrapping around.
    pub async fn get_previous_channel(&self) -> Option<ChannelConfig> {
        self.neighbor(-1).await
    }

    async fn neighbor(&self, step: isize) -> Option<ChannelConfig> {
        let store = self.store.lock().await;
        let order = store.order();
        if order.is_empty() {
            return None;
        }
        let len = order.len() as isize;
        let position = store
            .current_channel_id()
            .and_then(|id| store.position_of(&id))
            .unwrap_or(0) as isize;
        let next = (position + step).rem_euclid(len) as usize;
        store.get(&order[next]).cloned()
    }

    // ------------------------------------------------------------------
    // Content resolution with tiered fallback
    // ------------------------------------------------------------------

    /// Resolve a channel's content, serving the cache while it is fresh.
    ///
    /// Fallback tiers on failure:
    /// 1. empty-after-filtering is surfaced, never masked by cache;
    /// 2. network-class errors return the cache (stale-flagged past TTL)
    ///    and queue one coalesced retry;
    /// 3. content-unavailable returns the cache marked stale;
    /// 4. everything else is re-raised.
    pub async fn resolve_channel_content(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<ResolvedChannelContent, RetuneError> {
        let ttl_ms = self.config.cache.content_ttl.as_millis() as i64;
        let now_ms = self.clock.now_ms();

        {
            let cache = self.content_cache.lock().await;
            if let Some(cached) = cache.get(&id)
                && cached.age_ms(now_ms) <= ttl_ms
            {
                let mut hit = cached.clone();
                hit.from_cache = true;
                hit.is_stale = false;
                hit.cache_reason = CacheReason::Fresh;
                return Ok(hit);
            }
        }

        let channel = self
            .get_channel(id)
            .await
            .ok_or(ChannelError::NotFound { id })?;

        match self.resolve_fresh(&channel, token).await {
            Ok(content) => Ok(content),
            Err(error) => self.apply_fallback(id, error, ttl_ms).await,
        }
    }

    async fn resolve_fresh(
        &self,
        channel: &ChannelConfig,
        token: &CancellationToken,
    ) -> Result<ResolvedChannelContent, ContentError> {
        let raw = self
            .resolver
            .resolve_source(&channel.content_source, token)
            .await?;
        if raw.is_empty() {
            return Err(ContentError::unavailable(format!(
                "content source for '{}' returned no items",
                channel.name
            )));
        }

        let mut items = filters::apply_filters(&raw, &channel.content_filters);
        if let Some(order) = channel.sort_order {
            items = sort::apply_sort(&items, order);
        }
        items.retain(|item| item.duration_ms > 0);
        if let Some(min) = channel.min_episode_runtime_ms {
            items.retain(|item| item.duration_ms >= min);
        }
        if let Some(max) = channel.max_episode_runtime_ms {
            items.retain(|item| item.duration_ms <= max);
        }
        if items.is_empty() {
            return Err(ContentError::EmptyChannel);
        }
        playback::reindex(&mut items);

        let now_ms = self.clock.now_ms();
        let ordered = playback::apply_playback_mode(
            items.clone(),
            channel.playback_mode,
            channel.shuffle_seed,
            now_ms,
        );
        let total_duration_ms: i64 = ordered.iter().map(|item| item.duration_ms).sum();

        let content = ResolvedChannelContent {
            channel_id: channel.id,
            resolved_at: now_ms,
            items,
            ordered_items: ordered,
            total_duration_ms,
            from_cache: false,
            is_stale: false,
            cache_reason: CacheReason::Fresh,
        };

        self.content_cache
            .lock()
            .await
            .insert(channel.id, content.clone());

        {
            let mut store = self.store.lock().await;
            if let Some(stored) = store.get_mut(&channel.id) {
                stored.item_count = content.ordered_items.len();
                stored.total_duration_ms = content.total_duration_ms;
                stored.last_content_refresh = Some(self.clock.now_utc());
            }
            if let Err(e) = store.save(now_ms).await {
                warn!(id = %channel.id, error = %e, "failed to persist lineup after resolve");
            }
        }

        self.emit(ChannelEvent::ContentResolved {
            channel_id: channel.id,
            item_count: content.ordered_items.len(),
            total_duration_ms: content.total_duration_ms,
        });
        Ok(content)
    }

    async fn apply_fallback(
        &self,
        id: Uuid,
        error: ContentError,
        ttl_ms: i64,
    ) -> Result<ResolvedChannelContent, RetuneError> {
        enum Tier {
            // Empty-after-filtering and aborts must never be papered over
            // by cache; unclassified errors re-raise too.
            Surface,
            Network,
            Unavailable,
        }
        let tier = match &error {
            ContentError::Catalog(e) if e.is_network_class() => Tier::Network,
            ContentError::Unavailable { .. } => Tier::Unavailable,
            _ => Tier::Surface,
        };

        match tier {
            Tier::Surface => Err(error.into()),
            Tier::Network => {
                let cached = self.content_cache.lock().await.get(&id).cloned();
                match cached {
                    Some(mut content) => {
                        let age = content.age_ms(self.clock.now_ms());
                        content.from_cache = true;
                        content.is_stale = age > ttl_ms;
                        content.cache_reason = CacheReason::NetworkError;
                        info!(id = %id, age_ms = age, "serving cached content after network failure");
                        self.enqueue_retry(id);
                        Ok(content)
                    }
                    None => Err(error.into()),
                }
            }
            Tier::Unavailable => {
                let cached = self.content_cache.lock().await.get(&id).cloned();
                match cached {
                    Some(mut content) => {
                        content.from_cache = true;
                        content.is_stale = true;
                        content.cache_reason = CacheReason::ContentUnavailable;
                        info!(id = %id, "source vanished; serving stale cached content");
                        Ok(content)
                    }
                    None => Err(error.into()),
                }
            }
        }
    }

    /// Invalidate the cache and re-run the resolution path.
    pub async fn refresh_channel_content(
        &self,
        id: Uuid,
    ) -> Result<ResolvedChannelContent, RetuneError> {
        self.content_cache.lock().await.remove(&id);
        self.resolve_channel_content(id, &CancellationToken::new())
            .await
    }

    // ------------------------------------------------------------------
    // Retry queue
    // ------------------------------------------------------------------

    /// Queue one delayed re-resolve for a channel. Coalesced: a pending
    /// retry for the same channel wins.
    fn enqueue_retry(&self, id: Uuid) {
        let mut retries = self
            .pending_retries
            .lock().unwrap();
        if retries.contains_key(&id) {
            return;
        }
        let token = CancellationToken::new();
        retries.insert(id, token.clone());
        drop(retries);

        let delay = self.config.cache.retry_delay;
        let manager = self.self_ref.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return,
            }
            let Some(manager) = manager.upgrade() else {
                return;
            };
            manager
                .pending_retries
                .lock().unwrap()
                .remove(&id);
            debug!(id = %id, "running queued content retry");
            if let Err(e) = manager.refresh_channel_content(id).await {
                debug!(id = %id, error = %e, "queued content retry failed");
            }
        });
    }

    fn cancel_retry(&self, id: &Uuid) {
        if let Some(token) = self
            .pending_retries
            .lock().unwrap()
            .remove(id)
        {
            token.cancel();
        }
    }

    /// Drain the retry queue. Called on shutdown and namespace rebinds.
    pub fn cancel_pending_retries(&self) {
        let mut retries = self
            .pending_retries
            .lock().unwrap();
        for (_, token) in retries.drain() {
            token.cancel();
        }
    }

    /// True when a retry is queued for the channel. Guide surfaces use this
    /// to badge degraded channels.
    pub fn has_pending_retry(&self, id: &Uuid) -> bool {
        self.pending_retries
            .lock().unwrap()
            .contains_key(id)
    }

    // ------------------------------------------------------------------
    // Lineup utilities
    // ------------------------------------------------------------------

    /// Copy a channel onto the next free number with fresh identity.
    pub async fn duplicate_channel(&self, id: Uuid) -> Result<ChannelConfig, ChannelError> {
        let copy = {
            let mut store = self.store.lock().await;
            let max = self.config.channels.max_channels;
            if store.len() >= max {
                return Err(ChannelError::MaxChannelsReached { max });
            }
            let original = store.get(&id).ok_or(ChannelError::NotFound { id })?.clone();
            let number = self.pick_number(&store, None, None)?;
            let now = self.clock.now_utc();
            let mut copy = original;
            copy.id = Uuid::new_v4();
            copy.number = number;
            copy.name = format!("{} (Copy)", copy.name);
            copy.normalize_seeds(false, false);
            copy.item_count = 0;
            copy.total_duration_ms = 0;
            copy.last_content_refresh = None;
            copy.created_at = now;
            copy.updated_at = now;
            store.insert(copy.clone());
            if let Err(e) = self.persist_lineup(&mut store).await {
                store.remove(&copy.id);
                return Err(e.into());
            }
            copy
        };
        self.emit(ChannelEvent::Created(copy.clone()));
        Ok(copy)
    }

    /// Reassign numbers `1..=n` preserving lineup order. Persistence is
    /// best-effort.
    pub async fn compact_channel_numbers(&self) {
        let mut store = self.store.lock().await;
        let ids: Vec<Uuid> = store.order().to_vec();
        let now = self.clock.now_utc();
        for (index, id) in ids.iter().enumerate() {
            if let Some(channel) = store.get_mut(id) {
                let next = (index + 1) as u16;
                if channel.number != next {
                    channel.number = next;
                    channel.updated_at = now;
                }
            }
        }
        if let Err(e) = store.save(self.clock.now_ms()).await {
            warn!(error = %e, "failed to persist compacted channel numbers");
        }
    }

    pub async fn lineup_stats(&self) -> LineupStats {
        let store = self.store.lock().await;
        let mut stats = LineupStats::default();
        for channel in store.ordered() {
            stats.channel_count += 1;
            if channel.is_auto_generated {
                stats.auto_generated_count += 1;
            }
            stats.total_items += channel.item_count;
            stats.total_duration_ms += channel.total_duration_ms;
        }
        stats
    }

    /// Export the lineup in the persistence-record shape.
    pub async fn export_channels(&self) -> serde_json::Value {
        let store = self.store.lock().await;
        serde_json::json!({
            "channels": store.ordered(),
            "channel_order": store.order().iter().map(Uuid::to_string).collect::<Vec<_>>(),
            "current_channel_id": store.current_channel_id().map(|id| id.to_string()),
            "saved_at": self.clock.now_ms(),
        })
    }

    /// Import a lineup document, replacing the current one. Invalid entries
    /// are skipped with warnings; a document without a channels array is
    /// rejected.
    pub async fn import_channels(
        &self,
        document: &serde_json::Value,
    ) -> Result<usize, ChannelError> {
        let Some(entries) = document.get("channels").and_then(|v| v.as_array()) else {
            return Err(ChannelError::invalid_import("channels is not an array"));
        };
        let mut imported: Vec<ChannelConfig> = Vec::with_capacity(entries.len());
        for entry in entries {
            match crate::store::parse_channel(entry) {
                Some((mut channel, (shuffle_present, phase_present))) => {
                    channel.normalize_seeds(shuffle_present, phase_present);
                    imported.push(channel);
                }
                None => warn!("skipping invalid channel entry in import"),
            }
        }
        let current = document
            .get("current_channel_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        Ok(self.replace_all_channels(imported, current).await)
    }

    /// Rebind the store namespace (profile/server change) and reload.
    pub async fn rebind_namespace(&self, namespace: String) -> Result<(), StorageError> {
        self.cancel_pending_retries();
        self.content_cache.lock().await.clear();
        let mut store = self.store.lock().await;
        store.rebind(namespace);
        store.load(self.clock.now_ms()).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn pick_number(
        &self,
        store: &ChannelStore,
        requested: Option<u16>,
        excluding: Option<&Uuid>,
    ) -> Result<u16, ChannelError> {
        let min = self.config.channels.min_number;
        let max = self.config.channels.max_number;
        match requested {
            Some(number) => {
                if number < min || number > max {
                    return Err(ChannelError::InvalidNumber { number, min, max });
                }
                if store.number_taken(number, excluding) {
                    return Err(ChannelError::DuplicateNumber { number });
                }
                Ok(number)
            }
            None => store
                .next_free_number(min, max)
                .ok_or(ChannelError::MaxChannelsReached {
                    max: self.config.channels.max_channels,
                }),
        }
    }

    /// Save with staged quota recovery: evict content caches, then compact
    /// the oldest tenth of the lineup, then give up.
    async fn persist_lineup(&self, store: &mut ChannelStore) -> Result<(), StorageError> {
        let now_ms = self.clock.now_ms();
        match store.save(now_ms).await {
            Ok(()) => return Ok(()),
            Err(StorageError::QuotaExceeded { .. }) => {
                warn!("storage quota exceeded; evicting content caches and retrying");
                self.content_cache.lock().await.clear();
            }
            Err(e) => return Err(e),
        }
        match store.save(now_ms).await {
            Ok(()) => return Ok(()),
            Err(StorageError::QuotaExceeded { .. }) => {
                let removed = store.compact_oldest();
                for id in &removed {
                    self.emit(ChannelEvent::Deleted(*id));
                }
            }
            Err(e) => return Err(e),
        }
        store.save(now_ms).await
    }
}
