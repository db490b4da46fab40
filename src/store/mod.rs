//! Channel store
//!
//! The authoritative in-memory lineup: channel map, channel order, current
//! channel. Persists as one JSON document per storage namespace plus a
//! separate namespaced current-channel key. Loading is tolerant: malformed
//! channel entries are pruned (never repaired), missing seeds are re-derived
//! from the channel id, the order is reconciled against the surviving
//! channels, and any repair is written back once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::StorageError;
use crate::models::channel::ChannelConfig;
use crate::storage::SharedStorage;

/// On-disk shape of a channel lineup.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedChannels {
    channels: Vec<Value>,
    channel_order: Vec<String>,
    #[serde(default)]
    current_channel_id: Option<String>,
    saved_at: i64,
}

/// Outcome of a tolerant load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub loaded: usize,
    pub pruned: usize,
    pub repaired: bool,
}

pub struct ChannelStore {
    storage: SharedStorage,
    namespace: String,
    channels: HashMap<Uuid, ChannelConfig>,
    order: Vec<Uuid>,
    current: Option<Uuid>,
}

impl ChannelStore {
    pub fn new(storage: SharedStorage, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            channels: HashMap::new(),
            order: Vec::new(),
            current: None,
        }
    }

    fn channels_key(&self) -> String {
        self.namespace.clone()
    }

    fn current_key(&self) -> String {
        format!("{}:current", self.namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Rebind to another storage namespace (per server, per demo/live mode).
    /// Clears in-memory state; the caller is expected to reload.
    pub fn rebind(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
        self.channels.clear();
        self.order.clear();
        self.current = None;
        info!(namespace = %self.namespace, "channel store rebound");
    }

    // ------------------------------------------------------------------
    // In-memory accessors
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<&ChannelConfig> {
        self.channels.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut ChannelConfig> {
        self.channels.get_mut(id)
    }

    pub fn by_number(&self, number: u16) -> Option<&ChannelConfig> {
        self.channels.values().find(|c| c.number == number)
    }

    pub fn number_taken(&self, number: u16, excluding: Option<&Uuid>) -> bool {
        self.channels
            .values()
            .any(|c| c.number == number && Some(&c.id) != excluding)
    }

    /// Lowest free number in `[min, max]`, ascending.
    pub fn next_free_number(&self, min: u16, max: u16) -> Option<u16> {
        let taken: HashSet<u16> = self.channels.values().map(|c| c.number).collect();
        (min..=max).find(|n| !taken.contains(n))
    }

    /// Channels in lineup order.
    pub fn ordered(&self) -> Vec<&ChannelConfig> {
        self.order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .collect()
    }

    pub fn order(&self) -> &[Uuid] {
        &self.order
    }

    pub fn position_of(&self, id: &Uuid) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }

    pub fn current_channel_id(&self) -> Option<Uuid> {
        self.current
    }

    pub fn set_current(&mut self, id: Option<Uuid>) {
        self.current = id;
    }

    pub fn insert(&mut self, channel: ChannelConfig) {
        let id = channel.id;
        if self.channels.insert(id, channel).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<ChannelConfig> {
        let removed = self.channels.remove(id)?;
        self.order.retain(|o| o != id);
        if self.current == Some(*id) {
            self.current = self.order.first().copied();
        }
        Some(removed)
    }

    /// Reorder by the given ids; unknown ids are ignored and channels not
    /// mentioned keep their relative position at the end.
    pub fn reorder(&mut self, ordered_ids: &[Uuid]) {
        let mut next: Vec<Uuid> = ordered_ids
            .iter()
            .filter(|id| self.channels.contains_key(id))
            .copied()
            .collect();
        for id in &self.order {
            if !next.contains(id) {
                next.push(*id);
            }
        }
        self.order = next;
    }

    /// Replace the whole lineup in memory.
    pub fn replace_all(&mut self, channels: Vec<ChannelConfig>, current: Option<Uuid>) {
        self.channels.clear();
        self.order.clear();
        for channel in channels {
            self.insert(channel);
        }
        self.current = current.filter(|id| self.channels.contains_key(id));
        if self.current.is_none() {
            self.current = self.order.first().copied();
        }
    }

    /// Remove the oldest tenth of the lineup (at least one channel) by
    /// `created_at`. Returns the removed ids. Used by quota recovery.
    pub fn compact_oldest(&mut self) -> Vec<Uuid> {
        if self.channels.is_empty() {
            return Vec::new();
        }
        let count = (self.channels.len() / 10).max(1);
        let mut by_age: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = self
            .channels
            .values()
            .map(|c| (c.id, c.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);
        let victims: Vec<Uuid> = by_age.into_iter().take(count).map(|(id, _)| id).collect();
        for id in &victims {
            self.remove(id);
        }
        warn!(removed = victims.len(), "compacted oldest channels to fit storage quota");
        victims
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize and commit the lineup document.
    pub async fn save(&self, now_ms: i64) -> Result<(), StorageError> {
        let doc = PersistedChannels {
            channels: self
                .ordered()
                .iter()
                .map(|c| serde_json::to_value(c))
                .collect::<Result<Vec<_>, _>>()?,
            channel_order: self.order.iter().map(|id| id.to_string()).collect(),
            current_channel_id: self.current.map(|id| id.to_string()),
            saved_at: now_ms,
        };
        let raw = serde_json::to_string(&doc)?;
        self.storage.put(&self.channels_key(), &raw).await
    }

    /// Persist the current-channel pointer under its own namespaced key.
    pub async fn save_current(&self) -> Result<(), StorageError> {
        match self.current {
            Some(id) => {
                self.storage
                    .put(&self.current_key(), &id.to_string())
                    .await
            }
            None => self.storage.remove(&self.current_key()).await,
        }
    }

    /// Tolerant load. Returns how many channels survived and whether a
    /// repair write-back happened.
    pub async fn load(&mut self, now_ms: i64) -> Result<LoadOutcome, StorageError> {
        let key = self.channels_key();
        let Some(raw) = self.storage.get(&key).await? else {
            return Ok(LoadOutcome::default());
        };

        let doc: Value = serde_json::from_str(&raw)
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
        let Some(channel_values) = doc.get("channels").and_then(Value::as_array) else {
            return Err(StorageError::corrupted(&key, "channels is not an array"));
        };
        let Some(order_values) = doc.get("channel_order").and_then(Value::as_array) else {
            return Err(StorageError::corrupted(&key, "channel_order is not an array"));
        };

        let mut repaired = false;
        let mut pruned = 0usize;
        let mut channels: HashMap<Uuid, ChannelConfig> = HashMap::new();
        let mut insertion: Vec<Uuid> = Vec::new();
        let mut numbers_seen: HashSet<u16> = HashSet::new();

        for value in channel_values {
            match parse_channel(value) {
                Some((mut channel, seeds_present)) => {
                    if channel.number < 1
                        || channel.number > 999
                        || numbers_seen.contains(&channel.number)
                    {
                        warn!(id = %channel.id, number = channel.number,
                              "pruning channel with invalid or duplicate number");
                        pruned += 1;
                        repaired = true;
                        continue;
                    }
                    let (shuffle_present, phase_present) = seeds_present;
                    if !shuffle_present || !phase_present {
                        channel.normalize_seeds(shuffle_present, phase_present);
                        repaired = true;
                    }
                    numbers_seen.insert(channel.number);
                    insertion.push(channel.id);
                    channels.insert(channel.id, channel);
                }
                None => {
                    warn!("pruning malformed channel entry on load");
                    pruned += 1;
                    repaired = true;
                }
            }
        }

        // Filter the stored order to surviving channels.
        let mut order: Vec<Uuid> = order_values
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| Uuid::parse_str(s).ok())
            .filter(|id| channels.contains_key(id))
            .collect();
        let mut seen: HashSet<Uuid> = HashSet::new();
        order.retain(|id| seen.insert(*id));
        if order.len() != channels.len() {
            repaired = true;
            if order.is_empty() && !channels.is_empty() {
                // Rebuild by ascending number, id as tiebreak.
                let mut rebuilt: Vec<&ChannelConfig> = channels.values().collect();
                rebuilt.sort_by_key(|c| (c.number, c.id));
                order = rebuilt.into_iter().map(|c| c.id).collect();
            } else {
                for id in &insertion {
                    if !order.contains(id) {
                        order.push(*id);
                    }
                }
            }
        }

        let stored_current = doc
            .get("current_channel_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let current = match stored_current {
            Some(id) if channels.contains_key(&id) => Some(id),
            Some(_) => {
                repaired = true;
                order.first().copied()
            }
            None => order.first().copied(),
        };

        let loaded = channels.len();
        self.channels = channels;
        self.order = order;
        self.current = current;

        if repaired {
            if let Err(e) = self.save(now_ms).await {
                warn!(error = %e, "failed to write back repaired channel document");
            } else {
                debug!(loaded, pruned, "wrote back repaired channel document");
            }
        }

        Ok(LoadOutcome {
            loaded,
            pruned,
            repaired,
        })
    }
}

/// Parse one persisted channel entry. Returns the channel plus which seeds
/// were present and usable; `None` prunes the entry. Shared with the channel
/// import path so both run the same structural validation.
pub(crate) fn parse_channel(value: &Value) -> Option<(ChannelConfig, (bool, bool))> {
    let object = value.as_object()?;
    let shuffle_present = seed_usable(object.get("shuffle_seed"));
    let phase_present = seed_usable(object.get("phase_seed"));

    // Strip unusable seed values so they fall to the serde default instead
    // of failing the whole entry.
    let mut cleaned = object.clone();
    if !shuffle_present {
        cleaned.remove("shuffle_seed");
    }
    if !phase_present {
        cleaned.remove("phase_seed");
    }

    let channel: ChannelConfig = serde_json::from_value(Value::Object(cleaned)).ok()?;
    channel.content_source.validate().ok()?;
    if channel.name.trim().is_empty() {
        return None;
    }
    Some((channel, (shuffle_present, phase_present)))
}

fn seed_usable(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_u64)
        .is_some_and(|v| v <= u64::from(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::channel::{ChannelContentSource, ChannelDraft};
    use crate::storage::MemoryStorage;
    use crate::utils::hash::seed_from_id;
    use std::sync::Arc;

    fn playlist_source(key: &str) -> ChannelContentSource {
        ChannelContentSource::Playlist {
            playlist_key: key.into(),
        }
    }

    fn channel(number: u16, key: &str) -> ChannelConfig {
        ChannelConfig::from_draft(
            ChannelDraft {
                content_source: Some(playlist_source(key)),
                number: Some(number),
                ..Default::default()
            },
            number,
            chrono::Utc::now(),
        )
        .unwrap()
    }

    fn store() -> ChannelStore {
        ChannelStore::new(Arc::new(MemoryStorage::new()), "test_channels_v1")
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let mut store = ChannelStore::new(storage.clone(), "ns");
        let a = channel(1, "p1");
        let b = channel(2, "p2");
        let a_id = a.id;
        store.insert(a);
        store.insert(b);
        store.set_current(Some(a_id));
        store.save(1_000).await.unwrap();

        let mut fresh = ChannelStore::new(storage, "ns");
        let outcome = fresh.load(2_000).await.unwrap();
        assert_eq!(outcome.loaded, 2);
        assert_eq!(outcome.pruned, 0);
        assert!(!outcome.repaired);
        assert_eq!(fresh.current_channel_id(), Some(a_id));
        assert_eq!(fresh.ordered().len(), 2);
    }

    #[tokio::test]
    async fn load_prunes_invalid_sources_and_rederives_seeds() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let good = channel(1, "p1");
        let good_id = good.id;
        let mut good_value = serde_json::to_value(&good).unwrap();
        // Corrupt the seed: the loader must re-derive, not prune.
        good_value["shuffle_seed"] = serde_json::json!(-1);

        let bad = serde_json::json!({
            "id": Uuid::new_v4().to_string(),
            "number": 2,
            "name": "Broken",
            "content_source": {"type": "playlist", "playlist_key": ""},
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
        });

        let doc = serde_json::json!({
            "channels": [good_value, bad, "not-an-object"],
            "channel_order": [],
            "current_channel_id": Uuid::new_v4().to_string(),
            "saved_at": 0,
        });
        storage.put("ns", &doc.to_string()).await.unwrap();

        let mut store = ChannelStore::new(storage, "ns");
        let outcome = store.load(5_000).await.unwrap();
        assert_eq!(outcome.loaded, 1);
        assert_eq!(outcome.pruned, 2);
        assert!(outcome.repaired);
        let loaded = store.get(&good_id).unwrap();
        assert_eq!(loaded.shuffle_seed, seed_from_id(&good_id));
        // Unknown current falls back to first in order.
        assert_eq!(store.current_channel_id(), Some(good_id));
    }

    #[tokio::test]
    async fn load_rejects_non_array_channels() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        storage
            .put("ns", r#"{"channels": {}, "channel_order": [], "saved_at": 0}"#)
            .await
            .unwrap();
        let mut store = ChannelStore::new(storage, "ns");
        assert!(matches!(
            store.load(0).await,
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn empty_order_is_rebuilt_by_number() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let a = channel(5, "p1");
        let b = channel(2, "p2");
        let b_id = b.id;
        let doc = serde_json::json!({
            "channels": [serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap()],
            "channel_order": [],
            "saved_at": 0,
        });
        storage.put("ns", &doc.to_string()).await.unwrap();

        let mut store = ChannelStore::new(storage, "ns");
        store.load(0).await.unwrap();
        assert_eq!(store.order()[0], b_id);
    }

    #[test]
    fn compaction_removes_at_least_one() {
        let mut store = store();
        for n in 1..=5 {
            store.insert(channel(n, &format!("p{n}")));
        }
        let removed = store.compact_oldest();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn remove_reassigns_current() {
        let mut store = store();
        let a = channel(1, "p1");
        let b = channel(2, "p2");
        let (a_id, b_id) = (a.id, b.id);
        store.insert(a);
        store.insert(b);
        store.set_current(Some(a_id));
        store.remove(&a_id);
        assert_eq!(store.current_channel_id(), Some(b_id));
        store.remove(&b_id);
        assert_eq!(store.current_channel_id(), None);
    }

    #[test]
    fn rebind_clears_state() {
        let mut store = store();
        store.insert(channel(1, "p1"));
        store.rebind("other");
        assert!(store.is_empty());
        assert_eq!(store.current_channel_id(), None);
        assert_eq!(store.namespace(), "other");
    }
}
