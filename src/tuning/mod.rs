//! Tuning coordinator
//!
//! Atomic channel-switch transactions. A switch resolves the new channel's
//! content first and only then touches the player, so a failed resolve never
//! leaves a blank screen. One switch is in flight at a time; a second
//! request while switching is rejected silently. Cancellation is checked at
//! every await boundary and is never user-visible.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::CatalogProvider;
use crate::clock::SharedClock;
use crate::errors::{ChannelError, ContentError, RetuneError};
use crate::manager::ChannelManager;
use crate::models::channel::ChannelConfig;
use crate::models::schedule::ScheduledProgram;
use crate::scheduler::{AnchorStrategy, Scheduler, calculator};

/// Player collaborator. Driven externally once `ProgramStart` fires; the
/// coordinator only stops it and feeds it metadata.
#[async_trait]
pub trait PlayerAdapter: Send + Sync {
    /// Stop any active transcode session before switching away.
    async fn stop_transcode_session(&self);
    /// Arm the channel-transition overlay, e.g. `"4 Movies"`.
    async fn show_transition_hint(&self, hint: &str);
    /// Stop playback.
    async fn stop(&self);
    /// Now-playing metadata for the newly tuned channel.
    async fn notify_now_playing(&self, channel: &ChannelConfig, program: &ScheduledProgram);
}

/// Global error sink. The core emits kinds and messages; the host maps them
/// to user-visible text and recovery actions.
pub trait ErrorSink: Send + Sync {
    fn report(&self, kind: &'static str, message: String);
}

/// Resets the in-flight flag on every exit path.
struct SwitchGuard<'a>(&'a AtomicBool);

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TuningCoordinator<C: CatalogProvider + 'static> {
    manager: Arc<ChannelManager<C>>,
    scheduler: Scheduler,
    player: Arc<dyn PlayerAdapter>,
    error_sink: Arc<dyn ErrorSink>,
    clock: SharedClock,
    anchor_strategy: AnchorStrategy,
    switching: AtomicBool,
}

impl<C: CatalogProvider + 'static> TuningCoordinator<C> {
    pub fn new(
        manager: Arc<ChannelManager<C>>,
        scheduler: Scheduler,
        player: Arc<dyn PlayerAdapter>,
        error_sink: Arc<dyn ErrorSink>,
        clock: SharedClock,
        anchor_strategy: AnchorStrategy,
    ) -> Self {
        Self {
            manager,
            scheduler,
            player,
            error_sink,
            clock,
            anchor_strategy,
            switching: AtomicBool::new(false),
        }
    }

    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::SeqCst)
    }

    /// Switch playback to a channel.
    ///
    /// Ordering: resolve content, then stop prior playback, then load and
    /// sync the schedule, then mark the channel current. Resolution failures
    /// go to the error sink and leave the player untouched.
    pub async fn switch_to_channel(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<(), RetuneError> {
        if self.switching.swap(true, Ordering::SeqCst) {
            debug!(id = %id, "switch already in flight; ignoring");
            return Ok(());
        }
        let _guard = SwitchGuard(&self.switching);

        if token.is_cancelled() {
            return Ok(());
        }

        let channel = self
            .manager
            .get_channel(id)
            .await
            .ok_or(ChannelError::NotFound { id })?;

        // Resolve before touching the player. A dead source must not blank
        // the screen the viewer is currently watching.
        let content = match self.manager.resolve_channel_content(id, token).await {
            Ok(content) => content,
            Err(RetuneError::Content(ContentError::Aborted)) => return Ok(()),
            Err(error) => {
                if token.is_cancelled() {
                    return Ok(());
                }
                warn!(id = %id, error = %error, "content resolution failed during switch");
                self.error_sink.report(error.kind(), error.to_string());
                return Ok(());
            }
        };
        if token.is_cancelled() {
            return Ok(());
        }

        self.player.stop_transcode_session().await;
        if token.is_cancelled() {
            return Ok(());
        }
        let hint = format!("{} {}", channel.number, channel.name);
        self.player.show_transition_hint(&hint).await;
        self.player.stop().await;
        if token.is_cancelled() {
            return Ok(());
        }

        let schedule = match calculator::daily_schedule_config(
            &channel,
            &content,
            self.clock.now_ms(),
            self.clock.local_offset(),
            self.anchor_strategy,
        ) {
            Ok(schedule) => schedule,
            Err(error) => {
                self.error_sink
                    .report("content-unavailable", error.to_string());
                return Ok(());
            }
        };
        if let Err(error) = self.scheduler.load_channel(&schedule) {
            self.error_sink
                .report("content-unavailable", error.to_string());
            return Ok(());
        }
        let program = match self.scheduler.sync_to_current_time() {
            Ok(program) => program,
            Err(error) => {
                self.error_sink
                    .report("content-unavailable", error.to_string());
                return Ok(());
            }
        };
        self.player.notify_now_playing(&channel, &program).await;

        self.manager.set_current_channel(id).await?;
        info!(number = channel.number, name = %channel.name, "tuned to channel");
        Ok(())
    }

    /// Resolve a channel number to its id, then switch.
    pub async fn switch_to_channel_by_number(
        &self,
        number: u16,
        token: &CancellationToken,
    ) -> Result<(), RetuneError> {
        let channel = self
            .manager
            .get_channel_by_number(number)
            .await
            .ok_or(ChannelError::NumberNotFound { number })?;
        self.switch_to_channel(channel.id, token).await
    }

    /// Channel-up: next channel in lineup order, wrapping.
    pub async fn switch_to_next_channel(
        &self,
        token: &CancellationToken,
    ) -> Result<(), RetuneError> {
        if let Some(channel) = self.manager.get_next_channel().await {
            self.switch_to_channel(channel.id, token).await
        } else {
            Ok(())
        }
    }

    /// Channel-down: previous channel in lineup order, wrapping.
    pub async fn switch_to_previous_channel(
        &self,
        token: &CancellationToken,
    ) -> Result<(), RetuneError> {
        if let Some(channel) = self.manager.get_previous_channel().await {
            self.switch_to_channel(channel.id, token).await
        } else {
            Ok(())
        }
    }
}
