//! Scheduler runtime
//!
//! Hosts the active channel's schedule and fires program boundaries against
//! the wall clock. One boundary timer is armed at a time, clamped to a
//! safety window; a 1 s drift guard re-syncs after suspend/resume or clock
//! jumps. Consumers observe `ProgramEnd` before `ProgramStart` at a
//! boundary and never see a duplicate start for the same airing.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::SchedulerConfig;
use crate::errors::ScheduleError;
use crate::models::schedule::{ScheduleConfig, ScheduleIndex, ScheduledProgram};
use crate::scheduler::calculator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Loaded,
    Running,
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    ProgramStart {
        channel_id: Uuid,
        program: ScheduledProgram,
    },
    ProgramEnd {
        channel_id: Uuid,
        program: ScheduledProgram,
    },
}

struct LoadedSchedule {
    channel_id: Uuid,
    index: ScheduleIndex,
    anchor_ms: i64,
}

#[derive(Default)]
struct Inner {
    state: SchedulerState,
    schedule: Option<LoadedSchedule>,
    current: Option<ScheduledProgram>,
    /// Airing key of the last emitted start, the duplicate-start guard.
    last_started: Option<(i64, usize)>,
    /// Rotated on every unload/load; cancels guard and timers together.
    lifetime: Option<CancellationToken>,
    /// Stale boundary timers detect themselves by generation mismatch.
    timer_generation: u64,
    guard_running: bool,
}

/// Program-boundary scheduler for the active channel.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SchedulerEvent>,
    clock: SharedClock,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(clock: SharedClock, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events: broadcast::channel(64).0,
            clock,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn get_state(&self) -> SchedulerState {
        self.inner.lock().unwrap().state
    }

    pub fn get_current_program(&self) -> Option<ScheduledProgram> {
        self.inner.lock().unwrap().current.clone()
    }

    pub fn get_next_program(&self) -> Option<ScheduledProgram> {
        let inner = self.inner.lock().unwrap();
        let schedule = inner.schedule.as_ref()?;
        let current = inner.current.as_ref()?;
        calculator::next_program(current, &schedule.index, schedule.anchor_ms).ok()
    }

    /// Build and install the index for a channel. Cancels any previous
    /// schedule's timers; emits nothing until the first sync.
    pub fn load_channel(&self, config: &ScheduleConfig) -> Result<(), ScheduleError> {
        let index = calculator::build_schedule_index(config)?;
        let mut inner = self.inner.lock().unwrap();
        Self::cancel_lifetime(&mut inner);
        inner.schedule = Some(LoadedSchedule {
            channel_id: config.channel_id,
            index,
            anchor_ms: config.anchor_ms,
        });
        inner.current = None;
        inner.last_started = None;
        inner.state = SchedulerState::Loaded;
        debug!(channel_id = %config.channel_id, "schedule loaded");
        Ok(())
    }

    /// Resolve the program airing right now, emit `ProgramStart` if it
    /// changed, and arm the boundary timer. Idempotent: calling again
    /// without a boundary crossing emits nothing.
    pub fn sync_to_current_time(&self) -> Result<ScheduledProgram, ScheduleError> {
        let mut inner = self.inner.lock().unwrap();
        let program = {
            let schedule = inner
                .schedule
                .as_ref()
                .ok_or_else(|| ScheduleError::invalid("no schedule loaded"))?;
            calculator::program_at_time(self.clock.now_ms(), &schedule.index, schedule.anchor_ms)?
        };

        if inner.last_started != Some(program.airing_key()) {
            inner.current = Some(program.clone());
            inner.last_started = Some(program.airing_key());
            self.emit_start(&inner, program.clone());
        } else {
            inner.current = Some(program.clone());
        }

        let lifetime = match &inner.lifetime {
            Some(token) => token.clone(),
            None => {
                let token = CancellationToken::new();
                inner.lifetime = Some(token.clone());
                token
            }
        };
        self.arm_boundary(&mut inner, program.remaining_ms, &lifetime);
        if !inner.guard_running {
            inner.guard_running = true;
            self.spawn_drift_guard(lifetime);
        }
        inner.state = SchedulerState::Running;
        Ok(program)
    }

    /// Cancel timers and clear state. Emits nothing; safe to call twice.
    pub fn unload(&self) {
        let mut inner = self.inner.lock().unwrap();
        Self::cancel_lifetime(&mut inner);
        inner.schedule = None;
        inner.current = None;
        inner.last_started = None;
        inner.state = SchedulerState::Idle;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn cancel_lifetime(inner: &mut Inner) {
        if let Some(token) = inner.lifetime.take() {
            token.cancel();
        }
        inner.timer_generation += 1;
        inner.guard_running = false;
    }

    fn emit_start(&self, inner: &Inner, program: ScheduledProgram) {
        if let Some(schedule) = &inner.schedule {
            let _ = self.events.send(SchedulerEvent::ProgramStart {
                channel_id: schedule.channel_id,
                program,
            });
        }
    }

    fn emit_end(&self, inner: &Inner, program: ScheduledProgram) {
        if let Some(schedule) = &inner.schedule {
            let _ = self.events.send(SchedulerEvent::ProgramEnd {
                channel_id: schedule.channel_id,
                program,
            });
        }
    }

    /// Arm a one-shot timer for the next boundary, clamped to the safety
    /// window. A resync bumps the generation so a stale timer is a no-op.
    fn arm_boundary(&self, inner: &mut Inner, remaining_ms: i64, lifetime: &CancellationToken) {
        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        let delay_ms = remaining_ms
            .clamp(
                self.config.min_boundary_timer.as_millis() as i64,
                self.config.max_boundary_timer.as_millis() as i64,
            ) as u64;
        let scheduler = self.clone();
        let token = lifetime.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                _ = token.cancelled() => return,
            }
            scheduler.handle_boundary(generation);
        });
    }

    fn handle_boundary(&self, generation: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.timer_generation != generation || inner.state != SchedulerState::Running {
            return;
        }
        let Some(current) = inner.current.clone() else {
            return;
        };

        // The timer is clamped to the safety maximum, so it can fire before
        // a long program actually ends. Re-arm for the true remainder.
        let now_ms = self.clock.now_ms();
        if now_ms < current.scheduled_end_ms {
            let lifetime = match &inner.lifetime {
                Some(token) => token.clone(),
                None => return,
            };
            self.arm_boundary(&mut inner, current.scheduled_end_ms - now_ms, &lifetime);
            return;
        }

        let next = {
            let Some(schedule) = inner.schedule.as_ref() else {
                return;
            };
            match calculator::next_program(&current, &schedule.index, schedule.anchor_ms) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "failed to advance schedule at boundary");
                    return;
                }
            }
        };

        self.emit_end(&inner, current);
        let mut started = next;
        started.is_current = true;
        started.elapsed_ms = (now_ms - started.scheduled_start_ms).max(0);
        started.remaining_ms = started.scheduled_end_ms - now_ms;
        inner.last_started = Some(started.airing_key());
        inner.current = Some(started.clone());
        self.emit_start(&inner, started.clone());

        let lifetime = match &inner.lifetime {
            Some(token) => token.clone(),
            None => return,
        };
        self.arm_boundary(&mut inner, started.remaining_ms, &lifetime);
    }

    /// Periodic wall-clock check. A suspend/resume or clock change lands
    /// the clock outside the current program's window; re-sync then.
    fn spawn_drift_guard(&self, lifetime: CancellationToken) {
        let scheduler = self.clone();
        let interval = self.config.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = lifetime.cancelled() => return,
                }
                if scheduler.check_drift() {
                    debug!("wall-clock drift detected; re-syncing schedule");
                    if let Err(e) = scheduler.sync_to_current_time() {
                        warn!(error = %e, "drift re-sync failed");
                    }
                }
            }
        });
    }

    fn check_drift(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        if inner.state != SchedulerState::Running {
            return false;
        }
        let Some(current) = &inner.current else {
            return false;
        };
        let tolerance = self.config.drift_tolerance.as_millis() as i64;
        let now_ms = self.clock.now_ms();
        now_ms < current.scheduled_start_ms - tolerance
            || now_ms >= current.scheduled_end_ms + tolerance
    }
}
