//! The application kernel.
//!
//! [`ApplicationKernel`] is the federate that hosts simulation units. It turns
//! inbound interactions into events, executes due events when the RTI grants
//! time, and publishes the interactions its units produce. The kernel is
//! neither time constrained nor time regulating: every scheduled event is
//! immediately followed by an advance-time request for its time.
//!
//! ```
//! use std::sync::Arc;
//! use cosim_kernel::application::ApplicationRegistry;
//! use cosim_kernel::config::KernelConfig;
//! use cosim_kernel::kernel::{ApplicationKernel, KernelState};
//! use cosim_kernel::rti::RecordingRti;
//! use cosim_kernel::types::SECOND;
//!
//! let rti = RecordingRti::new();
//! let mut kernel = ApplicationKernel::new(
//!     &KernelConfig::default(),
//!     rti.clone(),
//!     Arc::new(ApplicationRegistry::new()),
//! ).unwrap();
//!
//! kernel.initialize(0, 10 * SECOND).unwrap();
//! assert_eq!(rti.advance_requests(), vec![10 * SECOND]);
//!
//! kernel.process_time_advance_grant(10 * SECOND).unwrap();
//! assert_eq!(kernel.state(), KernelState::Terminated);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::application::ApplicationFactory;
use crate::config::{ConfigError, KernelConfig};
use crate::context::SimulationContext;
use crate::dispatch::{dispatcher_for, Dispatcher};
use crate::error::{ErrorCode, KernelError, KernelResult};
use crate::event::{nice, Event, EventPayload};
use crate::interaction::Interaction;
use crate::queue::EventQueue;
use crate::registry::UnitRegistry;
use crate::router::{InteractionRouter, NavigationComponent};
use crate::rti::{FederateAmbassador, RtiAmbassador};
use crate::stats::{KernelStats, Timer};
use crate::types::{SimTime, TimeDisplay};

/// Lifecycle of the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelState {
    Uninitialized,
    Initialized,
    Running,
    Finalizing,
    Terminated,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Federate hosting the simulation units and their applications.
pub struct ApplicationKernel {
    state: KernelState,
    queue: EventQueue,
    ctx: SimulationContext,
    router: InteractionRouter,
    dispatcher: Box<dyn Dispatcher>,
    rti: Box<dyn RtiAmbassador>,
    collect_stats: bool,
    stats: KernelStats,
    end_time: SimTime,
}

impl ApplicationKernel {
    /// Creates a kernel. Applications named in registrations are built by `applications`.
    pub fn new(
        config: &KernelConfig,
        rti: impl RtiAmbassador + 'static,
        applications: Arc<dyn ApplicationFactory>,
    ) -> KernelResult<Self> {
        config.validate()?;
        Ok(Self {
            state: KernelState::Uninitialized,
            queue: EventQueue::new(),
            ctx: SimulationContext::new(applications, config.message_cache_time),
            router: InteractionRouter::new(),
            dispatcher: dispatcher_for(config.event_scheduler_threads)?,
            rti: Box::new(rti),
            collect_stats: config.collect_stats,
            stats: KernelStats::default(),
            end_time: 0,
        })
    }

    /// Uses `navigation` to compute departures of routeless vehicles.
    pub fn with_navigation(mut self, navigation: Box<dyn NavigationComponent>) -> Self {
        self.router.set_navigation(navigation);
        self
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn current_time(&self) -> SimTime {
        self.ctx.time()
    }

    pub fn end_time(&self) -> SimTime {
        self.end_time
    }

    pub fn registry(&self) -> &UnitRegistry {
        self.ctx.registry()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn router(&self) -> &InteractionRouter {
        &self.router
    }

    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    /// Time of the earliest queued event.
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.peek_next_time()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Prepares the simulation of `[start, end]` and schedules the final
    /// teardown of all units at `end`.
    pub fn initialize(&mut self, start: SimTime, end: SimTime) -> KernelResult<()> {
        if self.state != KernelState::Uninitialized {
            return Err(self.invalid_state(ErrorCode::KernelAlreadyInitialized, "initialize"));
        }
        if end <= start {
            return Err(ConfigError::Validation(format!(
                "end time {} is not after start time {}",
                TimeDisplay(end),
                TimeDisplay(start)
            ))
            .into());
        }

        self.ctx.set_time(start);
        self.queue.advance_to(start);
        self.end_time = end;
        self.state = KernelState::Initialized;
        tracing::info!(
            threads = self.dispatcher.threads(),
            "application kernel initialized for {} to {}",
            TimeDisplay(start),
            TimeDisplay(end)
        );
        self.add_event(Event::for_kernel(end, nice::UNIT_REMOVED, EventPayload::ShutdownAll))
    }

    /// Routes an inbound interaction and schedules the resulting work.
    pub fn process_interaction(&mut self, interaction: Interaction) -> KernelResult<()> {
        match self.state {
            KernelState::Uninitialized => {
                return Err(self.invalid_state(ErrorCode::KernelNotInitialized, "process interaction"));
            }
            KernelState::Terminated => {
                tracing::debug!(
                    interaction = interaction.type_name(),
                    "kernel terminated, ignoring interaction"
                );
                return Ok(());
            }
            _ => {}
        }

        let type_name = interaction.type_name().to_string();
        tracing::trace!(interaction = %type_name, "processing interaction at {}", TimeDisplay(interaction.time()));
        let dropped_before = self.router.dropped();

        let result = self
            .router
            .route(interaction, &mut self.ctx)
            .and_then(|_| self.flush());

        if self.collect_stats {
            self.stats.interactions_received += 1;
            self.stats.interactions_dropped += self.router.dropped() - dropped_before;
            self.stats.peak_units = self.stats.peak_units.max(self.ctx.registry().len());
        }

        result.map_err(|err| {
            tracing::error!(interaction = %type_name, "{}", err);
            KernelError::ProcessInteraction {
                interaction: type_name,
                source: Box::new(err),
            }
        })
    }

    /// Executes every event due at or before `time`, then asks the RTI for the
    /// time of the next queued event.
    pub fn process_time_advance_grant(&mut self, time: SimTime) -> KernelResult<()> {
        match self.state {
            KernelState::Uninitialized => {
                return Err(self.invalid_state(ErrorCode::KernelNotInitialized, "advance time"));
            }
            KernelState::Terminated => {
                tracing::debug!("kernel terminated, ignoring grant for {}", TimeDisplay(time));
                return Ok(());
            }
            KernelState::Initialized => self.state = KernelState::Running,
            KernelState::Running | KernelState::Finalizing => {}
        }

        let timer = Timer::start();
        let result = self.advance(time);
        if self.collect_stats {
            self.stats.advance_grants += 1;
            self.stats.final_time = self.ctx.time();
            self.stats.wall_time_ms += timer.elapsed_ms();
            self.stats.messages_purged = self.ctx.purged_messages() as u64;
            self.stats.peak_queue_size = self.stats.peak_queue_size.max(self.queue.len());
        }

        result.map_err(|err| {
            tracing::error!("advance to {} failed: {}", TimeDisplay(time), err);
            KernelError::AdvanceTime {
                time,
                source: Box::new(err),
            }
        })
    }

    fn advance(&mut self, time: SimTime) -> KernelResult<()> {
        loop {
            let batch = self.queue.pop_due_batch(time);
            let Some(first) = batch.first() else {
                break;
            };

            let batch_time = first.time;
            self.queue.advance_to(batch_time);
            self.ctx.set_time(batch_time);

            let shutdown = batch
                .iter()
                .any(|event| matches!(event.payload, EventPayload::ShutdownAll));
            if shutdown {
                tracing::info!(units = self.ctx.registry().len(), "end of simulation at {}", TimeDisplay(batch_time));
                self.state = KernelState::Finalizing;
            }

            let dispatched = self.dispatcher.dispatch(batch, &mut self.ctx);
            let flushed = self.flush();
            let report = dispatched?;
            flushed?;

            if self.collect_stats {
                self.stats.batches_dispatched += 1;
                self.stats.events_processed += report.delivered;
                self.stats.events_skipped += report.skipped;
            }
            if report.shutdown {
                self.terminate();
            }
        }

        self.queue.advance_to(time);
        self.ctx.set_time(time);

        if self.state == KernelState::Terminated {
            return Ok(());
        }
        if let Some(next) = self.queue.peek_next_time() {
            self.rti.request_advance_time(next)?;
        }
        Ok(())
    }

    /// Inserts an event and requests an advance to its time.
    pub fn add_event(&mut self, event: Event) -> KernelResult<()> {
        if self.state == KernelState::Terminated {
            return Err(self.invalid_state(ErrorCode::KernelTerminated, "add event"));
        }
        let time = event.time;
        self.queue.insert(event)?;
        if self.collect_stats {
            self.stats.events_scheduled += 1;
        }
        self.rti.request_advance_time(time)?;
        Ok(())
    }

    /// Tears down all remaining units. Later calls have no effect.
    pub fn finish_simulation(&mut self) -> KernelResult<()> {
        match self.state {
            KernelState::Terminated => {
                tracing::debug!("simulation already finished");
                return Ok(());
            }
            KernelState::Uninitialized => {
                self.state = KernelState::Terminated;
                return Ok(());
            }
            _ => {}
        }

        tracing::info!(
            units = self.ctx.registry().len(),
            "finishing simulation at {}",
            TimeDisplay(self.ctx.time())
        );
        self.state = KernelState::Finalizing;
        let removed = self.ctx.remove_all();
        let flushed = self.flush();
        self.terminate();
        removed?;
        flushed
    }

    fn terminate(&mut self) {
        self.state = KernelState::Terminated;
        self.router.clear();
        self.ctx.tables_mut().clear();
        if self.collect_stats {
            tracing::debug!("{}", self.stats.summary());
        }
    }

    /// Hands work produced by the router and the units to the queue and the RTI.
    fn flush(&mut self) -> KernelResult<()> {
        let pending = self.ctx.take_pending();

        if matches!(self.state, KernelState::Finalizing | KernelState::Terminated) {
            if !pending.events.is_empty() {
                tracing::debug!(count = pending.events.len(), "dropping events scheduled during teardown");
            }
        } else {
            for event in pending.events {
                self.add_event(event)?;
            }
        }

        for interaction in pending.interactions {
            self.rti.trigger_interaction(interaction)?;
            if self.collect_stats {
                self.stats.interactions_sent += 1;
            }
        }
        Ok(())
    }

    fn invalid_state(&self, code: ErrorCode, operation: &'static str) -> KernelError {
        KernelError::InvalidState {
            code,
            operation,
            state: self.state.to_string(),
        }
    }
}

impl FederateAmbassador for ApplicationKernel {
    fn initialize(&mut self, start: SimTime, end: SimTime) -> KernelResult<()> {
        ApplicationKernel::initialize(self, start, end)
    }

    fn process_interaction(&mut self, interaction: Interaction) -> KernelResult<()> {
        ApplicationKernel::process_interaction(self, interaction)
    }

    fn process_time_advance_grant(&mut self, time: SimTime) -> KernelResult<()> {
        ApplicationKernel::process_time_advance_grant(self, time)
    }

    fn finish_simulation(&mut self) -> KernelResult<()> {
        ApplicationKernel::finish_simulation(self)
    }
}

impl fmt::Debug for ApplicationKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationKernel")
            .field("state", &self.state)
            .field("time", &self.ctx.time())
            .field("queued", &self.queue.len())
            .field("units", &self.ctx.registry().len())
            .field("threads", &self.dispatcher.threads())
            .finish()
    }
}
