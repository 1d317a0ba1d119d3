//! Explicit simulation context.
//!
//! [`SimulationContext`] owns everything the kernel mutates while handling
//! interactions and events: the clock, the unit registry, the shared lookup
//! tables and the buffers of work produced along the way. It is constructed
//! by the kernel and handed down to the router and the dispatchers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::ApplicationFactory;
use crate::cache::TimeCache;
use crate::error::{KernelError, KernelResult};
use crate::event::{Event, EventPayload, EventTarget};
use crate::interaction::Interaction;
use crate::objects::{VehicleRoute, VehicleType};
use crate::registry::{UnitHandle, UnitRegistry};
use crate::types::{SimTime, TimeDisplay};
use crate::unit::UnitOutput;
use crate::v2x::V2xMessage;

/// Process-wide lookup tables, readable from application callbacks.
#[derive(Debug, Default)]
pub struct SharedTables {
    pub routes: HashMap<String, VehicleRoute>,
    pub vehicle_types: HashMap<String, VehicleType>,
    pub v2x_messages: TimeCache<V2xMessage>,
}

impl SharedTables {
    pub fn clear(&mut self) {
        self.routes.clear();
        self.vehicle_types.clear();
        self.v2x_messages.clear();
    }
}

/// What happened to an executed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The target handled the event.
    Delivered,
    /// The target unit is not registered; the event was dropped.
    Skipped,
    /// The end-of-simulation teardown ran.
    Shutdown,
}

/// State shared by the router, the dispatchers and the kernel.
pub struct SimulationContext {
    time: SimTime,
    message_cache_time: SimTime,
    registry: UnitRegistry,
    tables: SharedTables,
    applications: Arc<dyn ApplicationFactory>,
    pending: UnitOutput,
    purged_messages: usize,
}

impl SimulationContext {
    pub fn new(applications: Arc<dyn ApplicationFactory>, message_cache_time: SimTime) -> Self {
        Self {
            time: 0,
            message_cache_time,
            registry: UnitRegistry::new(),
            tables: SharedTables::default(),
            applications,
            pending: UnitOutput::default(),
            purged_messages: 0,
        }
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub(crate) fn set_time(&mut self, time: SimTime) {
        self.time = time;
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut UnitRegistry {
        &mut self.registry
    }

    pub fn tables(&self) -> &SharedTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut SharedTables {
        &mut self.tables
    }

    /// Total number of V2X messages purged from the cache so far.
    pub fn purged_messages(&self) -> usize {
        self.purged_messages
    }

    /// Queues an event for insertion by the kernel.
    pub fn schedule(&mut self, event: Event) {
        self.pending.events.push(event);
    }

    /// Queues an outbound interaction.
    pub fn emit(&mut self, interaction: Interaction) {
        self.absorb(UnitOutput {
            events: Vec::new(),
            interactions: vec![interaction],
        });
    }

    /// Merges unit output into the pending buffers. Transmitted V2X messages
    /// are cached so that later receptions can be resolved.
    pub fn absorb(&mut self, output: UnitOutput) {
        for interaction in &output.interactions {
            if let Interaction::V2xMessageTransmission { time, message } = interaction {
                self.tables.v2x_messages.insert(*time, message.id, message.clone());
            }
        }
        self.pending.append(output);
    }

    /// Takes the work produced since the last call.
    pub fn take_pending(&mut self) -> UnitOutput {
        std::mem::take(&mut self.pending)
    }

    /// Executes one event on the calling thread.
    pub fn execute(&mut self, event: Event) -> KernelResult<Outcome> {
        match event.target {
            EventTarget::Kernel => self.execute_kernel_event(event.payload),
            EventTarget::Unit(id) => {
                let Some(handle) = self.registry.get(&id) else {
                    tracing::trace!(unit = %id, event = event.payload.name(), "unit not registered, dropping event");
                    return Ok(Outcome::Skipped);
                };
                let (result, output) = run_on_unit(&handle, event.time, event.payload, &self.tables);
                self.absorb(output);
                result.map(|_| Outcome::Delivered)
            }
        }
    }

    fn execute_kernel_event(&mut self, payload: EventPayload) -> KernelResult<Outcome> {
        match payload {
            EventPayload::StartApplications { unit_id, applications } => {
                self.start_applications(&unit_id, &applications)?;
                Ok(Outcome::Delivered)
            }
            EventPayload::RemoveUnits(ids) => {
                self.remove_units(&ids)?;
                Ok(Outcome::Delivered)
            }
            EventPayload::ShutdownAll => {
                self.remove_all()?;
                Ok(Outcome::Shutdown)
            }
            EventPayload::GarbageCollection => {
                self.garbage_collection();
                Ok(Outcome::Delivered)
            }
            other => Err(KernelError::UnknownResource { payload: other.name() }),
        }
    }

    fn start_applications(&mut self, unit_id: &str, names: &[String]) -> KernelResult<()> {
        let handle = self
            .registry
            .get(unit_id)
            .ok_or_else(|| KernelError::UnitNotFound { id: unit_id.to_string() })?;

        let mut output = UnitOutput::default();
        let result = {
            let mut unit = handle.lock();
            let loaded = unit.load_applications(names, self.applications.as_ref());
            tracing::info!(
                unit = %unit_id,
                loaded,
                "starting applications at {}",
                TimeDisplay(self.time)
            );
            unit.start(self.time, &self.tables, &mut output)
        };
        self.absorb(output);
        result
    }

    /// Tears down the listed units; ids that are not registered are ignored.
    pub fn remove_units(&mut self, ids: &[String]) -> KernelResult<usize> {
        let mut output = UnitOutput::default();
        let mut removed = 0;
        let mut first_error = None;
        for id in ids {
            match self.registry.remove(id, self.time, &self.tables, &mut output) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    removed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }
        self.absorb(output);
        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Tears down every unit. Safe to call repeatedly.
    pub fn remove_all(&mut self) -> KernelResult<usize> {
        let mut output = UnitOutput::default();
        let result = self.registry.remove_all(self.time, &self.tables, &mut output);
        self.absorb(output);
        result
    }

    /// Removes past environment events from every unit and purges V2X
    /// messages older than the retention window. Emits a
    /// [`Interaction::V2xMessageRemoval`] when messages were purged.
    pub fn garbage_collection(&mut self) {
        for handle in self.registry.handles() {
            handle.lock().clean_past_environment_events(self.time);
        }

        if self.message_cache_time == 0 {
            return;
        }
        let last_time = self.time.saturating_sub(self.message_cache_time);
        if last_time == 0 {
            return;
        }

        let removed = self.tables.v2x_messages.garbage_collection(last_time);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "purged cached V2X messages");
            self.purged_messages += removed.len();
            self.emit(Interaction::V2xMessageRemoval {
                time: self.time,
                removed_message_ids: removed,
            });
        }
    }
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("time", &self.time)
            .field("units", &self.registry.len())
            .field("routes", &self.tables.routes.len())
            .field("cached_messages", &self.tables.v2x_messages.len())
            .finish()
    }
}

/// Runs one event payload against a unit, collecting the work it produces.
///
/// Safe to call from worker threads: only the unit's own lock is taken.
pub fn run_on_unit(
    handle: &UnitHandle,
    time: SimTime,
    payload: EventPayload,
    tables: &SharedTables,
) -> (KernelResult<()>, UnitOutput) {
    let mut output = UnitOutput::default();
    let result = handle.lock().process_event(time, payload, tables, &mut output);
    (result, output)
}
