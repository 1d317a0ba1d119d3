//! Event dispatch strategies.
//!
//! The kernel pops due events in batches that share the same time and
//! niceness, then hands each batch to a [`Dispatcher`]. The sequential
//! dispatcher executes the batch in order on the calling thread. The parallel
//! dispatcher (feature `parallel`) groups unit events by target and runs the
//! groups on a rayon thread pool; each unit is locked for the whole group, and
//! the produced work is merged back in batch order, so both dispatchers leave
//! the simulation in the same state.
//!
//! A failing event never cuts the batch short: every other event of the batch
//! still runs, and the error of the earliest failing event is returned once
//! the batch is done.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use std::collections::HashMap;

use crate::context::{Outcome, SimulationContext};
use crate::error::KernelResult;
use crate::event::Event;

/// Counters for one dispatched batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events handled by their target.
    pub delivered: u64,
    /// Events whose target unit was not registered.
    pub skipped: u64,
    /// True if the end-of-simulation teardown ran in this batch.
    pub shutdown: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Shutdown => {
                self.delivered += 1;
                self.shutdown = true;
            }
        }
    }
}

/// Executes a batch of due events against the context.
pub trait Dispatcher: Send {
    /// Executes `batch`, which is ordered by insertion sequence. Every event
    /// runs even if an earlier one fails; the first error in batch order is
    /// returned and all work produced by the batch stays applied.
    fn dispatch(&self, batch: Vec<Event>, ctx: &mut SimulationContext) -> KernelResult<DispatchReport>;

    /// Number of worker threads.
    fn threads(&self) -> usize;
}

/// Executes events one after another on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialDispatcher;

impl Dispatcher for SequentialDispatcher {
    fn dispatch(&self, batch: Vec<Event>, ctx: &mut SimulationContext) -> KernelResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut first_error = None;
        for event in batch {
            match ctx.execute(event) {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn threads(&self) -> usize {
        1
    }
}

/// Executes events for different units concurrently.
#[cfg(feature = "parallel")]
pub struct ParallelDispatcher {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelDispatcher {
    pub fn new(threads: usize) -> KernelResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("cosim-dispatch-{}", index))
            .build()
            .map_err(|err| {
                crate::config::ConfigError::Validation(format!("cannot build dispatch thread pool: {}", err))
            })?;
        Ok(Self { pool })
    }
}

#[cfg(feature = "parallel")]
impl Dispatcher for ParallelDispatcher {
    fn dispatch(&self, batch: Vec<Event>, ctx: &mut SimulationContext) -> KernelResult<DispatchReport> {
        // Kernel events touch the registry and must run alone.
        if batch.len() < 2 || batch.iter().any(|event| event.unit_id().is_none()) {
            return SequentialDispatcher.dispatch(batch, ctx);
        }

        let mut report = DispatchReport::default();
        let mut groups: Vec<(crate::registry::UnitHandle, Vec<(usize, Event)>)> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for (index, event) in batch.into_iter().enumerate() {
            let Some(id) = event.unit_id().map(str::to_string) else {
                continue;
            };
            if let Some(&group) = group_of.get(&id) {
                groups[group].1.push((index, event));
                continue;
            }
            match ctx.registry().get(&id) {
                Some(handle) => {
                    group_of.insert(id, groups.len());
                    groups.push((handle, vec![(index, event)]));
                }
                None => {
                    tracing::trace!(unit = %id, event = event.payload.name(), "unit not registered, dropping event");
                    report.skipped += 1;
                }
            }
        }

        let tables = ctx.tables();
        let results: Vec<Vec<(usize, KernelResult<()>, crate::unit::UnitOutput)>> = self.pool.install(|| {
            groups
                .into_par_iter()
                .map(|(handle, events)| {
                    let mut unit = handle.lock();
                    let mut results = Vec::with_capacity(events.len());
                    for (index, event) in events {
                        let mut output = crate::unit::UnitOutput::default();
                        let result = unit.process_event(event.time, event.payload, tables, &mut output);
                        results.push((index, result, output));
                    }
                    results
                })
                .collect()
        });

        let mut results: Vec<_> = results.into_iter().flatten().collect();
        results.sort_by_key(|(index, _, _)| *index);

        let mut first_error = None;
        for (_, result, output) in results {
            ctx.absorb(output);
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(feature = "parallel")]
impl std::fmt::Debug for ParallelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDispatcher")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

/// Picks the dispatcher for the configured number of scheduler threads.
pub fn dispatcher_for(threads: usize) -> KernelResult<Box<dyn Dispatcher>> {
    if threads <= 1 {
        return Ok(Box::new(SequentialDispatcher));
    }

    #[cfg(feature = "parallel")]
    {
        tracing::debug!(threads, "using parallel event dispatch");
        Ok(Box::new(ParallelDispatcher::new(threads)?))
    }

    #[cfg(not(feature = "parallel"))]
    {
        tracing::warn!(threads, "built without the `parallel` feature, dispatching sequentially");
        Ok(Box::new(SequentialDispatcher))
    }
}
