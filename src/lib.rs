//! # cosim-kernel
//!
//! A discrete-event application kernel for time-stepped co-simulation, plus a
//! binary coupling to an external network simulator.
//!
//! ## Design Principles
//!
//! - **Federates**: The kernel and the network coupling are federates driven by
//!   a runtime infrastructure (RTI) through [`FederateAmbassador`]. They talk
//!   back through [`RtiAmbassador`].
//! - **Reactive Time**: Every scheduled event requests an advance to its time.
//!   The kernel never advances on its own.
//! - **Deterministic Order**: Events run by `(time, nice, insertion order)`,
//!   regardless of the number of dispatch threads.
//! - **Units**: Vehicles, road side units, traffic lights, traffic management
//!   centers, servers and charging stations host pluggable [`Application`]s.
//!
//! ## Features
//!
//! - `parallel` - Dispatch events for different units on a rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cosim_kernel::{
//!     Application, ApplicationKernel, ApplicationRegistry, Interaction, KernelConfig, RecordingRti,
//!     UnitMapping,
//! };
//! use cosim_kernel::types::SECOND;
//!
//! struct Beacon;
//! impl Application for Beacon {}
//!
//! let applications = ApplicationRegistry::new().with("Beacon", |_unit| Box::new(Beacon));
//! let rti = RecordingRti::new();
//! let mut kernel = ApplicationKernel::new(&KernelConfig::default(), rti.clone(), Arc::new(applications))?;
//!
//! kernel.initialize(0, 60 * SECOND)?;
//! kernel.process_interaction(Interaction::RsuRegistration {
//!     time: 0,
//!     mapping: UnitMapping::new("rsu_0", vec!["Beacon".to_string()]),
//! })?;
//! kernel.process_time_advance_grant(0)?;
//! assert!(kernel.registry().contains("rsu_0"));
//!
//! kernel.process_time_advance_grant(60 * SECOND)?;
//! assert!(kernel.registry().is_empty());
//! # Ok::<(), cosim_kernel::KernelError>(())
//! ```
//!
//! ## Network Coupling
//!
//! ```rust,ignore
//! use cosim_kernel::config::SimulationConfig;
//! use cosim_kernel::coupling::NetworkAmbassador;
//!
//! let config = SimulationConfig::from_yaml_file("simulation.yaml")?;
//! let mut network = NetworkAmbassador::connect(config.coupling.as_ref().unwrap(), rti)?;
//! network.initialize(config.simulation.start_time, config.simulation.end_time)?;
//! ```

pub mod types;
pub mod error;
pub mod event;
pub mod queue;
pub mod objects;
pub mod v2x;
pub mod interaction;
pub mod application;
pub mod unit;
pub mod registry;
pub mod cache;
pub mod context;
pub mod dispatch;
pub mod router;
pub mod rti;
pub mod kernel;
pub mod coupling;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{SimTime, TimeDisplay, UnitId};
pub use error::{ErrorCode, KernelError, KernelResult};
pub use event::{Event, EventPayload, EventTarget};
pub use queue::EventQueue;
pub use interaction::{Interaction, UnitMapping, VehicleMapping};
pub use application::{AppResult, Application, ApplicationFactory, ApplicationRegistry};
pub use unit::{SimulationUnit, UnitContext, UnitKind};
pub use registry::UnitRegistry;
pub use context::SimulationContext;
pub use router::{InteractionRouter, NavigationComponent};
pub use rti::{FederateAmbassador, RecordingRti, RtiAmbassador, RtiError};
pub use kernel::{ApplicationKernel, KernelState};
pub use coupling::{ClientServerChannel, CouplingError, IdTransformer, NetworkAmbassador};
pub use config::{ConfigError, CouplingConfig, KernelConfig, SimulationConfig, SimulationConfigBuilder};
pub use stats::{KernelStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// cosim_kernel::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
