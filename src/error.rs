//! Error register and kernel error types.
//!
//! Every fatal error carries a stable 8-hex-digit [`ErrorCode`] for postmortem
//! triage. Codes are partitioned by subsystem: `0x0100_00xx` for the
//! application kernel and `0x0200_00xx` for the network coupling.

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::coupling::CouplingError;
use crate::rti::RtiError;
use crate::types::{SimTime, TimeDisplay, UnitId};
use crate::unit::UnitKind;

/// Stable numeric error register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    ConfigNotReadable = 0x0100_0000,

    UncaughtErrorInProcessInteraction = 0x0100_0010,
    RequestingAdvanceTime = 0x0100_0011,
    ErrorLoadingApplications = 0x0100_0012,
    ErrorAdvanceTime = 0x0100_0013,
    ErrorSendInteraction = 0x0100_0014,
    ErrorCalculateDeparture = 0x0100_0015,

    KernelNotInitialized = 0x0100_0020,
    KernelAlreadyInitialized = 0x0100_0021,
    KernelTerminated = 0x0100_0022,

    IdAlreadyAssigned = 0x0100_0030,
    IdNotInRegistry = 0x0100_0031,
    UnknownResource = 0x0100_0032,
    EventInPast = 0x0100_0033,

    UncaughtErrorDuringEvent = 0x0100_0040,

    ChargingStationUnknownEvent = 0x0100_0050,
    RsuUnknownEvent = 0x0100_0060,
    TrafficLightUnknownEvent = 0x0100_0070,
    VehicleUnknownEvent = 0x0100_0080,
    TmcUnknownEvent = 0x0100_0090,
    ServerUnknownEvent = 0x0100_00A0,

    CouplingHandshake = 0x0200_0001,
    CouplingUnexpectedCommand = 0x0200_0002,
    CouplingNegativeAcknowledgement = 0x0200_0003,
    CouplingFrame = 0x0200_0004,
    CouplingIo = 0x0200_0005,
    CouplingUnsupportedConfiguration = 0x0200_0006,
}

impl ErrorCode {
    /// The numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::ConfigNotReadable => "Configuration could not be read.",
            ErrorCode::UncaughtErrorInProcessInteraction => "Uncaught error while processing an interaction.",
            ErrorCode::RequestingAdvanceTime => "Could not request advance time.",
            ErrorCode::ErrorLoadingApplications => "Could not load applications.",
            ErrorCode::ErrorAdvanceTime => "Error during advance time.",
            ErrorCode::ErrorSendInteraction => "Could not send an interaction.",
            ErrorCode::ErrorCalculateDeparture => "Could not calculate the departure of a routeless vehicle.",
            ErrorCode::KernelNotInitialized => "The simulation kernel is not initialized.",
            ErrorCode::KernelAlreadyInitialized => "The simulation kernel is already initialized.",
            ErrorCode::KernelTerminated => "The simulation kernel is already terminated.",
            ErrorCode::IdAlreadyAssigned => "The id is already assigned to another unit.",
            ErrorCode::IdNotInRegistry => "The id of the unit is not in the registry.",
            ErrorCode::UnknownResource => "Unknown event resource.",
            ErrorCode::EventInPast => "The event is scheduled before the current simulation time.",
            ErrorCode::UncaughtErrorDuringEvent => "Uncaught error while processing an event.",
            ErrorCode::ChargingStationUnknownEvent => "Charging station received an unknown event.",
            ErrorCode::RsuUnknownEvent => "Road side unit received an unknown event.",
            ErrorCode::TrafficLightUnknownEvent => "Traffic light group received an unknown event.",
            ErrorCode::VehicleUnknownEvent => "Vehicle received an unknown event.",
            ErrorCode::TmcUnknownEvent => "Traffic management center received an unknown event.",
            ErrorCode::ServerUnknownEvent => "Server received an unknown event.",
            ErrorCode::CouplingHandshake => "Handshake with the network federate failed.",
            ErrorCode::CouplingUnexpectedCommand => "Unexpected command from the network federate.",
            ErrorCode::CouplingNegativeAcknowledgement => "The network federate did not acknowledge a command.",
            ErrorCode::CouplingFrame => "Malformed frame on the coupling channel.",
            ErrorCode::CouplingIo => "I/O error on the coupling channel.",
            ErrorCode::CouplingUnsupportedConfiguration => "Unsupported radio configuration.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error code: 0x{:08x}: {}", self.code(), self.description())
    }
}

/// Boxed error returned by application callbacks.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("{}: unit '{id}'", ErrorCode::IdAlreadyAssigned)]
    DuplicateUnit { id: UnitId },

    #[error("{}: unit '{id}'", ErrorCode::IdNotInRegistry)]
    UnitNotFound { id: UnitId },

    #[error("{}: event at {} but clock is at {}", ErrorCode::EventInPast, TimeDisplay::from(.event_time), TimeDisplay::from(.current_time))]
    EventInPast {
        event_time: SimTime,
        current_time: SimTime,
    },

    #[error("{code}: cannot {operation} in state {state}")]
    InvalidState {
        code: ErrorCode,
        operation: &'static str,
        state: String,
    },

    #[error("{}: unit '{unit_id}' cannot handle {payload}", .kind.unknown_event_code())]
    UnknownEvent {
        unit_id: UnitId,
        kind: UnitKind,
        payload: &'static str,
    },

    #[error("{}: kernel cannot handle {payload}", ErrorCode::UnknownResource)]
    UnknownResource { payload: &'static str },

    #[error("{}: application on unit '{unit_id}' failed: {source}", ErrorCode::UncaughtErrorDuringEvent)]
    Application {
        unit_id: UnitId,
        #[source]
        source: AppError,
    },

    #[error("{}: {interaction}", ErrorCode::UncaughtErrorInProcessInteraction)]
    ProcessInteraction {
        interaction: String,
        #[source]
        source: Box<KernelError>,
    },

    #[error("{}: granted {}", ErrorCode::ErrorAdvanceTime, TimeDisplay::from(.time))]
    AdvanceTime {
        time: SimTime,
        #[source]
        source: Box<KernelError>,
    },

    #[error(transparent)]
    Rti(#[from] RtiError),

    #[error("{}: {0}", ErrorCode::ConfigNotReadable)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coupling(#[from] CouplingError),
}

impl KernelError {
    /// Register code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            KernelError::DuplicateUnit { .. } => ErrorCode::IdAlreadyAssigned,
            KernelError::UnitNotFound { .. } => ErrorCode::IdNotInRegistry,
            KernelError::EventInPast { .. } => ErrorCode::EventInPast,
            KernelError::InvalidState { code, .. } => *code,
            KernelError::UnknownEvent { kind, .. } => kind.unknown_event_code(),
            KernelError::UnknownResource { .. } => ErrorCode::UnknownResource,
            KernelError::Application { .. } => ErrorCode::UncaughtErrorDuringEvent,
            KernelError::ProcessInteraction { .. } => ErrorCode::UncaughtErrorInProcessInteraction,
            KernelError::AdvanceTime { .. } => ErrorCode::ErrorAdvanceTime,
            KernelError::Rti(err) => err.code(),
            KernelError::Config(_) => ErrorCode::ConfigNotReadable,
            KernelError::Coupling(err) => err.code(),
        }
    }

    /// Walks through the wrapping layers and returns the innermost error.
    pub fn root_cause(&self) -> &KernelError {
        match self {
            KernelError::ProcessInteraction { source, .. } | KernelError::AdvanceTime { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
