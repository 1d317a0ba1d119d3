//! Boundary to the runtime infrastructure (RTI).
//!
//! Federates talk to the RTI through [`RtiAmbassador`] and are driven by it
//! through [`FederateAmbassador`]. [`RecordingRti`] is an in-memory RTI that
//! records everything a federate asks of it.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ErrorCode, KernelResult};
use crate::interaction::Interaction;
use crate::types::{SimTime, TimeDisplay};

/// Errors reported by the RTI.
#[derive(Error, Debug)]
pub enum RtiError {
    #[error("{}: {} ({reason})", ErrorCode::RequestingAdvanceTime, TimeDisplay::from(.time))]
    AdvanceTime { time: SimTime, reason: String },

    #[error("{}: {interaction} ({reason})", ErrorCode::ErrorSendInteraction)]
    SendInteraction { interaction: String, reason: String },
}

impl RtiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RtiError::AdvanceTime { .. } => ErrorCode::RequestingAdvanceTime,
            RtiError::SendInteraction { .. } => ErrorCode::ErrorSendInteraction,
        }
    }
}

/// Calls a federate makes into the RTI.
pub trait RtiAmbassador: Send {
    /// Asks the RTI to grant time `time` to this federate.
    fn request_advance_time(&mut self, time: SimTime) -> Result<(), RtiError>;

    /// Publishes an interaction to the other federates.
    fn trigger_interaction(&mut self, interaction: Interaction) -> Result<(), RtiError>;
}

impl<T: RtiAmbassador + ?Sized> RtiAmbassador for Box<T> {
    fn request_advance_time(&mut self, time: SimTime) -> Result<(), RtiError> {
        (**self).request_advance_time(time)
    }

    fn trigger_interaction(&mut self, interaction: Interaction) -> Result<(), RtiError> {
        (**self).trigger_interaction(interaction)
    }
}

/// Calls the RTI makes into a federate.
pub trait FederateAmbassador {
    /// One-time setup for the simulation interval `[start, end]`.
    fn initialize(&mut self, start: SimTime, end: SimTime) -> KernelResult<()>;

    /// Handles an interaction subscribed by this federate.
    fn process_interaction(&mut self, interaction: Interaction) -> KernelResult<()>;

    /// Advances the federate to `time`.
    fn process_time_advance_grant(&mut self, time: SimTime) -> KernelResult<()>;

    /// Final teardown. Calling it more than once has no further effect.
    fn finish_simulation(&mut self) -> KernelResult<()>;

    fn is_time_constrained(&self) -> bool {
        false
    }

    fn is_time_regulating(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Recorded {
    advance_requests: Vec<SimTime>,
    interactions: Vec<Interaction>,
    reject_interactions: bool,
}

/// In-memory RTI recording advance-time requests and published interactions.
///
/// Clones share the same recording, so a test can hand one clone to a
/// federate and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct RecordingRti {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingRti {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested time, in call order.
    pub fn advance_requests(&self) -> Vec<SimTime> {
        self.inner.lock().advance_requests.clone()
    }

    /// The smallest requested time, if any.
    pub fn earliest_request(&self) -> Option<SimTime> {
        self.inner.lock().advance_requests.iter().copied().min()
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.inner.lock().interactions.clone()
    }

    /// Removes and returns the recorded interactions.
    pub fn take_interactions(&self) -> Vec<Interaction> {
        std::mem::take(&mut self.inner.lock().interactions)
    }

    /// Makes subsequent `trigger_interaction` calls fail.
    pub fn reject_interactions(&self, reject: bool) {
        self.inner.lock().reject_interactions = reject;
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.advance_requests.clear();
        inner.interactions.clear();
    }
}

impl RtiAmbassador for RecordingRti {
    fn request_advance_time(&mut self, time: SimTime) -> Result<(), RtiError> {
        self.inner.lock().advance_requests.push(time);
        Ok(())
    }

    fn trigger_interaction(&mut self, interaction: Interaction) -> Result<(), RtiError> {
        let mut inner = self.inner.lock();
        if inner.reject_interactions {
            return Err(RtiError::SendInteraction {
                interaction: interaction.type_name().to_string(),
                reason: "rejected by recording RTI".to_string(),
            });
        }
        inner.interactions.push(interaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_shared_between_clones() {
        let rti = RecordingRti::new();
        let mut handle = rti.clone();
        handle.request_advance_time(20).unwrap();
        handle.request_advance_time(10).unwrap();
        handle
            .trigger_interaction(Interaction::EnvironmentSensorActivation {
                time: 10,
                unit_id: "rsu_0".to_string(),
            })
            .unwrap();

        assert_eq!(rti.advance_requests(), vec![20, 10]);
        assert_eq!(rti.earliest_request(), Some(10));
        assert_eq!(rti.take_interactions().len(), 1);
        assert!(rti.interactions().is_empty());
    }

    #[test]
    fn test_rejected_interaction_code() {
        let mut rti = RecordingRti::new();
        rti.reject_interactions(true);
        let err = rti
            .trigger_interaction(Interaction::EnvironmentSensorActivation {
                time: 0,
                unit_id: "x".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ErrorSendInteraction);
        assert!(err.to_string().contains("EnvironmentSensorActivation"));
    }
}
