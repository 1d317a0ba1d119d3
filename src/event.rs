//! Event definitions for the kernel.
//!
//! Events are the only way work enters the simulation loop: the interaction
//! router, kernel-internal bookkeeping and application logic all schedule
//! [`Event`]s, which the kernel executes once their time is granted.

use std::fmt;

use crate::application::AppResult;
use crate::interaction::ApplicationInteraction;
use crate::objects::{
    BatteryData, ChargingStationData, EnvironmentEvent, InductionLoopInfo, LaneAreaDetectorInfo,
    TrafficLightGroupInfo, VehicleData,
};
use crate::types::{MessageId, SimTime, UnitId};
use crate::unit::UnitContext;
use crate::v2x::ReceivedV2xMessage;

/// Niceness register.
///
/// Lower values run first among events scheduled for the same time.
pub mod nice {
    pub const MAX_PRIORITY: i64 = i64::MIN;
    pub const DEFAULT: i64 = 0;
    pub const MIN_PRIORITY: i64 = i64::MAX;

    pub const START_APPLICATIONS: i64 = MAX_PRIORITY;

    pub const VEHICLE_ADDED: i64 = -99_999_900;
    pub const VEHICLE_UPDATED: i64 = -99_999_899;
    pub const BATTERY_UPDATED: i64 = -99_999_898;
    pub const CHARGING_REJECTED: i64 = -99_999_897;

    pub const UPDATE_TRAFFIC_LIGHT: i64 = -99_999_800;
    pub const UPDATE_TRAFFIC_DETECTORS: i64 = -99_999_700;
    pub const UPDATE_CHARGING_STATION: i64 = -99_999_600;

    pub const V2X_MESSAGE_ACKNOWLEDGEMENT: i64 = -99_999_500;
    pub const V2X_MESSAGE_RECEPTION: i64 = -99_999_499;
    pub const V2X_FULL_MESSAGE_RECEPTION: i64 = -99_999_498;

    pub const GARBAGE_COLLECTION: i64 = DEFAULT;

    /// Removal of vehicles that left the simulation.
    pub const VEHICLE_REMOVED: i64 = 99_999_000;
    /// End-of-simulation teardown of every unit.
    pub const UNIT_REMOVED: i64 = 99_999_999;
}

/// Where an event is delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// A simulation unit, looked up in the registry at execution time.
    Unit(UnitId),
    /// The kernel itself (application start, removals, garbage collection).
    Kernel,
}

/// An inline callback executed against the target unit.
pub struct UnitCallback(Box<dyn FnOnce(&mut UnitContext<'_>) -> AppResult + Send>);

impl UnitCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut UnitContext<'_>) -> AppResult + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn call(self, ctx: &mut UnitContext<'_>) -> AppResult {
        (self.0)(ctx)
    }
}

impl fmt::Debug for UnitCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UnitCallback(..)")
    }
}

/// The resource an event carries.
#[derive(Debug)]
pub enum EventPayload {
    /// Load and start the named applications on a freshly registered unit.
    StartApplications { unit_id: UnitId, applications: Vec<String> },
    /// Tear down and unregister the listed units.
    RemoveUnits(Vec<UnitId>),
    /// End-of-simulation teardown of every unit.
    ShutdownAll,
    /// Purge stale environment events and cached V2X messages.
    GarbageCollection,

    VehicleAdded(VehicleData),
    VehicleUpdated(VehicleData),
    BatteryUpdated(BatteryData),
    ChargingDenied { charging_station_id: UnitId },
    TrafficLightUpdated(TrafficLightGroupInfo),
    TrafficDetectorsUpdated {
        induction_loops: Vec<InductionLoopInfo>,
        lane_area_detectors: Vec<LaneAreaDetectorInfo>,
    },
    ChargingStationUpdated(ChargingStationData),
    V2xMessageReceived(ReceivedV2xMessage),
    V2xAcknowledgement {
        message_id: MessageId,
        negative_reasons: Vec<String>,
    },
    EnvironmentSensor(EnvironmentEvent),
    ApplicationInteraction(ApplicationInteraction),
    /// Self-scheduled event for the named application.
    ApplicationEvent {
        application: String,
        resource: serde_json::Value,
    },
    Callback(UnitCallback),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::StartApplications { .. } => "StartApplications",
            EventPayload::RemoveUnits(_) => "RemoveUnits",
            EventPayload::ShutdownAll => "ShutdownAll",
            EventPayload::GarbageCollection => "GarbageCollection",
            EventPayload::VehicleAdded(_) => "VehicleAdded",
            EventPayload::VehicleUpdated(_) => "VehicleUpdated",
            EventPayload::BatteryUpdated(_) => "BatteryUpdated",
            EventPayload::ChargingDenied { .. } => "ChargingDenied",
            EventPayload::TrafficLightUpdated(_) => "TrafficLightUpdated",
            EventPayload::TrafficDetectorsUpdated { .. } => "TrafficDetectorsUpdated",
            EventPayload::ChargingStationUpdated(_) => "ChargingStationUpdated",
            EventPayload::V2xMessageReceived(_) => "V2xMessageReceived",
            EventPayload::V2xAcknowledgement { .. } => "V2xAcknowledgement",
            EventPayload::EnvironmentSensor(_) => "EnvironmentSensor",
            EventPayload::ApplicationInteraction(_) => "ApplicationInteraction",
            EventPayload::ApplicationEvent { .. } => "ApplicationEvent",
            EventPayload::Callback(_) => "Callback",
        }
    }
}

/// A scheduled unit of work.
///
/// Events are totally ordered by `(time, nice, insertion sequence)`; the
/// sequence number is assigned by the [`EventQueue`](crate::queue::EventQueue).
#[derive(Debug)]
pub struct Event {
    /// The simulation time at which this event executes
    pub time: SimTime,
    /// Tie-break among events at the same time; lower runs first
    pub nice: i64,
    pub target: EventTarget,
    pub payload: EventPayload,
}

impl Event {
    /// Creates a new event with [`nice::DEFAULT`] niceness.
    pub fn new(time: SimTime, target: EventTarget, payload: EventPayload) -> Self {
        Self {
            time,
            nice: nice::DEFAULT,
            target,
            payload,
        }
    }

    /// Creates an event delivered to a unit.
    pub fn for_unit(time: SimTime, nice: i64, unit_id: impl Into<UnitId>, payload: EventPayload) -> Self {
        Self {
            time,
            nice,
            target: EventTarget::Unit(unit_id.into()),
            payload,
        }
    }

    /// Creates an event handled by the kernel.
    pub fn for_kernel(time: SimTime, nice: i64, payload: EventPayload) -> Self {
        Self {
            time,
            nice,
            target: EventTarget::Kernel,
            payload,
        }
    }

    /// Creates an inline callback event on a unit.
    pub fn callback<F>(time: SimTime, unit_id: impl Into<UnitId>, f: F) -> Self
    where
        F: FnOnce(&mut UnitContext<'_>) -> AppResult + Send + 'static,
    {
        Self::for_unit(time, nice::DEFAULT, unit_id, EventPayload::Callback(UnitCallback::new(f)))
    }

    pub fn with_nice(mut self, nice: i64) -> Self {
        self.nice = nice;
        self
    }

    /// The target unit, if this event is delivered to one.
    pub fn unit_id(&self) -> Option<&str> {
        match &self.target {
            EventTarget::Unit(id) => Some(id),
            EventTarget::Kernel => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::for_unit(100, nice::VEHICLE_UPDATED, "veh_0", EventPayload::GarbageCollection);
        assert_eq!(event.time, 100);
        assert_eq!(event.nice, nice::VEHICLE_UPDATED);
        assert_eq!(event.unit_id(), Some("veh_0"));
        assert_eq!(event.payload.name(), "GarbageCollection");
    }

    #[test]
    fn test_kernel_event() {
        let event = Event::new(5, EventTarget::Kernel, EventPayload::ShutdownAll).with_nice(nice::UNIT_REMOVED);
        assert_eq!(event.unit_id(), None);
        assert_eq!(event.nice, nice::UNIT_REMOVED);
    }

    #[test]
    fn test_niceness_order() {
        assert!(nice::START_APPLICATIONS < nice::VEHICLE_ADDED);
        assert!(nice::VEHICLE_ADDED < nice::VEHICLE_UPDATED);
        assert!(nice::V2X_MESSAGE_RECEPTION < nice::GARBAGE_COLLECTION);
        assert!(nice::GARBAGE_COLLECTION < nice::VEHICLE_REMOVED);
        assert!(nice::VEHICLE_REMOVED < nice::UNIT_REMOVED);
    }

    #[test]
    fn test_callback_debug() {
        let event = Event::callback(10, "rsu_0", |_ctx| Ok(()));
        let debug = format!("{:?}", event);
        assert!(debug.contains("UnitCallback"));
    }
}
