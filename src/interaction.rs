//! Interactions exchanged with the runtime infrastructure.
//!
//! An [`Interaction`] is a typed, time-stamped message between federates. The
//! kernel consumes the inbound variants through the
//! [`InteractionRouter`](crate::router::InteractionRouter) and emits the
//! outbound variants through the [`RtiAmbassador`](crate::rti::RtiAmbassador).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::objects::{
    BatteryData, CartesianPoint, ChargingStationData, EnvironmentEvent, InductionLoopInfo,
    LaneAreaDetectorInfo, TrafficLightGroup, TrafficLightGroupInfo, VehicleData, VehicleDeparture,
    VehicleRoute, VehicleTrip, VehicleType,
};
use crate::types::{MessageId, SimTime, UnitId};
use crate::v2x::{AdHocConfiguration, ReceiverInformation, V2xMessage};

/// Mapping of a stationary unit (RSU, server, charging station).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitMapping {
    pub name: UnitId,
    #[serde(default)]
    pub group: Option<String>,
    /// Names of the applications to load on this unit.
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub position: Option<CartesianPoint>,
}

impl UnitMapping {
    pub fn new(name: impl Into<UnitId>, applications: Vec<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            applications,
            position: None,
        }
    }

    pub fn with_position(mut self, position: CartesianPoint) -> Self {
        self.position = Some(position);
        self
    }

    pub fn has_applications(&self) -> bool {
        !self.applications.is_empty()
    }
}

/// Mapping of a vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleMapping {
    pub name: UnitId,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    pub vehicle_type: VehicleType,
}

impl VehicleMapping {
    pub fn has_applications(&self) -> bool {
        !self.applications.is_empty()
    }
}

/// Mapping of a traffic management center and the detectors it watches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TmcMapping {
    pub name: UnitId,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub induction_loops: BTreeSet<String>,
    #[serde(default)]
    pub lane_area_detectors: BTreeSet<String>,
}

impl TmcMapping {
    pub fn has_applications(&self) -> bool {
        !self.applications.is_empty()
    }
}

/// A routed vehicle announced for departure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRegistration {
    pub time: SimTime,
    pub mapping: VehicleMapping,
    pub departure: VehicleDeparture,
}

/// Opaque application-to-application payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInteraction {
    pub time: SimTime,
    /// Target unit; `None` broadcasts to every unit.
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A typed message exchanged through the runtime infrastructure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Interaction {
    RsuRegistration {
        time: SimTime,
        mapping: UnitMapping,
    },
    TrafficLightRegistration {
        time: SimTime,
        mapping: UnitMapping,
        traffic_light_group: TrafficLightGroup,
    },
    TmcRegistration {
        time: SimTime,
        mapping: TmcMapping,
    },
    ServerRegistration {
        time: SimTime,
        mapping: UnitMapping,
    },
    ChargingStationRegistration {
        time: SimTime,
        mapping: UnitMapping,
    },
    VehicleRegistration(VehicleRegistration),
    RoutelessVehicleRegistration {
        time: SimTime,
        mapping: VehicleMapping,
        trip: VehicleTrip,
        departure: VehicleDeparture,
    },
    ScenarioVehicleRegistration {
        time: SimTime,
        name: UnitId,
        vehicle_type: VehicleType,
    },
    VehicleUpdates {
        time: SimTime,
        #[serde(default)]
        added: Vec<VehicleData>,
        #[serde(default)]
        updated: Vec<VehicleData>,
        #[serde(default)]
        removed: Vec<UnitId>,
    },
    VehicleBatteryUpdates {
        time: SimTime,
        updated: Vec<BatteryData>,
    },
    TrafficLightUpdates {
        time: SimTime,
        updated: BTreeMap<String, TrafficLightGroupInfo>,
    },
    TrafficDetectorUpdates {
        time: SimTime,
        #[serde(default)]
        induction_loops: Vec<InductionLoopInfo>,
        #[serde(default)]
        lane_area_detectors: Vec<LaneAreaDetectorInfo>,
    },
    EnvironmentSensorUpdates {
        time: SimTime,
        unit_id: UnitId,
        event: EnvironmentEvent,
    },
    ChargingStationUpdate {
        time: SimTime,
        data: ChargingStationData,
    },
    VehicleChargingDenial {
        time: SimTime,
        vehicle_id: UnitId,
        charging_station_id: UnitId,
    },
    V2xMessageReception {
        time: SimTime,
        receiver_name: UnitId,
        message_id: MessageId,
        receiver_information: ReceiverInformation,
    },
    V2xFullMessageReception {
        time: SimTime,
        receiver_name: UnitId,
        message: V2xMessage,
        receiver_information: ReceiverInformation,
    },
    V2xMessageAcknowledgement {
        time: SimTime,
        source_name: UnitId,
        originating_message_id: MessageId,
        #[serde(default)]
        negative_reasons: Vec<String>,
    },
    VehicleRoutesInitialization {
        time: SimTime,
        routes: Vec<VehicleRoute>,
    },
    VehicleTypesInitialization {
        time: SimTime,
        types: Vec<VehicleType>,
    },
    VehicleRouteRegistration {
        time: SimTime,
        route: VehicleRoute,
    },
    ApplicationInteraction(ApplicationInteraction),
    AdHocCommunicationConfiguration {
        time: SimTime,
        configuration: AdHocConfiguration,
    },
    V2xMessageTransmission {
        time: SimTime,
        message: V2xMessage,
    },
    V2xMessageRemoval {
        time: SimTime,
        removed_message_ids: BTreeSet<MessageId>,
    },
    EnvironmentSensorActivation {
        time: SimTime,
        unit_id: UnitId,
    },
    /// An interaction type this crate has no model for.
    Other {
        time: SimTime,
        type_id: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Interaction {
    /// The simulation time the interaction is valid for.
    pub fn time(&self) -> SimTime {
        match self {
            Interaction::RsuRegistration { time, .. }
            | Interaction::TrafficLightRegistration { time, .. }
            | Interaction::TmcRegistration { time, .. }
            | Interaction::ServerRegistration { time, .. }
            | Interaction::ChargingStationRegistration { time, .. }
            | Interaction::RoutelessVehicleRegistration { time, .. }
            | Interaction::ScenarioVehicleRegistration { time, .. }
            | Interaction::VehicleUpdates { time, .. }
            | Interaction::VehicleBatteryUpdates { time, .. }
            | Interaction::TrafficLightUpdates { time, .. }
            | Interaction::TrafficDetectorUpdates { time, .. }
            | Interaction::EnvironmentSensorUpdates { time, .. }
            | Interaction::ChargingStationUpdate { time, .. }
            | Interaction::VehicleChargingDenial { time, .. }
            | Interaction::V2xMessageReception { time, .. }
            | Interaction::V2xFullMessageReception { time, .. }
            | Interaction::V2xMessageAcknowledgement { time, .. }
            | Interaction::VehicleRoutesInitialization { time, .. }
            | Interaction::VehicleTypesInitialization { time, .. }
            | Interaction::VehicleRouteRegistration { time, .. }
            | Interaction::AdHocCommunicationConfiguration { time, .. }
            | Interaction::V2xMessageTransmission { time, .. }
            | Interaction::V2xMessageRemoval { time, .. }
            | Interaction::EnvironmentSensorActivation { time, .. }
            | Interaction::Other { time, .. } => *time,
            Interaction::VehicleRegistration(registration) => registration.time,
            Interaction::ApplicationInteraction(interaction) => interaction.time,
        }
    }

    /// Type name used in log lines and statistics.
    pub fn type_name(&self) -> &str {
        match self {
            Interaction::RsuRegistration { .. } => "RsuRegistration",
            Interaction::TrafficLightRegistration { .. } => "TrafficLightRegistration",
            Interaction::TmcRegistration { .. } => "TmcRegistration",
            Interaction::ServerRegistration { .. } => "ServerRegistration",
            Interaction::ChargingStationRegistration { .. } => "ChargingStationRegistration",
            Interaction::VehicleRegistration(_) => "VehicleRegistration",
            Interaction::RoutelessVehicleRegistration { .. } => "RoutelessVehicleRegistration",
            Interaction::ScenarioVehicleRegistration { .. } => "ScenarioVehicleRegistration",
            Interaction::VehicleUpdates { .. } => "VehicleUpdates",
            Interaction::VehicleBatteryUpdates { .. } => "VehicleBatteryUpdates",
            Interaction::TrafficLightUpdates { .. } => "TrafficLightUpdates",
            Interaction::TrafficDetectorUpdates { .. } => "TrafficDetectorUpdates",
            Interaction::EnvironmentSensorUpdates { .. } => "EnvironmentSensorUpdates",
            Interaction::ChargingStationUpdate { .. } => "ChargingStationUpdate",
            Interaction::VehicleChargingDenial { .. } => "VehicleChargingDenial",
            Interaction::V2xMessageReception { .. } => "V2xMessageReception",
            Interaction::V2xFullMessageReception { .. } => "V2xFullMessageReception",
            Interaction::V2xMessageAcknowledgement { .. } => "V2xMessageAcknowledgement",
            Interaction::VehicleRoutesInitialization { .. } => "VehicleRoutesInitialization",
            Interaction::VehicleTypesInitialization { .. } => "VehicleTypesInitialization",
            Interaction::VehicleRouteRegistration { .. } => "VehicleRouteRegistration",
            Interaction::ApplicationInteraction(_) => "ApplicationInteraction",
            Interaction::AdHocCommunicationConfiguration { .. } => "AdHocCommunicationConfiguration",
            Interaction::V2xMessageTransmission { .. } => "V2xMessageTransmission",
            Interaction::V2xMessageRemoval { .. } => "V2xMessageRemoval",
            Interaction::EnvironmentSensorActivation { .. } => "EnvironmentSensorActivation",
            Interaction::Other { type_id, .. } => type_id,
        }
    }
}
