//! Plain data holders carried as event and interaction payloads.
//!
//! The kernel treats these as opaque records: it reads identifiers to route
//! them and positions to hand them to the coupling layer, nothing more.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{SimTime, UnitId};

/// A projected 2D coordinate in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianPoint {
    pub x: f64,
    pub y: f64,
}

impl CartesianPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &CartesianPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Vehicle class, used to pick the unit kind at promotion time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    #[default]
    Car,
    ElectricVehicle,
    Bus,
    Truck,
    Bicycle,
    Emergency,
}

/// Vehicle type descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
    pub name: String,
    #[serde(default)]
    pub vehicle_class: VehicleClass,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub max_speed: f64,
}

impl VehicleType {
    pub fn new(name: impl Into<String>, vehicle_class: VehicleClass) -> Self {
        Self {
            name: name.into(),
            vehicle_class,
            length: 5.0,
            max_speed: 70.0,
        }
    }
}

/// A route through the road network, given as an ordered list of edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRoute {
    pub id: String,
    pub edge_ids: Vec<String>,
    #[serde(default)]
    pub length: f64,
}

/// Departure parameters of a vehicle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleDeparture {
    /// Route the vehicle follows. `None` for routeless vehicles.
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub departure_lane: i32,
    #[serde(default)]
    pub departure_pos: f64,
    #[serde(default)]
    pub departure_speed: f64,
}

/// Origin/destination pair of a routeless vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleTrip {
    pub origin: CartesianPoint,
    pub destination: CartesianPoint,
}

/// Snapshot of a vehicle's movement state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    pub name: UnitId,
    pub time: SimTime,
    pub position: CartesianPoint,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub route_id: Option<String>,
}

impl VehicleData {
    pub fn new(name: impl Into<UnitId>, time: SimTime, position: CartesianPoint) -> Self {
        Self {
            name: name.into(),
            time,
            position,
            speed: 0.0,
            heading: 0.0,
            route_id: None,
        }
    }
}

/// Battery state of an electric vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryData {
    pub owner_id: UnitId,
    pub time: SimTime,
    /// State of charge in `[0, 1]`.
    pub state_of_charge: f64,
    #[serde(default)]
    pub capacity_wh: f64,
}

/// Static description of a traffic light group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightGroup {
    pub group_id: String,
    #[serde(default)]
    pub position: Option<CartesianPoint>,
    /// Signal ids belonging to this group.
    #[serde(default)]
    pub signals: Vec<String>,
}

/// Signal state of a single light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficLightState {
    Red,
    RedYellow,
    Yellow,
    Green,
    GreenPriority,
    Off,
}

/// Dynamic state of a traffic light group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightGroupInfo {
    pub group_id: String,
    pub current_program: String,
    pub current_phase: u32,
    #[serde(default)]
    pub states: Vec<TrafficLightState>,
}

/// Aggregated reading of an induction loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InductionLoopInfo {
    pub name: String,
    pub vehicle_count: u32,
    #[serde(default)]
    pub mean_speed: f64,
}

/// Aggregated reading of a lane area detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneAreaDetectorInfo {
    pub name: String,
    pub vehicle_count: u32,
    #[serde(default)]
    pub mean_speed: f64,
    #[serde(default)]
    pub length: f64,
}

/// State of a charging station and its spots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargingStationData {
    pub name: UnitId,
    pub time: SimTime,
    #[serde(default)]
    pub position: Option<CartesianPoint>,
    /// Spot id to the vehicle occupying it, if any.
    #[serde(default)]
    pub spots: BTreeMap<String, Option<UnitId>>,
}

/// Kind of environment sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorType {
    Ice,
    Snow,
    Fog,
    Rain,
    Obstacle,
    Roadwork,
    Parking,
}

/// A time-bounded environment observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEvent {
    pub sensor_type: SensorType,
    pub strength: i32,
    pub from: SimTime,
    pub until: SimTime,
}

impl EnvironmentEvent {
    /// Returns true if the event is valid at `time`.
    pub fn is_active_at(&self, time: SimTime) -> bool {
        self.from <= time && time <= self.until
    }
}
