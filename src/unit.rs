//! Simulation units and the context their applications run in.
//!
//! A [`SimulationUnit`] is one simulated entity (vehicle, road side unit,
//! traffic light group, ...) with its loaded applications. The unit kind is an
//! explicit discriminator; kind-specific state lives in [`UnitState`] and the
//! set of events a kind accepts is checked in [`UnitKind::accepts`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::application::{AppResult, Application, ApplicationFactory};
use crate::context::SharedTables;
use crate::error::{ErrorCode, KernelError, KernelResult};
use crate::event::{nice, Event, EventPayload, UnitCallback};
use crate::interaction::{Interaction, TmcMapping, UnitMapping, VehicleMapping};
use crate::objects::{
    BatteryData, CartesianPoint, ChargingStationData, EnvironmentEvent, SensorType, TrafficLightGroup,
    TrafficLightGroupInfo, VehicleClass, VehicleData, VehicleRoute, VehicleType,
};
use crate::types::{MessageId, SimTime, UnitId};
use crate::v2x::V2xMessage;

/// The kind of a simulation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Vehicle,
    ElectricVehicle,
    RoadSideUnit,
    TrafficLightGroup,
    TrafficManagementCenter,
    Server,
    ChargingStation,
}

impl UnitKind {
    /// The per-kind registry table this kind is stored in.
    pub fn table(self) -> UnitTable {
        match self {
            UnitKind::Vehicle | UnitKind::ElectricVehicle => UnitTable::Vehicles,
            UnitKind::RoadSideUnit => UnitTable::RoadSideUnits,
            UnitKind::TrafficLightGroup => UnitTable::TrafficLights,
            UnitKind::TrafficManagementCenter => UnitTable::TrafficManagementCenters,
            UnitKind::Server => UnitTable::Servers,
            UnitKind::ChargingStation => UnitTable::ChargingStations,
        }
    }

    pub fn is_vehicle(self) -> bool {
        matches!(self, UnitKind::Vehicle | UnitKind::ElectricVehicle)
    }

    /// Error code raised when a unit of this kind receives an event it cannot handle.
    pub fn unknown_event_code(self) -> ErrorCode {
        match self {
            UnitKind::Vehicle | UnitKind::ElectricVehicle => ErrorCode::VehicleUnknownEvent,
            UnitKind::RoadSideUnit => ErrorCode::RsuUnknownEvent,
            UnitKind::TrafficLightGroup => ErrorCode::TrafficLightUnknownEvent,
            UnitKind::TrafficManagementCenter => ErrorCode::TmcUnknownEvent,
            UnitKind::Server => ErrorCode::ServerUnknownEvent,
            UnitKind::ChargingStation => ErrorCode::ChargingStationUnknownEvent,
        }
    }

    /// Returns true if units of this kind can process `payload`.
    pub fn accepts(self, payload: &EventPayload) -> bool {
        match payload {
            EventPayload::V2xMessageReceived(_)
            | EventPayload::V2xAcknowledgement { .. }
            | EventPayload::EnvironmentSensor(_)
            | EventPayload::ApplicationInteraction(_)
            | EventPayload::ApplicationEvent { .. }
            | EventPayload::Callback(_) => true,
            EventPayload::VehicleAdded(_)
            | EventPayload::VehicleUpdated(_)
            | EventPayload::ChargingDenied { .. } => self.is_vehicle(),
            EventPayload::BatteryUpdated(_) => self == UnitKind::ElectricVehicle,
            EventPayload::TrafficLightUpdated(_) => self == UnitKind::TrafficLightGroup,
            EventPayload::TrafficDetectorsUpdated { .. } => self == UnitKind::TrafficManagementCenter,
            EventPayload::ChargingStationUpdated(_) => self == UnitKind::ChargingStation,
            EventPayload::StartApplications { .. }
            | EventPayload::RemoveUnits(_)
            | EventPayload::ShutdownAll
            | EventPayload::GarbageCollection => false,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-kind registry tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitTable {
    Vehicles,
    RoadSideUnits,
    TrafficLights,
    TrafficManagementCenters,
    Servers,
    ChargingStations,
}

impl UnitTable {
    pub const ALL: [UnitTable; 6] = [
        UnitTable::Vehicles,
        UnitTable::RoadSideUnits,
        UnitTable::TrafficLights,
        UnitTable::TrafficManagementCenters,
        UnitTable::Servers,
        UnitTable::ChargingStations,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Kind-specific state of a unit.
#[derive(Clone, Debug, PartialEq)]
pub enum UnitState {
    Vehicle {
        vehicle_type: VehicleType,
        data: Option<VehicleData>,
        battery: Option<BatteryData>,
    },
    RoadSideUnit,
    TrafficLightGroup {
        group: TrafficLightGroup,
        info: Option<TrafficLightGroupInfo>,
    },
    TrafficManagementCenter {
        induction_loops: BTreeSet<String>,
        lane_area_detectors: BTreeSet<String>,
    },
    Server,
    ChargingStation {
        data: Option<ChargingStationData>,
    },
}

/// Work produced while a unit handles an event.
#[derive(Debug, Default)]
pub struct UnitOutput {
    pub events: Vec<Event>,
    pub interactions: Vec<Interaction>,
}

impl UnitOutput {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.interactions.is_empty()
    }

    pub fn append(&mut self, mut other: UnitOutput) {
        self.events.append(&mut other.events);
        self.interactions.append(&mut other.interactions);
    }
}

/// View of the simulation handed to application callbacks.
///
/// Applications read shared tables through it and queue new events and
/// outbound interactions; the kernel picks those up after the callback returns.
pub struct UnitContext<'a> {
    unit_id: &'a str,
    kind: UnitKind,
    position: Option<CartesianPoint>,
    time: SimTime,
    tables: &'a SharedTables,
    sensors: &'a BTreeMap<SensorType, EnvironmentEvent>,
    output: &'a mut UnitOutput,
}

impl<'a> UnitContext<'a> {
    pub fn unit_id(&self) -> &str {
        self.unit_id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn position(&self) -> Option<CartesianPoint> {
        self.position
    }

    pub fn route(&self, route_id: &str) -> Option<&VehicleRoute> {
        self.tables.routes.get(route_id)
    }

    pub fn vehicle_type(&self, name: &str) -> Option<&VehicleType> {
        self.tables.vehicle_types.get(name)
    }

    pub fn cached_message(&self, id: MessageId) -> Option<&V2xMessage> {
        self.tables.v2x_messages.get(id)
    }

    /// Strength of the active environment event of the given sensor type, or 0.
    pub fn sensor_strength(&self, sensor_type: SensorType) -> i32 {
        self.sensors
            .get(&sensor_type)
            .filter(|event| event.is_active_at(self.time))
            .map(|event| event.strength)
            .unwrap_or(0)
    }

    /// Schedules an inline callback on this unit.
    pub fn schedule<F>(&mut self, time: SimTime, f: F)
    where
        F: FnOnce(&mut UnitContext<'_>) -> AppResult + Send + 'static,
    {
        self.output.events.push(Event::for_unit(
            time,
            nice::DEFAULT,
            self.unit_id,
            EventPayload::Callback(UnitCallback::new(f)),
        ));
    }

    /// Schedules an event for the named application on this unit.
    pub fn schedule_application_event(
        &mut self,
        time: SimTime,
        application: impl Into<String>,
        resource: serde_json::Value,
    ) {
        self.output.events.push(Event::for_unit(
            time,
            nice::DEFAULT,
            self.unit_id,
            EventPayload::ApplicationEvent {
                application: application.into(),
                resource,
            },
        ));
    }

    /// Schedules an arbitrary event.
    pub fn schedule_event(&mut self, event: Event) {
        self.output.events.push(event);
    }

    /// Queues an outbound interaction to the runtime infrastructure.
    pub fn send_interaction(&mut self, interaction: Interaction) {
        self.output.interactions.push(interaction);
    }

    /// Sends a V2X message. The kernel caches it before handing it to the
    /// network federates.
    pub fn send_v2x_message(&mut self, message: V2xMessage) {
        self.output.interactions.push(Interaction::V2xMessageTransmission {
            time: self.time,
            message,
        });
    }
}

struct LoadedApplication {
    name: String,
    application: Box<dyn Application>,
}

/// A simulated entity with its applications.
pub struct SimulationUnit {
    id: UnitId,
    kind: UnitKind,
    group: Option<String>,
    position: Option<CartesianPoint>,
    applications: Vec<LoadedApplication>,
    environment_events: BTreeMap<SensorType, EnvironmentEvent>,
    state: UnitState,
    torn_down: bool,
}

impl SimulationUnit {
    fn with_state(id: UnitId, kind: UnitKind, state: UnitState) -> Self {
        Self {
            id,
            kind,
            group: None,
            position: None,
            applications: Vec::new(),
            environment_events: BTreeMap::new(),
            state,
            torn_down: false,
        }
    }

    fn from_mapping(mapping: &UnitMapping, kind: UnitKind, state: UnitState) -> Self {
        let mut unit = Self::with_state(mapping.name.clone(), kind, state);
        unit.group = mapping.group.clone();
        unit.position = mapping.position;
        unit
    }

    pub fn road_side_unit(mapping: &UnitMapping) -> Self {
        Self::from_mapping(mapping, UnitKind::RoadSideUnit, UnitState::RoadSideUnit)
    }

    pub fn server(mapping: &UnitMapping) -> Self {
        Self::from_mapping(mapping, UnitKind::Server, UnitState::Server)
    }

    pub fn charging_station(mapping: &UnitMapping) -> Self {
        Self::from_mapping(mapping, UnitKind::ChargingStation, UnitState::ChargingStation { data: None })
    }

    pub fn traffic_light_group(mapping: &UnitMapping, group: TrafficLightGroup) -> Self {
        let mut unit = Self::from_mapping(
            mapping,
            UnitKind::TrafficLightGroup,
            UnitState::TrafficLightGroup {
                group: group.clone(),
                info: None,
            },
        );
        if unit.position.is_none() {
            unit.position = group.position;
        }
        unit
    }

    pub fn traffic_management_center(mapping: &TmcMapping) -> Self {
        let mut unit = Self::with_state(
            mapping.name.clone(),
            UnitKind::TrafficManagementCenter,
            UnitState::TrafficManagementCenter {
                induction_loops: mapping.induction_loops.clone(),
                lane_area_detectors: mapping.lane_area_detectors.clone(),
            },
        );
        unit.group = mapping.group.clone();
        unit
    }

    /// Creates a vehicle; electric vehicle classes become [`UnitKind::ElectricVehicle`].
    pub fn vehicle(mapping: &VehicleMapping) -> Self {
        let kind = if mapping.vehicle_type.vehicle_class == VehicleClass::ElectricVehicle {
            UnitKind::ElectricVehicle
        } else {
            UnitKind::Vehicle
        };
        let mut unit = Self::with_state(
            mapping.name.clone(),
            kind,
            UnitState::Vehicle {
                vehicle_type: mapping.vehicle_type.clone(),
                data: None,
                battery: None,
            },
        );
        unit.group = mapping.group.clone();
        unit
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn position(&self) -> Option<CartesianPoint> {
        self.position
    }

    pub fn state(&self) -> &UnitState {
        &self.state
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn application_names(&self) -> Vec<&str> {
        self.applications.iter().map(|loaded| loaded.name.as_str()).collect()
    }

    pub fn environment_event(&self, sensor_type: SensorType) -> Option<&EnvironmentEvent> {
        self.environment_events.get(&sensor_type)
    }

    /// Returns true if this traffic management center watches any of the given detectors.
    pub fn watches_detector(&self, name: &str) -> bool {
        match &self.state {
            UnitState::TrafficManagementCenter {
                induction_loops,
                lane_area_detectors,
            } => induction_loops.contains(name) || lane_area_detectors.contains(name),
            _ => false,
        }
    }

    /// Attaches an already constructed application.
    pub fn add_application(&mut self, name: impl Into<String>, application: Box<dyn Application>) {
        self.applications.push(LoadedApplication {
            name: name.into(),
            application,
        });
    }

    /// Builds the named applications through `factory`. Unknown names are
    /// logged and skipped. Returns the number of loaded applications.
    pub fn load_applications(&mut self, names: &[String], factory: &dyn ApplicationFactory) -> usize {
        let mut loaded = 0;
        for name in names {
            match factory.create(name, &self.id) {
                Some(application) => {
                    self.add_application(name.clone(), application);
                    loaded += 1;
                }
                None => {
                    tracing::error!(
                        "{}: application '{}' for unit '{}'",
                        ErrorCode::ErrorLoadingApplications,
                        name,
                        self.id
                    );
                }
            }
        }
        loaded
    }

    /// Stores an environment event, replacing the previous one of the same sensor type.
    pub fn put_environment_event(&mut self, event: EnvironmentEvent) {
        self.environment_events.insert(event.sensor_type, event);
    }

    /// Drops environment events that ended before `time`.
    pub fn clean_past_environment_events(&mut self, time: SimTime) -> usize {
        let before = self.environment_events.len();
        self.environment_events.retain(|_, event| event.until >= time);
        before - self.environment_events.len()
    }

    fn for_each_application<F>(
        &mut self,
        time: SimTime,
        tables: &SharedTables,
        output: &mut UnitOutput,
        filter: Option<&str>,
        mut f: F,
    ) -> KernelResult<()>
    where
        F: FnMut(&mut dyn Application, &mut UnitContext<'_>) -> AppResult,
    {
        let SimulationUnit {
            id,
            kind,
            position,
            applications,
            environment_events,
            ..
        } = self;
        let unit_id: &str = id;
        let mut ctx = UnitContext {
            unit_id,
            kind: *kind,
            position: *position,
            time,
            tables,
            sensors: environment_events,
            output,
        };

        for loaded in applications.iter_mut() {
            if filter.is_some_and(|name| name != loaded.name) {
                continue;
            }
            f(loaded.application.as_mut(), &mut ctx).map_err(|source| KernelError::Application {
                unit_id: unit_id.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Runs `on_startup` on every loaded application.
    pub fn start(&mut self, time: SimTime, tables: &SharedTables, output: &mut UnitOutput) -> KernelResult<()> {
        tracing::debug!(unit = %self.id, applications = self.applications.len(), "starting applications");
        self.for_each_application(time, tables, output, None, |app, ctx| app.on_startup(ctx))
    }

    /// Shuts down every application. Only the first call has an effect.
    ///
    /// All applications receive `on_shutdown` even if one of them fails; the
    /// first failure is returned.
    pub fn tear_down(&mut self, time: SimTime, tables: &SharedTables, output: &mut UnitOutput) -> KernelResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        tracing::debug!(unit = %self.id, "tearing down");

        let mut first_error = None;
        let result = self.for_each_application(time, tables, output, None, |app, ctx| {
            if let Err(err) = app.on_shutdown(ctx) {
                tracing::error!(unit = %ctx.unit_id(), "application failed on shutdown: {}", err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Ok(())
        });
        result?;
        match first_error {
            Some(source) => Err(KernelError::Application {
                unit_id: self.id.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Handles one event addressed to this unit.
    pub fn process_event(
        &mut self,
        time: SimTime,
        payload: EventPayload,
        tables: &SharedTables,
        output: &mut UnitOutput,
    ) -> KernelResult<()> {
        if self.torn_down {
            tracing::trace!(unit = %self.id, event = payload.name(), "unit already torn down, skipping event");
            return Ok(());
        }
        if !self.kind.accepts(&payload) {
            return Err(KernelError::UnknownEvent {
                unit_id: self.id.clone(),
                kind: self.kind,
                payload: payload.name(),
            });
        }

        match payload {
            EventPayload::VehicleAdded(data) | EventPayload::VehicleUpdated(data) => {
                self.position = Some(data.position);
                let previous = match &mut self.state {
                    UnitState::Vehicle { data: current, .. } => current.replace(data.clone()),
                    _ => None,
                };
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_vehicle_updated(previous.as_ref(), &data, ctx)
                })
            }
            EventPayload::BatteryUpdated(battery) => {
                if let UnitState::Vehicle { battery: current, .. } = &mut self.state {
                    *current = Some(battery.clone());
                }
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_battery_updated(&battery, ctx)
                })
            }
            EventPayload::ChargingDenied { charging_station_id } => {
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_charging_denied(&charging_station_id, ctx)
                })
            }
            EventPayload::TrafficLightUpdated(info) => {
                if let UnitState::TrafficLightGroup { info: current, .. } = &mut self.state {
                    *current = Some(info.clone());
                }
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_traffic_light_updated(&info, ctx)
                })
            }
            EventPayload::TrafficDetectorsUpdated {
                induction_loops,
                lane_area_detectors,
            } => self.for_each_application(time, tables, output, None, |app, ctx| {
                app.on_traffic_detectors_updated(&induction_loops, &lane_area_detectors, ctx)
            }),
            EventPayload::ChargingStationUpdated(data) => {
                if data.position.is_some() {
                    self.position = data.position;
                }
                if let UnitState::ChargingStation { data: current } = &mut self.state {
                    *current = Some(data.clone());
                }
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_charging_station_updated(&data, ctx)
                })
            }
            EventPayload::V2xMessageReceived(received) => {
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_message_received(&received, ctx)
                })
            }
            EventPayload::V2xAcknowledgement {
                message_id,
                negative_reasons,
            } => {
                let Some(message) = tables.v2x_messages.get(message_id) else {
                    tracing::warn!(
                        unit = %self.id,
                        message_id,
                        "acknowledged message is not in the message cache, skipping"
                    );
                    return Ok(());
                };
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_acknowledgement(message, &negative_reasons, ctx)
                })
            }
            EventPayload::EnvironmentSensor(event) => {
                self.put_environment_event(event);
                Ok(())
            }
            EventPayload::ApplicationInteraction(interaction) => {
                self.for_each_application(time, tables, output, None, |app, ctx| {
                    app.on_interaction_received(&interaction, ctx)
                })
            }
            EventPayload::ApplicationEvent { application, resource } => {
                self.for_each_application(time, tables, output, Some(&application), |app, ctx| {
                    app.on_event(&resource, ctx)
                })
            }
            EventPayload::Callback(callback) => {
                let SimulationUnit {
                    id,
                    kind,
                    position,
                    environment_events,
                    ..
                } = self;
                let mut ctx = UnitContext {
                    unit_id: id,
                    kind: *kind,
                    position: *position,
                    time,
                    tables,
                    sensors: environment_events,
                    output,
                };
                callback.call(&mut ctx).map_err(|source| KernelError::Application {
                    unit_id: id.clone(),
                    source,
                })
            }
            other => Err(KernelError::UnknownEvent {
                unit_id: self.id.clone(),
                kind: self.kind,
                payload: other.name(),
            }),
        }
    }
}

impl fmt::Debug for SimulationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationUnit")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("applications", &self.application_names())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
