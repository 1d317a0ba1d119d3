//! Interaction-to-event translation.
//!
//! The [`InteractionRouter`] classifies each inbound [`Interaction`] and turns
//! it into events, lookup-table updates, registry changes or outbound
//! interactions. Interactions that reference units which are not registered
//! are dropped quietly; that is the normal case for entities without
//! applications.

use std::collections::{BTreeMap, HashMap};

use crate::context::SimulationContext;
use crate::error::{ErrorCode, KernelResult};
use crate::event::{nice, Event, EventPayload};
use crate::interaction::{Interaction, VehicleMapping, VehicleRegistration};
use crate::objects::{
    InductionLoopInfo, LaneAreaDetectorInfo, TrafficLightGroupInfo, VehicleData, VehicleDeparture,
    VehicleTrip,
};
use crate::types::{SimTime, TimeDisplay, UnitId};
use crate::unit::{SimulationUnit, UnitKind, UnitState, UnitTable};
use crate::v2x::ReceivedV2xMessage;

/// Computes departures for vehicles that were registered without a route.
pub trait NavigationComponent: Send {
    /// Returns the departure of a vehicle travelling `trip`, or `None` if no
    /// route could be found.
    fn create_departure(
        &mut self,
        time: SimTime,
        trip: &VehicleTrip,
        departure: &VehicleDeparture,
    ) -> Option<VehicleDeparture>;
}

/// Dispatches inbound interactions.
#[derive(Default)]
pub struct InteractionRouter {
    /// Vehicles announced with applications, waiting for their first movement.
    pending_vehicles: HashMap<UnitId, VehicleMapping>,
    navigation: Option<Box<dyn NavigationComponent>>,
    dropped: u64,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_navigation(mut self, navigation: Box<dyn NavigationComponent>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn set_navigation(&mut self, navigation: Box<dyn NavigationComponent>) {
        self.navigation = Some(navigation);
    }

    /// Number of vehicles registered but not yet moved.
    pub fn pending_vehicles(&self) -> usize {
        self.pending_vehicles.len()
    }

    /// Number of interactions dropped without effect.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.pending_vehicles.clear();
    }

    /// Routes one interaction.
    ///
    /// Only registry violations are errors; every other unresolvable input is
    /// logged and dropped.
    pub fn route(&mut self, interaction: Interaction, ctx: &mut SimulationContext) -> KernelResult<()> {
        match interaction {
            Interaction::RsuRegistration { time, mapping } => {
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                let unit = SimulationUnit::road_side_unit(&mapping);
                register(ctx, time, unit, mapping.applications, true)
            }
            Interaction::TrafficLightRegistration {
                time,
                mapping,
                traffic_light_group,
            } => {
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                let unit = SimulationUnit::traffic_light_group(&mapping, traffic_light_group);
                register(ctx, time, unit, mapping.applications, true)
            }
            Interaction::TmcRegistration { time, mapping } => {
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                let unit = SimulationUnit::traffic_management_center(&mapping);
                register(ctx, time, unit, mapping.applications, false)
            }
            Interaction::ServerRegistration { time, mapping } => {
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                let unit = SimulationUnit::server(&mapping);
                register(ctx, time, unit, mapping.applications, false)
            }
            Interaction::ChargingStationRegistration { time, mapping } => {
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                let unit = SimulationUnit::charging_station(&mapping);
                register(ctx, time, unit, mapping.applications, true)
            }
            Interaction::VehicleRegistration(registration) => {
                let mapping = registration.mapping;
                if !mapping.has_applications() {
                    skip_registration(&mapping.name);
                    return Ok(());
                }
                tracing::debug!(vehicle = %mapping.name, "vehicle registered, waiting for first movement");
                self.pending_vehicles.insert(mapping.name.clone(), mapping);
                Ok(())
            }
            Interaction::RoutelessVehicleRegistration {
                time,
                mapping,
                trip,
                departure,
            } => {
                self.route_routeless_vehicle(ctx, time, mapping, &trip, &departure);
                Ok(())
            }
            Interaction::ScenarioVehicleRegistration { name, vehicle_type, .. } => {
                tracing::trace!(vehicle = %name, vehicle_type = %vehicle_type.name, "scenario vehicle");
                ctx.tables_mut()
                    .vehicle_types
                    .entry(vehicle_type.name.clone())
                    .or_insert(vehicle_type);
                Ok(())
            }
            Interaction::VehicleUpdates {
                time,
                added,
                updated,
                removed,
            } => self.route_vehicle_updates(ctx, time, added, updated, removed),
            Interaction::VehicleBatteryUpdates { time, updated } => {
                for battery in updated {
                    if unit_kind(ctx, &battery.owner_id) == Some(UnitKind::ElectricVehicle) {
                        let owner = battery.owner_id.clone();
                        ctx.schedule(Event::for_unit(
                            time,
                            nice::BATTERY_UPDATED,
                            owner,
                            EventPayload::BatteryUpdated(battery),
                        ));
                    }
                }
                Ok(())
            }
            Interaction::TrafficLightUpdates { time, updated } => {
                route_traffic_light_updates(ctx, time, updated);
                Ok(())
            }
            Interaction::TrafficDetectorUpdates {
                time,
                induction_loops,
                lane_area_detectors,
            } => {
                route_detector_updates(ctx, time, &induction_loops, &lane_area_detectors);
                Ok(())
            }
            Interaction::EnvironmentSensorUpdates { time, unit_id, event } => {
                if ctx.registry().contains(&unit_id) {
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::DEFAULT,
                        unit_id,
                        EventPayload::EnvironmentSensor(event),
                    ));
                }
                Ok(())
            }
            Interaction::ChargingStationUpdate { time, data } => {
                if unit_kind(ctx, &data.name) == Some(UnitKind::ChargingStation) {
                    let id = data.name.clone();
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::UPDATE_CHARGING_STATION,
                        id,
                        EventPayload::ChargingStationUpdated(data),
                    ));
                }
                Ok(())
            }
            Interaction::VehicleChargingDenial {
                time,
                vehicle_id,
                charging_station_id,
            } => {
                if unit_kind(ctx, &vehicle_id).is_some_and(UnitKind::is_vehicle) {
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::CHARGING_REJECTED,
                        vehicle_id,
                        EventPayload::ChargingDenied { charging_station_id },
                    ));
                }
                Ok(())
            }
            Interaction::V2xMessageReception {
                time,
                receiver_name,
                message_id,
                receiver_information,
            } => {
                let Some(message) = ctx.tables().v2x_messages.get(message_id).cloned() else {
                    tracing::warn!(
                        receiver = %receiver_name,
                        message_id,
                        "received V2X message is not in the message cache at {}, skipping",
                        TimeDisplay(time)
                    );
                    self.dropped += 1;
                    return Ok(());
                };
                if ctx.registry().contains(&receiver_name) {
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::V2X_MESSAGE_RECEPTION,
                        receiver_name,
                        EventPayload::V2xMessageReceived(ReceivedV2xMessage {
                            message,
                            receiver_information,
                        }),
                    ));
                }
                Ok(())
            }
            Interaction::V2xFullMessageReception {
                time,
                receiver_name,
                message,
                receiver_information,
            } => {
                if ctx.registry().contains(&receiver_name) {
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::V2X_FULL_MESSAGE_RECEPTION,
                        receiver_name,
                        EventPayload::V2xMessageReceived(ReceivedV2xMessage {
                            message,
                            receiver_information,
                        }),
                    ));
                }
                Ok(())
            }
            Interaction::V2xMessageAcknowledgement {
                time,
                source_name,
                originating_message_id,
                negative_reasons,
            } => {
                if ctx.registry().contains(&source_name) {
                    ctx.schedule(Event::for_unit(
                        time,
                        nice::V2X_MESSAGE_ACKNOWLEDGEMENT,
                        source_name,
                        EventPayload::V2xAcknowledgement {
                            message_id: originating_message_id,
                            negative_reasons,
                        },
                    ));
                }
                Ok(())
            }
            Interaction::VehicleRoutesInitialization { routes, .. } => {
                let tables = ctx.tables_mut();
                for route in routes {
                    tables.routes.insert(route.id.clone(), route);
                }
                Ok(())
            }
            Interaction::VehicleTypesInitialization { types, .. } => {
                let tables = ctx.tables_mut();
                for vehicle_type in types {
                    tables.vehicle_types.insert(vehicle_type.name.clone(), vehicle_type);
                }
                Ok(())
            }
            Interaction::VehicleRouteRegistration { route, .. } => {
                ctx.tables_mut().routes.insert(route.id.clone(), route);
                Ok(())
            }
            Interaction::ApplicationInteraction(interaction) => {
                let targets: Vec<UnitId> = match &interaction.unit_id {
                    Some(id) if ctx.registry().contains(id) => vec![id.clone()],
                    Some(_) => Vec::new(),
                    None => ctx.registry().ids().cloned().collect(),
                };
                for id in targets {
                    ctx.schedule(Event::for_unit(
                        interaction.time,
                        nice::DEFAULT,
                        id,
                        EventPayload::ApplicationInteraction(interaction.clone()),
                    ));
                }
                Ok(())
            }
            outbound @ (Interaction::AdHocCommunicationConfiguration { .. }
            | Interaction::V2xMessageTransmission { .. }
            | Interaction::V2xMessageRemoval { .. }
            | Interaction::EnvironmentSensorActivation { .. }) => {
                tracing::debug!(interaction = outbound.type_name(), "interaction is not handled by the kernel");
                self.dropped += 1;
                Ok(())
            }
            Interaction::Other { type_id, time, .. } => {
                tracing::warn!(interaction = %type_id, "unknown interaction at {}, dropping", TimeDisplay(time));
                self.dropped += 1;
                Ok(())
            }
        }
    }

    fn route_routeless_vehicle(
        &mut self,
        ctx: &mut SimulationContext,
        time: SimTime,
        mapping: VehicleMapping,
        trip: &VehicleTrip,
        departure: &VehicleDeparture,
    ) {
        let computed = self
            .navigation
            .as_mut()
            .and_then(|navigation| navigation.create_departure(time, trip, departure));
        match computed {
            Some(departure) => {
                tracing::debug!(vehicle = %mapping.name, route = ?departure.route_id, "computed departure");
                ctx.emit(Interaction::VehicleRegistration(VehicleRegistration {
                    time,
                    mapping,
                    departure,
                }));
            }
            None => {
                tracing::error!(
                    "{}: vehicle '{}' is dropped",
                    ErrorCode::ErrorCalculateDeparture,
                    mapping.name
                );
                self.dropped += 1;
            }
        }
    }

    /// Registers a pending vehicle on its first movement.
    fn promote(&mut self, ctx: &mut SimulationContext, time: SimTime, name: &str) -> KernelResult<()> {
        let Some(mapping) = self.pending_vehicles.remove(name) else {
            return Ok(());
        };
        tracing::debug!(vehicle = %name, "first movement at {}, registering", TimeDisplay(time));
        let unit = SimulationUnit::vehicle(&mapping);
        register(ctx, time, unit, mapping.applications, true)
    }

    fn route_vehicle_updates(
        &mut self,
        ctx: &mut SimulationContext,
        time: SimTime,
        added: Vec<VehicleData>,
        updated: Vec<VehicleData>,
        removed: Vec<UnitId>,
    ) -> KernelResult<()> {
        for data in added {
            self.promote(ctx, time, &data.name)?;
            if ctx.registry().contains(&data.name) {
                let id = data.name.clone();
                ctx.schedule(Event::for_unit(time, nice::VEHICLE_ADDED, id, EventPayload::VehicleAdded(data)));
            }
        }

        for data in updated {
            self.promote(ctx, time, &data.name)?;
            if ctx.registry().contains(&data.name) {
                let id = data.name.clone();
                ctx.schedule(Event::for_unit(
                    time,
                    nice::VEHICLE_UPDATED,
                    id,
                    EventPayload::VehicleUpdated(data),
                ));
            }
        }

        let mut to_remove = Vec::new();
        for name in removed {
            self.pending_vehicles.remove(&name);
            if ctx.registry().contains(&name) {
                to_remove.push(name);
            }
        }
        if !to_remove.is_empty() {
            ctx.schedule(Event::for_kernel(time, nice::VEHICLE_REMOVED, EventPayload::RemoveUnits(to_remove)));
        }

        ctx.schedule(Event::for_kernel(time, nice::GARBAGE_COLLECTION, EventPayload::GarbageCollection));
        Ok(())
    }
}

impl std::fmt::Debug for InteractionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionRouter")
            .field("pending_vehicles", &self.pending_vehicles.len())
            .field("navigation", &self.navigation.is_some())
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Adds a unit and schedules the start of its applications.
fn register(
    ctx: &mut SimulationContext,
    time: SimTime,
    unit: SimulationUnit,
    applications: Vec<String>,
    activate_sensors: bool,
) -> KernelResult<()> {
    let id = unit.id().to_string();
    ctx.registry_mut().add(unit)?;
    ctx.schedule(Event::for_kernel(
        time,
        nice::START_APPLICATIONS,
        EventPayload::StartApplications {
            unit_id: id.clone(),
            applications,
        },
    ));
    if activate_sensors {
        ctx.emit(Interaction::EnvironmentSensorActivation { time, unit_id: id });
    }
    Ok(())
}

fn skip_registration(name: &str) {
    tracing::trace!(unit = %name, "registration without applications, ignoring");
}

fn unit_kind(ctx: &SimulationContext, id: &str) -> Option<UnitKind> {
    ctx.registry().get(id).map(|handle| handle.lock().kind())
}

fn route_traffic_light_updates(
    ctx: &mut SimulationContext,
    time: SimTime,
    mut updated: BTreeMap<String, TrafficLightGroupInfo>,
) {
    let mut events = Vec::new();
    for handle in ctx.registry().handles_of(UnitTable::TrafficLights) {
        let unit = handle.lock();
        if let UnitState::TrafficLightGroup { group, .. } = unit.state() {
            if let Some(info) = updated.remove(&group.group_id) {
                events.push(Event::for_unit(
                    time,
                    nice::UPDATE_TRAFFIC_LIGHT,
                    unit.id(),
                    EventPayload::TrafficLightUpdated(info),
                ));
            }
        }
    }
    for event in events {
        ctx.schedule(event);
    }
}

fn route_detector_updates(
    ctx: &mut SimulationContext,
    time: SimTime,
    induction_loops: &[InductionLoopInfo],
    lane_area_detectors: &[LaneAreaDetectorInfo],
) {
    let mut events = Vec::new();
    for handle in ctx.registry().handles_of(UnitTable::TrafficManagementCenters) {
        let unit = handle.lock();
        let loops: Vec<InductionLoopInfo> = induction_loops
            .iter()
            .filter(|info| unit.watches_detector(&info.name))
            .cloned()
            .collect();
        let lanes: Vec<LaneAreaDetectorInfo> = lane_area_detectors
            .iter()
            .filter(|info| unit.watches_detector(&info.name))
            .cloned()
            .collect();
        if loops.is_empty() && lanes.is_empty() {
            continue;
        }

        events.push(Event::for_unit(
            time,
            nice::UPDATE_TRAFFIC_DETECTORS,
            unit.id(),
            EventPayload::TrafficDetectorsUpdated {
                induction_loops: loops,
                lane_area_detectors: lanes,
            },
        ));
    }
    for event in events {
        ctx.schedule(event);
    }
}
