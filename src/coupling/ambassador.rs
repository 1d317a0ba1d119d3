//! Federate that drives an external network simulator.
//!
//! The ambassador mirrors communicating units into the network simulator.
//! A node is added to the peer only once both its position and its radio
//! configuration are known; until then it waits in a pending table. Messages
//! whose destination the peer cannot simulate are dropped before anything is
//! written.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::config::{CouplingConfig, NetworkCapabilities};
use crate::coupling::channel::ClientServerChannel;
use crate::coupling::ids::IdTransformer;
use crate::coupling::protocol::{CommandType, ConfigureRadio, NodeData, SendMessage};
use crate::coupling::{expect_success, CouplingError, CouplingResult};
use crate::error::{KernelError, KernelResult};
use crate::interaction::Interaction;
use crate::objects::{CartesianPoint, VehicleData};
use crate::rti::{FederateAmbassador, RtiAmbassador};
use crate::types::{SimTime, TimeDisplay, UnitId};
use crate::v2x::{AdHocConfiguration, RadioMode, V2xMessage};

/// Connection attempts before the handshake is given up.
pub const MAX_CONNECTION_TRIES: u32 = 50;

/// Pause between connection attempts.
pub const CONNECTION_RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeKind {
    Vehicle,
    Rsu,
}

#[derive(Debug, Default)]
struct PendingNode {
    kind: Option<NodeKind>,
    position: Option<CartesianPoint>,
    configuration: Option<AdHocConfiguration>,
}

/// Ambassador of the network federate.
pub struct NetworkAmbassador {
    /// Ambassador to federate: commands and their acknowledgements
    commands: ClientServerChannel,
    /// Federate to ambassador: time-step announcements
    events: ClientServerChannel,
    rti: Box<dyn RtiAmbassador>,
    capabilities: NetworkCapabilities,
    nodes: IdTransformer,
    pending: HashMap<UnitId, PendingNode>,
    /// Nodes taken out of the network simulation; late configurations are ignored.
    /// Holds one entry per removed node for the whole run, since unit ids are
    /// never reused and a late position or configuration may arrive at any time.
    removed: HashSet<UnitId>,
    next_configuration_id: u32,
    dropped_messages: u64,
    finished: bool,
}

fn connect_with_retries<F>(what: &str, mut connect: F) -> CouplingResult<ClientServerChannel>
where
    F: FnMut() -> CouplingResult<ClientServerChannel>,
{
    let mut last_error = None;
    for attempt in 1..=MAX_CONNECTION_TRIES {
        match connect() {
            Ok(channel) => return Ok(channel),
            Err(err) => {
                tracing::trace!(attempt, "connecting {} failed: {}", what, err);
                last_error = Some(err);
            }
        }
        thread::sleep(CONNECTION_RETRY_INTERVAL);
    }
    let reason = last_error.map_or_else(String::new, |err| err.to_string());
    Err(CouplingError::Handshake(format!(
        "no {} connection after {} attempts: {}",
        what, MAX_CONNECTION_TRIES, reason
    )))
}

impl NetworkAmbassador {
    /// Connects to the federate listening on `config.host:config.port` and
    /// opens the command channel on the port it announces.
    pub fn connect(config: &CouplingConfig, rti: impl RtiAmbassador + 'static) -> KernelResult<Self> {
        config.validate()?;

        let mut events = connect_with_retries("event", || ClientServerChannel::connect(&config.host, config.port))?;
        tracing::info!(host = %config.host, port = config.port, "connected to network federate for reading");

        let commands = match events.read_command()? {
            CommandType::Init => {
                let port = events.read_port_body()?;
                let ip = events
                    .peer_ip()
                    .ok_or_else(|| CouplingError::Handshake("peer address unknown".to_string()))?;
                let channel = connect_with_retries("command", || ClientServerChannel::connect_ip(ip, port))?;
                tracing::info!(port, "connected to network federate for commands");
                channel
            }
            got => {
                return Err(CouplingError::Handshake(format!("expected INIT, federate sent {}", got)).into());
            }
        };

        Ok(Self::from_channels(commands, events, config.capabilities.clone(), rti))
    }

    /// Builds an ambassador on already connected channels.
    pub fn from_channels(
        commands: ClientServerChannel,
        events: ClientServerChannel,
        capabilities: NetworkCapabilities,
        rti: impl RtiAmbassador + 'static,
    ) -> Self {
        Self {
            commands,
            events,
            rti: Box::new(rti),
            capabilities,
            nodes: IdTransformer::new(),
            pending: HashMap::new(),
            removed: HashSet::new(),
            next_configuration_id: 0,
            dropped_messages: 0,
            finished: false,
        }
    }

    /// Nodes currently simulated by the peer.
    pub fn simulated_nodes(&self) -> &IdTransformer {
        &self.nodes
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_nodes(&self) -> usize {
        self.pending.len()
    }

    /// V2X messages dropped without contacting the peer.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Announces the simulated interval to the peer.
    pub fn initialize(&mut self, start: SimTime, end: SimTime) -> KernelResult<()> {
        let ack = self.commands.write_init_body(start, end)?;
        expect_success("initialize", ack)?;
        tracing::info!("network federate initialized for {} to {}", TimeDisplay(start), TimeDisplay(end));
        Ok(())
    }

    pub fn process_interaction(&mut self, interaction: Interaction) -> KernelResult<()> {
        let type_name = interaction.type_name().to_string();
        tracing::trace!(interaction = %type_name, "processing interaction at {}", TimeDisplay(interaction.time()));
        self.handle(interaction).map_err(|err| {
            tracing::error!(interaction = %type_name, "{}", err);
            KernelError::ProcessInteraction {
                interaction: type_name,
                source: Box::new(KernelError::from(err)),
            }
        })
    }

    fn handle(&mut self, interaction: Interaction) -> CouplingResult<()> {
        match interaction {
            Interaction::RsuRegistration { time, mapping }
            | Interaction::ChargingStationRegistration { time, mapping }
            | Interaction::TrafficLightRegistration { time, mapping, .. } => {
                self.register_stationary(time, &mapping.name, mapping.position)
            }
            Interaction::VehicleUpdates {
                time,
                added,
                updated,
                removed,
            } => self.update_vehicles(time, added, &updated, &removed),
            Interaction::V2xMessageTransmission { time, message } => self.send_message(time, &message),
            Interaction::AdHocCommunicationConfiguration { time, configuration } => {
                if configuration.radio_mode == RadioMode::Off {
                    tracing::debug!(node = %configuration.node_id, "radio disabled");
                    self.disable_radio(time, &configuration.node_id)
                } else {
                    tracing::debug!(node = %configuration.node_id, "radio enabled");
                    self.configure_radio(time, configuration)
                }
            }
            other => {
                tracing::trace!(interaction = other.type_name(), "not relevant for the network federate");
                Ok(())
            }
        }
    }

    fn register_stationary(&mut self, time: SimTime, name: &str, position: Option<CartesianPoint>) -> CouplingResult<()> {
        let known = self.nodes.contains_internal_id(name)
            || self.pending.get(name).is_some_and(|node| node.kind.is_some());
        if known {
            tracing::warn!(node = name, "node was already added, ignoring registration");
            return Ok(());
        }
        let Some(position) = position else {
            tracing::warn!(node = name, "registration without position, node is not simulated");
            return Ok(());
        };

        let node = self.pending.entry(name.to_string()).or_default();
        node.kind = Some(NodeKind::Rsu);
        node.position = Some(position);
        self.try_add(time, name)
    }

    fn update_vehicles(
        &mut self,
        time: SimTime,
        mut added: Vec<VehicleData>,
        updated: &[VehicleData],
        removed: &[UnitId],
    ) -> CouplingResult<()> {
        added.sort_by(|a, b| a.name.cmp(&b.name));
        for vehicle in &added {
            if self.nodes.contains_internal_id(&vehicle.name) {
                tracing::warn!(node = %vehicle.name, "vehicle was already added, ignoring entry");
                continue;
            }
            self.note_vehicle_position(time, vehicle)?;
        }

        let mut moves = Vec::new();
        for vehicle in updated {
            match self.nodes.external_id(&vehicle.name) {
                Some(id) => {
                    tracing::trace!(node = %vehicle.name, id, x = vehicle.position.x, y = vehicle.position.y, "move node");
                    moves.push(NodeData::new(id, vehicle.position));
                }
                None => self.note_vehicle_position(time, vehicle)?,
            }
        }
        if !moves.is_empty() {
            let ack = self.commands.write_update_positions_message(time, &moves)?;
            expect_success("update positions", ack)?;
        }

        let mut removals = Vec::new();
        for name in removed {
            self.pending.remove(name);
            if let Some(id) = self.nodes.remove_using_internal_id(name) {
                tracing::info!(node = %name, id, "removing node at {}", TimeDisplay(time));
                removals.push(id);
            }
            self.removed.insert(name.clone());
        }
        if !removals.is_empty() {
            let ack = self.commands.write_remove_nodes_message(time, &removals)?;
            expect_success("remove nodes", ack)?;
        }
        Ok(())
    }

    fn note_vehicle_position(&mut self, time: SimTime, vehicle: &VehicleData) -> CouplingResult<()> {
        if self.removed.contains(&vehicle.name) {
            tracing::trace!(node = %vehicle.name, "position of removed node ignored");
            return Ok(());
        }
        let node = self.pending.entry(vehicle.name.clone()).or_default();
        node.kind = Some(NodeKind::Vehicle);
        node.position = Some(vehicle.position);
        self.try_add(time, &vehicle.name)
    }

    fn configure_radio(&mut self, time: SimTime, configuration: AdHocConfiguration) -> CouplingResult<()> {
        if let Some(id) = self.nodes.external_id(&configuration.node_id) {
            tracing::debug!(node = %configuration.node_id, "updating configuration of simulated node");
            return self.send_configuration(time, id, &configuration);
        }
        if self.removed.contains(&configuration.node_id) {
            tracing::debug!(node = %configuration.node_id, "configuration for removed node ignored");
            return Ok(());
        }

        let name = configuration.node_id.clone();
        self.pending.entry(name.clone()).or_default().configuration = Some(configuration);
        self.try_add(time, &name)
    }

    fn disable_radio(&mut self, time: SimTime, name: &str) -> CouplingResult<()> {
        if let Some(id) = self.nodes.remove_using_internal_id(name) {
            tracing::info!(node = name, id, "removing node at {}", TimeDisplay(time));
            self.removed.insert(name.to_string());
            let ack = self.commands.write_remove_nodes_message(time, &[id])?;
            return expect_success("remove nodes", ack);
        }
        if self.pending.remove(name).is_some() {
            tracing::info!(node = name, "removing node that was not simulated yet at {}", TimeDisplay(time));
        } else {
            tracing::warn!(node = name, "node is not simulated");
        }
        Ok(())
    }

    /// Adds a pending node to the peer once position and configuration are known.
    fn try_add(&mut self, time: SimTime, name: &str) -> CouplingResult<()> {
        let ready = self.pending.get(name).is_some_and(|node| {
            node.kind.is_some() && node.position.is_some() && node.configuration.is_some()
        });
        if !ready {
            return Ok(());
        }
        let Some(PendingNode {
            kind: Some(kind),
            position: Some(position),
            configuration: Some(configuration),
        }) = self.pending.remove(name)
        else {
            return Ok(());
        };

        let id = self.nodes.to_external_id(name);
        let nodes = [NodeData::new(id, position)];
        let ack = match kind {
            NodeKind::Vehicle => self.commands.write_add_node_message(time, &nodes)?,
            NodeKind::Rsu => self.commands.write_add_rsu_node_message(time, &nodes)?,
        };
        expect_success("add node", ack)?;
        tracing::info!(
            node = name,
            id,
            kind = ?kind,
            x = position.x,
            y = position.y,
            "added node at {}",
            TimeDisplay(time)
        );
        self.send_configuration(time, id, &configuration)
    }

    fn send_configuration(
        &mut self,
        time: SimTime,
        external_id: u32,
        configuration: &AdHocConfiguration,
    ) -> CouplingResult<()> {
        let message_id = self.next_configuration_id;
        self.next_configuration_id += 1;
        let body = ConfigureRadio::new(time, message_id, external_id, configuration)
            .map_err(CouplingError::UnsupportedConfiguration)?;
        tracing::debug!(node = %configuration.node_id, radios = body.radios.len(), "sending radio configuration");
        let ack = self.commands.write_config_message(&body)?;
        expect_success("configure radio", ack)
    }

    fn send_message(&mut self, time: SimTime, message: &V2xMessage) -> CouplingResult<()> {
        let destination = &message.destination;
        if !self.capabilities.routing_types.contains(&destination.destination_type) {
            tracing::warn!(
                message = message.id,
                source = %message.source,
                "destination type {:?} is not supported by the network federate, message skipped",
                destination.destination_type
            );
            self.dropped_messages += 1;
            return Ok(());
        }
        if !self.capabilities.address_types.contains(&destination.address_type()) {
            tracing::warn!(
                message = message.id,
                "address type {:?} is not supported by the network federate, message skipped",
                destination.address_type()
            );
            self.dropped_messages += 1;
            return Ok(());
        }
        if !self.capabilities.protocols.contains(&destination.protocol) {
            tracing::warn!(
                message = message.id,
                "protocol {:?} is not supported by the network federate, message skipped",
                destination.protocol
            );
            self.dropped_messages += 1;
            return Ok(());
        }

        let Some(source) = self.nodes.external_id(&message.source) else {
            tracing::warn!(
                message = message.id,
                node = %message.source,
                "node is not simulated, ignoring transmission at {}",
                TimeDisplay(time)
            );
            self.dropped_messages += 1;
            return Ok(());
        };

        let body = match SendMessage::new(time, source, message.id, message.payload_length, destination) {
            Ok(body) => body,
            Err(reason) => {
                tracing::warn!(message = message.id, "{}, message skipped", reason);
                self.dropped_messages += 1;
                return Ok(());
            }
        };
        tracing::debug!(
            message = message.id,
            node = %message.source,
            id = source,
            channel = ?body.channel,
            "sending V2X message at {}",
            TimeDisplay(time)
        );
        let ack = self.commands.write_send_message(&body)?;
        expect_success("send message", ack)
    }

    /// Grants `time` to the peer and relays what it reports until `END`.
    pub fn process_time_advance_grant(&mut self, time: SimTime) -> KernelResult<()> {
        self.advance(time).map_err(|err| {
            tracing::error!("advance to {} failed: {}", TimeDisplay(time), err);
            KernelError::AdvanceTime {
                time,
                source: Box::new(err),
            }
        })
    }

    fn advance(&mut self, time: SimTime) -> KernelResult<()> {
        if self.finished {
            tracing::debug!("network federate finished, ignoring grant for {}", TimeDisplay(time));
            return Ok(());
        }
        self.commands.write_advance_time_message(time)?;

        loop {
            match self.events.read_command()? {
                CommandType::NextEvent => {
                    let next = self.events.read_time_body()?;
                    tracing::trace!("network federate requests {}", TimeDisplay(next));
                    if next > time {
                        self.rti.request_advance_time(next)?;
                    }
                }
                CommandType::MsgRecv => {
                    let received = self.events.read_message(&self.nodes)?;
                    match received.receiver {
                        Some(receiver) => {
                            tracing::debug!(
                                message = received.message_id,
                                node = %receiver,
                                "V2X message received at {}",
                                TimeDisplay(received.time)
                            );
                            self.rti.trigger_interaction(Interaction::V2xMessageReception {
                                time: received.time,
                                receiver_name: receiver,
                                message_id: received.message_id,
                                receiver_information: received.receiver_information,
                            })?;
                        }
                        None => match self.nodes.retired_id(received.external_id) {
                            Some(name) => tracing::debug!(
                                message = received.message_id,
                                node = name,
                                "reception on removed node dropped"
                            ),
                            None => tracing::warn!(
                                message = received.message_id,
                                id = received.external_id,
                                "reception on unknown node dropped"
                            ),
                        },
                    }
                }
                CommandType::End => {
                    let end = self.events.read_time_body()?;
                    tracing::trace!("network federate finished step at {}", TimeDisplay(end));
                    return Ok(());
                }
                got => {
                    return Err(CouplingError::UnexpectedCommand {
                        expected: "NEXT_EVENT, MSG_RECV or END",
                        got,
                    }
                    .into());
                }
            }
        }
    }

    /// Sends `SHUT_DOWN` and closes both channels. Later calls do nothing.
    pub fn finish_simulation(&mut self) -> KernelResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Err(err) = self.commands.write_command(CommandType::ShutDown) {
            tracing::debug!("could not send SHUT_DOWN: {}", err);
        }
        self.commands.close();
        self.events.close();
        self.pending.clear();
        tracing::info!(nodes = self.nodes.len(), "network federate shut down");
        Ok(())
    }
}

impl FederateAmbassador for NetworkAmbassador {
    fn initialize(&mut self, start: SimTime, end: SimTime) -> KernelResult<()> {
        NetworkAmbassador::initialize(self, start, end)
    }

    fn process_interaction(&mut self, interaction: Interaction) -> KernelResult<()> {
        NetworkAmbassador::process_interaction(self, interaction)
    }

    fn process_time_advance_grant(&mut self, time: SimTime) -> KernelResult<()> {
        NetworkAmbassador::process_time_advance_grant(self, time)
    }

    fn finish_simulation(&mut self) -> KernelResult<()> {
        NetworkAmbassador::finish_simulation(self)
    }
}

impl fmt::Debug for NetworkAmbassador {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkAmbassador")
            .field("simulated", &self.nodes.len())
            .field("pending", &self.pending.len())
            .field("dropped_messages", &self.dropped_messages)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::frame::{read_frame, write_frame, MAX_FRAME_SIZE};
    use crate::coupling::protocol::{decode_body, encode_body, CommandMessage, UpdateNode, UpdateType};
    use crate::interaction::UnitMapping;
    use crate::rti::RecordingRti;
    use crate::v2x::{AdHocChannel, InterfaceConfiguration};
    use parking_lot::Mutex;
    use std::io::{Cursor, Write};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn acks(count: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for _ in 0..count {
            write_frame(&mut buf, &encode_body(&CommandMessage(CommandType::Success.tag())).unwrap()).unwrap();
        }
        buf
    }

    fn ambassador(ack_count: usize) -> (NetworkAmbassador, SharedBuf) {
        let written = SharedBuf::default();
        let commands = ClientServerChannel::from_streams(Cursor::new(acks(ack_count)), written.clone());
        let events = ClientServerChannel::from_streams(Cursor::new(Vec::new()), std::io::sink());
        let ambassador =
            NetworkAmbassador::from_channels(commands, events, NetworkCapabilities::default(), RecordingRti::new());
        (ambassador, written)
    }

    /// Command tags written so far, in order.
    fn written_commands(buf: &SharedBuf) -> Vec<CommandType> {
        let bytes = buf.0.lock().clone();
        let mut cursor = Cursor::new(bytes);
        let mut commands = Vec::new();
        while let Ok(frame) = read_frame(&mut cursor, MAX_FRAME_SIZE) {
            if frame.len() == 4 {
                if let Ok(CommandMessage(tag)) = decode_body(&frame) {
                    if let Some(command) = CommandType::from_tag(tag) {
                        commands.push(command);
                    }
                }
            }
        }
        commands
    }

    fn radio(node: &str) -> Interaction {
        Interaction::AdHocCommunicationConfiguration {
            time: 0,
            configuration: AdHocConfiguration::single(
                node,
                InterfaceConfiguration::single_channel(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(255, 255, 0, 0),
                    AdHocChannel::Cch,
                ),
            ),
        }
    }

    fn moved(name: &str, time: SimTime) -> Interaction {
        Interaction::VehicleUpdates {
            time,
            added: vec![VehicleData::new(name, time, CartesianPoint::new(1.0, 2.0))],
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }

    #[test]
    fn test_rsu_added_after_configuration() {
        let (mut ambassador, written) = ambassador(2);
        ambassador
            .process_interaction(Interaction::RsuRegistration {
                time: 0,
                mapping: UnitMapping::new("rsu_0", Vec::new()).with_position(CartesianPoint::new(5.0, 5.0)),
            })
            .unwrap();
        assert!(ambassador.is_pending("rsu_0"));
        assert!(written_commands(&written).is_empty());

        ambassador.process_interaction(radio("rsu_0")).unwrap();
        assert!(!ambassador.is_pending("rsu_0"));
        assert_eq!(ambassador.simulated_nodes().external_id("rsu_0"), Some(0));
        assert_eq!(
            written_commands(&written),
            vec![CommandType::UpdateNode, CommandType::ConfRadio]
        );
    }

    #[test]
    fn test_vehicle_order_independent() {
        let (mut ambassador, written) = ambassador(4);

        // Configuration first, then movement.
        ambassador.process_interaction(radio("veh_0")).unwrap();
        assert!(ambassador.is_pending("veh_0"));
        ambassador.process_interaction(moved("veh_0", 5)).unwrap();
        assert!(ambassador.simulated_nodes().contains_internal_id("veh_0"));

        // Movement first, then configuration.
        ambassador.process_interaction(moved("veh_1", 5)).unwrap();
        assert!(ambassador.is_pending("veh_1"));
        ambassador.process_interaction(radio("veh_1")).unwrap();
        assert!(ambassador.simulated_nodes().contains_internal_id("veh_1"));

        assert_eq!(written_commands(&written).len(), 4);
    }

    #[test]
    fn test_negative_ack_is_fatal() {
        let mut input = Vec::new();
        write_frame(&mut input, &encode_body(&CommandMessage(CommandType::End.tag())).unwrap()).unwrap();
        let commands = ClientServerChannel::from_streams(Cursor::new(input), std::io::sink());
        let events = ClientServerChannel::from_streams(Cursor::new(Vec::new()), std::io::sink());
        let mut ambassador =
            NetworkAmbassador::from_channels(commands, events, NetworkCapabilities::default(), RecordingRti::new());

        let err = ambassador.initialize(0, 10).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::CouplingNegativeAcknowledgement);
    }

    #[test]
    fn test_remove_on_radio_off() {
        let (mut ambassador, written) = ambassador(3);
        ambassador.process_interaction(radio("veh_0")).unwrap();
        ambassador.process_interaction(moved("veh_0", 5)).unwrap();
        ambassador
            .process_interaction(Interaction::AdHocCommunicationConfiguration {
                time: 6,
                configuration: AdHocConfiguration::off("veh_0"),
            })
            .unwrap();
        assert!(!ambassador.simulated_nodes().contains_internal_id("veh_0"));

        let bytes = written.0.lock().clone();
        let mut cursor = Cursor::new(bytes);
        let mut last_update = None;
        while let Ok(frame) = read_frame(&mut cursor, MAX_FRAME_SIZE) {
            if let Ok(update) = decode_body::<UpdateNode>(&frame) {
                last_update = Some(update);
            }
        }
        let update = last_update.unwrap();
        assert_eq!(update.update_type, UpdateType::RemoveNode);
        assert_eq!(update.nodes[0].id, 0);

        // Late configuration of a removed node is ignored.
        ambassador.process_interaction(radio("veh_0")).unwrap();
        assert!(!ambassador.is_pending("veh_0"));
    }

    #[test]
    fn test_finish_is_idempotent() {
        let (mut ambassador, written) = ambassador(0);
        ambassador.finish_simulation().unwrap();
        ambassador.finish_simulation().unwrap();
        assert!(ambassador.is_finished());
        assert_eq!(written_commands(&written), vec![CommandType::ShutDown]);
        ambassador.process_time_advance_grant(10).unwrap();
    }
}
