//! One direction of the connection to the network federate.
//!
//! A [`ClientServerChannel`] wraps a byte stream pair. Each command is written
//! as a command frame followed by its body frame; commands that change the
//! peer's state are answered with a single command read back from the same
//! channel.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};

use crate::coupling::frame::{read_frame, write_frame, MAX_FRAME_SIZE};
use crate::coupling::ids::IdTransformer;
use crate::coupling::protocol::{
    decode_body, encode_body, CommandMessage, CommandType, ConfigureRadio, InitMessage, NodeData,
    PortExchange, ReceiveMessage, SendMessage, TimeMessage, UpdateNode, UpdateType, WireBody,
};
use crate::coupling::{CouplingError, CouplingResult};
use crate::types::{MessageId, SimTime, UnitId};
use crate::v2x::{AdHocChannel, ReceiverInformation};

/// A `MSG_RECV` body with the receiver resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub time: SimTime,
    pub external_id: u32,
    /// `None` if the external id is not mapped to a simulated node.
    pub receiver: Option<UnitId>,
    pub channel: AdHocChannel,
    pub message_id: MessageId,
    pub receiver_information: ReceiverInformation,
}

/// Framed command channel.
pub struct ClientServerChannel {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    socket: Option<TcpStream>,
    closed: bool,
}

impl ClientServerChannel {
    /// Opens a TCP connection to `host:port`.
    pub fn connect(host: &str, port: u16) -> CouplingResult<Self> {
        let socket = TcpStream::connect((host, port))?;
        Self::from_socket(socket)
    }

    /// Opens a TCP connection to `ip:port`.
    pub fn connect_ip(ip: IpAddr, port: u16) -> CouplingResult<Self> {
        let socket = TcpStream::connect((ip, port))?;
        Self::from_socket(socket)
    }

    fn from_socket(socket: TcpStream) -> CouplingResult<Self> {
        socket.set_nodelay(true)?;
        let reader = BufReader::new(socket.try_clone()?);
        let writer = BufWriter::new(socket.try_clone()?);
        Ok(Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            socket: Some(socket),
            closed: false,
        })
    }

    /// Wraps an arbitrary stream pair, e.g. in-memory buffers.
    pub fn from_streams(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            socket: None,
            closed: false,
        }
    }

    /// Address of the peer, if this channel runs over TCP.
    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.socket
            .as_ref()
            .and_then(|socket| socket.peer_addr().ok())
            .map(|addr| addr.ip())
    }

    fn read_body<T: WireBody>(&mut self) -> CouplingResult<T> {
        let bytes = read_frame(&mut self.reader, MAX_FRAME_SIZE)?;
        Ok(decode_body(&bytes)?)
    }

    fn write_body<T: WireBody>(&mut self, body: &T) -> CouplingResult<()> {
        write_frame(&mut self.writer, &encode_body(body)?)?;
        Ok(())
    }

    /// Reads a single command tag. Blocks until one arrives.
    pub fn read_command(&mut self) -> CouplingResult<CommandType> {
        let CommandMessage(tag) = self.read_body()?;
        CommandType::from_tag(tag).ok_or(CouplingError::UnknownCommand(tag))
    }

    pub fn read_port_body(&mut self) -> CouplingResult<u16> {
        let PortExchange { port } = self.read_body()?;
        u16::try_from(port).map_err(|_| CouplingError::Handshake(format!("announced port {} is out of range", port)))
    }

    pub fn read_time_body(&mut self) -> CouplingResult<SimTime> {
        let TimeMessage { time } = self.read_body()?;
        Ok(time)
    }

    /// Reads a `MSG_RECV` body and resolves the receiving node through `ids`.
    pub fn read_message(&mut self, ids: &IdTransformer) -> CouplingResult<ReceivedMessage> {
        let body: ReceiveMessage = self.read_body()?;
        Ok(ReceivedMessage {
            time: body.time,
            external_id: body.node_id,
            receiver: ids.from_external_id(body.node_id).map(str::to_string),
            channel: body.channel,
            message_id: body.message_id,
            receiver_information: ReceiverInformation {
                receive_time: body.time,
                rssi: body.rssi,
            },
        })
    }

    /// Writes a bare command. `UNDEF` is never sent.
    pub fn write_command(&mut self, command: CommandType) -> CouplingResult<()> {
        if command == CommandType::Undef {
            return Ok(());
        }
        self.write_body(&CommandMessage(command.tag()))?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_message<T: WireBody>(&mut self, command: CommandType, body: &T) -> CouplingResult<()> {
        self.write_body(&CommandMessage(command.tag()))?;
        self.write_body(body)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_acknowledged<T: WireBody>(&mut self, command: CommandType, body: &T) -> CouplingResult<CommandType> {
        self.write_message(command, body)?;
        self.read_command()
    }

    /// Announces the simulated interval. Returns the peer's answer.
    pub fn write_init_body(&mut self, start_time: SimTime, end_time: SimTime) -> CouplingResult<CommandType> {
        self.write_acknowledged(CommandType::Init, &InitMessage { start_time, end_time })
    }

    fn write_update_node(
        &mut self,
        update_type: UpdateType,
        time: SimTime,
        nodes: &[NodeData],
    ) -> CouplingResult<CommandType> {
        let body = UpdateNode {
            update_type,
            time,
            nodes: nodes.to_vec(),
        };
        self.write_acknowledged(CommandType::UpdateNode, &body)
    }

    pub fn write_add_node_message(&mut self, time: SimTime, nodes: &[NodeData]) -> CouplingResult<CommandType> {
        self.write_update_node(UpdateType::AddVehicle, time, nodes)
    }

    pub fn write_add_rsu_node_message(&mut self, time: SimTime, nodes: &[NodeData]) -> CouplingResult<CommandType> {
        self.write_update_node(UpdateType::AddRsu, time, nodes)
    }

    pub fn write_update_positions_message(
        &mut self,
        time: SimTime,
        nodes: &[NodeData],
    ) -> CouplingResult<CommandType> {
        self.write_update_node(UpdateType::MoveNode, time, nodes)
    }

    pub fn write_remove_nodes_message(&mut self, time: SimTime, ids: &[u32]) -> CouplingResult<CommandType> {
        let nodes: Vec<NodeData> = ids.iter().map(|&id| NodeData::removal(id)).collect();
        self.write_update_node(UpdateType::RemoveNode, time, &nodes)
    }

    pub fn write_send_message(&mut self, message: &SendMessage) -> CouplingResult<CommandType> {
        self.write_acknowledged(CommandType::MsgSend, message)
    }

    pub fn write_config_message(&mut self, configuration: &ConfigureRadio) -> CouplingResult<CommandType> {
        self.write_acknowledged(CommandType::ConfRadio, configuration)
    }

    /// Grants `time` to the peer. The answer arrives on the other channel.
    pub fn write_advance_time_message(&mut self, time: SimTime) -> CouplingResult<()> {
        self.write_message(CommandType::AdvanceTime, &TimeMessage { time })
    }

    /// Flushes and shuts the socket down. Errors are logged, never returned,
    /// and later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.writer.flush() {
            tracing::debug!("flush on close failed: {}", err);
        }
        if let Some(socket) = self.socket.take() {
            if let Err(err) = socket.shutdown(Shutdown::Both) {
                tracing::debug!("socket shutdown failed: {}", err);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for ClientServerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientServerChannel")
            .field("peer", &self.peer_ip())
            .field("closed", &self.closed)
            .finish()
    }
}
