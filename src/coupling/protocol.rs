//! Command tags and message bodies of the network coupling protocol.
//!
//! A command frame carries a single big-endian `i32` tag. Commands that carry
//! data are followed by one body frame holding the matching message type,
//! encoded with bincode.

use std::fmt;
use std::net::Ipv4Addr;

use bincode::config::{self, Config};
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};

use crate::coupling::frame::{FrameError, MAX_FRAME_SIZE};
use crate::objects::CartesianPoint;
use crate::types::{MessageId, SimTime};
use crate::v2x::{AdHocChannel, AdHocConfiguration, Destination, GeoArea, InterfaceConfiguration, RadioMode};

/// Command tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CommandType {
    Undef = -1,
    Init = 1,
    ShutDown = 4,
    UpdateNode = 10,
    RemoveNode = 11,
    AdvanceTime = 20,
    NextEvent = 21,
    MsgRecv = 22,
    MsgSend = 30,
    ConfRadio = 31,
    End = 40,
    Success = 41,
}

impl CommandType {
    pub fn tag(self) -> i32 {
        self as i32
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        Some(match tag {
            -1 => CommandType::Undef,
            1 => CommandType::Init,
            4 => CommandType::ShutDown,
            10 => CommandType::UpdateNode,
            11 => CommandType::RemoveNode,
            20 => CommandType::AdvanceTime,
            21 => CommandType::NextEvent,
            22 => CommandType::MsgRecv,
            30 => CommandType::MsgSend,
            31 => CommandType::ConfRadio,
            40 => CommandType::End,
            41 => CommandType::Success,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandType::Undef => "UNDEF",
            CommandType::Init => "INIT",
            CommandType::ShutDown => "SHUT_DOWN",
            CommandType::UpdateNode => "UPDATE_NODE",
            CommandType::RemoveNode => "REMOVE_NODE",
            CommandType::AdvanceTime => "ADVANCE_TIME",
            CommandType::NextEvent => "NEXT_EVENT",
            CommandType::MsgRecv => "MSG_RECV",
            CommandType::MsgSend => "MSG_SEND",
            CommandType::ConfRadio => "CONF_RADIO",
            CommandType::End => "END",
            CommandType::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.tag())
    }
}

/// Marker for types that travel as a message body.
pub trait WireBody: Encode + Decode<()> {}

impl<T: Encode + Decode<()>> WireBody for T {}

/// Bodies are big-endian with fixed-width integers; lengths are `u64` and
/// enum variants are `u32` indices.
fn wire_config() -> impl Config {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_FRAME_SIZE>()
}

/// Packs `body` into bytes.
pub fn encode_body<T: WireBody>(body: &T) -> Result<Vec<u8>, FrameError> {
    Ok(bincode::encode_to_vec(body, wire_config())?)
}

/// Unpacks a complete body; trailing bytes are an error.
pub fn decode_body<T: WireBody>(bytes: &[u8]) -> Result<T, FrameError> {
    let (body, read) = bincode::decode_from_slice(bytes, wire_config())?;
    match bytes.len() - read {
        0 => Ok(body),
        left => Err(FrameError::Malformed(format!("{} trailing bytes", left))),
    }
}

// Channels travel as their one-byte channel number.
impl Encode for AdHocChannel {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.wire_value().encode(encoder)
    }
}

impl<Context> Decode<Context> for AdHocChannel {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let value: u8 = Decode::decode(decoder)?;
        AdHocChannel::from_wire(value)
            .ok_or_else(|| DecodeError::OtherString(format!("unknown ad-hoc channel {}", value)))
    }
}

bincode::impl_borrow_decode!(AdHocChannel);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct CommandMessage(pub i32);

/// Port of the second channel, announced during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PortExchange {
    pub port: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct TimeMessage {
    pub time: SimTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct InitMessage {
    pub start_time: SimTime,
    pub end_time: SimTime,
}

/// Sub-type of an `UPDATE_NODE` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum UpdateType {
    AddVehicle,
    AddRsu,
    MoveNode,
    RemoveNode,
}

/// Id and position of one node.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct NodeData {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

impl NodeData {
    pub fn new(id: u32, position: CartesianPoint) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
        }
    }

    /// Entry of a removal batch; coordinates are ignored by the peer.
    pub fn removal(id: u32) -> Self {
        Self { id, x: 0.0, y: 0.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct UpdateNode {
    pub update_type: UpdateType,
    pub time: SimTime,
    pub nodes: Vec<NodeData>,
}

/// Destination address of a sent message.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum AddressBody {
    Topocast {
        ip: u32,
        ttl: i32,
    },
    GeoCircle {
        ip: u32,
        center_x: f64,
        center_y: f64,
        radius: f64,
    },
    GeoRectangle {
        ip: u32,
        a_x: f64,
        a_y: f64,
        b_x: f64,
        b_y: f64,
    },
}

impl AddressBody {
    /// Translates a destination, or returns why the peer cannot address it.
    pub fn from_destination(destination: &Destination) -> Result<Self, String> {
        let ip = u32::from(destination.address);
        if destination.destination_type.is_geocast() {
            return match &destination.area {
                Some(GeoArea::Rectangle { a, b }) => Ok(AddressBody::GeoRectangle {
                    ip,
                    a_x: a.x,
                    a_y: a.y,
                    b_x: b.x,
                    b_y: b.y,
                }),
                Some(GeoArea::Circle { center, radius }) => Ok(AddressBody::GeoCircle {
                    ip,
                    center_x: center.x,
                    center_y: center.y,
                    radius: *radius,
                }),
                Some(GeoArea::Polygon(_)) => Err("polygon geocast areas are not supported".to_string()),
                None => Err("geocast without destination area".to_string()),
            };
        }
        if destination.time_to_live > -1 {
            Ok(AddressBody::Topocast {
                ip,
                ttl: destination.time_to_live,
            })
        } else {
            Err("topocast without time to live".to_string())
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        match self {
            AddressBody::Topocast { ip, .. }
            | AddressBody::GeoCircle { ip, .. }
            | AddressBody::GeoRectangle { ip, .. } => Ipv4Addr::from(*ip),
        }
    }
}

/// Body of a `MSG_SEND` command.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct SendMessage {
    pub time: SimTime,
    pub node_id: u32,
    pub channel: AdHocChannel,
    pub message_id: MessageId,
    pub length: u64,
    pub address: AddressBody,
}

impl SendMessage {
    /// Builds the body for a message sent by `node_id`, or returns why the
    /// destination cannot be sent to the peer.
    pub fn new(
        time: SimTime,
        node_id: u32,
        message_id: MessageId,
        length: u64,
        destination: &Destination,
    ) -> Result<Self, String> {
        let channel = destination
            .channel
            .ok_or_else(|| "destination has no ad-hoc channel".to_string())?;
        Ok(Self {
            time,
            node_id,
            channel,
            message_id,
            length,
            address: AddressBody::from_destination(destination)?,
        })
    }
}

/// One radio interface of a `CONF_RADIO` command.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct RadioConfiguration {
    /// `false` lets the peer route messages through the node.
    pub receiving_messages: bool,
    pub ip: u32,
    pub subnet: u32,
    pub transmission_power: f64,
    pub primary_channel: AdHocChannel,
    /// Set for alternating dual-channel operation.
    pub secondary_channel: Option<AdHocChannel>,
}

impl From<&InterfaceConfiguration> for RadioConfiguration {
    fn from(conf: &InterfaceConfiguration) -> Self {
        Self {
            receiving_messages: false,
            ip: u32::from(conf.ip),
            subnet: u32::from(conf.subnet),
            transmission_power: conf.power,
            primary_channel: conf.channel0,
            secondary_channel: conf.channel1,
        }
    }
}

/// Body of a `CONF_RADIO` command. The radio count (0, 1 or 2) is the
/// length of `radios`.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ConfigureRadio {
    pub time: SimTime,
    pub message_id: u32,
    pub external_id: u32,
    pub radios: Vec<RadioConfiguration>,
}

impl ConfigureRadio {
    /// Translates an ad-hoc configuration; fails if a radio the mode asks
    /// for is not configured.
    pub fn new(
        time: SimTime,
        message_id: u32,
        external_id: u32,
        configuration: &AdHocConfiguration,
    ) -> Result<Self, String> {
        let required = match configuration.radio_mode {
            RadioMode::Off => 0,
            RadioMode::Single => 1,
            RadioMode::Dual => 2,
        };
        let mut radios = Vec::with_capacity(required);
        for (index, conf) in [&configuration.conf0, &configuration.conf1]
            .into_iter()
            .take(required)
            .enumerate()
        {
            let conf = conf.as_ref().ok_or_else(|| {
                format!(
                    "{:?} radio mode of node {} lacks interface configuration {}",
                    configuration.radio_mode, configuration.node_id, index
                )
            })?;
            radios.push(RadioConfiguration::from(conf));
        }
        Ok(Self {
            time,
            message_id,
            external_id,
            radios,
        })
    }
}

/// Body of a `MSG_RECV` command.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ReceiveMessage {
    pub time: SimTime,
    pub node_id: u32,
    pub channel: AdHocChannel,
    pub message_id: MessageId,
    pub rssi: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v2x::{AdHocChannel, InterfaceConfiguration};

    #[test]
    fn test_command_tags() {
        assert_eq!(CommandType::Success.tag(), 41);
        assert_eq!(CommandType::from_tag(21), Some(CommandType::NextEvent));
        assert_eq!(CommandType::from_tag(2), None);
        assert_eq!(CommandType::End.to_string(), "END(40)");
    }

    #[test]
    fn test_update_node_layout() {
        let body = UpdateNode {
            update_type: UpdateType::MoveNode,
            time: 5,
            nodes: vec![NodeData::new(3, CartesianPoint::new(1.0, 2.0))],
        };
        let bytes = encode_body(&body).unwrap();
        assert_eq!(bytes.len(), 4 + 8 + 8 + 20);
        assert_eq!(&bytes[..4], &2u32.to_be_bytes());
        assert_eq!(&bytes[4..12], &5u64.to_be_bytes());
        assert_eq!(&bytes[12..20], &1u64.to_be_bytes());
        assert_eq!(&bytes[20..24], &3u32.to_be_bytes());
        assert_eq!(&bytes[24..32], &1.0f64.to_be_bytes());
        assert_eq!(decode_body::<UpdateNode>(&bytes).unwrap(), body);

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            decode_body::<UpdateNode>(&trailing),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_update_type() {
        let mut bytes = encode_body(&UpdateNode {
            update_type: UpdateType::AddRsu,
            time: 0,
            nodes: Vec::new(),
        })
        .unwrap();
        bytes[..4].copy_from_slice(&9u32.to_be_bytes());
        let err = decode_body::<UpdateNode>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Decode(DecodeError::UnexpectedVariant { found: 9, .. })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = encode_body(&InitMessage {
            start_time: 0,
            end_time: 10,
        })
        .unwrap();
        assert_eq!(bytes.len(), 16);
        assert!(matches!(
            decode_body::<InitMessage>(&bytes[..12]),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn test_oversized_node_count_rejected() {
        let mut bytes = encode_body(&UpdateNode {
            update_type: UpdateType::MoveNode,
            time: 0,
            nodes: Vec::new(),
        })
        .unwrap();
        bytes[12..20].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(decode_body::<UpdateNode>(&bytes).is_err());
    }

    #[test]
    fn test_channel_travels_as_one_byte() {
        let body = ReceiveMessage {
            time: 1,
            node_id: 2,
            channel: AdHocChannel::Cch,
            message_id: 3,
            rssi: -70.0,
        };
        let mut bytes = encode_body(&body).unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 1 + 4 + 8);
        assert_eq!(bytes[12], 3);
        assert_eq!(decode_body::<ReceiveMessage>(&bytes).unwrap(), body);

        bytes[12] = 42;
        let err = decode_body::<ReceiveMessage>(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown ad-hoc channel 42"));
    }

    #[test]
    fn test_address_from_destination() {
        let broadcast = Destination::adhoc_broadcast(AdHocChannel::Cch);
        assert_eq!(
            AddressBody::from_destination(&broadcast).unwrap(),
            AddressBody::Topocast {
                ip: u32::MAX,
                ttl: 1
            }
        );

        let circle = Destination::adhoc_geocast(
            AdHocChannel::Sch1,
            GeoArea::Circle {
                center: CartesianPoint::new(10.0, 20.0),
                radius: 50.0,
            },
        );
        let message = SendMessage::new(7, 2, 99, 200, &circle).unwrap();
        assert_eq!(message.channel, AdHocChannel::Sch1);
        assert!(matches!(message.address, AddressBody::GeoCircle { radius, .. } if radius == 50.0));

        let polygon = Destination::adhoc_geocast(AdHocChannel::Sch1, GeoArea::Polygon(Vec::new()));
        assert!(AddressBody::from_destination(&polygon).is_err());

        let mut no_ttl = Destination::adhoc_broadcast(AdHocChannel::Cch);
        no_ttl.time_to_live = -1;
        assert!(AddressBody::from_destination(&no_ttl).is_err());

        let mut no_channel = Destination::adhoc_broadcast(AdHocChannel::Cch);
        no_channel.channel = None;
        assert!(SendMessage::new(0, 0, 0, 0, &no_channel).is_err());
    }

    #[test]
    fn test_configure_radio() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let subnet = Ipv4Addr::new(255, 255, 0, 0);
        let mut conf = InterfaceConfiguration::single_channel(ip, subnet, AdHocChannel::Cch);
        conf.channel1 = Some(AdHocChannel::Sch2);
        let single = AdHocConfiguration::single("veh_0", conf);

        let body = ConfigureRadio::new(10, 1, 4, &single).unwrap();
        assert_eq!(body.radios.len(), 1);
        assert_eq!(body.radios[0].ip, 0x0A00_0001);
        assert_eq!(body.radios[0].secondary_channel, Some(AdHocChannel::Sch2));
        let bytes = encode_body(&body).unwrap();
        assert_eq!(&bytes[16..24], &1u64.to_be_bytes());
        assert_eq!(decode_body::<ConfigureRadio>(&bytes).unwrap(), body);

        let off = ConfigureRadio::new(10, 2, 4, &AdHocConfiguration::off("veh_0")).unwrap();
        assert!(off.radios.is_empty());

        let mut broken = single.clone();
        broken.radio_mode = RadioMode::Dual;
        let err = ConfigureRadio::new(10, 3, 4, &broken).unwrap_err();
        assert!(err.contains("interface configuration 1"));
    }
}
