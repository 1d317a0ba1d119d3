//! V2X message model: addressing, receiver information and ad-hoc radio
//! configuration.
//!
//! The kernel caches [`V2xMessage`]s by id so that receptions and
//! acknowledgements coming back from the network federate can be resolved to
//! the original message.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::objects::CartesianPoint;
use crate::types::{MessageId, SimTime, UnitId};

/// How a message is routed through the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationType {
    AdHocTopocast,
    AdHocGeocast,
    CellTopocast,
    CellGeocast,
    CellGeocastMbms,
}

impl DestinationType {
    pub fn is_geocast(&self) -> bool {
        matches!(
            self,
            DestinationType::AdHocGeocast | DestinationType::CellGeocast | DestinationType::CellGeocastMbms
        )
    }
}

/// Whether the destination address targets one node or all nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    Broadcast,
    Unicast,
}

/// Transport protocol of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    Udp,
    Tcp,
}

/// Geographic destination area of a geocast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GeoArea {
    Rectangle { a: CartesianPoint, b: CartesianPoint },
    Circle { center: CartesianPoint, radius: f64 },
    Polygon(Vec<CartesianPoint>),
}

/// 802.11p radio channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdHocChannel {
    Sch1,
    Sch2,
    Sch3,
    Cch,
    Sch4,
    Sch5,
    Sch6,
}

impl AdHocChannel {
    /// Channel number used on the coupling wire.
    pub fn wire_value(&self) -> u8 {
        match self {
            AdHocChannel::Sch1 => 0,
            AdHocChannel::Sch2 => 1,
            AdHocChannel::Sch3 => 2,
            AdHocChannel::Cch => 3,
            AdHocChannel::Sch4 => 4,
            AdHocChannel::Sch5 => 5,
            AdHocChannel::Sch6 => 6,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            0 => AdHocChannel::Sch1,
            1 => AdHocChannel::Sch2,
            2 => AdHocChannel::Sch3,
            3 => AdHocChannel::Cch,
            4 => AdHocChannel::Sch4,
            5 => AdHocChannel::Sch5,
            6 => AdHocChannel::Sch6,
            _ => return None,
        })
    }
}

/// Destination of a V2X message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub destination_type: DestinationType,
    pub address: Ipv4Addr,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
    #[serde(default)]
    pub channel: Option<AdHocChannel>,
    /// Hop limit for topocasts; `-1` means unset.
    #[serde(default = "default_ttl")]
    pub time_to_live: i32,
    #[serde(default)]
    pub area: Option<GeoArea>,
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Udp
}

fn default_ttl() -> i32 {
    -1
}

impl Destination {
    /// Single-hop ad-hoc broadcast on the given channel.
    pub fn adhoc_broadcast(channel: AdHocChannel) -> Self {
        Self {
            destination_type: DestinationType::AdHocTopocast,
            address: Ipv4Addr::BROADCAST,
            protocol: ProtocolType::Udp,
            channel: Some(channel),
            time_to_live: 1,
            area: None,
        }
    }

    /// Ad-hoc geocast to all nodes inside `area`.
    pub fn adhoc_geocast(channel: AdHocChannel, area: GeoArea) -> Self {
        Self {
            destination_type: DestinationType::AdHocGeocast,
            address: Ipv4Addr::BROADCAST,
            protocol: ProtocolType::Udp,
            channel: Some(channel),
            time_to_live: -1,
            area: Some(area),
        }
    }

    pub fn address_type(&self) -> AddressType {
        if self.address == Ipv4Addr::BROADCAST {
            AddressType::Broadcast
        } else {
            AddressType::Unicast
        }
    }
}

/// A V2X message as seen by the kernel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct V2xMessage {
    pub id: MessageId,
    pub source: UnitId,
    pub destination: Destination,
    /// Payload size in bytes as accounted by the network simulator.
    pub payload_length: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reception details reported by the network federate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiverInformation {
    pub receive_time: SimTime,
    #[serde(default)]
    pub rssi: f64,
}

/// A message delivered to a unit, paired with its reception details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceivedV2xMessage {
    pub message: V2xMessage,
    pub receiver_information: ReceiverInformation,
}

/// Number of active radios of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    Off,
    Single,
    Dual,
}

/// Configuration of one radio interface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfiguration {
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    /// Transmission power in mW; `-1` lets the network federate decide.
    #[serde(default = "default_power")]
    pub power: f64,
    pub channel0: AdHocChannel,
    /// Second channel; switches the radio into alternating dual-channel mode.
    #[serde(default)]
    pub channel1: Option<AdHocChannel>,
}

fn default_power() -> f64 {
    -1.0
}

impl InterfaceConfiguration {
    pub fn single_channel(ip: Ipv4Addr, subnet: Ipv4Addr, channel: AdHocChannel) -> Self {
        Self {
            ip,
            subnet,
            power: default_power(),
            channel0: channel,
            channel1: None,
        }
    }
}

/// Ad-hoc radio setup of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdHocConfiguration {
    pub node_id: UnitId,
    pub radio_mode: RadioMode,
    #[serde(default)]
    pub conf0: Option<InterfaceConfiguration>,
    #[serde(default)]
    pub conf1: Option<InterfaceConfiguration>,
}

impl AdHocConfiguration {
    pub fn off(node_id: impl Into<UnitId>) -> Self {
        Self {
            node_id: node_id.into(),
            radio_mode: RadioMode::Off,
            conf0: None,
            conf1: None,
        }
    }

    pub fn single(node_id: impl Into<UnitId>, conf: InterfaceConfiguration) -> Self {
        Self {
            node_id: node_id.into(),
            radio_mode: RadioMode::Single,
            conf0: Some(conf),
            conf1: None,
        }
    }
}
