//! Integration tests for the network coupling
//!
//! A scripted network federate runs on a background thread behind two
//! localhost sockets and answers the ambassador the way a real peer would.

use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use cosim_kernel::coupling::frame::{read_frame, write_frame, MAX_FRAME_SIZE};
use cosim_kernel::coupling::protocol::{
    decode_body, encode_body, CommandMessage, InitMessage, PortExchange, ReceiveMessage, SendMessage,
    TimeMessage, UpdateNode, UpdateType, WireBody,
};
use cosim_kernel::coupling::CommandType;
use cosim_kernel::objects::CartesianPoint;
use cosim_kernel::types::SECOND;
use cosim_kernel::v2x::{AdHocChannel, AdHocConfiguration, Destination, InterfaceConfiguration, V2xMessage};
use cosim_kernel::{CouplingConfig, ErrorCode, Interaction, NetworkAmbassador, RecordingRti, UnitMapping};

// ============================================================================
// Scripted Federate
// ============================================================================

/// A command received by the scripted federate and its body, if any.
type Received = (CommandType, Vec<u8>);

fn send<T: WireBody>(stream: &mut TcpStream, body: &T) {
    write_frame(stream, &encode_body(body).unwrap()).unwrap();
}

fn send_command(stream: &mut TcpStream, command: CommandType) {
    send(stream, &CommandMessage(command.tag()));
}

fn receive_command(stream: &mut TcpStream) -> Option<CommandType> {
    let frame = read_frame(stream, MAX_FRAME_SIZE).ok()?;
    let CommandMessage(tag) = decode_body(&frame).ok()?;
    CommandType::from_tag(tag)
}

fn receive_body(stream: &mut TcpStream) -> Vec<u8> {
    read_frame(stream, MAX_FRAME_SIZE).unwrap()
}

/// Runs the federate side of the handshake, then acknowledges every command
/// until `SHUT_DOWN`. Each grant is answered with a `NEXT_EVENT` five seconds
/// later, a reception on node 0, a reception on an unknown node and `END`.
fn spawn_federate(events: TcpListener) -> JoinHandle<Vec<Received>> {
    let commands = TcpListener::bind("127.0.0.1:0").unwrap();
    let command_port = commands.local_addr().unwrap().port();

    thread::spawn(move || {
        let (mut events, _) = events.accept().unwrap();
        send_command(&mut events, CommandType::Init);
        send(&mut events, &PortExchange { port: command_port as u32 });
        let (mut commands, _) = commands.accept().unwrap();

        let mut received = Vec::new();
        while let Some(command) = receive_command(&mut commands) {
            match command {
                CommandType::ShutDown => {
                    received.push((command, Vec::new()));
                    break;
                }
                CommandType::AdvanceTime => {
                    let body = receive_body(&mut commands);
                    let TimeMessage { time } = decode_body(&body).unwrap();
                    received.push((command, body));

                    send_command(&mut events, CommandType::NextEvent);
                    send(&mut events, &TimeMessage { time: time + 5 * SECOND });
                    for node_id in [0, 99] {
                        send_command(&mut events, CommandType::MsgRecv);
                        send(
                            &mut events,
                            &ReceiveMessage {
                                time,
                                node_id,
                                channel: AdHocChannel::Cch,
                                message_id: 7,
                                rssi: -65.0,
                            },
                        );
                    }
                    send_command(&mut events, CommandType::End);
                    send(&mut events, &TimeMessage { time });
                }
                other => {
                    received.push((other, receive_body(&mut commands)));
                    send_command(&mut commands, CommandType::Success);
                }
            }
        }
        received
    })
}

fn listen() -> (TcpListener, CouplingConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = CouplingConfig::new(listener.local_addr().unwrap().port());
    config.host = "127.0.0.1".to_string();
    (listener, config)
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

fn beacon(id: i32, source: &str) -> V2xMessage {
    V2xMessage {
        id,
        source: source.to_string(),
        destination: Destination::adhoc_broadcast(AdHocChannel::Cch),
        payload_length: 100,
        payload: serde_json::Value::Null,
    }
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_full_session_over_tcp() {
    let (listener, config) = listen();
    let federate = spawn_federate(listener);

    let rti = RecordingRti::new();
    let mut network = NetworkAmbassador::connect(&config, rti.clone()).unwrap();
    network.initialize(0, 100 * SECOND).unwrap();

    network
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", vec!["Beacon".to_string()])
                .with_position(CartesianPoint::new(100.0, 50.0)),
        })
        .unwrap();
    assert!(network.is_pending("rsu_0"));
    network.process_interaction(radio("rsu_0")).unwrap();
    assert!(!network.is_pending("rsu_0"));
    assert_eq!(network.simulated_nodes().external_id("rsu_0"), Some(0));

    network
        .process_interaction(Interaction::V2xMessageTransmission {
            time: SECOND,
            message: beacon(7, "rsu_0"),
        })
        .unwrap();

    network.process_time_advance_grant(10 * SECOND).unwrap();
    assert_eq!(rti.advance_requests(), vec![15 * SECOND]);

    let receptions: Vec<(String, i32)> = rti
        .interactions()
        .into_iter()
        .filter_map(|interaction| match interaction {
            Interaction::V2xMessageReception {
                receiver_name,
                message_id,
                ..
            } => Some((receiver_name, message_id)),
            _ => None,
        })
        .collect();
    assert_eq!(receptions, vec![("rsu_0".to_string(), 7)]);

    network.finish_simulation().unwrap();
    network.finish_simulation().unwrap();
    assert!(network.is_finished());

    let received = federate.join().unwrap();
    let commands: Vec<CommandType> = received.iter().map(|(command, _)| *command).collect();
    assert_eq!(
        commands,
        vec![
            CommandType::Init,
            CommandType::UpdateNode,
            CommandType::ConfRadio,
            CommandType::MsgSend,
            CommandType::AdvanceTime,
            CommandType::ShutDown,
        ]
    );

    let init: InitMessage = decode_body(&received[0].1).unwrap();
    assert_eq!(init.start_time, 0);
    assert_eq!(init.end_time, 100 * SECOND);

    let add: UpdateNode = decode_body(&received[1].1).unwrap();
    assert_eq!(add.update_type, UpdateType::AddRsu);
    assert_eq!(add.nodes.len(), 1);
    assert_eq!(add.nodes[0].id, 0);

    let sent: SendMessage = decode_body(&received[3].1).unwrap();
    assert_eq!(sent.node_id, 0);
    assert_eq!(sent.message_id, 7);
    assert_eq!(sent.time, SECOND);
}

#[test]
fn test_unsupported_destination_not_sent() {
    let (listener, mut config) = listen();
    config.capabilities.routing_types = vec![cosim_kernel::v2x::DestinationType::AdHocGeocast];
    let federate = spawn_federate(listener);

    let mut network = NetworkAmbassador::connect(&config, RecordingRti::new()).unwrap();
    network.initialize(0, 100 * SECOND).unwrap();
    network
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", vec!["Beacon".to_string()])
                .with_position(CartesianPoint::new(0.0, 0.0)),
        })
        .unwrap();
    network.process_interaction(radio("rsu_0")).unwrap();

    network
        .process_interaction(Interaction::V2xMessageTransmission {
            time: SECOND,
            message: beacon(1, "rsu_0"),
        })
        .unwrap();
    assert_eq!(network.dropped_messages(), 1);

    network.finish_simulation().unwrap();
    let commands: Vec<CommandType> = federate.join().unwrap().into_iter().map(|(c, _)| c).collect();
    assert!(!commands.contains(&CommandType::MsgSend));
}

// ============================================================================
// Handshake Failures
// ============================================================================

#[test]
fn test_handshake_requires_init() {
    let (listener, config) = listen();
    let peer = thread::spawn(move || {
        let (mut events, _) = listener.accept().unwrap();
        send_command(&mut events, CommandType::End);
        // Keep the socket open until the ambassador has read the command.
        let _ = receive_command(&mut events);
    });

    let err = NetworkAmbassador::connect(&config, RecordingRti::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CouplingHandshake);
    peer.join().unwrap();
}

#[test]
fn test_unknown_command_on_event_channel() {
    let (listener, config) = listen();
    let peer = thread::spawn(move || {
        let (mut events, _) = listener.accept().unwrap();
        send(&mut events, &CommandMessage(12345));
        let _ = receive_command(&mut events);
    });

    let err = NetworkAmbassador::connect(&config, RecordingRti::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CouplingUnexpectedCommand);
    peer.join().unwrap();
}
