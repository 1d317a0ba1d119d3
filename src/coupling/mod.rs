//! Coupling to an external network simulator.
//!
//! The network federate is a separate process reached over two TCP
//! connections. The first connection carries the federate's announcements
//! (handshake, `NEXT_EVENT`, `MSG_RECV`, `END`); the second, opened on the
//! port announced during the handshake, carries the ambassador's commands and
//! their acknowledgements.
//!
//! - [`frame`]: length-prefixed framing
//! - [`protocol`]: command tags and bincode message bodies
//! - [`channel`]: [`ClientServerChannel`], one framed connection
//! - [`ids`]: [`IdTransformer`], unit ids to network node ids
//! - [`ambassador`]: [`NetworkAmbassador`], the federate driving the peer

pub mod ambassador;
pub mod channel;
pub mod frame;
pub mod ids;
pub mod protocol;

pub use ambassador::NetworkAmbassador;
pub use channel::{ClientServerChannel, ReceivedMessage};
pub use frame::FrameError;
pub use ids::IdTransformer;
pub use protocol::CommandType;

use thiserror::Error;

use crate::error::ErrorCode;

/// Errors on the coupling channels. All of them are fatal for the exchange
/// they occur in.
#[derive(Error, Debug)]
pub enum CouplingError {
    #[error("{}: {0}", ErrorCode::CouplingIo)]
    Io(#[from] std::io::Error),

    #[error("{}: {0}", ErrorCode::CouplingFrame)]
    Frame(#[from] FrameError),

    #[error("{}: unknown command tag {0}", ErrorCode::CouplingUnexpectedCommand)]
    UnknownCommand(i32),

    #[error("{}: expected {expected}, got {got}", ErrorCode::CouplingUnexpectedCommand)]
    UnexpectedCommand { expected: &'static str, got: CommandType },

    #[error("{}: {0}", ErrorCode::CouplingHandshake)]
    Handshake(String),

    #[error("{}: {operation} answered with {got}", ErrorCode::CouplingNegativeAcknowledgement)]
    NegativeAck { operation: &'static str, got: CommandType },

    #[error("{}: {0}", ErrorCode::CouplingUnsupportedConfiguration)]
    UnsupportedConfiguration(String),
}

impl CouplingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CouplingError::Io(_) => ErrorCode::CouplingIo,
            CouplingError::Frame(_) => ErrorCode::CouplingFrame,
            CouplingError::UnknownCommand(_) | CouplingError::UnexpectedCommand { .. } => {
                ErrorCode::CouplingUnexpectedCommand
            }
            CouplingError::Handshake(_) => ErrorCode::CouplingHandshake,
            CouplingError::NegativeAck { .. } => ErrorCode::CouplingNegativeAcknowledgement,
            CouplingError::UnsupportedConfiguration(_) => ErrorCode::CouplingUnsupportedConfiguration,
        }
    }
}

/// Result type for coupling operations.
pub type CouplingResult<T> = Result<T, CouplingError>;

/// Fails unless `ack` is `SUCCESS`.
pub(crate) fn expect_success(operation: &'static str, ack: CommandType) -> CouplingResult<()> {
    match ack {
        CommandType::Success => Ok(()),
        got => Err(CouplingError::NegativeAck { operation, got }),
    }
}
