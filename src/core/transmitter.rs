//! UDP transmitter for encoded snapshots.
//!
//! Each stage instance owns exactly one socket, bound once at open and
//! dropped when the stage is closed. Sends are fire-and-forget: `send_to`
//! returns as soon as the kernel accepts the datagram, nothing waits for
//! the receiver. Failures are classified so the stage can count them and
//! keep going.

use crate::domain::ports::Transport;
use crate::utils::error::{RelayError, Result};
use crate::utils::validation::{validate_ipv4, validate_port};
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

/// Largest payload that fits into one IPv4 UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailure {
    Oversize,
    WouldBlock,
    Refused,
    Unreachable,
    Other,
}

impl SendFailure {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => SendFailure::WouldBlock,
            io::ErrorKind::ConnectionRefused => SendFailure::Refused,
            io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::AddrNotAvailable => SendFailure::Unreachable,
            _ => SendFailure::Other,
        }
    }
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendFailure::Oversize => "oversize",
            SendFailure::WouldBlock => "would block",
            SendFailure::Refused => "refused",
            SendFailure::Unreachable => "unreachable",
            SendFailure::Other => "other",
        };
        f.write_str(name)
    }
}

/// 只接受 IPv4 字面位址；解析失敗即為設定錯誤
pub fn resolve_destination(address: &str, port: u16) -> Result<SocketAddrV4> {
    let to_resolution_error = |e: RelayError| RelayError::AddressResolution {
        address: address.to_string(),
        port,
        reason: match e {
            RelayError::InvalidConfigValueError { reason, .. } => reason,
            other => other.to_string(),
        },
    };

    let ip = validate_ipv4("destination.address", address).map_err(to_resolution_error)?;
    validate_port("destination.port", port).map_err(to_resolution_error)?;

    Ok(SocketAddrV4::new(ip, port))
}

pub struct UdpTransmitter {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransmitter {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransmitter {
    async fn open(destination: SocketAddrV4, bind: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        tracing::debug!(
            "UDP socket bound on {} for {}",
            socket.local_addr()?,
            destination
        );

        Ok(Self {
            socket,
            destination: SocketAddr::V4(destination),
        })
    }

    async fn send(&self, datagram: &[u8]) -> Result<usize> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(RelayError::SendError {
                destination: self.destination,
                kind: SendFailure::Oversize,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "datagram of {} bytes exceeds {} bytes",
                        datagram.len(),
                        MAX_DATAGRAM_SIZE
                    ),
                ),
            });
        }

        self.socket
            .send_to(datagram, self.destination)
            .await
            .map_err(|source| RelayError::SendError {
                destination: self.destination,
                kind: SendFailure::classify(&source),
                source,
            })
    }

    fn destination(&self) -> SocketAddr {
        self.destination
    }
}
