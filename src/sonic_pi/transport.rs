//! OSC transport
//!
//! Encodes OSC packets and delivers them as UDP datagrams.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use rosc::OscPacket;
use tokio::net::UdpSocket;

use crate::error::{MusicboxError, Result, SonicPiError};

/// Something that can deliver an OSC packet to an address
#[async_trait]
pub trait OscTransport: Send + Sync {
    async fn send(&self, target: SocketAddr, packet: &OscPacket) -> Result<()>;
}

/// UDP transport, one datagram per packet
#[derive(Debug, Default)]
pub struct UdpTransport;

impl UdpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OscTransport for UdpTransport {
    async fn send(&self, target: SocketAddr, packet: &OscPacket) -> Result<()> {
        let bytes = rosc::encoder::encode(packet)?;

        let bind_addr = match target.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let send_failed = |e: std::io::Error| {
            MusicboxError::SonicPi(SonicPiError::SendFailed {
                target: target.to_string(),
                message: e.to_string(),
            })
        };

        let socket = UdpSocket::bind(bind_addr).await.map_err(send_failed)?;
        socket.send_to(&bytes, target).await.map_err(send_failed)?;

        tracing::debug!("Sent {} byte OSC packet to {}", bytes.len(), target);
        Ok(())
    }
}
