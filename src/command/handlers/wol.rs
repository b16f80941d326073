//! Wake-on-LAN handler
//!
//! Builds the magic packet (six `0xFF` bytes followed by sixteen copies
//! of the target MAC) and sends it over broadcast UDP.

use super::{CommandHandler, HandlerContext};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Wakes a machine on the local network by hardware address
#[derive(Debug)]
pub struct WakeOnLan {
    target: SocketAddr,
}

impl WakeOnLan {
    /// Send wake packets to a specific destination instead of the
    /// broadcast address
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for WakeOnLan {
    fn default() -> Self {
        // Discard port on the limited broadcast address
        Self {
            target: SocketAddr::from((Ipv4Addr::BROADCAST, 9)),
        }
    }
}

/// Parse a MAC address in `AA:BB:CC:DD:EE:FF` or `AA-BB-...` form
fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split([':', '-']).collect();
    if parts.len() != 6 {
        bail!("invalid MAC address `{s}`: expected 6 octets");
    }

    let mut mac = [0u8; 6];
    for (octet, part) in mac.iter_mut().zip(&parts) {
        if part.len() != 2 {
            bail!("invalid MAC address `{s}`: octet `{part}` is not two hex digits");
        }
        *octet = u8::from_str_radix(part, 16)
            .with_context(|| format!("invalid MAC address `{s}`: bad octet `{part}`"))?;
    }
    Ok(mac)
}

fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for copy in 0..16 {
        let start = 6 + copy * 6;
        packet[start..start + 6].copy_from_slice(&mac);
    }
    packet
}

#[async_trait]
impl CommandHandler for WakeOnLan {
    async fn execute(
        &self,
        _ctx: &HandlerContext,
        args: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        let mac_str = args
            .get("mac")
            .and_then(Value::as_str)
            .context("`mac` must be a string")?;
        let mac = parse_mac(mac_str)?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind wake socket")?;
        socket
            .set_broadcast(true)
            .context("failed to enable broadcast")?;
        socket
            .send_to(&magic_packet(mac), self.target)
            .await
            .with_context(|| format!("failed to send wake packet to {}", self.target))?;

        Ok(json!({ "sent": mac_str }))
    }
}
