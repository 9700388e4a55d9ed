/// Gateway discovery over the local broadcast announce protocol
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

use crate::error::GatewayError;
use crate::gateway::protocol::{
    parse_discovery_response, request_frame, DiscoveredGateway, CMD_BROADCAST,
};

const LOCAL_DISCOVERY_PORT: u16 = 59387;
const GATEWAY_DISCOVERY_PORT: u16 = 46000;
const RECEIVE_TIMEOUT_SECS: u64 = 2;
const MAX_ATTEMPTS: u32 = 5;
const MAX_DATAGRAM_LEN: usize = 1024;

/// Broadcast discovery settings
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Local address the UDP socket binds to
    pub bind: SocketAddr,
    /// Where the broadcast request is sent
    pub target: SocketAddr,
    pub receive_timeout: Duration,
    pub attempts: u32,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, LOCAL_DISCOVERY_PORT).into(),
            target: SocketAddrV4::new(Ipv4Addr::BROADCAST, GATEWAY_DISCOVERY_PORT).into(),
            receive_timeout: Duration::from_secs(RECEIVE_TIMEOUT_SECS),
            attempts: MAX_ATTEMPTS,
        }
    }
}

impl Discovery {
    /// Broadcast a discovery request until a supported gateway answers
    ///
    /// Every request counts against the attempt budget, whether it times out,
    /// fails to parse, or is answered by a device that is not a GW gateway.
    pub async fn discover(&self) -> Result<DiscoveredGateway, GatewayError> {
        let socket = UdpSocket::bind(self.bind).await?;
        socket.set_broadcast(true)?;

        let request = request_frame(CMD_BROADCAST);
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        for attempt in 1..=self.attempts {
            debug!("Discovery attempt {}/{}", attempt, self.attempts);
            socket.send_to(&request, self.target).await?;

            let len = match timeout(self.receive_timeout, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!("Discovery attempt {} failed: {}", attempt, e);
                    continue;
                }
                Err(_) => {
                    debug!("Discovery attempt {} timed out", attempt);
                    continue;
                }
            };

            match parse_discovery_response(&buf[..len]) {
                Ok(gateway) => {
                    info!("Discovered gateway {} at {}", gateway.name, gateway.addr);
                    return Ok(gateway);
                }
                Err(e) => warn!("Discovery attempt {} rejected: {}", attempt, e),
            }
        }

        Err(GatewayError::Discovery {
            attempts: self.attempts,
        })
    }
}
