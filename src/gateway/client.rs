/// TCP connection to the gateway and live-data retrieval
use log::{debug, error, warn};
use std::net::SocketAddr;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::decoder::walker::ensure_frame;
use crate::error::GatewayError;
use crate::gateway::discovery::Discovery;
use crate::gateway::protocol::{request_frame, verify_checksum, CMD_LIVE_DATA};
use crate::utils::hex_dump;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const RESPONSE_TIMEOUT_SECS: u64 = 10;
const MAX_RESPONSE_LEN: usize = 1024;

/// Live-data frame and the moment it was received
#[derive(Debug, Clone)]
pub struct LiveDataResponse {
    pub bytes: Vec<u8>,
    pub captured_at: OffsetDateTime,
}

/// Open a TCP connection to the gateway
pub async fn connect(addr: SocketAddr) -> Result<TcpStream, GatewayError> {
    match timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(GatewayError::Connect { addr, source }),
        Err(_) => Err(GatewayError::Timeout("connect")),
    }
}

/// Connect to the known gateway, falling back to discovery
///
/// # Returns
/// The open stream and the address it is connected to, so callers can reuse
/// a discovered address on the next cycle.
pub async fn connect_or_discover(
    known: Option<SocketAddr>,
    discovery: &Discovery,
) -> Result<(TcpStream, SocketAddr), GatewayError> {
    if let Some(addr) = known {
        match connect(addr).await {
            Ok(stream) => return Ok((stream, addr)),
            Err(e) => error!("Unable to connect to the gateway, trying discovery: {}", e),
        }
    }

    let gateway = discovery.discover().await?;
    let addr = SocketAddr::V4(gateway.addr);
    let stream = connect(addr).await?;
    Ok((stream, addr))
}

/// Request the current live-data snapshot
///
/// Sends the live-data command and reads a single response of up to 1024
/// bytes. A checksum mismatch is logged but the frame is still returned.
pub async fn fetch_live_data(stream: &mut TcpStream) -> Result<LiveDataResponse, GatewayError> {
    stream.write_all(&request_frame(CMD_LIVE_DATA)).await?;

    let mut buf = vec![0u8; MAX_RESPONSE_LEN];
    let len = timeout(
        Duration::from_secs(RESPONSE_TIMEOUT_SECS),
        stream.read(&mut buf),
    )
    .await
    .map_err(|_| GatewayError::Timeout("live data"))??;
    let captured_at = OffsetDateTime::now_utc();
    buf.truncate(len);

    ensure_frame(&buf).map_err(|e| {
        GatewayError::MalformedResponse(format!("{}: {}", e, hex_dump(&buf)))
    })?;

    if !verify_checksum(&buf) {
        warn!("Live data checksum mismatch: {}", hex_dump(&buf));
    }
    debug!("Received {} bytes of live data", len);

    Ok(LiveDataResponse {
        bytes: buf,
        captured_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::protocol::checksum;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tokio::net::TcpListener;

    pub(crate) fn live_data_frame(records: &[u8]) -> Vec<u8> {
        let size = (records.len() + 4) as u16;
        let mut frame = vec![0xFF, 0xFF, CMD_LIVE_DATA];
        frame.extend_from_slice(&size.to_be_bytes());
        frame.extend_from_slice(records);
        let sum = checksum(&frame[2..]);
        frame.push(sum);
        frame
    }

    async fn spawn_gateway(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 5];
            socket.read_exact(&mut request).await.unwrap();
            assert_eq!(request, [0xFF, 0xFF, 0x27, 0x03, 0x2A]);
            socket.write_all(&response).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetches_live_data() {
        let frame = live_data_frame(&[0x02, 0x01, 0xF4]);
        let addr = spawn_gateway(frame.clone()).await;

        let before = OffsetDateTime::now_utc();
        let mut stream = connect(addr).await.unwrap();
        let response = fetch_live_data(&mut stream).await.unwrap();
        assert_eq!(response.bytes, frame);
        assert!(response.captured_at >= before);
    }

    #[tokio::test]
    async fn checksum_mismatch_still_returns_frame() {
        let mut frame = live_data_frame(&[0x02, 0x01, 0xF4]);
        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);
        assert!(!verify_checksum(&frame));
        let addr = spawn_gateway(frame.clone()).await;

        let mut stream = connect(addr).await.unwrap();
        let response = fetch_live_data(&mut stream).await.unwrap();
        assert_eq!(response.bytes, frame);
    }

    #[tokio::test]
    async fn rejects_truncated_response() {
        let addr = spawn_gateway(vec![0xFF, 0xFF, 0x27]).await;
        let mut stream = connect(addr).await.unwrap();
        assert!(matches!(
            fetch_live_data(&mut stream).await,
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            connect(addr).await,
            Err(GatewayError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn known_address_skips_discovery() {
        let addr = spawn_gateway(live_data_frame(&[])).await;
        let discovery = Discovery {
            bind: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into(),
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9).into(),
            receive_timeout: Duration::from_millis(50),
            attempts: 1,
        };

        let (mut stream, connected) = connect_or_discover(Some(addr), &discovery).await.unwrap();
        assert_eq!(connected, addr);
        assert!(fetch_live_data(&mut stream).await.is_ok());
    }
}
