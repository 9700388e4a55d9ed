/// Gateway wire protocol constants and frame helpers
///
/// Request frames are `FF FF <command> <size> <checksum>` where the checksum
/// is the low byte of the sum of every byte after the `FF FF` preamble.
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::GatewayError;
use crate::utils::hex_dump;

pub const PREAMBLE: [u8; 2] = [0xFF, 0xFF];
pub const CMD_BROADCAST: u8 = 0x12;
pub const CMD_LIVE_DATA: u8 = 0x27;

/// Device names of supported gateways start with this
pub const DEVICE_NAME_PREFIX: &[u8] = b"GW";

// Discovery response layout
const DISCOVERY_IP_OFFSET: usize = 11;
const DISCOVERY_PORT_OFFSET: usize = 15;
const DISCOVERY_NAME_OFFSET: usize = 18;

/// Low byte of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Five-byte request frame for a command without arguments
pub const fn request_frame(command: u8) -> [u8; 5] {
    let size = 0x03;
    [
        PREAMBLE[0],
        PREAMBLE[1],
        command,
        size,
        command.wrapping_add(size),
    ]
}

/// Whether the last byte of `frame` matches the checksum of its body
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame {
        [0xFF, 0xFF, body @ .., last] => checksum(body) == *last,
        _ => false,
    }
}

/// A gateway that answered the discovery broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGateway {
    pub addr: SocketAddrV4,
    pub name: String,
}

/// Parse a discovery broadcast response
///
/// The IPv4 address sits at offset 11 and the port at offset 15, both in
/// network order. The device name runs from offset 18 up to the checksum and
/// must start with `GW`.
pub fn parse_discovery_response(packet: &[u8]) -> Result<DiscoveredGateway, GatewayError> {
    if packet.len() <= DISCOVERY_NAME_OFFSET {
        return Err(GatewayError::MalformedResponse(format!(
            "discovery response too short: {}",
            hex_dump(packet)
        )));
    }

    let ip = Ipv4Addr::new(
        packet[DISCOVERY_IP_OFFSET],
        packet[DISCOVERY_IP_OFFSET + 1],
        packet[DISCOVERY_IP_OFFSET + 2],
        packet[DISCOVERY_IP_OFFSET + 3],
    );
    let port = u16::from_be_bytes([
        packet[DISCOVERY_PORT_OFFSET],
        packet[DISCOVERY_PORT_OFFSET + 1],
    ]);

    let name_bytes = &packet[DISCOVERY_NAME_OFFSET..packet.len() - 1];
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    if !name_bytes.starts_with(DEVICE_NAME_PREFIX) {
        return Err(GatewayError::UnsupportedDevice(name));
    }

    Ok(DiscoveredGateway {
        addr: SocketAddrV4::new(ip, port),
        name,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Discovery response as a gateway would send it
    pub(crate) fn discovery_response(ip: [u8; 4], port: u16, name: &str) -> Vec<u8> {
        let mut packet = vec![0xFF, 0xFF, CMD_BROADCAST, 0x00, 0x27];
        packet.extend_from_slice(&[0x48, 0x3F, 0xDA, 0x54, 0x14, 0xEC]); // MAC
        packet.extend_from_slice(&ip);
        packet.extend_from_slice(&port.to_be_bytes());
        packet.push(name.len() as u8);
        packet.extend_from_slice(name.as_bytes());
        let sum = checksum(&packet[2..]);
        packet.push(sum);
        packet
    }

    #[test]
    fn request_frames_are_bit_exact() {
        assert_eq!(request_frame(CMD_BROADCAST), [0xFF, 0xFF, 0x12, 0x03, 0x15]);
        assert_eq!(request_frame(CMD_LIVE_DATA), [0xFF, 0xFF, 0x27, 0x03, 0x2A]);
    }

    #[test]
    fn verifies_checksums() {
        assert!(verify_checksum(&request_frame(CMD_LIVE_DATA)));
        assert!(!verify_checksum(&[0xFF, 0xFF, 0x27, 0x03, 0x2B]));
        assert!(!verify_checksum(&[0x00, 0xFF, 0x27, 0x03, 0x2A]));
        assert!(!verify_checksum(&[0xFF]));
        assert!(verify_checksum(&discovery_response([10, 0, 0, 5], 45000, "GW1000A")));
    }

    #[test]
    fn parses_supported_gateway() {
        let packet = discovery_response([192, 168, 1, 42], 45000, "GW1000A-WIFI14EC V1.6.8");
        let gateway = parse_discovery_response(&packet).unwrap();
        assert_eq!(
            gateway.addr,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 42), 45000)
        );
        assert_eq!(gateway.name, "GW1000A-WIFI14EC V1.6.8");
    }

    #[test]
    fn rejects_other_device_families() {
        let packet = discovery_response([192, 168, 1, 42], 45000, "AMBWeather");
        match parse_discovery_response(&packet) {
            Err(GatewayError::UnsupportedDevice(name)) => assert_eq!(name, "AMBWeather"),
            other => panic!("expected unsupported device, got {:?}", other),
        }
    }

    #[test]
    fn rejects_short_responses() {
        assert!(matches!(
            parse_discovery_response(&[0xFF, 0xFF, 0x12]),
            Err(GatewayError::MalformedResponse(_))
        ));
    }
}
