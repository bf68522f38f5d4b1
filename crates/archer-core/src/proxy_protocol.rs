// PROXY protocol v2 header with the endpoint-id TLV.
//
// The appliance emits this header through an iRule; the consumer behind
// the service parses it. `encode` is the reference for the bytes the
// iRule produces.

use std::net::Ipv4Addr;

use uuid::Uuid;

/// Fixed 12-byte v2 signature.
pub const SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];
/// Version 2, command PROXY.
pub const VERSION_COMMAND: u8 = 0x21;
/// AF_INET over STREAM.
pub const FAMILY_TCP4: u8 = 0x11;
/// Custom TLV carrying the endpoint UUID as ASCII.
pub const TLV_ENDPOINT_ID: u8 = 0xEC;
/// ASCII length of a hyphenated UUID.
pub const UUID_LEN: u16 = 36;
/// Bytes of IPv4 addresses and ports.
pub const ADDRESS_LEN: u16 = 12;
/// Length field value: addresses plus the endpoint TLV.
pub const PAYLOAD_LEN: u16 = ADDRESS_LEN + 3 + UUID_LEN;

/// Encode a full header for an IPv4 TCP connection.
pub fn encode(
    remote: Ipv4Addr,
    local: Ipv4Addr,
    remote_port: u16,
    local_port: u16,
    endpoint: Uuid,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + usize::from(PAYLOAD_LEN));
    out.extend_from_slice(&SIGNATURE);
    out.push(VERSION_COMMAND);
    out.push(FAMILY_TCP4);
    out.extend_from_slice(&PAYLOAD_LEN.to_be_bytes());
    out.extend_from_slice(&remote.octets());
    out.extend_from_slice(&local.octets());
    out.extend_from_slice(&remote_port.to_be_bytes());
    out.extend_from_slice(&local_port.to_be_bytes());
    out.push(TLV_ENDPOINT_ID);
    out.extend_from_slice(&UUID_LEN.to_be_bytes());
    out.extend_from_slice(endpoint.hyphenated().to_string().as_bytes());
    out
}
