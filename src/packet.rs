//! Wire encoding of ICMP echo requests and decoding of raw IPv4/ICMP datagrams.
//!
//! All multi-byte fields are written and read in network byte order through
//! `pnet` packet views, never through in-memory struct layout.

use std::{
    net::Ipv4Addr,
    time::{SystemTime, UNIX_EPOCH},
};

use pnet::packet::{
    icmp::{
        echo_reply::EchoReplyPacket,
        echo_request::{self, MutableEchoRequestPacket},
        IcmpCode, IcmpPacket, IcmpType, IcmpTypes,
    },
    ipv4::Ipv4Packet,
    MutablePacket, Packet,
};

use crate::{
    checksum::checksum,
    constants::{ECHO_HEADER_LEN, ICMP_HEADER_LEN, IPV4_HEADER_LEN, MIN_REPLY_LEN, TIMESTAMP_LEN},
    error::{Error, Result},
    probe::{ProbeIdentity, ReplyKind},
};

/// Seconds since the Unix epoch, the value carried in the echo timestamp.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Builds an echo request: 8-byte ICMP header, 8-byte timestamp, then
/// `payload_size` zero bytes. The checksum is computed once over the finished
/// buffer and written into the header.
pub fn encode_echo_request(identity: ProbeIdentity, timestamp: f64, payload_size: usize) -> Vec<u8> {
    let mut buf = vec![0; ECHO_HEADER_LEN + payload_size];
    let mut packet = MutableEchoRequestPacket::new(&mut buf)
        .expect("buffer is sized for an echo request header");
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(echo_request::IcmpCodes::NoCode);
    packet.set_checksum(0);
    packet.set_identifier(identity.session_id);
    packet.set_sequence_number(identity.sequence);
    packet.payload_mut()[..TIMESTAMP_LEN].copy_from_slice(&timestamp.to_be_bytes());

    let sum = checksum(packet.packet());
    packet.set_checksum(sum);
    buf
}

/// Header fields of a datagram read from a raw ICMP socket.
///
/// `identity` and `embedded_timestamp` are the bytes at the echo positions;
/// they only carry meaning when `icmp_type` is an echo reply.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct DecodedPacket {
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub icmp_type: IcmpType,
    pub icmp_code: IcmpCode,
    pub identity: ProbeIdentity,
    pub embedded_timestamp: f64,
}

impl DecodedPacket {
    pub fn reply_kind(&self) -> Option<ReplyKind> {
        match self.icmp_type {
            IcmpTypes::EchoReply => Some(ReplyKind::EchoReply),
            IcmpTypes::TimeExceeded => Some(ReplyKind::TimeExceeded),
            IcmpTypes::DestinationUnreachable => Some(ReplyKind::DestinationUnreachable),
            _ => None,
        }
    }
}

/// Decodes an IPv4 header followed by an ICMP echo-style header and timestamp.
///
/// The IPv4 header checksum is not checked. Options announced by the header
/// length field are skipped.
pub fn decode_ipv4_and_icmp(bytes: &[u8]) -> Result<DecodedPacket> {
    let len = bytes.len();
    if len < MIN_REPLY_LEN {
        return Err(Error::malformed("shorter than IPv4 and ICMP echo headers", len));
    }
    let ip = Ipv4Packet::new(bytes).ok_or(Error::malformed("failed to parse IPv4 header", len))?;
    if ip.get_version() != 4 {
        return Err(Error::malformed("not an IPv4 packet", len));
    }
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IPV4_HEADER_LEN {
        return Err(Error::malformed("invalid IPv4 header length", len));
    }
    let icmp_bytes = bytes
        .get(header_len..)
        .filter(|rest| rest.len() >= ECHO_HEADER_LEN)
        .ok_or(Error::malformed("ICMP header truncated after IPv4 options", len))?;

    let icmp = IcmpPacket::new(icmp_bytes).ok_or(Error::malformed("failed to parse ICMP header", len))?;
    let echo =
        EchoReplyPacket::new(icmp_bytes).ok_or(Error::malformed("failed to parse ICMP echo fields", len))?;
    let mut timestamp = [0; TIMESTAMP_LEN];
    timestamp.copy_from_slice(&icmp_bytes[ICMP_HEADER_LEN..ECHO_HEADER_LEN]);

    Ok(DecodedPacket {
        ttl: ip.get_ttl(),
        source: ip.get_source(),
        icmp_type: icmp.get_icmp_type(),
        icmp_code: icmp.get_icmp_code(),
        identity: ProbeIdentity::new(echo.get_identifier(), echo.get_sequence_number()),
        embedded_timestamp: f64::from_be_bytes(timestamp),
    })
}
