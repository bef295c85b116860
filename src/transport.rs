use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, time::Instant};

use crate::{
    constants::TRACEROUTE_PORT,
    error::{Error, Result},
    packet::{encode_echo_request, unix_timestamp},
    probe::ProbeIdentity,
    response::ReceivePath,
};

/// Sends single probes and reports when they left.
///
/// Implementations never retry: a failed send is returned to the caller, which
/// decides whether the run can go on.
#[async_trait]
pub trait ProbeTransport: Send {
    /// Sends an ICMP echo request tagged with `identity` and carrying
    /// `payload_size` filler bytes after the timestamp.
    async fn send_echo(
        &mut self,
        destination: Ipv4Addr,
        identity: ProbeIdentity,
        payload_size: usize,
    ) -> Result<Instant>;

    /// Sends an empty UDP datagram to the traceroute port with the given TTL.
    async fn send_ttl_probe(&mut self, ttl: u8, destination: Ipv4Addr) -> Result<Instant>;
}

/// Raw IPv4 ICMP socket registered with the tokio reactor.
///
/// Reads return the whole IPv4 datagram, header included. Opening one needs
/// `CAP_NET_RAW` (or root). Clones share the same socket, so one handle can
/// receive while another sends.
#[derive(Clone, Debug)]
pub struct IcmpSocket {
    inner: Arc<UdpSocket>,
}

impl IcmpSocket {
    /// Must be called from within a tokio runtime.
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(Error::transport("open raw ICMP socket (are you running as root?)"))?;
        socket
            .set_nonblocking(true)
            .map_err(Error::transport("make raw ICMP socket non-blocking"))?;
        let inner = UdpSocket::from_std(socket.into())
            .map_err(Error::transport("register raw ICMP socket with the runtime"))?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub async fn send_to(&self, packet: &[u8], destination: Ipv4Addr) -> Result<()> {
        self.inner
            .send_to(packet, SocketAddrV4::new(destination, 0))
            .await
            .map_err(Error::transport("send echo request"))?;
        Ok(())
    }
}

#[async_trait]
impl ReceivePath for IcmpSocket {
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
        let (len, source) = self.inner.recv_from(buf).await?;
        match source.ip() {
            IpAddr::V4(source) => Ok((len, source)),
            IpAddr::V6(source) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected IPv6 source {source} on an IPv4 socket"),
            )),
        }
    }
}

/// Probe transport over real sockets.
///
/// Echo requests go out on the ICMP socket handed to
/// [`with_echo_socket`](Self::with_echo_socket), normally a clone of the one
/// replies are read from. Every TTL probe gets its own UDP socket, closed again
/// before returning.
#[derive(Debug, Default)]
pub struct RawTransport {
    echo_socket: Option<IcmpSocket>,
}

impl RawTransport {
    /// Transport for TTL probes only; `send_echo` fails.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo_socket(socket: IcmpSocket) -> Self {
        Self {
            echo_socket: Some(socket),
        }
    }
}

#[async_trait]
impl ProbeTransport for RawTransport {
    async fn send_echo(
        &mut self,
        destination: Ipv4Addr,
        identity: ProbeIdentity,
        payload_size: usize,
    ) -> Result<Instant> {
        let socket = self.echo_socket.as_ref().ok_or_else(|| Error::Transport {
            action: "send echo request without an ICMP socket",
            source: io::ErrorKind::NotConnected.into(),
        })?;
        let packet = encode_echo_request(identity, unix_timestamp(), payload_size);
        let sent_at = Instant::now();
        socket.send_to(&packet, destination).await?;
        Ok(sent_at)
    }

    async fn send_ttl_probe(&mut self, ttl: u8, destination: Ipv4Addr) -> Result<Instant> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(Error::transport("open UDP probe socket"))?;
        socket
            .set_ttl(u32::from(ttl))
            .map_err(Error::transport("set probe TTL"))?;
        let sent_at = Instant::now();
        socket
            .send_to(&[], SocketAddrV4::new(destination, TRACEROUTE_PORT))
            .await
            .map_err(Error::transport("send TTL probe"))?;
        Ok(sent_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ttl_probe_to_loopback() {
        let mut transport = RawTransport::new();
        let before = Instant::now();
        let sent_at = transport
            .send_ttl_probe(1, Ipv4Addr::LOCALHOST)
            .await
            .unwrap();
        assert!(sent_at >= before);
        assert!(transport.echo_socket.is_none());
    }

    #[tokio::test]
    async fn test_echo_needs_socket() {
        let mut transport = RawTransport::new();
        let result = transport
            .send_echo(Ipv4Addr::LOCALHOST, ProbeIdentity::new(1, 1), 0)
            .await;
        assert!(matches!(
            result,
            Err(Error::Transport { source, .. }) if source.kind() == io::ErrorKind::NotConnected
        ));
    }
}
