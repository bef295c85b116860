//! Packet fixtures and an in-memory network for driving the correlator and
//! the orchestrators on tokio's paused clock.

use std::{
    collections::VecDeque,
    io,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use pnet::packet::{
    icmp::{IcmpTypes, MutableIcmpPacket},
    ipv4::MutableIpv4Packet,
    ip::IpNextHeaderProtocols,
};
use tokio::{sync::Notify, time::Instant};

use crate::{
    checksum::checksum,
    constants::{IPV4_HEADER_LEN, TRACEROUTE_PORT},
    error::{Error, Result},
    probe::ProbeIdentity,
    response::ReceivePath,
    transport::ProbeTransport,
};

/// Wraps `icmp` in a minimal IPv4 header from `source`.
pub(crate) fn ipv4_datagram(source: Ipv4Addr, ttl: u8, icmp: &[u8]) -> Vec<u8> {
    let mut buf = vec![0; IPV4_HEADER_LEN + icmp.len()];
    let total_len = buf.len() as u16;
    let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length(total_len);
    ip.set_ttl(ttl);
    ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    ip.set_source(source);
    ip.set_destination(Ipv4Addr::new(192, 0, 2, 100));
    buf[IPV4_HEADER_LEN..].copy_from_slice(icmp);
    buf
}

pub(crate) fn echo_reply(identity: ProbeIdentity, timestamp: f64, payload_size: usize) -> Vec<u8> {
    let mut icmp = vec![0; 16 + payload_size];
    icmp[4..6].copy_from_slice(&identity.session_id.to_be_bytes());
    icmp[6..8].copy_from_slice(&identity.sequence.to_be_bytes());
    icmp[8..16].copy_from_slice(&timestamp.to_be_bytes());
    finish_icmp(icmp, IcmpTypes::EchoReply.0, 0)
}

/// Time exceeded quoting a UDP probe sent towards `probed`.
pub(crate) fn time_exceeded(probed: Ipv4Addr) -> Vec<u8> {
    quoting_error(IcmpTypes::TimeExceeded.0, 0, probed)
}

/// Port unreachable quoting a UDP probe sent towards `probed`.
pub(crate) fn port_unreachable(probed: Ipv4Addr) -> Vec<u8> {
    quoting_error(IcmpTypes::DestinationUnreachable.0, 3, probed)
}

fn quoting_error(icmp_type: u8, code: u8, probed: Ipv4Addr) -> Vec<u8> {
    let mut udp = [0u8; 8];
    udp[0..2].copy_from_slice(&40000u16.to_be_bytes());
    udp[2..4].copy_from_slice(&TRACEROUTE_PORT.to_be_bytes());
    udp[4..6].copy_from_slice(&8u16.to_be_bytes());

    let mut quoted = ipv4_datagram(Ipv4Addr::new(192, 0, 2, 100), 1, &udp);
    quoted[9] = 17;
    quoted[16..20].copy_from_slice(&probed.octets());

    let mut icmp = vec![0; 8];
    icmp.extend_from_slice(&quoted);
    finish_icmp(icmp, icmp_type, code)
}

fn finish_icmp(mut icmp: Vec<u8>, icmp_type: u8, code: u8) -> Vec<u8> {
    icmp[0] = icmp_type;
    icmp[1] = code;
    let sum = checksum(&icmp);
    MutableIcmpPacket::new(&mut icmp).unwrap().set_checksum(sum);
    icmp
}

struct Datagram {
    deliver_at: Instant,
    source: Ipv4Addr,
    bytes: Vec<u8>,
}

/// Shared medium between [`SimulatedNetwork`] and [`ScriptedReceiver`].
///
/// Datagrams stay queued until read, so a reply that arrives after its probe
/// timed out is still seen by the next wait.
#[derive(Clone, Default)]
pub(crate) struct Wire {
    queue: Arc<Mutex<VecDeque<Datagram>>>,
    notify: Arc<Notify>,
}

impl Wire {
    pub(crate) fn deliver(&self, delay: Duration, source: Ipv4Addr, bytes: Vec<u8>) {
        let deliver_at = Instant::now() + delay;
        let mut queue = self.queue.lock().unwrap();
        let position = queue.partition_point(|queued| queued.deliver_at <= deliver_at);
        queue.insert(
            position,
            Datagram {
                deliver_at,
                source,
                bytes,
            },
        );
        drop(queue);
        self.notify.notify_one();
    }

    fn next_delivery(&self) -> Option<Instant> {
        self.queue
            .lock()
            .unwrap()
            .front()
            .map(|datagram| datagram.deliver_at)
    }

    fn pop_due(&self, now: Instant) -> Option<Datagram> {
        let mut queue = self.queue.lock().unwrap();
        match queue.front() {
            Some(datagram) if datagram.deliver_at <= now => queue.pop_front(),
            _ => None,
        }
    }
}

pub(crate) struct ScriptedReceiver {
    wire: Wire,
}

impl ScriptedReceiver {
    pub(crate) fn new(wire: Wire) -> Self {
        Self { wire }
    }
}

#[async_trait]
impl ReceivePath for ScriptedReceiver {
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
        loop {
            if let Some(datagram) = self.wire.pop_due(Instant::now()) {
                let len = datagram.bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram.bytes[..len]);
                return Ok((len, datagram.source));
            }
            match self.wire.next_delivery() {
                Some(deliver_at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deliver_at) => {}
                        _ = self.wire.notify.notified() => {}
                    }
                }
                None => self.wire.notify.notified().await,
            }
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum SentProbe {
    Echo(ProbeIdentity),
    Ttl(u8),
}

/// What the simulated network answers to a probe: `(delay, source, datagram)`.
pub(crate) type Response = (Duration, Ipv4Addr, Vec<u8>);

type Responder = Box<dyn FnMut(SentProbe) -> Vec<Response> + Send>;

/// Transport that never touches a socket; answers come from a responder
/// closure and are put on the [`Wire`].
pub(crate) struct SimulatedNetwork {
    wire: Wire,
    responder: Responder,
    sent: Arc<Mutex<Vec<SentProbe>>>,
    fail_after: Option<usize>,
}

impl SimulatedNetwork {
    pub(crate) fn new<F>(wire: Wire, responder: F) -> Self
    where
        F: FnMut(SentProbe) -> Vec<Response> + Send + 'static,
    {
        Self {
            wire,
            responder: Box::new(responder),
            sent: Arc::default(),
            fail_after: None,
        }
    }

    /// Sends fail with a transport error once `probes` have gone out.
    pub(crate) fn failing_after(mut self, probes: usize) -> Self {
        self.fail_after = Some(probes);
        self
    }

    /// Handle on the probes sent so far, usable after the network moved into
    /// an orchestrator.
    pub(crate) fn sent_log(&self) -> Arc<Mutex<Vec<SentProbe>>> {
        Arc::clone(&self.sent)
    }

    fn send(&mut self, probe: SentProbe) -> Result<Instant> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
            return Err(Error::Transport {
                action: "send probe",
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        sent.push(probe);
        drop(sent);

        for (delay, source, bytes) in (self.responder)(probe) {
            self.wire.deliver(delay, source, bytes);
        }
        Ok(Instant::now())
    }
}

#[async_trait]
impl ProbeTransport for SimulatedNetwork {
    async fn send_echo(
        &mut self,
        _destination: Ipv4Addr,
        identity: ProbeIdentity,
        _payload_size: usize,
    ) -> Result<Instant> {
        self.send(SentProbe::Echo(identity))
    }

    async fn send_ttl_probe(&mut self, ttl: u8, _destination: Ipv4Addr) -> Result<Instant> {
        self.send(SentProbe::Ttl(ttl))
    }
}
