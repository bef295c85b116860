use std::{io, net::Ipv4Addr, time::Duration};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::time::Instant;

use crate::{
    constants::{FAR_FUTURE, RECV_BUF_LEN},
    error::{Error, Result},
    packet::{decode_ipv4_and_icmp, DecodedPacket},
    probe::{ProbeIdentity, ProbeResult, ReplyKind},
};

/// Source of raw IPv4 datagrams carrying ICMP.
#[async_trait]
pub trait ReceivePath: Send {
    /// Waits for the next datagram, copies it into `buf` and returns its length
    /// and sender.
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)>;
}

/// `start + wait`, clamped to a far-future instant when the sum overflows.
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// A datagram accepted as the answer to the outstanding probe.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ProbeReply {
    pub identity: ProbeIdentity,
    pub received_at: Instant,
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub kind: ReplyKind,
}

impl ProbeReply {
    fn into_result(self, sent_at: Instant) -> ProbeResult {
        ProbeResult::answered(
            self.received_at.saturating_duration_since(sent_at),
            self.ttl,
            self.source,
            self.kind,
        )
    }
}

/// Matches datagrams from a [`ReceivePath`] against the single outstanding
/// probe.
///
/// Waits are bounded by an absolute deadline, `sent_at + timeout`. Datagrams
/// that are rejected are dropped without moving that deadline.
pub struct ReplyCorrelator<R> {
    path: R,
    buf: Vec<u8>,
}

impl<R: ReceivePath> ReplyCorrelator<R> {
    pub fn new(path: R) -> Self {
        Self {
            path,
            buf: vec![0; RECV_BUF_LEN],
        }
    }

    /// Waits for the echo reply carrying `expected`.
    ///
    /// Returns a timed-out result when nothing matches before the deadline.
    ///
    /// # Errors
    /// Returns an error only if reading from the receive path fails.
    pub async fn await_match(
        &mut self,
        expected: ProbeIdentity,
        sent_at: Instant,
        timeout: Duration,
    ) -> Result<ProbeResult> {
        let accept = |packet: &DecodedPacket| {
            packet.reply_kind() == Some(ReplyKind::EchoReply) && packet.identity == expected
        };
        let deadline = deadline_after(sent_at, timeout);
        match tokio::time::timeout_at(deadline, self.next_reply(accept)).await {
            Ok(reply) => {
                let reply = reply?;
                debug_assert_eq!(reply.identity, expected);
                Ok(reply.into_result(sent_at))
            }
            Err(_) => {
                debug!(
                    "no echo reply for id {} seq {} within {:?}",
                    expected.session_id, expected.sequence, timeout
                );
                Ok(ProbeResult::timed_out())
            }
        }
    }

    /// Waits for the first echo reply, time exceeded or destination
    /// unreachable message from any source.
    ///
    /// Nothing ties the reply to the probe except timing, so a foreign ICMP
    /// message of one of these kinds arriving within the window is accepted.
    ///
    /// # Errors
    /// Returns an error only if reading from the receive path fails.
    pub async fn await_any_reply(
        &mut self,
        sent_at: Instant,
        timeout: Duration,
    ) -> Result<ProbeResult> {
        let accept = |packet: &DecodedPacket| packet.reply_kind().is_some();
        let deadline = deadline_after(sent_at, timeout);
        match tokio::time::timeout_at(deadline, self.next_reply(accept)).await {
            Ok(reply) => Ok(reply?.into_result(sent_at)),
            Err(_) => Ok(ProbeResult::timed_out()),
        }
    }

    async fn next_reply<F>(&mut self, accept: F) -> Result<ProbeReply>
    where
        F: Fn(&DecodedPacket) -> bool,
    {
        loop {
            let (len, source) = self
                .path
                .recv_from(&mut self.buf)
                .await
                .map_err(Error::transport("receive ICMP datagram"))?;
            let received_at = Instant::now();

            let packet = match decode_ipv4_and_icmp(&self.buf[..len]) {
                Ok(packet) => packet,
                Err(err) => {
                    trace!("discarding datagram from {}: {}", source, err);
                    continue;
                }
            };
            let kind = match packet.reply_kind() {
                Some(kind) if accept(&packet) => kind,
                _ => {
                    trace!(
                        "discarding ICMP type {} from {} (id {} seq {})",
                        packet.icmp_type.0,
                        source,
                        packet.identity.session_id,
                        packet.identity.sequence
                    );
                    continue;
                }
            };

            return Ok(ProbeReply {
                identity: packet.identity,
                received_at,
                ttl: packet.ttl,
                source,
                kind,
            });
        }
    }
}
