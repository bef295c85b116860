use std::{net::Ipv4Addr, time::Duration};

use tokio::time::Instant;

/// Pair of fields that ties an echo reply to the echo request that caused it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProbeIdentity {
    pub session_id: u16,
    pub sequence: u16,
}

impl ProbeIdentity {
    pub fn new(session_id: u16, sequence: u16) -> Self {
        Self {
            session_id,
            sequence,
        }
    }

    /// Session identifier for this process: the pid masked to 16 bits.
    pub fn process_session_id() -> u16 {
        (std::process::id() & 0xFFFF) as u16
    }

    pub fn next(self) -> Self {
        Self {
            session_id: self.session_id,
            sequence: self.sequence.wrapping_add(1),
        }
    }
}

/// A probe that has just been handed to the transport.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ProbeRequest {
    pub identity: ProbeIdentity,
    pub sent_at: Instant,
    pub payload_size: usize,
    pub ttl: Option<u8>,
}

/// ICMP message kinds the correlator accepts as an answer.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ReplyKind {
    EchoReply,
    TimeExceeded,
    DestinationUnreachable,
}

/// Outcome of a single probe. Every field is `None` when the probe timed out.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ProbeResult {
    pub round_trip_time: Option<Duration>,
    pub ttl: Option<u8>,
    pub source: Option<Ipv4Addr>,
    pub kind: Option<ReplyKind>,
}

impl ProbeResult {
    pub fn timed_out() -> Self {
        Self::default()
    }

    pub fn answered(
        round_trip_time: Duration,
        ttl: u8,
        source: Ipv4Addr,
        kind: ReplyKind,
    ) -> Self {
        Self {
            round_trip_time: Some(round_trip_time),
            ttl: Some(ttl),
            source: Some(source),
            kind: Some(kind),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.round_trip_time.is_none()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SessionCounters {
    pub sent: u64,
    pub received: u64,
}

impl SessionCounters {
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn lost(&self) -> u64 {
        self.sent.saturating_sub(self.received)
    }

    /// Share of unanswered probes in percent, `0.0` before anything was sent.
    pub fn loss_percentage(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        self.lost() as f64 / self.sent as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_percentage() {
        let counters = SessionCounters {
            sent: 10,
            received: 7,
        };
        assert_eq!(counters.lost(), 3);
        assert_eq!(format!("{:.2}", counters.loss_percentage()), "30.00");
    }

    #[test]
    fn test_loss_percentage_nothing_sent() {
        assert_eq!(SessionCounters::default().loss_percentage(), 0.0);
    }

    #[test]
    fn test_loss_percentage_all_answered() {
        let mut counters = SessionCounters::default();
        for _ in 0..4 {
            counters.record_sent();
            counters.record_received();
        }
        assert_eq!(counters.loss_percentage(), 0.0);
    }

    #[test]
    fn test_sequence_wraps() {
        let identity = ProbeIdentity::new(7, u16::MAX).next();
        assert_eq!(identity, ProbeIdentity::new(7, 0));
    }

    #[test]
    fn test_timed_out_result_is_empty() {
        let result = ProbeResult::timed_out();
        assert!(result.is_timeout());
        assert_eq!(result.ttl, None);
        assert_eq!(result.source, None);
        assert_eq!(result.kind, None);
    }
}
