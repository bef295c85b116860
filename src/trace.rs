use std::{net::Ipv4Addr, time::Duration};

use log::{debug, info, trace};
use tokio_util::sync::CancellationToken;

use crate::{
    constants::{DEFAULT_MAX_HOPS, DEFAULT_PROBES_PER_HOP, DEFAULT_TIMEOUT},
    error::{ConfigError, Result},
    probe::{ProbeIdentity, ProbeRequest, ProbeResult, SessionCounters},
    response::{ReceivePath, ReplyCorrelator},
    transport::{IcmpSocket, ProbeTransport, RawTransport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    pub first_ttl: u8,
    pub max_hops: u8,
    pub probes_per_hop: usize,
    /// How long each attempt waits for an answer.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TraceConfigBuilder {
    first_ttl: u8,
    max_hops: u8,
    probes_per_hop: usize,
    timeout: Duration,
}

impl Default for TraceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceConfigBuilder {
    pub fn new() -> Self {
        Self {
            first_ttl: 1,
            max_hops: DEFAULT_MAX_HOPS,
            probes_per_hop: DEFAULT_PROBES_PER_HOP,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_first_ttl(mut self, first_ttl: u8) -> Self {
        self.first_ttl = first_ttl;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_probes_per_hop(mut self, probes_per_hop: usize) -> Self {
        self.probes_per_hop = probes_per_hop;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> std::result::Result<TraceConfig, ConfigError> {
        if self.max_hops == 0 {
            return Err(ConfigError::ZeroMaxHops);
        }
        if self.first_ttl == 0 || self.first_ttl > self.max_hops {
            return Err(ConfigError::FirstTtlAboveMaxHops {
                first_ttl: self.first_ttl,
                max_hops: self.max_hops,
            });
        }
        if self.probes_per_hop == 0 {
            return Err(ConfigError::ZeroProbesPerHop);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(TraceConfig {
            first_ttl: self.first_ttl,
            max_hops: self.max_hops,
            probes_per_hop: self.probes_per_hop,
            timeout: self.timeout,
        })
    }
}

/// Attempts made with one TTL value.
///
/// The first address that answers becomes the hop's address; later answers
/// from other addresses are kept in `attempts` but do not replace it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct HopRecord {
    pub ttl: u8,
    pub attempts: Vec<ProbeResult>,
    pub responding_address: Option<Ipv4Addr>,
}

impl HopRecord {
    pub fn new(ttl: u8) -> Self {
        Self {
            ttl,
            attempts: Vec::new(),
            responding_address: None,
        }
    }

    pub fn record(&mut self, result: ProbeResult) {
        if self.responding_address.is_none() {
            self.responding_address = result.source;
        }
        self.attempts.push(result);
    }

    pub fn round_trip_times(&self) -> impl Iterator<Item = Duration> + '_ {
        self.attempts
            .iter()
            .filter_map(|attempt| attempt.round_trip_time)
    }

    pub fn unanswered(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.is_timeout())
            .count()
    }

    pub fn reached(&self, destination: Ipv4Addr) -> bool {
        self.responding_address == Some(destination)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TraceOutcome {
    DestinationReached,
    MaxHopsExceeded,
    Cancelled,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TraceSummary {
    pub destination: Ipv4Addr,
    pub hops: Vec<HopRecord>,
    pub counters: SessionCounters,
    /// Attempts that got no answer, over all hops, including one cut short
    /// by cancellation. Always `counters.sent - counters.received`.
    pub unanswered: u64,
    pub outcome: TraceOutcome,
}

/// TTL escalation sweep towards a single destination.
///
/// One attempt is outstanding at a time; replies are attributed by arrival
/// within the attempt's window, not by content.
pub struct Tracer<T, R> {
    config: TraceConfig,
    destination: Ipv4Addr,
    transport: T,
    correlator: ReplyCorrelator<R>,
    cancel: CancellationToken,
    counters: SessionCounters,
    unanswered: u64,
    next_identity: ProbeIdentity,
}

impl Tracer<RawTransport, IcmpSocket> {
    /// Opens the raw receive socket for a sweep towards `destination`.
    ///
    /// # Errors
    /// Returns an error if the raw socket cannot be opened, typically for lack
    /// of privileges.
    pub fn open(
        config: TraceConfig,
        destination: Ipv4Addr,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let receiver = IcmpSocket::open()?;
        Ok(Self::new(
            config,
            destination,
            RawTransport::new(),
            receiver,
            cancel,
        ))
    }
}

impl<T: ProbeTransport, R: ReceivePath> Tracer<T, R> {
    pub fn new(
        config: TraceConfig,
        destination: Ipv4Addr,
        transport: T,
        receiver: R,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            destination,
            transport,
            correlator: ReplyCorrelator::new(receiver),
            cancel,
            counters: SessionCounters::default(),
            unanswered: 0,
            next_identity: ProbeIdentity::new(ProbeIdentity::process_session_id(), 1),
        }
    }

    /// Sweeps TTLs until the destination answers, `max_hops` is passed or the
    /// cancellation token fires. `on_hop` receives each hop once all of its
    /// attempts are done.
    ///
    /// A hop interrupted by cancellation is still reported with the attempts
    /// it completed.
    ///
    /// # Errors
    /// Returns an error if a probe cannot be sent or the receive socket fails.
    pub async fn run<F>(mut self, mut on_hop: F) -> Result<TraceSummary>
    where
        F: FnMut(&HopRecord),
    {
        debug!(
            "tracing route to {}, {} hops max, {} probes per hop",
            self.destination, self.config.max_hops, self.config.probes_per_hop
        );
        let mut hops = Vec::new();
        let mut outcome = TraceOutcome::MaxHopsExceeded;

        for ttl in self.config.first_ttl..=self.config.max_hops {
            let (hop, cancelled) = self.probe_hop(ttl).await?;
            if cancelled && hop.attempts.is_empty() {
                outcome = TraceOutcome::Cancelled;
                break;
            }
            on_hop(&hop);
            let reached = hop.reached(self.destination);
            hops.push(hop);

            if cancelled {
                outcome = TraceOutcome::Cancelled;
                break;
            }
            if reached {
                outcome = TraceOutcome::DestinationReached;
                break;
            }
        }

        info!(
            "trace to {} finished ({:?}) after {} hops, {} probes unanswered",
            self.destination,
            outcome,
            hops.len(),
            self.unanswered
        );
        Ok(TraceSummary {
            destination: self.destination,
            hops,
            counters: self.counters,
            unanswered: self.unanswered,
            outcome,
        })
    }

    async fn probe_hop(&mut self, ttl: u8) -> Result<(HopRecord, bool)> {
        let mut hop = HopRecord::new(ttl);
        for _ in 0..self.config.probes_per_hop {
            if self.cancel.is_cancelled() {
                return Ok((hop, true));
            }
            let sent_at = self.transport.send_ttl_probe(ttl, self.destination).await?;
            self.counters.record_sent();
            // UDP probes carry no identity; the sequence only numbers attempts
            let request = ProbeRequest {
                identity: self.next_identity,
                sent_at,
                payload_size: 0,
                ttl: Some(ttl),
            };
            self.next_identity = self.next_identity.next();
            trace!("sent {:?} to {}", request, self.destination);

            let result = tokio::select! {
                result = self.correlator.await_any_reply(request.sent_at, self.config.timeout) => result?,
                _ = self.cancel.cancelled() => {
                    // sent but never answered; not part of the hop
                    self.unanswered += 1;
                    return Ok((hop, true));
                }
            };
            if result.is_timeout() {
                self.unanswered += 1;
            } else {
                self.counters.record_received();
            }
            hop.record(result);
        }
        Ok((hop, false))
    }
}
