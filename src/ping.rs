use std::{net::Ipv4Addr, time::Duration};

use log::{debug, info};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    constants::{DEFAULT_INTERVAL, DEFAULT_PAYLOAD_LEN, DEFAULT_TIMEOUT, MAX_PAYLOAD_LEN},
    error::{ConfigError, Result},
    probe::{ProbeIdentity, ProbeRequest, ProbeResult, SessionCounters},
    response::{deadline_after, ReceivePath, ReplyCorrelator},
    transport::{IcmpSocket, ProbeTransport, RawTransport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    /// Stop after this many echo requests; `None` pings until stopped.
    pub count: Option<u64>,
    /// Pause between receiving an answer (or giving up) and the next request.
    pub interval: Duration,
    /// How long to wait for each echo reply.
    pub timeout: Duration,
    /// Filler bytes after the 8-byte timestamp.
    pub payload_size: usize,
    /// Overall run time after which pinging stops regardless of `count`.
    pub deadline: Option<Duration>,
    pub session_id: u16,
}

#[derive(Debug, Clone)]
pub struct PingConfigBuilder {
    count: Option<u64>,
    interval: Duration,
    timeout: Duration,
    payload_size: usize,
    deadline: Option<Duration>,
    session_id: Option<u16>,
}

impl Default for PingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PingConfigBuilder {
    pub fn new() -> Self {
        Self {
            count: None,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            payload_size: DEFAULT_PAYLOAD_LEN,
            deadline: None,
            session_id: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Overrides the identifier derived from the process id.
    pub fn with_session_id(mut self, session_id: u16) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn build(self) -> std::result::Result<PingConfig, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.payload_size > MAX_PAYLOAD_LEN {
            return Err(ConfigError::PayloadTooLarge(self.payload_size));
        }
        Ok(PingConfig {
            count: self.count,
            interval: self.interval,
            timeout: self.timeout,
            payload_size: self.payload_size,
            deadline: self.deadline,
            session_id: self
                .session_id
                .unwrap_or_else(ProbeIdentity::process_session_id),
        })
    }
}

/// One echo request and what became of it, handed to presentation as soon as
/// the wait for it ends.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct EchoReport {
    pub identity: ProbeIdentity,
    pub payload_size: usize,
    pub result: ProbeResult,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum StopReason {
    CountReached,
    DeadlineElapsed,
    Cancelled,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PingStatistics {
    pub destination: Ipv4Addr,
    pub counters: SessionCounters,
    /// Round-trip times of answered requests, in send order.
    pub round_trip_times: Vec<Duration>,
    pub stop_reason: StopReason,
}

impl PingStatistics {
    pub fn loss_percentage(&self) -> f64 {
        self.counters.loss_percentage()
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.round_trip_times.iter().min().copied()
    }

    pub fn max_rtt(&self) -> Option<Duration> {
        self.round_trip_times.iter().max().copied()
    }

    pub fn average_rtt(&self) -> Option<Duration> {
        let answered = u32::try_from(self.round_trip_times.len()).ok()?;
        if answered == 0 {
            return None;
        }
        Some(self.round_trip_times.iter().sum::<Duration>() / answered)
    }
}

/// Repeating echo loop against a single destination.
///
/// Exactly one request is outstanding at a time. Counters and round-trip
/// samples belong to this instance, so several pingers can run side by side
/// in one process.
pub struct Pinger<T, R> {
    config: PingConfig,
    destination: Ipv4Addr,
    transport: T,
    correlator: ReplyCorrelator<R>,
    cancel: CancellationToken,
    counters: SessionCounters,
    round_trip_times: Vec<Duration>,
    next_identity: ProbeIdentity,
}

impl Pinger<RawTransport, IcmpSocket> {
    /// Opens the raw receive socket for a run against `destination`.
    ///
    /// # Errors
    /// Returns an error if the raw socket cannot be opened, typically for lack
    /// of privileges.
    ///
    /// # Example
    /// ```no_run
    /// use async_icmp_probe::{PingConfigBuilder, Pinger};
    /// use std::net::Ipv4Addr;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// tokio_test::block_on(async {
    ///     let config = PingConfigBuilder::new().with_count(4).build().unwrap();
    ///     let pinger =
    ///         Pinger::open(config, Ipv4Addr::new(192, 0, 2, 1), CancellationToken::new()).unwrap();
    ///     let stats = pinger.run(|report| println!("{:?}", report)).await.unwrap();
    ///     println!("{:.2}% loss", stats.loss_percentage());
    /// })
    /// ```
    pub fn open(
        config: PingConfig,
        destination: Ipv4Addr,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let socket = IcmpSocket::open()?;
        Ok(Self::new(
            config,
            destination,
            RawTransport::with_echo_socket(socket.clone()),
            socket,
            cancel,
        ))
    }
}

impl<T: ProbeTransport, R: ReceivePath> Pinger<T, R> {
    pub fn new(
        config: PingConfig,
        destination: Ipv4Addr,
        transport: T,
        receiver: R,
        cancel: CancellationToken,
    ) -> Self {
        let next_identity = ProbeIdentity::new(config.session_id, 1);
        Self {
            config,
            destination,
            transport,
            correlator: ReplyCorrelator::new(receiver),
            cancel,
            counters: SessionCounters::default(),
            round_trip_times: Vec::new(),
            next_identity,
        }
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// Pings until the count is reached, the run deadline passes or the
    /// cancellation token fires, calling `on_report` after every request.
    ///
    /// Statistics gathered so far are returned for all three stop reasons.
    ///
    /// # Errors
    /// Returns an error if a request cannot be sent or the receive socket
    /// fails. The run is aborted in that case.
    pub async fn run<F>(mut self, mut on_report: F) -> Result<PingStatistics>
    where
        F: FnMut(&EchoReport),
    {
        let run_deadline = self
            .config
            .deadline
            .map(|deadline| deadline_after(Instant::now(), deadline));
        debug!(
            "pinging {} with id {} and {} bytes of payload",
            self.destination, self.config.session_id, self.config.payload_size
        );

        let stop_reason = loop {
            if self.count_reached() {
                break StopReason::CountReached;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if run_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::DeadlineElapsed;
            }

            let identity = self.next_identity;
            let sent_at = self
                .transport
                .send_echo(self.destination, identity, self.config.payload_size)
                .await?;
            self.counters.record_sent();
            let request = ProbeRequest {
                identity,
                sent_at,
                payload_size: self.config.payload_size,
                ttl: None,
            };

            let result = tokio::select! {
                result = self.correlator.await_match(request.identity, request.sent_at, self.config.timeout) => result?,
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                _ = wait_for(run_deadline) => break StopReason::DeadlineElapsed,
            };
            self.record(request, result, &mut on_report);
            self.next_identity = identity.next();

            if self.count_reached() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                _ = wait_for(run_deadline) => break StopReason::DeadlineElapsed,
            }
        };

        info!(
            "ping {} stopped ({:?}): {} sent, {} received",
            self.destination, stop_reason, self.counters.sent, self.counters.received
        );
        Ok(PingStatistics {
            destination: self.destination,
            counters: self.counters,
            round_trip_times: self.round_trip_times,
            stop_reason,
        })
    }

    fn count_reached(&self) -> bool {
        self.config
            .count
            .is_some_and(|count| self.counters.sent >= count)
    }

    fn record<F>(&mut self, request: ProbeRequest, result: ProbeResult, on_report: &mut F)
    where
        F: FnMut(&EchoReport),
    {
        match result.round_trip_time {
            Some(rtt) => {
                self.counters.record_received();
                self.round_trip_times.push(rtt);
            }
            None => debug!(
                "echo request seq {} to {} timed out",
                request.identity.sequence, self.destination
            ),
        }
        on_report(&EchoReport {
            identity: request.identity,
            payload_size: request.payload_size,
            result,
        });
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
