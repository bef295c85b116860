//! ## Example
//! Following example pings a host until interrupted (or until `-c` requests were sent) and prints
//! a short summary. Raw ICMP sockets need root or `CAP_NET_RAW`.
//! ```no_run
#![doc = include_str!("../demos/ping.rs")]
//! ```
//! A TTL sweep towards a host works the same way through [`trace::Tracer`], see `demos/traceroute.rs`.

pub mod checksum;
pub mod error;
pub mod packet;
pub mod ping;
pub mod probe;
pub mod resolve;
pub mod response;
pub mod trace;
pub mod transport;

pub(crate) mod constants;
#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{ConfigError, Error, Result};
pub use ping::{EchoReport, PingConfig, PingConfigBuilder, PingStatistics, Pinger, StopReason};
pub use probe::{ProbeIdentity, ProbeResult, ReplyKind, SessionCounters};
pub use resolve::resolve_ipv4;
pub use trace::{HopRecord, TraceConfig, TraceConfigBuilder, TraceOutcome, TraceSummary, Tracer};
