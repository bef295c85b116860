use std::time::Duration;

pub(crate) const IPV4_HEADER_LEN: usize = 20;
pub(crate) const ICMP_HEADER_LEN: usize = 8;
pub(crate) const TIMESTAMP_LEN: usize = 8;
pub(crate) const ECHO_HEADER_LEN: usize = ICMP_HEADER_LEN + TIMESTAMP_LEN;
pub(crate) const MIN_REPLY_LEN: usize = IPV4_HEADER_LEN + ECHO_HEADER_LEN;

// 65535 minus the IPv4 header and the echo header
pub(crate) const MAX_PAYLOAD_LEN: usize = 65_535 - IPV4_HEADER_LEN - ECHO_HEADER_LEN;
pub(crate) const RECV_BUF_LEN: usize = 65_536;

pub(crate) const TRACEROUTE_PORT: u16 = 33434;

pub(crate) const DEFAULT_PAYLOAD_LEN: usize = 56;
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_MAX_HOPS: u8 = 30;
pub(crate) const DEFAULT_PROBES_PER_HOP: usize = 3;

// where unbounded waits end up, about 30 years out
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
