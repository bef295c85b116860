use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A socket could not be opened or written to. Fatal for the run.
    #[error("failed to {action}, reason: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// A received datagram could not be decoded. The correlator absorbs it.
    #[error("malformed packet: {reason} ({len} bytes)")]
    MalformedPacket { reason: &'static str, len: usize },
    #[error("failed to resolve {host}, reason: {reason}")]
    Resolution { host: String, reason: String },
}

impl Error {
    pub(crate) fn transport(action: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::Transport { action, source }
    }

    pub(crate) fn malformed(reason: &'static str, len: usize) -> Self {
        Error::MalformedPacket { reason, len }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(ThisError, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("reply timeout must be greater than zero")]
    ZeroTimeout,
    #[error("payload of {0} bytes does not fit in an IPv4 datagram")]
    PayloadTooLarge(usize),
    #[error("at least one probe per hop is required")]
    ZeroProbesPerHop,
    #[error("max hops must be at least 1")]
    ZeroMaxHops,
    #[error("first ttl {first_ttl} exceeds max hops {max_hops}")]
    FirstTtlAboveMaxHops { first_ttl: u8, max_hops: u8 },
}
