use std::net::{Ipv4Addr, SocketAddr};

use log::debug;

use crate::error::{Error, Result};

/// Resolves `host` to its first IPv4 address. Literal addresses are returned
/// without a lookup.
///
/// # Errors
/// Returns [`Error::Resolution`] if the lookup fails or yields no IPv4
/// address.
pub async fn resolve_ipv4(host: &str) -> Result<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|err| Error::Resolution {
            host: host.into(),
            reason: err.to_string(),
        })?;
    let addr = addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(addr) => Some(*addr.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| Error::Resolution {
            host: host.into(),
            reason: "no IPv4 address".into(),
        })?;
    debug!("resolved {} to {}", host, addr);
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_literal_address() {
        assert_eq!(
            resolve_ipv4("192.0.2.33").await.unwrap(),
            Ipv4Addr::new(192, 0, 2, 33)
        );
    }

    #[tokio::test]
    async fn test_ipv6_literal_is_rejected() {
        let err = resolve_ipv4("::1").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref host, .. } if host == "::1"));
    }

    #[tokio::test]
    async fn test_unknown_host() {
        assert!(matches!(
            resolve_ipv4("no-such-host.invalid").await,
            Err(Error::Resolution { .. })
        ));
    }
}
