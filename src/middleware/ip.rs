//! Client identity resolution for rate limiting.
//!
//! # Resolution Order
//!
//! 1. First entry of `X-Forwarded-For` (trimmed, non-empty)
//! 2. Socket peer IP from axum's `ConnectInfo<SocketAddr>`
//! 3. [`UNKNOWN_IP`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! `X-Forwarded-For` is client-controlled unless an edge proxy overwrites it.
//! Configure `TRUSTED_PROXIES` with the CIDR ranges of your edge so the
//! header is only honoured when the TCP peer is one of them:
//!
//! ```text
//! TRUSTED_PROXIES=10.0.0.0/8,172.16.0.0/12
//! ```
//!
//! With an empty list every peer is trusted. That matches platforms where the
//! process is only reachable through the provider's edge.
//!
//! ## The "unknown" Fallback
//!
//! Requests with neither a usable header nor a socket peer share the
//! `"unknown"` key and are rate limited collectively.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Header carrying the original client address behind a proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Fallback key when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range (e.g. `10.0.0.0/8`, `::1/128`, or a bare IP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation. A bare address means a single-host range.
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an address falls inside this range. Families never match
    /// each other.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                same_prefix(u32::from(net).into(), u32::from(*addr).into(), 32, self.prefix_len)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                same_prefix(u128::from(net), u128::from(*addr), 128, self.prefix_len)
            }
            _ => false,
        }
    }
}

/// Compare the top `prefix_len` bits of two `width`-bit addresses.
fn same_prefix(a: u128, b: u128, width: u32, prefix_len: u8) -> bool {
    let prefix_len = u32::from(prefix_len);
    if prefix_len == 0 {
        return true;
    }
    let shift = width - prefix_len;
    (a >> shift) == (b >> shift)
}

/// Set of networks allowed to set `X-Forwarded-For`.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// `true` if `peer` may vouch for a forwarded address. Everything is
    /// trusted when no ranges are configured.
    pub fn is_trusted(&self, peer: &IpAddr) -> bool {
        !self.is_enabled() || self.ranges.iter().any(|range| range.contains(peer))
    }
}

// =============================================================================
// Identity Extraction
// =============================================================================

fn forwarded_for<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
}

fn socket_peer<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Resolve the rate-limit key for a request.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` for the fallback so the common
/// no-information case does not allocate.
pub fn client_identity<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = socket_peer(req);

    if let Some(forwarded) = forwarded_for(req) {
        match peer {
            Some(peer) if !trusted.is_trusted(&peer) => {
                debug!(
                    peer = %peer,
                    forwarded = %forwarded,
                    "Ignoring X-Forwarded-For from untrusted peer"
                );
            }
            _ => return Cow::Owned(forwarded.to_string()),
        }
    }

    match peer {
        Some(peer) => Cow::Owned(peer.to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}
