//! Client identity extraction.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;

use crate::config::IdentityMode;
use crate::session::ClientIdentity;

/// Shared key for requests whose source cannot be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

pub type IdentityFn = Arc<dyn Fn(&Request<Body>) -> Option<ClientIdentity> + Send + Sync>;

/// Where the admission layer takes a request's client identity from.
#[derive(Clone, Default)]
pub enum IdentitySource {
    /// Peer IP from axum's `ConnectInfo<SocketAddr>`.
    #[default]
    PeerIp,
    /// Peer `ip:port`; each connection is its own client.
    PeerSocket,
    Custom(IdentityFn),
}

impl IdentitySource {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Request<Body>) -> Option<ClientIdentity> + Send + Sync + 'static,
    {
        IdentitySource::Custom(Arc::new(f))
    }

    pub fn resolve(&self, req: &Request<Body>) -> ClientIdentity {
        let identity = match self {
            IdentitySource::PeerIp => peer_addr(req).map(|addr| addr.ip().to_string()),
            IdentitySource::PeerSocket => peer_addr(req).map(|addr| addr.to_string()),
            IdentitySource::Custom(f) => f(req),
        };
        identity.unwrap_or_else(|| UNKNOWN_IDENTITY.to_owned())
    }
}

fn peer_addr(req: &Request<Body>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

impl From<IdentityMode> for IdentitySource {
    fn from(mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::Ip => IdentitySource::PeerIp,
            IdentityMode::Socket => IdentitySource::PeerSocket,
        }
    }
}

impl fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::PeerIp => f.write_str("PeerIp"),
            IdentitySource::PeerSocket => f.write_str("PeerSocket"),
            IdentitySource::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
