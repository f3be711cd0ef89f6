//! Connectivity signal consumed before any oracle call.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// For on-device oracles that never need the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Flag driven by the host application (e.g. an OS network listener).
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Online when the API host answers at the TCP level within the timeout.
///
/// A refused or reset connection still proves a network path to the host, so
/// it reads as online; whether the server is actually serving is left to the
/// oracle's health probe. Unresolvable names, unreachable networks and silence
/// read as offline.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    address: String,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// Derive `host:port` from an `http(s)://host[:port]/...` URL.
    pub fn for_url(url: &str, timeout: Duration) -> Option<Self> {
        let (scheme, rest) = url.trim().split_once("://")?;
        let authority = rest.split(['/', '?', '#']).next()?;
        let authority = authority.rsplit('@').next()?;
        if authority.is_empty() {
            return None;
        }

        let has_port = match authority.rsplit_once(':') {
            Some((_, port)) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
            None => false,
        };
        let address = if has_port {
            authority.to_string()
        } else {
            let port = match scheme.to_ascii_lowercase().as_str() {
                "https" => 443,
                _ => 80,
            };
            format!("{}:{}", authority, port)
        };

        Some(Self::new(address, timeout))
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectivityProbe for TcpReachability {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) if answered_by_host(&e) => {
                debug!("{} answered but is not accepting: {}", self.address, e);
                true
            }
            Ok(Err(e)) => {
                debug!("{} unreachable: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("{} did not answer within {:?}", self.address, self.timeout);
                false
            }
        }
    }
}

fn answered_by_host(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}
