//! Endpoint descriptors and candidate ordering for the transport selector.

use std::fmt;

use serde::{Deserialize, Serialize};

/// WebSocket scheme of a candidate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS (the device presents a self-signed certificate).
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// Address-independent half of an endpoint: which scheme on which port.
///
/// A list of templates (most capable first) is combined with the target
/// device address to produce the concrete candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTemplate {
    pub scheme: Scheme,
    pub port: u16,
}

impl EndpointTemplate {
    pub const fn new(scheme: Scheme, port: u16) -> Self {
        Self { scheme, port }
    }

    /// The default candidate order: secure port first, then the legacy
    /// plain port.
    pub fn defaults() -> Vec<EndpointTemplate> {
        vec![
            EndpointTemplate::new(Scheme::Wss, 3001),
            EndpointTemplate::new(Scheme::Ws, 3000),
        ]
    }
}

/// A concrete connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Returns the WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bare IPv6 literals need brackets inside a URL authority.
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "{}://[{}]:{}", self.scheme.as_str(), self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
        }
    }
}

/// Expands `templates` against `address`, preserving template order and
/// dropping exact duplicates.
pub fn candidates(address: &str, templates: &[EndpointTemplate]) -> Vec<Endpoint> {
    let host = address.trim();
    let mut out: Vec<Endpoint> = Vec::with_capacity(templates.len());
    for t in templates {
        let ep = Endpoint {
            scheme: t.scheme,
            host: host.to_string(),
            port: t.port,
        };
        if !out.contains(&ep) {
            out.push(ep);
        }
    }
    out
}
