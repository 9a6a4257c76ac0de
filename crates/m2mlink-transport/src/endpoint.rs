use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// URI-style prefix accepted (and stripped) in front of an endpoint.
const SOCKET_SCHEME: &str = "socket://";

/// A candidate server address in `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a single `host:port` string.
    ///
    /// IPv6 literals must be bracketed (`[::1]:7000`). A leading `socket://`
    /// is accepted for compatibility with modem-style connection strings.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix(SOCKET_SCHEME).unwrap_or(trimmed);

        let (host, port) = body
            .rsplit_once(':')
            .ok_or_else(|| invalid(input, "missing ':port'"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid(input, "empty host"));
        }
        if host.contains(':') && !body.starts_with('[') {
            return Err(invalid(input, "IPv6 hosts must be bracketed"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| invalid(input, "port is not a number in 1..=65535"))?;
        if port == 0 {
            return Err(invalid(input, "port must be non-zero"));
        }

        Ok(Self::new(host, port))
    }

    /// Parse a comma-separated endpoint list, preserving order.
    ///
    /// Empty entries are skipped; an input with no entries at all is an error.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        let endpoints = input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;

        if endpoints.is_empty() {
            return Err(invalid(input, "no endpoints listed"));
        }
        Ok(endpoints)
    }

    /// Host name or address literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(input: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let ep = Endpoint::parse("m2m.example.net:3010").unwrap();
        assert_eq!(ep.host(), "m2m.example.net");
        assert_eq!(ep.port(), 3010);
        assert_eq!(ep.to_string(), "m2m.example.net:3010");
    }

    #[test]
    fn strips_socket_scheme() {
        let ep = Endpoint::parse("socket://10.0.0.1:80").unwrap();
        assert_eq!(ep, Endpoint::new("10.0.0.1", 80));
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep = Endpoint::parse("[::1]:7000").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.to_string(), "[::1]:7000");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Endpoint::parse("no-port").is_err());
        assert!(Endpoint::parse(":80").is_err());
        assert!(Endpoint::parse("host:0").is_err());
        assert!(Endpoint::parse("host:99999").is_err());
        assert!(Endpoint::parse("::1:80").is_err());
    }

    #[test]
    fn parse_list_keeps_order_and_skips_blanks() {
        let list = Endpoint::parse_list("a:1, b:2,,c:3 ").unwrap();
        let rendered: Vec<String> = list.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn parse_list_requires_an_entry() {
        assert!(matches!(
            Endpoint::parse_list(" , "),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }
}
