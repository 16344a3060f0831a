use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A `host:port` pair as the engine reports it. The port stays textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Split an address on its last `:` so bracketed IPv6 hosts keep their colons.
pub fn parse_address(s: &str) -> Result<Endpoint> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| BridgeError::InvalidAddress(s.to_string()))?;
    Ok(Endpoint {
        host: host.to_string(),
        port: port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_ipv4_pair() {
        let ep = parse_address("10.0.0.2:51234").expect("parse");
        assert_eq!(ep.host, "10.0.0.2");
        assert_eq!(ep.port, "51234");
    }

    #[test]
    fn bracketed_ipv6_keeps_inner_colons() {
        let ep = parse_address("[2001:db8::1]:443").expect("parse");
        assert_eq!(ep.host, "[2001:db8::1]");
        assert_eq!(ep.port, "443");
    }

    #[test]
    fn missing_separator_is_rejected() {
        let err = parse_address("example.com").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAddress(ref s) if s == "example.com"));
    }

    #[test]
    fn empty_port_is_kept_verbatim() {
        let ep = parse_address("host:").expect("parse");
        assert_eq!(ep.host, "host");
        assert_eq!(ep.port, "");
    }

    proptest! {
        #[test]
        fn host_and_port_round_trip(host in "[a-z0-9.:\\[\\]-]{0,24}", port in "[0-9]{0,5}") {
            let raw = format!("{host}:{port}");
            let ep = parse_address(&raw).expect("valid address");
            prop_assert_eq!(&ep.host, &host);
            prop_assert_eq!(&ep.port, &port);
            prop_assert_eq!(ep.to_string(), raw);
        }

        #[test]
        fn strings_without_colon_fail(raw in "[^:]{0,32}") {
            prop_assert!(matches!(parse_address(&raw), Err(BridgeError::InvalidAddress(_))));
        }
    }
}
