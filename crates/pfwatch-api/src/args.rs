// Validated arguments for operator-triggered remote calls.
//
// Every value that ends up inside a PHP snippet or a shell command line is
// checked here first, so the client never has to trust caller strings.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const GATEWAY_NAME_MAX: usize = 32;

/// Name of a configured gateway (`WAN_DHCP`, `VPN1_VPNV4`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayName(String);

impl GatewayName {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() || name.len() > GATEWAY_NAME_MAX {
            return Err(Error::InvalidArgument {
                field: "gateway",
                reason: format!("length must be 1..={GATEWAY_NAME_MAX}, got {}", name.len()),
            });
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(Error::InvalidArgument {
                field: "gateway",
                reason: format!("unexpected character {bad:?}"),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GatewayName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GatewayName> for String {
    fn from(value: GatewayName) -> Self {
        value.0
    }
}

impl fmt::Display for GatewayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects firewall states to kill: all states from `source`, optionally
/// narrowed to those towards `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateFilter {
    pub source: IpAddr,
    pub destination: Option<IpAddr>,
}

impl StateFilter {
    pub fn host(source: IpAddr) -> Self {
        Self {
            source,
            destination: None,
        }
    }

    pub fn between(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source,
            destination: Some(destination),
        }
    }

    /// Parse `"src"` or `"src dst"` / `"src->dst"`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let normalized = raw.replace("->", " ");
        let mut parts = normalized.split_whitespace();
        let source = parse_ip(parts.next().unwrap_or_default())?;
        let destination = parts.next().map(parse_ip).transpose()?;
        if parts.next().is_some() {
            return Err(Error::InvalidArgument {
                field: "state filter",
                reason: format!("expected `source [destination]`, got {raw:?}"),
            });
        }
        Ok(Self {
            source,
            destination,
        })
    }

    /// `pfctl` arguments selecting the matching states.
    pub(crate) fn pfctl_args(&self) -> String {
        match self.destination {
            Some(dst) => format!("-k {} -k {dst}", self.source),
            None => format!("-k {}", self.source),
        }
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr, Error> {
    raw.parse().map_err(|_| Error::InvalidArgument {
        field: "state filter",
        reason: format!("{raw:?} is not an IP address"),
    })
}

/// A shell command line to run on the appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand(String);

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Result<Self, Error> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(Error::InvalidArgument {
                field: "command",
                reason: "must not be empty".into(),
            });
        }
        if command.contains('\0') {
            return Err(Error::InvalidArgument {
                field: "command",
                reason: "must not contain NUL bytes".into(),
            });
        }
        Ok(Self(command))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A PHP snippet evaluated on the appliance. It reports its result by
/// assigning `$toreturn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhpSnippet(String);

impl PhpSnippet {
    pub fn new(snippet: impl Into<String>) -> Result<Self, Error> {
        let snippet = snippet.into();
        if snippet.trim().is_empty() {
            return Err(Error::InvalidArgument {
                field: "php snippet",
                reason: "must not be empty".into(),
            });
        }
        Ok(Self(snippet))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Quote a string as a single-quoted PHP literal.
pub(crate) fn php_quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        if matches!(c, '\\' | '\'') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gateway_name_rejects_injection() {
        assert!(GatewayName::new("WAN_DHCP").is_ok());
        assert!(GatewayName::new("wan'; system('x')").is_err());
        assert!(GatewayName::new("").is_err());
        assert!(GatewayName::new("x".repeat(33)).is_err());
    }

    #[test]
    fn state_filter_parses_both_forms() {
        let f = StateFilter::parse("10.0.0.5").unwrap();
        assert_eq!(f.destination, None);
        assert_eq!(f.pfctl_args(), "-k 10.0.0.5");

        let f = StateFilter::parse("10.0.0.5->1.1.1.1").unwrap();
        assert_eq!(f.pfctl_args(), "-k 10.0.0.5 -k 1.1.1.1");

        assert!(StateFilter::parse("10.0.0.5 1.1.1.1 8.8.8.8").is_err());
        assert!(StateFilter::parse("not-an-ip").is_err());
        assert!(StateFilter::parse("").is_err());
    }

    #[test]
    fn php_quote_escapes_quotes_and_backslashes() {
        assert_eq!(php_quote(r"it's a \ test"), r"'it\'s a \\ test'");
    }

    #[test]
    fn empty_commands_are_rejected() {
        assert!(ShellCommand::new("   ").is_err());
        assert!(ShellCommand::new("a\0b").is_err());
        assert!(PhpSnippet::new("").is_err());
    }
}
