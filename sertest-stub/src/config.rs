//! YAML connection table for the stub daemon.
//!
//! ```yaml
//! connections:
//!   - name: echo
//!     accepter: tcp,127.0.0.1,3023
//!     peer: stdio
//!   - accepter: tcp,127.0.0.1,3024
//!     peer: tcp,127.0.0.1,3025
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use sertest_io::IoSpec;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    connections: Vec<RawConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnection {
    name: Option<String>,
    accepter: String,
    peer: String,
}

/// Host/port pair a listener binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp,{},{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// Bridge clients to the daemon's own stdin/stdout.
    Stdio,
    /// Second accepter; its client is spliced to the first accepter's client.
    Tcp(ListenAddr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub accepter: ListenAddr,
    pub peer: Peer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubConfig {
    pub connections: Vec<Connection>,
}

impl StubConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        // An empty document is an empty table.
        let raw: RawConfig = if text.trim().is_empty() {
            RawConfig {
                connections: Vec::new(),
            }
        } else {
            serde_yaml::from_str(text).context("parse YAML")?
        };

        let mut connections = Vec::with_capacity(raw.connections.len());
        for (index, conn) in raw.connections.into_iter().enumerate() {
            let name = conn.name.unwrap_or_else(|| format!("connection{index}"));
            let accepter =
                listen_addr(&conn.accepter).with_context(|| format!("{name}: accepter"))?;
            let peer = if conn.peer.trim().eq_ignore_ascii_case("stdio") {
                Peer::Stdio
            } else {
                Peer::Tcp(listen_addr(&conn.peer).with_context(|| format!("{name}: peer"))?)
            };
            connections.push(Connection {
                name,
                accepter,
                peer,
            });
        }

        let stdio_peers = connections
            .iter()
            .filter(|c| c.peer == Peer::Stdio)
            .count();
        if stdio_peers > 1 {
            bail!("only one connection may use the stdio peer, found {stdio_peers}");
        }
        Ok(Self { connections })
    }
}

fn listen_addr(spec: &str) -> Result<ListenAddr> {
    match spec.parse::<IoSpec>()? {
        IoSpec::Tcp { host, port } => Ok(ListenAddr { host, port }),
        other => bail!("'{spec}': only tcp listeners are supported, not {}", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_stdio_and_tcp_peers() {
        let config = StubConfig::parse(
            "connections:\n\
             \x20 - name: echo\n\
             \x20   accepter: tcp,127.0.0.1,3023\n\
             \x20   peer: stdio\n\
             \x20 - accepter: tcp,localhost,3024\n\
             \x20   peer: tcp,localhost,3025\n",
        )
        .unwrap();

        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].name, "echo");
        assert_eq!(config.connections[0].peer, Peer::Stdio);
        assert_eq!(config.connections[1].name, "connection1");
        assert_eq!(
            config.connections[1].peer,
            Peer::Tcp(ListenAddr {
                host: "localhost".to_string(),
                port: 3025
            })
        );
        assert_eq!(config.connections[1].accepter.to_string(), "tcp,localhost,3024");
    }

    #[test]
    fn empty_document_has_no_connections() {
        assert!(StubConfig::parse("").unwrap().connections.is_empty());
        assert!(StubConfig::parse("connections: []").unwrap().connections.is_empty());
    }

    #[rstest]
    #[case::unix_accepter("connections: [{accepter: 'unix,/tmp/x', peer: stdio}]", "only tcp")]
    #[case::bad_port("connections: [{accepter: 'tcp,localhost,99999', peer: stdio}]", "accepter")]
    #[case::unknown_field("bogus: 1", "parse YAML")]
    #[case::two_stdio(
        "connections: [{accepter: 'tcp,localhost,1', peer: stdio}, {accepter: 'tcp,localhost,2', peer: stdio}]",
        "only one"
    )]
    fn rejects_bad_tables(#[case] text: &str, #[case] needle: &str) {
        let err = StubConfig::parse(text).unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains(needle), "{rendered}");
    }
}
