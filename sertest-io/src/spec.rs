//! Connection strings understood by [`Endpoint`](crate::Endpoint).
//!
//! ```text
//! tcp,<host>,<port>
//! unix,<path>
//! stdio,<command line>
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{invalid_spec, EndpointError};

// ---------------------------------------------------------------------------
// IoSpec
// ---------------------------------------------------------------------------

/// Parsed form of an endpoint connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoSpec {
    /// Client connection to a TCP listener.
    Tcp { host: String, port: u16 },
    /// Client connection to a Unix-domain stream socket.
    Unix { path: PathBuf },
    /// Subprocess whose stdin/stdout form the byte stream.
    Stdio { program: String, args: Vec<String> },
}

impl IoSpec {
    /// Build a `stdio` spec from an already-split command line.
    pub fn stdio(program: impl Into<String>, args: Vec<String>) -> Self {
        IoSpec::Stdio {
            program: program.into(),
            args,
        }
    }

    /// Short transport name, as it appears before the first comma.
    pub fn kind(&self) -> &'static str {
        match self {
            IoSpec::Tcp { .. } => "tcp",
            IoSpec::Unix { .. } => "unix",
            IoSpec::Stdio { .. } => "stdio",
        }
    }
}

impl FromStr for IoSpec {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, rest)) = s.split_once(',') else {
            return Err(invalid_spec(s, "expected '<kind>,<address>'"));
        };

        match kind.trim().to_ascii_lowercase().as_str() {
            "tcp" => {
                // rsplit so that IPv6 literals keep their colons and commas stay unambiguous
                let Some((host, port)) = rest.rsplit_once(',') else {
                    return Err(invalid_spec(s, "tcp needs '<host>,<port>'"));
                };
                let host = host.trim();
                if host.is_empty() {
                    return Err(invalid_spec(s, "empty host"));
                }
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|err| invalid_spec(s, format!("bad port: {err}")))?;
                Ok(IoSpec::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            "unix" => {
                let path = rest.trim();
                if path.is_empty() {
                    return Err(invalid_spec(s, "empty socket path"));
                }
                Ok(IoSpec::Unix {
                    path: PathBuf::from(path),
                })
            }
            "stdio" => {
                let mut words = split_command_line(rest).map_err(|reason| invalid_spec(s, reason))?;
                if words.is_empty() {
                    return Err(invalid_spec(s, "empty command line"));
                }
                let program = words.remove(0);
                Ok(IoSpec::Stdio {
                    program,
                    args: words,
                })
            }
            other => Err(invalid_spec(s, format!("unknown transport '{other}'"))),
        }
    }
}

impl fmt::Display for IoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoSpec::Tcp { host, port } => write!(f, "tcp,{host},{port}"),
            IoSpec::Unix { path } => write!(f, "unix,{}", path.display()),
            IoSpec::Stdio { program, args } => {
                write!(f, "stdio,{}", quote_word(program))?;
                for arg in args {
                    write!(f, " {}", quote_word(arg))?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command-line helpers
// ---------------------------------------------------------------------------

/// Split a command line on whitespace. Double quotes group words and may
/// contain `\"` and `\\` escapes.
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err("dangling escape in quoted word".to_string()),
                        },
                        Some(other) => current.push(other),
                        None => return Err("unterminated quote".to_string()),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Quote `word` if it would not survive [`split_command_line`] unchanged.
pub fn quote_word(word: &str) -> String {
    if !word.is_empty() && !word.chars().any(|c| c.is_whitespace() || c == '"') {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_tcp_with_host_and_port() {
        let spec: IoSpec = "tcp,localhost,3023".parse().unwrap();
        assert_eq!(
            spec,
            IoSpec::Tcp {
                host: "localhost".to_string(),
                port: 3023
            }
        );
    }

    #[test]
    fn parses_ipv6_tcp_host() {
        let spec: IoSpec = "tcp,::1,4000".parse().unwrap();
        assert_eq!(
            spec,
            IoSpec::Tcp {
                host: "::1".to_string(),
                port: 4000
            }
        );
    }

    #[test]
    fn parses_stdio_command_line() {
        let spec: IoSpec = "stdio,ser2net -r -d -c /tmp/cfg.yaml".parse().unwrap();
        assert_eq!(
            spec,
            IoSpec::stdio(
                "ser2net",
                vec!["-r".into(), "-d".into(), "-c".into(), "/tmp/cfg.yaml".into()]
            )
        );
    }

    #[test]
    fn stdio_quoted_arguments_survive_display() {
        let spec = IoSpec::stdio("/opt/my daemon", vec!["-c".into(), "a \"b\"".into()]);
        let rendered = spec.to_string();
        assert_eq!(rendered, r#"stdio,"/opt/my daemon" -c "a \"b\"""#);
        let reparsed: IoSpec = rendered.parse().unwrap();
        assert_eq!(reparsed, spec);
    }

    #[rstest]
    #[case("tcp")]
    #[case("tcp,localhost")]
    #[case("tcp,localhost,notaport")]
    #[case("tcp,,80")]
    #[case("unix,")]
    #[case("stdio,   ")]
    #[case("stdio,\"unterminated")]
    #[case("sctp,localhost,80")]
    fn rejects_malformed_specs(#[case] input: &str) {
        let err = input.parse::<IoSpec>().unwrap_err();
        assert!(
            matches!(err, EndpointError::InvalidSpec { .. }),
            "got: {err}"
        );
        assert!(err.to_string().contains(input));
    }

    #[test]
    fn split_collapses_runs_of_whitespace() {
        let words = split_command_line("  a   b\tc  ").unwrap();
        assert_eq!(words, vec!["a", "b", "c"]);
    }

    #[test]
    fn split_keeps_empty_quoted_word() {
        let words = split_command_line(r#"prog """#).unwrap();
        assert_eq!(words, vec!["prog", ""]);
    }
}
