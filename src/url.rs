//! Server address parsing for the client: `shuttle://host:port`, `host:port`,
//! bare host or bare IPv6 literal (default port appended)

use crate::protocol::DEFAULT_PORT;
use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    /// `host:port`, bracketing IPv6 hosts, ready for `TcpStream::connect`
    pub fn dial_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

pub fn parse_server_addr(s: &str) -> Result<ServerAddr> {
    let s_trim = s.trim();
    let lower = s_trim.to_ascii_lowercase();
    let mut rest = s_trim;
    if let Some(scheme_end) = lower.find("://") {
        if &lower[..scheme_end] != "shuttle" {
            bail!("unsupported scheme in {:?}", s_trim);
        }
        rest = &s_trim[scheme_end + 3..];
    }
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        bail!("missing host in {:?}", s_trim);
    }

    // [v6]:port or [v6]
    if let Some(r) = rest.strip_prefix('[') {
        let Some((host, after)) = r.split_once(']') else {
            bail!("unterminated IPv6 literal in {:?}", s_trim);
        };
        let port = match after {
            "" => DEFAULT_PORT,
            p => match p.strip_prefix(':') {
                Some(p) => parse_port(p, s_trim)?,
                None => bail!("junk after IPv6 literal in {:?}", s_trim),
            },
        };
        return Ok(ServerAddr {
            host: host.to_string(),
            port,
        });
    }

    // More than one colon and no brackets: bare IPv6
    if rest.matches(':').count() > 1 {
        return Ok(ServerAddr {
            host: rest.to_string(),
            port: DEFAULT_PORT,
        });
    }

    let (host, port) = match rest.split_once(':') {
        Some((h, p)) => (h, parse_port(p, s_trim)?),
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        bail!("missing host in {:?}", s_trim);
    }
    Ok(ServerAddr {
        host: host.to_string(),
        port,
    })
}

fn parse_port(p: &str, whole: &str) -> Result<u16> {
    p.parse()
        .map_err(|_| anyhow::anyhow!("invalid port {:?} in {:?}", p, whole))
}
