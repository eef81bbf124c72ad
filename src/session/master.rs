use anyhow::Result;
use regex::Regex;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::IngestError;

/// Where a session sends its work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Master {
    /// In-process executor pool with a fixed number of threads.
    Local { threads: usize },
    /// Standalone cluster coordinator, driven in client mode from this process.
    Standalone { host: String, port: u16 },
}

impl Master {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url == "local" {
            return Ok(Master::Local { threads: 1 });
        }

        if let Some(rest) = url.strip_prefix("local[") {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| IngestError::InvalidMaster(url.to_string()))?;
            let threads = if inner == "*" {
                available_cores()
            } else {
                inner
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| IngestError::InvalidMaster(url.to_string()))?
            };
            return Ok(Master::Local { threads });
        }

        if let Some(rest) = url.strip_prefix("spark://") {
            let (host, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| IngestError::InvalidMaster(url.to_string()))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| IngestError::InvalidMaster(url.to_string()))?;
            if host.is_empty() {
                return Err(IngestError::InvalidMaster(url.to_string()).into());
            }
            return Ok(Master::Standalone {
                host: host.to_string(),
                port,
            });
        }

        Err(IngestError::InvalidMaster(url.to_string()).into())
    }

    /// Worker threads the driver runs tasks on.
    pub fn parallelism(&self) -> usize {
        match self {
            Master::Local { threads } => *threads,
            Master::Standalone { .. } => available_cores(),
        }
    }

    /// Open (and immediately drop) a TCP connection to the coordinator.
    pub fn probe(&self, timeout: Duration) -> Result<()> {
        let Master::Standalone { host, port } = self else {
            return Ok(());
        };

        let address = format!("{}:{}", host, port);
        let unreachable = |source| IngestError::CoordinatorUnreachable {
            address: address.clone(),
            source,
        };
        let mut last_err = None;
        for addr in address.to_socket_addrs().map_err(unreachable)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        let source = last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        });
        Err(unreachable(source).into())
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parse JVM-style memory strings (`512m`, `2G`, `1gb`, `1048576`) into bytes.
pub fn parse_memory(value: &str) -> Result<u64> {
    let re = Regex::new(r"(?i)^\s*(\d+)\s*([kmgt]?)b?\s*$")?;
    let caps = re
        .captures(value)
        .ok_or_else(|| IngestError::InvalidMemory(value.to_string()))?;
    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| IngestError::InvalidMemory(value.to_string()))?;
    let shift = match caps[2].to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => unreachable!("regex only admits k, m, g, t"),
    };
    amount
        .checked_mul(1u64 << shift)
        .ok_or_else(|| IngestError::InvalidMemory(value.to_string()).into())
}

/// Parse timeouts written as `120s`, `500ms`, `2m` or bare seconds.
pub fn parse_timeout(value: &str) -> Result<Duration> {
    let re = Regex::new(r"^\s*(\d+)\s*(ms|s|m)?\s*$")?;
    let invalid = || IngestError::InvalidOption {
        key: super::conf::NETWORK_TIMEOUT.to_string(),
        value: value.to_string(),
    };
    let caps = re.captures(value).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
    Ok(match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(amount),
        Some("m") => Duration::from_secs(amount * 60),
        _ => Duration::from_secs(amount),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_masters() {
        assert_eq!(Master::parse("local").unwrap(), Master::Local { threads: 1 });
        assert_eq!(
            Master::parse("local[3]").unwrap(),
            Master::Local { threads: 3 }
        );
        match Master::parse("local[*]").unwrap() {
            Master::Local { threads } => assert!(threads >= 1),
            other => panic!("unexpected master {:?}", other),
        }
    }

    #[test]
    fn parses_standalone_master() {
        assert_eq!(
            Master::parse("spark://spark-master:7077").unwrap(),
            Master::Standalone {
                host: "spark-master".to_string(),
                port: 7077
            }
        );
    }

    #[test]
    fn rejects_malformed_masters() {
        for url in ["local[0]", "local[x]", "local[2", "spark://host", "spark://:7077", "yarn"] {
            let err = Master::parse(url).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<IngestError>(), Some(IngestError::InvalidMaster(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn probe_fails_for_closed_port() {
        // Bind then drop a listener so the port is very likely closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let master = Master::Standalone {
            host: "127.0.0.1".to_string(),
            port,
        };
        let err = master.probe(Duration::from_millis(200)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::CoordinatorUnreachable { .. })
        ));
    }

    #[test]
    fn probe_succeeds_for_listening_coordinator() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let master = Master::Standalone {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };
        master.probe(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn parses_memory_sizes() {
        assert_eq!(parse_memory("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory("1gb").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory("4096").unwrap(), 4096);
        assert!(parse_memory("two gigs").is_err());
        assert!(parse_memory("1p").is_err());
    }

    #[test]
    fn parses_timeouts() {
        assert_eq!(parse_timeout("120s").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_timeout("7").unwrap(), Duration::from_secs(7));
        assert!(parse_timeout("soon").is_err());
    }
}
