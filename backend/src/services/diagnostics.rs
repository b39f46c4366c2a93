//! Host diagnostics attached to error responses
//!
//! Only Linux `/proc` is consulted; elsewhere the fields are `None`.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemSnapshot {
    pub server_free_memory_mb: Option<u64>,
    pub process_memory_mb: Option<u64>,
    pub load_average: Option<String>,
    pub uptime_secs: u64,
    pub version: &'static str,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    started: Instant,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub async fn snapshot(&self) -> SystemSnapshot {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.ok();
        let loadavg = tokio::fs::read_to_string("/proc/loadavg").await.ok();
        let status = tokio::fs::read_to_string("/proc/self/status").await.ok();

        SystemSnapshot {
            server_free_memory_mb: meminfo.as_deref().and_then(|m| kib_field(m, "MemAvailable:")),
            process_memory_mb: status.as_deref().and_then(|s| kib_field(s, "VmRSS:")),
            load_average: loadavg.as_deref().and_then(parse_loadavg),
            uptime_secs: self.started.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Value of a `Name:   1234 kB` line, in megabytes
fn kib_field(text: &str, name: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with(name))
        .and_then(|line| line[name.len()..].split_whitespace().next())
        .and_then(|kib| kib.parse::<u64>().ok())
        .map(|kib| kib / 1024)
}

/// First three fields of `/proc/loadavg`, as `"0.10, 0.20, 0.30"`
fn parse_loadavg(text: &str) -> Option<String> {
    let loads: Vec<&str> = text.split_whitespace().take(3).collect();
    if loads.len() == 3 {
        Some(loads.join(", "))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kib_field() {
        let meminfo = "MemTotal:       16000000 kB\nMemAvailable:    2048000 kB\n";
        assert_eq!(kib_field(meminfo, "MemAvailable:"), Some(2000));
        assert_eq!(kib_field(meminfo, "SwapFree:"), None);
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/467 12345\n"),
            Some("0.52, 0.58, 0.59".to_string())
        );
        assert_eq!(parse_loadavg(""), None);
    }
}
