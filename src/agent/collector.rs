//! Metric collectors.
//!
//! Collectors are plain values listed explicitly in a [`CollectorRegistry`];
//! nothing registers itself.

use std::io;
use std::path::PathBuf;

/// One reading: metric name (dot-separated) and value.
pub type Sample = (String, f64);

/// Source of metric samples.
pub trait Collector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn collect(&self) -> io::Result<Vec<Sample>>;
}

/// Full uri for a metric pushed by `user_id`.
pub fn metric_uri(user_id: &str, metric: &str) -> String {
    format!("/agent/{}/{}", user_id, metric)
}

fn invalid(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("unexpected {} format", what))
}

/// Seconds since boot, from `/proc/uptime`.
pub struct UptimeCollector {
    path: PathBuf,
}

impl UptimeCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for UptimeCollector {
    fn default() -> Self {
        Self::new("/proc/uptime")
    }
}

pub fn parse_uptime(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

impl Collector for UptimeCollector {
    fn name(&self) -> &'static str {
        "uptime"
    }

    fn collect(&self) -> io::Result<Vec<Sample>> {
        let content = std::fs::read_to_string(&self.path)?;
        let uptime = parse_uptime(&content).ok_or_else(|| invalid("uptime"))?;
        Ok(vec![("system.uptime.seconds".to_string(), uptime)])
    }
}

/// 1, 5 and 15 minute load averages, from `/proc/loadavg`.
pub struct LoadAverageCollector {
    path: PathBuf,
}

impl LoadAverageCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for LoadAverageCollector {
    fn default() -> Self {
        Self::new("/proc/loadavg")
    }
}

pub fn parse_loadavg(content: &str) -> Option<[f64; 3]> {
    let mut fields = content.split_whitespace().map(str::parse::<f64>);
    Some([fields.next()?.ok()?, fields.next()?.ok()?, fields.next()?.ok()?])
}

impl Collector for LoadAverageCollector {
    fn name(&self) -> &'static str {
        "loadavg"
    }

    fn collect(&self) -> io::Result<Vec<Sample>> {
        let content = std::fs::read_to_string(&self.path)?;
        let [one, five, fifteen] = parse_loadavg(&content).ok_or_else(|| invalid("loadavg"))?;
        Ok(vec![
            ("system.load.1m".to_string(), one),
            ("system.load.5m".to_string(), five),
            ("system.load.15m".to_string(), fifteen),
        ])
    }
}

/// Total, available and used memory, from `/proc/meminfo`.
pub struct MemoryCollector {
    path: PathBuf,
}

impl MemoryCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new("/proc/meminfo")
    }
}

/// `MemTotal` and `MemAvailable` in bytes.
pub fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let field = |name: &str| -> Option<u64> {
        let line = content.lines().find(|l| l.starts_with(name))?;
        let kb: u64 = line[name.len()..].trim_start_matches(':').split_whitespace().next()?.parse().ok()?;
        Some(kb * 1024)
    };
    Some((field("MemTotal")?, field("MemAvailable")?))
}

impl Collector for MemoryCollector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn collect(&self) -> io::Result<Vec<Sample>> {
        let content = std::fs::read_to_string(&self.path)?;
        let (total, available) = parse_meminfo(&content).ok_or_else(|| invalid("meminfo"))?;

        let mut samples = vec![
            ("system.memory.total_bytes".to_string(), total as f64),
            ("system.memory.available_bytes".to_string(), available as f64),
        ];
        if total > 0 {
            let used = total.saturating_sub(available) as f64 / total as f64 * 100.0;
            samples.push(("system.memory.used_percent".to_string(), used));
        }
        Ok(samples)
    }
}

/// Ordered list of collectors an agent runs each round.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uptime, load average and memory.
    pub fn standard() -> Self {
        Self::new()
            .with(UptimeCollector::default())
            .with(LoadAverageCollector::default())
            .with(MemoryCollector::default())
    }

    pub fn with(mut self, collector: impl Collector + 'static) -> Self {
        self.collectors.push(Box::new(collector));
        self
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Run every collector. A failing collector is logged and skipped.
    pub fn collect_all(&self) -> Vec<Sample> {
        let mut samples = Vec::new();
        for collector in &self.collectors {
            match collector.collect() {
                Ok(mut batch) => samples.append(&mut batch),
                Err(e) => tracing::warn!(collector = collector.name(), error = %e, "Collector failed"),
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16318412 kB\nMemFree:         1234567 kB\nMemAvailable:    8159206 kB\nBuffers:          123456 kB\n";

    #[test]
    fn parses_proc_files() {
        assert_eq!(parse_uptime("12345.67 54321.00\n"), Some(12345.67));
        assert_eq!(parse_uptime(""), None);

        assert_eq!(parse_loadavg("0.52 0.58 0.59 2/1234 5678\n"), Some([0.52, 0.58, 0.59]));
        assert_eq!(parse_loadavg("0.52 x"), None);

        assert_eq!(parse_meminfo(MEMINFO), Some((16318412 * 1024, 8159206 * 1024)));
        assert_eq!(parse_meminfo("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn memory_collector_reports_used_percent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, "MemTotal: 1000 kB\nMemAvailable: 250 kB\n").unwrap();

        let samples = MemoryCollector::new(&path).collect().unwrap();
        assert_eq!(samples[2], ("system.memory.used_percent".to_string(), 75.0));
    }

    #[test]
    fn failing_collector_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let uptime = dir.path().join("uptime");
        std::fs::write(&uptime, "42.0 10.0\n").unwrap();

        let registry = CollectorRegistry::new()
            .with(LoadAverageCollector::new(dir.path().join("missing")))
            .with(UptimeCollector::new(&uptime));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.collect_all(), vec![("system.uptime.seconds".to_string(), 42.0)]);
    }

    #[test]
    fn standard_registry_lists_three_collectors() {
        assert_eq!(CollectorRegistry::standard().len(), 3);
    }

    #[test]
    fn uri_namespacing() {
        assert_eq!(metric_uri("alice", "system.cpu.core0"), "/agent/alice/system.cpu.core0");
    }
}
