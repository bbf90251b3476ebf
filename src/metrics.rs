use crate::state::State;
use prometheus::core::Collector;
use prometheus::{
    opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub inventory_cpu_usage_percent: Gauge,
    pub inventory_memory_used_bytes: Gauge,
    pub inventory_memory_total_bytes: Gauge,
    pub inventory_disk_usage_percent: GaugeVec,
    pub inventory_net_rx_bytes_per_sec: GaugeVec,
    pub inventory_net_tx_bytes_per_sec: GaugeVec,
    pub inventory_process_count: Gauge,
    pub inventory_software_count: Gauge,
    pub inventory_check_up: GaugeVec,
    pub inventory_check_latency_ms: GaugeVec,
    pub inventory_poll_cycles_total: IntCounterVec,
    pub inventory_refresh_debounced_total: IntCounterVec,
    pub inventory_collect_errors_total: CounterVec,
    pub inventory_rows_persisted_total: IntCounterVec,
    pub inventory_persist_errors_total: IntCounterVec,
    pub inventory_scrape_count_total: Counter,
    pub inventory_uptime_seconds: Gauge,
    pub inventory_last_collect_timestamp_seconds: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let inventory_cpu_usage_percent = Gauge::with_opts(opts!(
            "inventory_cpu_usage_percent",
            "Average CPU usage across cores in percent (0..100)"
        ))?;
        let inventory_memory_used_bytes =
            Gauge::with_opts(opts!("inventory_memory_used_bytes", "Used memory in bytes"))?;
        let inventory_memory_total_bytes =
            Gauge::with_opts(opts!("inventory_memory_total_bytes", "Total memory in bytes"))?;
        let inventory_disk_usage_percent = GaugeVec::new(
            opts!("inventory_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount"],
        )?;
        let inventory_net_rx_bytes_per_sec = GaugeVec::new(
            opts!(
                "inventory_net_rx_bytes_per_sec",
                "Receive speed in bytes per second by interface"
            ),
            &["iface"],
        )?;
        let inventory_net_tx_bytes_per_sec = GaugeVec::new(
            opts!(
                "inventory_net_tx_bytes_per_sec",
                "Transmit speed in bytes per second by interface"
            ),
            &["iface"],
        )?;
        let inventory_process_count =
            Gauge::with_opts(opts!("inventory_process_count", "Number of listed processes"))?;
        let inventory_software_count = Gauge::with_opts(opts!(
            "inventory_software_count",
            "Number of installed software entries after deduplication"
        ))?;
        let inventory_check_up = GaugeVec::new(
            opts!("inventory_check_up", "Server check status (1 up, 0 down)"),
            &["kind", "name"],
        )?;
        let inventory_check_latency_ms = GaugeVec::new(
            opts!("inventory_check_latency_ms", "Server check latency in milliseconds"),
            &["kind", "name"],
        )?;
        let inventory_poll_cycles_total = IntCounterVec::new(
            opts!("inventory_poll_cycles_total", "Completed poll passes by view"),
            &["view"],
        )?;
        let inventory_refresh_debounced_total = IntCounterVec::new(
            opts!(
                "inventory_refresh_debounced_total",
                "Refresh requests dropped because a pass was in flight"
            ),
            &["view"],
        )?;
        let inventory_collect_errors_total = CounterVec::new(
            opts!(
                "inventory_collect_errors_total",
                "Collector errors total by collector"
            ),
            &["collector"],
        )?;
        let inventory_rows_persisted_total = IntCounterVec::new(
            opts!("inventory_rows_persisted_total", "Rows written by table"),
            &["table"],
        )?;
        let inventory_persist_errors_total = IntCounterVec::new(
            opts!("inventory_persist_errors_total", "Failed row writes by table"),
            &["table"],
        )?;
        let inventory_scrape_count_total = Counter::with_opts(opts!(
            "inventory_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let inventory_uptime_seconds =
            Gauge::with_opts(opts!("inventory_uptime_seconds", "Agent uptime in seconds"))?;
        let inventory_last_collect_timestamp_seconds = GaugeVec::new(
            opts!(
                "inventory_last_collect_timestamp_seconds",
                "Unix timestamp of the last completed collection by view"
            ),
            &["view"],
        )?;

        register(&registry, &inventory_cpu_usage_percent)?;
        register(&registry, &inventory_memory_used_bytes)?;
        register(&registry, &inventory_memory_total_bytes)?;
        register(&registry, &inventory_disk_usage_percent)?;
        register(&registry, &inventory_net_rx_bytes_per_sec)?;
        register(&registry, &inventory_net_tx_bytes_per_sec)?;
        register(&registry, &inventory_process_count)?;
        register(&registry, &inventory_software_count)?;
        register(&registry, &inventory_check_up)?;
        register(&registry, &inventory_check_latency_ms)?;
        register(&registry, &inventory_poll_cycles_total)?;
        register(&registry, &inventory_refresh_debounced_total)?;
        register(&registry, &inventory_collect_errors_total)?;
        register(&registry, &inventory_rows_persisted_total)?;
        register(&registry, &inventory_persist_errors_total)?;
        register(&registry, &inventory_scrape_count_total)?;
        register(&registry, &inventory_uptime_seconds)?;
        register(&registry, &inventory_last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            inventory_cpu_usage_percent,
            inventory_memory_used_bytes,
            inventory_memory_total_bytes,
            inventory_disk_usage_percent,
            inventory_net_rx_bytes_per_sec,
            inventory_net_tx_bytes_per_sec,
            inventory_process_count,
            inventory_software_count,
            inventory_check_up,
            inventory_check_latency_ms,
            inventory_poll_cycles_total,
            inventory_refresh_debounced_total,
            inventory_collect_errors_total,
            inventory_rows_persisted_total,
            inventory_persist_errors_total,
            inventory_scrape_count_total,
            inventory_uptime_seconds,
            inventory_last_collect_timestamp_seconds,
        }))
    }

    pub fn update_from_state(&self, state: &State) {
        let hw = &state.hardware;
        if let Some(cpu) = &hw.cpu {
            self.inventory_cpu_usage_percent.set(cpu.usage_percent);
        }
        if let Some(memory) = &hw.memory {
            self.inventory_memory_used_bytes.set(memory.used_bytes as f64);
            self.inventory_memory_total_bytes
                .set(memory.total_bytes as f64);
        }

        self.inventory_disk_usage_percent.reset();
        for d in hw.disks.iter().flatten() {
            self.inventory_disk_usage_percent
                .with_label_values(&[&d.mount_point])
                .set(d.usage_percent);
        }

        self.inventory_net_rx_bytes_per_sec.reset();
        self.inventory_net_tx_bytes_per_sec.reset();
        for n in hw.network.iter().flatten() {
            // interfaces without a second sample are left out
            if let (Some(up), Some(down)) = (n.upload_mb_per_sec, n.download_mb_per_sec) {
                self.inventory_net_tx_bytes_per_sec
                    .with_label_values(&[&n.name])
                    .set(up * crate::delta::BYTES_PER_MB);
                self.inventory_net_rx_bytes_per_sec
                    .with_label_values(&[&n.name])
                    .set(down * crate::delta::BYTES_PER_MB);
            }
        }

        if let Some(processes) = &state.processes {
            self.inventory_process_count.set(processes.len() as f64);
        }
        if let Some(software) = &state.software {
            self.inventory_software_count.set(software.len() as f64);
        }

        self.inventory_check_up.reset();
        self.inventory_check_latency_ms.reset();
        for c in &state.checks.http {
            self.inventory_check_up
                .with_label_values(&["http", &c.name])
                .set(if c.up { 1.0 } else { 0.0 });
            self.inventory_check_latency_ms
                .with_label_values(&["http", &c.name])
                .set(c.latency_ms as f64);
        }
        for c in &state.checks.tcp {
            self.inventory_check_up
                .with_label_values(&["tcp", &c.name])
                .set(if c.up { 1.0 } else { 0.0 });
            self.inventory_check_latency_ms
                .with_label_values(&["tcp", &c.name])
                .set(c.latency_ms as f64);
        }

        for (view, at) in &state.last_collect {
            self.inventory_last_collect_timestamp_seconds
                .with_label_values(&[view])
                .set(*at as f64);
        }

        let uptime = now_unix().saturating_sub(state.started_at_unix) as f64;
        self.inventory_uptime_seconds.set(uptime);
    }

    pub fn inc_scrape_count(&self) {
        self.inventory_scrape_count_total.inc();
    }

    pub fn inc_collect_error(&self, collector: &str) {
        self.inventory_collect_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    pub fn inc_poll_cycle(&self, view: &str) {
        self.inventory_poll_cycles_total
            .with_label_values(&[view])
            .inc();
    }

    pub fn inc_refresh_debounced(&self, view: &str) {
        self.inventory_refresh_debounced_total
            .with_label_values(&[view])
            .inc();
    }

    pub fn add_rows_persisted(&self, table: &str, rows: u64) {
        self.inventory_rows_persisted_total
            .with_label_values(&[table])
            .inc_by(rows);
    }

    pub fn add_persist_errors(&self, table: &str, rows: u64) {
        self.inventory_persist_errors_total
            .with_label_values(&[table])
            .inc_by(rows);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{CheckResults, TcpCheckResult};

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().unwrap()).unwrap()
    }

    #[test]
    fn checks_are_labelled_by_kind() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let mut state = State::new(now_unix());
        state.update_checks(
            now_unix(),
            CheckResults {
                http: Vec::new(),
                tcp: vec![TcpCheckResult {
                    name: "db".to_string(),
                    up: true,
                    latency_ms: 4,
                }],
            },
        );
        metrics.update_from_state(&state);

        let text = encoded(&metrics);
        assert!(text.contains(r#"inventory_check_up{kind="tcp",name="db"} 1"#), "{text}");
        assert!(text.contains(r#"inventory_last_collect_timestamp_seconds{view="servers"}"#));
    }

    #[test]
    fn persistence_counters_accumulate() {
        let metrics = Metrics::new().expect("инициализация метрик");
        metrics.add_rows_persisted("disks", 2);
        metrics.add_rows_persisted("disks", 3);
        metrics.add_persist_errors("processors", 1);
        metrics.inc_poll_cycle("hardware");

        let text = encoded(&metrics);
        assert!(text.contains(r#"inventory_rows_persisted_total{table="disks"} 5"#), "{text}");
        assert!(text.contains(r#"inventory_persist_errors_total{table="processors"} 1"#));
        assert!(text.contains(r#"inventory_poll_cycles_total{view="hardware"} 1"#));
    }
}
