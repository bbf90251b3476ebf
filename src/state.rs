use crate::collectors::{
    CheckResults, CpuRecord, DiskRecord, HardwareSnapshot, HostRecord, InstalledSoftware,
    MemoryRecord, ProcessRecord,
};
use crate::delta::AdapterSample;
use crate::poll::ViewKind;
use serde::Serialize;
use std::collections::BTreeMap;

pub const RATE_PENDING: &str = "computing…";
pub const MAC_UNAVAILABLE: &str = "unavailable";

/// What the views last rendered. Sections are `None` until collected, and again after a
/// collector fails.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub started_at_unix: i64,
    pub hardware: HardwareView,
    pub processes: Option<Vec<ProcessRecord>>,
    pub software: Option<Vec<InstalledSoftware>>,
    pub checks: CheckResults,
    pub last_collect: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HardwareView {
    pub host: Option<HostRecord>,
    pub cpu: Option<CpuRecord>,
    pub memory: Option<MemoryRecord>,
    pub disks: Option<Vec<DiskRecord>>,
    pub network: Option<Vec<AdapterView>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterView {
    pub name: String,
    pub mac_address: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub upload_mb_per_sec: Option<f64>,
    pub download_mb_per_sec: Option<f64>,
    pub upload: String,
    pub download: String,
    pub is_active: bool,
}

impl From<&AdapterSample> for AdapterView {
    fn from(sample: &AdapterSample) -> Self {
        let c = &sample.counters;
        let upload = sample.rate.map(|r| r.upload_mb_per_sec());
        let download = sample.rate.map(|r| r.download_mb_per_sec());
        Self {
            name: c.name.clone(),
            mac_address: c
                .mac_address
                .clone()
                .unwrap_or_else(|| MAC_UNAVAILABLE.to_string()),
            bytes_sent: c.bytes_sent,
            bytes_received: c.bytes_received,
            packets_sent: c.packets_sent,
            packets_received: c.packets_received,
            upload_mb_per_sec: upload,
            download_mb_per_sec: download,
            upload: format_rate(upload),
            download: format_rate(download),
            is_active: c.bytes_sent + c.bytes_received > 0,
        }
    }
}

pub fn format_rate(mb_per_sec: Option<f64>) -> String {
    match mb_per_sec {
        Some(v) => format!("{v:.2} MB/s"),
        None => RATE_PENDING.to_string(),
    }
}

impl State {
    pub fn new(started_at_unix: i64) -> Self {
        Self {
            started_at_unix,
            ..Self::default()
        }
    }

    pub fn update_hardware(&mut self, now: i64, snapshot: HardwareSnapshot, adapters: &[AdapterSample]) {
        self.hardware = HardwareView {
            host: snapshot.host,
            cpu: snapshot.cpu,
            memory: snapshot.memory,
            disks: snapshot.disks,
            network: snapshot
                .network
                .map(|_| adapters.iter().map(AdapterView::from).collect()),
        };
        self.mark_collected(ViewKind::Hardware, now);
    }

    pub fn update_processes(&mut self, now: i64, processes: Option<Vec<ProcessRecord>>) {
        self.processes = processes;
        self.mark_collected(ViewKind::Processes, now);
    }

    pub fn update_software(&mut self, now: i64, software: Option<Vec<InstalledSoftware>>) {
        self.software = software;
        self.mark_collected(ViewKind::Software, now);
    }

    pub fn update_checks(&mut self, now: i64, checks: CheckResults) {
        self.checks = checks;
        self.mark_collected(ViewKind::Servers, now);
    }

    fn mark_collected(&mut self, view: ViewKind, now: i64) {
        self.last_collect.insert(view.as_str().to_string(), now);
    }

    #[cfg(test)]
    pub fn last_collect_at(&self, view: ViewKind) -> Option<i64> {
        self.last_collect.get(view.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::NetCounters;
    use crate::delta::{NetRate, BYTES_PER_MB};

    fn sample(rate: Option<NetRate>) -> AdapterSample {
        AdapterSample {
            counters: NetCounters {
                name: "wlan0".to_string(),
                mac_address: None,
                bytes_sent: 0,
                bytes_received: 0,
                packets_sent: 0,
                packets_received: 0,
            },
            rate,
        }
    }

    #[test]
    fn first_sample_renders_as_pending() {
        let view = AdapterView::from(&sample(None));
        assert_eq!(view.upload, RATE_PENDING);
        assert_eq!(view.download, RATE_PENDING);
        assert_eq!(view.mac_address, MAC_UNAVAILABLE);
        assert!(!view.is_active);
    }

    #[test]
    fn rate_renders_in_mb_per_sec() {
        let view = AdapterView::from(&sample(Some(NetRate {
            sent_bytes_per_sec: BYTES_PER_MB * 1.5,
            received_bytes_per_sec: 0.0,
            sent_packets_per_sec: 0.0,
            received_packets_per_sec: 0.0,
        })));
        assert_eq!(view.upload, "1.50 MB/s");
        assert_eq!(view.download, "0.00 MB/s");
    }

    #[test]
    fn failed_network_collector_hides_the_section() {
        let mut state = State::new(100);
        state.update_hardware(
            120,
            HardwareSnapshot {
                network: Some(Vec::new()),
                ..HardwareSnapshot::default()
            },
            &[sample(None)],
        );
        assert_eq!(state.hardware.network.as_ref().map(Vec::len), Some(1));

        state.update_hardware(125, HardwareSnapshot::default(), &[]);
        assert!(state.hardware.network.is_none());
        assert_eq!(state.last_collect_at(ViewKind::Hardware), Some(125));
        assert_eq!(state.last_collect_at(ViewKind::Software), None);
    }
}
