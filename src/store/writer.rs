use crate::collectors::software::software_key;
use crate::collectors::{HardwareSnapshot, HostRecord, InstalledSoftware};
use crate::delta::{AdapterSample, BYTES_PER_MB};
use crate::store::models::{Computer, Disk, Memory, NetworkAdapter, Processor, Software};
use crate::store::repo::{ChildEntity, Entity, Repository};
use crate::store::{now_rfc3339, DbPool, StoreError};
use sqlx::Row;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Rows written and failed during one persistence pass, by table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub written: BTreeMap<&'static str, u64>,
    pub failed: BTreeMap<&'static str, u64>,
}

impl PersistReport {
    fn ok(&mut self, table: &'static str) {
        *self.written.entry(table).or_default() += 1;
    }

    fn fail(&mut self, table: &'static str) {
        *self.failed.entry(table).or_default() += 1;
    }

    pub fn total_written(&self) -> u64 {
        self.written.values().sum()
    }
}

/// Writes collected snapshots into the inventory tables.
///
/// The computer row is resolved on first use and its id is cached for the lifetime of the
/// writer; every metric row is inserted only after that id is known.
#[derive(Debug)]
pub struct PersistenceWriter {
    db: DbPool,
    computer_id: Mutex<Option<i64>>,
}

impl PersistenceWriter {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            computer_id: Mutex::new(None),
        }
    }

    pub async fn cached_computer_id(&self) -> Option<i64> {
        *self.computer_id.lock().await
    }

    /// Looks the host up by (host, user, os, version) and inserts it when absent.
    pub async fn resolve_computer(&self, host: &HostRecord) -> Result<i64, StoreError> {
        let mut cached = self.computer_id.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }

        let existing = sqlx::query(
            "SELECT computer_id FROM computers \
             WHERE host_name = $1 AND user_name = $2 AND os_name = $3 AND os_version = $4 \
             ORDER BY computer_id LIMIT 1",
        )
        .bind(host.host_name.clone())
        .bind(host.user_name.clone())
        .bind(host.os_name.clone())
        .bind(host.os_version.clone())
        .fetch_optional(self.db.inner())
        .await?;

        let id = match existing {
            Some(row) => {
                let id: i64 = row.try_get(0)?;
                debug!(computer_id = id, host = %host.host_name, "компьютер найден в базе");
                id
            }
            None => {
                let created = Repository::<Computer>::new(self.db.clone())
                    .create(computer_from_host(host))
                    .await?;
                info!(
                    computer_id = created.computer_id,
                    host = %host.host_name,
                    "компьютер зарегистрирован в базе"
                );
                created.computer_id
            }
        };

        *cached = Some(id);
        Ok(id)
    }

    /// Appends one row per collected section. Failures are logged per row and never abort
    /// the pass; without a host record nothing is written.
    pub async fn write_hardware(
        &self,
        snapshot: &HardwareSnapshot,
        adapters: &[AdapterSample],
    ) -> PersistReport {
        let mut report = PersistReport::default();

        let Some(host) = snapshot.host.as_ref() else {
            debug!("нет данных о хосте, запись в базу пропущена");
            return report;
        };
        let computer_id = match self.resolve_computer(host).await {
            Ok(id) => id,
            Err(err) => {
                error!(error = %err, table = Computer::TABLE, "не удалось определить компьютер");
                report.fail(Computer::TABLE);
                return report;
            }
        };

        let timestamp = now_rfc3339();

        if let Some(cpu) = &snapshot.cpu {
            let row = Processor {
                computer_id,
                model: cpu.model.clone(),
                manufacturer: cpu.manufacturer.clone(),
                architecture: cpu.architecture.clone(),
                clock_speed: cpu.clock_speed_ghz,
                core_count: i64::from(cpu.core_count),
                thread_count: i64::from(cpu.thread_count),
                usage_percent: cpu.usage_percent,
                timestamp: timestamp.clone(),
                ..Processor::default()
            };
            self.insert(row, &mut report).await;
        }

        if let Some(memory) = &snapshot.memory {
            let row = Memory {
                computer_id,
                total_memory_gb: memory.total_bytes as f64 / BYTES_PER_GB,
                used_memory_gb: memory.used_bytes as f64 / BYTES_PER_GB,
                free_memory_gb: memory.free_bytes as f64 / BYTES_PER_GB,
                usage_percent: memory.usage_percent,
                memory_type: memory.memory_type.clone(),
                timestamp: timestamp.clone(),
                ..Memory::default()
            };
            self.insert(row, &mut report).await;
        }

        for disk in snapshot.disks.iter().flatten() {
            let row = Disk {
                computer_id,
                drive_letter: disk.mount_point.clone(),
                total_space_gb: disk.total_bytes as f64 / BYTES_PER_GB,
                used_space_gb: disk.used_bytes as f64 / BYTES_PER_GB,
                free_space_gb: disk.free_bytes as f64 / BYTES_PER_GB,
                usage_percent: disk.usage_percent,
                timestamp: timestamp.clone(),
                ..Disk::default()
            };
            self.insert(row, &mut report).await;
        }

        for sample in adapters {
            let counters = &sample.counters;
            let row = NetworkAdapter {
                computer_id,
                adapter_name: counters.name.clone(),
                mac_address: counters.mac_address.clone().unwrap_or_default(),
                upload_speed_mbps: sample.rate.map(|r| r.upload_mb_per_sec()).unwrap_or(0.0),
                download_speed_mbps: sample
                    .rate
                    .map(|r| r.download_mb_per_sec())
                    .unwrap_or(0.0),
                sent_mb: counters.bytes_sent as f64 / BYTES_PER_MB,
                received_mb: counters.bytes_received as f64 / BYTES_PER_MB,
                sent_packets: to_i64(counters.packets_sent),
                received_packets: to_i64(counters.packets_received),
                is_active: counters.bytes_sent + counters.bytes_received > 0,
                timestamp: timestamp.clone(),
                ..NetworkAdapter::default()
            };
            self.insert(row, &mut report).await;
        }

        report
    }

    /// Inserts software not yet recorded for the computer; returns how many rows were added.
    pub async fn write_software(
        &self,
        computer_id: i64,
        items: &[InstalledSoftware],
    ) -> Result<usize, StoreError> {
        let repo = Repository::<Software>::new(self.db.clone());
        let mut known: HashSet<String> = repo
            .list_by_parent(computer_id)
            .await?
            .iter()
            .map(|row| {
                software_key(&InstalledSoftware {
                    name: row.name.clone(),
                    version: row.version.clone(),
                    publisher: row.publisher.clone(),
                    installed: String::new(),
                })
            })
            .collect();

        let timestamp = now_rfc3339();
        let mut added = 0_usize;
        for item in items {
            if item.name.trim().is_empty() || !known.insert(software_key(item)) {
                continue;
            }
            repo.create(Software {
                computer_id,
                name: item.name.clone(),
                version: item.version.clone(),
                publisher: item.publisher.clone(),
                install_date: item.installed.clone(),
                timestamp: timestamp.clone(),
                ..Software::default()
            })
            .await?;
            added += 1;
        }
        Ok(added)
    }

    async fn insert<E: ChildEntity>(&self, row: E, report: &mut PersistReport) {
        match Repository::<E>::new(self.db.clone()).create(row).await {
            Ok(_) => report.ok(E::TABLE),
            Err(err) => {
                error!(error = %err, table = E::TABLE, "не удалось записать строку");
                report.fail(E::TABLE);
            }
        }
    }
}

fn computer_from_host(host: &HostRecord) -> Computer {
    Computer {
        host_name: host.host_name.clone(),
        user_name: host.user_name.clone(),
        os_name: host.os_name.clone(),
        os_version: host.os_version.clone(),
        os_platform: host.os_platform.clone(),
        os_architecture: host.os_architecture.clone(),
        kernel_version: host.kernel_version.clone(),
        uptime_seconds: to_i64(host.uptime_seconds),
        process_count: to_i64(host.process_count),
        boot_time: humantime::format_rfc3339_seconds(
            UNIX_EPOCH + Duration::from_secs(host.boot_time_unix),
        )
        .to_string(),
        home_directory: host.home_directory.clone(),
        gid: host.gid.clone(),
        uid: host.uid.clone(),
        ..Computer::default()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{CpuRecord, DiskRecord, NetCounters};
    use crate::delta::NetRate;

    fn host() -> HostRecord {
        HostRecord {
            host_name: "ws-14".to_string(),
            user_name: "ivan".to_string(),
            os_name: "Ubuntu".to_string(),
            os_version: "22.04".to_string(),
            os_platform: "linux".to_string(),
            os_architecture: "x86_64".to_string(),
            kernel_version: "6.5.0".to_string(),
            uptime_seconds: 3_600,
            process_count: 240,
            boot_time_unix: 1_700_000_000,
            home_directory: "/home/ivan".to_string(),
            uid: "1000".to_string(),
            gid: "1000".to_string(),
        }
    }

    async fn count(db: &DbPool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.inner())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn computer_is_resolved_once() {
        let db = DbPool::in_memory().await.expect("база в памяти");
        let writer = PersistenceWriter::new(db.clone());

        let first = writer.resolve_computer(&host()).await.unwrap();
        let second = writer.resolve_computer(&host()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(writer.cached_computer_id().await, Some(first));
        assert_eq!(count(&db, "computers").await, 1);

        let fresh = PersistenceWriter::new(db.clone());
        assert_eq!(fresh.resolve_computer(&host()).await.unwrap(), first);
        assert_eq!(count(&db, "computers").await, 1);
    }

    fn snapshot() -> HardwareSnapshot {
        HardwareSnapshot {
            host: Some(host()),
            cpu: Some(CpuRecord {
                model: "Ryzen 5 5600".to_string(),
                manufacturer: "AuthenticAMD".to_string(),
                architecture: "x86_64".to_string(),
                clock_speed_ghz: 3.5,
                core_count: 6,
                thread_count: 12,
                usage_percent: 17.5,
            }),
            memory: None,
            disks: Some(vec![DiskRecord {
                name: "nvme0n1p2".to_string(),
                mount_point: "/".to_string(),
                file_system: "ext4".to_string(),
                total_bytes: 512 * 1024 * 1024 * 1024,
                used_bytes: 128 * 1024 * 1024 * 1024,
                free_bytes: 384 * 1024 * 1024 * 1024,
                usage_percent: 25.0,
            }]),
            network: None,
        }
    }

    fn adapters() -> Vec<AdapterSample> {
        vec![AdapterSample {
            counters: NetCounters {
                name: "eth0".to_string(),
                mac_address: Some("aa:bb:cc:dd:ee:ff".to_string()),
                bytes_sent: 2 * 1024 * 1024,
                bytes_received: 0,
                packets_sent: 10,
                packets_received: 0,
            },
            rate: Some(NetRate {
                sent_bytes_per_sec: BYTES_PER_MB,
                received_bytes_per_sec: 0.0,
                sent_packets_per_sec: 1.0,
                received_packets_per_sec: 0.0,
            }),
        }]
    }

    #[tokio::test]
    async fn hardware_rows_reference_the_computer() {
        let db = DbPool::in_memory().await.expect("база в памяти");
        let writer = PersistenceWriter::new(db.clone());
        let snapshot = snapshot();
        let adapters = adapters();

        let report = writer.write_hardware(&snapshot, &adapters).await;
        assert!(report.failed.is_empty(), "{report:?}");
        assert_eq!(report.total_written(), 3);
        assert_eq!(report.written.get("memory"), None);

        let id = writer.cached_computer_id().await.unwrap();
        let disks = Repository::<Disk>::new(db.clone()).list_by_parent(id).await.unwrap();
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].total_space_gb, 512.0);

        let nics = Repository::<NetworkAdapter>::new(db.clone())
            .list_by_parent(id)
            .await
            .unwrap();
        assert_eq!(nics[0].upload_speed_mbps, 1.0);
        assert_eq!(nics[0].sent_mb, 2.0);
        assert!(nics[0].is_active);

        writer.write_hardware(&snapshot, &adapters).await;
        assert_eq!(count(&db, "processors").await, 2);
        assert_eq!(count(&db, "computers").await, 1);
    }

    #[tokio::test]
    async fn failed_table_does_not_stop_the_pass() {
        let db = DbPool::in_memory().await.expect("база в памяти");
        let writer = PersistenceWriter::new(db.clone());
        sqlx::query("DROP TABLE disks")
            .execute(db.inner())
            .await
            .unwrap();

        let report = writer.write_hardware(&snapshot(), &adapters()).await;
        assert_eq!(report.failed.get("disks"), Some(&1));
        assert_eq!(report.written.get("processors"), Some(&1));
        assert_eq!(report.written.get("network_adapters"), Some(&1));
        assert_eq!(count(&db, "processors").await, 1);
        assert_eq!(count(&db, "network_adapters").await, 1);
    }

    #[tokio::test]
    async fn snapshot_without_host_writes_nothing() {
        let db = DbPool::in_memory().await.expect("база в памяти");
        let writer = PersistenceWriter::new(db.clone());
        let report = writer
            .write_hardware(&HardwareSnapshot::default(), &[])
            .await;
        assert_eq!(report, PersistReport::default());
        assert_eq!(count(&db, "computers").await, 0);
    }

    #[tokio::test]
    async fn software_is_written_once_per_computer() {
        let db = DbPool::in_memory().await.expect("база в памяти");
        let writer = PersistenceWriter::new(db.clone());
        let id = writer.resolve_computer(&host()).await.unwrap();
        let items = vec![
            InstalledSoftware {
                name: "firefox".to_string(),
                version: "128.0".to_string(),
                publisher: "Mozilla".to_string(),
                installed: String::new(),
            },
            InstalledSoftware {
                name: "curl".to_string(),
                version: "8.5.0".to_string(),
                publisher: "Ubuntu Developers".to_string(),
                installed: "2024-03-01".to_string(),
            },
        ];

        assert_eq!(writer.write_software(id, &items).await.unwrap(), 2);
        assert_eq!(writer.write_software(id, &items).await.unwrap(), 0);

        let mut upgraded = items.clone();
        upgraded[0].version = "129.0".to_string();
        assert_eq!(writer.write_software(id, &upgraded).await.unwrap(), 1);
        assert_eq!(count(&db, "software").await, 3);
    }
}
