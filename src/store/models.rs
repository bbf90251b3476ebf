use crate::store::repo::{flag, require_id, require_text, ChildEntity, Entity, Repository, Value};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Computer {
    pub computer_id: i64,
    pub host_name: String,
    pub user_name: String,
    pub os_name: String,
    pub os_version: String,
    pub os_platform: String,
    pub os_architecture: String,
    pub kernel_version: String,
    pub uptime_seconds: i64,
    pub process_count: i64,
    pub boot_time: String,
    pub home_directory: String,
    pub gid: String,
    pub uid: String,
}

impl Entity for Computer {
    const TABLE: &'static str = "computers";
    const KEY: &'static str = "computer_id";
    const COLUMNS: &'static [&'static str] = &[
        "host_name",
        "user_name",
        "os_name",
        "os_version",
        "os_platform",
        "os_architecture",
        "kernel_version",
        "uptime_seconds",
        "process_count",
        "boot_time",
        "home_directory",
        "gid",
        "uid",
    ];
    const LABEL: &'static str = "Computer";

    fn key(&self) -> i64 {
        self.computer_id
    }

    fn set_key(&mut self, key: i64) {
        self.computer_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.host_name.clone().into(),
            self.user_name.clone().into(),
            self.os_name.clone().into(),
            self.os_version.clone().into(),
            self.os_platform.clone().into(),
            self.os_architecture.clone().into(),
            self.kernel_version.clone().into(),
            self.uptime_seconds.into(),
            self.process_count.into(),
            self.boot_time.clone().into(),
            self.home_directory.clone().into(),
            self.gid.clone().into(),
            self.uid.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_text(&self.host_name, "host_name")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Processor {
    pub processor_id: i64,
    pub computer_id: i64,
    pub model: String,
    pub manufacturer: String,
    pub architecture: String,
    /// GHz
    pub clock_speed: f64,
    pub core_count: i64,
    pub thread_count: i64,
    pub usage_percent: f64,
    pub timestamp: String,
}

impl Entity for Processor {
    const TABLE: &'static str = "processors";
    const KEY: &'static str = "processor_id";
    const COLUMNS: &'static [&'static str] = &[
        "computer_id",
        "model",
        "manufacturer",
        "architecture",
        "clock_speed",
        "core_count",
        "thread_count",
        "usage_percent",
        "timestamp",
    ];
    const LABEL: &'static str = "Processor";

    fn key(&self) -> i64 {
        self.processor_id
    }

    fn set_key(&mut self, key: i64) {
        self.processor_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.computer_id.into(),
            self.model.clone().into(),
            self.manufacturer.clone().into(),
            self.architecture.clone().into(),
            self.clock_speed.into(),
            self.core_count.into(),
            self.thread_count.into(),
            self.usage_percent.into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.computer_id, "computer_id")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for Processor {
    const PARENT_COLUMN: &'static str = "computer_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Memory {
    pub memory_id: i64,
    pub computer_id: i64,
    pub total_memory_gb: f64,
    pub used_memory_gb: f64,
    pub free_memory_gb: f64,
    pub usage_percent: f64,
    pub memory_type: String,
    pub timestamp: String,
}

impl Entity for Memory {
    const TABLE: &'static str = "memory";
    const KEY: &'static str = "memory_id";
    const COLUMNS: &'static [&'static str] = &[
        "computer_id",
        "total_memory_gb",
        "used_memory_gb",
        "free_memory_gb",
        "usage_percent",
        "memory_type",
        "timestamp",
    ];
    const LABEL: &'static str = "Memory";

    fn key(&self) -> i64 {
        self.memory_id
    }

    fn set_key(&mut self, key: i64) {
        self.memory_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.computer_id.into(),
            self.total_memory_gb.into(),
            self.used_memory_gb.into(),
            self.free_memory_gb.into(),
            self.usage_percent.into(),
            self.memory_type.clone().into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.computer_id, "computer_id")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for Memory {
    const PARENT_COLUMN: &'static str = "computer_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Disk {
    pub disk_id: i64,
    pub computer_id: i64,
    pub drive_letter: String,
    pub total_space_gb: f64,
    pub used_space_gb: f64,
    pub free_space_gb: f64,
    pub usage_percent: f64,
    pub timestamp: String,
}

impl Entity for Disk {
    const TABLE: &'static str = "disks";
    const KEY: &'static str = "disk_id";
    const COLUMNS: &'static [&'static str] = &[
        "computer_id",
        "drive_letter",
        "total_space_gb",
        "used_space_gb",
        "free_space_gb",
        "usage_percent",
        "timestamp",
    ];
    const LABEL: &'static str = "Disk";

    fn key(&self) -> i64 {
        self.disk_id
    }

    fn set_key(&mut self, key: i64) {
        self.disk_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.computer_id.into(),
            self.drive_letter.clone().into(),
            self.total_space_gb.into(),
            self.used_space_gb.into(),
            self.free_space_gb.into(),
            self.usage_percent.into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.computer_id, "computer_id")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for Disk {
    const PARENT_COLUMN: &'static str = "computer_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkAdapter {
    pub adapter_id: i64,
    pub computer_id: i64,
    pub adapter_name: String,
    pub mac_address: String,
    pub upload_speed_mbps: f64,
    pub download_speed_mbps: f64,
    pub sent_mb: f64,
    pub received_mb: f64,
    pub sent_packets: i64,
    pub received_packets: i64,
    pub is_active: bool,
    pub timestamp: String,
}

impl<'r> FromRow<'r, AnyRow> for NetworkAdapter {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            adapter_id: row.try_get("adapter_id")?,
            computer_id: row.try_get("computer_id")?,
            adapter_name: row.try_get("adapter_name")?,
            mac_address: row.try_get("mac_address")?,
            upload_speed_mbps: row.try_get("upload_speed_mbps")?,
            download_speed_mbps: row.try_get("download_speed_mbps")?,
            sent_mb: row.try_get("sent_mb")?,
            received_mb: row.try_get("received_mb")?,
            sent_packets: row.try_get("sent_packets")?,
            received_packets: row.try_get("received_packets")?,
            is_active: flag(row, "is_active")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl Entity for NetworkAdapter {
    const TABLE: &'static str = "network_adapters";
    const KEY: &'static str = "adapter_id";
    const COLUMNS: &'static [&'static str] = &[
        "computer_id",
        "adapter_name",
        "mac_address",
        "upload_speed_mbps",
        "download_speed_mbps",
        "sent_mb",
        "received_mb",
        "sent_packets",
        "received_packets",
        "is_active",
        "timestamp",
    ];
    const LABEL: &'static str = "Network adapter";

    fn key(&self) -> i64 {
        self.adapter_id
    }

    fn set_key(&mut self, key: i64) {
        self.adapter_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.computer_id.into(),
            self.adapter_name.clone().into(),
            self.mac_address.clone().into(),
            self.upload_speed_mbps.into(),
            self.download_speed_mbps.into(),
            self.sent_mb.into(),
            self.received_mb.into(),
            self.sent_packets.into(),
            self.received_packets.into(),
            self.is_active.into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.computer_id, "computer_id")?;
        require_text(&self.adapter_name, "adapter_name")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for NetworkAdapter {
    const PARENT_COLUMN: &'static str = "computer_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Software {
    pub software_id: i64,
    pub computer_id: i64,
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub install_date: String,
    pub install_location: String,
    pub size_mb: f64,
    pub is_system_component: bool,
    pub is_update: bool,
    pub architecture: String,
    pub last_used_date: String,
    pub timestamp: String,
}

impl<'r> FromRow<'r, AnyRow> for Software {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            software_id: row.try_get("software_id")?,
            computer_id: row.try_get("computer_id")?,
            name: row.try_get("name")?,
            version: row.try_get("version")?,
            publisher: row.try_get("publisher")?,
            install_date: row.try_get("install_date")?,
            install_location: row.try_get("install_location")?,
            size_mb: row.try_get("size_mb")?,
            is_system_component: flag(row, "is_system_component")?,
            is_update: flag(row, "is_update")?,
            architecture: row.try_get("architecture")?,
            last_used_date: row.try_get("last_used_date")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl Entity for Software {
    const TABLE: &'static str = "software";
    const KEY: &'static str = "software_id";
    const COLUMNS: &'static [&'static str] = &[
        "computer_id",
        "name",
        "version",
        "publisher",
        "install_date",
        "install_location",
        "size_mb",
        "is_system_component",
        "is_update",
        "architecture",
        "last_used_date",
        "timestamp",
    ];
    const LABEL: &'static str = "Software";

    fn key(&self) -> i64 {
        self.software_id
    }

    fn set_key(&mut self, key: i64) {
        self.software_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.computer_id.into(),
            self.name.clone().into(),
            self.version.clone().into(),
            self.publisher.clone().into(),
            self.install_date.clone().into(),
            self.install_location.clone().into(),
            self.size_mb.into(),
            self.is_system_component.into(),
            self.is_update.into(),
            self.architecture.clone().into(),
            self.last_used_date.clone().into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.computer_id, "computer_id")?;
        require_text(&self.name, "name")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for Software {
    const PARENT_COLUMN: &'static str = "computer_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareUpdate {
    pub update_id: i64,
    pub software_id: i64,
    pub update_name: String,
    pub update_version: String,
    pub kb_article: String,
    pub install_date: String,
    pub size_mb: f64,
    pub is_uninstalled: bool,
    pub timestamp: String,
}

impl<'r> FromRow<'r, AnyRow> for SoftwareUpdate {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            update_id: row.try_get("update_id")?,
            software_id: row.try_get("software_id")?,
            update_name: row.try_get("update_name")?,
            update_version: row.try_get("update_version")?,
            kb_article: row.try_get("kb_article")?,
            install_date: row.try_get("install_date")?,
            size_mb: row.try_get("size_mb")?,
            is_uninstalled: flag(row, "is_uninstalled")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl Entity for SoftwareUpdate {
    const TABLE: &'static str = "software_updates";
    const KEY: &'static str = "update_id";
    const COLUMNS: &'static [&'static str] = &[
        "software_id",
        "update_name",
        "update_version",
        "kb_article",
        "install_date",
        "size_mb",
        "is_uninstalled",
        "timestamp",
    ];
    const LABEL: &'static str = "Software update";

    fn key(&self) -> i64 {
        self.update_id
    }

    fn set_key(&mut self, key: i64) {
        self.update_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.software_id.into(),
            self.update_name.clone().into(),
            self.update_version.clone().into(),
            self.kb_article.clone().into(),
            self.install_date.clone().into(),
            self.size_mb.into(),
            self.is_uninstalled.into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.software_id, "software_id")
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for SoftwareUpdate {
    const PARENT_COLUMN: &'static str = "software_id";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareDependency {
    pub dependency_id: i64,
    pub software_id: i64,
    pub required_software_id: i64,
    pub min_version: String,
    pub max_version: String,
    pub is_optional: bool,
    pub timestamp: String,
}

impl<'r> FromRow<'r, AnyRow> for SoftwareDependency {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            dependency_id: row.try_get("dependency_id")?,
            software_id: row.try_get("software_id")?,
            required_software_id: row.try_get("required_software_id")?,
            min_version: row.try_get("min_version")?,
            max_version: row.try_get("max_version")?,
            is_optional: flag(row, "is_optional")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl Entity for SoftwareDependency {
    const TABLE: &'static str = "software_dependencies";
    const KEY: &'static str = "dependency_id";
    const COLUMNS: &'static [&'static str] = &[
        "software_id",
        "required_software_id",
        "min_version",
        "max_version",
        "is_optional",
        "timestamp",
    ];
    const LABEL: &'static str = "Software dependency";

    fn key(&self) -> i64 {
        self.dependency_id
    }

    fn set_key(&mut self, key: i64) {
        self.dependency_id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.software_id.into(),
            self.required_software_id.into(),
            self.min_version.clone().into(),
            self.max_version.clone().into(),
            self.is_optional.into(),
            self.timestamp.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_id(self.software_id, "software_id")?;
        require_id(self.required_software_id, "required_software_id")?;
        if self.software_id == self.required_software_id {
            return Err(StoreError::Validation(
                "software cannot depend on itself".to_string(),
            ));
        }
        Ok(())
    }

    fn before_insert(&mut self, now: &str) {
        fill_timestamp(&mut self.timestamp, now);
    }
}

impl ChildEntity for SoftwareDependency {
    const PARENT_COLUMN: &'static str = "software_id";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    New,
    InProgress,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub user_id: i64,
    pub computer_name: String,
    pub status: TicketStatus,
    pub cabinet: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl<'r> FromRow<'r, AnyRow> for Ticket {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            user_id: row.try_get("user_id")?,
            computer_name: row.try_get("computer_name")?,
            status: status.parse().map_err(|err: String| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: err.into(),
            })?,
            cabinet: row.try_get("cabinet")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Entity for Ticket {
    const TABLE: &'static str = "tickets";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "description",
        "user_id",
        "computer_name",
        "status",
        "cabinet",
        "created_at",
        "updated_at",
    ];
    const KEEP_ON_UPDATE: &'static [&'static str] = &["created_at"];
    const LABEL: &'static str = "Ticket";

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.title.clone().into(),
            self.description.clone().into(),
            self.user_id.into(),
            self.computer_name.clone().into(),
            self.status.as_str().into(),
            self.cabinet.into(),
            self.created_at.clone().into(),
            self.updated_at.clone().into(),
        ]
    }

    fn validate(&self) -> Result<(), StoreError> {
        require_text(&self.title, "title")
    }

    fn before_insert(&mut self, now: &str) {
        self.created_at = now.to_string();
        self.updated_at = now.to_string();
    }

    fn before_update(&mut self, now: &str) {
        self.updated_at = now.to_string();
    }
}

impl Repository<Ticket> {
    /// Changes only the status; any transition is allowed.
    pub async fn set_status(&self, id: i64, status: TicketStatus) -> Result<Ticket, StoreError> {
        let result = sqlx::query("UPDATE tickets SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str().to_string())
            .bind(crate::store::now_rfc3339())
            .bind(id)
            .execute(self.pool().inner())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(Ticket::LABEL));
        }
        self.get(id).await
    }
}

fn fill_timestamp(timestamp: &mut String, now: &str) {
    if timestamp.trim().is_empty() {
        *timestamp = now.to_string();
    }
}
