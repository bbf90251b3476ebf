pub mod checks;
pub mod processes;
pub mod software;
pub mod system;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("источник данных {0} недоступен")]
    Unavailable(&'static str),
    #[error("команда {command} завершилась с ошибкой: {message}")]
    Command { command: String, message: String },
    #[error("сбор {0} не поддерживается на этой платформе")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRecord {
    pub host_name: String,
    pub user_name: String,
    pub os_name: String,
    pub os_version: String,
    pub os_platform: String,
    pub os_architecture: String,
    pub kernel_version: String,
    pub uptime_seconds: u64,
    pub process_count: u64,
    pub boot_time_unix: u64,
    pub home_directory: String,
    pub uid: String,
    pub gid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuRecord {
    pub model: String,
    pub manufacturer: String,
    pub architecture: String,
    pub clock_speed_ghz: f64,
    pub core_count: u32,
    pub thread_count: u32,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryRecord {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub usage_percent: f64,
    pub memory_type: String,
    pub modules: Vec<MemoryModule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryModule {
    pub size: String,
    pub memory_type: String,
    pub speed: String,
    pub manufacturer: String,
}

/// Memory type and installed modules. Read once per process, the layout does not change at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryLayout {
    pub memory_type: String,
    pub modules: Vec<MemoryModule>,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            memory_type: UNKNOWN_MEMORY_TYPE.to_string(),
            modules: Vec::new(),
        }
    }
}

pub const UNKNOWN_MEMORY_TYPE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskRecord {
    pub name: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub usage_percent: f64,
}

/// Cumulative per-interface counters as reported by the OS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub name: String,
    pub mac_address: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_bytes: u64,
    pub status: String,
    pub user: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledSoftware {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub installed: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckResults {
    pub http: Vec<HttpCheckResult>,
    pub tcp: Vec<TcpCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpCheckResult {
    pub name: String,
    pub up: bool,
    pub latency_ms: u64,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpCheckResult {
    pub name: String,
    pub up: bool,
    pub latency_ms: u64,
}

/// One hardware poll. A section is `None` when its collector failed.
#[derive(Debug, Clone, Default)]
pub struct HardwareSnapshot {
    pub host: Option<HostRecord>,
    pub cpu: Option<CpuRecord>,
    pub memory: Option<MemoryRecord>,
    pub disks: Option<Vec<DiskRecord>>,
    pub network: Option<Vec<NetCounters>>,
}

pub(crate) fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

pub(crate) fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<String, CollectError> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|err| CollectError::Command {
            command: program.to_string(),
            message: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(CollectError::Command {
            command: program.to_string(),
            message: decode_cmd_stdout(&output.stderr).trim().to_string(),
        });
    }
    Ok(decode_cmd_stdout(&output.stdout))
}
