use crate::collectors::{CollectError, ProcessRecord};
use serde::Deserialize;
use std::cmp::Ordering;
use std::str::FromStr;
use sysinfo::{PidExt, ProcessExt, System, SystemExt, UserExt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSort {
    #[default]
    Cpu,
    Memory,
    Pid,
    Name,
}

impl FromStr for ProcessSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "memory" | "mem" => Ok(Self::Memory),
            "pid" => Ok(Self::Pid),
            "name" => Ok(Self::Name),
            other => Err(format!("неизвестный ключ сортировки '{other}'")),
        }
    }
}

pub fn collect_processes(system: &mut System) -> Result<Vec<ProcessRecord>, CollectError> {
    system.refresh_memory();
    system.refresh_processes();

    let total_memory = system.total_memory();
    if system.processes().is_empty() {
        return Err(CollectError::Unavailable("processes"));
    }

    let mut out: Vec<ProcessRecord> = system
        .processes()
        .values()
        .map(|p| {
            let user = p
                .user_id()
                .and_then(|uid| system.get_user_by_id(uid))
                .map(|u| u.name().to_string())
                .unwrap_or_default();
            let command = if p.cmd().is_empty() {
                p.exe().to_string_lossy().to_string()
            } else {
                p.cmd().join(" ")
            };
            ProcessRecord {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu_percent: p.cpu_usage() as f64,
                memory_percent: crate::collectors::usage_percent(p.memory(), total_memory),
                memory_bytes: p.memory(),
                status: p.status().to_string(),
                user,
                command,
            }
        })
        .collect();

    sort_processes(&mut out, ProcessSort::Cpu);
    Ok(out)
}

/// Case-insensitive substring match over name, user and command line.
pub fn filter_processes(processes: &[ProcessRecord], query: &str) -> Vec<ProcessRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return processes.to_vec();
    }
    processes
        .iter()
        .filter(|p| {
            p.name.to_lowercase().contains(&needle)
                || p.user.to_lowercase().contains(&needle)
                || p.command.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Numeric keys sort descending, name sorts ascending.
pub fn sort_processes(processes: &mut [ProcessRecord], key: ProcessSort) {
    match key {
        ProcessSort::Cpu => processes.sort_by(|a, b| desc_f64(a.cpu_percent, b.cpu_percent)),
        ProcessSort::Memory => processes.sort_by(|a, b| b.memory_bytes.cmp(&a.memory_bytes)),
        ProcessSort::Pid => processes.sort_by(|a, b| b.pid.cmp(&a.pid)),
        ProcessSort::Name => processes.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.pid.cmp(&b.pid))
        }),
    }
}

fn desc_f64(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
