use crate::collectors::{
    usage_percent, CollectError, CpuRecord, DiskRecord, HardwareSnapshot, HostRecord,
    MemoryLayout, MemoryModule, MemoryRecord, NetCounters, UNKNOWN_MEMORY_TYPE,
};
use sysinfo::{
    CpuExt, DiskExt, NetworkExt, NetworksExt, PidExt, ProcessExt, System, SystemExt, UserExt,
};
use tracing::debug;

const DDR_GENERATIONS: [&str; 4] = ["DDR5", "DDR4", "DDR3", "DDR2"];

pub fn refresh_hardware(system: &mut System) {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_processes();
    system.refresh_disks_list();
    system.refresh_disks();
    system.refresh_networks_list();
    system.refresh_networks();
}

/// Runs every hardware collector against an already refreshed `System`.
/// Failed sections stay `None` and are returned alongside with their source name.
pub fn collect_hardware(
    system: &mut System,
    layout: &MemoryLayout,
) -> (HardwareSnapshot, Vec<(&'static str, CollectError)>) {
    refresh_hardware(system);

    let mut errors = Vec::new();
    let mut snapshot = HardwareSnapshot::default();

    match collect_host(system) {
        Ok(host) => snapshot.host = Some(host),
        Err(err) => errors.push(("host", err)),
    }
    match collect_cpu(system) {
        Ok(cpu) => snapshot.cpu = Some(cpu),
        Err(err) => errors.push(("cpu", err)),
    }
    match collect_memory(system, layout) {
        Ok(memory) => snapshot.memory = Some(memory),
        Err(err) => errors.push(("memory", err)),
    }
    match collect_disks(system) {
        Ok(disks) => snapshot.disks = Some(disks),
        Err(err) => errors.push(("disks", err)),
    }
    match collect_network(system) {
        Ok(net) => snapshot.network = Some(net),
        Err(err) => errors.push(("network", err)),
    }

    (snapshot, errors)
}

pub fn collect_host(system: &System) -> Result<HostRecord, CollectError> {
    let host_name = system
        .host_name()
        .filter(|h| !h.trim().is_empty())
        .ok_or(CollectError::Unavailable("host_name"))?;

    let (user_name, uid, gid) = current_user(system);

    Ok(HostRecord {
        host_name,
        user_name,
        os_name: system
            .name()
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
        os_version: system.os_version().unwrap_or_default(),
        os_platform: system.distribution_id(),
        os_architecture: std::env::consts::ARCH.to_string(),
        kernel_version: system.kernel_version().unwrap_or_default(),
        uptime_seconds: system.uptime(),
        process_count: system.processes().len() as u64,
        boot_time_unix: system.boot_time(),
        home_directory: home_directory(),
        uid,
        gid,
    })
}

pub fn collect_cpu(system: &System) -> Result<CpuRecord, CollectError> {
    let first = system.cpus().first().ok_or(CollectError::Unavailable("cpu"))?;
    let thread_count = system.cpus().len() as u32;

    Ok(CpuRecord {
        model: first.brand().trim().to_string(),
        manufacturer: first.vendor_id().to_string(),
        architecture: std::env::consts::ARCH.to_string(),
        clock_speed_ghz: first.frequency() as f64 / 1000.0,
        core_count: system
            .physical_core_count()
            .map(|c| c as u32)
            .unwrap_or(thread_count),
        thread_count,
        usage_percent: system.global_cpu_info().cpu_usage() as f64,
    })
}

pub fn collect_memory(system: &System, layout: &MemoryLayout) -> Result<MemoryRecord, CollectError> {
    let total_bytes = system.total_memory();
    if total_bytes == 0 {
        return Err(CollectError::Unavailable("memory"));
    }
    let used_bytes = system.used_memory().min(total_bytes);

    Ok(MemoryRecord {
        total_bytes,
        used_bytes,
        free_bytes: total_bytes - used_bytes,
        usage_percent: usage_percent(used_bytes, total_bytes),
        memory_type: layout.memory_type.clone(),
        modules: layout.modules.clone(),
    })
}

pub fn collect_disks(system: &System) -> Result<Vec<DiskRecord>, CollectError> {
    Ok(system
        .disks()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| {
            let total = d.total_space();
            let free = d.available_space().min(total);
            let used = total - free;
            DiskRecord {
                name: d.name().to_string_lossy().to_string(),
                mount_point: d.mount_point().to_string_lossy().to_string(),
                file_system: String::from_utf8_lossy(d.file_system()).to_string(),
                total_bytes: total,
                used_bytes: used,
                free_bytes: free,
                usage_percent: usage_percent(used, total),
            }
        })
        .collect())
}

pub fn collect_network(system: &System) -> Result<Vec<NetCounters>, CollectError> {
    let mut out: Vec<NetCounters> = system
        .networks()
        .iter()
        .map(|(iface, data)| {
            let mac = data.mac_address().to_string();
            NetCounters {
                name: iface.to_string(),
                mac_address: if mac.is_empty() || mac == "00:00:00:00:00:00" {
                    None
                } else {
                    Some(mac)
                },
                bytes_sent: data.total_transmitted(),
                bytes_received: data.total_received(),
                packets_sent: data.total_packets_transmitted(),
                packets_received: data.total_packets_received(),
            }
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Reads memory type and modules from `dmidecode -t 17`. Falls back to "Unknown" when the
/// tool is missing, needs privileges or the platform has no such facility.
pub fn read_memory_layout() -> MemoryLayout {
    #[cfg(target_os = "linux")]
    {
        match crate::collectors::run_command("dmidecode", &["-t", "17"]) {
            Ok(text) => {
                return MemoryLayout {
                    memory_type: memory_type_from_dmidecode(&text),
                    modules: parse_memory_modules(&text),
                }
            }
            Err(err) => debug!(error = %err, "dmidecode недоступен, тип памяти неизвестен"),
        }
    }
    #[cfg(not(target_os = "linux"))]
    debug!("тип памяти определяется только на Linux");

    MemoryLayout::default()
}

pub fn memory_type_from_dmidecode(text: &str) -> String {
    DDR_GENERATIONS
        .iter()
        .find(|ddr| text.contains(*ddr))
        .map(|ddr| ddr.to_string())
        .unwrap_or_else(|| UNKNOWN_MEMORY_TYPE.to_string())
}

pub fn parse_memory_modules(text: &str) -> Vec<MemoryModule> {
    let mut modules = Vec::new();
    let mut current: Option<MemoryModule> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed == "Memory Device" {
            if let Some(module) = current.take() {
                push_installed(&mut modules, module);
            }
            current = Some(MemoryModule::default());
            continue;
        }
        let Some(module) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Size" => module.size = value,
            "Type" => module.memory_type = value,
            "Speed" => module.speed = value,
            "Manufacturer" => module.manufacturer = value,
            _ => {}
        }
    }
    if let Some(module) = current {
        push_installed(&mut modules, module);
    }

    modules
}

fn push_installed(modules: &mut Vec<MemoryModule>, module: MemoryModule) {
    if module.size.is_empty() || module.size.contains("No Module Installed") {
        return;
    }
    modules.push(module);
}

fn current_user(system: &System) -> (String, String, String) {
    let env_name = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();

    let Ok(pid) = sysinfo::get_current_pid() else {
        return (env_name, String::new(), String::new());
    };
    let user = system
        .process(pid)
        .and_then(|p| p.user_id())
        .and_then(|uid| system.get_user_by_id(uid));

    match user {
        Some(user) => {
            let (uid, gid) = user_ids(user);
            (user.name().to_string(), uid, gid)
        }
        None => {
            debug!(pid = pid.as_u32(), "владелец процесса не найден, берём имя из окружения");
            (env_name, String::new(), String::new())
        }
    }
}

#[cfg(unix)]
fn user_ids(user: &sysinfo::User) -> (String, String) {
    let uid: u32 = **user.id();
    let gid: u32 = *user.group_id();
    (uid.to_string(), gid.to_string())
}

#[cfg(not(unix))]
fn user_ids(_user: &sysinfo::User) -> (String, String) {
    (String::new(), String::new())
}

fn home_directory() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DMIDECODE_SAMPLE: &str = "\
# dmidecode 3.3
Handle 0x0040, DMI type 17, 84 bytes
Memory Device
\tArray Handle: 0x003F
\tSize: 16 GB
\tType: DDR4
\tSpeed: 3200 MT/s
\tManufacturer: Samsung

Handle 0x0041, DMI type 17, 84 bytes
Memory Device
\tArray Handle: 0x003F
\tSize: No Module Installed
\tType: Unknown
\tSpeed: Unknown
\tManufacturer: Not Specified

Handle 0x0042, DMI type 17, 84 bytes
Memory Device
\tSize: 16 GB
\tType: DDR4
\tSpeed: 3200 MT/s
\tManufacturer: Kingston
";

    #[test]
    fn memory_modules_skip_empty_slots() {
        let modules = parse_memory_modules(DMIDECODE_SAMPLE);
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].manufacturer, "Samsung");
        assert_eq!(modules[0].size, "16 GB");
        assert_eq!(modules[1].speed, "3200 MT/s");
    }

    #[test]
    fn memory_type_detects_ddr_generation() {
        assert_eq!(memory_type_from_dmidecode(DMIDECODE_SAMPLE), "DDR4");
        assert_eq!(memory_type_from_dmidecode("Type: DDR3 Synchronous"), "DDR3");
        assert_eq!(memory_type_from_dmidecode("permission denied"), "Unknown");
    }

    #[test]
    fn collect_memory_uses_layout_type() {
        let mut system = System::new();
        system.refresh_memory();
        let layout = MemoryLayout {
            memory_type: "DDR5".to_string(),
            modules: Vec::new(),
        };
        if let Ok(memory) = collect_memory(&system, &layout) {
            assert_eq!(memory.memory_type, "DDR5");
            assert_eq!(memory.total_bytes, memory.used_bytes + memory.free_bytes);
            assert!((0.0..=100.0).contains(&memory.usage_percent));
        }
    }

    #[test]
    fn collect_hardware_reports_failures_separately() {
        let mut system = System::new();
        let (snapshot, errors) = collect_hardware(&mut system, &MemoryLayout::default());
        let failed: Vec<&str> = errors.iter().map(|(source, _)| *source).collect();
        assert_eq!(snapshot.host.is_none(), failed.contains(&"host"));
        assert_eq!(snapshot.cpu.is_none(), failed.contains(&"cpu"));
        assert!(snapshot.disks.is_some());
        assert!(snapshot.network.is_some());
    }
}
