use crate::collectors::{CollectError, InstalledSoftware};
use std::collections::HashMap;
use std::time::{Duration, Instant};
#[cfg(target_os = "linux")]
use tracing::debug;

#[cfg(target_os = "windows")]
const UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

/// Last enumeration result, reused until `ttl` passes.
#[derive(Debug)]
pub struct SoftwareCache {
    ttl: Duration,
    items: Vec<InstalledSoftware>,
    fetched_at: Option<Instant>,
}

impl SoftwareCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Vec::new(),
            fetched_at: None,
        }
    }

    pub fn fresh(&self, now: Instant) -> Option<&[InstalledSoftware]> {
        let fetched_at = self.fetched_at?;
        if now.saturating_duration_since(fetched_at) < self.ttl {
            Some(&self.items)
        } else {
            None
        }
    }

    pub fn store(&mut self, items: Vec<InstalledSoftware>, now: Instant) {
        self.items = items;
        self.fetched_at = Some(now);
    }
}

/// Enumerates installed software from every source the platform offers, merged and deduplicated.
/// Blocking: spawns package manager or registry queries.
pub fn collect_installed_software() -> Result<Vec<InstalledSoftware>, CollectError> {
    enumerate_platform().map(dedupe_software)
}

#[cfg(target_os = "windows")]
fn enumerate_platform() -> Result<Vec<InstalledSoftware>, CollectError> {
    let mut all = Vec::new();
    let mut last_err = None;
    for key in UNINSTALL_KEYS {
        match crate::collectors::run_command("reg", &["query", key, "/s"]) {
            Ok(text) => all.extend(parse_reg_query_output(&text)),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) if all.is_empty() => Err(err),
        _ => Ok(all),
    }
}

#[cfg(target_os = "linux")]
fn enumerate_platform() -> Result<Vec<InstalledSoftware>, CollectError> {
    let mut all = Vec::new();
    let mut sources = 0_usize;

    if std::path::Path::new("/var/lib/dpkg/status").exists() {
        match crate::collectors::run_command(
            "dpkg-query",
            &["-W", "-f=${Package}\t${Version}\t${Maintainer}\t${Install-Date}\n"],
        ) {
            Ok(text) => {
                sources += 1;
                all.extend(parse_dpkg_output(&text));
            }
            Err(err) => debug!(error = %err, "dpkg-query недоступен"),
        }
    }
    match crate::collectors::run_command("snap", &["list"]) {
        Ok(text) => {
            sources += 1;
            all.extend(parse_snap_output(&text));
        }
        Err(err) => debug!(error = %err, "snap недоступен"),
    }
    match crate::collectors::run_command(
        "flatpak",
        &["list", "--columns=application,origin,version,installation"],
    ) {
        Ok(text) => {
            sources += 1;
            all.extend(parse_flatpak_output(&text));
        }
        Err(err) => debug!(error = %err, "flatpak недоступен"),
    }

    if sources == 0 {
        return Err(CollectError::Unavailable("package managers"));
    }
    Ok(all)
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn enumerate_platform() -> Result<Vec<InstalledSoftware>, CollectError> {
    Err(CollectError::Unsupported("installed software"))
}

/// Merges entries sharing a lowercased (name, version, publisher) key, keeping the most complete
/// one. Nameless entries are dropped; first-seen order is preserved.
pub fn dedupe_software(items: Vec<InstalledSoftware>) -> Vec<InstalledSoftware> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<InstalledSoftware> = Vec::new();

    for item in items {
        if item.name.trim().is_empty() {
            continue;
        }
        let key = software_key(&item);
        match index.get(&key) {
            Some(&pos) => {
                if completeness(&item) > completeness(&out[pos]) {
                    out[pos] = item;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(item);
            }
        }
    }

    out
}

pub fn software_key(item: &InstalledSoftware) -> String {
    format!(
        "{}|{}|{}",
        item.name.trim().to_lowercase(),
        item.version.trim().to_lowercase(),
        item.publisher.trim().to_lowercase()
    )
}

fn completeness(item: &InstalledSoftware) -> usize {
    [&item.name, &item.version, &item.publisher, &item.installed]
        .iter()
        .filter(|v| !v.trim().is_empty())
        .count()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub fn parse_dpkg_output(text: &str) -> Vec<InstalledSoftware> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(InstalledSoftware {
                name: name.to_string(),
                version: parts.next().unwrap_or_default().trim().to_string(),
                publisher: parts.next().unwrap_or_default().trim().to_string(),
                installed: normalize_install_date(parts.next().unwrap_or_default()),
            })
        })
        .collect()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub fn parse_snap_output(text: &str) -> Vec<InstalledSoftware> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(InstalledSoftware {
                name: fields[0].to_string(),
                version: fields[1].to_string(),
                publisher: fields[4]
                    .trim_end_matches(&['✓', '*', '✪'][..])
                    .to_string(),
                installed: "snap".to_string(),
            })
        })
        .collect()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub fn parse_flatpak_output(text: &str) -> Vec<InstalledSoftware> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 3 || fields[0].is_empty() {
                return None;
            }
            Some(InstalledSoftware {
                name: fields[0].to_string(),
                version: fields[2].to_string(),
                publisher: fields[1].to_string(),
                installed: "flatpak".to_string(),
            })
        })
        .collect()
}

/// Parses `reg query <Uninstall key> /s` output into one entry per subkey with a `DisplayName`.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub fn parse_reg_query_output(text: &str) -> Vec<InstalledSoftware> {
    let mut out = Vec::new();
    let mut current: Option<InstalledSoftware> = None;

    for line in text.lines() {
        if line.starts_with("HKEY_") {
            if let Some(item) = current.take() {
                out.push(item);
            }
            current = Some(InstalledSoftware::default());
            continue;
        }
        let (Some(item), Some((name, value))) = (current.as_mut(), split_reg_value(line)) else {
            continue;
        };
        match name {
            "DisplayName" => item.name = value.to_string(),
            "DisplayVersion" => item.version = value.to_string(),
            "Publisher" => item.publisher = value.to_string(),
            "InstallDate" => item.installed = normalize_install_date(value),
            _ => {}
        }
    }
    if let Some(item) = current {
        out.push(item);
    }

    out.retain(|item| !item.name.trim().is_empty());
    out
}

fn split_reg_value(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    let type_at = trimmed.find(" REG_")?;
    let name = trimmed[..type_at].trim();
    let rest = trimmed[type_at..].trim_start();
    let value = rest
        .split_once(char::is_whitespace)
        .map(|(_, v)| v.trim())
        .unwrap_or_default();
    Some((name, value))
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else is kept as is.
pub fn normalize_install_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8])
    } else {
        raw.to_string()
    }
}
