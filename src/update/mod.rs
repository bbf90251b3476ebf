//! Self-update: fetch the release descriptor, download the asset built for this platform and
//! swap it in for the running executable.
//!
//! Every step either succeeds or aborts the attempt with the old binary left in place; a
//! partial download is removed.

pub mod install;

use crate::config::UpdateConfig;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub use install::{relaunch, replace_running_executable, ReplaceOutcome};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const RELEASE_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("ошибка HTTP-запроса: {0}")]
    Http(#[from] reqwest::Error),
    #[error("неожиданный статус ответа: {0}")]
    Status(u16),
    #[error("в релизе {tag} нет сборки для платформы {platform}")]
    NoAsset { tag: String, platform: String },
    #[error("ошибка файловой системы ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("проверка загрузки не пройдена: {0}")]
    Verify(String),
    #[error("не удалось установить обновление: {0}")]
    Install(String),
}

impl UpdateError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseDescriptor {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub version: String,
    pub asset: ReleaseAsset,
    pub download_path: PathBuf,
    pub target_exe: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate { latest: String },
    Available(UpdatePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate { latest: String },
    Available { version: String, asset: String },
    Installed { version: String, replace: ReplaceOutcome },
}

pub async fn fetch_latest_release(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<ReleaseDescriptor, UpdateError> {
    let response = client
        .get(url)
        .header(ACCEPT, RELEASE_ACCEPT)
        .timeout(timeout)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(UpdateError::Status(response.status().as_u16()));
    }
    Ok(response.json::<ReleaseDescriptor>().await?)
}

/// Numeric components of a version tag, `v` prefix and pre-release suffix ignored.
pub fn parse_version(tag: &str) -> Option<Vec<u64>> {
    let core = tag.trim().trim_start_matches(['v', 'V']);
    let core = core.split(['-', '+']).next().unwrap_or_default();
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// Whether `latest` should replace `current`. Tags that do not parse as versions are compared
/// as plain strings, so any difference counts as newer.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(mut l), Some(mut c)) => {
            let len = l.len().max(c.len());
            l.resize(len, 0);
            c.resize(len, 0);
            l > c
        }
        _ => latest.trim().trim_start_matches('v') != current.trim().trim_start_matches('v'),
    }
}

pub fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "darwin",
        "linux" => "linux",
        other => other,
    }
}

/// First asset whose lowercased name contains the platform tag.
pub fn select_asset<'a>(release: &'a ReleaseDescriptor, platform: &str) -> Option<&'a ReleaseAsset> {
    let platform = platform.to_lowercase();
    release
        .assets
        .iter()
        .find(|asset| asset.name.to_lowercase().contains(&platform))
}

/// Decides what to do with a release without touching the file system.
pub fn plan_update(
    release: &ReleaseDescriptor,
    current_version: &str,
    platform: &str,
    target_exe: &Path,
) -> Result<UpdateCheck, UpdateError> {
    if !is_newer(&release.tag_name, current_version) {
        return Ok(UpdateCheck::UpToDate {
            latest: release.tag_name.clone(),
        });
    }
    let asset = select_asset(release, platform).ok_or_else(|| UpdateError::NoAsset {
        tag: release.tag_name.clone(),
        platform: platform.to_string(),
    })?;
    Ok(UpdateCheck::Available(UpdatePlan {
        version: release.tag_name.trim_start_matches('v').to_string(),
        asset: asset.clone(),
        download_path: download_path_for(&asset.name, target_exe)?,
        target_exe: target_exe.to_path_buf(),
    }))
}

/// Sibling of `target_exe` named after the last component of the asset name. Never the
/// executable itself.
fn download_path_for(asset_name: &str, target_exe: &Path) -> Result<PathBuf, UpdateError> {
    let file_name = asset_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| UpdateError::Verify(format!("некорректное имя сборки '{asset_name}'")))?;
    let dir = target_exe.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(file_name);
    if path == target_exe {
        return Ok(dir.join(format!("{file_name}.download")));
    }
    Ok(path)
}

/// Streams the asset to `plan.download_path`. The file is removed if anything fails.
pub async fn download_asset(
    client: &Client,
    plan: &UpdatePlan,
    timeout: Duration,
) -> Result<u64, UpdateError> {
    let result = stream_to_file(client, &plan.asset.browser_download_url, &plan.download_path, timeout).await;
    if result.is_err() {
        remove_download(&plan.download_path);
    }
    result
}

fn remove_download(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %err, path = %path.display(), "не удалось удалить неполную загрузку");
        }
    }
}

async fn stream_to_file(
    client: &Client,
    url: &str,
    path: &Path,
    timeout: Duration,
) -> Result<u64, UpdateError> {
    let mut response = client.get(url).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(UpdateError::Status(response.status().as_u16()));
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| UpdateError::io(path, source))?;
    let mut written = 0_u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|source| UpdateError::io(path, source))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|source| UpdateError::io(path, source))?;
    Ok(written)
}

/// Existence and size checks only; `expected_size` of 0 means the descriptor did not say.
pub fn verify_download(path: &Path, expected_size: u64) -> Result<u64, UpdateError> {
    let meta = std::fs::metadata(path).map_err(|source| UpdateError::io(path, source))?;
    let size = meta.len();
    if !meta.is_file() || size == 0 {
        return Err(UpdateError::Verify(format!("{} пуст", path.display())));
    }
    if expected_size > 0 && size != expected_size {
        return Err(UpdateError::Verify(format!(
            "размер {size} байт, ожидалось {expected_size}"
        )));
    }
    Ok(size)
}

/// Full update pass: `target` is the executable being replaced.
pub async fn run_update(
    client: &Client,
    cfg: &UpdateConfig,
    session_path: &Path,
    target: &Path,
    check_only: bool,
) -> Result<UpdateOutcome, UpdateError> {
    let timeout = Duration::from_secs(cfg.timeout_secs);

    info!(url = %cfg.release_url, "проверка наличия обновления");
    let release = fetch_latest_release(client, &cfg.release_url, timeout).await?;

    let plan = match plan_update(&release, CURRENT_VERSION, platform_tag(), target)? {
        UpdateCheck::UpToDate { latest } => {
            info!(current = CURRENT_VERSION, latest = %latest, "установлена последняя версия");
            return Ok(UpdateOutcome::UpToDate { latest });
        }
        UpdateCheck::Available(plan) => plan,
    };
    info!(version = %plan.version, asset = %plan.asset.name, "найдено обновление");
    if check_only {
        return Ok(UpdateOutcome::Available {
            version: plan.version,
            asset: plan.asset.name,
        });
    }

    info!(path = %plan.download_path.display(), "загрузка обновления");
    download_asset(client, &plan, timeout).await?;
    if let Err(err) = verify_download(&plan.download_path, plan.asset.size) {
        remove_download(&plan.download_path);
        return Err(err);
    }

    if let Err(err) = crate::session::Session::clear(session_path) {
        warn!(error = %err, "не удалось удалить файл сессии");
    }

    info!("установка обновления");
    let replace = match replace_running_executable(&plan.download_path, &plan.target_exe) {
        Ok(outcome) => outcome,
        Err(err) => {
            remove_download(&plan.download_path);
            return Err(err);
        }
    };
    Ok(UpdateOutcome::Installed {
        version: plan.version,
        replace,
    })
}
