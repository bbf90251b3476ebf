use crate::update::UpdateError;
use std::path::{Path, PathBuf};
use tracing::info;

/// How the running executable gets replaced on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Make the new file executable and rename it over the old one.
    PosixRename,
    /// The running image is locked, so a batch script does the swap after we exit.
    WindowsScript,
}

impl ReplaceStrategy {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::WindowsScript
        } else {
            Self::PosixRename
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The new binary is already at the target path.
    Replaced,
    /// A detached script will swap and relaunch once this process is gone.
    Scheduled { script: PathBuf },
}

/// Puts `new_binary` in place of `target` using the platform strategy.
pub fn replace_running_executable(
    new_binary: &Path,
    target: &Path,
) -> Result<ReplaceOutcome, UpdateError> {
    replace_with(ReplaceStrategy::current(), new_binary, target)
}

pub fn replace_with(
    strategy: ReplaceStrategy,
    new_binary: &Path,
    target: &Path,
) -> Result<ReplaceOutcome, UpdateError> {
    if !new_binary.is_file() {
        return Err(UpdateError::Verify(format!(
            "файл обновления {} не найден",
            new_binary.display()
        )));
    }
    match strategy {
        ReplaceStrategy::PosixRename => {
            posix_replace(new_binary, target)?;
            Ok(ReplaceOutcome::Replaced)
        }
        ReplaceStrategy::WindowsScript => {
            let script = schedule_script_replace(new_binary, target)?;
            Ok(ReplaceOutcome::Scheduled { script })
        }
    }
}

fn posix_replace(new_binary: &Path, target: &Path) -> Result<(), UpdateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(new_binary, std::fs::Permissions::from_mode(0o755))
            .map_err(|source| UpdateError::io(new_binary, source))?;
    }
    std::fs::rename(new_binary, target).map_err(|source| UpdateError::io(target, source))?;
    info!(target = %target.display(), "исполняемый файл заменён");
    Ok(())
}

fn schedule_script_replace(new_binary: &Path, target: &Path) -> Result<PathBuf, UpdateError> {
    let exe_name = image_name(target);
    if exe_name.is_empty() {
        return Err(UpdateError::Install(format!(
            "путь {} без имени файла",
            target.display()
        )));
    }
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let script = dir.join(format!("update_{exe_name}.bat"));

    std::fs::write(&script, windows_update_script(target, new_binary))
        .map_err(|source| UpdateError::io(&script, source))?;
    spawn_hidden_script(&script)?;
    info!(script = %script.display(), "скрипт обновления запущен");
    Ok(script)
}

#[cfg(windows)]
fn spawn_hidden_script(script: &Path) -> Result<(), UpdateError> {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let system_root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
    let cmd = Path::new(&system_root).join("System32").join("cmd.exe");
    std::process::Command::new(cmd)
        .arg("/C")
        .arg(script)
        .creation_flags(CREATE_NO_WINDOW)
        .spawn()
        .map_err(|source| UpdateError::io(script, source))?;
    Ok(())
}

#[cfg(not(windows))]
fn spawn_hidden_script(script: &Path) -> Result<(), UpdateError> {
    Err(UpdateError::Install(format!(
        "скрипт {} можно запустить только в Windows",
        script.display()
    )))
}

/// Batch script that waits for the old process, swaps the files and starts the new binary.
pub fn windows_update_script(exe_path: &Path, new_binary: &Path) -> String {
    let exe = exe_path.display();
    let image = image_name(exe_path);
    let new = new_binary.display();
    format!(
        "@echo off\r\n\
         ping -n 3 127.0.0.1 >nul\r\n\
         taskkill /F /IM \"{image}\" >nul 2>&1\r\n\
         if exist \"{exe}\" (\r\n\
         \x20   del /F /Q \"{exe}\" >nul 2>&1\r\n\
         \x20   if exist \"{exe}\" exit /B 1\r\n\
         )\r\n\
         move /Y \"{new}\" \"{exe}\" >nul 2>&1\r\n\
         if not exist \"{exe}\" exit /B 2\r\n\
         start \"\" \"{exe}\"\r\n\
         del \"%~f0\"\r\n"
    )
}

/// Starts the freshly installed binary with the current arguments.
pub fn relaunch(exe: &Path) -> Result<(), UpdateError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    info!(exe = %exe.display(), "перезапуск после обновления");
    std::process::Command::new(exe)
        .args(&args)
        .spawn()
        .map_err(|source| UpdateError::io(exe, source))?;
    Ok(())
}

/// Last path component, splitting on both separators so Windows paths parse anywhere.
fn image_name(path: &Path) -> String {
    path.to_string_lossy()
        .rsplit(&['\\', '/'][..])
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_kills_swaps_and_restarts() {
        let script = windows_update_script(
            Path::new(r"C:\Apps\inventoryd.exe"),
            Path::new(r"C:\Apps\inventoryd-windows-amd64.exe"),
        );
        assert!(script.starts_with("@echo off"));
        assert!(script.contains(r#"taskkill /F /IM "inventoryd.exe""#));
        assert!(script.contains(r#"move /Y "C:\Apps\inventoryd-windows-amd64.exe" "C:\Apps\inventoryd.exe""#));
        assert!(script.contains(r#"start "" "C:\Apps\inventoryd.exe""#));

        let kill = script.find("taskkill").unwrap();
        let delete = script.find("del /F /Q").unwrap();
        let swap = script.find("move /Y").unwrap();
        assert!(kill < delete && delete < swap);
    }

    #[test]
    fn missing_download_is_rejected_before_touching_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("inventoryd");
        std::fs::write(&target, b"old").unwrap();

        let err = replace_with(
            ReplaceStrategy::PosixRename,
            &dir.path().join("absent"),
            &target,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::Verify(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }

    #[cfg(unix)]
    #[test]
    fn posix_rename_replaces_and_marks_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("inventoryd");
        let new_binary = dir.path().join("inventoryd-linux-amd64");
        std::fs::write(&target, b"old").unwrap();
        std::fs::write(&new_binary, b"new").unwrap();

        let outcome = replace_with(ReplaceStrategy::PosixRename, &new_binary, &target).unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!new_binary.exists());
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn strategy_matches_platform() {
        let expected = if cfg!(windows) {
            ReplaceStrategy::WindowsScript
        } else {
            ReplaceStrategy::PosixRename
        };
        assert_eq!(ReplaceStrategy::current(), expected);
    }
}
