//! Platform implementations of the capability traits.
//!
//! - [`StdFilesystem`]: real std::fs operations
//! - [`StaticInputMethods`]: a fixed enabled list (config driven)
//! - [`CommandInputMethods`]: enabled list read from a host command
//! - [`GrantedPermissions`]: hosts without a runtime permission model
//! - [`HeadlessSurfaces`]: always returns UNSUPPORTED
//! - [`DirectoryFactoryReset`] / [`UnsupportedFactoryReset`]

use crate::traits::*;
use std::path::{Path, PathBuf};

// ===========================================================================
// Filesystem – wraps std::fs
// ===========================================================================

pub struct StdFilesystem;

impl FilesystemOps for StdFilesystem {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CapError::PermissionDenied(format!("cannot read {}: {}", path.display(), e))
            }
            _ => CapError::Io(e),
        })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CapError::PermissionDenied(format!("cannot write {}: {}", path.display(), e))
            }
            _ => CapError::Io(e),
        })
    }

    fn copy_file(&self, from: &Path, to: &Path) -> CapResult<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to).map(|_| ()).map_err(CapError::Io)
    }

    fn list_dir(&self, path: &Path) -> CapResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> CapResult<()> {
        std::fs::create_dir_all(path).map_err(CapError::Io)
    }

    fn remove_dir_all(&self, path: &Path) -> CapResult<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(CapError::Io),
        }
    }

    fn remove_file(&self, path: &Path) -> CapResult<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(CapError::Io),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> Option<std::time::SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

// ===========================================================================
// Input methods
// ===========================================================================

/// Enabled list fixed at construction. Picker and settings are not available.
#[derive(Default)]
pub struct StaticInputMethods {
    enabled: Vec<InputMethodInfo>,
}

impl StaticInputMethods {
    pub fn new(enabled: Vec<InputMethodInfo>) -> Self {
        Self { enabled }
    }
}

impl InputMethodOps for StaticInputMethods {
    fn enabled_input_methods(&self) -> CapResult<Vec<InputMethodInfo>> {
        Ok(self.enabled.clone())
    }

    fn show_input_method_picker(&self) -> CapResult<()> {
        Err(CapError::Unsupported(
            "input method picker unavailable on this host".into(),
        ))
    }

    fn open_input_method_settings(&self) -> CapResult<()> {
        Err(CapError::Unsupported(
            "input method settings unavailable on this host".into(),
        ))
    }
}

/// Host integration through external commands.
///
/// `list` prints one enabled input method per line, either `id` or
/// `id<TAB>package`; a bare id is also its package. `picker` and `settings`
/// are run as-is.
pub struct CommandInputMethods {
    pub list: Vec<String>,
    pub picker: Option<Vec<String>>,
    pub settings: Option<Vec<String>>,
}

impl InputMethodOps for CommandInputMethods {
    fn enabled_input_methods(&self) -> CapResult<Vec<InputMethodInfo>> {
        let (cmd, args) = split_command(&self.list)?;
        let out = run_cmd(cmd, &args)?;
        Ok(parse_input_method_list(&out))
    }

    fn show_input_method_picker(&self) -> CapResult<()> {
        let argv = self
            .picker
            .as_ref()
            .ok_or_else(|| CapError::Unsupported("no picker command configured".into()))?;
        let (cmd, args) = split_command(argv)?;
        run_cmd(cmd, &args).map(|_| ())
    }

    fn open_input_method_settings(&self) -> CapResult<()> {
        let argv = self
            .settings
            .as_ref()
            .ok_or_else(|| CapError::Unsupported("no settings command configured".into()))?;
        let (cmd, args) = split_command(argv)?;
        run_cmd(cmd, &args).map(|_| ())
    }
}

fn parse_input_method_list(out: &str) -> Vec<InputMethodInfo> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((id, package)) => InputMethodInfo {
                id: id.trim().to_string(),
                package: package.trim().to_string(),
            },
            None => InputMethodInfo {
                id: line.to_string(),
                package: line.to_string(),
            },
        })
        .collect()
}

fn split_command(argv: &[String]) -> CapResult<(&str, Vec<&str>)> {
    let (cmd, rest) = argv
        .split_first()
        .ok_or_else(|| CapError::Unsupported("empty command".into()))?;
    Ok((cmd.as_str(), rest.iter().map(String::as_str).collect()))
}

fn run_cmd(cmd: &str, args: &[&str]) -> CapResult<String> {
    let output = std::process::Command::new(cmd)
        .args(args)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CapError::DependencyMissing(format!("{} not found", cmd))
            } else {
                CapError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(CapError::Other(format!(
            "{} exited with {}",
            cmd, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

// ===========================================================================
// Permissions
// ===========================================================================

/// Desktop hosts grant file access up front.
pub struct GrantedPermissions;

impl PermissionOps for GrantedPermissions {
    fn storage_permission_required(&self) -> bool {
        false
    }

    fn request_storage_permission(&self) -> CapResult<()> {
        Ok(())
    }
}

// ===========================================================================
// Headless surfaces – return UNSUPPORTED cleanly
// ===========================================================================

/// Surfaces for headless environments. Never panics, never blocks.
pub struct HeadlessSurfaces;

impl SurfaceOps for HeadlessSurfaces {
    fn pick_color_scheme(&self, _schemes: &[ColorScheme]) -> CapResult<Option<String>> {
        Err(CapError::Unsupported(
            "color picker unavailable in headless environment".into(),
        ))
    }

    fn pick_schemas(&self, _schemas: &[SchemaItem]) -> CapResult<Option<Vec<String>>> {
        Err(CapError::Unsupported(
            "schema picker unavailable in headless environment".into(),
        ))
    }

    fn confirm_factory_reset(&self) -> CapResult<bool> {
        Err(CapError::Unsupported(
            "confirmation unavailable in headless environment".into(),
        ))
    }

    fn show_licensing(&self, _content: &str) -> CapResult<()> {
        Err(CapError::Unsupported(
            "licensing display unavailable in headless environment".into(),
        ))
    }
}

// ===========================================================================
// Factory reset
// ===========================================================================

pub struct UnsupportedFactoryReset;

impl FactoryReset for UnsupportedFactoryReset {
    fn restore_factory(&self) -> CapResult<()> {
        Err(CapError::Unsupported("no factory configuration available".into()))
    }
}

/// Copies every file of a factory directory over the user data directory.
/// Files the user added are left alone.
pub struct DirectoryFactoryReset {
    fs: Box<dyn FilesystemOps>,
    factory_dir: PathBuf,
    user_dir: PathBuf,
}

impl DirectoryFactoryReset {
    pub fn new(fs: Box<dyn FilesystemOps>, factory_dir: PathBuf, user_dir: PathBuf) -> Self {
        Self {
            fs,
            factory_dir,
            user_dir,
        }
    }
}

impl FactoryReset for DirectoryFactoryReset {
    fn restore_factory(&self) -> CapResult<()> {
        if !self.fs.exists(&self.factory_dir) {
            return Err(CapError::Unsupported(format!(
                "factory directory {} does not exist",
                self.factory_dir.display()
            )));
        }
        for src in self.fs.list_dir(&self.factory_dir)? {
            let Some(name) = src.file_name() else { continue };
            if self.fs.is_dir(&src) {
                continue;
            }
            self.fs.copy_file(&src, &self.user_dir.join(name))?;
        }
        tracing::info!(from = %self.factory_dir.display(), "factory configuration restored");
        Ok(())
    }
}
