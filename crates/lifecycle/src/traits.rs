use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result type for trait operations that may be unsupported.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Native engine
// ---------------------------------------------------------------------------

/// A schema known to the engine, with its current selection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub selected: bool,
}

/// A preset color scheme, with its current selection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub selected: bool,
}

/// Raw outcome of a native integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFindings {
    #[serde(default)]
    pub issues: Vec<String>,
}

/// The engine library itself. All calls are synchronous and may block.
///
/// Implementations never terminate the process; the restart that follows a
/// deploy or a self-check is decided by the dispatcher's caller.
pub trait NativeEngine: Send {
    fn destroy(&mut self);

    /// Load the engine. `full_rebuild` forces every compiled artifact to be
    /// regenerated from source.
    fn initialize(&mut self, full_rebuild: bool) -> CapResult<()>;

    fn run_self_check(&mut self, schedule_restart: bool) -> CapResult<CheckFindings>;

    /// Partial failures must be collapsed to `false`.
    fn sync_user_data(&mut self) -> bool;

    /// Redeploy the secondary conversion subsystem only.
    fn deploy_conversion(&mut self) -> bool;

    fn engine_version(&self) -> String;
    fn conversion_library_version(&self) -> String;

    fn color_schemes(&self) -> CapResult<Vec<ColorScheme>>;
    fn select_color_scheme(&mut self, id: &str) -> CapResult<()>;
    fn schemas(&self) -> CapResult<Vec<SchemaItem>>;
    fn select_schemas(&mut self, ids: &[String]) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Host input-method service
// ---------------------------------------------------------------------------

/// One entry of the host's enabled input-method list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMethodInfo {
    pub id: String,
    pub package: String,
}

pub trait InputMethodOps: Send + Sync {
    /// The live list; implementations must not cache it.
    fn enabled_input_methods(&self) -> CapResult<Vec<InputMethodInfo>>;
    fn show_input_method_picker(&self) -> CapResult<()>;
    fn open_input_method_settings(&self) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub trait PermissionOps: Send + Sync {
    fn storage_permission_required(&self) -> bool;
    fn request_storage_permission(&self) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Configuration surfaces
// ---------------------------------------------------------------------------

/// Screens owned by the configuration UI. Each returns the user's choice,
/// `None` meaning the surface was dismissed.
pub trait SurfaceOps: Send + Sync {
    fn pick_color_scheme(&self, schemes: &[ColorScheme]) -> CapResult<Option<String>>;
    fn pick_schemas(&self, schemas: &[SchemaItem]) -> CapResult<Option<Vec<String>>>;
    fn confirm_factory_reset(&self) -> CapResult<bool>;
    fn show_licensing(&self, content: &str) -> CapResult<()>;
}

/// Restores the factory configuration once the user confirmed it.
pub trait FactoryReset: Send + Sync {
    fn restore_factory(&self) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

pub trait FilesystemOps: Send + Sync {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()>;
    fn copy_file(&self, from: &Path, to: &Path) -> CapResult<()>;
    fn list_dir(&self, path: &Path) -> CapResult<Vec<PathBuf>>;
    fn create_dir_all(&self, path: &Path) -> CapResult<()>;
    fn remove_dir_all(&self, path: &Path) -> CapResult<()>;
    fn remove_file(&self, path: &Path) -> CapResult<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn modified(&self, path: &Path) -> Option<std::time::SystemTime>;
}
