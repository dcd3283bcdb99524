use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults shipped inside the binary; every other source overrides them.
const DEFAULT_CONFIG: &str = include_str!("../imectl.yaml");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImectlConfig {
    pub package_identity: String,
    pub data: DataConfig,
    pub input_methods: InputMethodsConfig,
    pub surfaces: SurfacesConfig,
    pub restart: RestartConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataConfig {
    pub user_dir: PathBuf,
    #[serde(default)]
    pub shared_dir: Option<PathBuf>,
    pub sync_dir: PathBuf,
    pub installation_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InputMethodsConfig {
    /// Package identities treated as enabled when no list command is set.
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub list_command: Option<Vec<String>>,
    #[serde(default)]
    pub picker_command: Option<Vec<String>>,
    #[serde(default)]
    pub settings_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SurfacesConfig {
    pub interactive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RestartConfig {
    pub exit_code: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResetConfig {
    #[serde(default)]
    pub factory_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub json: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

/// Load configuration. Later sources win:
/// built-in defaults, `imectl.yaml`, `production_config.yaml`,
/// `.imectl.yaml`, the `--config` file, then `IMECTL__*` variables.
pub fn load_config(explicit: Option<&Path>) -> Result<ImectlConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml))
        .add_source(File::with_name("imectl.yaml").required(false))
        .add_source(File::with_name("production_config.yaml").required(false))
        .add_source(File::with_name(".imectl.yaml").required(false));

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder
        // Map nested env vars like IMECTL__SURFACES__INTERACTIVE=false
        .add_source(Environment::with_prefix("IMECTL").separator("__"))
        .build()?
        .try_deserialize()
}
