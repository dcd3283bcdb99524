//! Filesystem-backed engine.
//!
//! Drives the on-disk side of an engine installation: YAML sources in the
//! user (and optionally shared) data directory are "compiled" into `build/`,
//! user dictionaries are synced per installation, conversion data is deployed
//! into `build/opencc/`. It carries no linguistic logic.

use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENGINE_VERSION: &str = concat!("fs-engine ", env!("CARGO_PKG_VERSION"));
pub const CONVERSION_VERSION: &str = concat!("fs-opencc ", env!("CARGO_PKG_VERSION"));

const BUILD_DIR: &str = "build";
const STAMP_FILE: &str = ".stamp";
const SELECTION_FILE: &str = "selection.yaml";
const COLORS_FILE: &str = "colors.yaml";
const OPENCC_DIR: &str = "opencc";
const USERDB_SUFFIX: &str = ".userdb.txt";
const SCHEMA_SUFFIX: &str = ".schema.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDirs {
    pub user_dir: PathBuf,
    #[serde(default)]
    pub shared_dir: Option<PathBuf>,
    pub sync_dir: PathBuf,
    pub installation_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Selection {
    #[serde(default)]
    schemas: Vec<String>,
    #[serde(default)]
    color_scheme: Option<String>,
}

pub struct FilesystemEngine {
    fs: Box<dyn FilesystemOps>,
    dirs: EngineDirs,
    loaded: bool,
}

impl FilesystemEngine {
    pub fn new(fs: Box<dyn FilesystemOps>, dirs: EngineDirs) -> Self {
        Self {
            fs,
            dirs,
            loaded: false,
        }
    }

    fn build_dir(&self) -> PathBuf {
        self.dirs.user_dir.join(BUILD_DIR)
    }

    /// Every YAML source, keyed by file name; user files shadow shared ones.
    fn sources(&self) -> CapResult<BTreeMap<String, PathBuf>> {
        let mut out = BTreeMap::new();
        let dirs = self.dirs.shared_dir.iter().chain(std::iter::once(&self.dirs.user_dir));
        for dir in dirs {
            if !self.fs.exists(dir) {
                continue;
            }
            for path in self.fs.list_dir(dir)? {
                let Some(name) = file_name(&path) else { continue };
                if name.ends_with(".yaml") && name != SELECTION_FILE && !self.fs.is_dir(&path) {
                    out.insert(name, path);
                }
            }
        }
        Ok(out)
    }

    fn is_stale(&self, source: &Path, artifact: &Path) -> bool {
        match (self.fs.modified(source), self.fs.modified(artifact)) {
            (Some(src), Some(art)) => src > art,
            _ => true,
        }
    }

    fn compile(&self, full_rebuild: bool) -> CapResult<usize> {
        let build = self.build_dir();
        if full_rebuild {
            self.clear_build(&build)?;
        }
        self.fs.create_dir_all(&build)?;

        let mut compiled = 0;
        for (name, src) in self.sources()? {
            let artifact = build.join(&name);
            if full_rebuild || self.is_stale(&src, &artifact) {
                self.fs.copy_file(&src, &artifact)?;
                compiled += 1;
            }
        }
        self.fs
            .write_file(&build.join(STAMP_FILE), ENGINE_VERSION.as_bytes())?;
        Ok(compiled)
    }

    /// Empty `build/` except for deployed conversion data, which only a
    /// conversion deploy replaces.
    fn clear_build(&self, build: &Path) -> CapResult<()> {
        if !self.fs.exists(build) {
            return Ok(());
        }
        for entry in self.fs.list_dir(build)? {
            if file_name(&entry).as_deref() == Some(OPENCC_DIR) {
                continue;
            }
            if self.fs.is_dir(&entry) {
                self.fs.remove_dir_all(&entry)?;
            } else {
                self.fs.remove_file(&entry)?;
            }
        }
        Ok(())
    }

    fn ensure_loaded(&self) -> CapResult<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(CapError::Engine("engine not initialized".into()))
        }
    }

    fn read_selection(&self) -> CapResult<Selection> {
        let path = self.dirs.user_dir.join(SELECTION_FILE);
        if !self.fs.exists(&path) {
            return Ok(Selection::default());
        }
        let data = self.fs.read_file(&path)?;
        serde_yaml::from_slice(&data)
            .map_err(|e| CapError::Engine(format!("invalid {}: {}", SELECTION_FILE, e)))
    }

    fn write_selection(&self, selection: &Selection) -> CapResult<()> {
        let yaml = serde_yaml::to_string(selection)
            .map_err(|e| CapError::Other(format!("serialize selection: {}", e)))?;
        self.fs
            .write_file(&self.dirs.user_dir.join(SELECTION_FILE), yaml.as_bytes())
    }

    fn read_yaml(&self, path: &Path) -> CapResult<serde_yaml::Value> {
        let data = self.fs.read_file(path)?;
        serde_yaml::from_slice(&data)
            .map_err(|e| CapError::Engine(format!("invalid {}: {}", path.display(), e)))
    }

    fn sync_one(&self, src: &Path, dest_dir: &Path) -> CapResult<()> {
        let name = src
            .file_name()
            .ok_or_else(|| CapError::Other(format!("bad path {}", src.display())))?;
        self.fs.copy_file(src, &dest_dir.join(name))
    }

    fn try_deploy_conversion(&self) -> CapResult<usize> {
        let src_dir = [Some(&self.dirs.user_dir), self.dirs.shared_dir.as_ref()]
            .into_iter()
            .flatten()
            .map(|d| d.join(OPENCC_DIR))
            .find(|d| self.fs.exists(d))
            .ok_or_else(|| CapError::Engine("no conversion data found".into()))?;

        let dest = self.build_dir().join(OPENCC_DIR);
        self.fs.remove_dir_all(&dest)?;
        self.fs.create_dir_all(&dest)?;
        let mut deployed = 0;
        for src in self.fs.list_dir(&src_dir)? {
            if self.fs.is_dir(&src) {
                continue;
            }
            self.sync_one(&src, &dest)?;
            deployed += 1;
        }
        Ok(deployed)
    }
}

impl NativeEngine for FilesystemEngine {
    fn destroy(&mut self) {
        self.loaded = false;
    }

    fn initialize(&mut self, full_rebuild: bool) -> CapResult<()> {
        self.fs.create_dir_all(&self.dirs.user_dir)?;
        let compiled = self.compile(full_rebuild)?;
        tracing::debug!(compiled, full_rebuild, "engine artifacts built");
        self.loaded = true;
        Ok(())
    }

    fn run_self_check(&mut self, schedule_restart: bool) -> CapResult<CheckFindings> {
        let build = self.build_dir();
        let mut issues = Vec::new();
        if !self.fs.exists(&build.join(STAMP_FILE)) {
            issues.push(format!("{} has never been deployed", build.display()));
        }
        for (name, src) in self.sources()? {
            let artifact = build.join(&name);
            if !self.fs.exists(&artifact) {
                issues.push(format!("{} is not compiled", name));
            } else if self.is_stale(&src, &artifact) {
                issues.push(format!("{} is newer than its build", name));
            }
        }
        if schedule_restart {
            tracing::debug!("self-check done, restart scheduled by caller");
        }
        Ok(CheckFindings { issues })
    }

    fn sync_user_data(&mut self) -> bool {
        let dest = self.dirs.sync_dir.join(&self.dirs.installation_id);
        if let Err(e) = self.fs.create_dir_all(&dest) {
            tracing::warn!(error = %e, "cannot create sync directory");
            return false;
        }
        let entries = match self.fs.list_dir(&self.dirs.user_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list user data");
                return false;
            }
        };

        let mut ok = true;
        for src in entries {
            if !file_name(&src).is_some_and(|n| n.ends_with(USERDB_SUFFIX)) {
                continue;
            }
            if let Err(e) = self.sync_one(&src, &dest) {
                tracing::warn!(file = %src.display(), error = %e, "user dictionary not synced");
                ok = false;
            }
        }
        ok
    }

    fn deploy_conversion(&mut self) -> bool {
        match self.try_deploy_conversion() {
            Ok(n) => {
                tracing::debug!(files = n, "conversion data deployed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "conversion deploy failed");
                false
            }
        }
    }

    fn engine_version(&self) -> String {
        ENGINE_VERSION.to_string()
    }

    fn conversion_library_version(&self) -> String {
        CONVERSION_VERSION.to_string()
    }

    fn color_schemes(&self) -> CapResult<Vec<ColorScheme>> {
        self.ensure_loaded()?;
        let path = self.build_dir().join(COLORS_FILE);
        if !self.fs.exists(&path) {
            return Ok(vec![]);
        }
        let doc = self.read_yaml(&path)?;
        let selected = self.read_selection()?.color_scheme;
        let Some(presets) = doc.get("preset_color_schemes").and_then(|v| v.as_mapping()) else {
            return Ok(vec![]);
        };

        let mut out = Vec::new();
        for (key, value) in presets {
            let Some(id) = key.as_str() else { continue };
            let name = value
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(id)
                .to_string();
            out.push(ColorScheme {
                id: id.to_string(),
                name,
                selected: selected.as_deref() == Some(id),
            });
        }
        Ok(out)
    }

    fn select_color_scheme(&mut self, id: &str) -> CapResult<()> {
        if !self.color_schemes()?.iter().any(|c| c.id == id) {
            return Err(CapError::Engine(format!("unknown color scheme: {}", id)));
        }
        let mut selection = self.read_selection()?;
        selection.color_scheme = Some(id.to_string());
        self.write_selection(&selection)
    }

    fn schemas(&self) -> CapResult<Vec<SchemaItem>> {
        self.ensure_loaded()?;
        let selected = self.read_selection()?.schemas;
        let mut out = Vec::new();
        for path in self.fs.list_dir(&self.build_dir())? {
            let Some(id) = file_name(&path).and_then(|n| n.strip_suffix(SCHEMA_SUFFIX).map(String::from))
            else {
                continue;
            };
            let name = self
                .read_yaml(&path)
                .ok()
                .and_then(|doc| {
                    doc.get("schema")
                        .and_then(|s| s.get("name"))
                        .and_then(|n| n.as_str())
                        .map(String::from)
                })
                .unwrap_or_else(|| id.clone());
            out.push(SchemaItem {
                selected: selected.contains(&id),
                id,
                name,
            });
        }
        Ok(out)
    }

    fn select_schemas(&mut self, ids: &[String]) -> CapResult<()> {
        let known = self.schemas()?;
        if let Some(missing) = ids.iter().find(|id| !known.iter().any(|s| &s.id == *id)) {
            return Err(CapError::Engine(format!("unknown schema: {}", missing)));
        }
        let mut selection = self.read_selection()?;
        selection.schemas = ids.to_vec();
        self.write_selection(&selection)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(String::from)
}
