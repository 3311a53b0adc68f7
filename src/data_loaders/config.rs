use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::yaml::{
    bool_any, bool_at, f64_at, load_yaml, mapping_at, str_any, str_at, string_list_at, u64_any,
    u64_at,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub log_level: String,
    pub settings: AppSettings,
}

#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub development: DevelopmentSettings,
    pub target: TargetSettings,
    pub elevation: ElevationSettings,
    pub replication: ReplicationSettings,
    pub diagnostics: DiagnosticsSettings,
    pub persistence: PersistenceSettings,
    pub encoder: EncoderSettings,
}

#[derive(Debug, Clone)]
pub struct DevelopmentSettings {
    pub debug: bool,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub system_data_root: PathBuf,
    pub subpath: String,
    pub canonical_name: String,
    pub variant_suffix: String,
}

#[derive(Debug, Clone)]
pub struct ElevationSettings {
    pub retry_limit: u32,
    pub log_acl: bool,
}

#[derive(Debug, Clone)]
pub struct ReplicationSettings {
    pub parallel: bool,
    /// `WWWW_HHHH` strings; empty means ask the attached displays.
    pub resolutions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsSettings {
    pub log_file_formats: bool,
}

#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    /// `None` resolves to `~/Pictures/LockscreenGif`.
    pub stable_dir: Option<PathBuf>,
    pub stable_file_name: String,
    pub registry: bool,
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg: String,
    pub fps: f64,
    pub width: u32,
    pub temp_prefix: String,
}

impl Default for DevelopmentSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

impl Default for TargetSettings {
    fn default() -> Self {
        let program_data = std::env::var("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(r"C:\ProgramData"));
        Self {
            system_data_root: program_data
                .join("Microsoft")
                .join("Windows")
                .join("SystemData"),
            subpath: "ReadOnly".to_string(),
            canonical_name: "LockScreen.jpg".to_string(),
            variant_suffix: "_notdimmed.jpg".to_string(),
        }
    }
}

impl Default for ElevationSettings {
    fn default() -> Self {
        Self {
            retry_limit: 1,
            log_acl: true,
        }
    }
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            resolutions: Vec::new(),
        }
    }
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            log_file_formats: true,
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            stable_dir: None,
            stable_file_name: "wallpaper.jpg".to_string(),
            registry: true,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            fps: 15.0,
            width: 1280,
            temp_prefix: "gif_temp_".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = AppSettings::default();
        Self {
            debug: settings.development.debug,
            log_level: settings.development.log_level.clone(),
            settings,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let value = load_yaml(path)?;
        Self::from_yaml(&value)
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;
        let settings = parse_settings(map);

        Some(Self {
            debug: settings.development.debug,
            log_level: settings.development.log_level.clone(),
            settings,
        })
    }
}

fn parse_settings(root: &Mapping) -> AppSettings {
    let mut settings = AppSettings::default();

    // Accept both `settings: { ... }` and the sections at top level.
    let map = mapping_at(root, "settings").unwrap_or(root);

    if let Some(dev) = mapping_at(map, "development") {
        settings.development.debug =
            bool_any(dev, &["debug", "debug_mode"]).unwrap_or(settings.development.debug);
        if let Some(level) = str_any(dev, &["log_level", "logging"]) {
            settings.development.log_level = level.trim().to_lowercase();
        }
    }

    if let Some(target) = mapping_at(map, "target") {
        if let Some(root_dir) = non_empty(str_any(target, &["system_data_root", "root"])) {
            settings.target.system_data_root = PathBuf::from(root_dir);
        }
        if let Some(subpath) = non_empty(str_at(target, "subpath")) {
            settings.target.subpath = subpath.to_string();
        }
        if let Some(name) = non_empty(str_any(target, &["canonical_name", "base_name"])) {
            settings.target.canonical_name = name.to_string();
        }
        if let Some(suffix) = non_empty(str_any(target, &["variant_suffix", "dimmed_suffix"])) {
            settings.target.variant_suffix = suffix.to_string();
        }
    }

    if let Some(elev) = mapping_at(map, "elevation") {
        settings.elevation.retry_limit = u64_any(elev, &["retry_limit", "retries"])
            .map(|v| v.min(1) as u32)
            .unwrap_or(settings.elevation.retry_limit);
        settings.elevation.log_acl =
            bool_any(elev, &["log_acl", "log_permissions"]).unwrap_or(settings.elevation.log_acl);
    }

    if let Some(rep) = mapping_at(map, "replication") {
        settings.replication.parallel =
            bool_at(rep, "parallel").unwrap_or(settings.replication.parallel);
        if let Some(list) = string_list_at(rep, "resolutions") {
            settings.replication.resolutions = list;
        }
    }

    if let Some(diag) = mapping_at(map, "diagnostics") {
        settings.diagnostics.log_file_formats =
            bool_any(diag, &["log_file_formats", "log_mime_types"])
                .unwrap_or(settings.diagnostics.log_file_formats);
    }

    if let Some(persist) = mapping_at(map, "persistence") {
        settings.persistence.stable_dir =
            non_empty(str_at(persist, "stable_dir")).map(PathBuf::from);
        if let Some(name) = non_empty(str_at(persist, "stable_file_name")) {
            settings.persistence.stable_file_name = name.to_string();
        }
        settings.persistence.registry =
            bool_at(persist, "registry").unwrap_or(settings.persistence.registry);
    }

    if let Some(enc) = mapping_at(map, "encoder") {
        if let Some(ffmpeg) = non_empty(str_any(enc, &["ffmpeg", "ffmpeg_path"])) {
            settings.encoder.ffmpeg = ffmpeg.to_string();
        }
        settings.encoder.fps = f64_at(enc, "fps")
            .unwrap_or(settings.encoder.fps)
            .clamp(1.0, 60.0);
        settings.encoder.width = u64_at(enc, "width")
            .map(|v| v.clamp(16, 7680) as u32)
            .unwrap_or(settings.encoder.width);
        if let Some(prefix) = non_empty(str_at(enc, "temp_prefix")) {
            settings.encoder.temp_prefix = prefix.to_string();
        }
    }

    settings
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> AppConfig {
        let value: Value = serde_yaml::from_str(text).unwrap();
        AppConfig::from_yaml(&value).unwrap()
    }

    #[test]
    fn empty_document_sections_keep_defaults() {
        let cfg = parse("settings: {}\n");
        assert_eq!(cfg.settings.target.canonical_name, "LockScreen.jpg");
        assert_eq!(cfg.settings.target.variant_suffix, "_notdimmed.jpg");
        assert_eq!(cfg.settings.target.subpath, "ReadOnly");
        assert_eq!(cfg.settings.elevation.retry_limit, 1);
        assert!(cfg.settings.replication.parallel);
        assert!(cfg.settings.replication.resolutions.is_empty());
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn overrides_and_aliases_are_applied() {
        let cfg = parse(
            r#"
settings:
  development:
    debug_mode: true
    logging: WARN
  target:
    root: /srv/systemdata
    subpath: ReadOnly
  elevation:
    retries: 9
    log_permissions: false
  replication:
    parallel: false
    resolutions: ["1920_1080", "", "2560_1440"]
  persistence:
    stable_dir: "  "
    registry: false
  encoder:
    fps: 240
    width: 640
"#,
        );

        assert!(cfg.debug);
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.settings.target.system_data_root, PathBuf::from("/srv/systemdata"));
        assert_eq!(cfg.settings.elevation.retry_limit, 1);
        assert!(!cfg.settings.elevation.log_acl);
        assert!(!cfg.settings.replication.parallel);
        assert_eq!(
            cfg.settings.replication.resolutions,
            vec!["1920_1080".to_string(), "2560_1440".to_string()]
        );
        assert_eq!(cfg.settings.persistence.stable_dir, None);
        assert!(!cfg.settings.persistence.registry);
        assert_eq!(cfg.settings.encoder.fps, 60.0);
        assert_eq!(cfg.settings.encoder.width, 640);
    }

    #[test]
    fn retry_limit_is_at_most_one() {
        let cfg = parse("settings:\n  elevation:\n    retry_limit: 3\n");
        assert_eq!(cfg.settings.elevation.retry_limit, 1);

        let cfg = parse("settings:\n  elevation:\n    retry_limit: 0\n");
        assert_eq!(cfg.settings.elevation.retry_limit, 0);
    }

    #[test]
    fn top_level_sections_are_accepted() {
        let cfg = parse("target:\n  canonical_name: Lock.jpg\n");
        assert_eq!(cfg.settings.target.canonical_name, "Lock.jpg");
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let value: Value = serde_yaml::from_str("- a\n- b\n").unwrap();
        assert!(AppConfig::from_yaml(&value).is_none());
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(&dir.path().join("nope.yaml")).is_none());
    }
}
