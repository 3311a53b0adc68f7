use std::{fs, path::Path};

use crate::{logging::LogSink, paths};
use crate::{info, warn};

const DEFAULT_CONFIG: &str = r#"settings:
  development:
    debug: false
    log_level: info
  target:
    # system_data_root defaults to %PROGRAMDATA%\Microsoft\Windows\SystemData
    subpath: ReadOnly
    canonical_name: LockScreen.jpg
    variant_suffix: _notdimmed.jpg
  elevation:
    retry_limit: 1
    log_acl: true
  replication:
    parallel: true
    # Leave empty to use the attached displays, e.g. ["1920_1080", "2560_1440"]
    resolutions: []
  diagnostics:
    log_file_formats: true
  persistence:
    # stable_dir defaults to ~/Pictures/LockscreenGif
    stable_file_name: wallpaper.jpg
    registry: true
  encoder:
    ffmpeg: ffmpeg
    fps: 15
    width: 1280
    temp_prefix: gif_temp_
"#;

/// Creates the app data folders and a default config on first run.
pub fn bootstrap(log: &dyn LogSink) {
    let app_dir = paths::app_data_dir();
    for dir in [app_dir.clone(), paths::temp_root()] {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(log, "[BOOTSTRAP] Failed to create {}: {e}", dir.display());
        }
    }
    info!(log, "[BOOTSTRAP] App directory: {}", app_dir.display());

    scaffold_config_yaml(&paths::config_path(), log);
}

/// Writes the default config unless one already exists. Returns whether a
/// file was written.
pub fn scaffold_config_yaml(path: &Path, log: &dyn LogSink) -> bool {
    if path.exists() {
        return false;
    }
    match fs::write(path, DEFAULT_CONFIG) {
        Ok(_) => {
            info!(log, "[BOOTSTRAP] Created {}", path.display());
            true
        }
        Err(e) => {
            warn!(log, "[BOOTSTRAP] Failed to create {}: {e}", path.display());
            false
        }
    }
}
