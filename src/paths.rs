// ~/lockscreen-gif/src/paths.rs

use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "LockscreenGif";

pub fn user_home_dir() -> Option<PathBuf> {
    // Primary (most reliable on Windows)
    if let Ok(profile) = std::env::var("USERPROFILE") {
        return Some(PathBuf::from(profile));
    }

    // Fallback (older / edge cases)
    let drive = std::env::var("HOMEDRIVE").ok();
    let path = std::env::var("HOMEPATH").ok();

    match (drive, path) {
        (Some(d), Some(p)) => Some(PathBuf::from(format!("{}{}", d, p))),
        _ => std::env::var("HOME").ok().map(PathBuf::from),
    }
}

/// `%LOCALAPPDATA%\LockscreenGif`, holding config, log and temp output.
pub fn app_data_dir() -> PathBuf {
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(local).join(APP_DIR_NAME);
    }

    if let Some(home) = user_home_dir() {
        return home.join(".local").join("share").join(APP_DIR_NAME);
    }

    match std::env::current_exe() {
        Ok(path) => path
            .parent()
            .map(|p| p.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(APP_DIR_NAME)),
        Err(_) => PathBuf::from(APP_DIR_NAME),
    }
}

pub fn config_path() -> PathBuf {
    app_data_dir().join("config.yaml")
}

pub fn log_path() -> PathBuf {
    app_data_dir().join("lockscreen-gif.log")
}

pub fn temp_root() -> PathBuf {
    app_data_dir().join("Temp")
}

/// Where the durable copy of the applied image lives: `~/Pictures/LockscreenGif`.
pub fn default_stable_dir() -> PathBuf {
    user_home_dir()
        .map(|home| home.join("Pictures"))
        .unwrap_or_else(app_data_dir)
        .join(APP_DIR_NAME)
}

/// Key→value store used off Windows in place of the registry.
pub fn settings_store_path() -> PathBuf {
    app_data_dir().join("lockscreen-state.json")
}
