use std::path::{Path, PathBuf};

use crate::{data_loaders::config::TargetSettings, identity::Identity};

/// Naming rules for the OS lock-screen store of one user.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    pub system_data_root: PathBuf,
    pub subpath: String,
    pub canonical_name: String,
    pub variant_suffix: String,
}

impl TargetLayout {
    pub fn from_settings(settings: &TargetSettings) -> Self {
        Self {
            system_data_root: settings.system_data_root.clone(),
            subpath: settings.subpath.clone(),
            canonical_name: settings.canonical_name.clone(),
            variant_suffix: settings.variant_suffix.clone(),
        }
    }

    /// `{system_data_root}/{identity}/{subpath}`
    pub fn tree_root(&self, identity: &Identity) -> PathBuf {
        self.system_data_root
            .join(identity.as_str())
            .join(&self.subpath)
    }

    /// `LockScreen` for `LockScreen.jpg`.
    pub fn canonical_base_name(&self) -> &str {
        Path::new(&self.canonical_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.canonical_name)
    }

    pub fn variant_name(&self, resolution: &str) -> String {
        format!(
            "{}___{}{}",
            self.canonical_base_name(),
            resolution,
            self.variant_suffix
        )
    }

    /// Matches the `*{variant_suffix}` glob the OS store uses, ignoring case.
    pub fn is_variant_name(&self, file_name: &str) -> bool {
        file_name
            .to_ascii_lowercase()
            .ends_with(&self.variant_suffix.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TargetLayout {
        TargetLayout {
            system_data_root: PathBuf::from("root"),
            subpath: "ReadOnly".into(),
            canonical_name: "LockScreen.jpg".into(),
            variant_suffix: "_notdimmed.jpg".into(),
        }
    }

    #[test]
    fn tree_root_joins_identity_and_subpath() {
        let id = Identity::new("S-1-5-21-1");
        assert_eq!(
            layout().tree_root(&id),
            PathBuf::from("root").join("S-1-5-21-1").join("ReadOnly")
        );
    }

    #[test]
    fn variant_name_uses_triple_underscore() {
        assert_eq!(
            layout().variant_name("1920_1080"),
            "LockScreen___1920_1080_notdimmed.jpg"
        );
    }

    #[test]
    fn variant_match_is_case_insensitive_suffix() {
        let l = layout();
        assert!(l.is_variant_name("LockScreen___1920_1080_NotDimmed.JPG"));
        assert!(l.is_variant_name("other_notdimmed.jpg"));
        assert!(l.is_variant_name("_notdimmed.jpg"));
        assert!(!l.is_variant_name("LockScreen.jpg"));
        assert!(!l.is_variant_name("notdimmed.jpg"));
    }
}
