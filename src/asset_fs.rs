use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Filesystem operations the replicator and purger rely on. Kept narrow so
/// tests can count calls and inject failures per path.
pub trait AssetFs: Send + Sync {
    /// Immediate child directories of `root`.
    fn subdirectories(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    /// Every file named `name` (ASCII case-insensitive) at any depth below
    /// `root`. Unreadable directories are skipped and reported through
    /// `on_error`.
    fn find_named(
        &self,
        root: &Path,
        name: &str,
        on_error: &mut dyn FnMut(&Path, &io::Error),
    ) -> Vec<PathBuf>;

    /// Files directly inside `dir`.
    fn files_in(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Copies `src` over `dst`, replacing an existing file.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

pub struct LocalFs;

impl AssetFs for LocalFs {
    fn subdirectories(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn find_named(
        &self,
        root: &Path,
        name: &str,
        on_error: &mut dyn FnMut(&Path, &io::Error),
    ) -> Vec<PathBuf> {
        let mut found = Vec::new();
        find_named_recursive(root, name, on_error, &mut found);
        found.sort();
        found
    }

    fn files_in(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst).map(|_| ())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

fn find_named_recursive(
    dir: &Path,
    name: &str,
    on_error: &mut dyn FnMut(&Path, &io::Error),
    found: &mut Vec<PathBuf>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            on_error(dir, &e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            find_named_recursive(&path, name, on_error, found);
        } else if file_type.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        {
            found.push(path);
        }
    }
}
