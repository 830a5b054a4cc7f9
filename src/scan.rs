use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use walkdir::{DirEntry, WalkDir};

use crate::error::Result;

/// Directory names that belong to version control systems.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr", "_darcs"];

/// Recursively walk `root` and collect every folder that directly contains
/// `info_name`.
///
/// Version-control directories are pruned together with everything below
/// them, and symlinks are not followed. The root itself is included when it
/// holds the marker file.
pub fn scan(root: &Path, info_name: &str) -> Result<BTreeSet<PathBuf>> {
    let canonical_root = root.canonicalize()?;
    let mut folders = BTreeSet::new();

    let walker = WalkDir::new(&canonical_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_vcs_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(std::io::Error::from(err).into());
            }
            Err(err) => {
                tracing::warn!("skipping unreadable path: {err}");
                continue;
            }
        };

        if entry.file_type().is_dir()
            && entry.path().join(info_name).is_file()
        {
            folders.insert(entry.into_path());
        }
    }

    tracing::debug!(
        root = %canonical_root.display(),
        count = folders.len(),
        "scanned library folders"
    );
    Ok(folders)
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| VCS_DIRS.contains(&name))
}
