//! Frame enumeration for a roll folder.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::InputConfig;

/// Finds the frames of a roll: files directly inside the folder whose
/// extension matches the configured list.
pub struct FrameDiscovery {
    config: InputConfig,
}

impl FrameDiscovery {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    /// Matching files, sorted lexicographically by path.
    ///
    /// Subfolders (including `.cache` and export folders) are not searched.
    pub fn discover(&self, folder: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| !is_hidden(p) && self.is_supported(p))
            .collect();

        files.sort();
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
