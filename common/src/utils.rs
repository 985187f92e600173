use std::path::{Path, PathBuf};

/// Searches all ancestor directories of the current working directory
/// (including itself) for a file or directory whose name starts with the
/// given name, so `vasi_config` matches `vasi_config.toml` as well.
/// If found, returns the path to the file or directory without extension,
/// which is the form the configuration loader expects.
pub fn search_current_ancestor_dirs_for(name: &str) -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| search_ancestor_dirs_for(&cwd, name))
}

pub fn search_ancestor_dirs_for(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|p| {
            p.read_dir().is_ok_and(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .any(|e| e.file_name().to_str().is_some_and(|n| n.starts_with(name)))
            })
        })
        .map(|p| p.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_file_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("some_config.toml"), "").unwrap();

        let found = search_ancestor_dirs_for(&nested, "some_config");
        assert_eq!(found, Some(root.join("some_config")));
        assert_eq!(search_ancestor_dirs_for(&nested, "other_config"), None);
    }
}
