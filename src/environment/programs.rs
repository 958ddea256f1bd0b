//! Program Lookup
//!
//! Resolves external program names to executables. The search path is
//! read once per process from `PATH`.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;

/// Directories listed in `PATH`, in search order.
pub static SEARCH_PATH: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    let dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect())
        .unwrap_or_default();
    debug!("Program search path has {} entries", dirs.len());
    dirs
});

/// Something that can tell whether a program is runnable.
pub trait ProgramLocator {
    /// Full path of `program`, or `None` when it cannot be run.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Looks programs up in a list of directories, `PATH` by default.
#[derive(Debug, Clone)]
pub struct PathLocator {
    dirs: Vec<PathBuf>,
}

impl PathLocator {
    pub fn from_env() -> Self {
        Self {
            dirs: SEARCH_PATH.clone(),
        }
    }

    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl Default for PathLocator {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProgramLocator for PathLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// A locator over a fixed set of program names. Counts its lookups.
#[derive(Debug, Default)]
pub struct FixedLocator {
    available: BTreeSet<String>,
    lookups: Cell<usize>,
}

impl FixedLocator {
    pub fn new<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: programs.into_iter().map(Into::into).collect(),
            lookups: Cell::new(0),
        }
    }

    /// Number of `locate` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl ProgramLocator for FixedLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.lookups.set(self.lookups.get() + 1);
        self.available
            .contains(program)
            .then(|| PathBuf::from("/opt/bin").join(program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_path_locator_finds_executables_only() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("anvi-run-hmms");
        let data = dir.path().join("notes.txt");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::write(&data, "").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
            fs::set_permissions(&data, fs::Permissions::from_mode(0o644)).unwrap();
        }

        let locator = PathLocator::with_dirs(vec![dir.path().to_path_buf()]);
        assert_eq!(locator.locate("anvi-run-hmms"), Some(tool));
        #[cfg(unix)]
        assert_eq!(locator.locate("notes.txt"), None);
        assert_eq!(locator.locate("diamond"), None);
    }

    #[test]
    fn test_fixed_locator_counts_lookups() {
        let locator = FixedLocator::new(["mcl"]);
        assert!(locator.locate("mcl").is_some());
        assert!(locator.locate("diamond").is_none());
        assert_eq!(locator.lookups(), 2);
    }
}
