use std::path::{Path, PathBuf};

use crate::LaunchError;

/// Moves into the executable's directory so relative paths in
/// `config.json` resolve inside the application bundle.
#[cfg(target_os = "macos")]
pub fn select_root_path(program: &Path) -> Result<(), LaunchError> {
    use log::info;

    let Some(dir) = program.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    info!("executable: {}", dir.display());
    std::env::set_current_dir(dir).map_err(LaunchError::WorkingDir)
}

#[cfg(not(target_os = "macos"))]
pub fn select_root_path(_program: &Path) -> Result<(), LaunchError> {
    Ok(())
}

#[cfg(target_os = "macos")]
const LIBJVM_LOCATIONS: &[&str] = &["lib/jli/libjli.dylib", "lib/server/libjvm.dylib"];

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const LIBJVM_LOCATIONS: &[&str] = &["lib/server/libjvm.so", "lib/amd64/server/libjvm.so"];

#[cfg(all(target_os = "linux", target_arch = "x86"))]
const LIBJVM_LOCATIONS: &[&str] = &["lib/server/libjvm.so", "lib/i386/server/libjvm.so"];

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
const LIBJVM_LOCATIONS: &[&str] = &["lib/server/libjvm.so", "lib/aarch64/server/libjvm.so"];

#[cfg(all(
    target_os = "linux",
    not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64"))
))]
const LIBJVM_LOCATIONS: &[&str] = &["lib/server/libjvm.so"];

#[cfg(target_os = "windows")]
const LIBJVM_LOCATIONS: &[&str] = &["bin/server/jvm.dll"];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const LIBJVM_LOCATIONS: &[&str] = &["lib/server/libjvm.so"];

/// Where the JVM library may live under `jre`, most likely first.
pub fn libjvm_candidates(jre: &Path) -> Vec<PathBuf> {
    LIBJVM_LOCATIONS.iter().map(|rel| jre.join(rel)).collect()
}

pub fn locate_libjvm(jre: &Path) -> Result<PathBuf, LaunchError> {
    let searched = libjvm_candidates(jre);
    match searched.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(LaunchError::JvmNotFound { searched }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn candidates_live_under_jre() {
        let jre = Path::new("bundle/jre");
        let candidates = libjvm_candidates(jre);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.starts_with(jre)));
    }

    #[test]
    fn locates_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = libjvm_candidates(dir.path());
        let last = candidates.last().unwrap();
        fs::create_dir_all(last.parent().unwrap()).unwrap();
        fs::write(last, b"").unwrap();

        assert_eq!(&locate_libjvm(dir.path()).unwrap(), last);

        let first = &candidates[0];
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(first, b"").unwrap();

        assert_eq!(&locate_libjvm(dir.path()).unwrap(), first);
    }

    #[test]
    fn reports_every_searched_location() {
        let dir = tempfile::tempdir().unwrap();
        match locate_libjvm(dir.path()) {
            Err(LaunchError::JvmNotFound { searched }) => {
                assert_eq!(searched, libjvm_candidates(dir.path()))
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn root_path_without_parent_is_kept() {
        select_root_path(Path::new("jrelaunch")).unwrap();
    }
}
