use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::LaunchError;

fn default_jre_path() -> PathBuf {
    PathBuf::from("jre")
}

/// Launch settings read from `config.json` next to the executable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Application jar, relative to the working directory.
    pub jar: String,
    /// Either `com.example.Main` or `com/example/Main`.
    pub main_class: String,
    #[serde(default)]
    pub vm_args: Vec<String>,
    #[serde(default = "default_jre_path")]
    pub jre_path: PathBuf,
}

impl LaunchConfig {
    pub fn load(path: &Path) -> Result<Self, LaunchError> {
        let content = fs::read_to_string(path).map_err(|source| LaunchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: LaunchConfig =
            serde_json::from_str(&content).map_err(|source| LaunchError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        info!("jar: {}", config.jar);
        info!("main class: {}", config.main_class);
        for arg in &config.vm_args {
            debug!("VM argument: {}", arg);
        }

        Ok(config)
    }

    /// Main class in the dotted form `ClassLoader.loadClass` expects.
    pub fn binary_class_name(&self) -> String {
        self.main_class.replace('/', ".")
    }
}
