pub mod build;
pub mod environment;
pub mod error;
pub mod names;

pub use build::{BuildConfig, CommunicatorConfig, GalleryDestination, OsType};
pub use environment::CloudEnvironment;
pub use error::*;
pub use names::TempNames;

use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file directly
pub const CONFIG_ENV_VAR: &str = "BAKEFLOW_CONFIG";

const CANDIDATES: [&str; 3] = ["bakeflow.local.yaml", "bakeflow.yaml", ".bakeflow.yaml"];

/// bakeflow's per-user configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("bakeflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the build configuration file.
///
/// Search order:
/// 1. `BAKEFLOW_CONFIG` environment variable (direct path)
/// 2. current directory: bakeflow.local.yaml, bakeflow.yaml, .bakeflow.yaml
/// 3. ~/.config/bakeflow/bakeflow.yaml (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("bakeflow").join("bakeflow.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Read a configuration file (JSON when the extension says so, YAML
/// otherwise) and apply defaults. Validation is left to the caller.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        BuildConfig::from_json(&content).map_err(|e| e.to_string())
    } else {
        BuildConfig::from_yaml(&content).map_err(|e| e.to_string())
    };

    let mut config = parsed.map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })?;
    config.apply_defaults();

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Discover, load and validate in one go.
pub fn load(explicit: Option<&Path>) -> Result<BuildConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    let config = load_config(&path)?;
    config.validate()?;
    Ok(config)
}
