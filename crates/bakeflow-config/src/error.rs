use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "No configuration file found. Looked for:\n\
        - current directory: bakeflow.local.yaml, bakeflow.yaml, .bakeflow.yaml\n\
        - ~/.config/bakeflow/bakeflow.yaml\n\
        A path can also be given with the BAKEFLOW_CONFIG environment variable"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("There is no cloud environment matching the name '{0}'")]
    UnknownCloudEnvironment(String),

    #[error("{} configuration error(s):\n{}", .0.len(), format_problems(.0))]
    Invalid(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_problems(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("  * {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, ConfigError>;
