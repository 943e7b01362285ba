use std::path::PathBuf;

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "CHARTJOBS_HOME";

/// Returns the base directory for chartjobs data.
///
/// Uses `$CHARTJOBS_HOME` if set, otherwise defaults to `~/.chartjobs`.
pub fn chartjobs_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chartjobs")
}

/// Returns the path to the user configuration file.
pub fn config_path() -> PathBuf {
    chartjobs_home().join("config.toml")
}
