use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "workbench.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    /// Navigation-state key holding the fallback case id.
    pub navigation_param: String,
    pub signal_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/workbench.db".into(),
            navigation_param: "c__recordId".into(),
            signal_capacity: 64,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file (if readable), then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = match read_settings_file(path) {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(err) => {
            warn!("config: ignoring {}: {err:#}", path.display());
            Settings::default()
        }
    };
    apply_env_overrides(&mut settings, env);
    settings
}

fn read_settings_file(path: &Path) -> anyhow::Result<Option<Settings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).context("failed to read config file"),
    };
    let settings = toml::from_str::<Settings>(&raw).context("failed to parse config file")?;
    Ok(Some(settings))
}

fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("WORKBENCH_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__NAVIGATION_PARAM") {
        settings.navigation_param = v;
    }

    if let Some(v) = env("APP__SIGNAL_CAPACITY") {
        match v.parse::<usize>() {
            Ok(parsed) if parsed > 0 => settings.signal_capacity = parsed,
            _ => warn!("config: ignoring invalid APP__SIGNAL_CAPACITY={v}"),
        }
    }

    settings.database_url = normalize_database_url(&settings.database_url);
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return match windows_drive_path(path) {
            Some(path) => format!("sqlite:{path}"),
            None => raw_database_url.to_string(),
        };
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    match windows_drive_path(path) {
        Some(path) => format!("sqlite:{path}"),
        None => format!("sqlite://{}", path.replace('\\', "/")),
    }
}

// `C:\x` or `C:/x`, returned with forward slashes. Drive paths keep a single
// `sqlite:` colon so the drive letter is not read as a URL host.
fn windows_drive_path(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let is_drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');
    is_drive.then(|| path.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("case_workbench_{name}_{suffix}.toml"));
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    }

    #[test]
    fn keeps_windows_drive_path_with_single_sqlite_colon() {
        assert_eq!(
            normalize_database_url("sqlite:C:\\Users\\alice\\case.db"),
            "sqlite:C:/Users/alice/case.db"
        );
        assert_eq!(
            normalize_database_url("C:\\Users\\alice\\case.db"),
            "sqlite:C:/Users/alice/case.db"
        );
        assert_eq!(
            normalize_database_url("sqlite://C:/Users/alice/case.db"),
            "sqlite:C:/Users/alice/case.db"
        );
    }

    #[test]
    fn relative_paths_with_backslashes_become_urls() {
        assert_eq!(
            normalize_database_url("sqlite:data\\case.db"),
            "sqlite://data/case.db"
        );
        assert_eq!(
            normalize_database_url("sqlite://./data/case.db"),
            "sqlite://./data/case.db"
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from(Path::new("/nonexistent/workbench.toml"), no_env);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_file(
            "file_values",
            "database_url = \"./cases.db\"\nnavigation_param = \"c__caseId\"\n",
        );
        let settings = load_settings_from(&path, no_env);
        assert_eq!(settings.database_url, "sqlite://./cases.db");
        assert_eq!(settings.navigation_param, "c__caseId");
        assert_eq!(settings.signal_capacity, 64);
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn environment_overrides_file() {
        let path = temp_file("env_override", "signal_capacity = 8\n");
        let vars = HashMap::from([
            ("APP__DATABASE_URL", "sqlite::memory:"),
            ("APP__SIGNAL_CAPACITY", "16"),
        ]);
        let settings = load_settings_from(&path, |key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.signal_capacity, 16);
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let path = temp_file("broken", "signal_capacity = \"lots\"\n");
        let settings = load_settings_from(&path, no_env);
        assert_eq!(settings, Settings::default());
        fs::remove_file(path).expect("cleanup");
    }
}
