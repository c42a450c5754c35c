use log::debug;
use serde::Deserialize;
use snafu::prelude::*;
use std::fs;
use std::time::Duration;

use crate::api::DEFAULT_BASE_URL;
use crate::console::*;

pub const API_URL_ENV: &str = "ELECTORAL_API_URL";

const DEFAULT_REFRESH_SECS: u64 = 15;
const DEFAULT_COUNTER_MS: u64 = 2000;
const DEFAULT_PROGRESS_TICK_MS: u64 = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The optional JSON settings file. Every key may be left out.
#[derive(Eq, PartialEq, Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(rename = "apiUrl")]
    pub api_url: Option<String>,
    #[serde(rename = "refreshIntervalSecs")]
    pub refresh_interval_secs: Option<u64>,
    #[serde(rename = "counterDurationMs")]
    pub counter_duration_ms: Option<u64>,
    #[serde(rename = "progressTickMs")]
    pub progress_tick_ms: Option<u64>,
    #[serde(rename = "timeoutSecs")]
    pub timeout_secs: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub refresh_interval: Duration,
    pub counter_duration: Duration,
    pub progress_tick: Duration,
    pub timeout: Duration,
}

pub fn read_settings_file(path: &str) -> CliResult<SettingsFile> {
    let contents = fs::read_to_string(path).context(ReadingFileSnafu { path })?;
    let settings: SettingsFile =
        serde_json::from_str(&contents).context(ParsingSettingsSnafu { path })?;
    debug!("settings file {}: {:?}", path, settings);
    Ok(settings)
}

/// Resolves the base URL: command line, then settings file, then the
/// environment, then the built-in default. The other settings only come from
/// the file or the defaults.
pub fn resolve(
    cli_api_url: Option<&str>,
    file: &SettingsFile,
    env_api_url: Option<&str>,
) -> Settings {
    let api_url = cli_api_url
        .or(file.api_url.as_deref())
        .or(env_api_url)
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
        .to_string();
    Settings {
        api_url,
        refresh_interval: Duration::from_secs(
            file.refresh_interval_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REFRESH_SECS),
        ),
        counter_duration: Duration::from_millis(
            file.counter_duration_ms.unwrap_or(DEFAULT_COUNTER_MS),
        ),
        progress_tick: Duration::from_millis(
            file.progress_tick_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_PROGRESS_TICK_MS),
        ),
        timeout: Duration::from_secs(
            file.timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_given() {
        let s = resolve(None, &SettingsFile::default(), None);
        assert_eq!(s.api_url, "http://localhost:8080/api");
        assert_eq!(s.refresh_interval, Duration::from_secs(15));
        assert_eq!(s.counter_duration, Duration::from_millis(2000));
        assert_eq!(s.progress_tick, Duration::from_millis(500));
        assert_eq!(s.timeout, Duration::from_secs(30));
    }

    #[test]
    fn api_url_precedence() {
        let file = SettingsFile {
            api_url: Some("http://file/api".to_string()),
            ..SettingsFile::default()
        };
        assert_eq!(
            resolve(Some("http://cli/api"), &file, Some("http://env/api")).api_url,
            "http://cli/api"
        );
        assert_eq!(
            resolve(None, &file, Some("http://env/api")).api_url,
            "http://file/api"
        );
        assert_eq!(
            resolve(None, &SettingsFile::default(), Some("http://env/api")).api_url,
            "http://env/api"
        );
    }

    #[test]
    fn settings_file_uses_camel_case_keys() {
        let file: SettingsFile = serde_json::from_str(
            r#"{"apiUrl": "http://10.0.0.5:8080/api", "refreshIntervalSecs": 5, "counterDurationMs": 0}"#,
        )
        .unwrap();
        let s = resolve(None, &file, None);
        assert_eq!(s.api_url, "http://10.0.0.5:8080/api");
        assert_eq!(s.refresh_interval, Duration::from_secs(5));
        // A zero duration shows the counter's target at once.
        assert_eq!(s.counter_duration, Duration::ZERO);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let err = read_settings_file("/nonexistent/eldash.json").unwrap_err();
        assert!(matches!(err, CliError::ReadingFile { .. }));
    }
}
