use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;

pub const MAX_PAGE_SIZE: u32 = 100;

const ENV_PREFIX: &str = "DELIVERY__";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    /// Derived from `server_url` when unset.
    pub push_url: Option<String>,
    pub page_size: u32,
    pub typing_ttl_ms: u64,
    pub request_timeout_secs: u64,
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            push_url: None,
            page_size: 30,
            typing_ttl_ms: 5_000,
            request_timeout_secs: 15,
            event_buffer: 1024,
        }
    }
}

impl ClientSettings {
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer.max(1)
    }

    pub fn push_url(&self) -> Result<String> {
        if let Some(push_url) = self.push_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return Ok(push_url.trim().to_string());
        }
        let server_url = self.server_url.trim().trim_end_matches('/');
        let ws_url = if server_url.starts_with("https://") {
            server_url.replacen("https://", "wss://", 1)
        } else if server_url.starts_with("http://") {
            server_url.replacen("http://", "ws://", 1)
        } else {
            return Err(anyhow!("server_url must start with http:// or https://"));
        };
        Ok(format!("{ws_url}/push"))
    }
}

/// Defaults, then the TOML file at `path` when given, then `DELIVERY__*`
/// environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<ClientSettings>(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => ClientSettings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("PUSH_URL") {
        settings.push_url = Some(v);
    }
    parse_override(var("PAGE_SIZE"), "PAGE_SIZE", &mut settings.page_size);
    parse_override(var("TYPING_TTL_MS"), "TYPING_TTL_MS", &mut settings.typing_ttl_ms);
    parse_override(
        var("REQUEST_TIMEOUT_SECS"),
        "REQUEST_TIMEOUT_SECS",
        &mut settings.request_timeout_secs,
    );
    parse_override(var("EVENT_BUFFER"), "EVENT_BUFFER", &mut settings.event_buffer);
}

fn parse_override<T: FromStr>(raw: Option<String>, name: &str, target: &mut T) {
    let Some(raw) = raw else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(
            variable = %format!("{ENV_PREFIX}{name}"),
            value = %raw,
            "config: ignoring unparsable override"
        ),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
