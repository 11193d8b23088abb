use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";

/// Per-call request options. Every field left `None` falls back to the
/// instance-level defaults held by the model facade; merging is an explicit
/// field-by-field operation, call-scoped wins.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Total request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// API version path segment, e.g. "v1" or "v1beta".
    pub api_version: Option<String>,
    /// Service base URL override.
    pub base_url: Option<String>,
}

impl RequestOptions {
    /// Merge `self` (call-scoped) over `defaults` (instance-scoped).
    pub fn merge_over(&self, defaults: &RequestOptions) -> RequestOptions {
        RequestOptions {
            timeout_ms: self.timeout_ms.or(defaults.timeout_ms),
            api_version: self
                .api_version
                .clone()
                .or_else(|| defaults.api_version.clone()),
            base_url: self.base_url.clone().or_else(|| defaults.base_url.clone()),
        }
    }

    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_api_key_env() -> String {
    "GENAI_API_KEY".to_string()
}

/// Client configuration loadable from disk. The API key itself never lives in
/// the file, only the name of the environment variable that holds it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    /// HTTP client configuration (timeouts, pooling). Missing in older configs → defaults.
    #[serde(default)]
    pub http: HttpCfg,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: None,
            api_version: None,
            http: HttpCfg::default(),
        }
    }
}

impl ClientConfig {
    /// Load a ClientConfig from a file path (JSON or TOML by extension). If
    /// the extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(crate::error::GenAiError::from)?;
        let s =
            std::str::from_utf8(&bytes).map_err(|e| crate::error::GenAiError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::GenAiError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| crate::error::GenAiError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn merge_call_scoped_wins_per_field() {
        let defaults = RequestOptions {
            timeout_ms: Some(60_000),
            api_version: Some("v1".into()),
            base_url: Some("https://default.example".into()),
        };
        let call = RequestOptions {
            timeout_ms: Some(5_000),
            api_version: None,
            base_url: None,
        };
        let merged = call.merge_over(&defaults);
        assert_eq!(merged.timeout_ms, Some(5_000));
        assert_eq!(merged.api_version.as_deref(), Some("v1"));
        assert_eq!(merged.base_url.as_deref(), Some("https://default.example"));
    }

    #[test]
    fn merge_of_empty_is_defaults() {
        let defaults = RequestOptions {
            timeout_ms: Some(1),
            api_version: Some("v1beta".into()),
            base_url: None,
        };
        let merged = RequestOptions::default().merge_over(&defaults);
        assert_eq!(merged, defaults);
    }

    #[test]
    fn unset_options_resolve_to_builtin_defaults() {
        let opts = RequestOptions::default();
        assert_eq!(opts.api_version(), DEFAULT_API_VERSION);
        assert_eq!(opts.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn load_from_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("genai.json");
        let json = r#"{
          "api_key_env": "MY_KEY",
          "base_url": "https://proxy.internal",
          "http": {"connect_timeout_ms": 1000}
        }"#;
        fs::write(&file, json).unwrap();
        let cfg = ClientConfig::from_path(&file).unwrap();
        assert_eq!(cfg.api_key_env, "MY_KEY");
        assert_eq!(cfg.base_url.as_deref(), Some("https://proxy.internal"));
        assert_eq!(cfg.api_version, None);
        assert_eq!(cfg.http.connect_timeout_ms, 1_000);
        assert_eq!(cfg.http.request_timeout_ms, 60_000);
        assert_eq!(cfg.http.pool_max_idle_per_host, None);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("genai.toml");
        let toml = r#"
api_key_env = "MY_KEY"
api_version = "v1"

[http]
request_timeout_ms = 30000
"#;
        fs::write(&file, toml).unwrap();
        let cfg = ClientConfig::from_path(&file).unwrap();
        assert_eq!(cfg.api_key_env, "MY_KEY");
        assert_eq!(cfg.api_version.as_deref(), Some("v1"));
        assert_eq!(cfg.http.request_timeout_ms, 30_000);
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
    }

    #[test]
    fn unknown_extension_falls_back_to_json_then_toml() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("genai.conf");
        fs::write(&json_path, r#"{"api_key_env":"K1"}"#).unwrap();
        let cfg = ClientConfig::from_path(&json_path).unwrap();
        assert_eq!(cfg.api_key_env, "K1");

        let toml_path = dir.path().join("genai2.conf");
        fs::write(&toml_path, "api_key_env = \"K2\"\n").unwrap();
        let cfg = ClientConfig::from_path(&toml_path).unwrap();
        assert_eq!(cfg.api_key_env, "K2");
    }

    #[test]
    fn missing_file_returns_io_error() {
        let missing = std::path::PathBuf::from("/definitely/not/here/genai-missing.json");
        let err = ClientConfig::from_path(&missing).unwrap_err();
        match err {
            crate::error::GenAiError::Io(_) => {}
            other => panic!("expected Io error, got: {other:?}"),
        }
    }

    #[test]
    fn bad_json_returns_other_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, r#"{ "api_key_env": 12 "#).unwrap();
        let err = ClientConfig::from_path(&file).unwrap_err();
        match err {
            crate::error::GenAiError::Other(_) => {}
            other => panic!("expected Other(json parse) error, got: {other:?}"),
        }
    }
}
