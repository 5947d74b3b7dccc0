use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};

use crate::sources::DecodingParams;

/// Endpoints and model settings for the external services.  Loaded from the
/// JSON file named by `PHISHSCAN_SERVICE_CONFIG`; every section is optional.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default, alias = "virusTotal")]
    pub virustotal: VirusTotalConfig,
    #[serde(default)]
    pub safe_browsing: SafeBrowsingConfig,
    #[serde(default)]
    pub text_generation: TextGenerationConfig,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirusTotalConfig {
    #[serde(default = "default_virustotal_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeBrowsingConfig {
    #[serde(default = "default_safe_browsing_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_threat_types")]
    pub threat_types: Vec<String>,
    #[serde(default = "default_platform_types")]
    pub platform_types: Vec<String>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenerationConfig {
    #[serde(default = "default_text_generation_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "DecodingParams::analysis")]
    pub analysis: DecodingParams,
    #[serde(default = "DecodingParams::sentiment")]
    pub sentiment: DecodingParams,
}

fn default_virustotal_url() -> String {
    "https://www.virustotal.com".to_owned()
}

fn default_safe_browsing_url() -> String {
    "https://safebrowsing.googleapis.com".to_owned()
}

fn default_text_generation_url() -> String {
    "https://api.openai.com".to_owned()
}

fn default_model() -> String {
    "text-davinci-003".to_owned()
}

fn default_threat_types() -> Vec<String> {
    vec![
        "MALWARE".into(),
        "SOCIAL_ENGINEERING".into(),
        "UNWANTED_SOFTWARE".into(),
    ]
}

fn default_platform_types() -> Vec<String> {
    vec!["ANY_PLATFORM".into()]
}

impl Default for VirusTotalConfig {
    fn default() -> Self {
        Self {
            base_url: default_virustotal_url(),
            api_key: None,
        }
    }
}

impl Default for SafeBrowsingConfig {
    fn default() -> Self {
        Self {
            base_url: default_safe_browsing_url(),
            api_key: None,
            threat_types: default_threat_types(),
            platform_types: default_platform_types(),
        }
    }
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_text_generation_url(),
            api_key: None,
            model: default_model(),
            analysis: DecodingParams::analysis(),
            sentiment: DecodingParams::sentiment(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub rate_limit_per_minute: usize,
    pub call_timeout_ms: u64,
    pub request_budget_ms: u64,
    pub url_concurrency: usize,
    pub max_request_bytes: Option<usize>,
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            rate_limit_per_minute: 30,
            call_timeout_ms: 10_000,
            request_budget_ms: 45_000,
            url_concurrency: 4,
            max_request_bytes: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut service = if let Ok(path) = env::var("PHISHSCAN_SERVICE_CONFIG") {
            let content = fs::read_to_string(&path).with_context(|| {
                format!(
                    "Failed to read PHISHSCAN_SERVICE_CONFIG '{}': file unreadable",
                    path
                )
            })?;
            serde_json::from_str::<ServiceConfig>(&content).with_context(|| {
                format!(
                    "Failed to parse PHISHSCAN_SERVICE_CONFIG '{}': invalid JSON configuration",
                    path
                )
            })?
        } else {
            ServiceConfig::default()
        };

        // Credentials from the environment win over the config file.
        if let Some(key) = non_empty_env("VIRUSTOTAL_API_KEY") {
            service.virustotal.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("GOOGLE_SAFEBROWSING_API_KEY") {
            service.safe_browsing.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            service.text_generation.api_key = Some(key);
        }

        let defaults = AppConfig::default();
        let rate_limit_per_minute = match parse_optional_u64("PHISHSCAN_RATE_LIMIT_PER_MINUTE")? {
            Some(0) => {
                return Err(anyhow!(
                    "PHISHSCAN_RATE_LIMIT_PER_MINUTE must be a positive integer"
                ))
            }
            Some(v) => v as usize,
            None => defaults.rate_limit_per_minute,
        };
        let call_timeout_ms = parse_optional_u64("PHISHSCAN_CALL_TIMEOUT_MS")?
            .filter(|ms| *ms > 0)
            .unwrap_or(defaults.call_timeout_ms);
        let request_budget_ms = parse_optional_u64("PHISHSCAN_REQUEST_BUDGET_MS")?
            .filter(|ms| *ms > 0)
            .unwrap_or(defaults.request_budget_ms);
        let url_concurrency = parse_optional_u64("PHISHSCAN_URL_CONCURRENCY")?
            .map(|v| (v as usize).max(1))
            .unwrap_or(defaults.url_concurrency);
        let max_request_bytes =
            parse_optional_u64("PHISHSCAN_MAX_REQUEST_BYTES")?.map(|v| v as usize);

        let allowed_origins = env::var("PHISHSCAN_ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            service,
            rate_limit_per_minute,
            call_timeout_ms,
            request_budget_ms,
            url_concurrency,
            max_request_bytes,
            allowed_origins,
        })
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
