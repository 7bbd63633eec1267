use chrono::Weekday;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::pipeline::{DEFAULT_ORDER_RATE_PER_SEC, DEFAULT_QUOTE_RATE_PER_SEC};

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Clone)]
pub struct Config {
    pub base_url: Url,
    pub token_url: Url,
    pub api_key: String,
    pub api_secret: String,
    pub token_cache_file: PathBuf,
    pub orders_file: PathBuf,
    pub orders_sheet: String,
    pub results_file: PathBuf,
    pub summary_file: Option<PathBuf>,
    pub quote_rate_per_sec: f64,
    pub order_rate_per_sec: f64,
    pub http_timeout: Duration,
    pub dry_run: bool,
    pub run_weekday: Option<Weekday>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("LaaS Base URL: {}", config.base_url);
        tracing::debug!("Token URL: {}", config.token_url);
        tracing::debug!("Token cache: {}", config.token_cache_file.display());
        tracing::debug!(
            "Orders: {} (sheet {})",
            config.orders_file.display(),
            config.orders_sheet
        );
        tracing::debug!(
            "Rates: quotes {}/s, orders {}/s",
            config.quote_rate_per_sec,
            config.order_rate_per_sec
        );
        if config.dry_run {
            tracing::info!("DRY_RUN enabled: no requests will be sent");
        }

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| anyhow::anyhow!("{} environment variable required", key))
        };

        let base_url = parse_http_url("LAAS_BASE_URL", &required("LAAS_BASE_URL")?)?;
        let token_url = match var("LAAS_TOKEN_URL") {
            Some(raw) => parse_http_url("LAAS_TOKEN_URL", &raw)?,
            None => default_token_url(&base_url)?,
        };

        let token_cache_file = var("TOKEN_CACHE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_default()
                    .join(".cache")
                    .join("laas-dispatch")
                    .join("token.json")
            });

        let http_timeout_secs: u64 = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a positive integer"))?,
            None => 30,
        };

        let run_weekday = match var("RUN_WEEKDAY") {
            Some(raw) => Some(raw.trim().parse::<Weekday>().map_err(|_| {
                anyhow::anyhow!("RUN_WEEKDAY must be a weekday name (e.g. Mon, wednesday)")
            })?),
            None => None,
        };

        Ok(Self {
            base_url,
            token_url,
            api_key: required("API_KEY")?,
            api_secret: required("API_SECRET")?,
            token_cache_file,
            orders_file: PathBuf::from(required("ORDERS_FILE")?),
            orders_sheet: var("ORDERS_SHEET").unwrap_or_else(|| "FINAL_ORDERS".to_string()),
            results_file: var("RESULTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("order_results.jsonl")),
            summary_file: var("SUMMARY_FILE").map(PathBuf::from),
            quote_rate_per_sec: parse_rate(
                "QUOTE_RATE_PER_SEC",
                var("QUOTE_RATE_PER_SEC"),
                DEFAULT_QUOTE_RATE_PER_SEC,
            )?,
            order_rate_per_sec: parse_rate(
                "ORDER_RATE_PER_SEC",
                var("ORDER_RATE_PER_SEC"),
                DEFAULT_ORDER_RATE_PER_SEC,
            )?,
            http_timeout: Duration::from_secs(http_timeout_secs),
            dry_run: match var("DRY_RUN") {
                Some(raw) => parse_bool("DRY_RUN", &raw)?,
                None => false,
            },
            run_weekday,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("token_cache_file", &self.token_cache_file)
            .field("orders_file", &self.orders_file)
            .field("orders_sheet", &self.orders_sheet)
            .field("results_file", &self.results_file)
            .field("summary_file", &self.summary_file)
            .field("quote_rate_per_sec", &self.quote_rate_per_sec)
            .field("order_rate_per_sec", &self.order_rate_per_sec)
            .field("http_timeout", &self.http_timeout)
            .field("dry_run", &self.dry_run)
            .field("run_weekday", &self.run_weekday)
            .finish()
    }
}

fn parse_http_url(key: &str, raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Url::parse(raw).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))
}

fn default_token_url(base_url: &Url) -> anyhow::Result<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("LAAS_BASE_URL cannot carry a path"))?
        .pop_if_empty()
        .extend(["oauth", "token"]);
    Ok(url)
}

fn parse_rate(key: &str, raw: Option<String>, default: f64) -> anyhow::Result<f64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        _ => anyhow::bail!("{} must be a positive number, got `{}`", key, raw),
    }
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false, got `{}`", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: [(&str, &str); 4] = [
        ("LAAS_BASE_URL", "https://api.example.com"),
        ("API_KEY", "175482"),
        ("API_SECRET", "dc190e"),
        ("ORDERS_FILE", "orders.json"),
    ];

    #[test]
    fn test_defaults() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("HOME", "/home/dispatch"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.token_url.as_str(), "https://api.example.com/oauth/token");
        assert_eq!(
            config.token_cache_file,
            PathBuf::from("/home/dispatch/.cache/laas-dispatch/token.json")
        );
        assert_eq!(config.orders_sheet, "FINAL_ORDERS");
        assert_eq!(config.results_file, PathBuf::from("order_results.jsonl"));
        assert_eq!(config.summary_file, None);
        assert_eq!(config.quote_rate_per_sec, 2.0);
        assert_eq!(config.order_rate_per_sec, 1.5);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(!config.dry_run);
        assert_eq!(config.run_weekday, None);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("LAAS_TOKEN_URL", "https://auth.example.com/token"),
            ("QUOTE_RATE_PER_SEC", "0.5"),
            ("DRY_RUN", "yes"),
            ("RUN_WEEKDAY", "wednesday"),
            ("HTTP_TIMEOUT_SECS", "10"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.token_url.as_str(), "https://auth.example.com/token");
        assert_eq!(config.quote_rate_per_sec, 0.5);
        assert!(config.dry_run);
        assert_eq!(config.run_weekday, Some(Weekday::Wed));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_invalid_values() {
        for (key, value) in [
            ("QUOTE_RATE_PER_SEC", "0"),
            ("ORDER_RATE_PER_SEC", "NaN"),
            ("ORDER_RATE_PER_SEC", "-1"),
            ("RUN_WEEKDAY", "someday"),
            ("DRY_RUN", "maybe"),
            ("LAAS_BASE_URL", "ftp://api.example.com"),
        ] {
            let mut pairs = MINIMAL.to_vec();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            assert!(
                Config::from_lookup(lookup(&pairs)).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_missing_secret_is_reported_by_name_only() {
        let pairs: Vec<_> = MINIMAL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "API_SECRET")
            .collect();
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err.to_string(), "API_SECRET environment variable required");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = Config::from_lookup(lookup(&MINIMAL)).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("175482"));
        assert!(!debug.contains("dc190e"));
    }
}
