use std::time::Duration;

use chrono::TimeDelta;

use crate::attempt::RetryConfig;
use crate::error::AppError;
use crate::throttle::{RateLimitConfig, spacing_from_secs};

/// Runtime knobs of the extraction pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum confidence for an API or AI result to be accepted.
    pub confidence_threshold: f64,
    /// Window for in-flight reuse and completed-skip dedup.
    pub dedup_window: Duration,
    pub js_rendering_enabled: bool,
    pub rate_limits: RateLimitConfig,
    /// Navigation timeout handed to the renderer.
    pub render_timeout: Duration,
    /// Outer wall-clock bound around the whole render call.
    pub render_hard_timeout: Duration,
    pub html_cache_ttl: Duration,
    pub retry: RetryConfig,
    pub max_prompt_tokens: usize,
    /// Cleaned text shorter than this may be a JS shell.
    pub js_heavy_text_threshold: usize,
    /// Cleaned text shorter than this is a JS shell even without SPA markers.
    pub js_heavy_min_text: usize,
    /// Embedded board content must reach this length to replace the page.
    pub embed_min_text: usize,
    /// Rendered text below this is reported as a shell page.
    pub shell_text_threshold: usize,
    /// Longest sleep the provider runner takes on a rate limit.
    pub rate_limit_sleep_cap: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            dedup_window: Duration::from_secs(120),
            js_rendering_enabled: false,
            rate_limits: RateLimitConfig::default(),
            render_timeout: Duration::from_secs(30),
            render_hard_timeout: Duration::from_secs(45),
            html_cache_ttl: Duration::from_secs(3600),
            retry: RetryConfig::default(),
            max_prompt_tokens: 12_000,
            js_heavy_text_threshold: 1_500,
            js_heavy_min_text: 200,
            embed_min_text: 800,
            shell_text_threshold: 300,
            rate_limit_sleep_cap: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `JOBSIFT_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(v) = lookup("JOBSIFT_JS_RENDERING_ENABLED") {
            config.js_rendering_enabled = parse_bool("JOBSIFT_JS_RENDERING_ENABLED", &v)?;
        }
        if let Some(v) = lookup("JOBSIFT_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = parse("JOBSIFT_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("JOBSIFT_DEDUP_WINDOW_SECS") {
            config.dedup_window = Duration::from_secs(parse("JOBSIFT_DEDUP_WINDOW_SECS", &v)?);
        }
        if let Some(v) = lookup("JOBSIFT_DEFAULT_RATE_LIMIT_SECS") {
            let secs: f64 = parse("JOBSIFT_DEFAULT_RATE_LIMIT_SECS", &v)?;
            config.rate_limits.default_spacing = spacing_from_secs("JOBSIFT_DEFAULT_RATE_LIMIT_SECS", secs)?;
        }
        if let Some(v) = lookup("JOBSIFT_RATE_LIMITS") {
            config.rate_limits = config.rate_limits.parse_table(&v)?;
        }
        if let Some(v) = lookup("JOBSIFT_RENDER_TIMEOUT_SECS") {
            config.render_timeout = Duration::from_secs(parse("JOBSIFT_RENDER_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("JOBSIFT_RENDER_HARD_TIMEOUT_SECS") {
            config.render_hard_timeout =
                Duration::from_secs(parse("JOBSIFT_RENDER_HARD_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("JOBSIFT_HTML_CACHE_TTL_SECS") {
            config.html_cache_ttl = Duration::from_secs(parse("JOBSIFT_HTML_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("JOBSIFT_MAX_RETRIES") {
            config.retry.max_retries = parse("JOBSIFT_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("JOBSIFT_MAX_PROMPT_TOKENS") {
            config.max_prompt_tokens = parse("JOBSIFT_MAX_PROMPT_TOKENS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AppError::ConfigError(format!(
                "JOBSIFT_CONFIDENCE_THRESHOLD must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }
        if self.render_hard_timeout <= self.render_timeout {
            return Err(AppError::ConfigError(format!(
                "JOBSIFT_RENDER_HARD_TIMEOUT_SECS ({}s) must be larger than JOBSIFT_RENDER_TIMEOUT_SECS ({}s)",
                self.render_hard_timeout.as_secs(),
                self.render_timeout.as_secs()
            )));
        }
        Ok(())
    }

    pub fn with_js_rendering(mut self, enabled: bool) -> Self {
        self.js_rendering_enabled = enabled;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_render_timeouts(mut self, navigation: Duration, hard: Duration) -> Self {
        self.render_timeout = navigation;
        self.render_hard_timeout = hard;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit_sleep_cap(mut self, cap: Duration) -> Self {
        self.rate_limit_sleep_cap = cap;
        self
    }

    /// Character budget of cleaned content fed to the prompt.
    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_tokens * 4
    }

    pub fn dedup_window_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.dedup_window).unwrap_or(TimeDelta::minutes(2))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::ConfigError(format!("Invalid value for {key}: '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid boolean for {key}: '{value}'"
        ))),
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

    #[test]
    fn defaults_without_env() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.dedup_window, Duration::from_secs(120));
        assert!(!config.js_rendering_enabled);
        assert_eq!(config.rate_limits.spacing_for("example.com"), Duration::from_secs(5));
        assert_eq!(config.max_prompt_chars(), 48_000);
    }

    #[test]
    fn env_overrides_apply() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("JOBSIFT_JS_RENDERING_ENABLED", "true"),
            ("JOBSIFT_CONFIDENCE_THRESHOLD", "0.8"),
            ("JOBSIFT_DEDUP_WINDOW_SECS", "30"),
            ("JOBSIFT_DEFAULT_RATE_LIMIT_SECS", "2"),
            ("JOBSIFT_RATE_LIMITS", "linkedin.com=10"),
            ("JOBSIFT_MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert!(config.js_rendering_enabled);
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.dedup_window, Duration::from_secs(30));
        assert_eq!(config.rate_limits.spacing_for("example.com"), Duration::from_secs(2));
        assert_eq!(config.rate_limits.spacing_for("linkedin.com"), Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = PipelineConfig::from_lookup(lookup(&[("JOBSIFT_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOBSIFT_MAX_RETRIES"));

        let err = PipelineConfig::from_lookup(lookup(&[("JOBSIFT_CONFIDENCE_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOBSIFT_CONFIDENCE_THRESHOLD"));
    }

    #[test]
    fn non_finite_values_are_config_errors() {
        for value in ["NaN", "inf", "-0.1"] {
            let err = PipelineConfig::from_lookup(lookup(&[("JOBSIFT_CONFIDENCE_THRESHOLD", value)]))
                .unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{value}: {err:?}");
        }

        let err = PipelineConfig::from_lookup(lookup(&[("JOBSIFT_DEFAULT_RATE_LIMIT_SECS", "inf")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOBSIFT_DEFAULT_RATE_LIMIT_SECS"));

        let err = PipelineConfig::from_lookup(lookup(&[("JOBSIFT_RATE_LIMITS", "a.com=1e30")]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        assert!(PipelineConfig::default().with_confidence_threshold(f64::NAN).validate().is_err());
    }

    #[test]
    fn hard_render_timeout_must_exceed_navigation_timeout() {
        let err = PipelineConfig::from_lookup(lookup(&[
            ("JOBSIFT_RENDER_TIMEOUT_SECS", "60"),
            ("JOBSIFT_RENDER_HARD_TIMEOUT_SECS", "45"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
