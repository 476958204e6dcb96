use crate::config::Config;
use crate::providers::OpenAIProvider;
use crate::traits::Provider;
use anyhow::{Result, anyhow};
use std::time::Duration;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    let provider_name = config.provider_name();

    let (label, env_vars, default_base_url) = match provider_name.to_lowercase().as_str() {
        "openai" => (
            "openai",
            &["OPENAI_API_KEY", "TICKERBOT_API_KEY"][..],
            None,
        ),
        "groq" => (
            "groq",
            &["GROQ_API_KEY", "TICKERBOT_API_KEY"][..],
            Some(GROQ_BASE_URL),
        ),
        _ => {
            return Err(anyhow!(
                "Unknown provider: {}. Available: openai, groq",
                provider_name
            ));
        }
    };

    let api_key = resolve_api_key_with_fallback(env_vars, &config.api_key)?;
    let mut provider = OpenAIProvider::new(api_key)
        .with_label(label)
        .with_model(config.model.clone())
        .with_timeout(Duration::from_secs(config.request_timeout_secs));

    if let Some(base_url) = config.base_url.as_deref().or(default_base_url) {
        provider = provider.with_base_url(base_url);
    }

    Ok(Box::new(provider))
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = resolve_api_key_from_env(var_name) {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!(
            "No API key found. Set {} or run 'tickerbot onboard'.",
            env_vars.join(" or ")
        ))
    }
}

fn resolve_api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(anyhow!("Environment variable {} not set", var_name)),
    }
}
