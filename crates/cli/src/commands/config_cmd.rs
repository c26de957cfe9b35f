//! `codeloop config` — Configuration commands.

use codeloop_config::AppConfig;

/// Print the default configuration as TOML, ready to save as config.toml.
pub async fn defaults() -> Result<(), Box<dyn std::error::Error>> {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", AppConfig::default_toml());
    Ok(())
}

/// Print the configuration as loaded, with environment overrides applied.
/// Keys are redacted.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    redact(&mut config);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

fn redact(config: &mut AppConfig) {
    if config.api_key.is_some() {
        config.api_key = Some("***".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".codeloop"));
    }

    #[test]
    fn redact_hides_every_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-global".into());
        config.apply_env(|var| (var == "OPENAI_API_KEY").then(|| "sk-openai".to_string()));
        redact(&mut config);

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("sk-global"));
        assert!(!rendered.contains("sk-openai"));
    }
}
