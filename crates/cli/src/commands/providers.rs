//! `codeloop providers` — List supported LLM providers.

use codeloop_config::AppConfig;
use codeloop_core::provider::ProviderFactory;
use codeloop_providers::ProviderRouter;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = codeloop_providers::build_from_config(&config);

    println!("Supported LLM providers");
    println!("=======================");
    println!();
    for line in provider_lines(&router, &config) {
        println!("{line}");
    }
    println!();
    println!("  Aliases: claude → anthropic, google → gemini");
    println!();
    println!("  Any other name works as an OpenAI-compatible endpoint when configured:");
    println!("    [providers.my-endpoint]");
    println!("    api_url = \"https://your-endpoint.example.com/v1\"");
    println!("    api_key = \"your-key\"");
    println!();
    println!("  Environment variables:");
    println!("    CODELOOP_API_KEY, CODELOOP_PROVIDER, CODELOOP_MODEL");
    println!("    OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, DEEPSEEK_API_KEY,");
    println!("    OPENROUTER_API_KEY, GROQ_API_KEY");

    Ok(())
}

/// One row per known provider: name, default model, whether a key is set.
fn provider_lines(router: &ProviderRouter, config: &AppConfig) -> Vec<String> {
    router
        .list()
        .into_iter()
        .map(|name| {
            let model = router.default_model(name).unwrap_or_else(|| "-".into());
            let auth = if name == "ollama" {
                "local"
            } else if config.api_key_for(name).is_some() {
                "key set"
            } else {
                "no key"
            };
            let marker = if name == router.default_provider() { "*" } else { " " };
            format!("  {marker} {name:<12} {model:<32} {auth}")
        })
        .collect()
}
