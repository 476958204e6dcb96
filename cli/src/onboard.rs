use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select};
use tickerbot_core::config::{self, Config};

const BANNER: &str = r"
    -------------------------------------
       t i c k e r b o t   📈
    -------------------------------------
";

const PROVIDERS: &[&str] = &["openai", "groq"];

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn setup_provider() -> Result<String> {
    let selection = Select::new()
        .with_prompt("Select your model provider")
        .items(PROVIDERS)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(PROVIDERS[selection].to_string())
}

fn setup_api_key(provider: &str) -> Result<String> {
    let api_key: String = Input::new()
        .with_prompt(format!("Enter your {} API key", provider))
        .interact_text()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("API key cannot be empty"));
    }

    Ok(api_key.trim().to_string())
}

fn models_for(provider: &str) -> &'static [&'static str] {
    match provider {
        "groq" => &["llama-3.1-8b-instant", "llama-3.3-70b-versatile", "gemma2-9b-it"],
        _ => &["gpt-3.5-turbo", "gpt-4o-mini", "gpt-4o"],
    }
}

fn setup_model(provider: &str) -> Result<String> {
    let models = models_for(provider);

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

pub fn run_onboard() -> Result<Config> {
    println!("{}", style(BANNER).cyan().bold());

    println!("  {}", style("Welcome to tickerbot!").white().bold());
    println!(
        "  {}",
        style("Answer three questions and you are ready to chat about stocks.").dim()
    );

    print_step(1, 3, "Provider");
    let provider = setup_provider()?;

    print_step(2, 3, "API Key Setup");
    let api_key = setup_api_key(&provider)?;

    print_step(3, 3, "Model Selection");
    let model = setup_model(&provider)?;

    let config = Config {
        provider: Some(provider),
        api_key,
        model,
        ..Default::default()
    };

    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(config::get_config_path().display()).cyan()
    );
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("tickerbot chat").cyan().bold()
    );
    println!();

    Ok(config)
}
