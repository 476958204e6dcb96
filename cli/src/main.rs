use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Read;
use std::sync::Arc;
use termimad::MadSkin;
use tickerbot_core::config::{self, Config};
use tickerbot_core::traits::{ChatMessage, Provider};
use tickerbot_core::{agent, market, providers, tools};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod onboard;

const HISTORY_PREVIEW_CHARS: usize = 120;

#[derive(Parser)]
#[command(name = "tickerbot")]
#[command(about = "tickerbot - chat with a language model that can look up stocks", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive setup of provider, API key and model
    Onboard,
    /// Chat with the assistant
    Chat {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Fetch a stock snapshot without going through the model
    Stock {
        ticker: String,
        /// Print the condensed summary instead of the raw snapshot
        #[arg(short, long)]
        summary: bool,
    },
    /// Summarize text (reads stdin when no text is given)
    Summarize { text: Option<String> },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "tickerbot=debug,tickerbot_core=debug"
    } else {
        "tickerbot=warn,tickerbot_core=warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_agent(config: &Config) -> Result<agent::AgentLoop> {
    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(config)?);
    let toolbox = Arc::new(tools::Toolbox::new(market::create_market_data(config)));

    let mut context_builder = agent::ContextBuilder::new();
    if let Some(prompt) = &config.system_prompt {
        context_builder = context_builder.with_system_prompt(prompt.clone());
    }

    Ok(agent::AgentLoop::new(provider, context_builder, toolbox)
        .with_temperature(config.temperature))
}

fn preview(message: &ChatMessage) -> String {
    let flat = message.content.replace('\n', " ");
    let mut text: String = flat.chars().take(HISTORY_PREVIEW_CHARS).collect();
    if flat.chars().count() > HISTORY_PREVIEW_CHARS {
        text.push_str("...");
    }
    match (&message.name, message.has_tool_calls()) {
        (Some(name), _) => format!("[{}:{}] {}", message.role, name, text),
        (None, true) => format!("[{} → tools] {}", message.role, text),
        (None, false) => format!("[{}] {}", message.role, text),
    }
}

async fn run_repl(agent_loop: &agent::AgentLoop) -> Result<()> {
    let skin = MadSkin::default();
    let mut conversation = agent::Conversation::new();
    let mut editor = DefaultEditor::new().context("Failed to initialise line editor")?;
    let history_path = config::get_history_path();
    let _ = editor.load_history(&history_path);

    println!("📈 tickerbot");
    println!("Type your message (/clear, /history, /exit; Ctrl+D to exit):\n");

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(input);

                match input {
                    "/exit" | "/quit" => break,
                    "/clear" => {
                        conversation.clear();
                        println!("🧹 Conversation cleared.\n");
                        continue;
                    }
                    "/history" => {
                        for message in conversation.messages() {
                            println!("{}", preview(message));
                        }
                        println!();
                        continue;
                    }
                    _ => {}
                }

                println!("\n🤔 Processing...\n");
                let reply = conversation.send(agent_loop, input).await;
                skin.print_text(&reply);
                println!();
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n👋 Goodbye!");
    if let Err(e) = std::fs::create_dir_all(config::get_tickerbot_dir())
        .map_err(anyhow::Error::from)
        .and_then(|_| editor.save_history(&history_path).map_err(anyhow::Error::from))
    {
        tracing::warn!(error = %e, "Could not save line history");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let command = cli.command.unwrap_or_else(|| {
        if !config::config_exists() {
            Commands::Onboard
        } else {
            Commands::Chat { message: None }
        }
    });

    match command {
        Commands::Onboard => {
            let onboard_config = onboard::run_onboard().map_err(|e| {
                eprintln!("❌ Onboarding failed: {}", e);
                anyhow::anyhow!("Onboarding failed: {}", e)
            })?;
            config::save_config(&onboard_config)?;
        }
        Commands::Chat { message } => {
            let config = Config::load_or_init()?;
            let agent_loop = build_agent(&config)?;

            if let Some(msg) = message {
                println!("\n🤔 Processing...\n");
                let reply = agent_loop.process(&msg).await;
                MadSkin::default().print_text(&reply);
            } else {
                run_repl(&agent_loop).await?;
            }
        }
        Commands::Stock { ticker, summary } => {
            let config = Config::load_or_init()?;
            let market = market::create_market_data(&config);
            let snapshot = tools::stock::analyze(market.as_ref(), &ticker).await;

            if summary {
                MadSkin::default().print_text(&tools::summarize(&snapshot));
            } else {
                println!("{}", snapshot);
            }
        }
        Commands::Summarize { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read text from stdin")?;
                    buf
                }
            };
            println!("{}", tools::summarize(&text));
        }
    }

    Ok(())
}
