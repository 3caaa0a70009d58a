// callplan-cli/src/main.rs
mod cli;
mod tools;

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use time::macros::format_description;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

use callplan_core::agent::Agent;
use callplan_core::config::RuntimeConfig;
use callplan_core::handler::RequestHandlerConfig;
use callplan_core::llm::llamacpp;
use callplan_core::progress;

use crate::cli::Cli;
use crate::tools::WeatherTools;

const CONFIG_FILENAME: &str = "Callplan.toml";

/// Prints interim narration to stderr so it never mixes with results.
struct ConsoleProgress;

impl progress::Stream for ConsoleProgress {
    fn send(&self, message: &str) {
        eprintln!("{}", message.dimmed());
    }
}

fn find_config_file() -> Result<PathBuf> {
    let current_dir = env::current_dir().context("failed to get current directory")?;
    let mut current = current_dir.as_path();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.is_file() {
            info!("found configuration file at {:?}", config_path);
            return Ok(config_path);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(anyhow!(
                    "could not find '{}' in the current directory or any parent directory",
                    CONFIG_FILENAME
                ));
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => find_config_file()?,
    };
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file {:?}", path))?;
    RuntimeConfig::from_toml_str(&content)
}

fn resolve_api_key(config: &RuntimeConfig) -> String {
    if config.llm.api_key_env_var.is_empty() {
        return String::new();
    }
    match env::var(&config.llm.api_key_env_var) {
        Ok(key) => key,
        Err(err) => {
            warn!(
                env_var = %config.llm.api_key_env_var,
                error = %err,
                "API key environment variable not set or invalid"
            );
            String::new()
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let timer = LocalTime::new(format_description!("[hour]:[minute]:[second]"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(io::stderr)
        .init();
}

fn build_agent(config: &RuntimeConfig) -> Result<Agent> {
    let llm_client = llamacpp::Client::new(llamacpp::Config {
        api_key: resolve_api_key(config),
        model: config.llm.model.clone(),
        endpoint: config.llm.endpoint.clone(),
        temperature: config.llm.temperature,
        top_p: config.llm.top_p,
        max_tokens: config.llm.max_tokens,
        use_grammar: config.llm.use_grammar,
        grammar_command: config.llm.grammar_command.clone(),
        timeout: config.llm_timeout(),
    })?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("callplan/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client for tools")?;

    Agent::new(RequestHandlerConfig {
        llm_client: Arc::new(llm_client),
        tools: Arc::new(WeatherTools::new(http)),
        timeout: config.call_timeout(),
        concurrent_execution: config.execution.concurrent,
        alter_user_request: None,
        alter_result: None,
    })
    .map_err(|err| anyhow!("failed to build agent: {err}"))
}

async fn run_request(agent: &Agent, message: &str, show_calls: bool) {
    let cancel = CancellationToken::new();
    let progress: Arc<dyn progress::Stream> = Arc::new(ConsoleProgress);

    let outcome = tokio::select! {
        outcome = agent.process(cancel.clone(), message, progress) => outcome,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            eprintln!("{}", "Request interrupted.".yellow());
            return;
        }
    };

    match outcome {
        Ok(result) => {
            if show_calls {
                match serde_json::to_string_pretty(&result.execution.func_calls) {
                    Ok(tree) => println!("{}\n", tree.cyan()),
                    Err(err) => eprintln!("{}", format!("Error rendering call tree: {err}").red()),
                }
            }
            match result.execution.main_results().format("") {
                Ok(output) => println!("{output}"),
                Err(err) => eprintln!("{}", format!("Error formatting result: {err}").red()),
            }
        }
        Err(err) => eprintln!("{}", format!("Error: {err}").red()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let agent = build_agent(&config)?;

    if let Some(query) = &cli.query {
        run_request(&agent, query, cli.show_calls).await;
        return Ok(());
    }

    println!(
        "{}",
        "callplan - ask me something (exit/quit or Ctrl-D to leave)".bold()
    );

    loop {
        print!("{} ", ">".green().bold());
        io::stdout().flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .context("failed to read line from stdin")?;
        if read == 0 {
            break; // EOF
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        run_request(&agent, message, cli.show_calls).await;
    }

    Ok(())
}
