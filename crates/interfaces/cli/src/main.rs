mod run;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use outreach_audit::load_records;
use outreach_config::{AppConfig, PlannerMode};
use outreach_llm::{LlmClient, resolve_models};
use outreach_store::{QuotaStore, SeenStore};

/// Exit codes per the operational contract.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG: u8 = 2;
const EXIT_LOGIN_REQUIRED: u8 = 3;
const EXIT_QUOTA_NO_SENDS: u8 = 4;
const EXIT_FATAL: u8 = 5;

#[derive(Debug, Parser)]
#[command(
    name = "outreach",
    version,
    about = "Autonomous outreach agent for co-founder matching listings"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/outreach.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Browse the listing, evaluate profiles, and (when allowed) send.
    Run {
        /// Override the configured listing URL.
        #[arg(long)]
        listing_url: Option<String>,
        /// Override the configured profile limit.
        #[arg(long)]
        limit: Option<u32>,
        /// Full pipeline without submitting anything.
        #[arg(long)]
        shadow: bool,
        /// Send on YES without human approval.
        #[arg(long)]
        auto_send: bool,
        /// Path to the self-profile text file.
        #[arg(long)]
        profile: Option<String>,
        /// Path to the match-criteria text file.
        #[arg(long)]
        criteria: Option<String>,
        /// Path to the message-template text file.
        #[arg(long)]
        template: Option<String>,
    },
    /// Probe the provider, print the model catalog and the resolved choice.
    Doctor,
    /// Show seen-store and quota counters.
    Stats,
    /// Inspect the event log.
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Write a commented default configuration file.
    Init,
}

#[derive(Debug, Subcommand)]
enum LogCommands {
    /// Print the last N records.
    Tail {
        #[arg(long, default_value_t = 20)]
        lines: usize,
    },
    /// Copy the event log to a file.
    Export {
        #[arg(value_name = "PATH")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    init_tracing(&config);

    match dispatch(cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "fatal error");
            eprintln!("fatal: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn dispatch(cli: Cli, mut config: AppConfig) -> Result<u8> {
    match cli.command {
        Commands::Run {
            listing_url,
            limit,
            shadow,
            auto_send,
            profile,
            criteria,
            template,
        } => {
            if let Some(url) = listing_url {
                config.run.listing_url = url;
            }
            if let Some(limit) = limit {
                config.run.profile_limit = limit;
            }
            if shadow {
                config.run.shadow = true;
            }
            if auto_send {
                config.run.auto_send = true;
            }
            if let Some(path) = profile {
                config.inputs.self_profile_path = path;
            }
            if let Some(path) = criteria {
                config.inputs.criteria_path = path;
            }
            if let Some(path) = template {
                config.inputs.template_path = path;
            }

            run::execute(config).await
        }
        Commands::Doctor => doctor(&config).await,
        Commands::Stats => stats(&config),
        Commands::Log { command } => log_command(&config, command),
        Commands::Init => init_config(&cli.config, &config),
    }
}

async fn doctor(config: &AppConfig) -> Result<u8> {
    let Some(api_key) = run::api_key() else {
        eprintln!("OPENAI_API_KEY is not set");
        return Ok(EXIT_CONFIG);
    };
    let client = LlmClient::new(&config.llm.base_url, api_key);

    println!("outreach doctor");
    println!("- provider base : {}", config.llm.base_url);

    let advertised = client.list_models().await?;
    println!("- models advertised: {}", advertised.len());
    for id in &advertised {
        println!("    {id}");
    }

    let want_cua = config.browser.planner_mode == PlannerMode::PlannerExecutor;
    let resolved = resolve_models(
        &client,
        &config.llm.decision_model,
        &config.llm.cua_model,
        want_cua,
    )
    .await?;
    println!("- decision model : {}", resolved.decision_model);
    println!(
        "- cua model      : {}",
        resolved.cua_model.as_deref().unwrap_or("(planner off)")
    );
    Ok(EXIT_OK)
}

fn stats(config: &AppConfig) -> Result<u8> {
    let data_dir = Path::new(&config.storage.data_dir);
    let seen = SeenStore::open(data_dir.join("seen.redb"))?;
    let quota = QuotaStore::open(
        data_dir.join("quota.redb"),
        config.run.daily_quota,
        config.run.weekly_quota,
    )?;
    let counters = quota.snapshot()?;

    println!("── outreach stats ───────────────────────────────");
    println!("  profiles seen : {}", seen.len()?);
    println!(
        "  day quota     : {}/{} ({})",
        counters.day_used, counters.day_limit, counters.day_key
    );
    println!(
        "  week quota    : {}/{} ({})",
        counters.week_used, counters.week_limit, counters.week_key
    );
    Ok(EXIT_OK)
}

fn log_command(config: &AppConfig, command: LogCommands) -> Result<u8> {
    let log_path = Path::new(&config.storage.data_dir).join("events.jsonl");
    match command {
        LogCommands::Tail { lines } => {
            let records = load_records(&log_path)?;
            let start = records.len().saturating_sub(lines);
            for record in &records[start..] {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        LogCommands::Export { path } => {
            std::fs::copy(&log_path, &path)
                .with_context(|| format!("exporting {} to {path}", log_path.display()))?;
            println!("exported {} records to {path}", load_records(&log_path)?.len());
        }
    }
    Ok(EXIT_OK)
}

fn init_config(path: &str, config: &AppConfig) -> Result<u8> {
    if Path::new(path).exists() {
        eprintln!("refusing to overwrite existing {path}");
        return Ok(EXIT_CONFIG);
    }
    config.save_to(path)?;
    println!("wrote default configuration to {path}");
    println!("fill in [run].listing_url and the inputs/ files before `outreach run`");
    Ok(EXIT_OK)
}
