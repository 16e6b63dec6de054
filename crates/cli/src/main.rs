use clap::{Parser, Subcommand};
use danmu::source::MemoryPage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "danmu")]
#[command(about = "Danmu chat bot CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config file if none exists.
    Init {
        /// Config file path (default: DANMU_CONFIG_PATH or ~/.danmu/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the bot against a console chat room. Each stdin line `sender: message` is posted to the room;
    /// lines without a sender are posted by the operator. Submitted replies are printed.
    Run {
        /// Config file path (default: DANMU_CONFIG_PATH or ~/.danmu/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Account the bot runs as (default from DANMU_OPERATOR or config)
        #[arg(long, value_name = "NAME")]
        operator: Option<String>,

        /// Room owner (default from DANMU_OWNER or config)
        #[arg(long, value_name = "NAME")]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("danmu {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run {
            config,
            operator,
            owner,
        }) => {
            if let Err(e) = run_console(config, operator, owner).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(danmu::config::default_config_path);
    if danmu::config::write_default_config(&path)? {
        println!("wrote default config to {}", path.display());
    } else {
        println!("config already exists at {}", path.display());
    }
    Ok(())
}

/// Split `sender: message` (ASCII or full-width colon). Lines without a sender belong to `fallback`.
fn parse_line<'a>(line: &'a str, fallback: &'a str) -> (&'a str, &'a str) {
    let split = line
        .split_once(':')
        .or_else(|| line.split_once('：'))
        .map(|(s, c)| (s.trim(), c.trim()))
        .filter(|(s, _)| !s.is_empty());
    split.unwrap_or((fallback, line))
}

async fn run_console(
    config_path: Option<PathBuf>,
    operator: Option<String>,
    owner: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = danmu::config::load_config(config_path)?;
    let operator = operator
        .or_else(|| danmu::config::resolve_operator(&config))
        .ok_or_else(|| anyhow::anyhow!("operator not set; pass --operator or set DANMU_OPERATOR"))?;
    let owner = owner
        .or_else(|| danmu::config::resolve_owner(&config))
        .ok_or_else(|| anyhow::anyhow!("owner not set; pass --owner or set DANMU_OWNER"))?;

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let page = Arc::new(
        MemoryPage::new()
            .with_identities(operator.clone(), owner)
            .with_visible_limit(config.console.visible_limit)
            .with_reply_listener(reply_tx),
    );
    let printer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("< {}", reply);
        }
    });

    let settle = Duration::from_millis(config.bot.reply_delay_ms);
    let bot = danmu::launch(page.clone(), config.bot).await;
    if !bot.is_running().await {
        bot.start().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        let (sender, content) = parse_line(input, &operator);
        page.push(sender, content).await;
    }

    bot.stop().await?;
    // Let an already staged reply go out before exiting.
    tokio::time::sleep(settle + Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}
