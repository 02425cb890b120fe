mod config;
mod summary;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use cardrelay::http::HttpService;
use cardrelay::pcsc::Context;
use cardrelay::{CancelToken, Completion, Relay};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{FileConfig, Overrides, Settings};
use crate::summary::Summary;

/// Reads a transit card by relaying the commands of the issuing service to a PC/SC reader.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Logs every frame exchanged.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reads the card through the issuing service and prints the result.
    Read(ReadArgs),

    /// Lists the readers known to the PC/SC service.
    Readers,
}

#[derive(Args)]
struct ReadArgs {
    /// TOML configuration file.
    #[arg(short, long, env = "CARDRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the reader to use. Defaults to the first one found.
    #[arg(short, long, env = "CARDRELAY_READER")]
    reader: Option<String>,

    /// Base URL of the issuing service.
    #[arg(long, env = "CARDRELAY_URL")]
    url: Option<String>,

    /// Sale point identifier sent with every request.
    #[arg(long)]
    sale_point: Option<String>,

    /// Maximum exchange rounds before giving up.
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Seconds to wait for a card to be presented.
    #[arg(long)]
    card_timeout: Option<u64>,

    /// Seconds to wait for each reply of the service.
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Prints the final reply as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

impl ReadArgs {
    fn settings(&self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        Ok(Settings::resolve(
            file,
            Overrides {
                reader: self.reader.clone(),
                base_url: self.url.clone(),
                sale_point: self.sale_point.clone(),
                max_rounds: self.max_rounds,
                card_timeout_secs: self.card_timeout,
                request_timeout_secs: self.request_timeout,
            },
        ))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Read(args) => read(args),
        Command::Readers => readers(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn read(args: ReadArgs) -> anyhow::Result<()> {
    let settings = args.settings()?;

    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel()).context("Could not install the Ctrl-C handler")?;

    let ctx = Context::try_new()?;
    let reader = ctx.open(settings.reader.as_deref())?;
    info!("Using reader: {}", reader.name());

    let service = HttpService::open(&settings.service).context("Could not reach the service")?;

    let mut relay = Relay::new(service, settings.template, settings.relay);
    let outcome = relay.run(reader, &cancel).map_err(|e| match e.round() {
        Some(round) => anyhow::Error::new(e).context(format!(
            "Reading aborted in round {}, partial results are void",
            round
        )),
        None => anyhow::Error::new(e).context("Reading aborted"),
    })?;

    if outcome.completion == Completion::RoundLimit {
        warn!(
            "The service still issued commands after {} rounds; the result may be incomplete",
            outcome.rounds
        );
    }

    let reply = outcome.reply.into_value();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print!("{}", Summary(&reply));
    }

    Ok(())
}

fn readers() -> anyhow::Result<()> {
    let ctx = Context::try_new()?;

    for name in ctx.readers()? {
        println!("{}", name);
    }

    Ok(())
}
