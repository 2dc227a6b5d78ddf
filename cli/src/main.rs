use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

use commands::Subcommand;

/// An assembler and emulator for the LC-3 teaching architecture
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opt {
    #[command(subcommand)]
    command: Subcommand,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase the level of verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opt {
    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "info,lc3_emulator=debug,lc3_cli=debug",
            2 => "debug,lc3_emulator=trace,lc3_cli=trace",
            _ => "trace",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(opt.log_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so program output stays clean on stdout
    if opt.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    opt.command.exec()
}
