//! # ith CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;

/// Identity transfer holder client tooling.
#[derive(Parser, Debug)]
#[command(name = "ith", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Decode a holder snapshot and report what the client would do.
    Inspect(ith_cli::inspect::InspectArgs),
    /// Extract the registration id from a pairing link.
    RegistrationId(ith_cli::registration::RegistrationIdArgs),
    /// Render the time left until a timestamp.
    Countdown(ith_cli::countdown::CountdownArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Inspect(args) => ith_cli::inspect::run(&args),
        Commands::RegistrationId(args) => ith_cli::registration::run(&args),
        Commands::Countdown(args) => ith_cli::countdown::run(&args),
    }
}
