use clap::Parser;

/// Black-box contract checks against an Ensek energy-trading deployment
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration describing the target deployment
    #[arg(short, long, default_value = "ensek_quest.toml")]
    pub path: String,

    /// Include response-body detail for failed and skipped scenarios
    #[arg(short, long)]
    pub detail: bool,
}
