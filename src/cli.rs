use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hiddencrawl", about = "Tor/I2P/clearnet dark-web crawler")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the crawl loop against the configured site list, forever.
    Crawl,
    /// Print database and object store counts and exit.
    Status,
}
