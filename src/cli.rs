use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sentryd")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Availability monitor for HTTP and database targets")]
pub struct Cli {
    /// Directory containing websites.json / databases.json
    #[arg(long = "config-dir", default_value = "config")]
    pub config_dir: String,

    /// Directory the journal is written to
    #[arg(long = "log-dir", default_value = "logs")]
    pub log_dir: String,

    /// Seconds between ticks
    #[arg(long = "interval", default_value_t = 300)]
    pub interval: u64,

    /// Write a journal record for every probe, not only on transition
    #[arg(long = "log-all-checks")]
    pub log_all_checks: bool,

    /// Run exactly one tick, then exit
    #[arg(long = "once")]
    pub once: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
