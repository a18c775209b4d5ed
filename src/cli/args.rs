use crate::core::{EngineConfig, FundsPolicy};
use crate::logging::LogFormat;
use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Apply a file of money transfers to a file of bank accounts
#[derive(Parser, Debug)]
#[command(name = "bank-transfer-engine")]
#[command(about = "Apply money transfers between bank accounts", long_about = None)]
pub struct CliArgs {
    /// CSV file with the opening state of every account
    #[arg(value_name = "ACCOUNTS", help = "Path to the accounts CSV file (id,owner,balance,currency)")]
    pub accounts_file: PathBuf,

    /// CSV file with the transfers to apply
    #[arg(value_name = "TRANSFERS", help = "Path to the transfers CSV file (from,to,amount)")]
    pub transfers_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "concurrent",
        help = "Processing strategy: 'sequential' applies transfers in file order, 'concurrent' runs batches in parallel"
    )]
    pub strategy: StrategyType,

    /// Number of transfers per batch (concurrent mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of transfers per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of transfers in flight (concurrent mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of transfers running concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// Let balances go negative
    #[arg(long = "allow-overdraft", help = "Allow transfers that overdraw the source account")]
    pub allow_overdraft: bool,

    /// Per-transfer deadline in milliseconds
    #[arg(
        long = "timeout-ms",
        value_name = "MILLIS",
        help = "Abort a transfer that takes longer than this (default: 5000, 0 disables)"
    )]
    pub timeout_ms: Option<u64>,

    /// Log output format
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "text",
        help = "Log format on stderr: 'text' or 'json'"
    )]
    pub log_format: LogFormat,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sequential,
    Concurrent,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values use the defaults; zero values are replaced by the
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create an EngineConfig from CLI arguments
    pub fn to_engine_config(&self) -> EngineConfig {
        let funds_policy = if self.allow_overdraft {
            FundsPolicy::AllowOverdraft
        } else {
            FundsPolicy::RequireSufficientFunds
        };
        let timeout = match self.timeout_ms {
            Some(0) => None,
            Some(millis) => Some(Duration::from_millis(millis)),
            None => Some(EngineConfig::DEFAULT_TIMEOUT),
        };

        EngineConfig::new(funds_policy, timeout)
    }
}
