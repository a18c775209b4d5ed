//! Bank Transfer Engine CLI
//!
//! Command-line interface for applying money transfers between accounts.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- accounts.csv transfers.csv > final_accounts.csv
//! cargo run -- --strategy sequential accounts.csv transfers.csv > final_accounts.csv
//! cargo run -- --strategy concurrent --batch-size 2000 --max-concurrent 8 accounts.csv transfers.csv
//! RUST_LOG=debug cargo run -- --log-format json accounts.csv transfers.csv
//! ```
//!
//! The program seeds a ledger from the accounts file, applies every transfer of
//! the transfers file through the engine using the selected processing
//! strategy, and writes the final account states to stdout. Logs go to stderr.
//!
//! # Processing Strategies
//!
//! - **sequential**: One transfer at a time, in file order
//! - **concurrent**: Batches of transfers running in parallel (default)
//!
//! # Exit Codes
//!
//! - 0: Success (individual transfers may still have failed)
//! - 1: Error (missing arguments, file not found, duplicate account, etc.)

use bank_transfer_engine::cli;
use bank_transfer_engine::logging::init_logging;
use bank_transfer_engine::strategy;
use std::process;
use tracing::{error, info};

fn main() {
    let args = cli::parse_args();
    init_logging(args.log_format);

    let strategy = {
        let batch_config = if matches!(args.strategy, cli::StrategyType::Concurrent) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, args.to_engine_config(), batch_config)
    };

    let mut output = std::io::stdout();
    match strategy.process(&args.accounts_file, &args.transfers_file, &mut output) {
        Ok(summary) => info!(
            accounts = summary.accounts,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Processing finished"
        ),
        Err(e) => {
            error!(error = %e, "Processing failed");
            process::exit(1);
        }
    }
}
