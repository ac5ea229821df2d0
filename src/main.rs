use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use provision_cli::cli::Cli;
use provision_cli::config::Config;
use provision_cli::exec::SystemExecutor;
use provision_cli::logging::{self, Log, Logger};
use provision_cli::steps::Environment;
use provision_cli::{VERSION, runner};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    logging::init_subscriber(args.verbose);

    let log = Arc::new(Logger::new());
    log.info(&format!("provision {VERSION}"));

    let config = Config::load(&args.config)?;
    let env = Environment::new(
        args.base_dir()?,
        args.options(),
        Arc::clone(&log) as Arc<dyn Log>,
        Arc::new(SystemExecutor),
    )?;
    log.debug(&format!("dotfiles directory: {}", env.base_dir.display()));

    runner::run(&config, &env, &log)
}
