pub mod cli;
pub mod core;
pub mod providers;
pub mod scheduler;
pub mod service;

use crate::core::cache::SnapshotCache;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::conversion::Direction;
use crate::providers::BcvRateSource;
use crate::scheduler::{RatePoller, Schedule};
use crate::service::RateService;
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Rates { json: bool },
    Convert { amount: Decimal, from: Option<Direction> },
    Calc,
    Serve,
}

/// Wires the rate service from configuration.
pub fn build_service(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Arc<RateService>> {
    let offset = config.schedule.offset()?;
    let source = BcvRateSource::new(&config.upstream, offset, clock)?;
    Ok(Arc::new(RateService::new(Arc::new(source))))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Tasa BCV starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = build_service(&config, Arc::clone(&clock))?;

    match command {
        AppCommand::Rates { json } => cli::rates::run(&service, json).await,
        AppCommand::Convert { amount, from } => cli::rates::convert(&service, amount, from).await,
        AppCommand::Calc => {
            let schedule = Schedule::from_config(&config.schedule)?;
            let poller = Arc::new(RatePoller::new(
                service,
                SnapshotCache::new(),
                clock,
                schedule,
            ));
            cli::calc::run(poller).await
        }
        AppCommand::Serve => cli::serve::run(service, &config.server.listen).await,
    }
}
