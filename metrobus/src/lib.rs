//! Scrapes Metrobus card data (balance, status, movements and monthly
//! statistics) from the card operator's session-based web portal.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
mod http_tools;
mod lookup;
pub mod model;
pub mod params;
pub mod service;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;

pub use client::{HttpPortal, HttpSession, Portal, PortalSession, Service};
pub use config::PortalConfig;
pub use error::{CardError, ExtractError};
pub use model::{
    CardInfo, CardMovement, CardNumber, CardResume, CardStatsBundle, MonthlyStat, SessionToken,
};
pub use service::CardService;

#[derive(Debug, Parser)]
#[clap(version, about = "Look up Metrobus card data on the card portal")]
pub struct Cli {
    #[clap(
        short = 'c',
        long = "config",
        global = true,
        help = "Portal config file (TOML)"
    )]
    config: Option<PathBuf>,
    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        help = "Log session and query details (-vv for extractor traces)"
    )]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Balance and contract status from the session page
    Info(lookup::Cmd),
    /// Card status, type and balance
    Resume(lookup::Cmd),
    /// Recent transactions
    Movements(lookup::Cmd),
    /// Amounts used and charged per month
    Stats(lookup::Cmd),
    /// Check that the portal issues a session token for the card
    Token(lookup::Cmd),
}

impl Cli {
    /// Filter used when `RUST_LOG` is unset. Other crates stay at `warn` so
    /// reqwest and hyper chatter does not drown the lookup output.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("warn,metrobus_scraper={level}")
    }

    pub async fn run(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => PortalConfig::load(path).await?,
            None => PortalConfig::default(),
        };
        let service = CardService::from_config(config);
        let service = &service;

        match &self.command {
            Command::Info(cmd) => cmd.run(|card| service.card_info(card)).await?,
            Command::Resume(cmd) => cmd.run(|card| service.card_resume(card)).await?,
            Command::Movements(cmd) => cmd.run(|card| service.movements(card)).await?,
            Command::Stats(cmd) => cmd.run(|card| service.stats(card)).await?,
            Command::Token(cmd) => {
                cmd.run(|card| async move {
                    service.session_token(card).await.map(|_| "issued")
                })
                .await?
            }
        }

        Ok(())
    }
}
