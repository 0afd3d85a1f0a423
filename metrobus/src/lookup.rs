use std::future::Future;

use clap::Args;
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, instrument};

use crate::{error::CardError, model::CardNumber};

#[derive(Debug, Args)]
pub struct Cmd {
    #[clap(required = true, help = "Card numbers to look up")]
    cards: Vec<CardNumber>,
}

#[derive(Debug, Serialize)]
struct Output<'a, T> {
    card: &'a CardNumber,
    data: T,
}

impl Cmd {
    /// Runs `lookup` for every card at once and prints each result as JSON.
    #[instrument("lookup", skip_all, fields(cards = self.cards.len()))]
    pub(crate) async fn run<'a, T, F, Fut>(&'a self, lookup: F) -> Result<()>
    where
        F: Fn(&'a CardNumber) -> Fut,
        Fut: Future<Output = Result<T, CardError>>,
        T: Serialize,
    {
        let results = join_all(self.cards.iter().map(&lookup)).await;

        let mut failed = 0;
        for (card, result) in self.cards.iter().zip(results) {
            match result {
                Ok(data) => {
                    let buf = serde_json::to_string_pretty(&Output { card, data })?;
                    println!("{buf}");
                }
                Err(err) => {
                    failed += 1;
                    error!(%card, error = ?err, "Lookup failed");
                }
            }
        }

        if failed > 0 {
            return Err(eyre!("{failed} of {} lookups failed", self.cards.len()));
        }
        Ok(())
    }
}
