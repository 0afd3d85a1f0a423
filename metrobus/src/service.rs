use scraper::Html;
use tracing::{debug, info, instrument};

use crate::{
    client::{HttpPortal, Portal, PortalSession, Service},
    config::PortalConfig,
    error::{CardError, ExtractError},
    extract::{
        extract_headered_table, extract_label_value_block, extract_session_token,
        extract_three_row_matrix, record_from_block, records_from_table,
    },
    model::{
        CardInfo, CardMovement, CardNumber, CardResume, CardStatsBundle, MonthlyStat,
        SessionToken,
    },
    params::{LedgerQuery, LedgerQueryParams, SessionLookupParams},
};

// The session page pads this label with two spaces; the resume page does not.
const SESSION_BALANCE_LABEL: &str = "Saldo  tarjeta:";
const RESUME_BALANCE_LABEL: &str = "Saldo tarjeta:";
const MOVEMENTS_TITLE: &str = "Saldos y movimientos";
const USES_TITLE: &str = "Monto utilizado";
const CHARGES_TITLE: &str = "Monto cargado";

/// Looks card data up on the portal.
///
/// Every operation opens its own sessions and fetches a fresh token, so one
/// service can serve concurrent lookups for different cards.
#[derive(Debug, Clone)]
pub struct CardService<P = HttpPortal> {
    portal: P,
}

impl CardService<HttpPortal> {
    pub fn from_config(config: PortalConfig) -> Self {
        CardService::new(HttpPortal::new(config))
    }
}

impl<P: Portal> CardService<P> {
    pub fn new(portal: P) -> Self {
        CardService { portal }
    }

    /// Balance snapshot from the session page. No ledger query needed.
    #[instrument("card_info", skip_all, fields(%card))]
    pub async fn card_info(&self, card: &CardNumber) -> Result<CardInfo, CardError> {
        let page = self.session_lookup(card).await?;
        let info = parse_card_info(&page)?;
        info!("Fetched card info");
        Ok(info)
    }

    #[instrument("session_token", skip_all, fields(%card))]
    pub async fn session_token(&self, card: &CardNumber) -> Result<SessionToken, CardError> {
        let page = self.session_lookup(card).await?;
        let token = extract_session_token(&Html::parse_document(&page))?;
        debug!("Obtained session token");
        Ok(token)
    }

    #[instrument("card_resume", skip_all, fields(%card))]
    pub async fn card_resume(&self, card: &CardNumber) -> Result<CardResume, CardError> {
        let page = self.ledger(card, LedgerQuery::RESUME).await?;
        let resume = parse_card_resume(&page)?;
        info!("Fetched card resume");
        Ok(resume)
    }

    #[instrument("movements", skip_all, fields(%card))]
    pub async fn movements(&self, card: &CardNumber) -> Result<Vec<CardMovement>, CardError> {
        let page = self.ledger(card, LedgerQuery::MOVEMENTS).await?;
        let movements = parse_movements(&page)?;
        info!(count = movements.len(), "Fetched movements");
        Ok(movements)
    }

    /// Uses and charges per month. Both tables sit on the resume page.
    #[instrument("stats", skip_all, fields(%card))]
    pub async fn stats(&self, card: &CardNumber) -> Result<CardStatsBundle, CardError> {
        let page = self.ledger(card, LedgerQuery::RESUME).await?;
        let stats = parse_stats(&page)?;
        info!(
            uses = stats.uses.len(),
            charges = stats.charges.len(),
            "Fetched stats"
        );
        Ok(stats)
    }

    async fn session_lookup(&self, card: &CardNumber) -> Result<String, CardError> {
        let session = self.portal.create_session().await?;
        session
            .query(Service::Session, &SessionLookupParams::new(card))
            .await
    }

    /// Token lookup followed by a commerce query on a second fresh session.
    async fn ledger(&self, card: &CardNumber, query: LedgerQuery) -> Result<String, CardError> {
        let token = self.session_token(card).await?;
        let params = LedgerQueryParams::new(token, query);
        debug!(?query, "Querying ledger");
        let session = self.portal.create_session().await?;
        session.query(Service::Commerce, &params).await
    }
}

fn parse_card_info(page: &str) -> Result<CardInfo, ExtractError> {
    let doc = Html::parse_document(page);
    let block = extract_label_value_block(&doc, SESSION_BALANCE_LABEL)?;
    record_from_block(&block, SESSION_BALANCE_LABEL)
}

fn parse_card_resume(page: &str) -> Result<CardResume, ExtractError> {
    let doc = Html::parse_document(page);
    let block = extract_label_value_block(&doc, RESUME_BALANCE_LABEL)?;
    record_from_block(&block, RESUME_BALANCE_LABEL)
}

fn parse_movements(page: &str) -> Result<Vec<CardMovement>, ExtractError> {
    let doc = Html::parse_document(page);
    let table = extract_headered_table(&doc, MOVEMENTS_TITLE)?;
    records_from_table(table, MOVEMENTS_TITLE)
}

fn parse_stats(page: &str) -> Result<CardStatsBundle, ExtractError> {
    let doc = Html::parse_document(page);
    let monthly = |title: &str| -> Result<Vec<MonthlyStat>, ExtractError> {
        Ok(extract_three_row_matrix(&doc, title)?
            .into_iter()
            .map(MonthlyStat::from)
            .collect())
    };
    Ok(CardStatsBundle {
        uses: monthly(USES_TITLE)?,
        charges: monthly(CHARGES_TITLE)?,
    })
}
