use chrono::{DateTime, FixedOffset, Utc};
use secrecy::SecretString;
use serde::Serialize;

use crate::model::{serialize_secret, CardNumber, SessionToken};

/// How far back the commerce servlet lists movements.
pub const MOVEMENT_DAYS: u32 = 45;

/// Item group, item code and action the commerce servlet dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerQuery {
    pub item_group: u32,
    pub item_code: u32,
    pub action: u32,
}

impl LedgerQuery {
    /// Balance resume page, which also carries the monthly statistics.
    pub const RESUME: LedgerQuery = LedgerQuery {
        item_group: 2000,
        item_code: 1,
        action: 6,
    };
    pub const MOVEMENTS: LedgerQuery = LedgerQuery {
        item_group: 3000,
        item_code: 2,
        action: 1,
    };
}

/// Query string for the session servlet. The fixed values identify the
/// public web channel to the portal.
#[derive(Debug, Serialize)]
pub struct SessionLookupParams<'a> {
    accion: u32,
    #[serde(rename = "NumDistribuidor")]
    distributor: u32,
    #[serde(rename = "NomUsuario")]
    user_name: &'static str,
    #[serde(rename = "NomHost")]
    host: &'static str,
    #[serde(rename = "NonDominio")]
    domain: &'static str,
    #[serde(rename = "RutUsuario")]
    user_rut: &'static str,
    #[serde(rename = "NumTarjeta")]
    card: &'a str,
    bloqueable: &'static str,
}

impl<'a> SessionLookupParams<'a> {
    pub fn new(card: &'a CardNumber) -> Self {
        SessionLookupParams {
            accion: 6,
            distributor: 99,
            user_name: "usuInternet",
            host: "AFT",
            domain: "aft.cl",
            user_rut: "0",
            card: card.as_str(),
            bloqueable: "",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerQueryParams {
    #[serde(rename = "KSI", serialize_with = "serialize_secret")]
    token: SecretString,
    accion: u32,
    itemms: u32,
    item: u32,
    #[serde(rename = "DiasMov")]
    movement_days: u32,
    fechalogeo: String,
    #[serde(rename = "FechaInicioMovimientos")]
    movements_since: String,
}

impl LedgerQueryParams {
    /// Stamps the query with the current portal-local time.
    pub fn new(token: SessionToken, query: LedgerQuery) -> Self {
        Self::at(token, query, Utc::now())
    }

    pub fn at(token: SessionToken, query: LedgerQuery, now: DateTime<Utc>) -> Self {
        LedgerQueryParams {
            token: token.into_secret(),
            accion: query.action,
            itemms: query.item_group,
            item: query.item_code,
            movement_days: MOVEMENT_DAYS,
            fechalogeo: portal_timestamp(now),
            movements_since: String::new(),
        }
    }
}

/// Panama stays on UTC-5 all year.
fn panama() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).expect("UTC-5 is in range")
}

/// `YYYYMMDDHHMMSS` in Panama local time.
pub fn portal_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&panama())
        .format("%Y%m%d%H%M%S")
        .to_string()
}
