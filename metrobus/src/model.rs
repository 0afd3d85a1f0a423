use std::{fmt, str::FromStr};

use secrecy::{ExposeSecret, Secret, SecretString, Zeroize};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Number printed on the card. Only presence is checked; the portal decides
/// whether it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CardNumber(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("card number must not be empty")]
pub struct EmptyCardNumber;

impl CardNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CardNumber {
    type Err = EmptyCardNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmptyCardNumber);
        }
        Ok(CardNumber(s.to_owned()))
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `KSI` value the session servlet hands out. Good for one ledger query.
#[derive(Debug)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn new(value: String) -> Self {
        SessionToken(Secret::new(value))
    }

    pub(crate) fn into_secret(self) -> SecretString {
        self.0
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

pub(crate) fn serialize_secret<T: Zeroize + Serialize, S: Serializer>(
    secret: &Secret<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    secret.expose_secret().serialize(serializer)
}

/// A record the portal renders as labelled cells.
///
/// `FIELDS` lists the slugified portal labels in the order `from_fields`
/// expects its values.
pub trait PortalRecord: Sized {
    const FIELDS: &'static [&'static str];

    /// Called with exactly `FIELDS.len()` values.
    fn from_fields(values: Vec<String>) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub card_number: String,
    pub contract_status: String,
    pub balance: String,
    pub balance_as_of_date: String,
}

impl PortalRecord for CardInfo {
    const FIELDS: &'static [&'static str] = &[
        "no_tarjeta",
        "estado_de_contrato",
        "saldo_tarjeta",
        "fecha_saldo",
    ];

    fn from_fields(values: Vec<String>) -> Option<Self> {
        let [card_number, contract_status, balance, balance_as_of_date] =
            <[String; 4]>::try_from(values).ok()?;
        Some(CardInfo {
            card_number,
            contract_status,
            balance,
            balance_as_of_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardResume {
    pub card_number: String,
    pub card_status: String,
    pub card_type: String,
    pub balance: String,
}

impl PortalRecord for CardResume {
    const FIELDS: &'static [&'static str] = &[
        "no_tarjeta",
        "estado_tarjeta",
        "tipo_de_tarjeta",
        "saldo_tarjeta",
    ];

    fn from_fields(values: Vec<String>) -> Option<Self> {
        let [card_number, card_status, card_type, balance] =
            <[String; 4]>::try_from(values).ok()?;
        Some(CardResume {
            card_number,
            card_status,
            card_type,
            balance,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMovement {
    pub transaction_id: String,
    pub movement_type: String,
    pub date_time: String,
    pub place: String,
    pub amount: String,
    pub balance_after: String,
}

impl PortalRecord for CardMovement {
    const FIELDS: &'static [&'static str] = &[
        "no_transaccion",
        "movimiento",
        "fecha_y_hora",
        "lugar",
        "monto",
        "saldo_tarjeta",
    ];

    fn from_fields(values: Vec<String>) -> Option<Self> {
        let [transaction_id, movement_type, date_time, place, amount, balance_after] =
            <[String; 6]>::try_from(values).ok()?;
        Some(CardMovement {
            transaction_id,
            movement_type,
            date_time,
            place,
            amount,
            balance_after,
        })
    }
}

/// One month column of a statistics table.
///
/// The portal renders three rows under the table title. The first row holds
/// the month labels, the second the amounts and the third the number of
/// operations, so each column becomes `(month, amount, count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    pub month: String,
    pub amount: String,
    pub count: String,
}

impl From<(String, String, String)> for MonthlyStat {
    fn from((month, amount, count): (String, String, String)) -> Self {
        MonthlyStat {
            month,
            amount,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatsBundle {
    pub uses: Vec<MonthlyStat>,
    pub charges: Vec<MonthlyStat>,
}
