//! Pulls tables out of portal pages.
//!
//! The portal gives its tables no ids or classes. Each one is found by a
//! literal text node inside it (the anchor) and a fixed number of ancestor
//! hops from that node up to the enclosing table. All of that layout
//! knowledge lives in [`Anchor`]; the extractors below only interpret rows.

use std::{collections::BTreeMap, sync::LazyLock};

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{trace, warn};

use crate::{
    error::ExtractError,
    model::{PortalRecord, SessionToken},
};

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("tr selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("td selector"));
static SESSION_FIELD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[name="KSI"]"#).expect("KSI selector"));

/// Text node used to find a table, and how many element hops separate it
/// from that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor<'a> {
    pub text: &'a str,
    pub depth: usize,
}

impl<'a> Anchor<'a> {
    /// A label cell inside a label/value block: text → td → tr → table.
    pub const fn label(text: &'a str) -> Self {
        Anchor { text, depth: 3 }
    }

    /// A title inside a data table, one wrapper element deeper than a label.
    pub const fn title(text: &'a str) -> Self {
        Anchor { text, depth: 4 }
    }
}

pub type LabelValues = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Finds the first text node equal to `anchor.text` and walks `anchor.depth`
/// ancestors up from it.
///
/// `tbody`, `thead` and `tfoot` do not count as hops: an HTML5 parser
/// inserts them even where the portal's markup has none.
pub fn locate_table<'a>(
    doc: &'a Html,
    anchor: Anchor<'_>,
) -> Result<ElementRef<'a>, ExtractError> {
    let text_node = doc
        .tree
        .root()
        .descendants()
        .find(|node| matches!(node.value(), Node::Text(text) if &**text == anchor.text))
        .ok_or_else(|| ExtractError::not_found(anchor.text))?;

    let mut node = text_node;
    let mut hops = 0;
    while hops < anchor.depth {
        node = node
            .parent()
            .ok_or_else(|| ExtractError::not_found(anchor.text))?;
        let implied = node
            .value()
            .as_element()
            .is_some_and(|el| matches!(el.name(), "tbody" | "thead" | "tfoot"));
        if !implied {
            hops += 1;
        }
    }

    let table = ElementRef::wrap(node).ok_or_else(|| ExtractError::not_found(anchor.text))?;
    trace!(anchor = anchor.text, element = table.value().name(), "Located table");
    Ok(table)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect()
}

/// Every `tr` under `table`, each as the raw text of its `td` cells.
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .select(&ROW)
        .map(|row| row.select(&CELL).map(cell_text).collect())
        .collect()
}

fn trimmed(row: &[String]) -> Vec<String> {
    row.iter().map(|cell| cell.trim().to_owned()).collect()
}

/// Lowercases, folds accents and turns every run of other characters into a
/// single `_`. `"No. Transacción"` becomes `"no_transaccion"`, `"Nº"` becomes
/// `"no"`.
pub fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'º' => 'o',
            'ª' => 'a',
            other => other,
        };
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Reads a two-row block of `label, value, label, value, ...` cells.
///
/// Labels are slugified into keys; values are trimmed.
pub fn extract_label_value_block(doc: &Html, anchor: &str) -> Result<LabelValues, ExtractError> {
    let table = locate_table(doc, Anchor::label(anchor))?;
    let rows = table_rows(table);
    if rows.len() < 2 {
        return Err(ExtractError::malformed(
            anchor,
            format!("expected two rows, found {}", rows.len()),
        ));
    }

    let cells = rows[0].iter().chain(rows[1].iter()).collect::<Vec<_>>();
    if cells.len() % 2 != 0 {
        return Err(ExtractError::malformed(
            anchor,
            format!("{} cells do not pair into labels and values", cells.len()),
        ));
    }

    Ok(cells
        .chunks(2)
        .map(|pair| (slugify(pair[0]), pair[1].trim().to_owned()))
        .collect())
}

/// Reads a table whose second row is the header and whose remaining rows are
/// data. The first cell of every row is a spacer and is dropped; rows left
/// with nothing after that (separators, colspan notices) are skipped.
pub fn extract_headered_table(doc: &Html, title: &str) -> Result<HeaderedTable, ExtractError> {
    let table = locate_table(doc, Anchor::title(title))?;
    let rows = table_rows(table);
    let Some(header) = rows.get(1) else {
        return Err(ExtractError::malformed(title, "missing header row"));
    };
    if header.is_empty() {
        return Err(ExtractError::malformed(title, "header row has no cells"));
    }

    let columns = header[1..].iter().map(|name| slugify(name)).collect();
    let rows = rows[2..]
        .iter()
        .map(|row| trimmed(row.get(1..).unwrap_or_default()))
        .filter(|row| !row.is_empty())
        .collect();

    Ok(HeaderedTable { columns, rows })
}

/// Reads the three rows under a title as parallel arrays and zips them into
/// one triple per column, skipping each row's spacer cell.
pub fn extract_three_row_matrix(
    doc: &Html,
    title: &str,
) -> Result<Vec<(String, String, String)>, ExtractError> {
    let table = locate_table(doc, Anchor::title(title))?;
    let rows = table_rows(table);
    let [first, second, third] = match rows.get(1..4) {
        Some([a, b, c]) => [a, b, c],
        _ => {
            let found = rows.len().saturating_sub(1);
            return Err(ExtractError::malformed(
                title,
                format!("expected three rows under the title, found {found}"),
            ));
        }
    };

    let width = first.len();
    if width == 0 || second.len() != width || third.len() != width {
        return Err(ExtractError::malformed(
            title,
            format!(
                "rows have uneven widths: {}, {}, {}",
                first.len(),
                second.len(),
                third.len()
            ),
        ));
    }

    Ok((1..width)
        .map(|i| {
            (
                first[i].trim().to_owned(),
                second[i].trim().to_owned(),
                third[i].trim().to_owned(),
            )
        })
        .collect())
}

/// The hidden `KSI` form field the session servlet embeds in its page.
pub fn extract_session_token(doc: &Html) -> Result<SessionToken, ExtractError> {
    let field = doc
        .select(&SESSION_FIELD)
        .next()
        .ok_or_else(|| ExtractError::not_found("KSI"))?;
    let value = field
        .value()
        .attr("value")
        .ok_or_else(|| ExtractError::malformed("KSI", "session field has no value"))?;
    Ok(SessionToken::new(value.to_owned()))
}

/// Maps a label/value block onto `R` by looking up each of its labels.
pub fn record_from_block<R: PortalRecord>(
    block: &LabelValues,
    anchor: &str,
) -> Result<R, ExtractError> {
    let values = R::FIELDS
        .iter()
        .map(|field| {
            block
                .get(*field)
                .cloned()
                .ok_or_else(|| ExtractError::malformed(anchor, format!("missing label {field:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    R::from_fields(values).ok_or_else(|| ExtractError::malformed(anchor, "record width"))
}

/// Maps every data row onto `R` by position once the column count checks out.
pub fn records_from_table<R: PortalRecord>(
    table: HeaderedTable,
    title: &str,
) -> Result<Vec<R>, ExtractError> {
    if table.columns.len() != R::FIELDS.len() {
        return Err(ExtractError::malformed(
            title,
            format!(
                "expected {} columns, found {}: {:?}",
                R::FIELDS.len(),
                table.columns.len(),
                table.columns
            ),
        ));
    }
    if table.columns.iter().zip(R::FIELDS).any(|(got, want)| got.as_str() != *want) {
        warn!(title, columns = ?table.columns, expected = ?R::FIELDS, "Column names changed");
    }

    table
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != R::FIELDS.len() {
                return Err(ExtractError::malformed(
                    title,
                    format!("row {i} has {} cells, expected {}", row.len(), R::FIELDS.len()),
                ));
            }
            R::from_fields(row).ok_or_else(|| ExtractError::malformed(title, "record width"))
        })
        .collect()
}
