use chrono::NaiveDate;
use csv::StringRecord;

use crate::errors::CoreError;
use crate::models::transaction::{normalize_symbol, Transaction, TransactionRow};

/// Date format used in every date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns written by the earliest version of the tracker.
pub const COLUMNS_V1: &[&str] = &[
    "Date",
    "Symbol",
    "Quantity",
    "Buy Price",
    "Current Price",
    "Last Updated",
];

/// V1 plus the sector column.
pub const COLUMNS_V2: &[&str] = &[
    "Date",
    "Symbol",
    "Quantity",
    "Buy Price",
    "Current Price",
    "Last Updated",
    "Sector",
];

/// Current layout: V2 plus industry and beta.
pub const COLUMNS_V3: &[&str] = &[
    "Date",
    "Symbol",
    "Quantity",
    "Buy Price",
    "Current Price",
    "Last Updated",
    "Sector",
    "Industry",
    "Beta",
];

/// Row layouts the transaction CSV has gone through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
}

impl SchemaVersion {
    /// The layout every save writes.
    pub const CURRENT: SchemaVersion = SchemaVersion::V3;

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            SchemaVersion::V1 => COLUMNS_V1,
            SchemaVersion::V2 => COLUMNS_V2,
            SchemaVersion::V3 => COLUMNS_V3,
        }
    }

    /// Identify the layout from a header record. Column names are compared
    /// case-insensitively, ignoring surrounding whitespace.
    pub fn detect(header: &StringRecord) -> Result<Self, CoreError> {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        [SchemaVersion::V3, SchemaVersion::V2, SchemaVersion::V1]
            .into_iter()
            .find(|version| {
                let columns = version.columns();
                columns.len() == names.len()
                    && columns
                        .iter()
                        .zip(&names)
                        .all(|(expected, got)| expected.to_lowercase() == *got)
            })
            .ok_or_else(|| {
                CoreError::InvalidFileFormat(format!(
                    "Unrecognized transaction header: {}",
                    header.iter().collect::<Vec<_>>().join(",")
                ))
            })
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
            SchemaVersion::V3 => write!(f, "v3"),
        }
    }
}

/// Decode one CSV record laid out as `version`.
///
/// Columns missing from older layouts (or from short rows) are backfilled
/// with `None`. Empty cells and `nan` count as missing. A missing current
/// price falls back to the buy price.
pub fn decode_row(
    record: &StringRecord,
    version: SchemaVersion,
    line: u64,
) -> Result<TransactionRow, CoreError> {
    let invalid = |message: String| CoreError::InvalidRow { line, message };
    let width = version.columns().len();
    let field = |idx: usize| {
        (idx < width)
            .then(|| record.get(idx))
            .flatten()
            .map(str::trim)
            .filter(|v| !is_missing(v))
    };

    let date_str = field(0).ok_or_else(|| invalid("missing date".into()))?;
    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
        .map_err(|e| invalid(format!("invalid date '{date_str}': {e}")))?;

    let symbol = field(1)
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("missing symbol".into()))?;

    let quantity = parse_number(field(2), "quantity").map_err(&invalid)?
        .ok_or_else(|| invalid("missing quantity".into()))?;
    let buy_price = parse_number(field(3), "buy price").map_err(&invalid)?
        .ok_or_else(|| invalid("missing buy price".into()))?;
    let current_price = parse_number(field(4), "current price")
        .map_err(&invalid)?
        .unwrap_or(buy_price);

    let last_updated = field(5)
        .map(|v| {
            NaiveDate::parse_from_str(v, DATE_FORMAT)
                .map_err(|e| invalid(format!("invalid last-updated date '{v}': {e}")))
        })
        .transpose()?;

    let sector = field(6).map(str::to_string);
    let industry = field(7).map(str::to_string);
    let beta = parse_number(field(8), "beta").map_err(&invalid)?;

    let transaction =
        Transaction::new(date, symbol, quantity, buy_price).with_profile(sector, industry, beta);

    Ok(TransactionRow {
        transaction,
        current_price,
        last_updated,
    })
}

/// Encode a row in the current layout.
pub fn encode_row(row: &TransactionRow) -> Vec<String> {
    let tx = &row.transaction;
    vec![
        tx.date.format(DATE_FORMAT).to_string(),
        tx.symbol.clone(),
        tx.quantity.to_string(),
        tx.buy_price.to_string(),
        row.current_price.to_string(),
        row.last_updated
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default(),
        tx.sector.clone().unwrap_or_default(),
        tx.industry.clone().unwrap_or_default(),
        tx.beta.map(|b| b.to_string()).unwrap_or_default(),
    ]
}

/// Empty cells, and the `nan`/`None` markers older files contain.
fn is_missing(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("nan") || value == "None"
}

fn parse_number(value: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    match value {
        None => Ok(None),
        Some(v) => {
            let parsed: f64 = v
                .parse()
                .map_err(|e| format!("invalid {name} '{v}': {e}"))?;
            if parsed.is_finite() {
                Ok(Some(parsed))
            } else {
                Err(format!("{name} '{v}' is not a finite number"))
            }
        }
    }
}
