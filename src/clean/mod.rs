use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Invoice numbers starting with this marker denote returns; their negative
/// quantities are legitimate.
pub const RETURN_INVOICE_PREFIX: &str = "C";

/// Timestamp layout written to cleaned CSVs; loads straight into the
/// `timestamp` staging column.
pub const INVOICE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layouts accepted on input: our own converter output first, then the
/// formats seen in raw exports of the dataset.
const INPUT_DATE_FORMATS: &[&str] = &[
    INVOICE_DATE_FORMAT,
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// One transaction row as converted from the spreadsheet. Everything stays
/// text here; validation happens in [`scrub`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: String,
    #[serde(rename = "StockCode")]
    pub stock_code: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: String,
    #[serde(rename = "UnitPrice")]
    pub unit_price: String,
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "Country")]
    pub country: String,
}

/// A row that passed the removal policy, with quantity and price parsed and
/// the date canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: String,
    #[serde(rename = "StockCode")]
    pub stock_code: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: String,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "Country")]
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingCustomer,
    ZeroQuantity,
    InvalidNegative,
    Unparseable,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub total: u64,
    pub kept: u64,
    pub missing_customer: u64,
    pub zero_quantity: u64,
    pub invalid_negative: u64,
    pub unparseable: u64,
}

impl CleanStats {
    fn bump(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingCustomer => self.missing_customer += 1,
            DropReason::ZeroQuantity => self.zero_quantity += 1,
            DropReason::InvalidNegative => self.invalid_negative += 1,
            DropReason::Unparseable => self.unparseable += 1,
        }
    }

    pub fn removed(&self) -> u64 {
        self.total - self.kept
    }
}

/// Path the cleaner writes for a raw CSV: `sales_data_x.csv` becomes
/// `cleaned_sales_data_x.csv` in the same directory.
pub fn cleaned_csv_path(raw_csv: &Path) -> PathBuf {
    let name = raw_csv
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    raw_csv.with_file_name(format!("cleaned_{}", name))
}

/// Apply the row-removal policy to one record.
///
/// Dropped: empty customer id, quantity of exactly zero, negative quantity on
/// a non-return invoice, and anything whose quantity, price, or date does not
/// parse.
pub fn scrub(raw: &RawRecord) -> Result<CleanedRecord, DropReason> {
    if raw.customer_id.trim().is_empty() {
        return Err(DropReason::MissingCustomer);
    }
    let quantity: i64 = raw
        .quantity
        .trim()
        .parse()
        .map_err(|_| DropReason::Unparseable)?;
    if quantity == 0 {
        return Err(DropReason::ZeroQuantity);
    }
    if quantity < 0 && !raw.invoice_no.starts_with(RETURN_INVOICE_PREFIX) {
        return Err(DropReason::InvalidNegative);
    }
    let unit_price: f64 = raw
        .unit_price
        .trim()
        .parse()
        .map_err(|_| DropReason::Unparseable)?;
    let invoice_date = parse_invoice_date(&raw.invoice_date).ok_or(DropReason::Unparseable)?;

    Ok(CleanedRecord {
        invoice_no: raw.invoice_no.clone(),
        stock_code: raw.stock_code.clone(),
        description: raw.description.clone(),
        quantity,
        invoice_date: invoice_date.format(INVOICE_DATE_FORMAT).to_string(),
        unit_price,
        customer_id: raw.customer_id.trim().to_string(),
        country: raw.country.clone(),
    })
}

/// Try each accepted layout in order.
pub fn parse_invoice_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    INPUT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Clean `raw_csv` into its derived output path, returning that path.
///
/// No-op when the output already exists, so a rerun never redoes (or
/// clobbers) finished work. Writes through a temp file and renames at the
/// end, keeping the existence check trustworthy.
pub fn clean_csv(raw_csv: &Path) -> Result<PathBuf> {
    let cleaned = cleaned_csv_path(raw_csv);
    if cleaned.exists() {
        info!(path = %cleaned.display(), "already cleaned");
        return Ok(cleaned);
    }

    let mut reader = csv::Reader::from_path(raw_csv)
        .with_context(|| format!("opening `{}`", raw_csv.display()))?;
    let tmp_path = cleaned.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp_path)
        .with_context(|| format!("creating `{}`", tmp_path.display()))?;

    let mut stats = CleanStats::default();
    for (idx, result) in reader.deserialize::<RawRecord>().enumerate() {
        stats.total += 1;
        let raw = match result {
            Ok(record) => record,
            Err(err) => {
                warn!(row = idx + 1, error = %err, "unreadable row; dropped");
                stats.bump(DropReason::Unparseable);
                continue;
            }
        };
        match scrub(&raw) {
            Ok(record) => {
                writer.serialize(record)?;
                stats.kept += 1;
            }
            Err(reason) => stats.bump(reason),
        }
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp_path, &cleaned)
        .with_context(|| format!("renaming `{}`", tmp_path.display()))?;

    info!(
        before = stats.total,
        after = stats.kept,
        removed = stats.removed(),
        missing_customer = stats.missing_customer,
        zero_quantity = stats.zero_quantity,
        invalid_negative = stats.invalid_negative,
        unparseable = stats.unparseable,
        path = %cleaned.display(),
        "cleaned"
    );
    Ok(cleaned)
}
