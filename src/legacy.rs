// 📥 Legacy CSV logbook import
//
// The first ledger was a CSV file written one deposit per row:
//
//   Tangent, Tanggal, Nasabah, Petugas, Lokasi,
//   Burnable, Paper, ..., Hazardous,
//   Total_Bayar_Nasabah, Est_Pendapatan_Bank, Est_Profit
//
// (entry timestamp, deposit date, depositor, operator, site, weights, then
// paid / estimated revenue / estimated profit). The earliest files stop after
// the weight columns. Rows are imported as-is: recorded figures are kept,
// never re-priced, and missing financial columns follow the same fallback as
// old ledger rows.
//
// Files that started with the short header sometimes had full-width rows
// appended without a header change. Those rows carry exactly three trailing
// fields, read positionally as paid / revenue / profit. Any other surplus is
// rejected rather than dropped.

use log::info;
use serde::Deserialize;
use std::path::Path;

use crate::category::{Category, CategoryMap};
use crate::error::{LedgerError, Result};
use crate::ledger::{midnight_utc, parse_date, parse_timestamp, LedgerStore};
use crate::record::{RecordMeta, StoredRow, TransactionRecord};

/// Trailing financial columns, in file order
const FINANCIAL_HEADERS: [&str; 3] = ["Total_Bayar_Nasabah", "Est_Pendapatan_Bank", "Est_Profit"];

#[derive(Debug, Deserialize)]
struct LegacyRow {
    #[serde(rename = "Tangent", default)]
    timestamp: Option<String>,
    #[serde(rename = "Tanggal")]
    date: String,
    #[serde(rename = "Nasabah", alias = "Nama_Nasabah", default)]
    depositor: Option<String>,
    #[serde(rename = "Petugas", default)]
    operator: Option<String>,
    #[serde(rename = "Lokasi", default)]
    site: Option<String>,

    #[serde(rename = "Burnable", default)]
    burnable: Option<f64>,
    #[serde(rename = "Paper", default)]
    paper: Option<f64>,
    #[serde(rename = "Cloth", default)]
    cloth: Option<f64>,
    #[serde(rename = "Cans", default)]
    cans: Option<f64>,
    #[serde(rename = "Electronics", default)]
    electronics: Option<f64>,
    #[serde(rename = "PET_Bottles", default)]
    pet_bottles: Option<f64>,
    #[serde(rename = "Plastic_Marks", default)]
    plastic_marks: Option<f64>,
    #[serde(rename = "White_Trays", default)]
    white_trays: Option<f64>,
    #[serde(rename = "Glass_Bottles", default)]
    glass_bottles: Option<f64>,
    #[serde(rename = "Metal_Small", default)]
    metal_small: Option<f64>,
    #[serde(rename = "Hazardous", default)]
    hazardous: Option<f64>,

    #[serde(rename = "Total_Bayar_Nasabah", default)]
    total_paid: Option<f64>,
    #[serde(rename = "Est_Pendapatan_Bank", default)]
    total_resale_revenue: Option<f64>,
    #[serde(rename = "Est_Profit", default)]
    gross_profit: Option<f64>,
}

impl LegacyRow {
    fn weights(&self) -> CategoryMap {
        let values = [
            self.burnable,
            self.paper,
            self.cloth,
            self.cans,
            self.electronics,
            self.pet_bottles,
            self.plastic_marks,
            self.white_trays,
            self.glass_bottles,
            self.metal_small,
            self.hazardous,
        ];
        Category::ALL
            .iter()
            .zip(values)
            .map(|(c, w)| (*c, w.unwrap_or(0.0)))
            .collect()
    }

    fn into_record(self, line: usize) -> Result<TransactionRecord> {
        let date = parse_date(&self.date).ok_or_else(|| {
            LedgerError::validation("Tanggal", format!("line {}: bad date '{}'", line, self.date))
        })?;

        let weights = self.weights();
        if let Some((category, weight)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(LedgerError::validation(
                category.as_str(),
                format!("line {}: invalid weight {}", line, weight),
            ));
        }

        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| midnight_utc(date));

        Ok(TransactionRecord::restore(StoredRow {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            meta: RecordMeta {
                date,
                depositor: self.depositor.unwrap_or_default(),
                operator: self.operator.unwrap_or_default(),
                site: self.site.unwrap_or_default(),
            },
            weights,
            // payout rates were never written to the CSV logbook
            payout_rates: CategoryMap::new(),
            total_paid: self.total_paid,
            total_resale_revenue: self.total_resale_revenue,
            gross_profit: self.gross_profit,
            catalog_fingerprint: None,
        }))
    }
}

/// Parse a legacy logbook into records without touching the ledger
pub fn load_legacy_csv(csv_path: &Path) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)?;

    let headers = rdr.headers()?.clone();
    let has_financial_headers = headers.iter().any(|h| FINANCIAL_HEADERS.contains(&h));

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        // header is line 1
        let line = i + 2;
        let raw = result?;

        let row = if raw.len() <= headers.len() {
            raw.deserialize::<LegacyRow>(Some(&headers))?
        } else {
            let surplus = raw.len() - headers.len();
            if has_financial_headers || surplus != FINANCIAL_HEADERS.len() {
                return Err(LedgerError::validation(
                    "row",
                    format!(
                        "line {}: {} fields under a {}-column header",
                        line,
                        raw.len(),
                        headers.len()
                    ),
                ));
            }
            let known: csv::StringRecord = raw.iter().take(headers.len()).collect();
            let mut row = known.deserialize::<LegacyRow>(Some(&headers))?;
            let trailing: Vec<&str> = raw.iter().skip(headers.len()).collect();
            row.total_paid = parse_amount(trailing[0], FINANCIAL_HEADERS[0], line)?;
            row.total_resale_revenue = parse_amount(trailing[1], FINANCIAL_HEADERS[1], line)?;
            row.gross_profit = parse_amount(trailing[2], FINANCIAL_HEADERS[2], line)?;
            row
        };

        records.push(row.into_record(line)?);
    }

    Ok(records)
}

/// Empty is absent; anything else must be a number
fn parse_amount(field: &str, column: &str, line: usize) -> Result<Option<f64>> {
    if field.is_empty() {
        return Ok(None);
    }
    field.parse::<f64>().map(Some).map_err(|_| {
        LedgerError::validation(column, format!("line {}: '{}' is not a number", line, field))
    })
}

impl LedgerStore {
    /// Import a legacy CSV logbook. All rows are appended in one transaction,
    /// or none if any row is invalid.
    pub fn import_legacy_csv(&self, csv_path: &Path) -> Result<usize> {
        let records = load_legacy_csv(csv_path)?;
        let inserted = self.append_all(&records)?;
        info!("imported {} legacy rows from {}", inserted, csv_path.display());
        Ok(inserted)
    }
}
