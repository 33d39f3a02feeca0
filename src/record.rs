// 🧾 Transaction Record Builder
//
// weights (kg) + payout rates + catalog snapshot + metadata -> immutable record
//
//   total_weight         = Σ w[c]
//   total_paid           = Σ w[c] * payout[c]
//   total_resale_revenue = Σ w[c] * catalog.sell[c]   (catalog at build time)
//   gross_profit         = total_resale_revenue - total_paid
//
// Payout rates the caller omits are resolved HERE from catalog buy rates and
// frozen on the record, so a later catalog change cannot alter a built record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::PriceCatalog;
use crate::category::{Category, CategoryMap};
use crate::error::{LedgerError, Result};

/// Ledger schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Rows written before financial and rate columns existed
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// METADATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Deposit date (may differ from the entry timestamp)
    pub date: NaiveDate,
    /// Depositor / source, e.g. a household or neighbourhood unit
    pub depositor: String,
    /// Staff member receiving the deposit
    pub operator: String,
    /// Collection site
    pub site: String,
}

impl RecordMeta {
    pub fn new(date: NaiveDate, depositor: &str, operator: &str, site: &str) -> Self {
        RecordMeta {
            date,
            depositor: depositor.to_string(),
            operator: operator.to_string(),
            site: site.to_string(),
        }
    }
}

// ============================================================================
// TRANSACTION RECORD
// ============================================================================

/// One deposit event. Fields are read-only outside the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub(crate) id: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) meta: RecordMeta,
    pub(crate) weight_by_category: CategoryMap,
    pub(crate) payout_rate_by_category: CategoryMap,
    pub(crate) total_weight: f64,
    pub(crate) total_paid: f64,
    pub(crate) total_resale_revenue: f64,
    pub(crate) gross_profit: f64,
    pub(crate) catalog_fingerprint: String,
    pub(crate) schema_version: u32,
    /// Which totals were actually recorded; absent ones read as 0
    pub(crate) recorded: RecordedTotals,
}

/// Presence of the stored financial totals, so a fallback zero is never
/// written back as if it had been recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RecordedTotals {
    pub paid: bool,
    pub resale_revenue: bool,
    pub gross_profit: bool,
}

impl RecordedTotals {
    const ALL: RecordedTotals = RecordedTotals {
        paid: true,
        resale_revenue: true,
        gross_profit: true,
    };
}

impl TransactionRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn date(&self) -> NaiveDate {
        self.meta.date
    }

    pub fn depositor(&self) -> &str {
        &self.meta.depositor
    }

    pub fn operator(&self) -> &str {
        &self.meta.operator
    }

    pub fn site(&self) -> &str {
        &self.meta.site
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    /// Weight for one category, 0 when absent
    pub fn weight(&self, category: Category) -> f64 {
        self.weight_by_category.get(&category).copied().unwrap_or(0.0)
    }

    /// Payout rate frozen at build time, 0 when absent (legacy rows)
    pub fn payout_rate(&self, category: Category) -> f64 {
        self.payout_rate_by_category.get(&category).copied().unwrap_or(0.0)
    }

    pub fn weight_by_category(&self) -> &CategoryMap {
        &self.weight_by_category
    }

    pub fn payout_rate_by_category(&self) -> &CategoryMap {
        &self.payout_rate_by_category
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn total_paid(&self) -> f64 {
        self.total_paid
    }

    pub fn total_resale_revenue(&self) -> f64 {
        self.total_resale_revenue
    }

    pub fn gross_profit(&self) -> f64 {
        self.gross_profit
    }

    /// Fingerprint of the catalog that valued this record (empty for legacy rows)
    pub fn catalog_fingerprint(&self) -> &str {
        &self.catalog_fingerprint
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// `total_paid` as stored, `None` when the source never recorded it
    pub fn recorded_total_paid(&self) -> Option<f64> {
        self.recorded.paid.then_some(self.total_paid)
    }

    pub fn recorded_total_resale_revenue(&self) -> Option<f64> {
        self.recorded.resale_revenue.then_some(self.total_resale_revenue)
    }

    pub fn recorded_gross_profit(&self) -> Option<f64> {
        self.recorded.gross_profit.then_some(self.gross_profit)
    }

    /// False when the financial fields are the legacy fallback zeros
    pub fn has_recorded_financials(&self) -> bool {
        self.schema_version >= CURRENT_SCHEMA_VERSION
    }

    /// Gross profit as a percentage of resale revenue; 0 when revenue is 0
    pub fn margin_percent(&self) -> f64 {
        if self.total_resale_revenue == 0.0 {
            0.0
        } else {
            self.gross_profit / self.total_resale_revenue * 100.0
        }
    }
}

/// Stored column values for a record read back from persistence
pub(crate) struct StoredRow {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub meta: RecordMeta,
    pub weights: CategoryMap,
    /// Only categories whose rate was stored
    pub payout_rates: CategoryMap,
    pub total_paid: Option<f64>,
    pub total_resale_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub catalog_fingerprint: Option<String>,
}

impl TransactionRecord {
    /// Rebuild a record from stored values, applying the missing-column policy:
    ///
    /// - `total_weight` is always recomputed from the weights
    /// - absent `total_paid` / `total_resale_revenue` resolve to 0
    /// - absent `gross_profit` is derived when both of the above exist, else 0
    /// - the record counts as legacy (`has_recorded_financials() == false`)
    ///   unless both `total_paid` and `total_resale_revenue` were stored
    /// - each stored total is kept even when the others are missing
    pub(crate) fn restore(row: StoredRow) -> Self {
        let weight_by_category = crate::category::complete_map(&row.weights);
        let total_weight = weight_by_category.values().sum();

        let totals = RecordedTotals {
            paid: row.total_paid.is_some(),
            resale_revenue: row.total_resale_revenue.is_some(),
            gross_profit: row.gross_profit.is_some(),
        };
        let recorded = totals.paid && totals.resale_revenue;
        let total_paid = row.total_paid.unwrap_or(0.0);
        let total_resale_revenue = row.total_resale_revenue.unwrap_or(0.0);
        let gross_profit = match row.gross_profit {
            Some(profit) => profit,
            None if recorded => total_resale_revenue - total_paid,
            None => 0.0,
        };

        TransactionRecord {
            id: row.id,
            timestamp: row.timestamp,
            meta: row.meta,
            weight_by_category,
            payout_rate_by_category: row.payout_rates,
            total_weight,
            total_paid,
            total_resale_revenue,
            gross_profit,
            catalog_fingerprint: row.catalog_fingerprint.unwrap_or_default(),
            schema_version: if recorded {
                CURRENT_SCHEMA_VERSION
            } else {
                LEGACY_SCHEMA_VERSION
            },
            recorded: totals,
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Build a record from one deposit.
///
/// Fails with `Validation` on any negative or non-finite weight or payout
/// rate. Missing weights are 0; missing payout rates take the catalog buy rate.
pub fn build(
    weights: &CategoryMap,
    payout_rates: &CategoryMap,
    catalog: &PriceCatalog,
    meta: RecordMeta,
) -> Result<TransactionRecord> {
    validate_non_negative("weight", weights)?;
    validate_non_negative("payout rate", payout_rates)?;

    let mut weight_by_category = CategoryMap::new();
    let mut payout_rate_by_category = CategoryMap::new();
    let mut total_weight = 0.0;
    let mut total_paid = 0.0;
    let mut total_resale_revenue = 0.0;

    for category in Category::ALL {
        let weight = weights.get(&category).copied().unwrap_or(0.0);
        let payout = payout_rates
            .get(&category)
            .copied()
            .unwrap_or_else(|| catalog.buy_rate(category));

        total_weight += weight;
        total_paid += weight * payout;
        total_resale_revenue += weight * catalog.sell_rate(category);

        weight_by_category.insert(category, weight);
        payout_rate_by_category.insert(category, payout);
    }

    Ok(TransactionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        meta,
        weight_by_category,
        payout_rate_by_category,
        total_weight,
        total_paid,
        total_resale_revenue,
        gross_profit: total_resale_revenue - total_paid,
        catalog_fingerprint: catalog.fingerprint(),
        schema_version: CURRENT_SCHEMA_VERSION,
        recorded: RecordedTotals::ALL,
    })
}

fn validate_non_negative(what: &str, values: &CategoryMap) -> Result<()> {
    for (category, value) in values {
        if !value.is_finite() {
            return Err(LedgerError::validation(
                category.as_str(),
                format!("{} must be a finite number (got {})", what, value),
            ));
        }
        if *value < 0.0 {
            return Err(LedgerError::validation(
                category.as_str(),
                format!("{} must not be negative (got {})", what, value),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PriceEntry;

    fn meta() -> RecordMeta {
        RecordMeta::new(
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            "RT 04 / Pak Budi",
            "Sari",
            "Unit Pusat",
        )
    }

    fn map(pairs: &[(Category, f64)]) -> CategoryMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_concrete_scenario_paper_and_pet() {
        let catalog = PriceCatalog::defaults();
        let weights = map(&[(Category::Paper, 20.0), (Category::PetBottles, 5.0)]);
        let rates = map(&[(Category::Paper, 2100.0), (Category::PetBottles, 3800.0)]);

        let record = build(&weights, &rates, &catalog, meta()).unwrap();

        assert_eq!(record.total_weight(), 25.0);
        assert_eq!(record.total_paid(), 61_000.0);
        assert_eq!(record.total_resale_revenue(), 87_500.0);
        assert_eq!(record.gross_profit(), 26_500.0);
        assert!(record.has_recorded_financials());
        assert_eq!(record.recorded_total_paid(), Some(61_000.0));
        assert_eq!(record.recorded_gross_profit(), Some(26_500.0));
    }

    fn stored_row(total_paid: Option<f64>, total_resale_revenue: Option<f64>) -> StoredRow {
        StoredRow {
            id: "old-1".to_string(),
            timestamp: Utc::now(),
            meta: meta(),
            weights: map(&[(Category::Paper, 10.0)]),
            payout_rates: CategoryMap::new(),
            total_paid,
            total_resale_revenue,
            gross_profit: None,
            catalog_fingerprint: None,
        }
    }

    #[test]
    fn test_restore_keeps_lone_total_paid() {
        let record = TransactionRecord::restore(stored_row(Some(21_000.0), None));

        assert!(!record.has_recorded_financials());
        assert_eq!(record.total_paid(), 21_000.0);
        assert_eq!(record.recorded_total_paid(), Some(21_000.0));
        assert_eq!(record.recorded_total_resale_revenue(), None);
        assert_eq!(record.recorded_gross_profit(), None);
        assert_eq!(record.gross_profit(), 0.0);
    }

    #[test]
    fn test_restore_derived_profit_is_not_marked_recorded() {
        let record = TransactionRecord::restore(stored_row(Some(21_000.0), Some(30_000.0)));

        assert!(record.has_recorded_financials());
        assert_eq!(record.gross_profit(), 9000.0);
        assert_eq!(record.recorded_gross_profit(), None);
    }

    #[test]
    fn test_missing_payout_rates_resolve_from_catalog() {
        let mut catalog = PriceCatalog::defaults();
        catalog.set(Category::Cans, PriceEntry::new(10_000, 14_000));
        let weights = map(&[(Category::Cans, 2.0), (Category::Paper, 1.0)]);
        let rates = map(&[(Category::Paper, 2500.0)]);

        let record = build(&weights, &rates, &catalog, meta()).unwrap();

        assert_eq!(record.payout_rate(Category::Cans), 10_000.0);
        assert_eq!(record.payout_rate(Category::Paper), 2500.0);
        // every category carries a frozen rate
        assert_eq!(record.payout_rate_by_category().len(), Category::ALL.len());
        assert_eq!(record.payout_rate(Category::Cloth), 1000.0);
        assert_eq!(record.total_paid(), 2.0 * 10_000.0 + 2500.0);
    }

    #[test]
    fn test_catalog_change_after_build_does_not_alter_record() {
        let mut catalog = PriceCatalog::defaults();
        let weights = map(&[(Category::PetBottles, 10.0)]);
        let record = build(&weights, &CategoryMap::new(), &catalog, meta()).unwrap();
        let before = record.clone();

        catalog.set(Category::PetBottles, PriceEntry::new(9000, 9999));

        assert_eq!(record, before);
        assert_eq!(record.total_paid(), 38_000.0);
        assert_eq!(record.total_resale_revenue(), 55_000.0);
    }

    #[test]
    fn test_resale_revenue_uses_catalog_sell_rates() {
        let catalog = PriceCatalog::defaults();
        let weights: CategoryMap = Category::ALL
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as f64 * 0.5))
            .collect();

        let record = build(&weights, &CategoryMap::new(), &catalog, meta()).unwrap();

        let expected: f64 = Category::ALL
            .iter()
            .map(|c| weights[c] * catalog.sell_rate(*c))
            .sum();
        assert!((record.total_resale_revenue() - expected).abs() < 1e-6);
        assert!(
            (record.gross_profit() - (record.total_resale_revenue() - record.total_paid())).abs()
                < 1e-9
        );
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let catalog = PriceCatalog::defaults();

        let err = build(&map(&[(Category::Paper, -1.0)]), &CategoryMap::new(), &catalog, meta())
            .unwrap_err();
        assert!(err.is_validation());

        let err = build(
            &map(&[(Category::Paper, 1.0)]),
            &map(&[(Category::Paper, -100.0)]),
            &catalog,
            meta(),
        )
        .unwrap_err();
        assert!(err.is_validation());

        let err = build(&map(&[(Category::Cans, f64::NAN)]), &CategoryMap::new(), &catalog, meta())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_deposit_has_zero_margin() {
        let record = build(
            &CategoryMap::new(),
            &CategoryMap::new(),
            &PriceCatalog::defaults(),
            meta(),
        )
        .unwrap();

        assert_eq!(record.total_weight(), 0.0);
        assert_eq!(record.total_resale_revenue(), 0.0);
        assert_eq!(record.margin_percent(), 0.0);
    }

    #[test]
    fn test_hazardous_only_deposit() {
        let record = build(
            &map(&[(Category::Hazardous, 3.0)]),
            &CategoryMap::new(),
            &PriceCatalog::defaults(),
            meta(),
        )
        .unwrap();

        assert_eq!(record.total_weight(), 3.0);
        assert_eq!(record.total_paid(), 0.0);
        assert_eq!(record.margin_percent(), 0.0);
    }

    #[test]
    fn test_margin_percent() {
        let catalog = PriceCatalog::defaults();
        let record = build(
            &map(&[(Category::Paper, 10.0)]),
            &CategoryMap::new(),
            &catalog,
            meta(),
        )
        .unwrap();
        assert!((record.margin_percent() - 30.0).abs() < 1e-9);
        assert_eq!(record.catalog_fingerprint(), catalog.fingerprint());
        assert_eq!(record.operator(), "Sari");
    }
}
