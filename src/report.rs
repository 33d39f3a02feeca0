// 📊 Aggregation & Mark-to-Market Reporter
//
// Two valuations of the same inventory, never substituted for each other:
//
//   current_market_value     = Σ_c total_weight[c] * catalog.sell[c]
//                              (catalog passed in NOW)
//   recorded_resale_estimate = Σ_i record[i].total_resale_revenue
//                              (prices frozen when each deposit was entered)
//
// historical_cost is always the cash actually disbursed (Σ total_paid).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::PriceCatalog;
use crate::category::{Category, CategoryMap};
use crate::record::TransactionRecord;

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub transaction_count: usize,
    pub total_weight: f64,
    /// Every category present, schema order
    pub total_weight_by_category: CategoryMap,
    /// Σ total_paid, as recorded
    pub historical_cost: f64,
    /// Accumulated weights at the reporting catalog's sell rates
    pub current_market_value: f64,
    /// current_market_value - historical_cost
    pub net_position: f64,
    /// Σ total_resale_revenue, as recorded at entry
    pub recorded_resale_estimate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryValuation {
    pub category: Category,
    pub weight: f64,
    pub sell_rate: f64,
    pub market_value: f64,
}

impl Summary {
    /// All-zero summary with every category present
    pub fn empty() -> Self {
        Summary {
            transaction_count: 0,
            total_weight: 0.0,
            total_weight_by_category: crate::category::complete_map(&CategoryMap::new()),
            historical_cost: 0.0,
            current_market_value: 0.0,
            net_position: 0.0,
            recorded_resale_estimate: 0.0,
        }
    }

    /// Price drift since entry: what the inventory gained (or lost) versus
    /// the estimates recorded when it came in
    pub fn revaluation_gain(&self) -> f64 {
        self.current_market_value - self.recorded_resale_estimate
    }

    /// Per-category market value at the given catalog, schema order
    pub fn category_breakdown(&self, catalog: &PriceCatalog) -> Vec<CategoryValuation> {
        Category::ALL
            .iter()
            .map(|c| {
                let weight = self.total_weight_by_category.get(c).copied().unwrap_or(0.0);
                let sell_rate = catalog.sell_rate(*c);
                CategoryValuation {
                    category: *c,
                    weight,
                    sell_rate,
                    market_value: weight * sell_rate,
                }
            })
            .collect()
    }

    /// Combine two summaries valued under the same catalog
    pub fn merge(&self, other: &Summary) -> Summary {
        let total_weight_by_category: CategoryMap = Category::ALL
            .iter()
            .map(|c| {
                let a = self.total_weight_by_category.get(c).copied().unwrap_or(0.0);
                let b = other.total_weight_by_category.get(c).copied().unwrap_or(0.0);
                (*c, a + b)
            })
            .collect();

        let historical_cost = self.historical_cost + other.historical_cost;
        let current_market_value = self.current_market_value + other.current_market_value;

        Summary {
            transaction_count: self.transaction_count + other.transaction_count,
            total_weight: self.total_weight + other.total_weight,
            total_weight_by_category,
            historical_cost,
            current_market_value,
            net_position: current_market_value - historical_cost,
            recorded_resale_estimate: self.recorded_resale_estimate + other.recorded_resale_estimate,
        }
    }

    pub fn headline(&self) -> String {
        format!(
            "{} transactions, {:.1} kg, cost Rp {:.0}, market value Rp {:.0}, net Rp {:.0}",
            self.transaction_count,
            self.total_weight,
            self.historical_cost,
            self.current_market_value,
            self.net_position
        )
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Summarize records, valuing accumulated weights at `catalog` (mark-to-market)
pub fn summarize(records: &[TransactionRecord], catalog: &PriceCatalog) -> Summary {
    let mut summary = Summary::empty();

    for record in records {
        summary.transaction_count += 1;
        for category in Category::ALL {
            if let Some(total) = summary.total_weight_by_category.get_mut(&category) {
                *total += record.weight(category);
            }
        }
        summary.historical_cost += record.total_paid();
        summary.recorded_resale_estimate += record.total_resale_revenue();
    }

    summary.total_weight = summary.total_weight_by_category.values().sum();
    summary.current_market_value = summary
        .total_weight_by_category
        .iter()
        .map(|(c, w)| w * catalog.sell_rate(*c))
        .sum();
    summary.net_position = summary.current_market_value - summary.historical_cost;

    summary
}

/// One summary per operator, keyed by exact operator name
pub fn summarize_by_operator(
    records: &[TransactionRecord],
    catalog: &PriceCatalog,
) -> BTreeMap<String, Summary> {
    let mut groups: BTreeMap<String, Vec<TransactionRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.operator().to_string())
            .or_default()
            .push(record.clone());
    }

    groups
        .into_iter()
        .map(|(operator, group)| (operator, summarize(&group, catalog)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PriceEntry;
    use crate::record::{build, RecordMeta};
    use chrono::NaiveDate;

    fn create_test_record(
        operator: &str,
        weights: &[(Category, f64)],
        catalog: &PriceCatalog,
    ) -> TransactionRecord {
        let weights: CategoryMap = weights.iter().copied().collect();
        build(
            &weights,
            &CategoryMap::new(),
            catalog,
            RecordMeta::new(
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                "RT 04",
                operator,
                "Unit Pusat",
            ),
        )
        .unwrap()
    }

    fn catalog_with_pet_sell(sell: u64) -> PriceCatalog {
        let mut catalog = PriceCatalog::defaults();
        catalog.set(Category::PetBottles, PriceEntry::new(3800, sell));
        catalog
    }

    #[test]
    fn test_empty_records_give_zero_summary() {
        let summary = summarize(&[], &PriceCatalog::defaults());

        assert_eq!(summary, Summary::empty());
        assert_eq!(summary.transaction_count, 0);
        assert_eq!(summary.total_weight, 0.0);
        assert_eq!(summary.historical_cost, 0.0);
        assert_eq!(summary.current_market_value, 0.0);
        assert_eq!(summary.net_position, 0.0);
        assert_eq!(summary.recorded_resale_estimate, 0.0);
        assert_eq!(summary.total_weight_by_category.len(), Category::ALL.len());
    }

    #[test]
    fn test_mark_to_market_uses_reporting_catalog() {
        let at_entry = catalog_with_pet_sell(5000);
        let record = create_test_record("Sari", &[(Category::PetBottles, 10.0)], &at_entry);
        assert_eq!(record.total_resale_revenue(), 50_000.0);

        let today = catalog_with_pet_sell(8000);
        let summary = summarize(&[record], &today);

        assert_eq!(summary.current_market_value, 80_000.0);
        assert_eq!(summary.recorded_resale_estimate, 50_000.0);
        assert_eq!(summary.revaluation_gain(), 30_000.0);
        assert_eq!(summary.historical_cost, 38_000.0);
        assert_eq!(summary.net_position, 42_000.0);
    }

    #[test]
    fn test_historical_cost_is_never_repriced() {
        let catalog = PriceCatalog::defaults();
        let mut rates = CategoryMap::new();
        rates.insert(Category::Paper, 2500.0);
        let mut weights = CategoryMap::new();
        weights.insert(Category::Paper, 4.0);
        let record = build(
            &weights,
            &rates,
            &catalog,
            RecordMeta::new(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "X", "Sari", "Unit Pusat"),
        )
        .unwrap();

        let mut cheaper = PriceCatalog::defaults();
        cheaper.set(Category::Paper, PriceEntry::new(100, 200));
        let summary = summarize(&[record], &cheaper);

        assert_eq!(summary.historical_cost, 10_000.0);
        assert_eq!(summary.current_market_value, 800.0);
        assert_eq!(summary.net_position, -9_200.0);
    }

    #[test]
    fn test_weights_accumulate_per_category() {
        let catalog = PriceCatalog::defaults();
        let records = vec![
            create_test_record("Sari", &[(Category::Paper, 20.0), (Category::Cans, 1.0)], &catalog),
            create_test_record("Budi", &[(Category::Paper, 5.0), (Category::Hazardous, 2.0)], &catalog),
        ];

        let summary = summarize(&records, &catalog);
        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.total_weight_by_category[&Category::Paper], 25.0);
        assert_eq!(summary.total_weight_by_category[&Category::Cans], 1.0);
        assert_eq!(summary.total_weight_by_category[&Category::Hazardous], 2.0);
        assert_eq!(summary.total_weight, 28.0);
        assert_eq!(summary.current_market_value, 25.0 * 3000.0 + 14_000.0);
        // same catalog at entry and report: both valuations agree
        assert_eq!(summary.current_market_value, summary.recorded_resale_estimate);
    }

    #[test]
    fn test_historical_cost_is_additive() {
        let catalog = PriceCatalog::defaults();
        let a = vec![
            create_test_record("Sari", &[(Category::Paper, 20.0)], &catalog),
            create_test_record("Sari", &[(Category::Cloth, 3.0)], &catalog),
        ];
        let b = vec![create_test_record("Budi", &[(Category::Electronics, 1.25)], &catalog)];
        let union: Vec<_> = a.iter().chain(b.iter()).cloned().collect();

        let later = catalog_with_pet_sell(9000);
        let sa = summarize(&a, &later);
        let sb = summarize(&b, &later);
        let su = summarize(&union, &later);

        assert_eq!(su.historical_cost, sa.historical_cost + sb.historical_cost);
        let merged = sa.merge(&sb);
        assert_eq!(merged.transaction_count, su.transaction_count);
        assert!((merged.current_market_value - su.current_market_value).abs() < 1e-6);
        assert!((merged.net_position - su.net_position).abs() < 1e-6);
    }

    #[test]
    fn test_category_breakdown_matches_market_value() {
        let catalog = PriceCatalog::defaults();
        let records = vec![create_test_record(
            "Sari",
            &[(Category::Paper, 2.0), (Category::MetalSmall, 3.0)],
            &catalog,
        )];
        let summary = summarize(&records, &catalog);
        let breakdown = summary.category_breakdown(&catalog);

        assert_eq!(breakdown.len(), Category::ALL.len());
        assert_eq!(breakdown[0].category, Category::Burnable);
        let paper = breakdown.iter().find(|v| v.category == Category::Paper).unwrap();
        assert_eq!(paper.market_value, 6000.0);
        let total: f64 = breakdown.iter().map(|v| v.market_value).sum();
        assert_eq!(total, summary.current_market_value);
    }

    #[test]
    fn test_summarize_by_operator() {
        let catalog = PriceCatalog::defaults();
        let records = vec![
            create_test_record("Sari", &[(Category::Paper, 1.0)], &catalog),
            create_test_record("Budi", &[(Category::Paper, 2.0)], &catalog),
            create_test_record("Sari", &[(Category::Paper, 3.0)], &catalog),
        ];

        let by_operator = summarize_by_operator(&records, &catalog);
        assert_eq!(by_operator.len(), 2);
        assert_eq!(by_operator["Sari"].transaction_count, 2);
        assert_eq!(by_operator["Sari"].total_weight, 4.0);
        assert_eq!(by_operator["Budi"].historical_cost, 2.0 * 2100.0);
    }
}
