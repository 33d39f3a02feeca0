// 💰 Price Catalog - buy/sell rate pair per material category
//
// Persisted as a human-editable JSON document:
//   { "Paper": { "buy": 2100, "sell": 3000 }, ... }
//
// The catalog is a VALUE passed into every computation that needs prices.
// Nothing reads pricing from global state.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::category::Category;
use crate::error::{LedgerError, Result};

// ============================================================================
// PRICE ENTRY
// ============================================================================

/// Rates in currency per kg. Unsigned, so a negative rate cannot be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Paid to the depositor
    pub buy: u64,
    /// Realizable from an industrial buyer
    pub sell: u64,
}

impl PriceEntry {
    pub const ZERO: PriceEntry = PriceEntry { buy: 0, sell: 0 };

    pub fn new(buy: u64, sell: u64) -> Self {
        PriceEntry { buy, sell }
    }

    pub fn buy_rate(&self) -> f64 {
        self.buy as f64
    }

    pub fn sell_rate(&self) -> f64 {
        self.sell as f64
    }

    /// Per-kg margin, negative when buying above the resale price
    pub fn margin(&self) -> i64 {
        self.sell as i64 - self.buy as i64
    }

    /// Margin as a percentage of the sell rate, one decimal. Zero when sell is zero.
    pub fn margin_percent(&self) -> f64 {
        if self.sell == 0 {
            return 0.0;
        }
        let pct = self.margin() as f64 / self.sell as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }
}

// ============================================================================
// PRICE CATALOG
// ============================================================================

/// Complete mapping Category -> PriceEntry. Every category is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCatalog {
    entries: BTreeMap<Category, PriceEntry>,
}

impl PriceCatalog {
    /// Built-in default table
    pub fn defaults() -> Self {
        let entries = Category::ALL
            .iter()
            .map(|c| (*c, default_entry(*c)))
            .collect();
        PriceCatalog { entries }
    }

    /// Build from a partial map; missing categories take their default entry
    pub fn from_entries(partial: BTreeMap<Category, PriceEntry>) -> Self {
        let entries = Category::ALL
            .iter()
            .map(|c| (*c, partial.get(c).copied().unwrap_or_else(|| default_entry(*c))))
            .collect();
        PriceCatalog { entries }
    }

    pub fn entry(&self, category: Category) -> PriceEntry {
        self.entries
            .get(&category)
            .copied()
            .unwrap_or(PriceEntry::ZERO)
    }

    pub fn buy_rate(&self, category: Category) -> f64 {
        self.entry(category).buy_rate()
    }

    pub fn sell_rate(&self, category: Category) -> f64 {
        self.entry(category).sell_rate()
    }

    /// Replace one entry in this snapshot (persisting still requires a full `save`)
    pub fn set(&mut self, category: Category, entry: PriceEntry) {
        self.entries.insert(category, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, PriceEntry)> + '_ {
        self.entries.iter().map(|(c, e)| (*c, *e))
    }

    /// Hazardous waste has no market on either side
    pub fn validate(&self) -> Result<()> {
        for (category, entry) in self.iter().filter(|(c, _)| c.is_hazardous()) {
            if entry != PriceEntry::ZERO {
                return Err(LedgerError::validation(
                    category.as_str(),
                    format!(
                        "{} must price at zero (got buy {} / sell {})",
                        category.label(),
                        entry.buy,
                        entry.sell
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Mean margin percentage across all categories
    pub fn average_margin_percent(&self) -> f64 {
        let total: f64 = self.entries.values().map(|e| e.margin_percent()).sum();
        total / self.entries.len() as f64
    }

    /// Mean per-kg margin scaled to 1000 kg
    pub fn potential_profit_per_tonne(&self) -> f64 {
        let total: i64 = self.entries.values().map(|e| e.margin()).sum();
        total as f64 / self.entries.len() as f64 * 1000.0
    }

    /// SHA-256 over the canonical (schema-ordered) JSON form
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Default for PriceCatalog {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Serialize for PriceCatalog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PriceCatalog {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: BTreeMap<String, PriceEntry> = BTreeMap::deserialize(deserializer)?;
        let mut partial = BTreeMap::new();
        for (key, entry) in raw {
            let category = Category::ALL
                .iter()
                .copied()
                .find(|c| c.as_str() == key)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown category '{}'", key)))?;
            partial.insert(category, entry);
        }
        Ok(PriceCatalog::from_entries(partial))
    }
}

fn default_entry(category: Category) -> PriceEntry {
    match category {
        Category::Burnable => PriceEntry::new(140, 300),
        Category::Paper => PriceEntry::new(2100, 3000),
        Category::Cloth => PriceEntry::new(1000, 1500),
        Category::Cans => PriceEntry::new(9800, 14000),
        Category::Electronics => PriceEntry::new(14000, 20000),
        Category::PetBottles => PriceEntry::new(3800, 5500),
        Category::PlasticMarks => PriceEntry::new(1400, 2000),
        Category::WhiteTrays => PriceEntry::new(700, 1000),
        Category::GlassBottles => PriceEntry::new(700, 1000),
        Category::MetalSmall => PriceEntry::new(3000, 4500),
        Category::Hazardous => PriceEntry::ZERO,
    }
}

// ============================================================================
// CATALOG STORE (file-backed)
// ============================================================================

pub struct CatalogStore {
    path: PathBuf,
    /// Serializes save / read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CatalogStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current catalog snapshot.
    ///
    /// A missing file is not an error: the default table is written out so
    /// later loads are deterministic, and returned. If that write fails the
    /// defaults are still returned. A file that exists but cannot be read or
    /// parsed is a `Persistence` error.
    pub fn load(&self) -> Result<PriceCatalog> {
        match self.read()? {
            Some(catalog) => Ok(catalog),
            None => {
                let defaults = PriceCatalog::defaults();
                info!("no price catalog at {}, materializing defaults", self.path.display());
                if let Err(e) = self.save(&defaults) {
                    warn!("could not persist default catalog: {}", e);
                }
                Ok(defaults)
            }
        }
    }

    /// Atomically replace the whole persisted catalog.
    ///
    /// Written to a sibling temp file, flushed, then renamed over the target,
    /// so a failed save leaves the previous document intact.
    pub fn save(&self, catalog: &PriceCatalog) -> Result<()> {
        let _guard = self.lock()?;
        self.write_atomic(catalog)
    }

    /// Load, mutate and save while holding the write lock
    pub fn update<F>(&self, mutate: F) -> Result<PriceCatalog>
    where
        F: FnOnce(&mut PriceCatalog),
    {
        let _guard = self.lock()?;
        let mut next = self.read()?.unwrap_or_default();
        mutate(&mut next);
        self.write_atomic(&next)?;
        Ok(next)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| LedgerError::persistence(&self.path, "catalog lock poisoned"))
    }

    /// `None` when no document exists yet
    fn read(&self) -> Result<Option<PriceCatalog>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| LedgerError::persistence(&self.path, e))?;
        let catalog: PriceCatalog = serde_json::from_str(&text)
            .map_err(|e| LedgerError::persistence(&self.path, e))?;
        debug!("loaded price catalog {}", catalog.fingerprint());
        Ok(Some(catalog))
    }

    fn write_atomic(&self, catalog: &PriceCatalog) -> Result<()> {
        catalog.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LedgerError::persistence(parent, e))?;
            }
        }

        let json = serde_json::to_string_pretty(catalog)
            .map_err(|e| LedgerError::persistence(&self.path, e))?;

        let tmp_path = self.tmp_path();
        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(LedgerError::persistence(&self.path, e));
        }

        info!("price catalog saved to {} ({})", self.path.display(), catalog.fingerprint());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_cover_every_category() {
        let catalog = PriceCatalog::defaults();
        assert_eq!(catalog.iter().count(), Category::ALL.len());
        assert_eq!(catalog.entry(Category::Paper), PriceEntry::new(2100, 3000));
        assert_eq!(catalog.entry(Category::Hazardous), PriceEntry::ZERO);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_load_materializes_defaults() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("data").join("waste_prices.json"));

        let catalog = store.load().unwrap();
        assert_eq!(catalog, PriceCatalog::defaults());
        assert!(store.path().exists(), "defaults must be persisted on first load");
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("waste_prices.json"));

        let first = store.load().unwrap();
        let second = store.load().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("waste_prices.json"));

        let mut catalog = PriceCatalog::defaults();
        catalog.set(Category::PetBottles, PriceEntry::new(4000, 8000));
        catalog.set(Category::Cloth, PriceEntry::new(0, 0));
        store.save(&catalog).unwrap();

        assert_eq!(store.load().unwrap(), catalog);
    }

    #[test]
    fn test_persisted_format_is_keyed_json() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("waste_prices.json"));
        store.save(&PriceCatalog::defaults()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["PET_Bottles"]["buy"], 3800);
        assert_eq!(value["PET_Bottles"]["sell"], 5500);
        assert_eq!(value["Hazardous"]["sell"], 0);
    }

    #[test]
    fn test_hand_edited_file_missing_key_uses_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waste_prices.json");
        fs::write(&path, r#"{ "Paper": { "buy": 2500, "sell": 3500 } }"#).unwrap();

        let catalog = CatalogStore::new(&path).load().unwrap();
        assert_eq!(catalog.entry(Category::Paper), PriceEntry::new(2500, 3500));
        assert_eq!(catalog.entry(Category::Cans), PriceEntry::new(9800, 14000));
    }

    #[test]
    fn test_malformed_file_is_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waste_prices.json");

        fs::write(&path, r#"{ "Cardboard": { "buy": 1, "sell": 2 } }"#).unwrap();
        let err = CatalogStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));

        fs::write(&path, r#"{ "Paper": { "buy": -5, "sell": 2 } }"#).unwrap();
        let err = CatalogStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
    }

    #[test]
    fn test_save_rejects_priced_hazardous_and_keeps_old_file() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("waste_prices.json"));
        store.save(&PriceCatalog::defaults()).unwrap();

        let mut bad = PriceCatalog::defaults();
        bad.set(Category::Hazardous, PriceEntry::new(0, 100));
        let err = store.save(&bad).unwrap_err();
        assert!(err.is_validation());

        assert_eq!(store.load().unwrap(), PriceCatalog::defaults());
    }

    #[test]
    fn test_validate_names_hazardous_category() {
        let mut bad = PriceCatalog::defaults();
        bad.set(Category::Hazardous, PriceEntry::new(50, 0));

        match bad.validate().unwrap_err() {
            LedgerError::Validation { field, message } => {
                assert_eq!(field, "Hazardous");
                assert!(message.contains("Hazardous waste"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(PriceCatalog::defaults().validate().is_ok());
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        // parent "directory" is a regular file
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let store = CatalogStore::new(blocker.join("waste_prices.json"));

        let err = store.save(&PriceCatalog::defaults()).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("waste_prices.json"));

        let updated = store
            .update(|c| c.set(Category::Paper, PriceEntry::new(2200, 3300)))
            .unwrap();
        assert_eq!(updated.entry(Category::Paper), PriceEntry::new(2200, 3300));
        assert_eq!(store.load().unwrap(), updated);
    }

    #[test]
    fn test_margin_analysis() {
        let paper = PriceEntry::new(2100, 3000);
        assert_eq!(paper.margin(), 900);
        assert_eq!(paper.margin_percent(), 30.0);
        assert_eq!(PriceEntry::ZERO.margin_percent(), 0.0);
        assert_eq!(PriceEntry::new(500, 400).margin(), -100);

        let mut flat = PriceCatalog::defaults();
        for c in Category::ALL {
            flat.set(c, PriceEntry::new(100, 200));
        }
        flat.set(Category::Hazardous, PriceEntry::ZERO);
        // 10 categories at 50%, hazardous at 0%
        assert!((flat.average_margin_percent() - 500.0 / 11.0).abs() < 1e-9);
        assert!((flat.potential_profit_per_tonne() - 1000.0 * 1000.0 / 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = PriceCatalog::defaults();
        let mut b = PriceCatalog::defaults();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.set(Category::Paper, PriceEntry::new(2100, 3100));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
