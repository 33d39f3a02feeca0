// 🏷️ Category Schema - the fixed material taxonomy
//
// One ordered definition shared by the catalog, the record builder and the
// ledger columns. Declaration order IS the schema order: `Ord` follows it,
// so every `BTreeMap<Category, _>` iterates in ledger column order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Per-category quantity (kg) or rate (currency per kg)
pub type CategoryMap = BTreeMap<Category, f64>;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Kitchen waste, residue, leather goods
    Burnable,
    /// Newspaper, magazines, cardboard
    Paper,
    /// Wearable clothes, rags
    Cloth,
    /// Aluminium and tin cans
    Cans,
    /// Small e-waste: gadgets, battery toys
    Electronics,
    #[serde(rename = "PET_Bottles")]
    PetBottles,
    /// Buckets, dippers, plastic toys
    #[serde(rename = "Plastic_Marks")]
    PlasticMarks,
    /// Clean foam trays
    #[serde(rename = "White_Trays")]
    WhiteTrays,
    #[serde(rename = "Glass_Bottles")]
    GlassBottles,
    /// Broken pans, scrap iron
    #[serde(rename = "Metal_Small")]
    MetalSmall,
    /// Batteries, fluorescent tubes. Always priced at zero.
    Hazardous,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Burnable,
        Category::Paper,
        Category::Cloth,
        Category::Cans,
        Category::Electronics,
        Category::PetBottles,
        Category::PlasticMarks,
        Category::WhiteTrays,
        Category::GlassBottles,
        Category::MetalSmall,
        Category::Hazardous,
    ];

    /// Stable identifier used as JSON key and ledger column stem
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Burnable => "Burnable",
            Category::Paper => "Paper",
            Category::Cloth => "Cloth",
            Category::Cans => "Cans",
            Category::Electronics => "Electronics",
            Category::PetBottles => "PET_Bottles",
            Category::PlasticMarks => "Plastic_Marks",
            Category::WhiteTrays => "White_Trays",
            Category::GlassBottles => "Glass_Bottles",
            Category::MetalSmall => "Metal_Small",
            Category::Hazardous => "Hazardous",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Burnable => "Burnable residue",
            Category::Paper => "Paper & cardboard",
            Category::Cloth => "Cloth",
            Category::Cans => "Metal cans",
            Category::Electronics => "Small electronics",
            Category::PetBottles => "PET bottles",
            Category::PlasticMarks => "Mixed plastics",
            Category::WhiteTrays => "Foam trays",
            Category::GlassBottles => "Glass bottles",
            Category::MetalSmall => "Small metal",
            Category::Hazardous => "Hazardous waste",
        }
    }

    pub fn is_hazardous(&self) -> bool {
        matches!(self, Category::Hazardous)
    }

    /// Position in the schema order (0-based)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Weight column name in the ledger table
    pub fn weight_column(&self) -> String {
        format!("w_{}", self.as_str())
    }

    /// Payout rate column name in the ledger table
    pub fn rate_column(&self) -> String {
        format!("rate_{}", self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = LedgerError;

    /// Accepts the identifier case-insensitively; `PET` is accepted for PET_Bottles
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        if needle.eq_ignore_ascii_case("PET") {
            return Ok(Category::PetBottles);
        }
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| LedgerError::validation("category", format!("unknown category '{}'", s)))
    }
}

/// Map with every category present, missing entries filled with `0.0`
pub fn complete_map(partial: &CategoryMap) -> CategoryMap {
    Category::ALL
        .iter()
        .map(|c| (*c, partial.get(c).copied().unwrap_or(0.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_order_matches_ord() {
        let mut sorted = Category::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Category::ALL.to_vec());
        assert_eq!(Category::Burnable.index(), 0);
        assert_eq!(Category::Hazardous.index(), 10);
    }

    #[test]
    fn test_identifier_roundtrip() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);

            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn test_parse_is_lenient_on_case_and_pet_alias() {
        assert_eq!("paper".parse::<Category>().unwrap(), Category::Paper);
        assert_eq!("pet".parse::<Category>().unwrap(), Category::PetBottles);
        assert_eq!("metal_small".parse::<Category>().unwrap(), Category::MetalSmall);

        let err = "Cardboard".parse::<Category>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_complete_map_fills_zeros() {
        let mut partial = CategoryMap::new();
        partial.insert(Category::Paper, 20.0);

        let full = complete_map(&partial);
        assert_eq!(full.len(), 11);
        assert_eq!(full[&Category::Paper], 20.0);
        assert_eq!(full[&Category::Cans], 0.0);
    }

    #[test]
    fn test_column_names() {
        assert_eq!(Category::PetBottles.weight_column(), "w_PET_Bottles");
        assert_eq!(Category::Hazardous.rate_column(), "rate_Hazardous");
    }
}
