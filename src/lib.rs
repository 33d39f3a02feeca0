// Recycling Collection Ledger - Core Library
// Transaction ledger and dynamic valuation engine for a waste-bank network.
// Exposes all modules for use in the CLI and tests.

pub mod category;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod legacy;
pub mod record;
pub mod report;

// Re-export commonly used types
pub use category::{Category, CategoryMap};
pub use catalog::{CatalogStore, PriceCatalog, PriceEntry};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{
    AuditEntry, EntryKind, LedgerStore, RecordFilter,
    setup_database, insert_record, get_all_records, count_records, get_audit_trail,
};
pub use legacy::load_legacy_csv;
pub use record::{build, RecordMeta, TransactionRecord, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};
pub use report::{summarize, summarize_by_operator, CategoryValuation, Summary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
