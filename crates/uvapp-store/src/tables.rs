//! redb table definitions for the document store.
//!
//! Every collection owns one document table plus one table per index.
//! Document tables map `_id` to a JSON-serialized document. Index tables map
//! an order-preserving encoding of the indexed fields to the owning `_id`.
//! The index catalog records every index definition, keyed
//! `{collection}/{index_name}`.

use redb::TableDefinition;

/// Index definitions keyed by `{collection}/{index_name}`.
pub const INDEX_CATALOG: TableDefinition<&str, &[u8]> = TableDefinition::new("$indexes");

/// Document table for a collection, keyed by `_id`.
pub fn docs_table(collection: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(collection)
}

/// Index table for one index, keyed by encoded index entry.
pub fn index_table(table_name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(table_name)
}

/// Name of the redb table backing `index` on `collection`.
pub fn index_table_name(collection: &str, index: &str) -> String {
    format!("{collection}#{index}")
}

/// Catalog key for `index` on `collection`.
pub fn catalog_key(collection: &str, index: &str) -> String {
    format!("{collection}/{index}")
}

/// Collection names must be usable inside table and catalog keys.
pub fn valid_collection_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('$') && !name.contains(['#', '/'])
}
