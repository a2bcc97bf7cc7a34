//! DocumentStore — redb-backed document persistence.
//!
//! A [`DocumentStore`] is one redb database; a [`Collection`] is a named set
//! of JSON documents inside it with optional secondary indexes. Every
//! mutating call runs in a single write transaction, so find-and-modify
//! operations are atomic and writers are serialised. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{
    AccessGuard, Database, Key, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadOnlyTable, StorageError, TableDefinition, TableError, Value as RedbValue,
    WriteTransaction,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::document::*;
use crate::error::{StoreError, StoreResult};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    /// Open (or create) a persistent document store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_catalog()?;
        debug!(?path, "document store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory document store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_catalog()?;
        debug!("in-memory document store opened");
        Ok(store)
    }

    fn ensure_catalog(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Handle to the named collection. Collections come into existence on
    /// first write; reads of an unwritten collection see no documents.
    pub fn collection(&self, name: &str) -> StoreResult<Collection> {
        if !valid_collection_name(name) {
            return Err(StoreError::InvalidCollection(name.to_string()));
        }
        Ok(Collection {
            db: Arc::clone(&self.db),
            name: name.to_string(),
        })
    }
}

/// A named set of documents inside a [`DocumentStore`].
#[derive(Clone)]
pub struct Collection {
    db: Arc<Database>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Insert a new document, assigning `_id` when absent. Returns the id.
    pub fn insert_one(&self, mut doc: Document) -> StoreResult<String> {
        let id = assign_id(&mut doc)?;
        let value = encode(&doc)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let indexes = write_indexes(&txn, &self.name)?;
            let mut docs = txn.open_table(docs_table(&self.name)).map_err(map_err!(Table))?;
            if docs.get(id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StoreError::DuplicateKey {
                    index: "_id_".to_string(),
                    key: id,
                });
            }
            add_index_entries(&txn, &self.name, &indexes, &doc, &id)?;
            docs.insert(id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(collection = %self.name, %id, "document inserted");
        Ok(id)
    }

    /// Atomically find the first matching document and apply `update`.
    ///
    /// Returns the document as it was before or after the update, per
    /// `options.return_document`, or `None` when nothing matched (and, for
    /// an upsert, when the pre-image was requested).
    pub fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        options: FindOneAndUpdateOptions,
    ) -> StoreResult<Option<Document>> {
        if update.fields().any(|f| f == ID_FIELD) {
            return Err(StoreError::InvalidUpdate("_id is immutable".to_string()));
        }
        if update.is_empty() {
            return Err(StoreError::InvalidUpdate("empty update".to_string()));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result;
        {
            let indexes = write_indexes(&txn, &self.name)?;
            let mut docs = txn.open_table(docs_table(&self.name)).map_err(map_err!(Table))?;
            let found = locate(&docs, &indexes, &self.name, filter, |table, key| {
                write_index_get(&txn, table, key)
            })?;

            result = match found {
                Some((id, before)) => {
                    let mut after = before.clone();
                    update.apply(&mut after)?;

                    let touched: Vec<&str> = update.fields().collect();
                    let affected: Vec<IndexModel> = indexes
                        .iter()
                        .filter(|i| i.keys.iter().any(|(f, _)| touched.contains(&f.as_str())))
                        .cloned()
                        .collect();
                    remove_index_entries(&txn, &self.name, &affected, &before, &id)?;
                    add_index_entries(&txn, &self.name, &affected, &after, &id)?;

                    let value = encode(&after)?;
                    docs.insert(id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    debug!(collection = %self.name, %id, fields = update.len(), "document updated");

                    match options.return_document {
                        ReturnDocument::Before => Some(before),
                        ReturnDocument::After => Some(after),
                    }
                }
                None if options.upsert => {
                    let mut doc = filter.seed_document();
                    update.apply(&mut doc)?;
                    let id = assign_id(&mut doc)?;
                    if docs.get(id.as_str()).map_err(map_err!(Read))?.is_some() {
                        return Err(StoreError::DuplicateKey {
                            index: "_id_".to_string(),
                            key: id,
                        });
                    }
                    add_index_entries(&txn, &self.name, &indexes, &doc, &id)?;
                    let value = encode(&doc)?;
                    docs.insert(id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    debug!(collection = %self.name, %id, "document upserted");

                    match options.return_document {
                        ReturnDocument::Before => None,
                        ReturnDocument::After => Some(doc),
                    }
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    /// Atomically find the first matching document and delete it.
    /// Returns the deleted document.
    pub fn find_one_and_delete(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let found;
        {
            let indexes = write_indexes(&txn, &self.name)?;
            let mut docs = txn.open_table(docs_table(&self.name)).map_err(map_err!(Table))?;
            found = locate(&docs, &indexes, &self.name, filter, |table, key| {
                write_index_get(&txn, table, key)
            })?;
            if let Some((id, doc)) = &found {
                docs.remove(id.as_str()).map_err(map_err!(Write))?;
                remove_index_entries(&txn, &self.name, &indexes, doc, id)?;
                debug!(collection = %self.name, %id, "document deleted");
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(found.map(|(_, doc)| doc))
    }

    /// Create indexes that do not exist yet. Existing documents are
    /// back-filled. Returns the names of all requested indexes.
    pub fn create_indexes(&self, models: &[IndexModel]) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut names = Vec::with_capacity(models.len());
        {
            let mut catalog = txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
            for model in models {
                if model.keys.is_empty() {
                    return Err(StoreError::InvalidIndex("index has no keys".to_string()));
                }
                let name = model.name();
                let key = catalog_key(&self.name, &name);
                let existing = catalog
                    .get(key.as_str())
                    .map_err(map_err!(Read))?
                    .map(|g| decode_index(g.value()))
                    .transpose()?;
                match existing {
                    Some(existing) if existing == *model => {
                        names.push(name);
                        continue;
                    }
                    Some(_) => return Err(StoreError::IndexConflict(name)),
                    None => {}
                }

                let docs = txn.open_table(docs_table(&self.name)).map_err(map_err!(Table))?;
                let mut existing_docs = Vec::new();
                for entry in docs.iter().map_err(map_err!(Read))? {
                    let (id, value) = entry.map_err(map_err!(Read))?;
                    existing_docs.push((id.value().to_string(), decode(value.value())?));
                }
                drop(docs);
                for (id, doc) in &existing_docs {
                    add_index_entries(&txn, &self.name, std::slice::from_ref(model), doc, id)?;
                }

                let value = serde_json::to_vec(model).map_err(map_err!(Serialize))?;
                catalog
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                info!(collection = %self.name, index = %name, backfilled = existing_docs.len(), "index created");
                names.push(name);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(names)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// First document matching `filter`.
    pub fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let Some(docs) = open_read(&txn, docs_table(&self.name))? else {
            return Ok(None);
        };
        let indexes = read_indexes(&txn, &self.name)?;
        let found = locate(&docs, &indexes, &self.name, filter, |table, key| {
            read_index_get(&txn, table, key)
        })?;
        Ok(found.map(|(_, doc)| doc))
    }

    /// All documents matching `filter`, sorted, skipped and limited per
    /// `options`. A sort on a single-field index is served by scanning the
    /// index.
    pub fn find(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let Some(docs) = open_read(&txn, docs_table(&self.name))? else {
            return Ok(Vec::new());
        };
        let indexes = read_indexes(&txn, &self.name)?;
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let by_index = indexes
            .iter()
            .find_map(|i| i.serves_sort(&options.sort).map(|reverse| (i, reverse)));
        if let Some((index, reverse)) = by_index {
            let table_name = index_table_name(&self.name, &index.name());
            let Some(table) = open_read(&txn, index_table(&table_name))? else {
                return Ok(Vec::new());
            };
            let entries = table.iter().map_err(map_err!(Read))?;
            return if reverse {
                page_from_index(entries.rev(), &docs, filter, skip, limit)
            } else {
                page_from_index(entries, &docs, filter, skip, limit)
            };
        }

        let mut matched = Vec::new();
        for entry in docs.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let doc = decode(value.value())?;
            if filter.matches(&doc) {
                matched.push(doc);
            }
        }
        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &options.sort));
        }
        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    /// Number of documents matching `filter`.
    pub fn count_documents(&self, filter: &Filter) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let Some(docs) = open_read(&txn, docs_table(&self.name))? else {
            return Ok(0);
        };
        let mut count = 0u64;
        for entry in docs.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            if filter.matches(&decode(value.value())?) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Index definitions registered for this collection.
    pub fn list_indexes(&self) -> StoreResult<Vec<IndexModel>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        read_indexes(&txn, &self.name)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn encode(doc: &Document) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(map_err!(Serialize))
}

fn decode(bytes: &[u8]) -> StoreResult<Document> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn decode_index(bytes: &[u8]) -> StoreResult<IndexModel> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Read `_id` from `doc`, generating one when missing.
fn assign_id(doc: &mut Document) -> StoreResult<String> {
    match doc.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(_) => Err(StoreError::InvalidDocument(
            "_id must be a non-empty string".to_string(),
        )),
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

/// Open a table for reading, treating a never-created table as absent.
fn open_read<K: Key + 'static, V: RedbValue + 'static>(
    txn: &ReadTransaction,
    def: TableDefinition<'_, K, V>,
) -> StoreResult<Option<ReadOnlyTable<K, V>>> {
    match txn.open_table(def) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(StoreError::Table(e.to_string())),
    }
}

fn indexes_in<T>(catalog: &T, collection: &str) -> StoreResult<Vec<IndexModel>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let prefix = format!("{collection}/");
    let mut indexes = Vec::new();
    for entry in catalog.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if key.value().starts_with(&prefix) {
            indexes.push(decode_index(value.value())?);
        }
    }
    Ok(indexes)
}

fn read_indexes(txn: &ReadTransaction, collection: &str) -> StoreResult<Vec<IndexModel>> {
    match open_read(txn, INDEX_CATALOG)? {
        Some(catalog) => indexes_in(&catalog, collection),
        None => Ok(Vec::new()),
    }
}

fn write_indexes(txn: &WriteTransaction, collection: &str) -> StoreResult<Vec<IndexModel>> {
    let catalog = txn.open_table(INDEX_CATALOG).map_err(map_err!(Table))?;
    indexes_in(&catalog, collection)
}

fn read_index_get(txn: &ReadTransaction, table_name: &str, key: &str) -> StoreResult<Option<String>> {
    let Some(table) = open_read(txn, index_table(table_name))? else {
        return Ok(None);
    };
    let id = table
        .get(key)
        .map_err(map_err!(Read))?
        .map(|g| g.value().to_string());
    Ok(id)
}

fn write_index_get(txn: &WriteTransaction, table_name: &str, key: &str) -> StoreResult<Option<String>> {
    let table = txn.open_table(index_table(table_name)).map_err(map_err!(Table))?;
    let id = table
        .get(key)
        .map_err(map_err!(Read))?
        .map(|g| g.value().to_string());
    Ok(id)
}

fn fetch<T>(docs: &T, id: &str) -> StoreResult<Option<Document>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match docs.get(id).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Find the first document matching `filter`: by `_id` when the filter pins
/// it, through a unique index when the filter pins all of its fields, and by
/// scanning otherwise.
fn locate<T, F>(
    docs: &T,
    indexes: &[IndexModel],
    collection: &str,
    filter: &Filter,
    index_get: F,
) -> StoreResult<Option<(String, Document)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
    F: Fn(&str, &str) -> StoreResult<Option<String>>,
{
    let pinned_id = match filter.eq_value(ID_FIELD) {
        Some(Value::String(id)) => Some(id.clone()),
        _ => indexes
            .iter()
            .find_map(|i| i.lookup_key(filter).map(|key| (i, key)))
            .map(|(index, key)| index_get(&index_table_name(collection, &index.name()), &key))
            .transpose()?
            .map(|id| id.unwrap_or_default()),
    };

    if let Some(id) = pinned_id {
        if id.is_empty() {
            return Ok(None);
        }
        return Ok(fetch(docs, &id)?
            .filter(|doc| filter.matches(doc))
            .map(|doc| (id, doc)));
    }

    for entry in docs.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let doc = decode(value.value())?;
        if filter.matches(&doc) {
            return Ok(Some((key.value().to_string(), doc)));
        }
    }
    Ok(None)
}

fn add_index_entries(
    txn: &WriteTransaction,
    collection: &str,
    indexes: &[IndexModel],
    doc: &Document,
    id: &str,
) -> StoreResult<()> {
    for index in indexes {
        let name = index.name();
        let table_name = index_table_name(collection, &name);
        let mut table = txn.open_table(index_table(&table_name)).map_err(map_err!(Table))?;
        let key = index.entry_key(doc, id);
        if index.unique {
            let holder = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|g| g.value().to_string());
            if holder.is_some_and(|h| h != id) {
                return Err(StoreError::DuplicateKey {
                    index: name,
                    key: index.describe_key(doc),
                });
            }
        }
        table.insert(key.as_str(), id).map_err(map_err!(Write))?;
    }
    Ok(())
}

fn remove_index_entries(
    txn: &WriteTransaction,
    collection: &str,
    indexes: &[IndexModel],
    doc: &Document,
    id: &str,
) -> StoreResult<()> {
    for index in indexes {
        let table_name = index_table_name(collection, &index.name());
        let mut table = txn.open_table(index_table(&table_name)).map_err(map_err!(Table))?;
        let key = index.entry_key(doc, id);
        table.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(())
}

/// Walk index entries in order, resolving each to its document.
fn page_from_index<'a, I, T>(
    entries: I,
    docs: &T,
    filter: &Filter,
    skip: usize,
    limit: usize,
) -> StoreResult<Vec<Document>>
where
    I: Iterator<
        Item = Result<(AccessGuard<'a, &'static str>, AccessGuard<'a, &'static str>), StorageError>,
    >,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    let mut skipped = 0;
    for entry in entries {
        let (_, id) = entry.map_err(map_err!(Read))?;
        let Some(doc) = fetch(docs, id.value())? else {
            continue;
        };
        if !filter.matches(&doc) {
            continue;
        }
        if skipped < skip {
            skipped += 1;
            continue;
        }
        results.push(doc);
        if results.len() >= limit {
            break;
        }
    }
    Ok(results)
}
