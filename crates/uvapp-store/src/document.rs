//! Document model for the store.
//!
//! Documents are JSON objects. Reads select documents with a [`Filter`],
//! writes modify them with an [`Update`] made of `$set` entries, and
//! [`IndexModel`]s describe the secondary indexes kept per collection.
//!
//! Sorting and index tables share one order-preserving string encoding of
//! JSON values (see [`encode_component`]), so an index scan yields documents
//! in the same order as an in-memory sort on the same field.

use std::cmp::Ordering;
use std::fmt::Write as _;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A stored document.
pub type Document = Map<String, Value>;

/// Field holding a document's primary key.
pub const ID_FIELD: &str = "_id";

/// Compiled size cap for caller-supplied patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

static NULL: Value = Value::Null;

/// Value of a top-level field, with missing fields reading as `null`.
pub fn field_value<'a>(doc: &'a Document, field: &str) -> &'a Value {
    doc.get(field).unwrap_or(&NULL)
}

// ── Sort order ─────────────────────────────────────────────────────

/// Direction of an index key or a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

// ── Filters ────────────────────────────────────────────────────────

/// One predicate of a [`Filter`].
#[derive(Debug, Clone)]
pub enum Clause {
    /// Field equals the value (`null` matches a missing field).
    Eq(String, Value),
    /// String field contains a match for the pattern.
    Regex(String, Regex),
    /// Field equals any of the values.
    AnyOf(String, Vec<Value>),
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Clause::Eq(field, expected) => field_value(doc, field) == expected,
            Clause::Regex(field, re) => {
                matches!(doc.get(field), Some(Value::String(s)) if re.is_match(s))
            }
            Clause::AnyOf(field, values) => {
                let actual = field_value(doc, field);
                values.iter().any(|v| v == actual)
            }
        }
    }
}

/// Conjunction of clauses. An empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    /// Require the string `field` to match `pattern` (unanchored,
    /// case-sensitive).
    pub fn regex(mut self, field: impl Into<String>, pattern: &str) -> StoreResult<Self> {
        let re = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        self.clauses.push(Clause::Regex(field.into(), re));
        Ok(self)
    }

    /// Require `field` to equal one of `values`.
    pub fn any_of(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.push(Clause::AnyOf(field.into(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|c| c.matches(doc))
    }

    /// Value of the first equality clause on `field`.
    pub fn eq_value(&self, field: &str) -> Option<&Value> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Eq(f, v) if f == field => Some(v),
            _ => None,
        })
    }

    /// Document made of the filter's equality clauses, used to seed an
    /// upserted document.
    pub fn seed_document(&self) -> Document {
        let mut doc = Document::new();
        for clause in &self.clauses {
            if let Clause::Eq(field, value) = clause {
                doc.insert(field.clone(), value.clone());
            }
        }
        doc
    }
}

// ── Updates ────────────────────────────────────────────────────────

/// Ordered `$set` entries. A path is either `field` or `field.key`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `$set` entry.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.set.push((path.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.set.iter().map(|(p, v)| (p.as_str(), v))
    }

    /// Top-level fields this update writes.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.set
            .iter()
            .map(|(p, _)| p.split_once('.').map_or(p.as_str(), |(head, _)| head))
    }

    /// Apply every entry to `doc`, in order. Stops at the first entry whose
    /// parent field holds a non-object; `doc` may then be partially updated.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<()> {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone())?;
        }
        Ok(())
    }
}

/// Write `value` at `path`.
///
/// `field.key` addresses `key` inside the object stored under `field`; the
/// object is created when `field` is missing or `null`. Any other non-object
/// under `field` is an error and is left untouched. Only the first dot
/// separates; the rest of the path is taken as the key.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, tail)) => {
            let slot = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            match slot {
                Value::Object(inner) => {
                    inner.insert(tail.to_string(), value);
                }
                _ => {
                    return Err(StoreError::NotAnObject {
                        path: path.to_string(),
                        field: head.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

// ── Indexes ────────────────────────────────────────────────────────

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    pub keys: Vec<(String, SortOrder)>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexModel {
    pub fn new(keys: &[(&str, SortOrder)]) -> Self {
        Self {
            keys: keys.iter().map(|(f, o)| (f.to_string(), *o)).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Conventional name, e.g. `appid_-1_ver_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(f, o)| format!("{f}_{}", o.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Encoded index-table key for `doc`. Non-unique entries carry the
    /// document id so equal values do not collide.
    pub(crate) fn entry_key(&self, doc: &Document, id: &str) -> String {
        let mut key = String::new();
        for (field, _) in &self.keys {
            encode_component(field_value(doc, field), &mut key);
        }
        if !self.unique {
            key.push('\u{0}');
            key.push_str(id);
        }
        key
    }

    /// Indexed values of `doc` as JSON text, for error messages.
    pub(crate) fn describe_key(&self, doc: &Document) -> String {
        let values: Vec<&Value> = self.keys.iter().map(|(f, _)| field_value(doc, f)).collect();
        serde_json::to_string(&values).unwrap_or_default()
    }

    /// Entry key to look up when `filter` pins every field of this unique
    /// index by equality.
    pub(crate) fn lookup_key(&self, filter: &Filter) -> Option<String> {
        if !self.unique {
            return None;
        }
        let mut key = String::new();
        for (field, _) in &self.keys {
            encode_component(filter.eq_value(field)?, &mut key);
        }
        Some(key)
    }

    /// Whether a scan of this index yields `sort` order, and if so whether
    /// the scan must run backwards.
    pub(crate) fn serves_sort(&self, sort: &[(String, SortOrder)]) -> Option<bool> {
        match (self.keys.as_slice(), sort) {
            ([(field, _)], [(sort_field, order)]) if field == sort_field => {
                Some(*order == SortOrder::Descending)
            }
            _ => None,
        }
    }
}

// ── Find options ───────────────────────────────────────────────────

/// Options for [`Collection::find`](crate::Collection::find).
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: u64,
    /// `None` returns every match.
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

/// Options for [`Collection::find_one_and_update`](crate::Collection::find_one_and_update).
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOneAndUpdateOptions {
    /// Insert a document seeded from the filter's equality clauses when
    /// nothing matches.
    pub upsert: bool,
    pub return_document: ReturnDocument,
}

// ── Order-preserving encoding ──────────────────────────────────────

/// Append an encoding of `value` whose byte order matches value order:
/// null < bool < number < string < other, numbers by magnitude, strings
/// lexicographically.
pub(crate) fn encode_component(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push('0'),
        Value::Bool(b) => {
            out.push('1');
            out.push(if *b { '1' } else { '0' });
        }
        Value::Number(n) => {
            out.push('2');
            let bits = n.as_f64().unwrap_or(0.0).to_bits();
            let ordered = if bits >> 63 == 1 { !bits } else { bits | 1 << 63 };
            let _ = write!(out, "{ordered:016x}");
        }
        Value::String(s) => {
            out.push('3');
            escape_into(s, out);
        }
        other => {
            out.push('4');
            escape_into(&other.to_string(), out);
        }
    }
}

/// Escape NUL and SOH so that NUL can terminate the string without
/// disturbing its order.
fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\u{0}' => out.push_str("\u{1}\u{1}"),
            '\u{1}' => out.push_str("\u{1}\u{2}"),
            c => out.push(c),
        }
    }
    out.push('\u{0}');
}

/// Compare two documents by `sort` keys.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in sort {
        let mut ka = String::new();
        let mut kb = String::new();
        encode_component(field_value(a, field), &mut ka);
        encode_component(field_value(b, field), &mut kb);
        let ord = match order {
            SortOrder::Ascending => ka.cmp(&kb),
            SortOrder::Descending => kb.cmp(&ka),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn encoded(v: Value) -> String {
        let mut s = String::new();
        encode_component(&v, &mut s);
        s
    }

    // ── Filters ────────────────────────────────────────────────────

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&doc(json!({"a": 1}))));
        assert!(Filter::new().matches(&Document::new()));
    }

    #[test]
    fn eq_filter_treats_missing_as_null() {
        let d = doc(json!({"appid": "a1"}));
        assert!(Filter::new().eq("appid", "a1").matches(&d));
        assert!(!Filter::new().eq("appid", "a2").matches(&d));
        assert!(Filter::new().eq("ver", Value::Null).matches(&d));
    }

    #[test]
    fn regex_filter_is_unanchored_and_case_sensitive() {
        let d = doc(json!({"title": "Demo app"}));
        assert!(Filter::new().regex("title", "mo a").unwrap().matches(&d));
        assert!(!Filter::new().regex("title", "demo").unwrap().matches(&d));
        assert!(Filter::new().regex("title", "^Demo").unwrap().matches(&d));
    }

    #[test]
    fn regex_filter_skips_non_strings() {
        let d = doc(json!({"title": 5}));
        assert!(!Filter::new().regex("title", "5").unwrap().matches(&d));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Filter::new().regex("title", "(unclosed").unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[test]
    fn any_of_filter() {
        let f = Filter::new().any_of("status", vec![json!(1), json!(3)]);
        assert!(f.matches(&doc(json!({"status": 1}))));
        assert!(f.matches(&doc(json!({"status": 3}))));
        assert!(!f.matches(&doc(json!({"status": 2}))));
        assert!(!f.matches(&doc(json!({}))));
    }

    #[test]
    fn seed_document_takes_equalities() {
        let f = Filter::new()
            .eq("cid", "c1")
            .eq("appid", "a1")
            .regex("title", "x")
            .unwrap();
        assert_eq!(f.seed_document(), doc(json!({"cid": "c1", "appid": "a1"})));
    }

    // ── Updates ────────────────────────────────────────────────────

    #[test]
    fn dot_path_keeps_siblings() {
        let mut d = doc(json!({"info": {"a": 1, "b": 2}}));
        let mut u = Update::new();
        u.set("info.a", 9);
        u.apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"info": {"a": 9, "b": 2}})));
    }

    #[test]
    fn dot_path_creates_missing_parent() {
        let mut d = doc(json!({"title": "t"}));
        let mut u = Update::new();
        u.set("env.PORT", "80");
        u.apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"title": "t", "env": {"PORT": "80"}})));
    }

    #[test]
    fn dot_path_replaces_null_parent() {
        let mut d = doc(json!({"info": null}));
        let mut u = Update::new();
        u.set("info.x", "y");
        u.apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"info": {"x": "y"}})));
    }

    #[test]
    fn dot_path_refuses_non_object_parent() {
        for stored in [json!([1, 2]), json!("text"), json!(7)] {
            let mut d = doc(json!({"info": stored.clone()}));
            let mut u = Update::new();
            u.set("info.x", "y");
            let err = u.apply(&mut d).unwrap_err();
            assert!(matches!(err, StoreError::NotAnObject { ref field, .. } if field == "info"));
            assert!(!err.is_caller_error());
            assert_eq!(d["info"], stored);
        }
    }

    #[test]
    fn dot_path_nests_one_level_only() {
        let mut d = Document::new();
        let mut u = Update::new();
        u.set("info.a.b", 1);
        u.apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"info": {"a.b": 1}})));
    }

    #[test]
    fn nested_value_is_replaced_whole() {
        let mut d = doc(json!({"info": {"a": {"x": 1, "y": 2}}}));
        let mut u = Update::new();
        u.set("info.a", json!({"x": 5}));
        u.apply(&mut d).unwrap();
        assert_eq!(d, doc(json!({"info": {"a": {"x": 5}}})));
    }

    #[test]
    fn update_fields_are_top_level() {
        let mut u = Update::new();
        u.set("title", "t").set("info.a", 1).set("env.K", "v");
        assert_eq!(u.fields().collect::<Vec<_>>(), vec!["title", "info", "env"]);
        assert_eq!(u.len(), 3);
    }

    // ── Indexes ────────────────────────────────────────────────────

    #[test]
    fn index_names() {
        let idx = IndexModel::new(&[("appid", SortOrder::Descending), ("ver", SortOrder::Descending)]);
        assert_eq!(idx.name(), "appid_-1_ver_-1");
        assert_eq!(IndexModel::new(&[("ctime", SortOrder::Ascending)]).name(), "ctime_1");
    }

    #[test]
    fn lookup_key_requires_every_field() {
        let idx = IndexModel::new(&[("cid", SortOrder::Descending), ("appid", SortOrder::Descending)]).unique();
        let full = Filter::new().eq("cid", "c").eq("appid", "a");
        let partial = Filter::new().eq("cid", "c");
        let d = doc(json!({"cid": "c", "appid": "a"}));
        assert_eq!(idx.lookup_key(&full), Some(idx.entry_key(&d, "ignored")));
        assert_eq!(idx.lookup_key(&partial), None);
    }

    #[test]
    fn non_unique_entries_include_id() {
        let idx = IndexModel::new(&[("ctime", SortOrder::Descending)]);
        let d = doc(json!({"ctime": 10}));
        assert_ne!(idx.entry_key(&d, "a"), idx.entry_key(&d, "b"));
        assert_eq!(idx.lookup_key(&Filter::new().eq("ctime", 10)), None);
    }

    #[test]
    fn single_field_index_serves_sort() {
        let idx = IndexModel::new(&[("ctime", SortOrder::Descending)]);
        let desc = vec![("ctime".to_string(), SortOrder::Descending)];
        let asc = vec![("ctime".to_string(), SortOrder::Ascending)];
        let other = vec![("title".to_string(), SortOrder::Ascending)];
        assert_eq!(idx.serves_sort(&desc), Some(true));
        assert_eq!(idx.serves_sort(&asc), Some(false));
        assert_eq!(idx.serves_sort(&other), None);
    }

    // ── Encoding ───────────────────────────────────────────────────

    #[test]
    fn numbers_encode_in_order() {
        let values = [json!(-5.5), json!(-1), json!(0), json!(1), json!(2.5), json!(1_700_000_000)];
        for pair in values.windows(2) {
            assert!(encoded(pair[0].clone()) < encoded(pair[1].clone()), "{pair:?}");
        }
    }

    #[test]
    fn strings_encode_in_order() {
        let values = ["", "a", "a\u{0}", "a\u{1}", "ab", "b"];
        for pair in values.windows(2) {
            assert!(encoded(json!(pair[0])) < encoded(json!(pair[1])), "{pair:?}");
        }
    }

    #[test]
    fn types_encode_in_order() {
        assert!(encoded(Value::Null) < encoded(json!(false)));
        assert!(encoded(json!(true)) < encoded(json!(0)));
        assert!(encoded(json!(99)) < encoded(json!("")));
        assert!(encoded(json!("zzz")) < encoded(json!([1])));
    }

    #[test]
    fn compare_documents_by_descending_ctime() {
        let older = doc(json!({"ctime": 1}));
        let newer = doc(json!({"ctime": 2}));
        let sort = vec![("ctime".to_string(), SortOrder::Descending)];
        assert_eq!(compare_documents(&newer, &older, &sort), Ordering::Less);
        assert_eq!(compare_documents(&older, &older, &sort), Ordering::Equal);
    }
}
