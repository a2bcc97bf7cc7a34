//! Entity lifecycle engine.
//!
//! One generic implementation of Create / Remove / Set / Get / Query,
//! instantiated per [`EntityKind`]. Every operation validates its input
//! before touching the store and performs at most one mutating store call,
//! so a failed operation leaves nothing half-written.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uvapp_core::{IdIssuer, epoch_secs};
use uvapp_store::{
    Collection, DocumentStore, FindOneAndUpdateOptions, FindOptions, ReturnDocument, SortOrder,
    Update,
};

use crate::entity::{Draft, EntityKind, Patch, parse_status};
use crate::error::{EngineError, EngineResult};
use crate::fields::*;
use crate::kinds::{AcKind, AppKind, ContainerKind, VerKind};
use crate::query::{Paging, QueryPage, Search};

/// Entity lifecycle operations over one document store.
#[derive(Clone)]
pub struct Engine {
    store: DocumentStore,
    issuer: Arc<IdIssuer>,
}

impl Engine {
    pub fn new(store: DocumentStore, issuer: Arc<IdIssuer>) -> Self {
        Self { store, issuer }
    }

    /// Create the indexes of every kind. Safe to call on every start.
    pub fn ensure_indexes(&self) -> EngineResult<()> {
        self.ensure_indexes_of::<AppKind>()?;
        self.ensure_indexes_of::<VerKind>()?;
        self.ensure_indexes_of::<ContainerKind>()?;
        self.ensure_indexes_of::<AcKind>()?;
        Ok(())
    }

    fn ensure_indexes_of<K: EntityKind>(&self) -> EngineResult<()> {
        let names = self.collection::<K>()?.create_indexes(&K::indexes())?;
        info!(collection = K::COLLECTION, indexes = ?names, "indexes ready");
        Ok(())
    }

    fn collection<K: EntityKind>(&self) -> EngineResult<Collection> {
        Ok(self.store.collection(K::COLLECTION)?)
    }

    // ── Create ─────────────────────────────────────────────────────

    /// Persist a new entity. The returned `info` is the caller's literal
    /// input. Key fields are checked before `info` is parsed.
    pub fn create<K: EntityKind>(&self, new_key: K::NewKey, draft: Draft) -> EngineResult<K::View> {
        let key = K::issue_key(new_key, &self.issuer)?;
        let info = parse_info(&draft.info)?;
        let mut doc = K::key_filter(&key)?.seed_document();

        let carries = K::CARRIES;
        doc.insert(TITLE.to_string(), Value::String(draft.title));
        doc.insert(INFO.to_string(), info);
        if carries.env {
            doc.insert(ENV.to_string(), Value::Object(env_value(&draft.env)));
        }
        if carries.status {
            doc.insert(STATUS.to_string(), Value::from(draft.status));
        }
        if carries.ver {
            doc.insert(VER.to_string(), Value::String(draft.ver));
        }
        if carries.secret {
            doc.insert(SECRET.to_string(), Value::String(self.issuer.new_secret()));
        }
        doc.insert(CTIME.to_string(), Value::from(epoch_secs()));

        let view = K::decode(&doc, draft.info);
        let id = self.collection::<K>()?.insert_one(doc)?;
        debug!(collection = K::COLLECTION, %id, "entity created");
        Ok(view)
    }

    // ── Remove ─────────────────────────────────────────────────────

    /// Delete an entity, returning its last state.
    pub fn remove<K: EntityKind>(&self, key: &K::Key) -> EngineResult<K::View> {
        let filter = K::key_filter(key)?;
        let doc = self
            .collection::<K>()?
            .find_one_and_delete(&filter)?
            .ok_or(EngineError::NotFound(K::NAME))?;
        debug!(collection = K::COLLECTION, "entity removed");
        Ok(K::decode(&doc, info_text(&doc)?))
    }

    // ── Get ────────────────────────────────────────────────────────

    pub fn get<K: EntityKind>(&self, key: &K::Key) -> EngineResult<K::View> {
        let filter = K::key_filter(key)?;
        let doc = self
            .collection::<K>()?
            .find_one(&filter)?
            .ok_or(EngineError::NotFound(K::NAME))?;
        Ok(K::decode(&doc, info_text(&doc)?))
    }

    // ── Set ────────────────────────────────────────────────────────

    /// Apply a partial update. A patch that changes nothing is a plain read.
    ///
    /// The update runs as one atomic find-and-update that never creates a
    /// document; the returned view is the pre-update document with the same
    /// update applied locally.
    pub fn set<K: EntityKind>(&self, key: &K::Key, patch: Patch) -> EngineResult<K::View> {
        let filter = K::key_filter(key)?;
        let update = self.build_update::<K>(&patch)?;
        if update.is_empty() {
            return self.get::<K>(key);
        }

        let options = FindOneAndUpdateOptions {
            upsert: false,
            return_document: ReturnDocument::Before,
        };
        let mut doc = self
            .collection::<K>()?
            .find_one_and_update(&filter, &update, options)?
            .ok_or(EngineError::NotFound(K::NAME))?;
        update.apply(&mut doc)?;
        debug!(collection = K::COLLECTION, fields = update.len(), "entity updated");
        Ok(K::decode(&doc, info_text(&doc)?))
    }

    /// `$set` entries for `patch`. Input is validated before a secret is
    /// issued.
    fn build_update<K: EntityKind>(&self, patch: &Patch) -> EngineResult<Update> {
        let carries = K::CARRIES;
        let info = parse_info_patch(&patch.info)?;
        let status = if carries.status && !patch.status.is_empty() {
            Some(parse_status(&patch.status)?)
        } else {
            None
        };

        let mut update = Update::new();
        if !patch.title.is_empty() {
            update.set(TITLE, patch.title.as_str());
        }
        if carries.ver && !patch.ver.is_empty() {
            update.set(VER, patch.ver.as_str());
        }
        if let Some(status) = status {
            update.set(STATUS, status);
        }
        if carries.secret && patch.rotate_secret {
            update.set(SECRET, self.issuer.new_secret());
        }
        merge_entries(&mut update, INFO, &info);
        if carries.env {
            merge_entries(&mut update, ENV, &env_value(&patch.env));
        }
        Ok(update)
    }

    // ── Query ──────────────────────────────────────────────────────

    /// Matching entities, newest first.
    pub fn query<K: EntityKind>(
        &self,
        filter: &K::QueryFilter,
        search: &Search,
    ) -> EngineResult<QueryPage<K::View>> {
        let mut filter = K::query_filter(filter)?;
        if !search.q.is_empty() {
            filter = filter.regex(TITLE, &search.q)?;
        }
        let paging = Paging::new(search.n, search.p);
        let collection = self.collection::<K>()?;

        let page = if paging.wants_page() {
            Some(paging.page(collection.count_documents(&filter)?))
        } else {
            None
        };

        let options = FindOptions::new()
            .sort(CTIME, SortOrder::Descending)
            .skip(paging.skip())
            .limit(paging.limit());
        let items = collection
            .find(&filter, &options)?
            .iter()
            .map(|doc| Ok(K::decode(doc, info_text(doc)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(QueryPage { items, page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::*;
    use std::collections::BTreeMap;

    fn engine() -> Engine {
        let store = DocumentStore::open_in_memory().unwrap();
        let engine = Engine::new(store, Arc::new(IdIssuer::new(1, 1).unwrap()));
        engine.ensure_indexes().unwrap();
        engine
    }

    fn draft(title: &str, info: &str) -> Draft {
        Draft {
            title: title.to_string(),
            info: info.to_string(),
            ..Default::default()
        }
    }

    fn app_key(app: &App) -> AppKey {
        AppKey {
            appid: app.id.clone(),
        }
    }

    fn info_json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── App ────────────────────────────────────────────────────────

    #[test]
    fn app_lifecycle() {
        let engine = engine();
        let created = engine.create::<AppKind>((), draft("demo", "")).unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.secret.len(), 32);
        assert!(created.secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(created.info, "");
        assert!(created.ctime > 0);

        let key = app_key(&created);
        let rotated = engine
            .set::<AppKind>(
                &key,
                Patch {
                    rotate_secret: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(rotated.secret, created.secret);
        assert_eq!(rotated.title, "demo");
        assert_eq!(engine.get::<AppKind>(&key).unwrap().secret, rotated.secret);

        let removed = engine.remove::<AppKind>(&key).unwrap();
        assert_eq!(removed.title, "demo");
        assert_eq!(removed.secret, rotated.secret);

        let err = engine.remove::<AppKind>(&key).unwrap_err();
        assert_eq!(err.errno(), 404);
        assert_eq!(err.to_string(), "not found app");
    }

    #[test]
    fn create_echoes_literal_info() {
        let engine = engine();
        let literal = r#"{ "x" : "y" }"#;
        let created = engine.create::<AppKind>((), draft("a", literal)).unwrap();
        assert_eq!(created.info, literal);

        let fetched = engine.get::<AppKind>(&app_key(&created)).unwrap();
        assert_eq!(info_json(&fetched.info), serde_json::json!({"x": "y"}));
    }

    #[test]
    fn create_rejects_unparsable_info_before_writing() {
        let engine = engine();
        let err = engine.create::<AppKind>((), draft("a", "{nope")).unwrap_err();
        assert_eq!(err.errno(), 500);

        let all = engine.query::<AppKind>(&(), &Search::default()).unwrap();
        assert!(all.items.is_empty());
    }

    #[test]
    fn set_merges_info_per_key() {
        let engine = engine();
        let created = engine
            .create::<AppKind>((), draft("a", r#"{"a":1,"b":2}"#))
            .unwrap();
        let key = app_key(&created);

        let updated = engine
            .set::<AppKind>(
                &key,
                Patch {
                    info: r#"{"a":9}"#.to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(info_json(&updated.info), serde_json::json!({"a": 9, "b": 2}));

        let stored = engine.get::<AppKind>(&key).unwrap();
        assert_eq!(info_json(&stored.info), serde_json::json!({"a": 9, "b": 2}));
        assert_eq!(stored.secret, created.secret);
    }

    #[test]
    fn set_with_nothing_is_a_read() {
        let engine = engine();
        let created = engine.create::<AppKind>((), draft("a", r#"{"k":1}"#)).unwrap();
        let key = app_key(&created);

        let read = engine.set::<AppKind>(&key, Patch::default()).unwrap();
        assert_eq!(read, engine.get::<AppKind>(&key).unwrap());
        assert_eq!(read.ctime, created.ctime);

        let empty_info = Patch {
            info: "{}".to_string(),
            ..Default::default()
        };
        assert_eq!(engine.set::<AppKind>(&key, empty_info).unwrap(), read);
    }

    #[test]
    fn set_rejects_non_object_info() {
        let engine = engine();
        let created = engine.create::<AppKind>((), draft("a", "")).unwrap();
        let patch = Patch {
            info: "[1]".to_string(),
            ..Default::default()
        };
        let err = engine.set::<AppKind>(&app_key(&created), patch).unwrap_err();
        assert_eq!(err.errno(), 400);
    }

    #[test]
    fn set_info_over_non_object_keeps_stored_value() {
        let engine = engine();
        let created = engine.create::<AppKind>((), draft("a", "[1,2]")).unwrap();
        let key = app_key(&created);
        let patch = Patch {
            title: "renamed".to_string(),
            info: r#"{"a":1}"#.to_string(),
            ..Default::default()
        };
        let err = engine.set::<AppKind>(&key, patch).unwrap_err();
        assert_eq!(err.errno(), 500);

        let stored = engine.get::<AppKind>(&key).unwrap();
        assert_eq!(info_json(&stored.info), serde_json::json!([1, 2]));
        assert_eq!(stored.title, "a");
    }

    #[test]
    fn missing_keys_are_input_errors() {
        let engine = engine();
        let empty = AppKey {
            appid: String::new(),
        };
        for err in [
            engine.get::<AppKind>(&empty).unwrap_err(),
            engine.remove::<AppKind>(&empty).unwrap_err(),
            engine.set::<AppKind>(&empty, Patch::default()).unwrap_err(),
        ] {
            assert_eq!(err.errno(), 400);
            assert_eq!(err.to_string(), "not found param appid");
        }
    }

    #[test]
    fn unknown_keys_are_not_found_without_side_effects() {
        let engine = engine();
        let ghost = AppKey {
            appid: "ghost".to_string(),
        };
        let patch = Patch {
            title: "t".to_string(),
            ..Default::default()
        };
        assert_eq!(engine.set::<AppKind>(&ghost, patch).unwrap_err().errno(), 404);
        assert_eq!(engine.get::<AppKind>(&ghost).unwrap_err().errno(), 404);
        assert_eq!(engine.remove::<AppKind>(&ghost).unwrap_err().errno(), 404);

        let all = engine.query::<AppKind>(&(), &Search::default()).unwrap();
        assert!(all.items.is_empty());
    }

    // ── Query ──────────────────────────────────────────────────────

    #[test]
    fn query_pages_newest_first() {
        let engine = engine();
        let apps = engine.collection::<AppKind>().unwrap();
        for i in 0..45 {
            let doc = serde_json::json!({"_id": format!("a{i}"), "title": format!("t{i}"), "ctime": i});
            apps.insert_one(doc.as_object().unwrap().clone()).unwrap();
        }

        let search = Search {
            q: String::new(),
            n: 20,
            p: 2,
        };
        let result = engine.query::<AppKind>(&(), &search).unwrap();
        let page = result.page.unwrap();
        assert_eq!((page.p, page.n, page.total_count, page.count), (2, 20, 45, 3));
        assert_eq!(result.items.len(), 20);
        assert_eq!(result.items[0].id, "a24");
        assert_eq!(result.items[19].id, "a5");

        let last = engine
            .query::<AppKind>(&(), &Search { p: 3, ..search.clone() })
            .unwrap();
        assert_eq!(last.items.len(), 5);

        let unpaged = engine
            .query::<AppKind>(&(), &Search { n: 0, p: 0, ..search })
            .unwrap();
        assert!(unpaged.page.is_none());
        assert_eq!(unpaged.items.len(), 20);
        assert_eq!(unpaged.items[0].id, "a44");
    }

    #[test]
    fn query_matches_title_regex() {
        let engine = engine();
        for title in ["alpha", "beta", "Alphabet", "alphanumeric"] {
            engine.create::<AppKind>((), draft(title, "")).unwrap();
        }
        let search = Search {
            q: "^alpha".to_string(),
            n: 0,
            p: 1,
        };
        let result = engine.query::<AppKind>(&(), &search).unwrap();
        assert_eq!(result.page.unwrap().total_count, 2);

        let bad = Search {
            q: "(".to_string(),
            ..Default::default()
        };
        assert_eq!(engine.query::<AppKind>(&(), &bad).unwrap_err().errno(), 500);
    }

    // ── Ver ────────────────────────────────────────────────────────

    fn ver_key(appid: &str, ver: &str) -> VerKey {
        VerKey {
            appid: appid.to_string(),
            ver: ver.to_string(),
        }
    }

    #[test]
    fn ver_lifecycle_and_uniqueness() {
        let engine = engine();
        let created = engine
            .create::<VerKind>(
                ver_key("a1", "1.0"),
                Draft {
                    title: "first".to_string(),
                    status: 2,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.status, 2);
        assert_eq!((created.appid.as_str(), created.ver.as_str()), ("a1", "1.0"));

        let dup = engine
            .create::<VerKind>(ver_key("a1", "1.0"), Draft::default())
            .unwrap_err();
        assert_eq!(dup.errno(), 500);

        let updated = engine
            .set::<VerKind>(
                &ver_key("a1", "1.0"),
                Patch {
                    status: "5".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, 5);
        assert_eq!(updated.title, "first");

        let bad_status = Patch {
            status: "done".to_string(),
            ..Default::default()
        };
        let err = engine.set::<VerKind>(&ver_key("a1", "1.0"), bad_status).unwrap_err();
        assert_eq!(err.errno(), 400);

        let removed = engine.remove::<VerKind>(&ver_key("a1", "1.0")).unwrap();
        assert_eq!(removed.status, 5);
        assert_eq!(
            engine.get::<VerKind>(&ver_key("a1", "1.0")).unwrap_err().to_string(),
            "not found ver"
        );
    }

    #[test]
    fn ver_requires_both_key_parts() {
        let engine = engine();
        let err = engine
            .create::<VerKind>(ver_key("a1", ""), Draft::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "not found param ver");
        let err = engine.get::<VerKind>(&ver_key("", "1")).unwrap_err();
        assert_eq!(err.to_string(), "not found param appid");
    }

    #[test]
    fn ver_query_filters_by_app_and_status() {
        let engine = engine();
        for (appid, ver, status) in [("a", "1", 0), ("a", "2", 1), ("a", "3", 2), ("b", "1", 1)] {
            engine
                .create::<VerKind>(
                    ver_key(appid, ver),
                    Draft {
                        status,
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let filter = VerFilter {
            appid: "a".to_string(),
            status: "1,2".to_string(),
        };
        let result = engine.query::<VerKind>(&filter, &Search::default()).unwrap();
        let mut vers: Vec<_> = result.items.iter().map(|v| v.ver.as_str()).collect();
        vers.sort();
        assert_eq!(vers, vec!["2", "3"]);

        let missing = VerFilter::default();
        assert_eq!(
            engine.query::<VerKind>(&missing, &Search::default()).unwrap_err().to_string(),
            "not found param appid"
        );

        let bad = VerFilter {
            appid: "a".to_string(),
            status: "1,x".to_string(),
        };
        assert_eq!(engine.query::<VerKind>(&bad, &Search::default()).unwrap_err().errno(), 400);
    }

    // ── Container ──────────────────────────────────────────────────

    #[test]
    fn container_env_merges_per_key() {
        let engine = engine();
        let created = engine
            .create::<ContainerKind>(
                (),
                Draft {
                    title: "edge".to_string(),
                    env: env(&[("HOST", "h"), ("PORT", "80")]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.env["PORT"], "80");
        let key = ContainerKey {
            cid: created.id.clone(),
        };

        let updated = engine
            .set::<ContainerKind>(
                &key,
                Patch {
                    env: env(&[("PORT", "8080"), ("TZ", "UTC")]),
                    rotate_secret: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.env, env(&[("HOST", "h"), ("PORT", "8080"), ("TZ", "UTC")]));
        assert_ne!(updated.secret, created.secret);

        let stored = engine.get::<ContainerKind>(&key).unwrap();
        assert_eq!(stored, updated);
    }

    // ── Ac ─────────────────────────────────────────────────────────

    fn ac_key(cid: &str, appid: &str) -> AcKey {
        AcKey {
            cid: cid.to_string(),
            appid: appid.to_string(),
        }
    }

    #[test]
    fn create_checks_keys_before_info() {
        let engine = engine();
        let err = engine
            .create::<VerKind>(ver_key("", "1"), draft("v", "{bad"))
            .unwrap_err();
        assert_eq!(err.errno(), 400);
        assert_eq!(err.to_string(), "not found param appid");

        let err = engine
            .create::<AcKind>(ac_key("", "a1"), draft("ac", "{bad"))
            .unwrap_err();
        assert_eq!(err.errno(), 400);
        assert_eq!(err.to_string(), "not found param cid");

        let err = engine
            .create::<VerKind>(ver_key("a1", "1"), draft("v", "{bad"))
            .unwrap_err();
        assert_eq!(err.errno(), 500);
    }

    #[test]
    fn ac_lifecycle() {
        let engine = engine();
        let created = engine
            .create::<AcKind>(
                ac_key("c1", "a1"),
                Draft {
                    ver: "1.0".to_string(),
                    env: env(&[("MODE", "prod")]),
                    info: r#"{"replicas":2}"#.to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.ver, "1.0");

        let dup = engine
            .create::<AcKind>(ac_key("c1", "a1"), Draft::default())
            .unwrap_err();
        assert_eq!(dup.errno(), 500);

        let updated = engine
            .set::<AcKind>(
                &ac_key("c1", "a1"),
                Patch {
                    ver: "1.1".to_string(),
                    status: "7".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.ver, "1.1");
        assert_eq!(updated.env["MODE"], "prod");
        assert_eq!(info_json(&updated.info), serde_json::json!({"replicas": 2}));

        let err = engine.get::<AcKind>(&ac_key("c1", "a2")).unwrap_err();
        assert_eq!(err.to_string(), "not found ac");
    }

    #[test]
    fn ac_query_needs_a_side() {
        let engine = engine();
        for (cid, appid) in [("c1", "a1"), ("c1", "a2"), ("c2", "a1")] {
            engine
                .create::<AcKind>(ac_key(cid, appid), Draft::default())
                .unwrap();
        }

        let by_container = AcFilter {
            cid: "c1".to_string(),
            appid: String::new(),
        };
        let result = engine.query::<AcKind>(&by_container, &Search::default()).unwrap();
        assert_eq!(result.items.len(), 2);

        let by_both = AcFilter {
            cid: "c2".to_string(),
            appid: "a1".to_string(),
        };
        let result = engine.query::<AcKind>(&by_both, &Search::default()).unwrap();
        assert_eq!(result.items.len(), 1);

        let err = engine
            .query::<AcKind>(&AcFilter::default(), &Search::default())
            .unwrap_err();
        assert_eq!(err.errno(), 400);
    }
}
