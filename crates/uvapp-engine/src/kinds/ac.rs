//! Activations: a container running one app at a given version, keyed by
//! `(cid, appid)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uvapp_core::IdIssuer;
use uvapp_store::{Document, Filter, IndexModel, SortOrder};

use crate::entity::{Carries, EntityKind, require};
use crate::error::{EngineError, EngineResult};
use crate::fields::*;

pub struct AcKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcKey {
    pub cid: String,
    pub appid: String,
}

/// Activations of a container, of an app, or both.
#[derive(Debug, Clone, Default)]
pub struct AcFilter {
    pub cid: String,
    pub appid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ac {
    pub cid: String,
    pub appid: String,
    pub ctime: i64,
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
    pub ver: String,
}

impl EntityKind for AcKind {
    const COLLECTION: &'static str = "ac";
    const NAME: &'static str = "ac";
    const CARRIES: Carries = Carries {
        secret: false,
        env: true,
        status: false,
        ver: true,
    };

    type Key = AcKey;
    type NewKey = AcKey;
    type QueryFilter = AcFilter;
    type View = Ac;

    fn indexes() -> Vec<IndexModel> {
        vec![
            IndexModel::new(&[(CID, SortOrder::Descending), (APPID, SortOrder::Descending)]).unique(),
            IndexModel::new(&[(CTIME, SortOrder::Descending)]),
        ]
    }

    fn issue_key(key: AcKey, _: &IdIssuer) -> EngineResult<AcKey> {
        Self::key_filter(&key)?;
        Ok(key)
    }

    fn key_filter(key: &AcKey) -> EngineResult<Filter> {
        require(CID, &key.cid)?;
        require(APPID, &key.appid)?;
        Ok(Filter::new()
            .eq(CID, key.cid.as_str())
            .eq(APPID, key.appid.as_str()))
    }

    fn query_filter(filter: &AcFilter) -> EngineResult<Filter> {
        if filter.cid.is_empty() && filter.appid.is_empty() {
            return Err(EngineError::InvalidInput(
                "not found param cid or appid".to_string(),
            ));
        }
        let mut query = Filter::new();
        if !filter.cid.is_empty() {
            query = query.eq(CID, filter.cid.as_str());
        }
        if !filter.appid.is_empty() {
            query = query.eq(APPID, filter.appid.as_str());
        }
        Ok(query)
    }

    fn decode(doc: &Document, info: String) -> Ac {
        Ac {
            cid: string_field(doc, CID),
            appid: string_field(doc, APPID),
            ctime: int_field(doc, CTIME),
            title: string_field(doc, TITLE),
            info,
            env: env_field(doc),
            ver: string_field(doc, VER),
        }
    }
}
