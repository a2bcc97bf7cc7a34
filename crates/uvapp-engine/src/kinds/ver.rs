//! Versions: releasable builds of an app, keyed by `(appid, ver)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uvapp_core::IdIssuer;
use uvapp_store::{Document, Filter, IndexModel, SortOrder};

use crate::entity::{Carries, EntityKind, parse_status, require};
use crate::error::EngineResult;
use crate::fields::*;

pub struct VerKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerKey {
    pub appid: String,
    pub ver: String,
}

/// Versions of one app, optionally restricted to a status allow-list.
#[derive(Debug, Clone, Default)]
pub struct VerFilter {
    pub appid: String,
    /// Comma-separated status codes; empty means any.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ver {
    pub appid: String,
    pub ver: String,
    pub ctime: i64,
    pub title: String,
    pub info: String,
    pub status: i64,
}

impl EntityKind for VerKind {
    const COLLECTION: &'static str = "ver";
    const NAME: &'static str = "ver";
    const CARRIES: Carries = Carries {
        secret: false,
        env: false,
        status: true,
        ver: false,
    };

    type Key = VerKey;
    type NewKey = VerKey;
    type QueryFilter = VerFilter;
    type View = Ver;

    fn indexes() -> Vec<IndexModel> {
        vec![
            IndexModel::new(&[(APPID, SortOrder::Descending), (VER, SortOrder::Descending)]).unique(),
            IndexModel::new(&[(CTIME, SortOrder::Descending)]),
        ]
    }

    fn issue_key(key: VerKey, _: &IdIssuer) -> EngineResult<VerKey> {
        Self::key_filter(&key)?;
        Ok(key)
    }

    fn key_filter(key: &VerKey) -> EngineResult<Filter> {
        require(APPID, &key.appid)?;
        require(VER, &key.ver)?;
        Ok(Filter::new()
            .eq(APPID, key.appid.as_str())
            .eq(VER, key.ver.as_str()))
    }

    fn query_filter(filter: &VerFilter) -> EngineResult<Filter> {
        require(APPID, &filter.appid)?;
        let mut query = Filter::new().eq(APPID, filter.appid.as_str());
        if !filter.status.is_empty() {
            let codes = filter
                .status
                .split(',')
                .map(|s| parse_status(s).map(Value::from))
                .collect::<EngineResult<Vec<_>>>()?;
            query = query.any_of(STATUS, codes);
        }
        Ok(query)
    }

    fn decode(doc: &Document, info: String) -> Ver {
        Ver {
            appid: string_field(doc, APPID),
            ver: string_field(doc, VER),
            ctime: int_field(doc, CTIME),
            title: string_field(doc, TITLE),
            info,
            status: int_field(doc, STATUS),
        }
    }
}
