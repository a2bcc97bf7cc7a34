//! Applications: the top-level namespace, keyed by an issued id.

use serde::{Deserialize, Serialize};
use uvapp_core::IdIssuer;
use uvapp_store::{Document, Filter, ID_FIELD, IndexModel, SortOrder};

use crate::entity::{Carries, EntityKind, require};
use crate::error::EngineResult;
use crate::fields::*;

pub struct AppKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppKey {
    pub appid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub ctime: i64,
    pub secret: String,
    pub title: String,
    pub info: String,
}

impl EntityKind for AppKind {
    const COLLECTION: &'static str = "app";
    const NAME: &'static str = "app";
    const CARRIES: Carries = Carries {
        secret: true,
        env: false,
        status: false,
        ver: false,
    };

    type Key = AppKey;
    type NewKey = ();
    type QueryFilter = ();
    type View = App;

    fn indexes() -> Vec<IndexModel> {
        vec![IndexModel::new(&[(CTIME, SortOrder::Descending)])]
    }

    fn issue_key(_: (), issuer: &IdIssuer) -> EngineResult<AppKey> {
        Ok(AppKey {
            appid: issuer.new_id(),
        })
    }

    fn key_filter(key: &AppKey) -> EngineResult<Filter> {
        require(APPID, &key.appid)?;
        Ok(Filter::new().eq(ID_FIELD, key.appid.as_str()))
    }

    fn query_filter(_: &()) -> EngineResult<Filter> {
        Ok(Filter::new())
    }

    fn decode(doc: &Document, info: String) -> App {
        App {
            id: string_field(doc, ID_FIELD),
            ctime: int_field(doc, CTIME),
            secret: string_field(doc, SECRET),
            title: string_field(doc, TITLE),
            info,
        }
    }
}
