//! Containers: deployment targets, keyed by an issued id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uvapp_core::IdIssuer;
use uvapp_store::{Document, Filter, ID_FIELD, IndexModel, SortOrder};

use crate::entity::{Carries, EntityKind, require};
use crate::error::EngineResult;
use crate::fields::*;

pub struct ContainerKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerKey {
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub ctime: i64,
    pub secret: String,
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
}

impl EntityKind for ContainerKind {
    const COLLECTION: &'static str = "container";
    const NAME: &'static str = "container";
    const CARRIES: Carries = Carries {
        secret: true,
        env: true,
        status: false,
        ver: false,
    };

    type Key = ContainerKey;
    type NewKey = ();
    type QueryFilter = ();
    type View = Container;

    fn indexes() -> Vec<IndexModel> {
        vec![IndexModel::new(&[(CTIME, SortOrder::Descending)])]
    }

    fn issue_key(_: (), issuer: &IdIssuer) -> EngineResult<ContainerKey> {
        Ok(ContainerKey {
            cid: issuer.new_id(),
        })
    }

    fn key_filter(key: &ContainerKey) -> EngineResult<Filter> {
        require(CID, &key.cid)?;
        Ok(Filter::new().eq(ID_FIELD, key.cid.as_str()))
    }

    fn query_filter(_: &()) -> EngineResult<Filter> {
        Ok(Filter::new())
    }

    fn decode(doc: &Document, info: String) -> Container {
        Container {
            id: string_field(doc, ID_FIELD),
            ctime: int_field(doc, CTIME),
            secret: string_field(doc, SECRET),
            title: string_field(doc, TITLE),
            info,
            env: env_field(doc),
        }
    }
}
