//! RPC task messages and the result envelope.
//!
//! Each task type names its method and knows which engine operation it
//! maps to. Absent fields take their zero value.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uvapp_engine::error::ERRNO_OK;
use uvapp_engine::{
    Ac, AcFilter, AcKey, AcKind, App, AppKey, AppKind, ArtifactRef, Container, ContainerKey,
    ContainerKind, Draft, EngineResult, Patch, QueryPage, Search, UploadUrl, Ver, VerFilter, VerKey,
    VerKind,
};

use crate::Service;

/// Result envelope shared by every method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResult<T> {
    pub errno: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub errmsg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> RpcResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            errno: ERRNO_OK,
            errmsg: String::new(),
            data: Some(data),
        }
    }

    pub fn err(errno: i32, errmsg: impl Into<String>) -> Self {
        Self {
            errno,
            errmsg: errmsg.into(),
            data: None,
        }
    }
}

/// A task message callable through the RPC surface.
pub trait Call: DeserializeOwned + Send + 'static {
    type Output: Serialize + Send + 'static;

    /// Method name in `POST /rpc/{method}`.
    const METHOD: &'static str;

    fn call(self, service: &Service) -> EngineResult<Self::Output>;
}

macro_rules! call {
    ($task:ty, $method:literal, $output:ty, |$this:ident, $service:ident| $body:expr) => {
        impl Call for $task {
            type Output = $output;
            const METHOD: &'static str = $method;

            fn call(self, $service: &Service) -> EngineResult<$output> {
                let $this = self;
                $body
            }
        }
    };
}

// ── App ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCreateTask {
    pub title: String,
    pub info: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppKeyTask {
    pub appid: String,
}

/// `AppRemove`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppRemoveTask(pub AppKeyTask);

/// `AppGet`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppGetTask(pub AppKeyTask);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSetTask {
    pub appid: String,
    pub title: String,
    pub info: String,
    /// Rotate the secret.
    pub secret: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppQueryTask {
    pub q: String,
    pub n: i64,
    pub p: i64,
}

impl AppKeyTask {
    fn key(self) -> AppKey {
        AppKey { appid: self.appid }
    }
}

call!(AppCreateTask, "AppCreate", App, |t, s| {
    s.engine.create::<AppKind>(
        (),
        Draft {
            title: t.title,
            info: t.info,
            ..Default::default()
        },
    )
});
call!(AppRemoveTask, "AppRemove", App, |t, s| s.engine.remove::<AppKind>(&t.0.key()));
call!(AppGetTask, "AppGet", App, |t, s| s.engine.get::<AppKind>(&t.0.key()));
call!(AppSetTask, "AppSet", App, |t, s| {
    s.engine.set::<AppKind>(
        &AppKey { appid: t.appid },
        Patch {
            title: t.title,
            info: t.info,
            rotate_secret: t.secret,
            ..Default::default()
        },
    )
});
call!(AppQueryTask, "AppQuery", QueryPage<App>, |t, s| {
    s.engine.query::<AppKind>(&(), &Search { q: t.q, n: t.n, p: t.p })
});

// ── Ver ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerCreateTask {
    pub appid: String,
    pub ver: String,
    pub title: String,
    pub info: String,
    pub status: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerKeyTask {
    pub appid: String,
    pub ver: String,
}

/// `VerRemove`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerRemoveTask(pub VerKeyTask);

/// `VerGet`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerGetTask(pub VerKeyTask);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerSetTask {
    pub appid: String,
    pub ver: String,
    pub title: String,
    pub info: String,
    /// Integer text; empty leaves the status alone.
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerQueryTask {
    pub appid: String,
    pub q: String,
    pub n: i64,
    pub p: i64,
    /// Comma-separated status codes.
    pub status: String,
}

/// `VerGetURL` and `VerUpURL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerUrlTask {
    pub appid: String,
    pub ver: String,
    pub ability: String,
    /// Validity in seconds; non-positive uses the configured default.
    pub expires: i64,
}

/// `VerGetURL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerGetUrlTask(pub VerUrlTask);

/// `VerUpURL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerUpUrlTask(pub VerUrlTask);

impl VerKeyTask {
    fn key(self) -> VerKey {
        VerKey {
            appid: self.appid,
            ver: self.ver,
        }
    }
}

impl VerUrlTask {
    fn split(self) -> (ArtifactRef, i64) {
        let artifact = ArtifactRef {
            appid: self.appid,
            ver: self.ver,
            ability: self.ability,
        };
        (artifact, self.expires)
    }
}

call!(VerCreateTask, "VerCreate", Ver, |t, s| {
    s.engine.create::<VerKind>(
        VerKey {
            appid: t.appid,
            ver: t.ver,
        },
        Draft {
            title: t.title,
            info: t.info,
            status: t.status,
            ..Default::default()
        },
    )
});
call!(VerRemoveTask, "VerRemove", Ver, |t, s| s.engine.remove::<VerKind>(&t.0.key()));
call!(VerGetTask, "VerGet", Ver, |t, s| s.engine.get::<VerKind>(&t.0.key()));
call!(VerSetTask, "VerSet", Ver, |t, s| {
    s.engine.set::<VerKind>(
        &VerKey {
            appid: t.appid,
            ver: t.ver,
        },
        Patch {
            title: t.title,
            info: t.info,
            status: t.status,
            ..Default::default()
        },
    )
});
call!(VerQueryTask, "VerQuery", QueryPage<Ver>, |t, s| {
    let filter = VerFilter {
        appid: t.appid,
        status: t.status,
    };
    s.engine.query::<VerKind>(&filter, &Search { q: t.q, n: t.n, p: t.p })
});
call!(VerGetUrlTask, "VerGetURL", String, |t, s| {
    let (artifact, expires) = t.0.split();
    s.artifacts.get_url(&artifact, expires)
});
call!(VerUpUrlTask, "VerUpURL", UploadUrl, |t, s| {
    let (artifact, expires) = t.0.split();
    s.artifacts.up_url(&artifact, expires)
});

// ── Container ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerCreateTask {
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerKeyTask {
    pub cid: String,
}

/// `ContainerRemove`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRemoveTask(pub ContainerKeyTask);

/// `ContainerGet`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerGetTask(pub ContainerKeyTask);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSetTask {
    pub cid: String,
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
    /// Rotate the secret.
    pub secret: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerQueryTask {
    pub q: String,
    pub n: i64,
    pub p: i64,
}

impl ContainerKeyTask {
    fn key(self) -> ContainerKey {
        ContainerKey { cid: self.cid }
    }
}

call!(ContainerCreateTask, "ContainerCreate", Container, |t, s| {
    s.engine.create::<ContainerKind>(
        (),
        Draft {
            title: t.title,
            info: t.info,
            env: t.env,
            ..Default::default()
        },
    )
});
call!(ContainerRemoveTask, "ContainerRemove", Container, |t, s| {
    s.engine.remove::<ContainerKind>(&t.0.key())
});
call!(ContainerGetTask, "ContainerGet", Container, |t, s| {
    s.engine.get::<ContainerKind>(&t.0.key())
});
call!(ContainerSetTask, "ContainerSet", Container, |t, s| {
    s.engine.set::<ContainerKind>(
        &ContainerKey { cid: t.cid },
        Patch {
            title: t.title,
            info: t.info,
            env: t.env,
            rotate_secret: t.secret,
            ..Default::default()
        },
    )
});
call!(ContainerQueryTask, "ContainerQuery", QueryPage<Container>, |t, s| {
    s.engine.query::<ContainerKind>(&(), &Search { q: t.q, n: t.n, p: t.p })
});

// ── Ac ─────────────────────────────────────────────────────────────

/// `AcCreate`, also served as `AcAdd`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcCreateTask {
    pub cid: String,
    pub appid: String,
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
    pub ver: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcKeyTask {
    pub cid: String,
    pub appid: String,
}

/// `AcRemove`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcRemoveTask(pub AcKeyTask);

/// `AcGet`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcGetTask(pub AcKeyTask);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcSetTask {
    pub cid: String,
    pub appid: String,
    pub title: String,
    pub info: String,
    pub env: BTreeMap<String, String>,
    pub ver: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcQueryTask {
    pub cid: String,
    pub appid: String,
    pub q: String,
    pub n: i64,
    pub p: i64,
}

impl AcKeyTask {
    fn key(self) -> AcKey {
        AcKey {
            cid: self.cid,
            appid: self.appid,
        }
    }
}

call!(AcCreateTask, "AcCreate", Ac, |t, s| {
    s.engine.create::<AcKind>(
        AcKey {
            cid: t.cid,
            appid: t.appid,
        },
        Draft {
            title: t.title,
            info: t.info,
            env: t.env,
            ver: t.ver,
            ..Default::default()
        },
    )
});
call!(AcRemoveTask, "AcRemove", Ac, |t, s| s.engine.remove::<AcKind>(&t.0.key()));
call!(AcGetTask, "AcGet", Ac, |t, s| s.engine.get::<AcKind>(&t.0.key()));
call!(AcSetTask, "AcSet", Ac, |t, s| {
    s.engine.set::<AcKind>(
        &AcKey {
            cid: t.cid,
            appid: t.appid,
        },
        Patch {
            title: t.title,
            info: t.info,
            env: t.env,
            ver: t.ver,
            ..Default::default()
        },
    )
});
call!(AcQueryTask, "AcQuery", QueryPage<Ac>, |t, s| {
    let filter = AcFilter {
        cid: t.cid,
        appid: t.appid,
    };
    s.engine.query::<AcKind>(&filter, &Search { q: t.q, n: t.n, p: t.p })
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_omits_empty_parts() {
        let ok = serde_json::to_value(RpcResult::ok("u")).unwrap();
        assert_eq!(ok, json!({"errno": 200, "data": "u"}));

        let err = serde_json::to_value(RpcResult::<()>::err(404, "not found app")).unwrap();
        assert_eq!(err, json!({"errno": 404, "errmsg": "not found app"}));
    }

    #[test]
    fn tasks_default_missing_fields() {
        let task: VerSetTask = serde_json::from_value(json!({"appid": "a"})).unwrap();
        assert_eq!(task.appid, "a");
        assert!(task.ver.is_empty());
        assert!(task.status.is_empty());

        let task: AppGetTask = serde_json::from_value(json!({"appid": "x"})).unwrap();
        assert_eq!(task.0.appid, "x");

        let task: ContainerSetTask =
            serde_json::from_value(json!({"cid": "c", "env": {"K": "v"}, "secret": true})).unwrap();
        assert!(task.secret);
        assert_eq!(task.env["K"], "v");
    }
}
