use crate::utils::{value_as_f64, value_as_u64};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Opaque login blob, one per line of the account file.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Bearer token for one account, valid for one workflow invocation.
#[derive(Clone)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Account summary read from `/user/profile`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub username: Option<String>,
    pub balance: f64,
    pub squad_id: Option<i64>,
}

impl Profile {
    pub fn from_data(data: &Value) -> Self {
        Self {
            username: data
                .get("tg_username")
                .and_then(Value::as_str)
                .map(str::to_string),
            balance: data.get("balance").and_then(value_as_f64).unwrap_or(0.0),
            squad_id: data.get("squad_id").and_then(Value::as_i64),
        }
    }

    pub fn in_squad(&self) -> bool {
        matches!(self.squad_id, Some(id) if id > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reward {
    #[serde(rename = "type", default = "unknown")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: u64,
}

/// Counts show up as `1`, `1.0` or `"1"`; anything unreadable is 0.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_u64(&value).unwrap_or(0))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Criterion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameTask {
    pub id: Value,
    #[serde(default = "unknown_task")]
    pub title: String,
    #[serde(rename = "type", default = "unknown")]
    pub kind: String,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub criterions: Vec<Criterion>,
}

impl GameTask {
    /// Task ids come back as numbers or strings depending on the task.
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn transfer_criterion(&self) -> Option<&Criterion> {
        if self.kind != "other" {
            return None;
        }
        self.criterions.iter().find(|c| c.kind == "transfer")
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

fn unknown_task() -> String {
    "Unknown Task".to_string()
}
