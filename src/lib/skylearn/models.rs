use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ids come back from the billing API as either integers or strings depending
/// on the gateway that created the record. Whatever form arrives is kept.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Identifier {
    Number(u64),
    Text(String),
}

impl Identifier {
    /// `0` and `""` mean "not set".
    pub fn is_empty(&self) -> bool {
        match self {
            Identifier::Number(n) => *n == 0,
            Identifier::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Number(n) => write!(f, "{}", n),
            Identifier::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for Identifier {
    fn from(n: u64) -> Self {
        Identifier::Number(n)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Text(s.to_string())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Identifier,
    pub user_id: Option<Identifier>,
    pub course_id: Option<Identifier>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub created_at: Option<String>,
    pub status: Option<String>,
}

impl Transaction {
    /// The associated course, if there is a usable one.
    pub fn course(&self) -> Option<&Identifier> {
        self.course_id.as_ref().filter(|course| !course.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Identifier,
    pub user_id: Option<Identifier>,
    // Kept raw; only string plans can match a known plan
    pub plan_id: Option<Value>,
    pub created_at: Option<String>,
    pub status: Option<String>,
}

impl Subscription {
    pub fn plan(&self) -> Option<&str> {
        self.plan_id.as_ref().and_then(Value::as_str)
    }
}

/// Payload of `GET /status`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ApiStatus {
    pub version: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}
