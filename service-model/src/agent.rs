use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer of a placeholder agent to `POST /run`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunResponse {
    pub agent: String,
    pub status: String,
    pub received: Value,
}

impl RunResponse {
    pub fn placeholder(agent: &str, received: Value) -> Self {
        Self {
            agent: agent.to_string(),
            status: "placeholder".to_string(),
            received,
        }
    }
}
