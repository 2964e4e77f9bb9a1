//! Request id generation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How correlation ids for forwarded requests are generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestIdStrategy {
    /// Hyphenated UUID v4 (122 random bits).
    #[default]
    Uuid,
    /// 21-character nanoid (126 random bits), shorter on the wire.
    Nanoid,
}

impl RequestIdStrategy {
    pub fn generate(self) -> String {
        match self {
            RequestIdStrategy::Uuid => Uuid::new_v4().to_string(),
            RequestIdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}
