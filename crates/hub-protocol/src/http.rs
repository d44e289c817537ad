//! Frozen HTTP error envelope, shared by every non-2xx edge response.
//!
//! Grounded on `rt-protocol::HttpErrorEnvelope` from the teacher.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
