//! Dispatch options.

use http::StatusCode;
use serde::{Deserialize, Serialize};

const DEFAULT_NOT_FOUND_BODY: &str = "404 not found";

/// Options tuning the responses the dispatcher synthesizes itself.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use micro_flow::DispatchConfig;
///
/// let config: DispatchConfig = serde_json::from_str(r#"{ "expose_errors": true }"#).unwrap();
/// assert!(config.expose_errors);
/// assert_eq!(config.not_found_body, "404 not found");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Body of the `404` answered when no route matches.
    pub not_found_body: String,

    /// Status answered when a matched pipeline ends without a response.
    pub unterminated_status: u16,

    /// Include the failure message in synthesized `500` bodies.
    pub expose_errors: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            not_found_body: DEFAULT_NOT_FOUND_BODY.to_string(),
            unterminated_status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            expose_errors: false,
        }
    }
}

impl DispatchConfig {
    /// The fallback status for unterminated pipelines, `500` if the configured
    /// code is not a valid status.
    pub fn unterminated_status(&self) -> StatusCode {
        StatusCode::from_u16(self.unterminated_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
