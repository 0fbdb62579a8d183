//! Feed Wire Messages
//!
//! Outbound control messages for the live-prices service. The service takes a
//! single subscribe request per connection:
//!
//! ```json
//! {"service": "live-prices", "action": "subscribe", "data": {"siteId": "..."}}
//! ```
//!
//! Inbound frames are not modelled here; they stay loosely structured and are
//! handled by [`crate::domain::payload::PricePayload`].

use serde::{Deserialize, Serialize};

/// Service name the subscription targets.
pub const LIVE_PRICES_SERVICE: &str = "live-prices";

/// Action verbs understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start streaming prices for a site.
    Subscribe,
}

/// Subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeData {
    /// Site identifier.
    #[serde(rename = "siteId")]
    pub site_id: String,
}

/// Subscribe request sent once after every successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Always `live-prices`.
    pub service: String,
    /// Always `subscribe`.
    pub action: Action,
    /// Target site.
    pub data: SubscribeData,
}

impl SubscribeRequest {
    /// Build the live-prices subscribe request for a site.
    #[must_use]
    pub fn live_prices(site_id: impl Into<String>) -> Self {
        Self {
            service: LIVE_PRICES_SERVICE.to_string(),
            action: Action::Subscribe,
            data: SubscribeData {
                site_id: site_id.into(),
            },
        }
    }

    /// Encode as a JSON text frame body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
