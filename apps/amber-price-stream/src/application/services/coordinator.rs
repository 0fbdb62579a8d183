//! State Coordinator
//!
//! Keeps the latest price payload for one site, indexed by channel type, and
//! tells its own listeners whenever it changes. Presentation code reads the
//! cache through synchronous queries.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::cache::ChannelIndex;
use crate::domain::payload::{ChannelEntry, PricePayload};
use crate::infrastructure::broadcast::{ListenerHandle, ListenerRegistry};
use crate::infrastructure::feed::SubscriptionClient;

#[derive(Debug, Default)]
struct CacheState {
    payload: Option<Arc<PricePayload>>,
    index: ChannelIndex,
    last_update: Option<DateTime<Utc>>,
}

/// Cache and fan-out for the prices of one site.
pub struct StateCoordinator {
    site_id: String,
    state: RwLock<CacheState>,
    listeners: ListenerRegistry<()>,
    registration: Option<ListenerHandle>,
}

impl StateCoordinator {
    /// Create a coordinator fed by `client`.
    ///
    /// The coordinator registers itself as a payload listener for as long as
    /// it lives.
    #[must_use]
    pub fn new(client: &SubscriptionClient, site_id: impl Into<String>) -> Arc<Self> {
        let site_id = site_id.into();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let registration = client.add_listener(move |payload| {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.handle_payload(Arc::clone(payload));
                }
            });
            Self::with_registration(site_id, Some(registration))
        })
    }

    /// Create a coordinator that is only fed through
    /// [`handle_payload`](Self::handle_payload).
    #[must_use]
    pub fn detached(site_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_registration(site_id.into(), None))
    }

    fn with_registration(site_id: String, registration: Option<ListenerHandle>) -> Self {
        Self {
            site_id,
            state: RwLock::new(CacheState::default()),
            listeners: ListenerRegistry::new("coordinator"),
            registration,
        }
    }

    /// Replace the cache with `payload` and notify listeners.
    ///
    /// The lock is released before listeners run, so they may query.
    pub fn handle_payload(&self, payload: Arc<PricePayload>) {
        let index = ChannelIndex::from_payload(&payload);
        let channels = index.len();

        {
            let mut state = self.state.write();
            let now = Utc::now();
            let stamp = state.last_update.map_or(now, |previous| previous.max(now));
            state.payload = Some(payload);
            state.index = index;
            state.last_update = Some(stamp);
        }

        tracing::debug!(site_id = %self.site_id, channels, "Price cache updated");
        self.listeners.dispatch(&());
    }

    /// Register a callback fired after every cache update.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(move |_: &()| callback())
    }

    /// Value of `field` on `channel`, if both exist.
    #[must_use]
    pub fn channel_value(&self, channel: &str, field: &str) -> Option<Value> {
        self.state.read().index.value(channel, field).cloned()
    }

    /// Value of `field` inside `channel`'s tariff information.
    #[must_use]
    pub fn tariff_value(&self, channel: &str, field: &str) -> Option<Value> {
        self.state.read().index.tariff_value(channel, field).cloned()
    }

    /// The most recent channel entry for `channel`.
    #[must_use]
    pub fn channel(&self, channel: &str) -> Option<ChannelEntry> {
        self.state.read().index.get(channel).cloned()
    }

    /// Known channel types, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.state.read().index.channels()
    }

    /// The last full payload.
    #[must_use]
    pub fn last_payload(&self) -> Option<Arc<PricePayload>> {
        self.state.read().payload.clone()
    }

    /// When the cache last changed.
    #[must_use]
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_update
    }

    /// The site this coordinator tracks.
    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.site_id
    }
}

impl Drop for StateCoordinator {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }
}

impl std::fmt::Debug for StateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("StateCoordinator")
            .field("site_id", &self.site_id)
            .field("channels", &state.index.len())
            .field("last_update", &state.last_update)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::application::ports::{ConnectRequest, MockFeedConnector};
    use crate::infrastructure::feed::FeedClientConfig;

    fn payload(value: Value) -> Arc<PricePayload> {
        Arc::new(PricePayload::from_value(value).unwrap())
    }

    fn sample() -> Arc<PricePayload> {
        payload(json!({
            "data": {
                "prices": [
                    {
                        "channelType": "general",
                        "perKwh": 31.2,
                        "descriptor": "neutral",
                        "tariffInformation": {"period": "peak"}
                    },
                    {"channelType": "feedIn", "perKwh": -5.5}
                ]
            }
        }))
    }

    #[test]
    fn empty_cache_answers_absent() {
        let coordinator = StateCoordinator::detached("site-1");
        assert!(coordinator.last_payload().is_none());
        assert!(coordinator.last_update_at().is_none());
        assert!(coordinator.channel_value("general", "perKwh").is_none());
        assert!(coordinator.channels().is_empty());
    }

    #[test]
    fn handle_payload_replaces_cache() {
        let coordinator = StateCoordinator::detached("site-1");
        let sample = sample();

        coordinator.handle_payload(Arc::clone(&sample));

        assert!(Arc::ptr_eq(&coordinator.last_payload().unwrap(), &sample));
        assert_eq!(coordinator.channel_value("general", "perKwh"), Some(json!(31.2)));
        assert_eq!(
            coordinator.tariff_value("general", "period"),
            Some(json!("peak"))
        );
        assert_eq!(coordinator.channels(), vec!["feedIn", "general"]);
        assert_eq!(
            coordinator.channel("feedIn").and_then(|e| e.per_kwh()),
            Some(Decimal::new(-55, 1))
        );
    }

    #[test]
    fn unknown_channel_and_field_are_absent() {
        let coordinator = StateCoordinator::detached("site-1");
        coordinator.handle_payload(sample());

        assert!(coordinator.channel_value("controlledLoad", "perKwh").is_none());
        assert!(coordinator.channel_value("general", "nope").is_none());
        assert!(coordinator.tariff_value("feedIn", "period").is_none());
    }

    #[test]
    fn new_payload_drops_old_channels() {
        let coordinator = StateCoordinator::detached("site-1");
        coordinator.handle_payload(sample());
        coordinator.handle_payload(payload(json!({"data": {"prices": []}})));

        assert!(coordinator.channels().is_empty());
        assert!(coordinator.channel_value("general", "perKwh").is_none());
    }

    #[test]
    fn last_update_is_non_decreasing() {
        let coordinator = StateCoordinator::detached("site-1");
        let mut previous = None;
        for _ in 0..50 {
            coordinator.handle_payload(sample());
            let current = coordinator.last_update_at();
            assert!(current.is_some());
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn listeners_can_query_during_notification() {
        let coordinator = StateCoordinator::detached("site-1");
        let observed = Arc::new(parking_lot::Mutex::new(None));

        let weak = Arc::downgrade(&coordinator);
        let observed_clone = Arc::clone(&observed);
        let _handle = coordinator.add_listener(move || {
            if let Some(coordinator) = weak.upgrade() {
                *observed_clone.lock() = coordinator.channel_value("general", "descriptor");
            }
        });

        coordinator.handle_payload(sample());
        assert_eq!(*observed.lock(), Some(json!("neutral")));
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let coordinator = StateCoordinator::detached("site-1");
        let calls = Arc::new(AtomicUsize::new(0));

        let _first = coordinator.add_listener(|| panic!("listener failure"));
        let calls_clone = Arc::clone(&calls);
        let _second = coordinator.add_listener(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.handle_payload(sample());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_follows_coordinator_lifetime() {
        let client = SubscriptionClient::new(
            FeedClientConfig::new(
                ConnectRequest {
                    url: "wss://feed.test".to_string(),
                    auth_token: "tok".to_string(),
                    origin: "https://origin.test".to_string(),
                },
                "site-1",
            ),
            Arc::new(MockFeedConnector::new()),
        );

        let coordinator = StateCoordinator::new(&client, client.site_id());
        assert_eq!(coordinator.site_id(), "site-1");
        assert_eq!(client.listener_count(), 1);

        drop(coordinator);
        assert_eq!(client.listener_count(), 0);
    }
}
