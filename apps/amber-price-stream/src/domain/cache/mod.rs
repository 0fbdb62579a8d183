//! Channel Index
//!
//! Maps each channel identifier to the latest price entry seen for it in a
//! single payload. Channel identifiers are kept as opaque strings so new
//! channels introduced by the feed flow through untouched.

use std::collections::HashMap;

use serde_json::Value;

use super::payload::{ChannelEntry, PricePayload};

/// Channel identifier → latest entry, built from one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelIndex {
    entries: HashMap<String, ChannelEntry>,
}

impl ChannelIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from the payload's price list.
    ///
    /// Entries without a channel identifier are skipped. When the list holds
    /// more than one entry for a channel, the last one wins.
    #[must_use]
    pub fn from_payload(payload: &PricePayload) -> Self {
        let mut entries = HashMap::new();
        for entry in payload.price_entries() {
            let Some(channel) = entry.channel_type().map(str::to_owned) else {
                continue;
            };
            entries.insert(channel, entry);
        }
        Self { entries }
    }

    /// Entry for a channel.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<&ChannelEntry> {
        self.entries.get(channel)
    }

    /// Field of a channel's entry.
    #[must_use]
    pub fn value(&self, channel: &str, field: &str) -> Option<&Value> {
        self.get(channel)?.field(field)
    }

    /// Field inside a channel's `tariffInformation`.
    #[must_use]
    pub fn tariff_value(&self, channel: &str, field: &str) -> Option<&Value> {
        self.get(channel)?.tariff(field)
    }

    /// Known channel identifiers, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.entries.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Number of indexed channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(channel, entry)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(value: Value) -> PricePayload {
        PricePayload::from_value(value).unwrap()
    }

    #[test]
    fn duplicate_channel_keeps_last_entry() {
        let index = ChannelIndex::from_payload(&payload(json!({
            "data": {"prices": [
                {"channelType": "general", "perKwh": 10.0, "descriptor": "high"},
                {"channelType": "general", "perKwh": 20.0}
            ]}
        })));

        assert_eq!(index.len(), 1);
        assert_eq!(index.value("general", "perKwh"), Some(&json!(20.0)));
        // The earlier entry's fields do not leak into the later one.
        assert_eq!(index.value("general", "descriptor"), None);
    }

    #[test]
    fn entries_without_channel_are_skipped() {
        let index = ChannelIndex::from_payload(&payload(json!({
            "data": {"prices": [
                {"perKwh": 1.0},
                {"channelType": null, "perKwh": 2.0},
                {"channelType": "", "perKwh": 3.0},
                {"channelType": "feedIn", "perKwh": 4.0}
            ]}
        })));

        assert_eq!(index.channels(), vec!["feedIn".to_string()]);
    }

    #[test]
    fn unknown_channel_and_field_are_absent() {
        let index = ChannelIndex::from_payload(&payload(json!({
            "data": {"prices": [{"channelType": "general"}]}
        })));
        assert!(index.value("nope", "perKwh").is_none());
        assert!(index.value("general", "nope").is_none());
        assert!(index.tariff_value("general", "period").is_none());
    }

    #[test]
    fn new_channels_pass_through() {
        let index = ChannelIndex::from_payload(&payload(json!({
            "data": {"prices": [{"channelType": "batteryExport", "perKwh": 1.5}]}
        })));
        assert_eq!(index.value("batteryExport", "perKwh"), Some(&json!(1.5)));
    }

    proptest! {
        #[test]
        fn last_entry_per_channel_wins(
            items in proptest::collection::vec((0usize..4, -100i64..100), 0..32)
        ) {
            let names = ["general", "feedIn", "controlledLoad", "other"];
            let prices: Vec<Value> = items
                .iter()
                .map(|(c, p)| json!({"channelType": names[*c], "perKwh": p}))
                .collect();
            let index = ChannelIndex::from_payload(&payload(json!({"data": {"prices": prices}})));

            for name in names {
                let expected = items
                    .iter()
                    .rev()
                    .find(|(c, _)| names[*c] == name)
                    .map(|(_, p)| json!(p));
                prop_assert_eq!(index.value(name, "perKwh").cloned(), expected);
            }
        }
    }
}
