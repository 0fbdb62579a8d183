//! Live Price Payload Types
//!
//! Loosely structured views over the JSON messages pushed by the live-prices
//! feed. The feed makes no schema promises, so every accessor here returns
//! `Option` and never fails on a missing or mistyped field.
//!
//! # Message Shape
//!
//! ```json
//! {
//!   "data": {
//!     "prices": [
//!       {"channelType": "general", "perKwh": 31.2, "descriptor": "neutral", ...},
//!       {"channelType": "feedIn", "perKwh": -4.1, "descriptor": "low", ...}
//!     ]
//!   }
//! }
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

// =============================================================================
// Well-known identifiers
// =============================================================================

/// General supply (grid import) channel.
pub const CHANNEL_GENERAL: &str = "general";

/// Feed-in (solar export) channel.
pub const CHANNEL_FEED_IN: &str = "feedIn";

/// Controlled load (off-peak circuit) channel.
pub const CHANNEL_CONTROLLED_LOAD: &str = "controlledLoad";

/// Field names used inside a price entry.
pub mod fields {
    /// Channel identifier.
    pub const CHANNEL_TYPE: &str = "channelType";
    /// Retail price in c/kWh.
    pub const PER_KWH: &str = "perKwh";
    /// Wholesale spot price in c/kWh.
    pub const SPOT_PER_KWH: &str = "spotPerKwh";
    /// Renewables share of the grid, percent.
    pub const RENEWABLES: &str = "renewables";
    /// Qualitative price descriptor.
    pub const DESCRIPTOR: &str = "descriptor";
    /// Price spike status.
    pub const SPIKE_STATUS: &str = "spikeStatus";
    /// Interval start.
    pub const START_TIME: &str = "startTime";
    /// Interval end.
    pub const END_TIME: &str = "endTime";
    /// NEM reference time.
    pub const NEM_TIME: &str = "nemTime";
    /// Nested tariff information object.
    pub const TARIFF_INFORMATION: &str = "tariffInformation";
}

// =============================================================================
// Price Payload
// =============================================================================

/// A decoded message from the live-prices feed.
///
/// Holds the top-level JSON object as received. The price list is read lazily
/// by [`PricePayload::price_entries`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PricePayload {
    raw: Map<String, Value>,
}

impl PricePayload {
    /// Wrap a decoded JSON object.
    #[must_use]
    pub const fn new(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    /// Build a payload from an arbitrary JSON value.
    ///
    /// Returns `None` unless the value is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(raw) => Some(Self { raw }),
            _ => None,
        }
    }

    /// The top-level object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Look up a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Convert back into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.raw)
    }

    /// The raw `data.prices` list, if present and actually a list.
    #[must_use]
    pub fn prices(&self) -> Option<&Vec<Value>> {
        self.raw
            .get("data")
            .and_then(Value::as_object)
            .and_then(|data| data.get("prices"))
            .and_then(Value::as_array)
    }

    /// Iterate over the object elements of `data.prices`, in order.
    ///
    /// Non-object elements are skipped.
    pub fn price_entries(&self) -> impl Iterator<Item = ChannelEntry> + '_ {
        self.prices()
            .into_iter()
            .flatten()
            .filter_map(|value| value.as_object().cloned().map(ChannelEntry::new))
    }
}

// =============================================================================
// Channel Entry
// =============================================================================

/// One element of the `data.prices` list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelEntry {
    fields: Map<String, Value>,
}

impl ChannelEntry {
    /// Wrap a price entry object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The raw field map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a field by name. JSON `null` is treated as absent.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Channel identifier, if present and a non-empty string.
    #[must_use]
    pub fn channel_type(&self) -> Option<&str> {
        self.str_field(fields::CHANNEL_TYPE)
            .filter(|channel| !channel.is_empty())
    }

    /// Retail price per kWh.
    #[must_use]
    pub fn per_kwh(&self) -> Option<Decimal> {
        self.decimal_field(fields::PER_KWH)
    }

    /// Wholesale spot price per kWh.
    #[must_use]
    pub fn spot_per_kwh(&self) -> Option<Decimal> {
        self.decimal_field(fields::SPOT_PER_KWH)
    }

    /// Renewables percentage.
    #[must_use]
    pub fn renewables(&self) -> Option<Decimal> {
        self.decimal_field(fields::RENEWABLES)
    }

    /// Qualitative descriptor (e.g. `"low"`, `"spike"`).
    #[must_use]
    pub fn descriptor(&self) -> Option<&str> {
        self.str_field(fields::DESCRIPTOR)
    }

    /// Spike status (e.g. `"none"`, `"potential"`, `"spike"`).
    #[must_use]
    pub fn spike_status(&self) -> Option<&str> {
        self.str_field(fields::SPIKE_STATUS)
    }

    /// Interval start time.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.time_field(fields::START_TIME)
    }

    /// Interval end time.
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.time_field(fields::END_TIME)
    }

    /// NEM reference time.
    #[must_use]
    pub fn nem_time(&self) -> Option<DateTime<Utc>> {
        self.time_field(fields::NEM_TIME)
    }

    /// The nested `tariffInformation` object, if present.
    #[must_use]
    pub fn tariff_information(&self) -> Option<&Map<String, Value>> {
        self.fields
            .get(fields::TARIFF_INFORMATION)
            .and_then(Value::as_object)
    }

    /// Look up a field inside `tariffInformation`.
    ///
    /// A missing or non-object `tariffInformation` behaves like an empty one.
    #[must_use]
    pub fn tariff(&self, name: &str) -> Option<&Value> {
        self.tariff_information()
            .and_then(|tariff| tariff.get(name))
            .filter(|value| !value.is_null())
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    fn decimal_field(&self, name: &str) -> Option<Decimal> {
        match self.fields.get(name)? {
            // Going through the number's text keeps 12.5 as exactly 12.5.
            Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    fn time_field(&self, name: &str) -> Option<DateTime<Utc>> {
        parse_timestamp(self.str_field(name)?)
    }
}

/// Parse a feed timestamp.
///
/// Accepts RFC 3339 with an offset; a timestamp without an offset is taken
/// as UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload(value: Value) -> PricePayload {
        PricePayload::from_value(value).unwrap()
    }

    fn entry(value: Value) -> ChannelEntry {
        ChannelEntry::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(PricePayload::from_value(json!([1, 2, 3])).is_none());
        assert!(PricePayload::from_value(json!("text")).is_none());
        assert!(PricePayload::from_value(json!(42)).is_none());
        assert!(PricePayload::from_value(json!({})).is_some());
    }

    #[test]
    fn price_entries_reads_data_prices() {
        let p = payload(json!({
            "data": {"prices": [
                {"channelType": "general", "perKwh": 30.1},
                "garbage",
                {"channelType": "feedIn", "perKwh": -2.0}
            ]}
        }));

        let channels: Vec<_> = p
            .price_entries()
            .map(|e| e.channel_type().unwrap().to_string())
            .collect();
        assert_eq!(channels, vec!["general", "feedIn"]);
    }

    #[test]
    fn price_entries_tolerates_missing_or_mistyped_paths() {
        assert_eq!(payload(json!({})).price_entries().count(), 0);
        assert_eq!(payload(json!({"data": "x"})).price_entries().count(), 0);
        assert_eq!(
            payload(json!({"data": {"prices": {"a": 1}}}))
                .price_entries()
                .count(),
            0
        );
    }

    #[test]
    fn decimal_fields_are_exact() {
        let e = entry(json!({"perKwh": 12.5, "spotPerKwh": "7.25", "renewables": true}));
        assert_eq!(e.per_kwh(), Some(Decimal::new(125, 1)));
        assert_eq!(e.spot_per_kwh(), Some(Decimal::new(725, 2)));
        assert_eq!(e.renewables(), None);
    }

    #[test]
    fn channel_type_must_be_non_empty_string() {
        assert_eq!(entry(json!({"channelType": ""})).channel_type(), None);
        assert_eq!(entry(json!({"channelType": 3})).channel_type(), None);
        assert_eq!(
            entry(json!({"channelType": "controlledLoad"})).channel_type(),
            Some(CHANNEL_CONTROLLED_LOAD)
        );
    }

    #[test]
    fn null_fields_are_absent() {
        let e = entry(json!({"descriptor": null, "tariffInformation": {"period": null}}));
        assert!(e.field("descriptor").is_none());
        assert!(e.tariff("period").is_none());
    }

    #[test]
    fn tariff_defaults_to_empty() {
        assert!(entry(json!({})).tariff("period").is_none());
        assert!(entry(json!({"tariffInformation": 5})).tariff("period").is_none());
        assert_eq!(
            entry(json!({"tariffInformation": {"period": "peak"}})).tariff("period"),
            Some(&json!("peak"))
        );
    }

    #[test]
    fn timestamps_parse_with_and_without_offset() {
        let e = entry(json!({
            "startTime": "2024-05-01T10:00:01Z",
            "endTime": "2024-05-01T10:05:00",
            "nemTime": "2024-05-01T20:05:00+10:00"
        }));
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();
        assert_eq!(
            e.start_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 1).unwrap())
        );
        assert_eq!(e.end_time(), Some(expected));
        assert_eq!(e.nem_time(), Some(expected));
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("  "), None);
    }
}
