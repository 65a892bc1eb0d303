//! Push-channel message parser.
//!
//! A message is a JSON array of tuples, each `[id, price, currency]` or
//! `[id, price]`. A bare tuple (`["id", 12, "CZK"]`) is accepted as a batch
//! of one. Bad tuples are skipped individually; a payload that is not an
//! array at all is a `MalformedMessage`.

use crate::error::{FeedError, FeedResult};
use menu_core::{ItemId, Money, Price, Tick};
use serde_json::Value;
use tracing::{debug, warn};

/// Ticks decoded from one message, plus the tuples that were rejected.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub ticks: Vec<Tick>,
    pub rejected: Vec<FeedError>,
}

/// Decoder for push-channel payloads.
#[derive(Debug)]
pub struct TickParser {
    /// Currency assumed for `[id, price]` pairs.
    default_currency: String,
}

impl TickParser {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Decode one raw message. Counting is left to the caller.
    pub fn parse(&self, text: &str) -> FeedResult<ParsedBatch> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::MalformedMessage(format!("invalid JSON: {e}")))?;

        let entries = match value {
            Value::Array(entries) if is_bare_tuple(&entries) => vec![Value::Array(entries)],
            Value::Array(entries) => entries,
            other => {
                return Err(FeedError::MalformedMessage(format!(
                    "expected array of tuples, got {}",
                    json_kind(&other)
                )));
            }
        };

        let mut batch = ParsedBatch::default();
        for (index, entry) in entries.iter().enumerate() {
            match self.parse_tuple(entry) {
                Ok(tick) => batch.ticks.push(tick),
                Err(reason) => {
                    warn!(index, %reason, "Dropping invalid tick tuple");
                    batch.rejected.push(FeedError::InvalidTick { index, reason });
                }
            }
        }

        debug!(
            ticks = batch.ticks.len(),
            rejected = batch.rejected.len(),
            "Parsed tick batch"
        );
        Ok(batch)
    }

    fn parse_tuple(&self, entry: &Value) -> Result<Tick, String> {
        let fields = entry
            .as_array()
            .ok_or_else(|| format!("expected tuple, got {}", json_kind(entry)))?;

        let (id, price, currency) = match fields.as_slice() {
            [id, price, currency] => (id, price, Some(currency)),
            [id, price] => (id, price, None),
            other => return Err(format!("expected 2 or 3 fields, got {}", other.len())),
        };

        let id = parse_id(id)?;
        let value = parse_price(price)?;
        let currency = match currency {
            Some(Value::String(c)) if !c.trim().is_empty() => c.trim().to_string(),
            Some(Value::String(_)) | None => self.default_currency.clone(),
            Some(other) => return Err(format!("currency must be a string, got {}", json_kind(other))),
        };

        Ok(Tick::new(id, Money::new(value, currency)))
    }
}

impl Default for TickParser {
    fn default() -> Self {
        Self::new("CZK")
    }
}

/// `["id", 12, "CZK"]` rather than `[["id", 12, "CZK"]]`.
fn is_bare_tuple(entries: &[Value]) -> bool {
    matches!(entries.first(), Some(Value::String(_) | Value::Number(_)))
        && !entries.iter().any(Value::is_array)
}

fn parse_id(value: &Value) -> Result<ItemId, String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(ItemId::new(s.clone())),
        Value::Number(n) => Ok(ItemId::new(n.to_string())),
        other => Err(format!("invalid id: {other}")),
    }
}

fn parse_price(value: &Value) -> Result<Price, String> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("price must be numeric, got {}", json_kind(other))),
    };
    Price::from_json_number(&raw).map_err(|e| format!("invalid price {raw:?}: {e}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_triples() {
        let parser = TickParser::default();
        let batch = parser
            .parse(r#"[["pilsner", 49, "CZK"], ["croissant", 2.5, "EUR"]]"#)
            .unwrap();

        assert_eq!(batch.ticks.len(), 2);
        assert_eq!(batch.ticks[0].id, ItemId::new("pilsner"));
        assert_eq!(batch.ticks[0].price.value, Price::new(dec!(49)));
        assert_eq!(batch.ticks[1].price.currency, "EUR");
        assert_eq!(batch.ticks[1].price.value, Price::new(dec!(2.5)));
    }

    #[test]
    fn test_parse_pairs_use_default_currency() {
        let parser = TickParser::new("CZK");
        let batch = parser.parse(r#"[["kofola", 35]]"#).unwrap();
        assert_eq!(batch.ticks[0].price.currency, "CZK");
    }

    #[test]
    fn test_parse_bare_tuple() {
        let parser = TickParser::default();
        let batch = parser.parse(r#"["kofola", 35, "CZK"]"#).unwrap();
        assert_eq!(batch.ticks.len(), 1);
        assert_eq!(batch.ticks[0].id.as_str(), "kofola");
    }

    #[test]
    fn test_invalid_tuples_are_skipped() {
        let parser = TickParser::default();
        let batch = parser
            .parse(r#"[["a", 1, "CZK"], ["b"], ["c", "cheap", "CZK"], {"id": "d"}, ["e", 5]]"#)
            .unwrap();

        let ids: Vec<_> = batch.ticks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e"]);
        assert_eq!(batch.rejected.len(), 3);
        assert!(matches!(
            batch.rejected[0],
            FeedError::InvalidTick { index: 1, .. }
        ));
    }

    #[test]
    fn test_malformed_messages() {
        let parser = TickParser::default();
        assert!(matches!(
            parser.parse("not json"),
            Err(FeedError::MalformedMessage(_))
        ));
        assert!(matches!(
            parser.parse(r#"{"id": "a", "price": 1}"#),
            Err(FeedError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let parser = TickParser::default();
        let batch = parser.parse("[]").unwrap();
        assert!(batch.ticks.is_empty());
        assert!(batch.rejected.is_empty());
    }
}
