//! Catalog item types.
//!
//! An `Item` is assembled from two independent inputs joined on `ItemId`:
//! a `MetadataRecord` fetched from the metadata endpoint, and `Tick`s
//! arriving on the push channel.

use crate::error::CoreError;
use crate::price::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique item identifier. The single join key between stream and metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Food,
    Drink,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Drink => "drink",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Ok(Self::Food),
            "drink" => Ok(Self::Drink),
            other => Err(CoreError::UnknownItemType(other.to_string())),
        }
    }
}

/// Metadata record as returned by the metadata endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: ItemId,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub description: String,
    /// ISO-3166 alpha-3 country code.
    #[serde(default)]
    pub cuisine_country: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub is_vegan: bool,
    #[serde(default)]
    pub is_alcoholic: bool,
}

/// A single price update from the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub id: ItemId,
    pub price: Money,
}

impl Tick {
    pub fn new(id: impl Into<ItemId>, price: Money) -> Self {
        Self {
            id: id.into(),
            price,
        }
    }
}

/// A resolved catalog row.
///
/// `created_at` is taken from the first metadata resolution and never
/// changes afterwards. `price` stays `None` until a tick has been merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub description: String,
    pub cuisine_country: String,
    pub price: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub is_alcoholic: bool,
}

impl Item {
    /// Build a fresh item from its first metadata record.
    pub fn from_metadata(record: MetadataRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            item_type: record.item_type,
            description: record.description,
            cuisine_country: record.cuisine_country,
            price: None,
            created_at: record.created_at,
            last_update: now,
            is_vegetarian: record.is_vegetarian,
            is_vegan: record.is_vegan,
            is_alcoholic: record.is_alcoholic,
        }
    }

    /// Replace metadata fields. Price and `created_at` are left alone.
    pub fn refresh_metadata(&mut self, record: MetadataRecord, now: DateTime<Utc>) {
        self.name = record.name;
        self.item_type = record.item_type;
        self.description = record.description;
        self.cuisine_country = record.cuisine_country;
        self.is_vegetarian = record.is_vegetarian;
        self.is_vegan = record.is_vegan;
        self.is_alcoholic = record.is_alcoholic;
        self.last_update = now;
    }

    pub fn set_price(&mut self, price: Money, now: DateTime<Utc>) {
        self.price = Some(price);
        self.last_update = now;
    }
}
