//! Filter and sort criteria.

use crate::error::{ViewError, ViewResult};
use chrono::SecondsFormat;
use menu_core::Item;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Addressable item field. Used as sort key, column accessor and
/// per-column filter target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemField {
    Id,
    Name,
    #[serde(rename = "type")]
    ItemType,
    Description,
    CuisineCountry,
    Price,
    Currency,
    #[serde(alias = "creationDate")]
    CreatedAt,
    LastUpdate,
    IsVegetarian,
    IsVegan,
    IsAlcoholic,
}

impl ItemField {
    /// Every field, in column order. The free-text filter scans all of them.
    pub const ALL: [ItemField; 12] = [
        ItemField::Id,
        ItemField::Name,
        ItemField::ItemType,
        ItemField::Description,
        ItemField::CuisineCountry,
        ItemField::Price,
        ItemField::Currency,
        ItemField::CreatedAt,
        ItemField::LastUpdate,
        ItemField::IsVegetarian,
        ItemField::IsVegan,
        ItemField::IsAlcoholic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::ItemType => "type",
            Self::Description => "description",
            Self::CuisineCountry => "cuisineCountry",
            Self::Price => "price",
            Self::Currency => "currency",
            Self::CreatedAt => "createdAt",
            Self::LastUpdate => "lastUpdate",
            Self::IsVegetarian => "isVegetarian",
            Self::IsVegan => "isVegan",
            Self::IsAlcoholic => "isAlcoholic",
        }
    }

    /// Raw textual value of the field, as matched by filters.
    pub fn text(&self, item: &Item) -> String {
        match self {
            Self::Id => item.id.to_string(),
            Self::Name => item.name.clone(),
            Self::ItemType => item.item_type.to_string(),
            Self::Description => item.description.clone(),
            Self::CuisineCountry => item.cuisine_country.clone(),
            Self::Price => item
                .price
                .as_ref()
                .map(|p| p.value.to_string())
                .unwrap_or_default(),
            Self::Currency => item
                .price
                .as_ref()
                .map(|p| p.currency.clone())
                .unwrap_or_default(),
            Self::CreatedAt => item.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::LastUpdate => item.last_update.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::IsVegetarian => item.is_vegetarian.to_string(),
            Self::IsVegan => item.is_vegan.to_string(),
            Self::IsAlcoholic => item.is_alcoholic.to_string(),
        }
    }

    /// Natural ordering of the field: lexicographic for text, numeric for
    /// price (unpriced first), chronological for timestamps.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.cmp(&b.name),
            Self::ItemType => a.item_type.as_str().cmp(b.item_type.as_str()),
            Self::Description => a.description.cmp(&b.description),
            Self::CuisineCountry => a.cuisine_country.cmp(&b.cuisine_country),
            Self::Price => {
                let av = a.price.as_ref().map(|p| p.value);
                let bv = b.price.as_ref().map(|p| p.value);
                av.cmp(&bv)
            }
            Self::Currency => {
                let ac = a.price.as_ref().map(|p| p.currency.as_str());
                let bc = b.price.as_ref().map(|p| p.currency.as_str());
                ac.cmp(&bc)
            }
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::LastUpdate => a.last_update.cmp(&b.last_update),
            Self::IsVegetarian => a.is_vegetarian.cmp(&b.is_vegetarian),
            Self::IsVegan => a.is_vegan.cmp(&b.is_vegan),
            Self::IsAlcoholic => a.is_alcoholic.cmp(&b.is_alcoholic),
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemField {
    type Err = ViewError;

    fn from_str(s: &str) -> ViewResult<Self> {
        let field = match s {
            "id" => Self::Id,
            "name" => Self::Name,
            "type" => Self::ItemType,
            "description" => Self::Description,
            "cuisineCountry" | "cuisine_country" => Self::CuisineCountry,
            "price" => Self::Price,
            "currency" => Self::Currency,
            "createdAt" | "created_at" | "creationDate" => Self::CreatedAt,
            "lastUpdate" | "last_update" => Self::LastUpdate,
            "isVegetarian" | "vegetarian" => Self::IsVegetarian,
            "isVegan" | "vegan" => Self::IsVegan,
            "isAlcoholic" | "alcohol" => Self::IsAlcoholic,
            other => return Err(ViewError::UnknownField(other.to_string())),
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = ViewError;

    fn from_str(s: &str) -> ViewResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ViewError::UnknownDirection(other.to_string())),
        }
    }
}

/// Substring filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: ItemField,
    pub keyword: String,
}

/// What the caller wants to see. Ephemeral, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSortCriteria {
    /// Case-insensitive substring matched against every field's text.
    pub filter_text: String,
    pub sort_key: Option<ItemField>,
    pub sort_direction: SortDirection,
    /// Extra filter on one column, applied together with `filter_text`.
    pub field_filter: Option<FieldFilter>,
}

impl FilterSortCriteria {
    pub fn filtered(filter_text: impl Into<String>) -> Self {
        Self {
            filter_text: filter_text.into(),
            ..Default::default()
        }
    }

    pub fn sorted(sort_key: ItemField, sort_direction: SortDirection) -> Self {
        Self {
            sort_key: Some(sort_key),
            sort_direction,
            ..Default::default()
        }
    }

    /// Header-click behaviour: the active key flips direction, a new key
    /// starts ascending.
    pub fn toggle_sort(&mut self, key: ItemField) {
        if self.sort_key == Some(key) {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_key = Some(key);
            self.sort_direction = SortDirection::Asc;
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        let text_ok = self.filter_text.is_empty() || {
            let needle = self.filter_text.to_lowercase();
            ItemField::ALL
                .iter()
                .any(|field| field.text(item).to_lowercase().contains(&needle))
        };
        let field_ok = match &self.field_filter {
            Some(f) if !f.keyword.is_empty() => f
                .field
                .text(item)
                .to_lowercase()
                .contains(&f.keyword.to_lowercase()),
            _ => true,
        };
        text_ok && field_ok
    }
}
