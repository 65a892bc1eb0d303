//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use chrono::{DateTime, TimeZone};
use menu_core::Item;
use menu_feed::IngestStatsSnapshot;
use menu_view::{
    column_index, render_row, FieldFilter, FilterSortCriteria, ItemField, SortDirection, ViewResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query string of `GET /api/items`; also accepted as a WebSocket text
/// message to change a client's view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    /// Column for the per-column filter.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl ItemsQuery {
    pub fn into_criteria(self) -> ViewResult<FilterSortCriteria> {
        let sort_key = self
            .sort
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ItemField>())
            .transpose()?;
        let sort_direction = match self.dir.filter(|d| !d.is_empty()) {
            Some(dir) => dir.parse::<SortDirection>()?,
            None => SortDirection::Asc,
        };
        let field_filter = match (self.field.filter(|f| !f.is_empty()), self.keyword) {
            (Some(field), Some(keyword)) => Some(FieldFilter {
                field: field.parse()?,
                keyword,
            }),
            _ => None,
        };

        Ok(FilterSortCriteria {
            filter_text: self.filter.unwrap_or_default(),
            sort_key,
            sort_direction,
            field_filter,
        })
    }
}

/// One table row: the item's raw fields plus display strings.
#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    #[serde(flatten)]
    pub item: Item,
    pub price_display: Option<String>,
    pub created_display: String,
    pub updated_display: String,
    /// Every rendered cell, in column order.
    pub cells: Vec<String>,
}

impl ItemRow {
    pub fn new<Tz>(item: Item, now: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let cells = render_row(&item, now);
        let cell = |field: ItemField| {
            column_index(field)
                .and_then(|i| cells.get(i))
                .cloned()
                .unwrap_or_default()
        };
        let price_display = item.price.is_some().then(|| cell(ItemField::Price));
        let created_display = cell(ItemField::CreatedAt);
        let updated_display = cell(ItemField::LastUpdate);
        Self {
            item,
            price_display,
            created_display,
            updated_display,
            cells,
        }
    }
}

/// Projected table at one store version.
#[derive(Debug, Clone, Serialize)]
pub struct ItemsResponse {
    pub version: u64,
    pub rows: Vec<ItemRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub header: &'static str,
    pub accessor: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp_ms: i64,
    pub store_version: u64,
    pub store_items: usize,
    pub ingest: Option<IngestStatsSnapshot>,
    pub projection_hits: u64,
    pub projection_misses: u64,
}

/// WebSocket message types (tagged enum for type safety).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full table (sent on connect and after the client changes its query).
    Snapshot(ItemsResponse),
    /// Table after a store change.
    Update(ItemsResponse),
    /// The client's query could not be parsed.
    Error { message: String },
}
