//! Table layout: column headers and display cells.

use crate::criteria::ItemField;
use chrono::{DateTime, TimeZone};
use menu_core::{format_creation_date, format_last_update, format_price, Item};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub header: &'static str,
    pub accessor: ItemField,
}

/// Display columns in table order.
pub const COLUMNS: [Column; 11] = [
    Column { header: "ID", accessor: ItemField::Id },
    Column { header: "Name", accessor: ItemField::Name },
    Column { header: "Type", accessor: ItemField::ItemType },
    Column { header: "Description", accessor: ItemField::Description },
    Column { header: "Cuisine", accessor: ItemField::CuisineCountry },
    Column { header: "Price", accessor: ItemField::Price },
    Column { header: "Creation Date", accessor: ItemField::CreatedAt },
    Column { header: "Last update", accessor: ItemField::LastUpdate },
    Column { header: "Vegetarian", accessor: ItemField::IsVegetarian },
    Column { header: "Vegan", accessor: ItemField::IsVegan },
    Column { header: "Alcohol", accessor: ItemField::IsAlcoholic },
];

fn flag(value: bool) -> String {
    if value { "✓" } else { "" }.to_string()
}

impl Column {
    /// Rendered cell text for `item`, with dates relative to `now`.
    pub fn cell<Tz>(&self, item: &Item, now: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        match self.accessor {
            ItemField::Price | ItemField::Currency => item
                .price
                .as_ref()
                .map(|p| format_price(p.value, &p.currency))
                .unwrap_or_default(),
            ItemField::CreatedAt => format_creation_date(&item.created_at, now),
            ItemField::LastUpdate => format_last_update(&item.last_update, now),
            ItemField::IsVegetarian => flag(item.is_vegetarian),
            ItemField::IsVegan => flag(item.is_vegan),
            ItemField::IsAlcoholic => flag(item.is_alcoholic),
            other => other.text(item),
        }
    }
}

/// Position of the column showing `field`, if it has one.
pub fn column_index(field: ItemField) -> Option<usize> {
    COLUMNS.iter().position(|column| column.accessor == field)
}

/// One rendered table row, in `COLUMNS` order.
pub fn render_row<Tz>(item: &Item, now: &DateTime<Tz>) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    COLUMNS.iter().map(|column| column.cell(item, now)).collect()
}
