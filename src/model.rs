// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Receipt domain types shared by the normalizer, categorizer and store

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::i18n::Locale;
use crate::{RaseedError, Result};

/// Spending category assigned by the categorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Groceries,
    Dining,
    Transport,
    Utilities,
    Other,
    /// Stored when analysis was unavailable; never produced by the model
    Uncategorized,
}

impl Category {
    /// Labels the language model may answer with
    pub const ASSIGNABLE: [Category; 5] = [
        Category::Groceries,
        Category::Dining,
        Category::Transport,
        Category::Utilities,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Dining => "dining",
            Self::Transport => "transport",
            Self::Utilities => "utilities",
            Self::Other => "other",
            Self::Uncategorized => "uncategorized",
        }
    }

    pub fn is_assigned(&self) -> bool {
        *self != Self::Uncategorized
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RaseedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "groceries" => Ok(Self::Groceries),
            "dining" => Ok(Self::Dining),
            "transport" => Ok(Self::Transport),
            "utilities" => Ok(Self::Utilities),
            "other" => Ok(Self::Other),
            "uncategorized" => Ok(Self::Uncategorized),
            other => Err(RaseedError::InvalidInput(format!("unknown category '{}'", other))),
        }
    }
}

/// One purchased line on a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub unit_amount: Decimal,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(description: impl Into<String>, unit_amount: Decimal, quantity: u32) -> Self {
        Self {
            description: description.into(),
            unit_amount,
            quantity,
        }
    }

    /// Amount charged for the whole line
    pub fn amount(&self) -> Decimal {
        self.unit_amount * Decimal::from(self.quantity)
    }
}

/// A stored receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub owner_id: String,
    pub merchant: String,
    pub date: Option<NaiveDate>,
    pub currency: String,
    pub total: Decimal,
    pub tax: Decimal,
    pub items: Vec<LineItem>,
    pub category: Category,
    pub insight: Option<String>,
    pub raw_text: String,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    /// Sum of line amounts plus tax; `None` when there are no line items
    pub fn item_total(&self) -> Option<Decimal> {
        item_sum(&self.items).map(|sum| sum + self.tax)
    }

    /// Check the total invariant: with line items, total must equal their sum plus tax
    pub fn validate(&self) -> Result<()> {
        if self.total <= Decimal::ZERO {
            return Err(RaseedError::InvalidInput(format!(
                "receipt {} has non-positive total {}",
                self.id, self.total
            )));
        }
        if let Some(expected) = self.item_total() {
            if expected != self.total {
                return Err(RaseedError::InvalidInput(format!(
                    "receipt {} total {} does not match line items {}",
                    self.id, self.total, expected
                )));
            }
        }
        Ok(())
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_assigned()
    }
}

/// Sum of line amounts, `None` for an empty list
pub fn item_sum(items: &[LineItem]) -> Option<Decimal> {
    if items.is_empty() {
        None
    } else {
        Some(items.iter().map(LineItem::amount).sum())
    }
}

/// Signed-in account as remembered by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub locale: Locale,
    pub last_login: DateTime<Utc>,
}

/// Per-user settings that persist across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub locale: Locale,
}

impl Default for UserPreference {
    fn default() -> Self {
        Self { locale: Locale::English }
    }
}

/// Aggregate spending figures for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingStats {
    pub total_receipts: i64,
    pub total_spent: Decimal,
    pub top_category: Option<Category>,
    pub average_spend: Decimal,
    pub by_category: Vec<(Category, i64)>,
}
