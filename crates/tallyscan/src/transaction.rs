//! Core transaction types for tallyscan.
//!
//! This module defines the fundamental data structures for representing
//! expenses: monetary amounts, store categories, line items, and the
//! transactions that storage persists.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default currency for new transactions.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A monetary amount in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create an amount from whole major units.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Add, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtract, returning `None` on overflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(diff) => Some(Self(diff)),
            None => None,
        }
    }

    /// Check if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse an amount as printed on a receipt.
    ///
    /// Accepts `12.34`, `12,34`, `$1,234.50`, `1.234,50` and negative values.
    /// A separator followed by exactly three digits is a thousands separator;
    /// one or two digits make it the decimal separator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] when the input is not an amount.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidAmount {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let body: String = rest
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | ' '))
            .collect();

        if body.is_empty()
            || !body
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        {
            return Err(invalid());
        }

        let (whole, fraction) = match body.rfind(['.', ',']) {
            Some(pos) => match body.len() - pos - 1 {
                0 => return Err(invalid()),
                1 | 2 => (&body[..pos], &body[pos + 1..]),
                _ => (body.as_str(), ""),
            },
            None => (body.as_str(), ""),
        };

        let whole_digits: String = whole.chars().filter(char::is_ascii_digit).collect();
        let major: i64 = if whole_digits.is_empty() {
            if fraction.is_empty() {
                return Err(invalid());
            }
            0
        } else {
            whole_digits.parse().map_err(|_| invalid())?
        };

        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let units = major
            .checked_mul(100)
            .and_then(|m| m.checked_add(minor))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -units } else { units }))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Saturates at the `i64` bounds.
impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

/// Saturates at the `i64` bounds.
impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// The kind of store a transaction happened at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Groceries and supermarkets.
    Supermarket,
    /// Restaurants, cafes and takeaway.
    Restaurant,
    /// Fuel, parking, public transport, taxis.
    Transport,
    /// Pharmacies and drugstores.
    Pharmacy,
    /// Clothing and shoes.
    Clothing,
    /// Electronics and appliances.
    Electronics,
    /// Home improvement and furniture.
    Home,
    /// Cinemas, concerts, streaming.
    Entertainment,
    /// Utilities, subscriptions and other services.
    Services,
    /// Anything else.
    #[default]
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 10] = [
        Self::Supermarket,
        Self::Restaurant,
        Self::Transport,
        Self::Pharmacy,
        Self::Clothing,
        Self::Electronics,
        Self::Home,
        Self::Entertainment,
        Self::Services,
        Self::Other,
    ];

    /// The stable identifier used in storage and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supermarket => "supermarket",
            Self::Restaurant => "restaurant",
            Self::Transport => "transport",
            Self::Pharmacy => "pharmacy",
            Self::Clothing => "clothing",
            Self::Electronics => "electronics",
            Self::Home => "home",
            Self::Entertainment => "entertainment",
            Self::Services => "services",
            Self::Other => "other",
        }
    }

    /// Guess a category from a merchant name.
    ///
    /// Matching is keyword based and case-insensitive; unknown merchants
    /// fall back to [`Category::Other`].
    #[must_use]
    pub fn infer(merchant: &str) -> Self {
        const KEYWORDS: &[(Category, &[&str])] = &[
            (
                Category::Supermarket,
                &["market", "grocer", "foods", "walmart", "costco", "aldi", "lidl", "kroger"],
            ),
            (
                Category::Restaurant,
                &["restaurant", "cafe", "coffee", "pizza", "burger", "bistro", "sushi", "bar"],
            ),
            (
                Category::Transport,
                &["fuel", "gas station", "shell", "parking", "taxi", "uber", "metro", "rail"],
            ),
            (Category::Pharmacy, &["pharma", "drug", "cvs", "walgreens", "apotek"]),
            (Category::Clothing, &["apparel", "fashion", "shoes", "zara", "uniqlo"]),
            (Category::Electronics, &["electronic", "best buy", "apple store", "computer"]),
            (Category::Home, &["hardware", "ikea", "home depot", "furniture", "garden"]),
            (Category::Entertainment, &["cinema", "theater", "theatre", "netflix", "tickets"]),
            (Category::Services, &["telecom", "electric", "water", "insurance", "laundry"]),
        ];

        let lower = merchant.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map_or(Self::Other, |(category, _)| *category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| Error::validation("category", format!("unknown category '{s}'")))
    }
}

/// A single line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item description as printed.
    pub name: String,
    /// Line total.
    pub price: Money,
    /// Number of units bought.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    /// Create a single-unit line item.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            name: name.into(),
            price,
            quantity: 1,
        }
    }
}

/// A recorded expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Date printed on the receipt, or the day it was entered.
    pub date: NaiveDate,

    /// Store name.
    pub merchant: String,

    /// Store category.
    pub category: Category,

    /// Amount paid.
    pub total: Money,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Receipt lines, if known.
    #[serde(default)]
    pub items: Vec<LineItem>,

    /// BLAKE3 hash of the scanned receipt, used for deduplication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_hash: Option<String>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction in the default currency.
    ///
    /// The category is inferred from the merchant name.
    #[must_use]
    pub fn new(merchant: impl Into<String>, total: Money, date: NaiveDate) -> Self {
        let merchant = merchant.into();
        Self {
            id: None,
            date,
            category: Category::infer(&merchant),
            merchant,
            total,
            currency: DEFAULT_CURRENCY.to_string(),
            items: Vec::new(),
            receipt_hash: None,
            created_at: Utc::now(),
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Set the line items.
    #[must_use]
    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    /// Sum of the line item prices.
    #[must_use]
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Check the record before it is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank merchant, a malformed
    /// currency code or a zero-quantity line item.
    pub fn validate(&self) -> Result<()> {
        if self.merchant.trim().is_empty() {
            return Err(Error::validation("merchant", "must not be blank"));
        }
        validate_currency(&self.currency)?;
        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(Error::validation(
                "items",
                format!("'{}' has zero quantity", item.name),
            ));
        }
        Ok(())
    }
}

/// Check that a currency code is three uppercase ASCII letters.
///
/// # Errors
///
/// Returns [`Error::Validation`] otherwise.
pub fn validate_currency(code: &str) -> Result<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(Error::validation(
            "currency",
            format!("'{code}' is not a 3-letter code"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_money_parse_plain() {
        assert_eq!(Money::parse("12.34").unwrap(), Money::from_minor(1234));
        assert_eq!(Money::parse("12").unwrap(), Money::from_minor(1200));
        assert_eq!(Money::parse("0.5").unwrap(), Money::from_minor(50));
        assert_eq!(Money::parse(".99").unwrap(), Money::from_minor(99));
    }

    #[test]
    fn test_money_parse_separators() {
        assert_eq!(Money::parse("12,34").unwrap(), Money::from_minor(1234));
        assert_eq!(Money::parse("$1,234.50").unwrap(), Money::from_minor(123_450));
        assert_eq!(Money::parse("1.234,50").unwrap(), Money::from_minor(123_450));
        assert_eq!(Money::parse("1,234").unwrap(), Money::from_minor(123_400));
        assert_eq!(Money::parse("€ 7,00").unwrap(), Money::from_minor(700));
    }

    #[test]
    fn test_money_parse_negative() {
        assert_eq!(Money::parse("-3.10").unwrap(), Money::from_minor(-310));
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("12.").is_err());
        assert!(Money::parse("1.2.x").is_err());
        assert!(Money::parse("99999999999999999999").is_err());
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-250).to_string(), "-2.50");
        assert_eq!(Money::from_major(3).to_string(), "3.00");
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::from_minor(100), Money::from_minor(250)]
            .iter()
            .sum();
        assert_eq!(total, Money::from_minor(350));
        assert_eq!(total - Money::from_minor(50), Money::from_minor(300));
    }

    #[test]
    fn test_money_arithmetic_saturates() {
        let max = Money::parse("92233720368547758.07").unwrap();
        assert_eq!(max, Money::from_minor(i64::MAX));
        assert_eq!(max + max, Money::from_minor(i64::MAX));
        assert_eq!(Money::from_minor(i64::MIN) - max, Money::from_minor(i64::MIN));
        let total: Money = [max, Money::from_minor(1)].iter().sum();
        assert_eq!(total, max);

        assert_eq!(max.checked_add(Money::from_minor(1)), None);
        assert_eq!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_minor(5).checked_add(Money::from_minor(7)),
            Some(Money::from_minor(12))
        );
        assert_eq!(Money::from_major(i64::MAX), Money::from_minor(i64::MAX));
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("groceries".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::Supermarket).unwrap();
        assert_eq!(json, "\"supermarket\"");
    }

    #[test]
    fn test_category_infer() {
        assert_eq!(Category::infer("Corner Market"), Category::Supermarket);
        assert_eq!(Category::infer("BLUE BOTTLE COFFEE"), Category::Restaurant);
        assert_eq!(Category::infer("Shell Fuel #12"), Category::Transport);
        assert_eq!(Category::infer("Unknown Shop"), Category::Other);
    }

    #[test]
    fn test_transaction_new_infers_category() {
        let tx = Transaction::new("Pizza Palace", Money::from_minor(1599), date(2024, 5, 1));
        assert!(tx.id.is_none());
        assert_eq!(tx.category, Category::Restaurant);
        assert_eq!(tx.currency, DEFAULT_CURRENCY);
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_transaction_items_total() {
        let tx = Transaction::new("Store", Money::from_minor(300), date(2024, 5, 1)).with_items(vec![
            LineItem::new("Milk", Money::from_minor(120)),
            LineItem::new("Bread", Money::from_minor(180)),
        ]);
        assert_eq!(tx.items_total(), Money::from_minor(300));
    }

    #[test]
    fn test_transaction_validate_blank_merchant() {
        let tx = Transaction::new("  ", Money::from_minor(1), date(2024, 1, 1));
        let err = tx.validate().unwrap_err();
        assert!(err.to_string().contains("merchant"));
    }

    #[test]
    fn test_transaction_validate_currency() {
        let tx = Transaction::new("Store", Money::from_minor(1), date(2024, 1, 1)).with_currency("eur");
        assert!(tx.validate().is_err());
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("EURO").is_err());
    }

    #[test]
    fn test_transaction_validate_zero_quantity() {
        let mut item = LineItem::new("Eggs", Money::from_minor(300));
        item.quantity = 0;
        let tx = Transaction::new("Store", Money::from_minor(300), date(2024, 1, 1)).with_items(vec![item]);
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_line_item_default_quantity_on_deserialize() {
        let item: LineItem = serde_json::from_str(r#"{"name":"Tea","price":250}"#).unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.price, Money::from_minor(250));
    }
}
