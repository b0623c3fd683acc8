//! Report periods and spending summaries.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::transaction::{Category, Money, Transaction};

/// Length of a report period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    /// Seven days starting on the configured first weekday.
    Week,
    /// A calendar month.
    #[default]
    Month,
    /// A calendar quarter.
    Quarter,
    /// A calendar year.
    Year,
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Quarter => write!(f, "quarter"),
            Self::Year => write!(f, "year"),
        }
    }
}

impl FromStr for ReportPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(Error::validation("period", format!("unknown period '{s}'"))),
        }
    }
}

/// An inclusive range of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day.
    pub start: NaiveDate,
    /// Last day, inclusive.
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl DateRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::validation(
                "range",
                format!("{end} is before {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// The period of the given length that contains `anchor`.
    ///
    /// Weeks start on `week_start`; the other periods follow the calendar.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the period runs past the supported
    /// date range.
    pub fn for_period(period: ReportPeriod, anchor: NaiveDate, week_start: Weekday) -> Result<Self> {
        let out_of_range = || Error::validation("date", format!("{period} around {anchor} is out of range"));

        let (start, months) = match period {
            ReportPeriod::Week => {
                let offset = (7 + anchor.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                let start = anchor
                    .checked_sub_days(Days::new(u64::from(offset)))
                    .ok_or_else(out_of_range)?;
                let end = start
                    .checked_add_days(Days::new(6))
                    .ok_or_else(out_of_range)?;
                return Ok(Self { start, end });
            }
            ReportPeriod::Month => (month_start(anchor), 1),
            ReportPeriod::Quarter => {
                let start = month_start(anchor)
                    .checked_sub_months(Months::new(anchor.month0() % 3))
                    .ok_or_else(out_of_range)?;
                (start, 3)
            }
            ReportPeriod::Year => {
                let start = month_start(anchor)
                    .checked_sub_months(Months::new(anchor.month0()))
                    .ok_or_else(out_of_range)?;
                (start, 12)
            }
        };

        let end = start
            .checked_add_months(Months::new(months))
            .and_then(|next| next.pred_opt())
            .ok_or_else(out_of_range)?;
        Ok(Self { start, end })
    }

    /// The period of the same length immediately before this one.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the previous period is out of range.
    pub fn previous(&self, period: ReportPeriod) -> Result<Self> {
        let anchor = self.start.pred_opt().ok_or_else(|| {
            Error::validation("date", format!("no {period} before {}", self.start))
        })?;
        Self::for_period(period, anchor, self.start.weekday())
    }

    /// Check if `date` falls within the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days in the range.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    // day0 < 31, and the first of the month always exists.
    date - Days::new(u64::from(date.day0()))
}

/// Spending in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    /// The category.
    pub category: Category,
    /// Sum of the category's transactions.
    pub total: Money,
    /// Number of transactions.
    pub count: usize,
    /// Share of the period total, in percent.
    pub share: f64,
}

/// Spending within one date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// The summarized range.
    pub range: DateRange,
    /// Sum of all transactions.
    pub total: Money,
    /// Number of transactions.
    pub count: usize,
    /// Per-category totals, largest first.
    pub by_category: Vec<CategoryTotal>,
    /// Mean transaction amount.
    pub average: Money,
    /// Mean spending per day of the range.
    pub daily_average: Money,
    /// The largest transaction.
    pub largest: Option<Transaction>,
}

impl PeriodSummary {
    /// Summarize the transactions that fall within `range`.
    ///
    /// Transactions outside the range are ignored.
    #[must_use]
    pub fn build(range: DateRange, transactions: &[Transaction]) -> Self {
        let in_range: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| range.contains(tx.date))
            .collect();

        let total: Money = in_range.iter().map(|tx| tx.total).sum();
        let count = in_range.len();

        let mut categories: HashMap<Category, (Money, usize)> = HashMap::new();
        for tx in &in_range {
            let entry = categories.entry(tx.category).or_insert((Money::ZERO, 0));
            entry.0 = entry.0 + tx.total;
            entry.1 += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let mut by_category: Vec<CategoryTotal> = categories
            .into_iter()
            .map(|(category, (cat_total, cat_count))| CategoryTotal {
                category,
                total: cat_total,
                count: cat_count,
                share: if total.is_zero() {
                    0.0
                } else {
                    cat_total.minor() as f64 * 100.0 / total.minor() as f64
                },
            })
            .collect();
        by_category.sort_by(|a, b| b.total.cmp(&a.total).then(a.category.cmp(&b.category)));

        let largest = in_range
            .iter()
            .max_by(|a, b| a.total.cmp(&b.total).then(b.date.cmp(&a.date)))
            .map(|tx| (*tx).clone());

        Self {
            range,
            total,
            count,
            by_category,
            average: divide(total, i64::try_from(count).unwrap_or(i64::MAX)),
            daily_average: divide(total, range.days()),
            largest,
        }
    }

    /// Query `storage` for the range and summarize it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load(storage: &Storage, range: DateRange) -> Result<Self> {
        let transactions = storage.get_by_date_range(range.start, range.end)?;
        Ok(Self::build(range, &transactions))
    }
}

fn divide(total: Money, by: i64) -> Money {
    if by <= 0 {
        Money::ZERO
    } else {
        Money::from_minor(total.minor() / by)
    }
}

/// A period compared with the one before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    /// Period length.
    pub period: ReportPeriod,
    /// The current period.
    pub current: PeriodSummary,
    /// The period before it.
    pub previous: PeriodSummary,
    /// `current.total - previous.total`.
    pub change: Money,
    /// Change relative to the previous total, in percent. `None` when the
    /// previous period had no spending.
    pub percent: Option<f64>,
}

impl PeriodComparison {
    /// Compare two summaries.
    #[must_use]
    pub fn new(period: ReportPeriod, current: PeriodSummary, previous: PeriodSummary) -> Self {
        let change = current.total - previous.total;
        #[allow(clippy::cast_precision_loss)]
        let percent = if previous.total.is_zero() {
            None
        } else {
            Some(change.minor() as f64 * 100.0 / previous.total.minor().abs() as f64)
        };
        Self {
            period,
            current,
            previous,
            change,
            percent,
        }
    }

    /// Build the report for the period containing `anchor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a query fails.
    pub fn load(
        storage: &Storage,
        period: ReportPeriod,
        anchor: NaiveDate,
        week_start: Weekday,
    ) -> Result<Self> {
        let range = DateRange::for_period(period, anchor, week_start)?;
        let previous = range.previous(period)?;
        Ok(Self::new(
            period,
            PeriodSummary::load(storage, range)?,
            PeriodSummary::load(storage, previous)?,
        ))
    }
}
