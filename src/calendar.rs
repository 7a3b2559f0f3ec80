//! Month grid layout for the dashboard calendar.
//!
//! A grid is always six weeks of seven days starting on Sunday: the tail of
//! the previous month, every day of the requested month, then the head of the
//! next month.

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

pub const DAYS_PER_WEEK: usize = 7;
pub const WEEKS_PER_GRID: usize = 6;
pub const GRID_CELLS: usize = DAYS_PER_WEEK * WEEKS_PER_GRID;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid month {0}: expected 1..=12")]
    InvalidMonth(u32),
    #[error("year {0} is out of range")]
    YearOutOfRange(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, CalendarError> {
        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidMonth(month));
        }
        // Both neighbouring months must be representable for grid padding.
        let lower = NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.pred_opt());
        let upper = NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.succ_opt());
        if lower.is_none() || upper.is_none() {
            return Err(CalendarError::YearOutOfRange(year));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month containing today's local date.
    pub fn current() -> Self {
        Self::containing(Local::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Day 0 of the next month, i.e. the last day of this one.
    pub fn days_in_month(&self) -> u32 {
        self.next()
            .first_day()
            .pred_opt()
            .map(|last| last.day())
            .unwrap_or(31)
    }

    /// Weekday of the 1st, counted from Sunday = 0.
    pub fn first_weekday(&self) -> u32 {
        self.first_day().weekday().num_days_from_sunday()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub day: u32,
    pub is_current_month: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub month: YearMonth,
    pub cells: Vec<DayCell>,
}

impl MonthGrid {
    pub fn weeks(&self) -> impl Iterator<Item = &[DayCell]> {
        self.cells.chunks(DAYS_PER_WEEK)
    }

    /// Date of a current-month day, or `None` if `day` is outside the month.
    pub fn date_of(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.month.year, self.month.month, day)
    }

    pub fn is_today(&self, day: u32, today: NaiveDate) -> bool {
        self.date_of(day) == Some(today)
    }
}

pub fn month_grid(month: YearMonth) -> MonthGrid {
    let days_in_month = month.days_in_month();
    let leading = month.first_weekday();
    let previous_days = month.previous().days_in_month();

    let mut cells = Vec::with_capacity(GRID_CELLS);

    for offset in (0..leading).rev() {
        cells.push(DayCell {
            day: previous_days - offset,
            is_current_month: false,
        });
    }

    cells.extend((1..=days_in_month).map(|day| DayCell {
        day,
        is_current_month: true,
    }));

    let trailing = GRID_CELLS - cells.len();
    cells.extend((1..=trailing as u32).map(|day| DayCell {
        day,
        is_current_month: false,
    }));

    MonthGrid { month, cells }
}
