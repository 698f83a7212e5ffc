//! Month keys, attendance slots and school-day arithmetic.
//!
//! Weeks start on Saturday and the school week runs Sunday to Thursday.

use chrono::{Datelike, NaiveDate, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// `YYYY-MM`
    pub fn key(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn days(self) -> u32 {
        self.next()
            .first_day()
            .pred_opt()
            .map(|d| d.day())
            .unwrap_or(31)
    }

    /// Number of Saturday-started calendar weeks the month touches.
    pub fn weeks(self) -> u32 {
        let offset = (self.first_day().weekday().num_days_from_sunday() + 1) % 7;
        (offset + self.days()).div_ceil(7)
    }

    pub fn weekday_of(self, day: u32) -> Option<Weekday> {
        NaiveDate::from_ymd_opt(self.year, self.month, day).map(|d| d.weekday())
    }
}

pub fn parse_month_key(s: &str) -> Result<YearMonth, String> {
    let t = s.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err("month must be YYYY-MM".to_string());
    };
    if y.len() != 4 || m.len() != 2 {
        return Err("month must be YYYY-MM".to_string());
    }
    let year = y
        .parse::<i32>()
        .map_err(|_| "month year must be numeric".to_string())?;
    let month = m
        .parse::<u32>()
        .map_err(|_| "month must be YYYY-MM".to_string())?;
    YearMonth::new(year, month).ok_or_else(|| "month must be between 01 and 12".to_string())
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date `{}`; expected YYYY-MM-DD", s.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Week,
    Day,
}

impl SlotKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Some(Self::Week),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Day => "day",
        }
    }

    pub fn slots_in(self, ym: YearMonth) -> u32 {
        match self {
            Self::Week => ym.weeks(),
            Self::Day => ym.days(),
        }
    }
}

pub fn is_school_day(d: NaiveDate) -> bool {
    !matches!(d.weekday(), Weekday::Fri | Weekday::Sat)
}

/// Inclusive on both ends; 0 when `from > to`.
pub fn school_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let mut n = 0;
    let mut d = from;
    while d <= to {
        if is_school_day(d) {
            n += 1;
        }
        match d.succ_opt() {
            Some(next) => d = next,
            None => break,
        }
    }
    n
}

/// Months `m` with `month(from) <= m <= month(to)`.
pub fn month_in_range(ym: YearMonth, from: NaiveDate, to: NaiveDate) -> bool {
    YearMonth::of(from) <= ym && ym <= YearMonth::of(to)
}

/// Months numbered `>= start_month` belong to `start_year`, the others to the
/// following calendar year.
pub fn school_year_months(start_year: i32, start_month: u32, months: &[u32]) -> Vec<YearMonth> {
    months
        .iter()
        .filter_map(|&m| {
            let year = if m >= start_month {
                start_year
            } else {
                start_year + 1
            };
            YearMonth::new(year, m)
        })
        .collect()
}

pub fn default_school_year_start(today: NaiveDate, start_month: u32) -> i32 {
    if today.month() >= start_month {
        today.year()
    } else {
        today.year() - 1
    }
}

pub fn arabic_month_name(month: u32) -> &'static str {
    match month {
        1 => "جانفي",
        2 => "فيفري",
        3 => "مارس",
        4 => "أفريل",
        5 => "ماي",
        6 => "جوان",
        7 => "جويلية",
        8 => "أوت",
        9 => "سبتمبر",
        10 => "أكتوبر",
        11 => "نوفمبر",
        12 => "ديسمبر",
        _ => "",
    }
}

/// Sunday..Thursday, in order.
pub const SCHOOL_WEEKDAYS: [Weekday; 5] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
];

pub fn arabic_weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "الأحد",
        Weekday::Mon => "الاثنين",
        Weekday::Tue => "الثلاثاء",
        Weekday::Wed => "الأربعاء",
        Weekday::Thu => "الخميس",
        Weekday::Fri => "الجمعة",
        Weekday::Sat => "السبت",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).expect("valid date")
    }

    #[test]
    fn month_key_requires_padded_year_and_month() {
        assert_eq!(
            parse_month_key("2024-02").expect("ok"),
            YearMonth { year: 2024, month: 2 }
        );
        assert!(parse_month_key("2024-2").is_err());
        assert!(parse_month_key("2024-13").is_err());
        assert!(parse_month_key("02").is_err());
        assert_eq!(YearMonth { year: 2024, month: 2 }.key(), "2024-02");
    }

    #[test]
    fn days_follow_leap_years() {
        assert_eq!(YearMonth { year: 2024, month: 2 }.days(), 29);
        assert_eq!(YearMonth { year: 1900, month: 2 }.days(), 28);
        assert_eq!(YearMonth { year: 2000, month: 2 }.days(), 29);
        assert_eq!(YearMonth { year: 2023, month: 4 }.days(), 30);
        assert_eq!(YearMonth { year: 2024, month: 12 }.days(), 31);
    }

    #[test]
    fn weeks_start_on_saturday() {
        // June 2024 starts on a Saturday: 30 days -> 5 weeks.
        assert_eq!(YearMonth { year: 2024, month: 6 }.weeks(), 5);
        // September 2024 starts on a Sunday: offset 1 + 30 days -> 5 weeks.
        assert_eq!(YearMonth { year: 2024, month: 9 }.weeks(), 5);
        // March 2024 starts on a Friday: offset 6 + 31 days -> 6 weeks.
        assert_eq!(YearMonth { year: 2024, month: 3 }.weeks(), 6);
        // February 2025 starts on a Saturday: 28 days -> 4 weeks.
        assert_eq!(YearMonth { year: 2025, month: 2 }.weeks(), 4);
    }

    #[test]
    fn school_days_skip_friday_and_saturday() {
        // 2024-09-01 is a Sunday; one full week has five school days.
        assert_eq!(school_days_between(date("2024-09-01"), date("2024-09-07")), 5);
        assert_eq!(school_days_between(date("2024-09-06"), date("2024-09-07")), 0);
        assert_eq!(school_days_between(date("2024-09-07"), date("2024-09-01")), 0);
    }

    #[test]
    fn month_range_is_inclusive_by_month() {
        let from = date("2024-10-20");
        let to = date("2024-12-02");
        assert!(month_in_range(YearMonth { year: 2024, month: 10 }, from, to));
        assert!(month_in_range(YearMonth { year: 2024, month: 12 }, from, to));
        assert!(!month_in_range(YearMonth { year: 2025, month: 1 }, from, to));
        assert!(!month_in_range(YearMonth { year: 2024, month: 9 }, from, to));
    }

    #[test]
    fn school_year_months_split_at_start_month() {
        let months = school_year_months(2024, 9, &[11, 12, 1, 6]);
        let keys: Vec<String> = months.into_iter().map(|m| m.key()).collect();
        assert_eq!(keys, vec!["2024-11", "2024-12", "2025-01", "2025-06"]);
        assert_eq!(default_school_year_start(date("2025-03-10"), 9), 2024);
        assert_eq!(default_school_year_start(date("2025-09-10"), 9), 2025);
    }
}
