//! Symbolic period resolution
//!
//! Turns period words in English or Russian ("last_week", "прошлый месяц",
//! "за последние 10 дней", "март", "summer") into concrete inclusive date
//! ranges relative to today.
//!
//! Rules:
//! - `this` periods run from the period start to today
//! - `last` periods are the previous complete calendar period
//! - a bare unit ("week", "за месяц") is a trailing window ending today
//! - month and season names resolve to the most recent instance that has
//!   started; the current one runs to today, a later-in-year one resolves to
//!   last year's

use chrono::{Datelike, Duration, NaiveDate};

/// Inclusive date interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping reversed bounds
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// `days` days ending at `today`
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        let days = days.max(1);
        Self {
            start: today - Duration::days(days - 1),
            end: today,
        }
    }

    /// Inclusive length in days
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Range of the same length immediately before this one
    pub fn preceding(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self {
            start: end - Duration::days(self.days() - 1),
            end,
        }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Calendar unit named in a period phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

/// Parse one date: `YYYY-MM-DD`, `DD.MM.YYYY`, `DD/MM/YYYY` or `DD.MM`
///
/// A `DD.MM` date takes the current year, or last year if that would be in
/// the future.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim().trim_matches(|c| c == '"' || c == '\'');
    for format in ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    let (day, month) = text.split_once('.')?;
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.trim_end_matches('.').parse().ok()?;
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date > today {
        NaiveDate::from_ymd_opt(today.year() - 1, month, day)
    } else {
        Some(date)
    }
}

/// Resolve a period value passed as a function argument
pub fn resolve_period(text: &str, today: NaiveDate) -> Option<DateRange> {
    resolve(text, today, false)
}

/// Find a period mentioned in free user text
///
/// Stricter than [`resolve_period`]: words that double as ordinary English
/// ("may", "fall") are not read as periods, and bare numbers are not years.
pub fn period_from_text(text: &str, today: NaiveDate) -> Option<DateRange> {
    resolve(text, today, true)
}

fn resolve(text: &str, today: NaiveDate, free_text: bool) -> Option<DateRange> {
    if let Some(range) = explicit_dates(text, today) {
        return Some(range);
    }

    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    let has = |pred: &dyn Fn(&str) -> bool| tokens.iter().any(|t| pred(t));

    if has(&|t| t == "today" || t == "сегодня") {
        return Some(DateRange::single(today));
    }
    if has(&|t| t == "позавчера") {
        return Some(DateRange::single(today - Duration::days(2)));
    }
    if has(&|t| t == "yesterday" || t == "вчера") {
        return Some(DateRange::single(today - Duration::days(1)));
    }

    let unit = tokens.iter().find_map(|t| unit_of(t));
    let year = explicit_year(&tokens, today);

    if let Some(month) = tokens.iter().find_map(|t| month_of(t, free_text)) {
        return month_range(month, year, today);
    }

    if let Some(season) = tokens.iter().find_map(|t| season_of(t, free_text)) {
        return season_range(season, year, today);
    }

    // "2024 год" names a calendar year, not a count of years
    if let (Some(year), Some(Unit::Year)) = (year, unit) {
        return year_range(year, today);
    }

    let number = tokens
        .iter()
        .filter(|t| !is_year_like(t))
        .filter_map(|t| t.parse::<i64>().ok())
        .find(|n| (1..=3650).contains(n));

    if let (Some(n), Some(unit)) = (number, unit) {
        let days = match unit {
            Unit::Day => n,
            Unit::Week => n * 7,
            Unit::Month => n * 30,
            Unit::Quarter => n * 91,
            Unit::Year => n * 365,
        };
        return Some(DateRange::trailing(today, days));
    }

    if let Some(unit) = unit {
        if has(&is_last) {
            return previous_unit(unit, today);
        }
        if has(&is_this) {
            return current_unit(unit, today);
        }
        return Some(DateRange::trailing(
            today,
            match unit {
                Unit::Day => 1,
                Unit::Week => 7,
                Unit::Month => 30,
                Unit::Quarter => 91,
                Unit::Year => 365,
            },
        ));
    }

    if !free_text {
        if let Some(year) = year {
            return year_range(year, today);
        }
    }

    None
}

/// Two dates in the text form a range, one date a single day
fn explicit_dates(text: &str, today: NaiveDate) -> Option<DateRange> {
    let dates: Vec<NaiveDate> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .flat_map(|part| part.split(".."))
        .filter(|part| part.len() >= 5)
        .filter_map(|part| parse_date(part, today))
        .collect();

    match dates.as_slice() {
        [] => None,
        [only] => Some(DateRange::single(*only)),
        [first, .., last] => Some(DateRange::new(*first, *last)),
    }
}

fn explicit_year(tokens: &[&str], today: NaiveDate) -> Option<i32> {
    tokens
        .iter()
        .filter(|t| t.len() == 4)
        .filter_map(|t| t.parse::<i32>().ok())
        .find(|y| (2000..=today.year()).contains(y))
}

fn is_year_like(token: &str) -> bool {
    token.len() == 4 && token.parse::<i32>().is_ok_and(|y| (1900..=2100).contains(&y))
}

fn year_range(year: i32, today: NaiveDate) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31)?.min(today);
    Some(DateRange::new(start, end))
}

fn is_last(token: &str) -> bool {
    matches!(token, "last" | "previous" | "prev" | "past")
        || token.starts_with("прошл")
        || token.starts_with("предыдущ")
        || token.starts_with("минувш")
}

fn is_this(token: &str) -> bool {
    matches!(
        token,
        "this" | "current" | "этот" | "эта" | "эту" | "этом" | "этой" | "это" | "сей"
    ) || token.starts_with("текущ")
        || token.starts_with("нынешн")
}

fn unit_of(token: &str) -> Option<Unit> {
    match token {
        "day" | "days" | "день" | "дня" | "дней" | "сутки" | "суток" => Some(Unit::Day),
        "week" | "weeks" => Some(Unit::Week),
        "month" | "months" => Some(Unit::Month),
        "quarter" | "quarters" => Some(Unit::Quarter),
        "year" | "years" | "год" | "года" | "году" | "годом" | "лет" => Some(Unit::Year),
        t if t.starts_with("недел") => Some(Unit::Week),
        t if t.starts_with("месяц") => Some(Unit::Month),
        t if t.starts_with("квартал") => Some(Unit::Quarter),
        _ => None,
    }
}

fn month_of(token: &str, free_text: bool) -> Option<u32> {
    const EN: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    const RU: [&str; 12] = [
        "январ", "феврал", "март", "апрел", "ма", "июн", "июл", "август", "сентябр", "октябр",
        "ноябр", "декабр",
    ];

    if free_text && token == "may" {
        return None;
    }
    if let Some(i) = EN.iter().position(|m| *m == token) {
        return Some(i as u32 + 1);
    }
    if token.len() >= 3 && token.is_ascii() {
        let abbreviation = if token == "sept" { "sep" } else { token };
        if abbreviation.len() == 3 {
            if let Some(i) = EN.iter().position(|m| m.starts_with(abbreviation)) {
                return Some(i as u32 + 1);
            }
        }
        return None;
    }
    if matches!(token, "май" | "мая" | "мае") {
        return Some(5);
    }
    RU.iter()
        .position(|stem| *stem != "ма" && token.starts_with(stem))
        .map(|i| i as u32 + 1)
}

fn season_of(token: &str, free_text: bool) -> Option<Season> {
    match token {
        "winter" => Some(Season::Winter),
        "spring" => Some(Season::Spring),
        "summer" | "лето" | "летом" | "лета" => Some(Season::Summer),
        "autumn" => Some(Season::Autumn),
        "fall" if !free_text => Some(Season::Autumn),
        t if t.starts_with("зим") => Some(Season::Winter),
        t if t.starts_with("весн") => Some(Season::Spring),
        t if t.starts_with("летн") => Some(Season::Summer),
        t if t.starts_with("осен") => Some(Season::Autumn),
        _ => None,
    }
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(first_of_month(next_year, next_month)? - Duration::days(1))
}

/// Clip a period to today, or `None` if it has not started
fn started(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Option<DateRange> {
    (start <= today).then(|| DateRange::new(start, end.min(today)))
}

fn month_range(month: u32, year: Option<i32>, today: NaiveDate) -> Option<DateRange> {
    let candidates = match year {
        Some(y) => vec![y],
        None => vec![today.year(), today.year() - 1],
    };
    candidates.into_iter().find_map(|y| {
        started(first_of_month(y, month)?, last_of_month(y, month)?, today)
    })
}

/// Season instance named by the year it ends in (winter spans Dec..Feb)
fn season_bounds(season: Season, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some(match season {
        Season::Winter => (first_of_month(year - 1, 12)?, last_of_month(year, 2)?),
        Season::Spring => (first_of_month(year, 3)?, last_of_month(year, 5)?),
        Season::Summer => (first_of_month(year, 6)?, last_of_month(year, 8)?),
        Season::Autumn => (first_of_month(year, 9)?, last_of_month(year, 11)?),
    })
}

fn season_range(season: Season, year: Option<i32>, today: NaiveDate) -> Option<DateRange> {
    let candidates = match year {
        Some(y) => vec![y],
        None => vec![today.year() + 1, today.year(), today.year() - 1],
    };
    candidates.into_iter().find_map(|y| {
        let (start, end) = season_bounds(season, y)?;
        started(start, end, today)
    })
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn quarter_start(day: NaiveDate) -> Option<NaiveDate> {
    first_of_month(day.year(), (day.month0() / 3) * 3 + 1)
}

fn current_unit(unit: Unit, today: NaiveDate) -> Option<DateRange> {
    let start = match unit {
        Unit::Day => today,
        Unit::Week => week_start(today),
        Unit::Month => first_of_month(today.year(), today.month())?,
        Unit::Quarter => quarter_start(today)?,
        Unit::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
    };
    Some(DateRange::new(start, today))
}

fn previous_unit(unit: Unit, today: NaiveDate) -> Option<DateRange> {
    match unit {
        Unit::Day => Some(DateRange::single(today - Duration::days(1))),
        Unit::Week => {
            let end = week_start(today) - Duration::days(1);
            Some(DateRange::new(end - Duration::days(6), end))
        }
        Unit::Month => {
            let end = first_of_month(today.year(), today.month())? - Duration::days(1);
            Some(DateRange::new(first_of_month(end.year(), end.month())?, end))
        }
        Unit::Quarter => {
            let end = quarter_start(today)? - Duration::days(1);
            Some(DateRange::new(quarter_start(end)?, end))
        }
        Unit::Year => {
            let year = today.year() - 1;
            Some(DateRange::new(
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ))
        }
    }
}
