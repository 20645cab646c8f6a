//! Deterministic due-date resolution.
//!
//! Turns a natural-language date/time phrase (already pulled out of free text
//! by an external extractor) into an absolute UTC instant. Phrases are read as
//! wall-clock time in a fixed local UTC offset. The caller always supplies the
//! reference instant, so resolution never reads the system clock or the
//! process timezone.
//!
//! # Design Principle
//!
//! If a phrase cannot be mapped to exactly one instant, resolution fails with
//! [`TaskError::UnresolvedDate`]. It never falls back to "now" and never guesses
//! between am and pm.
//!
//! # Supported Phrases
//!
//! - **Explicit date**: `"15/6/2025"`, `"15-06-2025"`, `"2025-06-15"`
//! - **Explicit time**: `"4am"`, `"4 am"`, `"9:30pm"`, `"14:00"`
//! - **Day anchors**: `"today"`, `"tomorrow"`, `"tonight"`
//! - **Named times**: `"morning"` (09:00), `"noon"` (12:00), `"afternoon"` (14:00),
//!   `"evening"` (18:00), `"night"` (21:00), `"midnight"` (00:00)
//! - **Boundaries** (23:59): `"eod"`, `"end of day"`, `"eow"`, `"end of week"`,
//!   `"eom"`, `"end of month"`, `"eoy"`, `"end of year"`, `"end of next month"`
//! - **Weekdays**: `"friday"`, `"this friday"`, `"next friday"`
//! - **Combined**: `"tomorrow 2pm"`, `"today night 9:30pm"`, `"15/6/2025 4am"`
//! - **Passthrough**: any RFC 3339 instant
//!
//! When no time of day is given, [`ResolveOptions::default_time`] (23:59) applies.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Indian Standard Time, UTC+5:30.
pub const DEFAULT_OFFSET_MINUTES: i32 = 330;

const END_OF_DAY: (u32, u32) = (23, 59);
const FILLER_WORDS: &[&str] = &["at", "by", "on", "due", "before", "the"];

// ── Configurable week start ─────────────────────────────────────────────────

/// Which day begins a week for "end of week" computations.
///
/// Does **not** affect named-weekday phrases like "next Monday".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStartDay {
    /// ISO 8601 standard: weeks run Monday through Sunday.
    #[default]
    Monday,
    /// US/Canada convention: weeks run Sunday through Saturday.
    Sunday,
}

/// How many days `weekday` is from the week-start day.
fn days_from_week_start(weekday: Weekday, week_start: WeekStartDay) -> i64 {
    match week_start {
        WeekStartDay::Monday => weekday.num_days_from_monday() as i64,
        WeekStartDay::Sunday => weekday.num_days_from_sunday() as i64,
    }
}

/// Options for [`resolve_due_date_with_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Fixed local offset from UTC, in minutes (e.g. `330` for UTC+5:30).
    pub offset_minutes: i32,
    /// Which day starts the week for period boundaries.
    pub week_start: WeekStartDay,
    /// Time of day used when the phrase names none.
    pub default_time: NaiveTime,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            offset_minutes: DEFAULT_OFFSET_MINUTES,
            week_start: WeekStartDay::default(),
            default_time: hm(END_OF_DAY),
        }
    }
}

impl ResolveOptions {
    pub fn with_offset_minutes(offset_minutes: i32) -> Self {
        Self {
            offset_minutes,
            ..Self::default()
        }
    }

    /// The configured offset as a chrono [`FixedOffset`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] if the offset is a day or more away from UTC.
    pub fn offset(&self) -> Result<FixedOffset, TaskError> {
        self.offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                TaskError::Validation(format!(
                    "UTC offset out of range: {} minutes",
                    self.offset_minutes
                ))
            })
    }
}

// ── resolve_due_date ────────────────────────────────────────────────────────

/// The result of resolving a due-date phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDueDate {
    /// The resolved instant in UTC.
    #[serde(with = "crate::task::timestamp")]
    pub utc: DateTime<Utc>,
    /// The same instant at the configured local offset.
    pub local: DateTime<FixedOffset>,
    /// Human-readable interpretation (e.g., "Sunday, June 15, 2025 at 4:00 AM +05:30").
    pub interpretation: String,
}

/// Resolve a due-date phrase to a UTC instant at the given local offset.
///
/// Uses a Monday week start and a 23:59 default time. For other settings,
/// use [`resolve_due_date_with_options`].
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use task_engine::resolver::resolve_due_date;
///
/// let reference = Utc.with_ymd_and_hms(2025, 6, 14, 6, 0, 0).unwrap();
/// let due = resolve_due_date(reference, "15/6/2025 4am", 330).unwrap();
/// assert_eq!(due, Utc.with_ymd_and_hms(2025, 6, 14, 22, 30, 0).unwrap());
/// ```
pub fn resolve_due_date(
    reference: DateTime<Utc>,
    phrase: &str,
    offset_minutes: i32,
) -> Result<DateTime<Utc>, TaskError> {
    let options = ResolveOptions::with_offset_minutes(offset_minutes);
    resolve_due_date_with_options(reference, phrase, &options).map(|r| r.utc)
}

/// Resolve a due-date phrase to an absolute instant with options.
///
/// # Errors
///
/// Returns [`TaskError::UnresolvedDate`] (carrying the original phrase) if the
/// phrase is empty, contains an unknown word, names a nonexistent calendar
/// date, or gives two conflicting dates or times. Returns
/// [`TaskError::Validation`] if the configured offset is out of range.
pub fn resolve_due_date_with_options(
    reference: DateTime<Utc>,
    phrase: &str,
    options: &ResolveOptions,
) -> Result<ResolvedDueDate, TaskError> {
    let offset = options.offset()?;
    let unresolved = || TaskError::unresolved(phrase.trim());

    let resolved_local = match try_passthrough_rfc3339(phrase) {
        Some(dt) => dt.with_timezone(&offset),
        None => {
            let tokens = tokenize(phrase);
            if tokens.is_empty() {
                return Err(unresolved());
            }

            let today = reference.with_timezone(&offset).date_naive();
            let parts =
                collect_components(&tokens, today, options.week_start).ok_or_else(unresolved)?;

            let date = parts.date.unwrap_or(today);
            let time = parts
                .explicit_time
                .or(parts.named_time)
                .unwrap_or(options.default_time);

            offset
                .from_local_datetime(&date.and_time(time))
                .single()
                .ok_or_else(unresolved)?
        }
    };

    Ok(ResolvedDueDate {
        utc: resolved_local.with_timezone(&Utc),
        local: resolved_local,
        interpretation: format_interpretation(&resolved_local),
    })
}

// ── Phrase components ───────────────────────────────────────────────────────

/// One recognized piece of a phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    /// A calendar date with no implied time.
    Day(NaiveDate),
    /// Today's date, implying night time.
    Tonight(NaiveDate),
    /// The last day of a period, implying 23:59.
    Boundary(NaiveDate),
    /// 23:59 on whatever date the rest of the phrase names.
    EndOfDay,
    /// A named time of day ("morning").
    Named(NaiveTime),
    /// An explicit clock time ("9:30pm").
    At(NaiveTime),
}

/// The slots a phrase fills. Each slot may be filled once.
#[derive(Debug, Default)]
struct Components {
    date: Option<NaiveDate>,
    named_time: Option<NaiveTime>,
    explicit_time: Option<NaiveTime>,
}

impl Components {
    fn apply(&mut self, component: Component) -> Option<()> {
        match component {
            Component::Day(date) => fill(&mut self.date, date),
            Component::Tonight(date) => {
                fill(&mut self.date, date)?;
                fill(&mut self.named_time, hm((21, 0)))
            }
            Component::Boundary(date) => {
                fill(&mut self.date, date)?;
                fill(&mut self.named_time, hm(END_OF_DAY))
            }
            Component::EndOfDay => fill(&mut self.named_time, hm(END_OF_DAY)),
            Component::Named(time) => fill(&mut self.named_time, time),
            Component::At(time) => fill(&mut self.explicit_time, time),
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: T) -> Option<()> {
    if slot.is_some() {
        return None;
    }
    *slot = Some(value);
    Some(())
}

/// Walk the tokens left to right, matching the longest component at each position.
fn collect_components(
    tokens: &[String],
    today: NaiveDate,
    week_start: WeekStartDay,
) -> Option<Components> {
    let mut parts = Components::default();
    let mut rest = tokens;
    while !rest.is_empty() {
        let (component, consumed) = match_component(rest, today, week_start)?;
        parts.apply(component)?;
        rest = &rest[consumed..];
    }
    Some(parts)
}

fn match_component(
    tokens: &[String],
    today: NaiveDate,
    week_start: WeekStartDay,
) -> Option<(Component, usize)> {
    let word = |i: usize| tokens.get(i).map(String::as_str);
    let first = word(0)?;

    // "end of <period>" / "end of next <period>"
    if first == "end" && word(1) == Some("of") {
        return match word(2)? {
            "next" => period_end(word(3)?, today, week_start, 1).map(|c| (c, 4)),
            period => period_end(period, today, week_start, 0).map(|c| (c, 3)),
        };
    }

    // "next <weekday>" / "this <weekday>"
    if let Some(weekday) = word(1).and_then(parse_weekday) {
        match first {
            "next" => return Some((Component::Day(next_weekday(today, weekday)?), 2)),
            "this" => return Some((Component::Day(upcoming_weekday(today, weekday)?), 2)),
            _ => {}
        }
    }

    let component = match first {
        "today" => Component::Day(today),
        "tomorrow" => Component::Day(today.succ_opt()?),
        "tonight" => Component::Tonight(today),
        "eod" => Component::EndOfDay,
        "eow" => period_end("week", today, week_start, 0)?,
        "eom" => period_end("month", today, week_start, 0)?,
        "eoy" => period_end("year", today, week_start, 0)?,
        other => {
            if let Some(time) = named_time(other) {
                Component::Named(time)
            } else if let Some(weekday) = parse_weekday(other) {
                Component::Day(upcoming_weekday(today, weekday)?)
            } else if let Some(time) = parse_time_token(other) {
                Component::At(time)
            } else {
                Component::Day(parse_date_token(other)?)
            }
        }
    };
    Some((component, 1))
}

/// The last day of the current (`shift = 0`) or following (`shift = 1`) period.
fn period_end(
    period: &str,
    today: NaiveDate,
    week_start: WeekStartDay,
    shift: i32,
) -> Option<Component> {
    let date = match period {
        "day" if shift == 0 => return Some(Component::EndOfDay),
        "week" => {
            let days_until_end = 6 - days_from_week_start(today.weekday(), week_start);
            today.checked_add_signed(Duration::days(days_until_end + 7 * shift as i64))?
        }
        "month" => {
            let (y, m) = add_months(today.year(), today.month(), shift);
            last_day_of_month(y, m)?
        }
        "year" => NaiveDate::from_ymd_opt(today.year() + shift, 12, 31)?,
        _ => return None,
    };
    Some(Component::Boundary(date))
}

/// Year and month `shift` months after (`year`, `month`).
fn add_months(year: i32, month: u32, shift: i32) -> (i32, u32) {
    let zero_based = year * 12 + (month as i32 - 1) + shift;
    (zero_based.div_euclid(12), zero_based.rem_euclid(12) as u32 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = add_months(year, month, 1);
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

/// The next `weekday` on or after `today`.
fn upcoming_weekday(today: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let days_ahead = (weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64
        + 7)
        % 7;
    today.checked_add_signed(Duration::days(days_ahead))
}

/// The next `weekday` strictly after `today`; a week out if today is that weekday.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let upcoming = upcoming_weekday(today, weekday)?;
    if upcoming == today {
        today.checked_add_signed(Duration::days(7))
    } else {
        Some(upcoming)
    }
}

// ── Tokenizing and parsing helpers ──────────────────────────────────────────

/// Lowercase, split on whitespace and commas, drop filler words, and glue a
/// detached meridiem onto its number ("4 am" → "4am").
fn tokenize(phrase: &str) -> Vec<String> {
    let lowered = phrase
        .to_lowercase()
        .replace("a.m.", "am")
        .replace("p.m.", "pm")
        .replace(',', " ");

    let mut tokens: Vec<String> = Vec::new();
    for word in lowered.split_whitespace() {
        if FILLER_WORDS.contains(&word) {
            continue;
        }
        if matches!(word, "am" | "pm") {
            if let Some(prev) = tokens.last_mut() {
                if prev.ends_with(|c: char| c.is_ascii_digit()) {
                    prev.push_str(word);
                    continue;
                }
            }
        }
        tokens.push(word.to_string());
    }
    tokens
}

/// Try to parse as an RFC 3339 instant.
fn try_passthrough_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse a weekday name (full and abbreviated).
fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Map a named time of day to a clock time.
fn named_time(s: &str) -> Option<NaiveTime> {
    let hm_pair = match s {
        "morning" => (9, 0),
        "noon" | "midday" => (12, 0),
        "afternoon" => (14, 0),
        "evening" => (18, 0),
        "night" => (21, 0),
        "midnight" => (0, 0),
        _ => return None,
    };
    Some(hm(hm_pair))
}

/// Parse a clock time: "4am", "9:30pm", "12am", "14:00", "14:30:15".
///
/// A bare number ("9") is rejected because am/pm would be a guess.
fn parse_time_token(s: &str) -> Option<NaiveTime> {
    if let Some(rest) = s.strip_suffix("am") {
        return parse_twelve_hour(rest, false);
    }
    if let Some(rest) = s.strip_suffix("pm") {
        return parse_twelve_hour(rest, true);
    }

    match s.split(':').collect::<Vec<_>>().as_slice() {
        [h, m] => NaiveTime::from_hms_opt(clock_field(h, 1)?, clock_field(m, 2)?, 0),
        [h, m, sec] => NaiveTime::from_hms_opt(
            clock_field(h, 1)?,
            clock_field(m, 2)?,
            clock_field(sec, 2)?,
        ),
        _ => None,
    }
}

fn parse_twelve_hour(s: &str, is_pm: bool) -> Option<NaiveTime> {
    let (hour, minute) = match s.split_once(':') {
        Some((h, m)) => (clock_field(h, 1)?, clock_field(m, 2)?),
        None => (clock_field(s, 1)?, 0),
    };
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour24 = match (hour, is_pm) {
        (12, true) => 12,
        (12, false) => 0,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// A one- or two-digit clock field with at least `min_len` digits.
fn clock_field(s: &str, min_len: usize) -> Option<u32> {
    if s.len() < min_len || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse a calendar date: day-first `DD/MM/YYYY` (with `/`, `-` or `.`) or ISO `YYYY-MM-DD`.
fn parse_date_token(s: &str) -> Option<NaiveDate> {
    let sep = ['/', '-', '.'].into_iter().find(|c| s.contains(*c))?;
    let parts: Vec<&str> = s.split(sep).collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|byte| byte.is_ascii_digit()))
    {
        return None;
    }

    if a.len() == 4 && b.len() <= 2 && c.len() <= 2 {
        NaiveDate::from_ymd_opt(a.parse().ok()?, b.parse().ok()?, c.parse().ok()?)
    } else if c.len() == 4 && a.len() <= 2 && b.len() <= 2 {
        NaiveDate::from_ymd_opt(c.parse().ok()?, b.parse().ok()?, a.parse().ok()?)
    } else {
        None
    }
}

fn hm((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// Format a human-readable interpretation string.
fn format_interpretation(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%A, %B %-d, %Y at %-I:%M %p %:z").to_string()
}

// ── Tests ───────────────────────────────────────────────────────────────────
