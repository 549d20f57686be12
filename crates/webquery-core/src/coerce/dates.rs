use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use derive_more::Display;
use std::fmt;

///
/// Date-expression grammar
///
/// Three literal forms are accepted wherever a datetime is expected:
/// an absolute ISO-8601 instant, a bare anchor (`now`, `today`, ...),
/// and anchor arithmetic (`now-PT62M`, `today+P1D`). Expressions stay
/// symbolic until [`DateExpr::resolve`] is called with the evaluation
/// instant, so `now` reflects query execution time rather than parse
/// time.
///
/// Zero-length offsets canonicalize to the bare anchor: `now+PT0S`
/// parses, renders, and resolves identically to `now`.
///

///
/// DateAnchor
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum DateAnchor {
    /// The evaluation instant.
    #[display("now")]
    Now,

    /// Start of the current day.
    #[display("today")]
    Today,

    /// Start of the next day.
    #[display("tomorrow")]
    Tomorrow,

    /// Start of the previous day.
    #[display("yesterday")]
    Yesterday,

    /// Start of the week (Monday).
    #[display("sow")]
    Sow,

    /// Start of the month.
    #[display("som")]
    Som,

    /// Start of the year.
    #[display("soy")]
    Soy,
}

const ANCHORS: &[DateAnchor] = &[
    DateAnchor::Now,
    DateAnchor::Today,
    DateAnchor::Tomorrow,
    DateAnchor::Yesterday,
    DateAnchor::Sow,
    DateAnchor::Som,
    DateAnchor::Soy,
];

impl DateAnchor {
    fn name(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::Yesterday => "yesterday",
            Self::Sow => "sow",
            Self::Som => "som",
            Self::Soy => "soy",
        }
    }

    /// Resolve the anchor against the evaluation instant (UTC).
    #[must_use]
    pub fn resolve(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let start_of_day = |date: NaiveDate| date.and_hms_opt(0, 0, 0).expect("midnight").and_utc();
        let date = at.date_naive();

        match self {
            Self::Now => at,
            Self::Today => start_of_day(date),
            Self::Tomorrow => start_of_day(date + Days::new(1)),
            Self::Yesterday => start_of_day(date - Days::new(1)),
            Self::Sow => {
                let back = u64::from(date.weekday().num_days_from_monday());
                start_of_day(date - Days::new(back))
            }
            Self::Som => start_of_day(date.with_day(1).expect("first of month")),
            Self::Soy => start_of_day(
                NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("first of year"),
            ),
        }
    }
}

///
/// Period
///
/// ISO-8601 period (`P1Y2M3DT4H5M6S`, week form `P2W`). Components are
/// kept exactly as written so rendering round-trips (`PT62M` stays 62
/// minutes, never 1 hour 2 minutes).
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Period {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Period {
    pub const ZERO: Self = Self {
        years: 0,
        months: 0,
        weeks: 0,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self { days, ..Self::ZERO }
    }

    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::ZERO
        }
    }

    #[must_use]
    pub const fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::ZERO
        }
    }

    #[must_use]
    pub const fn seconds(seconds: u32) -> Self {
        Self {
            seconds,
            ..Self::ZERO
        }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.years == 0
            && self.months == 0
            && self.weeks == 0
            && self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
    }

    /// Parse the body of an ISO-8601 period (with its leading `P`).
    pub fn parse(text: &str) -> Result<Self, String> {
        let body = text
            .strip_prefix(['P', 'p'])
            .ok_or_else(|| format!("period must start with 'P': '{text}'"))?;

        if body.is_empty() {
            return Err(format!("empty period: '{text}'"));
        }

        let mut period = Self::ZERO;
        let mut in_time = false;
        let mut digits = String::new();
        let mut saw_component = false;

        for c in body.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if (c == 'T' || c == 't') && !in_time {
                if !digits.is_empty() {
                    return Err(format!("misplaced 'T' in period: '{text}'"));
                }
                in_time = true;
            } else {
                let value: u32 = digits
                    .parse()
                    .map_err(|_| format!("missing number before '{c}' in period: '{text}'"))?;
                digits.clear();
                saw_component = true;

                let slot = match (c.to_ascii_uppercase(), in_time) {
                    ('Y', false) => &mut period.years,
                    ('M', false) => &mut period.months,
                    ('W', false) => &mut period.weeks,
                    ('D', false) => &mut period.days,
                    ('H', true) => &mut period.hours,
                    ('M', true) => &mut period.minutes,
                    ('S', true) => &mut period.seconds,
                    _ => return Err(format!("unexpected '{c}' in period: '{text}'")),
                };
                *slot = value;
            }
        }

        if !digits.is_empty() {
            return Err(format!("dangling number in period: '{text}'"));
        }
        if !saw_component {
            return Err(format!("empty period: '{text}'"));
        }

        Ok(period)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "PT0S");
        }

        write!(f, "P")?;
        for (value, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value > 0 {
                write!(f, "{value}{unit}")?;
            }
        }

        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            write!(f, "T")?;
            for (value, unit) in [
                (self.hours, 'H'),
                (self.minutes, 'M'),
                (self.seconds, 'S'),
            ] {
                if value > 0 {
                    write!(f, "{value}{unit}")?;
                }
            }
        }

        Ok(())
    }
}

///
/// DateExpr
///

#[derive(Clone, Debug, PartialEq)]
pub enum DateExpr {
    Absolute(DateTime<Utc>),
    Relative {
        anchor: DateAnchor,
        negative: bool,
        period: Period,
    },
}

impl DateExpr {
    /// Parse a datetime literal: anchor expression or absolute instant.
    pub fn parse(text: &str) -> Result<Self, String> {
        for anchor in ANCHORS {
            let name = anchor.name();
            let matches_anchor = text
                .get(..name.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(name));
            if matches_anchor {
                let rest = &text[name.len()..];

                if rest.is_empty() {
                    return Ok(Self::Relative {
                        anchor: *anchor,
                        negative: false,
                        period: Period::ZERO,
                    });
                }

                let mut chars = rest.chars();
                let sign = chars.next().expect("non-empty rest");
                let negative = match sign {
                    '+' | ' ' => false,
                    '-' => true,
                    _ => {
                        return Err(format!(
                            "expected '+' or '-' after '{name}' in date expression '{text}'"
                        ));
                    }
                };

                return Ok(Self::Relative {
                    anchor: *anchor,
                    negative,
                    period: Period::parse(chars.as_str())?,
                });
            }
        }

        parse_absolute(text).map(Self::Absolute)
    }

    /// Resolve to a concrete instant. `at` is the evaluation instant and
    /// is only consulted by relative expressions.
    pub fn resolve(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Absolute(instant) => Ok(*instant),
            Self::Relative {
                anchor,
                negative,
                period,
            } => {
                let base = anchor.resolve(at);
                apply_period(base, period, *negative)
                    .ok_or_else(|| format!("date arithmetic out of range: '{self}'"))
            }
        }
    }
}

impl fmt::Display for DateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(instant) => write!(f, "{}", instant.to_rfc3339()),
            Self::Relative {
                anchor,
                negative,
                period,
            } => {
                if period.is_zero() {
                    write!(f, "{anchor}")
                } else {
                    let sign = if *negative { '-' } else { '+' };
                    write!(f, "{anchor}{sign}{period}")
                }
            }
        }
    }
}

fn apply_period(
    base: DateTime<Utc>,
    period: &Period,
    negative: bool,
) -> Option<DateTime<Utc>> {
    let months = Months::new(period.years.checked_mul(12)?.checked_add(period.months)?);
    let days = Days::new(u64::from(period.weeks) * 7 + u64::from(period.days));
    let time = Duration::hours(i64::from(period.hours))
        + Duration::minutes(i64::from(period.minutes))
        + Duration::seconds(i64::from(period.seconds));

    if negative {
        base.checked_sub_months(months)?
            .checked_sub_days(days)?
            .checked_sub_signed(time)
    } else {
        base.checked_add_months(months)?
            .checked_add_days(days)?
            .checked_add_signed(time)
    }
}

fn parse_absolute(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }

    // Offset-free datetime, interpreted as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }

    // Bare date, start of day UTC.
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight").and_utc());
    }

    Err(format!("not an ISO-8601 instant or date expression: '{text}'"))
}

/// Encode `now + period`, canonicalizing zero periods to the bare anchor.
#[must_use]
pub fn now_plus(period: &Period) -> String {
    encode(DateAnchor::Now, false, period)
}

/// Encode `now - period`, canonicalizing zero periods to the bare anchor.
#[must_use]
pub fn now_minus(period: &Period) -> String {
    encode(DateAnchor::Now, true, period)
}

/// Encode `today + period`, canonicalizing zero periods to the bare anchor.
#[must_use]
pub fn today_plus(period: &Period) -> String {
    encode(DateAnchor::Today, false, period)
}

/// Encode `today - period`, canonicalizing zero periods to the bare anchor.
#[must_use]
pub fn today_minus(period: &Period) -> String {
    encode(DateAnchor::Today, true, period)
}

fn encode(anchor: DateAnchor, negative: bool, period: &Period) -> String {
    DateExpr::Relative {
        anchor,
        negative,
        period: *period,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        // A Thursday, mid-afternoon.
        Utc.with_ymd_and_hms(2024, 5, 16, 15, 30, 45).unwrap()
    }

    #[test]
    fn zero_periods_encode_as_bare_anchor() {
        assert_eq!(now_plus(&Period::ZERO), "now");
        assert_eq!(now_minus(&Period::ZERO), "now");
        assert_eq!(today_plus(&Period::ZERO), "today");
    }

    #[test]
    fn nonzero_periods_encode_with_sign() {
        assert_eq!(now_minus(&Period::minutes(62)), "now-PT62M");
        assert_eq!(now_plus(&Period::days(2)), "now+P2D");
        assert_eq!(today_minus(&Period::hours(6)), "today-PT6H");
    }

    #[test]
    fn zero_offset_parses_to_bare_anchor() {
        assert_eq!(
            DateExpr::parse("now+PT0S").unwrap().to_string(),
            "now"
        );
        assert_eq!(
            DateExpr::parse("now+PT0S").unwrap().resolve(at()).unwrap(),
            at()
        );
    }

    #[test]
    fn anchors_resolve_against_the_evaluation_instant() {
        use chrono::Timelike;

        let expect_day = |expr: &str, day: u32, hour: u32| {
            let resolved = DateExpr::parse(expr).unwrap().resolve(at()).unwrap();
            assert_eq!(resolved.day(), day, "{expr}");
            assert_eq!(resolved.hour(), hour, "{expr}");
        };

        assert_eq!(DateExpr::parse("now").unwrap().resolve(at()).unwrap(), at());
        expect_day("today", 16, 0);
        expect_day("tomorrow", 17, 0);
        expect_day("yesterday", 15, 0);
        // Monday of that week was the 13th.
        expect_day("sow", 13, 0);
        expect_day("som", 1, 0);

        let soy = DateExpr::parse("soy").unwrap().resolve(at()).unwrap();
        assert_eq!((soy.year(), soy.month(), soy.day()), (2024, 1, 1));
    }

    #[test]
    fn relative_arithmetic_applies_at_resolution_time() {
        let resolved = DateExpr::parse("now-PT62M").unwrap().resolve(at()).unwrap();
        assert_eq!(at() - resolved, Duration::minutes(62));

        let resolved = DateExpr::parse("today+P1DT2H").unwrap().resolve(at()).unwrap();
        assert_eq!(
            resolved,
            Utc.with_ymd_and_hms(2024, 5, 17, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn month_arithmetic_uses_calendar_months() {
        let resolved = DateExpr::parse("som-P2M").unwrap().resolve(at()).unwrap();
        assert_eq!(
            resolved,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn absolute_forms_parse() {
        assert_eq!(
            DateExpr::parse("2024-01-02T03:04:05Z")
                .unwrap()
                .resolve(at())
                .unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            DateExpr::parse("2024-01-02").unwrap().resolve(at()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn period_parse_round_trips() {
        for text in ["P1Y2M3DT4H5M6S", "P2W", "PT62M", "P10D"] {
            assert_eq!(Period::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn malformed_periods_are_rejected() {
        for text in ["", "P", "PT", "1D", "P1X", "PT1D", "P1", "now"] {
            assert!(Period::parse(text).is_err(), "{text}");
        }
    }

    #[test]
    fn malformed_date_expressions_are_rejected() {
        assert!(DateExpr::parse("nowhere").is_err());
        assert!(DateExpr::parse("now*P1D").is_err());
        assert!(DateExpr::parse("not-a-date").is_err());
    }
}
