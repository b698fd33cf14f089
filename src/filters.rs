//! Retrieval filters and inline filter parsing.
//!
//! A [`FilterSet`] narrows a semantic search to a file name, one or more
//! collections, a description substring, and a date range. The user id is
//! not part of the filter set; it travels separately and is mandatory.
//!
//! [`parse_filters`] pulls inline directives out of a chat message:
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `file:<name>` / `file:"two words"` | file-name substring |
//! | `collection:a,b` | collection names |
//! | `desc:"text"` | description substring |
//! | `from 2024-01-01 to 2024-02-01`, `between … and …` | explicit range |
//! | `since 2024-01-01`, `before 2024-01-01` | open range |
//! | `around March 2024`, `around 2024` | fuzzy date, ± window months |
//! | `in March 2024` | that calendar month |

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Inclusive date range sent to the search backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Concrete window for a fuzzy "around <month> <year>" date:
    /// first day of `month - window` through last day of `month + window`.
    pub fn around_month(year: i32, month: u32, window_months: u32) -> Option<Self> {
        let anchor = NaiveDate::from_ymd_opt(year, month, 1)?;
        let start = shift_months(anchor, -i64::from(window_months))?;
        let end = last_day_of_month(shift_months(anchor, i64::from(window_months))?)?;
        Some(Self::between(start, end))
    }

    /// Concrete window for "around <year>": the whole year widened by the window.
    pub fn around_year(year: i32, window_months: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let last = NaiveDate::from_ymd_opt(year, 12, 1)?;
        let start = shift_months(first, -i64::from(window_months))?;
        let end = last_day_of_month(shift_months(last, i64::from(window_months))?)?;
        Some(Self::between(start, end))
    }

    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self::between(first, last_day_of_month(first)?))
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Optional constraints narrowing retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub file_name: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub date_range: DateRange,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none()
            && self.collections.is_empty()
            && self.description.is_none()
            && self.date_range.is_empty()
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(&self, other: &FilterSet) -> FilterSet {
        FilterSet {
            file_name: other.file_name.clone().or_else(|| self.file_name.clone()),
            collections: if other.collections.is_empty() {
                self.collections.clone()
            } else {
                other.collections.clone()
            },
            description: other
                .description
                .clone()
                .or_else(|| self.description.clone()),
            date_range: DateRange {
                start: other.date_range.start.or(self.date_range.start),
                end: other.date_range.end.or(self.date_range.end),
            },
        }
    }
}

/// Result of [`parse_filters`]: the filters found and the query text left over.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub query: String,
    pub filters: FilterSet,
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    months
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn shift_months(date: NaiveDate, delta: i64) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + delta;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month0 = total.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    shift_months(date, 1)?.pred_opt()
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

const MONTH_PATTERN: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

struct Patterns {
    file: Regex,
    collection: Regex,
    description: Regex,
    range: Regex,
    since: Regex,
    before: Regex,
    around_month: Regex,
    in_month: Regex,
    around_year: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let date = r"(\d{4}-\d{2}-\d{2})";
        Patterns {
            file: Regex::new(r#"(?i)\bfile:(?:"([^"]+)"|(\S+))"#).expect("valid regex"),
            collection: Regex::new(r#"(?i)\bcollections?:(?:"([^"]+)"|(\S+))"#)
                .expect("valid regex"),
            description: Regex::new(r#"(?i)\bdesc(?:ription)?:(?:"([^"]+)"|(\S+))"#)
                .expect("valid regex"),
            range: Regex::new(&format!(
                r"(?i)\b(?:from|between)\s+{date}\s+(?:to|and|until)\s+{date}"
            ))
            .expect("valid regex"),
            since: Regex::new(&format!(r"(?i)\b(?:since|after)\s+{date}")).expect("valid regex"),
            before: Regex::new(&format!(r"(?i)\b(?:before|until)\s+{date}"))
                .expect("valid regex"),
            around_month: Regex::new(&format!(
                r"(?i)\b(?:around|about|circa|approximately)\s+{MONTH_PATTERN}\s+(\d{{4}})\b"
            ))
            .expect("valid regex"),
            in_month: Regex::new(&format!(r"(?i)\bin\s+{MONTH_PATTERN}\s+(\d{{4}})\b"))
                .expect("valid regex"),
            around_year: Regex::new(r"(?i)\b(?:around|about|circa|approximately)\s+(\d{4})\b")
                .expect("valid regex"),
        }
    })
}

fn quoted_or_bare(caps: &regex::Captures<'_>) -> Option<String> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract inline filter directives from `text`.
///
/// Fuzzy dates are normalized to a concrete window of `window_months`
/// on either side. The returned query has every recognized directive
/// removed and whitespace collapsed.
pub fn parse_filters(text: &str, window_months: u32) -> ParsedQuery {
    let p = patterns();
    let mut filters = FilterSet::default();
    let mut rest = text.to_string();

    if let Some(caps) = p.file.captures(&rest) {
        filters.file_name = quoted_or_bare(&caps);
        rest = p.file.replace(&rest, " ").into_owned();
    }

    if let Some(caps) = p.collection.captures(&rest) {
        if let Some(list) = quoted_or_bare(&caps) {
            filters.collections = list
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        rest = p.collection.replace(&rest, " ").into_owned();
    }

    if let Some(caps) = p.description.captures(&rest) {
        filters.description = quoted_or_bare(&caps);
        rest = p.description.replace(&rest, " ").into_owned();
    }

    if let Some(caps) = p.range.captures(&rest) {
        if let (Some(a), Some(b)) = (parse_iso(&caps[1]), parse_iso(&caps[2])) {
            filters.date_range = DateRange::between(a, b);
        }
        rest = p.range.replace(&rest, " ").into_owned();
    } else if let Some(caps) = p.around_month.captures(&rest) {
        let month = month_from_name(&caps[1]);
        let year = caps[2].parse::<i32>().ok();
        if let (Some(m), Some(y)) = (month, year) {
            if let Some(range) = DateRange::around_month(y, m, window_months) {
                filters.date_range = range;
            }
        }
        rest = p.around_month.replace(&rest, " ").into_owned();
    } else if let Some(caps) = p.in_month.captures(&rest) {
        let month = month_from_name(&caps[1]);
        let year = caps[2].parse::<i32>().ok();
        if let (Some(m), Some(y)) = (month, year) {
            if let Some(range) = DateRange::month(y, m) {
                filters.date_range = range;
            }
        }
        rest = p.in_month.replace(&rest, " ").into_owned();
    } else if let Some(caps) = p.around_year.captures(&rest) {
        if let Some(range) = caps[1]
            .parse::<i32>()
            .ok()
            .and_then(|y| DateRange::around_year(y, window_months))
        {
            filters.date_range = range;
        }
        rest = p.around_year.replace(&rest, " ").into_owned();
    } else {
        if let Some(caps) = p.since.captures(&rest) {
            filters.date_range.start = parse_iso(&caps[1]);
            rest = p.since.replace(&rest, " ").into_owned();
        }
        if let Some(caps) = p.before.captures(&rest) {
            filters.date_range.end = parse_iso(&caps[1]);
            rest = p.before.replace(&rest, " ").into_owned();
        }
    }

    let query = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    ParsedQuery { query, filters }
}
