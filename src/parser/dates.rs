use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

const MON: &str = r"((?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*)";

const MONTHS: [(&str, &str); 12] = [
    ("jan", "january"),
    ("feb", "february"),
    ("mar", "march"),
    ("apr", "april"),
    ("may", "may"),
    ("jun", "june"),
    ("jul", "july"),
    ("aug", "august"),
    ("sep", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
];

// Priority order matters: the first pattern that matches and validates wins.
static START_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Started running on\s+(\d{1,2})\s+{MON}\s+(\d{4})",
        r"Started running on\s+{MON}\s+(\d{1,2}),\s*(\d{4})",
        r"Started\s+(\d{1,2})\s+{MON}\s+(\d{4})",
        r"Started\s+{MON}\s+(\d{1,2}),\s*(\d{4})",
        r"\b(\d{1,2})\s+{MON}\s+(\d{4})",
        r"\b{MON}\s+(\d{1,2}),\s*(\d{4})",
    ])
});

static END_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Ended\s+(\d{1,2})\s+{MON}\s+(\d{4})",
        r"Ended on\s+(\d{1,2})\s+{MON}\s+(\d{4})",
        r"Ended\s+{MON}\s+(\d{1,2}),\s*(\d{4})",
        r"Ended on\s+{MON}\s+(\d{1,2}),\s*(\d{4})",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p.replace("{MON}", MON))).unwrap())
        .collect()
}

/// Parse a start date out of free text such as "Started running on 8 Jan 2026".
pub fn parse(text: &str) -> Option<NaiveDate> {
    parse_with(&START_PATTERNS, text)
}

/// Parse an end date ("Ended 3 Feb 2026", "Ended on Feb 3, 2026").
pub fn parse_end(text: &str) -> Option<NaiveDate> {
    parse_with(&END_PATTERNS, text)
}

fn parse_with(patterns: &[Regex], text: &str) -> Option<NaiveDate> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        build_date(&caps[1], &caps[2], &caps[3])
    })
}

/// Month-first when the first token names a month, day-first otherwise.
fn build_date(first: &str, second: &str, year: &str) -> Option<NaiveDate> {
    let (month, day) = match month_number(first) {
        Some(m) => (m, second),
        None => (month_number(second)?, first),
    };
    let day: u32 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Accepts a three-letter abbreviation or the full English month name.
pub fn month_number(token: &str) -> Option<u32> {
    let token = token.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|(abbr, full)| token == *abbr || token == *full)
        .map(|i| i as u32 + 1)
}
