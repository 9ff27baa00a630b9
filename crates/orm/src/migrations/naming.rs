//! Unit naming helpers
//!
//! Migrations sort by plain string comparison. Seeds sort by the numeric
//! value of the leading digit run, so `9_x` comes before `10_y`.

use std::cmp::Ordering;

/// Leading run of ASCII digits, if any
fn prefix_digits(name: &str) -> Option<&str> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    (end > 0).then(|| &name[..end])
}

/// Numeric value of the leading digit run (`1700570553631_users` → 1700570553631)
pub fn numeric_prefix(name: &str) -> Option<u128> {
    prefix_digits(name).and_then(|digits| digits.parse().ok())
}

/// Order by numeric prefix; ties and prefix-less names fall back to string order,
/// with prefix-less names after prefixed ones.
pub fn compare_numeric_prefix(a: &str, b: &str) -> Ordering {
    match (prefix_digits(a), prefix_digits(b)) {
        (Some(x), Some(y)) => compare_digit_strings(x, y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

// Arbitrary-length comparison, no overflow on absurdly long prefixes
fn compare_digit_strings(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Whether lexicographic and numeric order can disagree for these names
pub fn has_mixed_prefix_widths<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
    let mut width = None;
    for name in names {
        if let Some(digits) = prefix_digits(name) {
            match width {
                None => width = Some(digits.len()),
                Some(w) if w != digits.len() => return true,
                Some(_) => {}
            }
        }
    }
    false
}
