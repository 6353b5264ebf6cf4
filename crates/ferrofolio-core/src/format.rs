//! Presentation helpers for amounts and times.

use time::macros::format_description;

use crate::domain::UtcDateTime;

/// Dollar amount with thousands separators and two decimals, e.g. `$1,234.56`.
pub fn currency(value: f64) -> String {
    if !value.is_finite() {
        return format!("${value}");
    }

    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}${}.{cents}", group_digits(whole))
}

/// Integer with thousands separators, e.g. `7,430,000`.
pub fn grouped(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    if value < 0 {
        format!("-{}", group_digits(&digits))
    } else {
        group_digits(&digits)
    }
}

/// `YYYY-MM-DD hh:mm AM` in UTC.
pub fn datetime_12h(value: UtcDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour repr:12]:[minute] [period]");
    value
        .into_inner()
        .format(&format)
        .unwrap_or_else(|_| value.format_rfc3339())
}

/// Collapse whitespace and cut `text` at a word boundary so it fits `width`,
/// appending `...` when anything was dropped.
pub fn shorten(text: &str, width: usize) -> String {
    const PLACEHOLDER: &str = "...";

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(PLACEHOLDER.len());
    let mut kept = String::new();
    for word in collapsed.split(' ') {
        let extra = if kept.is_empty() { 0 } else { 1 };
        if kept.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            kept.push(' ');
        }
        kept.push_str(word);
    }

    if kept.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        format!("{kept} {PLACEHOLDER}")
    }
}

fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_currency_with_separators() {
        assert_eq!(currency(0.0), "$0.00");
        assert_eq!(currency(98_500.0), "$98,500.00");
        assert_eq!(currency(1_234_567.891), "$1,234,567.89");
        assert_eq!(currency(-42.5), "-$42.50");
        assert_eq!(currency(999.999), "$1,000.00");
    }

    #[test]
    fn groups_integers() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(1_000), "1,000");
        assert_eq!(grouped(-25_000_000), "-25,000,000");
    }

    #[test]
    fn formats_twelve_hour_clock() {
        let afternoon = UtcDateTime::parse("2024-03-01T15:04:00Z").expect("timestamp");
        assert_eq!(datetime_12h(afternoon), "2024-03-01 03:04 PM");
    }

    #[test]
    fn shortens_at_word_boundary() {
        assert_eq!(shorten("short  text", 20), "short text");
        assert_eq!(shorten("one two three four", 12), "one two ...");
    }
}
