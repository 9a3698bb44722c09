//! Arabic-locale display formatting for amounts and dates.
//!
//! Output matches what the back-office UI shows for `ar-EG`: Arabic-Indic
//! digits, `٬` as the thousands separator, `٫` as the decimal separator and
//! the currency symbol after the amount.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

const MONTHS_AR: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

/// Replace ASCII digits and separators with their Arabic-Indic forms.
pub fn to_arabic_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '0'..='9' => char::from_u32(0x0660 + (c as u32 - '0' as u32)).unwrap_or(c),
            '.' => '٫',
            ',' => '٬',
            other => other,
        })
        .collect()
}

/// `1234567.891` with 2 decimals -> `1,234,567.89` (ASCII).
pub fn format_amount(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rendered.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // -0.00 renders as 0.00
    let is_zero = rendered.chars().all(|c| c == '0' || c == '.');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyFormat {
    pub code: String,
    pub symbol: String,
    pub decimals: usize,
    pub arabic_digits: bool,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::for_code("EGP")
    }
}

impl CurrencyFormat {
    /// Known symbols for the region; unknown codes use the code itself.
    pub fn for_code(code: &str) -> Self {
        let code = code.trim().to_uppercase();
        let (symbol, decimals) = match code.as_str() {
            "EGP" => ("ج.م", 2),
            "SAR" => ("ر.س", 2),
            "AED" => ("د.إ", 2),
            "KWD" => ("د.ك", 3),
            "JOD" => ("د.أ", 3),
            "USD" => ("$", 2),
            _ => (code.as_str(), 2),
        };
        Self {
            symbol: symbol.to_string(),
            code,
            decimals,
            arabic_digits: true,
        }
    }

    pub fn format(&self, amount: f64) -> String {
        let number = format_amount(amount, self.decimals);
        let number = if self.arabic_digits {
            to_arabic_digits(&number)
        } else {
            number
        };
        format!("{number} {}", self.symbol)
    }
}

/// `2026-10-18` -> `١٨ أكتوبر ٢٠٢٦`.
pub fn format_date(date: NaiveDate) -> String {
    let month = MONTHS_AR[date.month0() as usize];
    to_arabic_digits(&format!("{} {month} {}", date.day(), date.year()))
}

/// Date followed by a 12-hour clock with the Arabic AM/PM marker (ص/م).
pub fn format_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    let (is_pm, hour) = dt.hour12();
    let marker = if is_pm { "م" } else { "ص" };
    format!(
        "{} {} {marker}",
        format_date(dt.date_naive()),
        to_arabic_digits(&format!("{hour:02}:{:02}", dt.minute()))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn arabic_digits_cover_separators() {
        assert_eq!(to_arabic_digits("1,234.50"), "١٬٢٣٤٫٥٠");
        assert_eq!(to_arabic_digits("EGP 7"), "EGP ٧");
    }

    #[test]
    fn amounts_are_grouped_by_thousands() {
        assert_eq!(format_amount(0.0, 2), "0.00");
        assert_eq!(format_amount(999.0, 0), "999");
        assert_eq!(format_amount(1234.5, 2), "1,234.50");
        assert_eq!(format_amount(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_amount(-42.1, 2), "-42.10");
        assert_eq!(format_amount(-0.001, 2), "0.00");
    }

    #[test]
    fn currency_defaults_to_egyptian_pound() {
        let egp = CurrencyFormat::default();
        assert_eq!(egp.format(1234.5), "١٬٢٣٤٫٥٠ ج.م");

        let mut kwd = CurrencyFormat::for_code("kwd");
        kwd.arabic_digits = false;
        assert_eq!(kwd.format(12.5), "12.500 د.ك");

        assert_eq!(CurrencyFormat::for_code("XYZ").symbol, "XYZ");
    }

    #[test]
    fn dates_use_arabic_month_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(format_date(date), "١٨ أكتوبر ٢٠٢٦");

        let dt = Utc.with_ymd_and_hms(2026, 1, 5, 15, 7, 0).unwrap();
        assert_eq!(format_datetime(&dt), "٥ يناير ٢٠٢٦ ٠٣:٠٧ م");

        let morning = Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap();
        assert_eq!(format_datetime(&morning), "٥ يناير ٢٠٢٦ ١٢:٣٠ ص");
    }
}
