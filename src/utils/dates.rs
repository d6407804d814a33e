//! Time helpers

use chrono::Utc;

/// Current time as unix seconds (UTC)
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Extract the first plausible release year (1900-2099) from a date tag
///
/// Handles "2005", "2005-01-15", "released 2005", and similar shapes.
pub fn extract_year(date: &str) -> Option<i32> {
    let bytes = date.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                if let Ok(year) = date[start..i].parse::<i32>() {
                    if (1900..=2099).contains(&year) {
                        return Some(year);
                    }
                }
            }
        } else {
            i += 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("1969"), Some(1969));
        assert_eq!(extract_year("2005-01-15"), Some(2005));
        assert_eq!(extract_year("released 1999, remaster"), Some(1999));
        assert_eq!(extract_year("12345"), None);
        assert_eq!(extract_year("1850"), None);
        assert_eq!(extract_year(""), None);
    }
}
