//! Formatting helpers for presence text.

/// Format a millisecond duration as clock time.
///
/// `MM:SS` below one hour, `HH:MM:SS` from one hour up. Every component is
/// zero-padded to two digits.
pub fn format_clock(millis: u64) -> String {
    let seconds = (millis + 500) / 1000;
    let hours = seconds / 3600;
    let minutes = seconds / 60 % 60;
    let secs = seconds % 60;

    if hours == 0 {
        format!("{:02}:{:02}", minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Truncate to at most `limit` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock_minutes() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(30_000), "00:30");
        assert_eq!(format_clock(1_320_000), "22:00");
        assert_eq!(format_clock(59_499), "00:59");
        assert_eq!(format_clock(59_500), "01:00");
    }

    #[test]
    fn test_format_clock_hours() {
        assert_eq!(format_clock(3_600_000), "01:00:00");
        assert_eq!(format_clock(7_384_000), "02:03:04");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 128), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        // Multi-byte characters count once
        assert_eq!(truncate_chars("ééééé", 2), "éé");
    }
}
