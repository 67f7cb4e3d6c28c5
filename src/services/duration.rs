//! Twitch duration token parsing and display formatting
//!
//! Twitch reports VOD lengths as compact tokens like "1h2m3s", "30m15s"
//! or "45s". The parser is deliberately tolerant: it never fails, it just
//! degrades to a partial or zero total on junk input.

/// Parse a compact duration token into total seconds.
///
/// Accumulates digit runs and applies them when a recognized unit
/// character ('h', 'm', 's') follows. Digits never claimed by a unit are
/// dropped, so `parse_duration("10")` is 0. Unrecognized characters pass
/// through without disturbing the pending digits.
pub fn parse_duration(token: &str) -> i64 {
    let mut total: i64 = 0;
    let mut pending: Option<i64> = None;

    for ch in token.chars() {
        if let Some(digit) = ch.to_digit(10) {
            let digit = i64::from(digit);
            pending = Some(
                pending
                    .unwrap_or(0)
                    .saturating_mul(10)
                    .saturating_add(digit),
            );
        } else if matches!(ch, 'h' | 'm' | 's') {
            if let Some(value) = pending.take() {
                let seconds = match ch {
                    'h' => value.saturating_mul(3600),
                    'm' => value.saturating_mul(60),
                    _ => value,
                };
                total = total.saturating_add(seconds);
            }
        }
    }

    total
}

/// Format a second count for display, e.g. "2h 5m", "5m 10s" or "45s".
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_token() {
        assert_eq!(parse_duration("1h2m3s"), 3723);
        assert_eq!(parse_duration("2h30m15s"), 9015);
    }

    #[test]
    fn test_parse_partial_tokens() {
        assert_eq!(parse_duration("45s"), 45);
        assert_eq!(parse_duration("30m15s"), 1815);
        assert_eq!(parse_duration("2h"), 7200);
    }

    #[test]
    fn test_parse_units_in_any_order() {
        // Twitch emits h->m->s but the parser must not depend on it
        assert_eq!(parse_duration("3s2m1h"), 3723);
    }

    #[test]
    fn test_parse_empty_and_unitless() {
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("10"), 0);
    }

    #[test]
    fn test_parse_trailing_digits_dropped() {
        assert_eq!(parse_duration("1h30"), 3600);
    }

    #[test]
    fn test_parse_ignores_unknown_characters() {
        // Unknown characters pass through; surrounding digits still combine
        assert_eq!(parse_duration("1h2x3s"), 3623);
        assert_eq!(parse_duration("PT1h2m"), 3720);
    }

    #[test]
    fn test_parse_unit_without_digits() {
        assert_eq!(parse_duration("h30m"), 1800);
        assert_eq!(parse_duration("hms"), 0);
    }

    #[test]
    fn test_parse_never_panics_on_garbage() {
        for input in ["!!!", "999999999999999999999h", "\u{1F600}1m", "-5m", "1.5h"] {
            let _ = parse_duration(input);
        }
        // All printable ASCII in one string
        let ascii: String = (0x20u8..0x7f).map(|b| b as char).collect();
        let _ = parse_duration(&ascii);
    }

    #[test]
    fn test_format_duration_branches() {
        assert_eq!(format_duration(9015), "2h 30m");
        assert_eq!(format_duration(3723), "1h 2m");
        assert_eq!(format_duration(310), "5m 10s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(0), "0s");
    }
}
