//! Parsing helpers for RouterOS responses, spec.md §4.5.1/§4.5.2/§8.

/// Parses a RouterOS `avg-rtt` field of the form `<s>s<ms>ms` (either group
/// optional) into milliseconds. Unparseable input yields `0`, per spec.md §8.
pub fn parse_avg_rtt_ms(raw: &str) -> f64 {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut matched = false;

    if let Some(ms_idx) = rest.rfind("ms") {
        let (before_ms, after_ms) = rest.split_at(ms_idx);
        debug_assert_eq!(after_ms, "ms");

        // Whatever precedes "ms" may itself end in a seconds component, e.g. "2s350ms".
        if let Some(s_idx) = before_ms.rfind('s') {
            let (secs_str, ms_str) = before_ms.split_at(s_idx);
            let ms_str = &ms_str[1..];
            if let Ok(secs) = secs_str.parse::<f64>() {
                total += secs * 1000.0;
                matched = true;
            }
            if let Ok(ms) = ms_str.parse::<f64>() {
                total += ms;
                matched = true;
            }
        } else if let Ok(ms) = before_ms.parse::<f64>() {
            total += ms;
            matched = true;
        }
        rest = "";
    }

    if let Some(secs_str) = rest.strip_suffix('s') {
        if let Ok(secs) = secs_str.parse::<f64>() {
            total += secs * 1000.0;
            matched = true;
        }
    }

    if matched {
        total
    } else {
        0.0
    }
}

/// Tokens spec.md §4.5.2 step 1 treats as "link up", case-insensitive.
const LINK_UP_TOKENS: &[&str] = &["link-ok", "link_ok", "ok", "up", "running", "true", "yes"];

pub fn is_link_up(status: &str) -> bool {
    let lower = status.trim().to_ascii_lowercase();
    LINK_UP_TOKENS.contains(&lower.as_str())
}

/// RouterOS 6 fallback: "running" as a boolean-ish flag string.
pub fn is_truthy_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_seconds_and_milliseconds() {
        assert_eq!(parse_avg_rtt_ms("2s350ms"), 2350.0);
    }

    #[test]
    fn parses_milliseconds_only() {
        assert_eq!(parse_avg_rtt_ms("75ms"), 75.0);
        assert_eq!(parse_avg_rtt_ms("0ms"), 0.0);
    }

    #[test]
    fn parses_seconds_only() {
        assert_eq!(parse_avg_rtt_ms("1s"), 1000.0);
    }

    #[test]
    fn unparseable_input_yields_zero() {
        assert_eq!(parse_avg_rtt_ms("garbage"), 0.0);
        assert_eq!(parse_avg_rtt_ms(""), 0.0);
    }

    #[test]
    fn link_up_tokens_are_case_insensitive() {
        for token in ["link-ok", "OK", "Running", "YES"] {
            assert!(is_link_up(token), "{token} should be link up");
        }
    }

    #[test]
    fn link_down_tokens_are_not_link_up() {
        for token in ["no-link", "false", ""] {
            assert!(!is_link_up(token), "{token} should be link down");
        }
    }
}
