use chrono::Utc;

/// Unix timestamp in whole seconds, the form carried by status events.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Unix timestamp in milliseconds, used for the login cache-buster.
pub fn unix_now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncates to at most `max` bytes without splitting a UTF-8 sequence.
/// Portal responses can be large and occasionally non-ASCII; everything
/// we log or retain goes through this.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_alone() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn truncate_cuts_at_limit() {
        assert_eq!(truncate("hello world", 5), "hello");
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        // each CJK char is 3 bytes; a cut at 4 must back up to 3
        let s = "认证成功";
        assert_eq!(truncate(s, 4), "认");
        assert_eq!(truncate(s, 3), "认");
        assert_eq!(truncate(s, 2), "");
    }

    #[test]
    fn timestamps_are_plausible() {
        // 2020-01-01 as a floor; catches accidental millis/seconds swaps
        assert!(unix_now() > 1_577_836_800);
        assert!(unix_now_millis() > 1_577_836_800_000);
    }
}
