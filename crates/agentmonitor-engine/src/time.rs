use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp in the store's canonical form: RFC 3339 UTC with
/// millisecond precision. Fixed width keeps string comparison and SQL
/// range filters consistent with chronological order.
pub fn to_canonical(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_form_is_fixed_width_utc() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 5, 9, 3, 7).unwrap();
        assert_eq!(to_canonical(dt), "2026-01-05T09:03:07.000Z");
    }

    #[test]
    fn lexicographic_order_matches_chronological() {
        let earlier = to_canonical(Utc.with_ymd_and_hms(2026, 1, 5, 9, 59, 59).unwrap());
        let later = to_canonical(Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap());
        assert!(earlier < later);
    }
}
