// ── Heartbeat age parsing ──
//
// The device reports "time since last handshake" either as a relative
// duration (`25s`, `1m5s`, `1d2h`, `00:01:25`) or, on some firmware, as
// the absolute time of the handshake. Absolute values carry no offset and
// are read in the policy's reference zone.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::config::PresencePolicy;

/// Absolute layouts seen in the wild, tried in order.
const ABSOLUTE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%b/%d/%Y %H:%M:%S",
];

/// Seconds since the last heartbeat, or `None` when there never was one
/// (`never`, empty, `-`) or the text is unreadable.
///
/// Absolute timestamps in the future clamp to zero.
pub fn parse_heartbeat_age(raw: &str, now: DateTime<Utc>, tz: FixedOffset) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" || raw.eq_ignore_ascii_case("never") {
        return None;
    }
    parse_relative(raw).or_else(|| parse_absolute(raw, now, tz))
}

fn parse_relative(raw: &str) -> Option<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    parse_clock(raw).or_else(|| parse_units(&raw.to_ascii_lowercase()))
}

/// `HH:MM:SS`
fn parse_clock(raw: &str) -> Option<u64> {
    let mut parts = raw.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (h, m, s): (u64, u64, u64) = (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?);
    if m >= 60 || s >= 60 {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

/// Compound unit tokens: `1w2d3h4m5s`, `250ms`. Sub-second parts round down.
fn parse_units(raw: &str) -> Option<u64> {
    let mut total_ms: u64 = 0;
    let mut rest = raw;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        let after = &rest[digits..];
        let unit_len = after
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after.len());
        let unit_ms: u64 = match &after[..unit_len] {
            "w" => 604_800_000,
            "d" => 86_400_000,
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            "ms" => 1,
            _ => return None,
        };
        total_ms = total_ms.checked_add(value.checked_mul(unit_ms)?)?;
        rest = &after[unit_len..];
    }

    Some(total_ms / 1_000)
}

fn parse_absolute(raw: &str, now: DateTime<Utc>, tz: FixedOffset) -> Option<u64> {
    let at = match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => {
            let naive = ABSOLUTE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())?;
            tz.from_local_datetime(&naive).single()?.with_timezone(&Utc)
        }
    };
    Some(u64::try_from((now - at).num_seconds()).unwrap_or(0))
}

// ── Classification ───────────────────────────────────────────────

impl PresencePolicy {
    pub fn heartbeat_age(&self, raw: &str, now: DateTime<Utc>) -> Option<u64> {
        parse_heartbeat_age(raw, now, self.timezone)
    }

    /// Online iff the heartbeat age is below the threshold. No heartbeat
    /// or an unreadable one counts as offline.
    pub fn is_online(&self, raw: &str, now: DateTime<Utc>) -> bool {
        self.heartbeat_age(raw, now)
            .is_some_and(|age| self.age_is_online(age))
    }

    pub fn age_is_online(&self, age_secs: u64) -> bool {
        age_secs < self.online_threshold.as_secs()
    }

    /// A peer silent for `silent_secs` may be recorded as gone.
    pub fn confirms_offline(&self, silent_secs: u64) -> bool {
        silent_secs >= self.offline_confirm.as_secs()
    }

    /// A heartbeat this fresh may bring an offline peer back.
    pub fn confirms_online(&self, age_secs: u64) -> bool {
        age_secs < self.online_confirm.as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Offset;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn age(raw: &str) -> Option<u64> {
        parse_heartbeat_age(raw, now(), Utc.fix())
    }

    #[test]
    fn relative_tokens() {
        assert_eq!(age("25s"), Some(25));
        assert_eq!(age("2m"), Some(120));
        assert_eq!(age("1m5s"), Some(65));
        assert_eq!(age("1h2m3s"), Some(3723));
        assert_eq!(age("1d"), Some(86_400));
        assert_eq!(age("1w1d"), Some(691_200));
        assert_eq!(age("1s500ms"), Some(1));
        assert_eq!(age("45"), Some(45));
        assert_eq!(age("00:01:25"), Some(85));
        assert_eq!(age(" 30S "), Some(30));
    }

    #[test]
    fn no_heartbeat_or_garbage_is_none() {
        for raw in ["never", "NEVER", "", "  ", "-", "soon", "5x", "m5", "12:99:00"] {
            assert_eq!(age(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn absolute_timestamps_use_reference_zone() {
        assert_eq!(age("2024-05-01 11:59:00"), Some(60));
        assert_eq!(age("2024-05-01T11:58:00"), Some(120));
        assert_eq!(age("may/01/2024 11:59:30"), Some(30));
        assert_eq!(age("2024-05-01T14:59:00+03:00"), Some(60));

        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(
            parse_heartbeat_age("2024-05-01 14:58:00", now(), plus_three),
            Some(120)
        );
    }

    #[test]
    fn future_timestamp_clamps_to_zero() {
        assert_eq!(age("2024-05-01 12:05:00"), Some(0));
    }

    #[test]
    fn online_threshold() {
        let policy = PresencePolicy::default();
        assert!(policy.is_online("25s", now()));
        assert!(policy.is_online("89s", now()));
        assert!(!policy.is_online("90s", now()));
        assert!(!policy.is_online("95s", now()));
        assert!(!policy.is_online("never", now()));
        assert!(!policy.is_online("garbage", now()));
    }

    #[test]
    fn confirmation_bounds() {
        let policy = PresencePolicy::default();
        assert!(policy.confirms_offline(90));
        assert!(!policy.confirms_offline(89));
        assert!(policy.confirms_online(74));
        assert!(!policy.confirms_online(80));
    }
}
