use chrono::{DateTime, Duration, Utc};

use crate::models::{AccessRole, EventInfo};

/// Explicit form of the register-button state. Derivation is first-match
/// wins, top to bottom; see `derive_registration_button`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationButton {
    Closed,
    AlreadyRegistered,
    AlreadyMember,
    Locked,
    Countdown(String),
    RegisterNow,
}

impl RegistrationButton {
    pub fn label(&self) -> &str {
        match self {
            RegistrationButton::Closed => "Closed",
            RegistrationButton::AlreadyRegistered => "Already Registered",
            RegistrationButton::AlreadyMember => "Already Member",
            RegistrationButton::Locked => "Locked",
            RegistrationButton::Countdown(text) => text,
            RegistrationButton::RegisterNow => "Register Now",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, RegistrationButton::RegisterNow)
    }

    /// True while the state depends on the clock (a pending registration
    /// window). The screen keeps a one-second repaint scheduled so the
    /// button flips to open at the boundary without user input; Locked
    /// needs this as much as the visible countdown does.
    pub fn tracks_clock(&self) -> bool {
        matches!(
            self,
            RegistrationButton::Locked | RegistrationButton::Countdown(_)
        )
    }
}

/// Precedence order:
/// 1. event past or admin-closed
/// 2. caller already registered
/// 3. member-tier role (registers through their team, not the form)
/// 4. registration window not yet open (countdown; base USER tier sees
///    Locked instead of the timer)
/// 5. open for registration
pub fn derive_registration_button(
    role: Option<&AccessRole>,
    info: &EventInfo,
    registered_form_ids: &[String],
    form_id: &str,
    now: DateTime<Utc>,
) -> RegistrationButton {
    if info.is_event_past || info.is_registration_closed {
        return RegistrationButton::Closed;
    }

    if registered_form_ids.iter().any(|id| id == form_id) {
        return RegistrationButton::AlreadyRegistered;
    }

    if role.is_some_and(AccessRole::is_org_member) {
        return RegistrationButton::AlreadyMember;
    }

    if let Some(opens_at) = info.registration_opens_at {
        let remaining = opens_at.with_timezone(&Utc) - now;
        if remaining > Duration::zero() {
            return match role {
                Some(AccessRole::User) => RegistrationButton::Locked,
                _ => RegistrationButton::Countdown(format_remaining(remaining)),
            };
        }
    }

    RegistrationButton::RegisterNow
}

/// Days-only once a full day remains, else a compact `Hh Mm Ss` that drops
/// zero-valued units.
pub fn format_remaining(remaining: Duration) -> String {
    let total_seconds = remaining.num_seconds().max(0);
    let days = total_seconds / 86_400;
    if days > 0 {
        return if days == 1 {
            "1 day left".to_string()
        } else {
            format!("{days} days left")
        };
    }

    let hours = (total_seconds / 3_600) % 24;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    let mut parts: Vec<String> = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    if parts.is_empty() {
        // Sub-second remainder still counts as pending.
        parts.push("1s".to_string());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_info(opens_in_seconds: Option<i64>, now: DateTime<Utc>) -> EventInfo {
        let opens_at = opens_in_seconds
            .map(|secs| (now + Duration::seconds(secs)).fixed_offset());
        EventInfo {
            event_title: "Hackfest".into(),
            event_date: None,
            event_location: None,
            registration_opens_at: opens_at,
            is_registration_closed: false,
            is_event_past: false,
            related_event: None,
            min_team_size: Some(1),
            max_team_size: Some(4),
            participation_type: crate::models::ParticipationType::Team,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn closed_takes_precedence_over_everything() {
        let now = now();
        let mut info = event_info(Some(600), now);
        info.is_registration_closed = true;
        let registered = vec!["f1".to_string()];
        let button = derive_registration_button(
            Some(&AccessRole::Admin),
            &info,
            &registered,
            "f1",
            now,
        );
        assert_eq!(button, RegistrationButton::Closed);

        info.is_registration_closed = false;
        info.is_event_past = true;
        let button =
            derive_registration_button(Some(&AccessRole::User), &info, &registered, "f1", now);
        assert_eq!(button, RegistrationButton::Closed);
    }

    #[test]
    fn already_registered_beats_member_and_countdown() {
        let now = now();
        let info = event_info(Some(600), now);
        let registered = vec!["f1".to_string()];
        let role = AccessRole::Member("EXECUTIVE".into());
        let button = derive_registration_button(Some(&role), &info, &registered, "f1", now);
        assert_eq!(button, RegistrationButton::AlreadyRegistered);
    }

    #[test]
    fn member_tier_sees_already_member_even_when_window_pending() {
        let now = now();
        let info = event_info(Some(600), now);
        let role = AccessRole::Member("SENIOR_EXECUTIVE_CREATIVE".into());
        let button = derive_registration_button(Some(&role), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::AlreadyMember);

        let button = derive_registration_button(Some(&AccessRole::Alumni), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::AlreadyMember);
    }

    #[test]
    fn pending_window_locks_base_tier_and_counts_down_for_others() {
        let now = now();
        let info = event_info(Some(10), now);
        let button = derive_registration_button(Some(&AccessRole::User), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::Locked);

        let button = derive_registration_button(Some(&AccessRole::Admin), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::Countdown("10s".into()));

        let button = derive_registration_button(None, &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::Countdown("10s".into()));
    }

    #[test]
    fn open_window_registers_now() {
        let now = now();
        let info = event_info(Some(-1), now);
        let button = derive_registration_button(Some(&AccessRole::User), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::RegisterNow);

        let info = event_info(None, now);
        let button = derive_registration_button(Some(&AccessRole::User), &info, &[], "f1", now);
        assert_eq!(button, RegistrationButton::RegisterNow);
    }

    #[test]
    fn countdown_flips_to_register_exactly_once() {
        let base = now();
        let info = event_info(Some(10), base);
        let mut seen_open = false;
        let mut previous_remaining: Option<Duration> = None;

        for tick in 0..=12 {
            let t = base + Duration::seconds(tick);
            let button = derive_registration_button(Some(&AccessRole::Admin), &info, &[], "f1", t);
            match button {
                RegistrationButton::Countdown(_) => {
                    assert!(!seen_open, "countdown reappeared after opening");
                    let remaining = info.registration_opens_at.unwrap().with_timezone(&Utc) - t;
                    if let Some(previous) = previous_remaining {
                        assert!(remaining < previous, "remaining time must strictly decrease");
                    }
                    previous_remaining = Some(remaining);
                }
                RegistrationButton::RegisterNow => {
                    seen_open = true;
                }
                other => panic!("unexpected state {other:?}"),
            }
        }
        assert!(seen_open);
    }

    #[test]
    fn locked_base_tier_flips_at_open_without_interaction() {
        let base = now();
        let info = event_info(Some(10), base);

        for tick in 0..10 {
            let t = base + Duration::seconds(tick);
            let button =
                derive_registration_button(Some(&AccessRole::User), &info, &[], "f1", t);
            assert_eq!(button, RegistrationButton::Locked);
            assert!(
                button.tracks_clock(),
                "a pending window must keep repaints scheduled"
            );
        }

        let button = derive_registration_button(
            Some(&AccessRole::User),
            &info,
            &[],
            "f1",
            base + Duration::seconds(10),
        );
        assert_eq!(button, RegistrationButton::RegisterNow);
        assert!(!button.tracks_clock());
    }

    #[test]
    fn remaining_formats_days_then_compact_units() {
        assert_eq!(format_remaining(Duration::days(3)), "3 days left");
        assert_eq!(format_remaining(Duration::hours(25)), "1 day left");
        assert_eq!(
            format_remaining(Duration::hours(2) + Duration::minutes(5) + Duration::seconds(9)),
            "2h 5m 9s"
        );
        assert_eq!(format_remaining(Duration::minutes(40)), "40m");
        assert_eq!(
            format_remaining(Duration::hours(1) + Duration::seconds(30)),
            "1h 30s"
        );
        assert_eq!(format_remaining(Duration::milliseconds(400)), "1s");
    }
}
