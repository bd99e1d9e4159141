use std::sync::mpsc::{self, Receiver};
use std::thread;

use serde_json::json;
use tracing::info;

use crate::models::{InviteLink, TeamRegistration, TeamStatusPayload, TeamSummary};
use crate::services::api_client::{ApiError, SharedApiClient, decode_data};
use crate::services::notices::NoticeKind;

/// Everything the team-management screens can hear back from a worker.
/// Each spawn returns its own receiver; a screen drains only the channels
/// it is currently holding, so a late reply to an abandoned operation dies
/// with its channel.
#[derive(Debug)]
pub enum TeamFlowEvent {
    Details(Box<TeamStatusPayload>),
    DetailsFailed { message: String },
    SearchResults { generation: u64, teams: Vec<TeamSummary> },
    SearchFailed { generation: u64 },
    Created { message: String },
    RequestSent { message: String },
    Renamed { team_name: String },
    Left { message: String },
    MemberRemoved { message: String },
    InviteSent { message: String },
    InviteLinkReady(InviteLink),
    ActionFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveAction {
    LeaveTeam,
    DissolveTeam,
}

impl LeaveAction {
    pub fn title(&self) -> &'static str {
        match self {
            LeaveAction::LeaveTeam => "Leave Team",
            LeaveAction::DissolveTeam => "Dissolve Team",
        }
    }

    pub fn prompt(&self, team_name: &str) -> String {
        match self {
            LeaveAction::LeaveTeam => format!(
                "Leave \"{team_name}\"? You'll remain registered and can create or join another team."
            ),
            LeaveAction::DissolveTeam => format!(
                "Dissolve \"{team_name}\"? You'll remain registered but can create or join another team."
            ),
        }
    }
}

pub fn is_leader(team: &TeamRegistration, viewer_email: &str) -> bool {
    team.leader_email.eq_ignore_ascii_case(viewer_email)
}

pub fn is_registration_open(team: &TeamRegistration) -> bool {
    !team.is_registration_closed && !team.is_event_past
}

pub fn spots_remaining(team: &TeamRegistration) -> u32 {
    team.max_team_size.saturating_sub(team.team_size)
}

/// Which destructive exit, if any, the viewer may take. A leader with
/// followers gets none; they must remove members first.
pub fn leave_action(team: &TeamRegistration, viewer_email: &str) -> Option<LeaveAction> {
    if !is_registration_open(team) {
        return None;
    }
    if is_leader(team, viewer_email) {
        if team.team_size == 1 {
            Some(LeaveAction::DissolveTeam)
        } else {
            None
        }
    } else {
        Some(LeaveAction::LeaveTeam)
    }
}

pub fn can_rename(team: &TeamRegistration, viewer_email: &str) -> bool {
    is_leader(team, viewer_email) && is_registration_open(team)
}

pub fn can_invite(team: &TeamRegistration, viewer_email: &str) -> bool {
    is_leader(team, viewer_email) && is_registration_open(team) && spots_remaining(team) > 0
}

pub fn can_remove_member(
    team: &TeamRegistration,
    viewer_email: &str,
    member_email: &str,
) -> bool {
    is_leader(team, viewer_email)
        && is_registration_open(team)
        && !member_email.eq_ignore_ascii_case(viewer_email)
}

pub fn validate_team_name(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err("Team name cannot be empty".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// The server stores names uppercased; renaming to the same name modulo
/// case and surrounding whitespace is a no-op and skips the request.
pub fn rename_is_noop(current: &str, proposed: &str) -> bool {
    current.trim().eq_ignore_ascii_case(proposed.trim())
}

/// Notices for the `?toast=` / `?name=` parameters carried by email-action
/// redirect deep links. Consumed one-shot by the team screen.
pub fn toast_notice(toast: &str, name: Option<&str>) -> Option<(NoticeKind, String)> {
    let who = name.filter(|n| !n.trim().is_empty());
    let user = who.unwrap_or("User");
    match toast {
        "joined" => Some((
            NoticeKind::Success,
            format!("{user} has been added to the team!"),
        )),
        "rejected" => Some((
            NoticeKind::Info,
            format!("{user}'s join request was declined."),
        )),
        "expired" => Some((NoticeKind::Warning, "This request has expired.".to_string())),
        "already_accepted" => Some((
            NoticeKind::Info,
            "This request was already accepted.".to_string(),
        )),
        "already_rejected" => Some((
            NoticeKind::Info,
            "This request was already declined.".to_string(),
        )),
        "already_joined" => Some((
            NoticeKind::Info,
            format!("{} has already joined another team.", who.unwrap_or("This user")),
        )),
        "team_full" => Some((
            NoticeKind::Warning,
            format!("Team is full. {} could not be added.", who.unwrap_or("The user")),
        )),
        "invalid" => Some((NoticeKind::Error, "Invalid request.".to_string())),
        _ => None,
    }
}

fn fail_message(err: ApiError, fallback: &str) -> String {
    match err {
        ApiError::Request { message, .. } => message,
        _ => fallback.to_string(),
    }
}

pub fn spawn_fetch_team_details(
    api: SharedApiClient,
    form_id: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = api
            .get_json(&format!("/api/form/teamDetails/{form_id}"))
            .and_then(|envelope| decode_data::<TeamStatusPayload>(envelope, "team details"));
        let event = match result {
            Ok(payload) => TeamFlowEvent::Details(Box::new(payload)),
            Err(err) => TeamFlowEvent::DetailsFailed {
                message: fail_message(err, "Failed to load team details"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

/// Browse teams with open capacity; the query is matched server-side as a
/// case-insensitive substring. The generation tag lets the screen drop
/// results that resolved out of order.
pub fn spawn_search_teams(
    api: SharedApiClient,
    form_id: String,
    query: String,
    generation: u64,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        #[derive(serde::Deserialize)]
        struct SearchPayload {
            #[serde(default)]
            teams: Vec<TeamSummary>,
        }

        let trimmed = query.trim();
        let path = if trimmed.is_empty() {
            format!("/api/form/searchTeams/{form_id}")
        } else {
            format!("/api/form/searchTeams/{form_id}?search={}", urlencode(trimmed))
        };

        let result = api
            .get_json(&path)
            .and_then(|envelope| decode_data::<SearchPayload>(envelope, "team search"));
        let event = match result {
            Ok(payload) => TeamFlowEvent::SearchResults {
                generation,
                teams: payload.teams,
            },
            // Browse failures keep the last-known-good list.
            Err(err) => {
                info!("Team search failed: {err}");
                TeamFlowEvent::SearchFailed { generation }
            }
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_create_team(
    api: SharedApiClient,
    form_id: String,
    team_name: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "formId": form_id, "teamName": team_name });
        let event = match api.post_json("/api/form/createTeam", &body) {
            Ok(envelope) if envelope.success => TeamFlowEvent::Created {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Team created".to_string()),
            },
            Ok(envelope) => TeamFlowEvent::ActionFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to create team".to_string()),
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to create team"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_send_join_request(
    api: SharedApiClient,
    form_id: String,
    team_registration_id: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({
            "formId": form_id,
            "teamRegistrationId": team_registration_id,
        });
        let event = match api.post_json("/api/form/sendJoinRequest", &body) {
            Ok(envelope) if envelope.success => TeamFlowEvent::RequestSent {
                message: "Request sent! Check your email for the team leader's decision."
                    .to_string(),
            },
            Ok(envelope) => TeamFlowEvent::ActionFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to send join request".to_string()),
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to send join request"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_rename_team(
    api: SharedApiClient,
    form_id: String,
    new_name: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RenamePayload {
            team_name: String,
        }

        let body = json!({ "formId": form_id, "newTeamName": new_name });
        let result = api
            .patch_json("/api/form/renameTeam", &body)
            .and_then(|envelope| decode_data::<RenamePayload>(envelope, "rename"));
        let event = match result {
            Ok(payload) => TeamFlowEvent::Renamed {
                team_name: payload.team_name,
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to rename team"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_leave_team(api: SharedApiClient, form_id: String) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "formId": form_id });
        let event = match api.post_json("/api/form/leaveTeam", &body) {
            Ok(envelope) if envelope.success => TeamFlowEvent::Left {
                message: envelope
                    .message
                    .unwrap_or_else(|| "You have left the team".to_string()),
            },
            Ok(envelope) => TeamFlowEvent::ActionFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to leave team".to_string()),
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to leave team"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_remove_member(
    api: SharedApiClient,
    form_id: String,
    member_email: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "formId": form_id, "memberEmail": member_email });
        let event = match api.post_json("/api/form/removeTeamMember", &body) {
            Ok(envelope) if envelope.success => TeamFlowEvent::MemberRemoved {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Member removed".to_string()),
            },
            Ok(envelope) => TeamFlowEvent::ActionFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to remove member".to_string()),
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to remove member"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

/// Re-invites are idempotent notifications server-side, so this may be
/// retried freely.
pub fn spawn_invite_member(
    api: SharedApiClient,
    form_id: String,
    invitee_email: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "formId": form_id, "inviteeEmail": invitee_email });
        let event = match api.post_json("/api/form/inviteTeamMember", &body) {
            Ok(envelope) if envelope.success => TeamFlowEvent::InviteSent {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Invitation sent".to_string()),
            },
            Ok(envelope) => TeamFlowEvent::ActionFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to send invitation".to_string()),
            },
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to send invitation"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn spawn_fetch_invite_link(
    api: SharedApiClient,
    form_id: String,
) -> Receiver<TeamFlowEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = api
            .get_json(&format!("/api/form/inviteLink/{form_id}"))
            .and_then(|envelope| decode_data::<InviteLink>(envelope, "invite link"));
        let event = match result {
            Ok(link) => TeamFlowEvent::InviteLinkReady(link),
            Err(err) => TeamFlowEvent::ActionFailed {
                message: fail_message(err, "Failed to get invite link"),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

/// Minimal percent-escaping for the search query parameter.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamMember;

    fn member(email: &str) -> TeamMember {
        TeamMember {
            email: email.into(),
            name: email.split('@').next().unwrap_or("m").into(),
            profile_image: None,
            college: None,
            year: None,
        }
    }

    fn team(leader: &str, size: u32, max: u32) -> TeamRegistration {
        let mut members = vec![member(leader)];
        for i in 1..size {
            members.push(member(&format!("m{i}@x.dev")));
        }
        TeamRegistration {
            team_registration_id: "tr1".into(),
            team_name: "FALCONS".into(),
            team_code: "FAL-123".into(),
            leader_email: leader.into(),
            members,
            team_size: size,
            min_team_size: 2,
            max_team_size: max,
            is_registration_closed: false,
            is_event_past: false,
            event_title: "Hackfest".into(),
        }
    }

    #[test]
    fn follower_may_leave_while_registration_open() {
        let team = team("lead@x.dev", 3, 4);
        assert_eq!(
            leave_action(&team, "m1@x.dev"),
            Some(LeaveAction::LeaveTeam)
        );
    }

    #[test]
    fn sole_leader_dissolves_leader_with_followers_is_blocked() {
        let solo = team("lead@x.dev", 1, 4);
        assert_eq!(
            leave_action(&solo, "lead@x.dev"),
            Some(LeaveAction::DissolveTeam)
        );

        let crowded = team("lead@x.dev", 3, 4);
        assert_eq!(leave_action(&crowded, "lead@x.dev"), None);
    }

    #[test]
    fn nothing_destructive_after_registration_closes() {
        let mut team = team("lead@x.dev", 3, 4);
        team.is_registration_closed = true;
        assert_eq!(leave_action(&team, "m1@x.dev"), None);
        assert_eq!(leave_action(&team, "lead@x.dev"), None);
        assert!(!can_rename(&team, "lead@x.dev"));
        assert!(!can_invite(&team, "lead@x.dev"));
        assert!(!can_remove_member(&team, "lead@x.dev", "m1@x.dev"));

        team.is_registration_closed = false;
        team.is_event_past = true;
        assert_eq!(leave_action(&team, "m1@x.dev"), None);
    }

    #[test]
    fn invite_requires_leader_open_registration_and_capacity() {
        let team_full = team("lead@x.dev", 4, 4);
        assert!(!can_invite(&team_full, "lead@x.dev"));

        let team_open = team("lead@x.dev", 2, 4);
        assert!(can_invite(&team_open, "lead@x.dev"));
        assert!(!can_invite(&team_open, "m1@x.dev"));
        assert_eq!(spots_remaining(&team_open), 2);
    }

    #[test]
    fn remove_is_leader_only_and_never_self() {
        let team = team("lead@x.dev", 3, 4);
        assert!(can_remove_member(&team, "lead@x.dev", "m1@x.dev"));
        assert!(!can_remove_member(&team, "lead@x.dev", "LEAD@x.dev"));
        assert!(!can_remove_member(&team, "m1@x.dev", "m2@x.dev"));
    }

    #[test]
    fn leader_email_comparison_ignores_case() {
        let team = team("Lead@X.dev", 1, 4);
        assert!(is_leader(&team, "lead@x.dev"));
        assert_eq!(
            leave_action(&team, "LEAD@x.dev"),
            Some(LeaveAction::DissolveTeam)
        );
    }

    #[test]
    fn team_name_validation_trims_and_rejects_empty() {
        assert_eq!(validate_team_name("  Falcons  ").as_deref(), Ok("Falcons"));
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name("").is_err());
    }

    #[test]
    fn rename_noop_is_case_and_whitespace_insensitive() {
        assert!(rename_is_noop("FALCONS", "falcons"));
        assert!(rename_is_noop("FALCONS", "  Falcons "));
        assert!(!rename_is_noop("FALCONS", "EAGLES"));
    }

    #[test]
    fn deep_link_toasts_map_to_notices() {
        let (kind, message) = toast_notice("joined", Some("Bina")).unwrap();
        assert_eq!(kind, NoticeKind::Success);
        assert!(message.contains("Bina"));

        let (kind, _) = toast_notice("team_full", None).unwrap();
        assert_eq!(kind, NoticeKind::Warning);

        let (_, message) = toast_notice("rejected", Some("")).unwrap();
        assert!(message.starts_with("User"));

        assert!(toast_notice("nonsense", None).is_none());
    }

    #[test]
    fn search_query_is_percent_escaped() {
        assert_eq!(urlencode("fal"), "fal");
        assert_eq!(urlencode("team two"), "team%20two");
        assert_eq!(urlencode("a&b"), "a%26b");
    }

    // The Falcons walk from the spec, over the pure state helpers: A leads
    // a fresh team, B finds it with three spots, requests, is accepted.
    #[test]
    fn create_then_accept_walkthrough() {
        let mut falcons = team("a@x.dev", 1, 4);
        assert_eq!(
            leave_action(&falcons, "a@x.dev"),
            Some(LeaveAction::DissolveTeam)
        );
        assert_eq!(spots_remaining(&falcons), 3);

        let listed = TeamSummary {
            team_registration_id: falcons.team_registration_id.clone(),
            team_name: falcons.team_name.clone(),
            leader_name: "A".into(),
            team_size: falcons.team_size,
            max_team_size: falcons.max_team_size,
            spots_remaining: spots_remaining(&falcons),
            has_pending_request: false,
        };
        assert!(listed.team_name.to_lowercase().contains("fal"));

        // B's request goes pending, then the server accepts it.
        falcons.members.push(member("b@x.dev"));
        falcons.team_size = 2;
        assert_eq!(spots_remaining(&falcons), 2);
        assert_eq!(
            leave_action(&falcons, "b@x.dev"),
            Some(LeaveAction::LeaveTeam)
        );
        // A now has a follower and can no longer leave directly.
        assert_eq!(leave_action(&falcons, "a@x.dev"), None);
    }
}
