use chrono::{DateTime, FixedOffset};
use serde::{self, Deserialize, Deserializer, Serialize};

/// Role tier attached to the logged-in account. Anything the server sends
/// that is not one of the fixed tiers is an organization-member role
/// (e.g. "SENIOR_EXECUTIVE_CREATIVE") and is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRole {
    Admin,
    Alumni,
    User,
    Member(String),
}

impl AccessRole {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "ADMIN" => AccessRole::Admin,
            "ALUMNI" => AccessRole::Alumni,
            "USER" => AccessRole::User,
            other => AccessRole::Member(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            AccessRole::Admin => "ADMIN",
            AccessRole::Alumni => "ALUMNI",
            AccessRole::User => "USER",
            AccessRole::Member(raw) => raw.as_str(),
        }
    }

    /// Members of the organization (anything but the base USER tier and
    /// ADMIN) register through their team, not the public form.
    pub fn is_org_member(&self) -> bool {
        !matches!(self, AccessRole::Admin | AccessRole::User)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AccessRole::Admin)
    }
}

impl<'de> Deserialize<'de> for AccessRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(AccessRole::from_wire(&raw))
    }
}

impl Serialize for AccessRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

/// In-memory session. Rebuilt from the profile endpoint on startup when a
/// durable token exists; only the token survives a restart.
#[derive(Debug, Clone)]
pub struct Session {
    pub profile: UserProfile,
    pub access: AccessRole,
    pub token: String,
    pub expires_at: Option<DateTime<chrono::Utc>>,
    pub registered_form_ids: Vec<String>,
}

impl Session {
    /// Expiry is informational only. An expired token is not refreshed or
    /// rejected client-side; the next API call fails instead.
    pub fn is_expired(&self, now: DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_registered_for(&self, form_id: &str) -> bool {
        self.registered_form_ids.iter().any(|id| id == form_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub user: LoginUser,
    pub token: String,
    #[serde(default)]
    pub expires_in_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub access: AccessRole,
    #[serde(default)]
    pub reg_form: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ParticipationType {
    Individual,
    Team,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub event_title: String,
    #[serde(default, deserialize_with = "from_opt_datetime")]
    pub event_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub event_location: Option<String>,
    /// When registration opens. Absent means already open.
    #[serde(default, deserialize_with = "from_opt_datetime")]
    pub registration_opens_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub is_registration_closed: bool,
    #[serde(default)]
    pub is_event_past: bool,
    #[serde(default, deserialize_with = "from_opt_related_event")]
    pub related_event: Option<String>,
    #[serde(default)]
    pub min_team_size: Option<u32>,
    #[serde(default)]
    pub max_team_size: Option<u32>,
    #[serde(default = "default_participation_type")]
    pub participation_type: ParticipationType,
}

fn default_participation_type() -> ParticipationType {
    ParticipationType::Individual
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventForm {
    pub id: String,
    pub info: EventInfo,
    #[serde(default)]
    pub sections: Vec<FormSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRegistration {
    pub team_registration_id: String,
    pub team_name: String,
    pub team_code: String,
    pub leader_email: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    pub team_size: u32,
    #[serde(default = "default_min_team_size")]
    pub min_team_size: u32,
    pub max_team_size: u32,
    #[serde(default)]
    pub is_registration_closed: bool,
    #[serde(default)]
    pub is_event_past: bool,
    #[serde(default)]
    pub event_title: String,
}

fn default_min_team_size() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamlessInfo {
    pub is_teamless: bool,
    #[serde(default)]
    pub event_title: String,
    #[serde(default = "default_max_team_size")]
    pub max_team_size: u32,
}

fn default_max_team_size() -> u32 {
    1
}

/// The teamDetails endpoint answers with either the caller's team or a
/// teamless marker carrying just enough to render the create/browse view.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TeamStatusPayload {
    Member(Box<TeamRegistration>),
    Teamless(TeamlessInfo),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team_registration_id: String,
    pub team_name: String,
    #[serde(default)]
    pub leader_name: String,
    pub team_size: u32,
    pub max_team_size: u32,
    #[serde(default)]
    pub spots_remaining: u32,
    #[serde(default)]
    pub has_pending_request: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum JoinRequestStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED", alias = "AUTO_EXPIRED")]
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestUpdate {
    #[serde(default)]
    pub team_name: Option<String>,
    pub status: JoinRequestStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteLink {
    pub invite_link: String,
    #[serde(default)]
    pub share_text: String,
}

/// One positioned label on the certificate template. Coordinates are
/// percentages of the rendered template, not pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateField {
    pub field_name: String,
    pub x: f32,
    pub y: f32,
    pub font_size: u32,
    pub font_color: String,
    #[serde(default)]
    pub locked: bool,
}

fn from_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    if let Some(s) = opt {
        let dt = DateTime::parse_from_rfc3339(&s).map_err(serde::de::Error::custom)?;
        Ok(Some(dt))
    } else {
        Ok(None)
    }
}

/// The backend stores "no related event" as the literal string "null".
fn from_opt_related_event<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.trim().is_empty() && s != "null"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_role_round_trips_known_and_member_tiers() {
        assert_eq!(AccessRole::from_wire("ADMIN"), AccessRole::Admin);
        assert_eq!(AccessRole::from_wire("USER"), AccessRole::User);
        let role = AccessRole::from_wire("SENIOR_EXECUTIVE_CREATIVE");
        assert_eq!(role.as_wire(), "SENIOR_EXECUTIVE_CREATIVE");
        assert!(role.is_org_member());
        assert!(AccessRole::Alumni.is_org_member());
        assert!(!AccessRole::Admin.is_org_member());
        assert!(!AccessRole::User.is_org_member());
    }

    #[test]
    fn team_status_payload_distinguishes_member_from_teamless() {
        let teamless: TeamStatusPayload = serde_json::from_str(
            r#"{"isTeamless": true, "eventTitle": "Hackfest", "maxTeamSize": 4}"#,
        )
        .unwrap();
        assert!(matches!(
            teamless,
            TeamStatusPayload::Teamless(TeamlessInfo { is_teamless: true, .. })
        ));

        let bare: TeamlessInfo = serde_json::from_str(r#"{"isTeamless": true}"#).unwrap();
        assert_eq!(bare.max_team_size, 1);

        let member: TeamStatusPayload = serde_json::from_str(
            r#"{
                "teamRegistrationId": "tr1",
                "teamName": "FALCONS",
                "teamCode": "FAL-123",
                "leaderEmail": "a@x.dev",
                "members": [{"email": "a@x.dev", "name": "A"}],
                "teamSize": 1,
                "maxTeamSize": 4
            }"#,
        )
        .unwrap();
        match member {
            TeamStatusPayload::Member(team) => {
                assert_eq!(team.team_name, "FALCONS");
                assert_eq!(team.min_team_size, 1);
                assert!(!team.is_registration_closed);
            }
            other => panic!("expected member payload, got {other:?}"),
        }
    }

    #[test]
    fn related_event_null_string_is_none() {
        let info: EventInfo =
            serde_json::from_str(r#"{"eventTitle": "E", "relatedEvent": "null"}"#).unwrap();
        assert_eq!(info.related_event, None);

        let info: EventInfo =
            serde_json::from_str(r#"{"eventTitle": "E", "relatedEvent": "form42"}"#).unwrap();
        assert_eq!(info.related_event.as_deref(), Some("form42"));
    }

    #[test]
    fn join_request_status_maps_auto_expired_and_unknown() {
        let update: JoinRequestUpdate =
            serde_json::from_str(r#"{"teamName": "T", "status": "AUTO_EXPIRED"}"#).unwrap();
        assert_eq!(update.status, JoinRequestStatus::Expired);

        let update: JoinRequestUpdate =
            serde_json::from_str(r#"{"status": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(update.status, JoinRequestStatus::Unknown);
    }

    #[test]
    fn session_expiry_is_computed_not_enforced() {
        let session = Session {
            profile: UserProfile {
                name: "A".into(),
                email: "a@x.dev".into(),
                img: None,
                college: None,
                year: None,
            },
            access: AccessRole::User,
            token: "tok".into(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::seconds(1)),
            registered_form_ids: vec!["f1".into()],
        };
        assert!(session.is_expired(chrono::Utc::now()));
        assert!(session.is_registered_for("f1"));
        assert!(!session.is_registered_for("f2"));
    }
}
