use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use tracing::{info, warn};

use crate::models::{LoginPayload, LoginUser, Session, UserProfile};
use crate::services::api_client::{SharedApiClient, decode_data};

pub enum SessionEvent {
    Restored(Box<Session>),
    RestoreFailed { message: String },
}

/// Process-wide auth state. Cloning shares the same session; only
/// login/update/logout write, every screen reads. The token is mirrored to
/// a file so a restart can rebuild the session from the profile endpoint.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Option<Session>>>,
    token_path: PathBuf,
    api: SharedApiClient,
}

impl SessionStore {
    pub fn new(api: SharedApiClient, token_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            token_path,
            api,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().expect("session lock poisoned").is_some()
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.inner.lock().expect("session lock poisoned").clone()
    }

    /// Establish a fresh session from a login response and persist the
    /// token for the next run.
    pub fn login(&self, user: LoginUser, token: String, expires_in_ms: Option<i64>) {
        let expires_at = expires_in_ms.map(|ms| Utc::now() + chrono::Duration::milliseconds(ms));
        let session = Session {
            profile: user.profile,
            access: user.access,
            token: token.clone(),
            expires_at,
            registered_form_ids: user.reg_form,
        };
        self.api.set_token(Some(token.clone()));
        self.install(session);
        persist_token(&self.token_path, &token);
    }

    fn install(&self, session: Session) {
        let mut slot = self.inner.lock().expect("session lock poisoned");
        *slot = Some(session);
    }

    /// Replace profile fields without re-authenticating. Token and expiry
    /// are untouched.
    pub fn update_profile(&self, profile: UserProfile) {
        let mut slot = self.inner.lock().expect("session lock poisoned");
        if let Some(session) = slot.as_mut() {
            session.profile = profile;
        } else {
            warn!("Profile update with no active session, ignoring");
        }
    }

    /// Record a newly submitted registration so button derivation sees it
    /// without a full profile re-fetch.
    pub fn mark_registered(&self, form_id: &str) {
        let mut slot = self.inner.lock().expect("session lock poisoned");
        if let Some(session) = slot.as_mut()
            && !session.registered_form_ids.iter().any(|id| id == form_id)
        {
            session.registered_form_ids.push(form_id.to_string());
        }
    }

    pub fn logout(&self) {
        let mut slot = self.inner.lock().expect("session lock poisoned");
        *slot = None;
        drop(slot);
        self.api.set_token(None);
        if self.token_path.exists()
            && let Err(err) = fs::remove_file(&self.token_path)
        {
            warn!("Failed to remove token file: {err}");
        }
        info!("Session cleared");
    }

    /// Accept a session rebuilt by the restore worker. If a manual login
    /// won the race while the restore was in flight, its token and
    /// registrations are fresher than the restored ones; keep them and
    /// take only the profile fields.
    pub fn adopt_restored(&self, session: Session) {
        if self.is_logged_in() {
            self.update_profile(session.profile);
            return;
        }
        self.api.set_token(Some(session.token.clone()));
        self.install(session);
    }
}

pub fn read_durable_token(token_path: &Path) -> Option<String> {
    let raw = fs::read_to_string(token_path).ok()?;
    let token = raw.trim().to_string();
    if token.is_empty() { None } else { Some(token) }
}

fn persist_token(token_path: &Path, token: &str) {
    if let Some(parent) = token_path.parent()
        && let Err(err) = fs::create_dir_all(parent)
    {
        warn!("Failed to create token dir: {err}");
        return;
    }
    if let Err(err) = fs::write(token_path, token) {
        warn!("Failed to persist token: {err}");
    }
}

/// Bootstrap: turn a durable token back into a full session by asking the
/// profile endpoint who we are. Runs off-thread; the app drains the
/// receiver during its first frames.
pub fn spawn_session_restore(api: SharedApiClient, token: String) -> Receiver<SessionEvent> {
    let (tx, rx) = mpsc::channel::<SessionEvent>();

    thread::spawn(move || {
        api.set_token(Some(token.clone()));
        let result = api
            .get_json("/api/user/fetchProfile")
            .and_then(|envelope| decode_data::<LoginUser>(envelope, "profile"));

        match result {
            Ok(user) => {
                info!("Session restored for {}", user.profile.email);
                let session = Session {
                    profile: user.profile,
                    access: user.access,
                    token,
                    expires_at: None,
                    registered_form_ids: user.reg_form,
                };
                let _ = tx.send(SessionEvent::Restored(Box::new(session)));
            }
            Err(err) => {
                // Stale or revoked token; drop it and start logged out.
                api.set_token(None);
                let _ = tx.send(SessionEvent::RestoreFailed {
                    message: err.to_string(),
                });
            }
        }
    });

    rx
}

/// Decode the auth endpoint's response into the pieces `login` needs.
pub fn decode_login_payload(
    envelope: crate::services::api_client::ApiEnvelope,
) -> Result<LoginPayload, crate::services::api_client::ApiError> {
    decode_data::<LoginPayload>(envelope, "login response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccessRole;
    use crate::services::api_client::ApiClient;

    fn test_store(dir: &Path) -> SessionStore {
        let api = Arc::new(ApiClient::new("http://localhost:0").expect("client"));
        SessionStore::new(api, dir.join("token"))
    }

    fn login_user(email: &str) -> LoginUser {
        LoginUser {
            profile: UserProfile {
                name: "Test".into(),
                email: email.into(),
                img: None,
                college: None,
                year: None,
            },
            access: AccessRole::User,
            reg_form: vec![],
        }
    }

    #[test]
    fn login_persists_token_and_logout_removes_it() {
        let dir = std::env::temp_dir().join(format!("tessera-test-{}", std::process::id()));
        let store = test_store(&dir);

        store.login(login_user("a@x.dev"), "tok-123".into(), Some(60_000));
        assert!(store.is_logged_in());
        assert_eq!(read_durable_token(&dir.join("token")).as_deref(), Some("tok-123"));

        let session = store.snapshot().unwrap();
        assert!(session.expires_at.is_some());
        assert!(!session.is_expired(Utc::now()));

        store.logout();
        assert!(!store.is_logged_in());
        assert_eq!(read_durable_token(&dir.join("token")), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn restore_losing_the_race_keeps_the_manual_login_token() {
        let dir = std::env::temp_dir().join(format!("tessera-test-race-{}", std::process::id()));
        let store = test_store(&dir);
        let mut user = login_user("a@x.dev");
        user.reg_form = vec!["f1".into()];
        store.login(user, "fresh-token".into(), None);

        // A restore that resolves late carries the previous run's token.
        store.adopt_restored(Session {
            profile: UserProfile {
                name: "Synced Name".into(),
                email: "a@x.dev".into(),
                img: None,
                college: Some("KIIT".into()),
                year: None,
            },
            access: AccessRole::User,
            token: "stale-token".into(),
            expires_at: None,
            registered_form_ids: vec!["f9".into()],
        });

        let session = store.snapshot().unwrap();
        assert_eq!(session.token, "fresh-token");
        assert_eq!(session.registered_form_ids, vec!["f1"]);
        assert_eq!(session.profile.name, "Synced Name");
        assert_eq!(session.profile.college.as_deref(), Some("KIIT"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_profile_keeps_token_and_registrations() {
        let dir = std::env::temp_dir().join(format!("tessera-test-upd-{}", std::process::id()));
        let store = test_store(&dir);
        let mut user = login_user("a@x.dev");
        user.reg_form = vec!["f1".into()];
        store.login(user, "tok".into(), None);

        store.update_profile(UserProfile {
            name: "Renamed".into(),
            email: "a@x.dev".into(),
            img: None,
            college: Some("KIIT".into()),
            year: None,
        });
        store.mark_registered("f2");
        store.mark_registered("f2");

        let session = store.snapshot().unwrap();
        assert_eq!(session.profile.name, "Renamed");
        assert_eq!(session.token, "tok");
        assert_eq!(session.registered_form_ids, vec!["f1", "f2"]);

        let _ = fs::remove_dir_all(&dir);
    }
}
