use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;

use eframe::egui;
use serde_json::json;
use tracing::info;

use crate::models::LoginPayload;
use crate::services::api_client::SharedApiClient;
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::session::{SessionStore, decode_login_payload};

pub enum LoginAction {
    Stay,
    LoggedIn,
}

enum LoginEvent {
    Success(Box<LoginPayload>),
    Failed { message: String },
}

#[derive(Default)]
struct LoginUiState {
    email: String,
    password: String,
    receiver: Option<Receiver<LoginEvent>>,
}

static LOGIN_STATE: OnceLock<Mutex<LoginUiState>> = OnceLock::new();

fn login_state() -> &'static Mutex<LoginUiState> {
    LOGIN_STATE.get_or_init(|| Mutex::new(LoginUiState::default()))
}

pub fn teardown() {
    let mut state = login_state().lock().expect("login state lock poisoned");
    *state = LoginUiState::default();
}

fn spawn_login(api: SharedApiClient, email: String, password: String) -> Receiver<LoginEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "email": email, "password": password });
        let result = api
            .post_json("/api/auth/login", &body)
            .and_then(decode_login_payload);
        let event = match result {
            Ok(payload) => LoginEvent::Success(Box::new(payload)),
            Err(err) => LoginEvent::Failed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

fn validate_credentials(email: &str, password: &str) -> Result<(), String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err("Email and password are required".to_string());
    }
    if !email.contains('@') {
        return Err("Enter a valid email address".to_string());
    }
    Ok(())
}

pub fn ui(
    ui: &mut egui::Ui,
    api: &SharedApiClient,
    session: &SessionStore,
    notices: &mut NoticeCenter,
) -> LoginAction {
    let mut state = login_state().lock().expect("login state lock poisoned");

    if state.receiver.is_some() {
        let event = state
            .receiver
            .as_ref()
            .map(|rx| rx.try_recv())
            .unwrap_or(Err(TryRecvError::Disconnected));
        match event {
            Ok(LoginEvent::Success(payload)) => {
                state.receiver = None;
                info!("Logged in as {}", payload.user.profile.email);
                session.login(payload.user, payload.token, payload.expires_in_ms);
                notices.push(NoticeKind::Success, "Logged in");
                state.password.clear();
                return LoginAction::LoggedIn;
            }
            Ok(LoginEvent::Failed { message }) => {
                state.receiver = None;
                notices.push(NoticeKind::Error, message);
            }
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.receiver = None;
                notices.push(NoticeKind::Error, "Login worker disconnected");
            }
        }
    }

    let in_flight = state.receiver.is_some();

    ui.heading("Sign in");
    ui.add_space(12.0);

    ui.label("Email");
    ui.add_enabled(
        !in_flight,
        egui::TextEdit::singleline(&mut state.email).hint_text("you@college.edu"),
    );
    ui.add_space(6.0);

    ui.label("Password");
    let password_response = ui.add_enabled(
        !in_flight,
        egui::TextEdit::singleline(&mut state.password).password(true),
    );
    ui.add_space(12.0);

    let submit_via_enter =
        password_response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
    let submit_via_button = ui
        .add_enabled(!in_flight, egui::Button::new("Log in"))
        .clicked();

    if (submit_via_button || submit_via_enter) && !in_flight {
        match validate_credentials(&state.email, &state.password) {
            Ok(()) => {
                state.receiver = Some(spawn_login(
                    api.clone(),
                    state.email.trim().to_string(),
                    state.password.clone(),
                ));
                ui.ctx().request_repaint();
            }
            Err(message) => notices.push(NoticeKind::Error, message),
        }
    }

    if in_flight {
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Signing in...");
        });
    }

    LoginAction::Stay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_validated_before_any_request() {
        assert!(validate_credentials("", "pw").is_err());
        assert!(validate_credentials("a@x.dev", "").is_err());
        assert!(validate_credentials("not-an-email", "pw").is_err());
        assert!(validate_credentials("a@x.dev", "pw").is_ok());
    }
}
