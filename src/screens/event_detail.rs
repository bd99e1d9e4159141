use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use eframe::egui;

use crate::models::{EventForm, ParticipationType};
use crate::services::api_client::{SharedApiClient, decode_data};
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::registration::{RegistrationButton, derive_registration_button};
use crate::services::session::SessionStore;

pub enum EventDetailAction {
    Stay,
    Back,
    OpenForm(String),
    OpenTeam(String),
}

enum DetailEvent {
    Loaded(Box<EventForm>),
    Failed { message: String },
}

#[derive(Default)]
struct EventDetailUiState {
    event_id: Option<String>,
    receiver: Option<Receiver<DetailEvent>>,
    event: Option<EventForm>,
    error: Option<String>,
}

static DETAIL_STATE: OnceLock<Mutex<EventDetailUiState>> = OnceLock::new();

fn detail_state() -> &'static Mutex<EventDetailUiState> {
    DETAIL_STATE.get_or_init(|| Mutex::new(EventDetailUiState::default()))
}

pub fn teardown() {
    let mut state = detail_state().lock().expect("event detail lock poisoned");
    *state = EventDetailUiState::default();
}

fn spawn_fetch_event(api: SharedApiClient, event_id: String) -> Receiver<DetailEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        #[derive(serde::Deserialize)]
        struct EventPayload {
            events: EventForm,
        }

        let result = api
            .get_json(&format!("/api/form/getAllForms?id={event_id}"))
            .and_then(|envelope| decode_data::<EventPayload>(envelope, "event form"));
        let event = match result {
            Ok(payload) => DetailEvent::Loaded(Box::new(payload.events)),
            Err(err) => DetailEvent::Failed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn ui(
    ui: &mut egui::Ui,
    event_id: &str,
    api: &SharedApiClient,
    session: &SessionStore,
    notices: &mut NoticeCenter,
) -> EventDetailAction {
    let mut state = detail_state().lock().expect("event detail lock poisoned");

    // A different event id means a fresh view; drop anything stale.
    if state.event_id.as_deref() != Some(event_id) {
        *state = EventDetailUiState {
            event_id: Some(event_id.to_string()),
            receiver: Some(spawn_fetch_event(api.clone(), event_id.to_string())),
            ..Default::default()
        };
    }

    if let Some(rx) = &state.receiver {
        match rx.try_recv() {
            Ok(DetailEvent::Loaded(event)) => {
                state.event = Some(*event);
                state.receiver = None;
            }
            Ok(DetailEvent::Failed { message }) => {
                state.error = Some(message);
                state.receiver = None;
            }
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.error = Some("Event fetch worker disconnected".to_string());
                state.receiver = None;
            }
        }
    }

    if ui.button("< Back to Events").clicked() {
        return EventDetailAction::Back;
    }
    ui.add_space(8.0);

    if state.receiver.is_some() {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Loading event...");
        });
        return EventDetailAction::Stay;
    }

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::LIGHT_RED, error);
        return EventDetailAction::Stay;
    }

    let Some(event) = &state.event else {
        return EventDetailAction::Stay;
    };

    ui.heading(&event.info.event_title);
    if let Some(date) = event.info.event_date {
        ui.label(date.format("%B %e, %Y at %l:%M %p").to_string());
    }
    if let Some(location) = &event.info.event_location {
        ui.label(location);
    }
    if event.info.participation_type == ParticipationType::Team {
        let min = event.info.min_team_size.unwrap_or(1);
        let max = event.info.max_team_size.unwrap_or(min);
        ui.label(format!("Team event · {min}-{max} members"));
    }
    ui.add_space(12.0);

    let session_snapshot = session.snapshot();
    let role = session_snapshot.as_ref().map(|s| &s.access);
    let registered: &[String] = session_snapshot
        .as_ref()
        .map(|s| s.registered_form_ids.as_slice())
        .unwrap_or(&[]);
    let button = derive_registration_button(role, &event.info, registered, &event.id, Utc::now());

    if button.tracks_clock() {
        // Keep the pending-window state moving; Locked flips to open at
        // the boundary just like the countdown does.
        ui.ctx().request_repaint_after(Duration::from_secs(1));
    }

    let mut action = EventDetailAction::Stay;
    ui.horizontal(|ui| {
        let clicked = ui
            .add_enabled(button.is_actionable(), egui::Button::new(button.label()))
            .clicked();
        if clicked {
            action = EventDetailAction::OpenForm(event.id.clone());
        }

        match &button {
            RegistrationButton::AlreadyMember => {
                ui.label("Team members register through their team.");
            }
            RegistrationButton::AlreadyRegistered
                if event.info.participation_type == ParticipationType::Team =>
            {
                if ui.button("Manage Team").clicked() {
                    if session_snapshot.is_some() {
                        action = EventDetailAction::OpenTeam(event.id.clone());
                    } else {
                        notices.push(NoticeKind::Info, "Please log in first to access this page.");
                    }
                }
            }
            _ => {}
        }
    });

    action
}
