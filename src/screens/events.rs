use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;

use eframe::egui;

use crate::models::EventForm;
use crate::services::api_client::{SharedApiClient, decode_data};

pub enum EventsAction {
    Stay,
    Open(String),
}

enum EventsEvent {
    Loaded(Vec<EventForm>),
    Failed { message: String },
}

#[derive(Default)]
struct EventsUiState {
    receiver: Option<Receiver<EventsEvent>>,
    events: Vec<EventForm>,
    fetched: bool,
    error: Option<String>,
}

static EVENTS_STATE: OnceLock<Mutex<EventsUiState>> = OnceLock::new();

fn events_state() -> &'static Mutex<EventsUiState> {
    EVENTS_STATE.get_or_init(|| Mutex::new(EventsUiState::default()))
}

/// Lists are fetched per visit, never cached across navigations.
pub fn teardown() {
    let mut state = events_state().lock().expect("events state lock poisoned");
    *state = EventsUiState::default();
}

fn spawn_fetch_events(api: SharedApiClient) -> Receiver<EventsEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        #[derive(serde::Deserialize)]
        struct EventsPayload {
            #[serde(default)]
            events: Vec<EventForm>,
        }

        let result = api
            .get_json("/api/form/getAllForms")
            .and_then(|envelope| decode_data::<EventsPayload>(envelope, "events"));
        let event = match result {
            Ok(payload) => EventsEvent::Loaded(payload.events),
            Err(err) => EventsEvent::Failed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

pub fn ui(ui: &mut egui::Ui, api: &SharedApiClient) -> EventsAction {
    let mut state = events_state().lock().expect("events state lock poisoned");

    if !state.fetched && state.receiver.is_none() {
        state.fetched = true;
        state.error = None;
        state.receiver = Some(spawn_fetch_events(api.clone()));
    }

    if let Some(rx) = &state.receiver {
        match rx.try_recv() {
            Ok(EventsEvent::Loaded(events)) => {
                state.events = events;
                state.receiver = None;
            }
            Ok(EventsEvent::Failed { message }) => {
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

    ui.heading("Events");
    ui.add_space(12.0);

    if state.receiver.is_some() {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Loading events...");
        });
        return EventsAction::Stay;
    }

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::LIGHT_RED, error);
        ui.add_space(8.0);
        if ui.button("Retry").clicked() {
            state.fetched = false;
        }
        return EventsAction::Stay;
    }

    if state.events.is_empty() {
        ui.label("No ongoing events right now.");
        return EventsAction::Stay;
    }

    let mut action = EventsAction::Stay;
    egui::ScrollArea::vertical().show(ui, |ui| {
        for event in &state.events {
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.label(egui::RichText::new(&event.info.event_title).strong());
                        if let Some(date) = event.info.event_date {
                            ui.label(date.format("%B %e, %Y").to_string());
                        }
                        if let Some(location) = &event.info.event_location {
                            ui.label(location);
                        }
                    });
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("View").clicked() {
                            action = EventsAction::Open(event.id.clone());
                        }
                    });
                });
            });
            ui.add_space(6.0);
        }
    });

    action
}
