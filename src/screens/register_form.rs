use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;

use eframe::egui;
use serde_json::json;

use crate::models::{EventForm, FormSection};
use crate::services::api_client::{SharedApiClient, decode_data};
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::session::SessionStore;

pub enum RegisterFormAction {
    Stay,
    Back,
    Registered,
}

enum FormEvent {
    Loaded(Box<EventForm>),
    LoadFailed { message: String },
    Submitted { message: String },
    SubmitFailed { message: String },
}

#[derive(Default)]
struct RegisterFormUiState {
    event_id: Option<String>,
    fetch_rx: Option<Receiver<FormEvent>>,
    submit_rx: Option<Receiver<FormEvent>>,
    form: Option<EventForm>,
    // Keyed by (section index, field name); forms are small.
    values: HashMap<(usize, String), String>,
    error: Option<String>,
}

static FORM_STATE: OnceLock<Mutex<RegisterFormUiState>> = OnceLock::new();

fn form_state() -> &'static Mutex<RegisterFormUiState> {
    FORM_STATE.get_or_init(|| Mutex::new(RegisterFormUiState::default()))
}

pub fn teardown() {
    let mut state = form_state().lock().expect("register form lock poisoned");
    *state = RegisterFormUiState::default();
}

fn spawn_fetch_form(api: SharedApiClient, event_id: String) -> Receiver<FormEvent> {
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
            Ok(payload) => FormEvent::Loaded(Box::new(payload.events)),
            Err(err) => FormEvent::LoadFailed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

fn spawn_submit(
    api: SharedApiClient,
    form_id: String,
    responses: Vec<serde_json::Value>,
) -> Receiver<FormEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let body = json!({ "formId": form_id, "responses": responses });
        let event = match api.post_json("/api/form/submitForm", &body) {
            Ok(envelope) if envelope.success => FormEvent::Submitted {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Registration submitted".to_string()),
            },
            Ok(envelope) => FormEvent::SubmitFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to submit registration".to_string()),
            },
            Err(err) => FormEvent::SubmitFailed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

/// Required fields must be non-empty before anything leaves the client.
fn missing_required(
    sections: &[FormSection],
    values: &HashMap<(usize, String), String>,
) -> Vec<String> {
    let mut missing = Vec::new();
    for (section_index, section) in sections.iter().enumerate() {
        for field in &section.fields {
            if !field.is_required {
                continue;
            }
            let filled = values
                .get(&(section_index, field.name.clone()))
                .is_some_and(|v| !v.trim().is_empty());
            if !filled {
                missing.push(field.name.clone());
            }
        }
    }
    missing
}

pub fn ui(
    ui: &mut egui::Ui,
    event_id: &str,
    api: &SharedApiClient,
    session: &SessionStore,
    notices: &mut NoticeCenter,
) -> RegisterFormAction {
    let mut state = form_state().lock().expect("register form lock poisoned");

    if state.event_id.as_deref() != Some(event_id) {
        *state = RegisterFormUiState {
            event_id: Some(event_id.to_string()),
            fetch_rx: Some(spawn_fetch_form(api.clone(), event_id.to_string())),
            ..Default::default()
        };
    }

    if let Some(rx) = &state.fetch_rx {
        match rx.try_recv() {
            Ok(FormEvent::Loaded(form)) => {
                state.form = Some(*form);
                state.fetch_rx = None;
            }
            Ok(FormEvent::LoadFailed { message }) => {
                state.error = Some(message);
                state.fetch_rx = None;
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.error = Some("Form fetch worker disconnected".to_string());
                state.fetch_rx = None;
            }
        }
    }

    let mut submitted = false;
    if let Some(rx) = &state.submit_rx {
        match rx.try_recv() {
            Ok(FormEvent::Submitted { message }) => {
                state.submit_rx = None;
                session.mark_registered(event_id);
                notices.push(NoticeKind::Success, message);
                submitted = true;
            }
            Ok(FormEvent::SubmitFailed { message }) => {
                state.submit_rx = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.submit_rx = None;
                notices.push(NoticeKind::Error, "Submit worker disconnected");
            }
        }
    }
    if submitted {
        return RegisterFormAction::Registered;
    }

    if ui.button("< Back to Event").clicked() {
        return RegisterFormAction::Back;
    }
    ui.add_space(8.0);

    // A revisit after submitting has nothing to offer.
    if session
        .snapshot()
        .is_some_and(|s| s.is_registered_for(event_id))
    {
        ui.label("You're already registered for this event.");
        return RegisterFormAction::Stay;
    }

    if state.fetch_rx.is_some() {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Loading form...");
        });
        return RegisterFormAction::Stay;
    }

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::LIGHT_RED, error);
        return RegisterFormAction::Stay;
    }

    let Some(form) = state.form.clone() else {
        ui.label("Event form not found.");
        return RegisterFormAction::Stay;
    };

    ui.heading(format!("Register: {}", form.info.event_title));
    ui.add_space(12.0);

    let submitting = state.submit_rx.is_some();
    egui::ScrollArea::vertical().show(ui, |ui| {
        for (section_index, section) in form.sections.iter().enumerate() {
            if !section.name.trim().is_empty() {
                ui.label(egui::RichText::new(&section.name).strong());
                ui.add_space(4.0);
            }
            for field in &section.fields {
                let key = (section_index, field.name.clone());
                let value = state.values.entry(key).or_default();
                let label = if field.is_required {
                    format!("{} *", field.name)
                } else {
                    field.name.clone()
                };
                ui.label(label);
                if field.options.is_empty() {
                    ui.add_enabled(!submitting, egui::TextEdit::singleline(value));
                } else {
                    let id = ui.make_persistent_id((section_index, &field.name));
                    egui::ComboBox::from_id_salt(id)
                        .selected_text(if value.is_empty() {
                            "Select...".to_string()
                        } else {
                            value.clone()
                        })
                        .show_ui(ui, |ui| {
                            for option in &field.options {
                                ui.selectable_value(value, option.clone(), option);
                            }
                        });
                }
                ui.add_space(6.0);
            }
            ui.add_space(8.0);
        }
    });

    if ui
        .add_enabled(!submitting, egui::Button::new("Submit Registration"))
        .clicked()
    {
        let missing = missing_required(&form.sections, &state.values);
        if missing.is_empty() {
            let responses: Vec<serde_json::Value> = form
                .sections
                .iter()
                .enumerate()
                .flat_map(|(section_index, section)| {
                    let values = &state.values;
                    section.fields.iter().map(move |field| {
                        let value = values
                            .get(&(section_index, field.name.clone()))
                            .cloned()
                            .unwrap_or_default();
                        json!({
                            "section": section.name,
                            "field": field.name,
                            "value": value,
                        })
                    })
                })
                .collect();
            state.submit_rx = Some(spawn_submit(api.clone(), event_id.to_string(), responses));
            ui.ctx().request_repaint();
        } else {
            notices.push(
                NoticeKind::Error,
                format!("Please fill in: {}", missing.join(", ")),
            );
        }
    }

    if submitting {
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Submitting...");
        });
    }

    RegisterFormAction::Stay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormField;

    fn field(name: &str, required: bool) -> FormField {
        FormField {
            name: name.to_string(),
            field_type: "text".to_string(),
            is_required: required,
            options: Vec::new(),
        }
    }

    #[test]
    fn missing_required_flags_empty_and_whitespace_values() {
        let sections = vec![FormSection {
            name: "About".into(),
            fields: vec![field("Name", true), field("Nickname", false), field("Email", true)],
        }];
        let mut values = HashMap::new();
        values.insert((0usize, "Name".to_string()), "  ".to_string());

        let missing = missing_required(&sections, &values);
        assert_eq!(missing, vec!["Name".to_string(), "Email".to_string()]);

        values.insert((0, "Name".to_string()), "Ada".to_string());
        values.insert((0, "Email".to_string()), "ada@x.dev".to_string());
        assert!(missing_required(&sections, &values).is_empty());
    }
}
