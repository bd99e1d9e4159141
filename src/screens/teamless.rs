use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use eframe::egui;

use crate::models::{TeamSummary, TeamlessInfo};
use crate::services::api_client::SharedApiClient;
use crate::services::config_loader::TesseraConfig;
use crate::services::join_poller::{JoinPollEvent, JoinRequestPoller};
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::team_flow::{
    self, TeamFlowEvent, spawn_create_team, spawn_search_teams, spawn_send_join_request,
};

pub enum TeamlessAction {
    Stay,
    /// The caller's team status changed (team created or join request
    /// accepted); the parent screen should refetch team details.
    TeamChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Browse,
    Create,
}

struct TeamlessUiState {
    form_id: Option<String>,
    tab: Tab,
    search_query: String,
    // Debounce clock: set on every edit, consumed once it has aged past
    // the configured quiet window.
    last_edit: Option<Instant>,
    generation: u64,
    applied_generation: u64,
    search_rx: Option<Receiver<TeamFlowEvent>>,
    teams: Vec<TeamSummary>,
    searched_once: bool,
    create_name: String,
    create_rx: Option<Receiver<TeamFlowEvent>>,
    // Which team a join request is currently in flight for.
    sending_for: Option<String>,
    request_rx: Option<Receiver<TeamFlowEvent>>,
    poller: Option<JoinRequestPoller>,
}

impl Default for TeamlessUiState {
    fn default() -> Self {
        Self {
            form_id: None,
            tab: Tab::Browse,
            search_query: String::new(),
            last_edit: None,
            generation: 0,
            applied_generation: 0,
            search_rx: None,
            teams: Vec::new(),
            searched_once: false,
            create_name: String::new(),
            create_rx: None,
            sending_for: None,
            request_rx: None,
            poller: None,
        }
    }
}

static TEAMLESS_STATE: OnceLock<Mutex<TeamlessUiState>> = OnceLock::new();

fn teamless_state() -> &'static Mutex<TeamlessUiState> {
    TEAMLESS_STATE.get_or_init(|| Mutex::new(TeamlessUiState::default()))
}

/// Dropping the state also drops the poller, which stops its thread.
pub fn teardown() {
    let mut state = teamless_state().lock().expect("teamless state lock poisoned");
    *state = TeamlessUiState::default();
}

/// A team materializing locally ends the teamless flow, so the join-request
/// poller must die with it; polling only runs while the caller has no team.
fn apply_create_event(
    state: &mut TeamlessUiState,
    event: TeamFlowEvent,
    notices: &mut NoticeCenter,
) -> bool {
    match event {
        TeamFlowEvent::Created { message } => {
            state.create_rx = None;
            state.poller = None;
            notices.push(NoticeKind::Success, message);
            true
        }
        TeamFlowEvent::ActionFailed { message } => {
            state.create_rx = None;
            notices.push(NoticeKind::Error, message);
            false
        }
        _ => false,
    }
}

fn start_search(state: &mut TeamlessUiState, api: &SharedApiClient, form_id: &str) {
    state.generation += 1;
    state.search_rx = Some(spawn_search_teams(
        api.clone(),
        form_id.to_string(),
        state.search_query.clone(),
        state.generation,
    ));
}

pub fn ui(
    ui: &mut egui::Ui,
    form_id: &str,
    info: &TeamlessInfo,
    api: &SharedApiClient,
    config: &TesseraConfig,
    notices: &mut NoticeCenter,
) -> TeamlessAction {
    let mut state = teamless_state().lock().expect("teamless state lock poisoned");

    if state.form_id.as_deref() != Some(form_id) {
        *state = TeamlessUiState {
            form_id: Some(form_id.to_string()),
            ..Default::default()
        };
        start_search(&mut state, api, form_id);
        state.poller = Some(JoinRequestPoller::start(
            api.clone(),
            form_id.to_string(),
            Duration::from_secs(config.polling.join_request_interval_seconds),
        ));
    }

    // Resolved join requests arrive here regardless of which tab is open.
    let mut joined = false;
    let mut refresh_search = false;
    if let Some(poller) = &state.poller {
        while let Some(event) = poller.try_next() {
            match event {
                JoinPollEvent::Accepted { team_name } => {
                    notices.push_with_duration(
                        NoticeKind::Success,
                        format!("Your request to join {team_name} was accepted!"),
                        Duration::from_secs(5),
                    );
                    joined = true;
                    break;
                }
                JoinPollEvent::Rejected { team_name } => {
                    notices.push(
                        NoticeKind::Info,
                        format!("Your request to join {team_name} was declined."),
                    );
                    refresh_search = true;
                }
                JoinPollEvent::Expired { team_name } => {
                    notices.push(
                        NoticeKind::Warning,
                        format!("Your request to join {team_name} expired."),
                    );
                    refresh_search = true;
                }
            }
        }
    }
    if joined {
        state.poller = None;
        return TeamlessAction::TeamChanged;
    }

    // Debounced search: fire once the query has been quiet long enough.
    let debounce = Duration::from_millis(config.polling.search_debounce_ms);
    if let Some(edited_at) = state.last_edit {
        let elapsed = edited_at.elapsed();
        if elapsed >= debounce {
            state.last_edit = None;
            start_search(&mut state, api, form_id);
        } else {
            ui.ctx().request_repaint_after(debounce - elapsed);
        }
    }
    if refresh_search {
        start_search(&mut state, api, form_id);
    }

    if let Some(rx) = &state.search_rx {
        match rx.try_recv() {
            Ok(TeamFlowEvent::SearchResults { generation, teams }) => {
                // Out-of-order replies lose to anything newer.
                if generation > state.applied_generation {
                    state.applied_generation = generation;
                    state.teams = teams;
                    state.searched_once = true;
                }
                state.search_rx = None;
            }
            Ok(TeamFlowEvent::SearchFailed { .. }) => {
                // Keep the last-known-good list.
                state.search_rx = None;
                state.searched_once = true;
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.search_rx = None;
            }
        }
    }

    if let Some(rx) = &state.create_rx {
        match rx.try_recv() {
            Ok(event) => {
                if apply_create_event(&mut state, event, notices) {
                    return TeamlessAction::TeamChanged;
                }
            }
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.create_rx = None;
                notices.push(NoticeKind::Error, "Create team worker disconnected");
            }
        }
    }

    if let Some(rx) = &state.request_rx {
        match rx.try_recv() {
            Ok(TeamFlowEvent::RequestSent { message }) => {
                state.request_rx = None;
                notices.push(NoticeKind::Success, message);
                // Reflect the pending marker on the requested team.
                let requested = state.sending_for.take();
                if let Some(id) = requested {
                    if let Some(team) = state
                        .teams
                        .iter_mut()
                        .find(|t| t.team_registration_id == id)
                    {
                        team.has_pending_request = true;
                    }
                }
            }
            Ok(TeamFlowEvent::ActionFailed { message }) => {
                state.request_rx = None;
                state.sending_for = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.request_rx = None;
                state.sending_for = None;
            }
        }
    }

    if !info.event_title.is_empty() {
        ui.heading(&info.event_title);
    }
    ui.label("You're registered but not on a team yet. Join one or start your own.");
    ui.add_space(12.0);

    ui.horizontal(|ui| {
        ui.selectable_value(&mut state.tab, Tab::Browse, "Browse Teams");
        ui.selectable_value(&mut state.tab, Tab::Create, "Create Team");
    });
    ui.add_space(8.0);

    match state.tab {
        Tab::Browse => browse_tab(ui, &mut state, form_id, api),
        Tab::Create => create_tab(ui, &mut state, form_id, api, notices),
    }

    TeamlessAction::Stay
}

fn browse_tab(
    ui: &mut egui::Ui,
    state: &mut TeamlessUiState,
    form_id: &str,
    api: &SharedApiClient,
) {
    let response = ui.add(
        egui::TextEdit::singleline(&mut state.search_query).hint_text("Search teams by name..."),
    );
    if response.changed() {
        state.last_edit = Some(Instant::now());
    }
    ui.add_space(8.0);

    if state.search_rx.is_some() && !state.searched_once {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Loading teams...");
        });
        return;
    }

    if state.teams.is_empty() {
        if state.search_query.trim().is_empty() {
            ui.label("No teams with open spots yet. Be the first to create one!");
        } else {
            ui.label("No teams match your search.");
        }
        return;
    }

    let mut request_for: Option<String> = None;
    egui::ScrollArea::vertical().show(ui, |ui| {
        for team in &state.teams {
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.label(egui::RichText::new(&team.team_name).strong());
                        ui.label(format!(
                            "Led by {} · {}/{} members · {} open",
                            team.leader_name,
                            team.team_size,
                            team.max_team_size,
                            team.spots_remaining
                        ));
                    });
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let sending_this = state.sending_for.as_deref()
                            == Some(team.team_registration_id.as_str());
                        if team.has_pending_request {
                            ui.add_enabled(false, egui::Button::new("Request Pending"));
                        } else if sending_this {
                            ui.add(egui::Spinner::new());
                        } else {
                            let enabled = state.sending_for.is_none();
                            if ui
                                .add_enabled(enabled, egui::Button::new("Request to Join"))
                                .clicked()
                            {
                                request_for = Some(team.team_registration_id.clone());
                            }
                        }
                    });
                });
            });
            ui.add_space(6.0);
        }
    });

    if let Some(team_registration_id) = request_for {
        state.sending_for = Some(team_registration_id.clone());
        state.request_rx = Some(spawn_send_join_request(
            api.clone(),
            form_id.to_string(),
            team_registration_id,
        ));
        ui.ctx().request_repaint();
    }
}

fn create_tab(
    ui: &mut egui::Ui,
    state: &mut TeamlessUiState,
    form_id: &str,
    api: &SharedApiClient,
    notices: &mut NoticeCenter,
) {
    let creating = state.create_rx.is_some();

    ui.label("Team name");
    let response = ui.add_enabled(
        !creating,
        egui::TextEdit::singleline(&mut state.create_name).hint_text("e.g. Falcons"),
    );
    ui.add_space(8.0);

    let submit_via_enter =
        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
    let submit_via_button = ui
        .add_enabled(!creating, egui::Button::new("Create Team"))
        .clicked();

    if (submit_via_button || submit_via_enter) && !creating {
        match team_flow::validate_team_name(&state.create_name) {
            Ok(name) => {
                state.create_rx =
                    Some(spawn_create_team(api.clone(), form_id.to_string(), name));
                ui.ctx().request_repaint();
            }
            Err(message) => notices.push(NoticeKind::Error, message),
        }
    }

    if creating {
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Creating team...");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api_client::ApiClient;
    use std::sync::Arc;

    fn live_poller() -> JoinRequestPoller {
        let api = Arc::new(ApiClient::new("http://localhost:0").expect("client"));
        JoinRequestPoller::start(api, "form1".into(), Duration::from_secs(60))
    }

    #[test]
    fn created_team_stops_join_request_polling() {
        let mut state = TeamlessUiState {
            poller: Some(live_poller()),
            ..Default::default()
        };
        let mut notices = NoticeCenter::default();

        let changed = apply_create_event(
            &mut state,
            TeamFlowEvent::Created {
                message: "Team created".into(),
            },
            &mut notices,
        );

        assert!(changed);
        assert!(state.poller.is_none());
        assert!(state.create_rx.is_none());
    }

    #[test]
    fn failed_create_keeps_polling_for_pending_requests() {
        let mut state = TeamlessUiState {
            poller: Some(live_poller()),
            ..Default::default()
        };
        let mut notices = NoticeCenter::default();

        let changed = apply_create_event(
            &mut state,
            TeamFlowEvent::ActionFailed {
                message: "A team with this name already exists".into(),
            },
            &mut notices,
        );

        assert!(!changed);
        assert!(state.poller.is_some());
    }
}
