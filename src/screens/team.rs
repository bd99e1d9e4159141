use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};

use eframe::egui;

use crate::models::{InviteLink, TeamRegistration, TeamStatusPayload};
use crate::routes::query_param;
use crate::screens::teamless::{self, TeamlessAction};
use crate::services::api_client::SharedApiClient;
use crate::services::config_loader::TesseraConfig;
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::team_flow::{
    self, LeaveAction, TeamFlowEvent, spawn_fetch_invite_link, spawn_fetch_team_details,
    spawn_invite_member, spawn_leave_team, spawn_remove_member, spawn_rename_team,
};
use crate::services::session::SessionStore;

pub enum TeamAction {
    Stay,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InviteTab {
    Email,
    Link,
}

#[derive(Default)]
struct TeamUiState {
    form_id: Option<String>,
    fetch_rx: Option<Receiver<TeamFlowEvent>>,
    payload: Option<TeamStatusPayload>,
    error: Option<String>,
    toast_consumed: bool,
    rename_editing: bool,
    rename_value: String,
    invite_tab: Option<InviteTab>,
    invite_email: String,
    invite_link: Option<InviteLink>,
    link_rx: Option<Receiver<TeamFlowEvent>>,
    action_rx: Option<Receiver<TeamFlowEvent>>,
    confirm_leave: Option<LeaveAction>,
    confirm_remove: Option<String>,
}

static TEAM_STATE: OnceLock<Mutex<TeamUiState>> = OnceLock::new();

fn team_state() -> &'static Mutex<TeamUiState> {
    TEAM_STATE.get_or_init(|| Mutex::new(TeamUiState::default()))
}

pub fn teardown() {
    let mut state = team_state().lock().expect("team state lock poisoned");
    *state = TeamUiState::default();
    teamless::teardown();
}

fn refetch(state: &mut TeamUiState, api: &SharedApiClient, form_id: &str) {
    state.payload = None;
    state.error = None;
    state.fetch_rx = Some(spawn_fetch_team_details(api.clone(), form_id.to_string()));
}

pub fn ui(
    ui: &mut egui::Ui,
    form_id: &str,
    query: &[(String, String)],
    api: &SharedApiClient,
    session: &SessionStore,
    config: &TesseraConfig,
    notices: &mut NoticeCenter,
) -> TeamAction {
    let mut state = team_state().lock().expect("team state lock poisoned");

    if state.form_id.as_deref() != Some(form_id) {
        *state = TeamUiState {
            form_id: Some(form_id.to_string()),
            ..Default::default()
        };
        refetch(&mut state, api, form_id);
        teamless::teardown();
    }

    // Email-action redirects land here with ?toast=...&name=...; surface
    // the notice exactly once per visit.
    if !state.toast_consumed {
        state.toast_consumed = true;
        if let Some(toast) = query_param(query, "toast") {
            if let Some((kind, message)) =
                team_flow::toast_notice(toast, query_param(query, "name"))
            {
                notices.push(kind, message);
            }
        }
    }

    if let Some(rx) = &state.fetch_rx {
        match rx.try_recv() {
            Ok(TeamFlowEvent::Details(payload)) => {
                // Once the caller has a team, the teamless view's state
                // (and its join-request poller) has nothing left to do.
                if matches!(*payload, TeamStatusPayload::Member(_)) {
                    teamless::teardown();
                }
                state.payload = Some(*payload);
                state.fetch_rx = None;
                state.rename_editing = false;
                state.invite_link = None;
            }
            Ok(TeamFlowEvent::DetailsFailed { message }) => {
                state.error = Some(message);
                state.fetch_rx = None;
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.error = Some("Team details worker disconnected".to_string());
                state.fetch_rx = None;
            }
        }
    }

    let mut needs_refetch = false;
    if let Some(rx) = &state.action_rx {
        match rx.try_recv() {
            Ok(TeamFlowEvent::Renamed { team_name }) => {
                state.action_rx = None;
                state.rename_editing = false;
                if let Some(TeamStatusPayload::Member(team)) = &mut state.payload {
                    team.team_name = team_name;
                }
                notices.push(NoticeKind::Success, "Team renamed");
            }
            Ok(TeamFlowEvent::Left { message }) => {
                state.action_rx = None;
                notices.push(NoticeKind::Success, message);
                needs_refetch = true;
            }
            Ok(TeamFlowEvent::MemberRemoved { message }) => {
                state.action_rx = None;
                notices.push(NoticeKind::Success, message);
                needs_refetch = true;
            }
            Ok(TeamFlowEvent::InviteSent { message }) => {
                state.action_rx = None;
                state.invite_email.clear();
                notices.push(NoticeKind::Success, message);
            }
            Ok(TeamFlowEvent::ActionFailed { message }) => {
                state.action_rx = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.action_rx = None;
                notices.push(NoticeKind::Error, "Team action worker disconnected");
            }
        }
    }
    if needs_refetch {
        refetch(&mut state, api, form_id);
    }

    if let Some(rx) = &state.link_rx {
        match rx.try_recv() {
            Ok(TeamFlowEvent::InviteLinkReady(link)) => {
                state.invite_link = Some(link);
                state.link_rx = None;
            }
            Ok(TeamFlowEvent::ActionFailed { message }) => {
                state.link_rx = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.link_rx = None;
            }
        }
    }

    if ui.button("< Back").clicked() {
        return TeamAction::Back;
    }
    ui.add_space(8.0);

    if state.fetch_rx.is_some() {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Loading team...");
        });
        return TeamAction::Stay;
    }

    if let Some(error) = &state.error {
        ui.colored_label(egui::Color32::LIGHT_RED, error.clone());
        ui.add_space(8.0);
        if ui.button("Retry").clicked() {
            refetch(&mut state, api, form_id);
        }
        return TeamAction::Stay;
    }

    match state.payload.clone() {
        Some(TeamStatusPayload::Member(team)) => {
            member_view(ui, &mut state, &team, form_id, api, session, notices);
        }
        Some(TeamStatusPayload::Teamless(info)) => {
            let action = teamless::ui(ui, form_id, &info, api, config, notices);
            if matches!(action, TeamlessAction::TeamChanged) {
                refetch(&mut state, api, form_id);
            }
        }
        None => {}
    }

    TeamAction::Stay
}

fn member_view(
    ui: &mut egui::Ui,
    state: &mut TeamUiState,
    team: &TeamRegistration,
    form_id: &str,
    api: &SharedApiClient,
    session: &SessionStore,
    notices: &mut NoticeCenter,
) {
    let viewer_email = session
        .snapshot()
        .map(|s| s.profile.email)
        .unwrap_or_default();
    let is_leader = team_flow::is_leader(team, &viewer_email);
    let registration_open = team_flow::is_registration_open(team);
    let busy = state.action_rx.is_some();

    if !team.event_title.is_empty() {
        ui.heading(&team.event_title);
        ui.add_space(4.0);
    }

    // Name row, with inline rename for the leader.
    ui.horizontal(|ui| {
        if state.rename_editing {
            let response = ui.add_enabled(
                !busy,
                egui::TextEdit::singleline(&mut state.rename_value),
            );
            let commit =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let cancel = ui.input(|i| i.key_pressed(egui::Key::Escape));
            if cancel {
                state.rename_editing = false;
            } else if commit {
                if team_flow::rename_is_noop(&team.team_name, &state.rename_value) {
                    state.rename_editing = false;
                } else {
                    match team_flow::validate_team_name(&state.rename_value) {
                        Ok(name) => {
                            state.action_rx = Some(spawn_rename_team(
                                api.clone(),
                                form_id.to_string(),
                                name,
                            ));
                            ui.ctx().request_repaint();
                        }
                        Err(message) => notices.push(NoticeKind::Error, message),
                    }
                }
            }
        } else {
            ui.label(egui::RichText::new(&team.team_name).heading());
            if team_flow::can_rename(team, &viewer_email)
                && ui.add_enabled(!busy, egui::Button::new("Rename")).clicked()
            {
                state.rename_value = team.team_name.clone();
                state.rename_editing = true;
            }
        }
    });

    // Team code, shareable out of band.
    ui.horizontal(|ui| {
        ui.label(format!("Team code: {}", team.team_code));
        if ui.small_button("Copy").clicked() {
            ui.ctx().copy_text(team.team_code.clone());
            notices.push(NoticeKind::Info, "Team code copied");
        }
    });
    ui.label(format!(
        "{}/{} members · minimum {}",
        team.team_size, team.max_team_size, team.min_team_size
    ));
    if !registration_open {
        ui.colored_label(
            egui::Color32::YELLOW,
            "Registration is closed; the roster is locked.",
        );
    }
    ui.add_space(12.0);

    ui.label(egui::RichText::new("Members").strong());
    for member in &team.members {
        ui.horizontal(|ui| {
            let leader_mark = if member.email.eq_ignore_ascii_case(&team.leader_email) {
                " (leader)"
            } else {
                ""
            };
            ui.label(format!("{}{leader_mark}", member.name));
            if let Some(college) = &member.college {
                ui.weak(college);
            }
            if team_flow::can_remove_member(team, &viewer_email, &member.email) {
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.add_enabled(!busy, egui::Button::new("Remove")).clicked() {
                        state.confirm_remove = Some(member.email.clone());
                    }
                });
            }
        });
    }
    ui.add_space(12.0);

    if team_flow::can_invite(team, &viewer_email) {
        invite_section(ui, state, team, form_id, api, notices);
        ui.add_space(12.0);
    }

    match team_flow::leave_action(team, &viewer_email) {
        Some(action) => {
            if ui
                .add_enabled(!busy, egui::Button::new(action.title()))
                .clicked()
            {
                state.confirm_leave = Some(action);
            }
        }
        None => {
            if is_leader && registration_open && team.team_size > 1 {
                ui.weak("Remove your teammates before dissolving the team.");
            }
        }
    }

    if let Some(action) = state.confirm_leave {
        let mut keep_open = true;
        let mut confirmed = false;
        egui::Window::new(action.title())
            .collapsible(false)
            .resizable(false)
            .open(&mut keep_open)
            .show(ui.ctx(), |ui| {
                ui.label(action.prompt(&team.team_name));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        confirmed = false;
                        state.confirm_leave = None;
                    }
                    if ui.button(action.title()).clicked() {
                        confirmed = true;
                    }
                });
            });
        if !keep_open {
            state.confirm_leave = None;
        }
        if confirmed {
            state.confirm_leave = None;
            state.action_rx = Some(spawn_leave_team(api.clone(), form_id.to_string()));
            ui.ctx().request_repaint();
        }
    }

    if let Some(member_email) = state.confirm_remove.clone() {
        let mut keep_open = true;
        let mut confirmed = false;
        egui::Window::new("Remove Member")
            .collapsible(false)
            .resizable(false)
            .open(&mut keep_open)
            .show(ui.ctx(), |ui| {
                ui.label(format!("Remove {member_email} from the team?"));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        state.confirm_remove = None;
                    }
                    if ui.button("Remove").clicked() {
                        confirmed = true;
                    }
                });
            });
        if !keep_open {
            state.confirm_remove = None;
        }
        if confirmed {
            state.confirm_remove = None;
            state.action_rx = Some(spawn_remove_member(
                api.clone(),
                form_id.to_string(),
                member_email,
            ));
            ui.ctx().request_repaint();
        }
    }
}

fn invite_section(
    ui: &mut egui::Ui,
    state: &mut TeamUiState,
    team: &TeamRegistration,
    form_id: &str,
    api: &SharedApiClient,
    notices: &mut NoticeCenter,
) {
    let busy = state.action_rx.is_some();
    ui.label(egui::RichText::new(format!(
        "Invite members ({} spot{} left)",
        team_flow::spots_remaining(team),
        if team_flow::spots_remaining(team) == 1 { "" } else { "s" }
    ))
    .strong());

    let mut tab = state.invite_tab.unwrap_or(InviteTab::Email);
    ui.horizontal(|ui| {
        ui.selectable_value(&mut tab, InviteTab::Email, "By email");
        ui.selectable_value(&mut tab, InviteTab::Link, "By link");
    });
    state.invite_tab = Some(tab);
    ui.add_space(6.0);

    match tab {
        InviteTab::Email => {
            ui.horizontal(|ui| {
                ui.add_enabled(
                    !busy,
                    egui::TextEdit::singleline(&mut state.invite_email)
                        .hint_text("teammate@college.edu"),
                );
                let valid = state.invite_email.contains('@');
                if ui
                    .add_enabled(!busy && valid, egui::Button::new("Send Invite"))
                    .clicked()
                {
                    state.action_rx = Some(spawn_invite_member(
                        api.clone(),
                        form_id.to_string(),
                        state.invite_email.trim().to_string(),
                    ));
                    ui.ctx().request_repaint();
                }
            });
        }
        InviteTab::Link => match &state.invite_link {
            Some(link) => {
                ui.horizontal(|ui| {
                    ui.monospace(&link.invite_link);
                    if ui.small_button("Copy").clicked() {
                        let copied = if link.share_text.is_empty() {
                            link.invite_link.clone()
                        } else {
                            format!("{} {}", link.share_text, link.invite_link)
                        };
                        ui.ctx().copy_text(copied);
                        notices.push(NoticeKind::Info, "Invite link copied");
                    }
                });
            }
            None => {
                if state.link_rx.is_some() {
                    ui.add(egui::Spinner::new());
                } else if ui.button("Generate Link").clicked() {
                    state.link_rx =
                        Some(spawn_fetch_invite_link(api.clone(), form_id.to_string()));
                    ui.ctx().request_repaint();
                }
            }
        },
    }
}
