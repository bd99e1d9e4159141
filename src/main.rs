mod models;
mod routes;
mod screens;
mod services;

use std::fs;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use eframe::egui;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use routes::Route;
use screens::certificate_designer::CertificateAction;
use screens::event_detail::EventDetailAction;
use screens::events::EventsAction;
use screens::login::LoginAction;
use screens::register_form::RegisterFormAction;
use screens::team::TeamAction;
use services::api_client::{ApiClient, SharedApiClient};
use services::config_loader::{TesseraConfig, load_tessera_config};
use services::notices::{NoticeCenter, NoticeKind};
use services::session::{SessionEvent, SessionStore, read_durable_token, spawn_session_restore};

struct TesseraApp {
    route: Route,
    // One-shot path to return to after the login the guard forced.
    return_marker: Option<String>,
    path_input: String,
    session: SessionStore,
    api: SharedApiClient,
    notices: NoticeCenter,
    config: TesseraConfig,
    restore_rx: Option<Receiver<SessionEvent>>,
}

impl TesseraApp {
    fn new(
        api: SharedApiClient,
        session: SessionStore,
        config: TesseraConfig,
        restore_rx: Option<Receiver<SessionEvent>>,
    ) -> Self {
        Self {
            route: Route::Events,
            return_marker: None,
            path_input: String::new(),
            session,
            api,
            notices: NoticeCenter::default(),
            config,
            restore_rx,
        }
    }

    /// Route guard: protected views bounce through login, remembering where
    /// the visitor was headed.
    fn navigate(&mut self, target: Route) {
        if target.requires_auth() && !self.session.is_logged_in() {
            self.return_marker = Some(target.path());
            self.notices.push(
                NoticeKind::Info,
                "Please log in first to access this page.",
            );
            self.switch_to(Route::Login);
            return;
        }
        self.switch_to(target);
    }

    fn switch_to(&mut self, target: Route) {
        if target == self.route {
            return;
        }
        self.teardown_current();
        info!("Navigate: {} -> {}", self.route.path(), target.path());
        self.path_input = target.path();
        self.route = target;
    }

    /// Per-visit screen state dies with the visit; a revisit starts clean.
    fn teardown_current(&mut self) {
        match &self.route {
            Route::Login => screens::login::teardown(),
            Route::Events => screens::events::teardown(),
            Route::EventDetail { .. } => screens::event_detail::teardown(),
            Route::RegisterForm { .. } => screens::register_form::teardown(),
            Route::TeamManagement { .. } => screens::team::teardown(),
            Route::CertificateDesigner { .. } => screens::certificate_designer::teardown(),
            Route::NotFound { .. } => {}
        }
    }

    fn drain_session_restore(&mut self) {
        let Some(rx) = &self.restore_rx else { return };
        match rx.try_recv() {
            Ok(SessionEvent::Restored(session)) => {
                self.notices.push(
                    NoticeKind::Success,
                    format!("Welcome back, {}", session.profile.name),
                );
                self.session.adopt_restored(*session);
                self.restore_rx = None;
            }
            Ok(SessionEvent::RestoreFailed { message }) => {
                info!("Session restore failed: {message}");
                self.restore_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.restore_rx = None;
            }
        }
    }

    fn after_login_route(&mut self) -> Route {
        match self.return_marker.take() {
            Some(path) => Route::parse(&path),
            None => Route::Events,
        }
    }

    fn nav_bar(&mut self, ui: &mut egui::Ui) {
        let mut target: Option<Route> = None;
        ui.horizontal(|ui| {
            if ui.button("Events").clicked() {
                target = Some(Route::Events);
            }

            let response = ui.add(
                egui::TextEdit::singleline(&mut self.path_input)
                    .desired_width(280.0)
                    .hint_text("/events/..."),
            );
            let go_via_enter =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.small_button("Go").clicked() || go_via_enter {
                target = Some(Route::parse(&self.path_input));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                match self.session.snapshot() {
                    Some(session) => {
                        if ui.button("Log out").clicked() {
                            self.session.logout();
                            self.notices.push(NoticeKind::Info, "Logged out");
                            target = Some(Route::Events);
                        }
                        ui.label(session.profile.name);
                    }
                    None => {
                        if ui.button("Log in").clicked() {
                            target = Some(Route::Login);
                        }
                    }
                }
            });
        });
        if let Some(route) = target {
            self.navigate(route);
        }
    }

    fn notices_overlay(&mut self, ctx: &egui::Context) {
        self.notices.retain_unexpired(Instant::now());
        if self.notices.active().is_empty() {
            return;
        }
        ctx.request_repaint_after(Duration::from_millis(250));

        egui::Area::new(egui::Id::new("notices_overlay"))
            .anchor(egui::Align2::RIGHT_TOP, [-12.0, 12.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for notice in self.notices.active() {
                    let color = match notice.kind {
                        NoticeKind::Success => egui::Color32::from_rgb(60, 160, 90),
                        NoticeKind::Info => egui::Color32::from_rgb(70, 120, 190),
                        NoticeKind::Warning => egui::Color32::from_rgb(200, 150, 40),
                        NoticeKind::Error => egui::Color32::from_rgb(190, 70, 70),
                    };
                    egui::Frame::popup(ui.style()).fill(color).show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&notice.message).color(egui::Color32::WHITE),
                        );
                    });
                    ui.add_space(4.0);
                }
            });
    }
}

impl eframe::App for TesseraApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_session_restore();

        let mut target: Option<Route> = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            self.nav_bar(ui);
            ui.separator();
            ui.add_space(8.0);

            match self.route.clone() {
                Route::Login => {
                    if let LoginAction::LoggedIn =
                        screens::login::ui(ui, &self.api, &self.session, &mut self.notices)
                    {
                        target = Some(self.after_login_route());
                    }
                }
                Route::Events => match screens::events::ui(ui, &self.api) {
                    EventsAction::Stay => {}
                    EventsAction::Open(event_id) => {
                        target = Some(Route::EventDetail { event_id });
                    }
                },
                Route::EventDetail { event_id } => {
                    match screens::event_detail::ui(
                        ui,
                        &event_id,
                        &self.api,
                        &self.session,
                        &mut self.notices,
                    ) {
                        EventDetailAction::Stay => {}
                        EventDetailAction::Back => target = Some(Route::Events),
                        EventDetailAction::OpenForm(event_id) => {
                            target = Some(Route::RegisterForm { event_id });
                        }
                        EventDetailAction::OpenTeam(form_id) => {
                            target = Some(Route::TeamManagement {
                                form_id,
                                query: Vec::new(),
                            });
                        }
                    }
                }
                Route::RegisterForm { event_id } => {
                    match screens::register_form::ui(
                        ui,
                        &event_id,
                        &self.api,
                        &self.session,
                        &mut self.notices,
                    ) {
                        RegisterFormAction::Stay => {}
                        RegisterFormAction::Back | RegisterFormAction::Registered => {
                            target = Some(Route::EventDetail { event_id });
                        }
                    }
                }
                Route::TeamManagement { form_id, query } => {
                    match screens::team::ui(
                        ui,
                        &form_id,
                        &query,
                        &self.api,
                        &self.session,
                        &self.config,
                        &mut self.notices,
                    ) {
                        TeamAction::Stay => {}
                        TeamAction::Back => target = Some(Route::Events),
                    }
                }
                Route::CertificateDesigner { event_id } => {
                    match screens::certificate_designer::ui(
                        ui,
                        &event_id,
                        &self.api,
                        &self.session,
                        &mut self.notices,
                    ) {
                        CertificateAction::Stay => {}
                        CertificateAction::Back => {
                            target = Some(Route::EventDetail { event_id });
                        }
                    }
                }
                Route::NotFound { path } => {
                    ui.heading("Page not found");
                    ui.label(format!("Nothing lives at {path}"));
                    ui.add_space(8.0);
                    if ui.button("Back to Events").clicked() {
                        target = Some(Route::Events);
                    }
                }
            }
        });

        if let Some(route) = target {
            self.navigate(route);
        }

        self.notices_overlay(ctx);
    }
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "tessera.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn main() -> eframe::Result<()> {
    let _log_guard = init_tracing();
    info!("Starting Tessera");

    let config = match load_tessera_config(std::path::Path::new("config.toml")) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            return Ok(());
        }
    };

    let api: SharedApiClient = match ApiClient::new(&config.api_base_url) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("failed to initialize api client: {err}");
            return Ok(());
        }
    };

    let token_path = config.token_path.clone();
    let session = SessionStore::new(Arc::clone(&api), token_path.clone());
    let restore_rx = read_durable_token(&token_path)
        .map(|token| spawn_session_restore(Arc::clone(&api), token));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Tessera",
        options,
        Box::new(move |cc| {
            let mut style = (*cc.egui_ctx.style()).clone();
            style.spacing.button_padding = egui::vec2(12.0, 7.0);
            cc.egui_ctx.set_style(style);

            Ok(Box::new(TesseraApp::new(api, session, config, restore_rx)))
        }),
    )
}
