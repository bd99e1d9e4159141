use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::thread;

use eframe::egui;
use rfd::FileDialog;

use crate::models::CertificateField;
use crate::services::api_client::{FilePart, SharedApiClient};
use crate::services::certificate::{
    self, default_required_fields, is_required_name, new_custom_field, pointer_to_percent,
    to_field_payload,
};
use crate::services::notices::{NoticeCenter, NoticeKind};
use crate::services::session::SessionStore;

pub enum CertificateAction {
    Stay,
    Back,
}

enum CertEvent {
    PreviewReady(Vec<u8>),
    PreviewFailed { message: String },
    Saved,
    SaveFailed { message: String },
}

#[derive(Default)]
struct DesignerUiState {
    event_id: Option<String>,
    fields: Vec<CertificateField>,
    template_bytes: Option<Vec<u8>>,
    template_name: String,
    template_mime: String,
    template_texture: Option<egui::TextureHandle>,
    preview_texture: Option<egui::TextureHandle>,
    preview_rx: Option<Receiver<CertEvent>>,
    save_rx: Option<Receiver<CertEvent>>,
    dragging: Option<usize>,
}

static DESIGNER_STATE: OnceLock<Mutex<DesignerUiState>> = OnceLock::new();

fn designer_state() -> &'static Mutex<DesignerUiState> {
    DESIGNER_STATE.get_or_init(|| Mutex::new(DesignerUiState::default()))
}

pub fn teardown() {
    let mut state = designer_state().lock().expect("designer state lock poisoned");
    *state = DesignerUiState::default();
}

fn fields_json(fields: &[CertificateField]) -> String {
    serde_json::to_string(&to_field_payload(fields)).unwrap_or_else(|_| "[]".to_string())
}

fn template_part(state: &DesignerUiState) -> Option<FilePart> {
    state.template_bytes.as_ref().map(|bytes| FilePart {
        part_name: "template",
        file_name: state.template_name.clone(),
        mime: state.template_mime.clone(),
        bytes: bytes.clone(),
    })
}

fn spawn_preview(
    api: SharedApiClient,
    event_id: String,
    fields: String,
    template: Option<FilePart>,
) -> Receiver<CertEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let parts = vec![("eventId", event_id), ("fields", fields)];
        let event = match api.post_multipart_bytes("/api/certificate/dummyCertificate", parts, template)
        {
            Ok(bytes) => CertEvent::PreviewReady(bytes),
            Err(err) => CertEvent::PreviewFailed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

fn spawn_save(
    api: SharedApiClient,
    event_id: String,
    fields: String,
    template: Option<FilePart>,
) -> Receiver<CertEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let parts = vec![("eventId", event_id), ("fields", fields)];
        let event = match api.post_multipart_bytes(
            "/api/certificate/addCertificateTemplate",
            parts,
            template,
        ) {
            Ok(_) => CertEvent::Saved,
            Err(err) => CertEvent::SaveFailed {
                message: err.message().to_string(),
            },
        };
        let _ = tx.send(event);
    });
    rx
}

fn load_texture_from_bytes(
    ctx: &egui::Context,
    texture_id: &str,
    bytes: &[u8],
) -> Option<egui::TextureHandle> {
    let decoded = image::load_from_memory(bytes).ok()?;
    let rgba = decoded.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
    Some(ctx.load_texture(texture_id.to_string(), image, egui::TextureOptions::LINEAR))
}

fn mime_for(path: &std::path::Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png".to_string(),
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

pub fn ui(
    ui: &mut egui::Ui,
    event_id: &str,
    api: &SharedApiClient,
    session: &SessionStore,
    notices: &mut NoticeCenter,
) -> CertificateAction {
    let is_admin = session
        .snapshot()
        .map(|s| s.access.is_admin())
        .unwrap_or(false);
    if !is_admin {
        ui.heading("Certificate Designer");
        ui.add_space(8.0);
        ui.label("This page is restricted to organization admins.");
        if ui.button("< Back").clicked() {
            return CertificateAction::Back;
        }
        return CertificateAction::Stay;
    }

    let mut state = designer_state().lock().expect("designer state lock poisoned");

    if state.event_id.as_deref() != Some(event_id) {
        *state = DesignerUiState {
            event_id: Some(event_id.to_string()),
            fields: default_required_fields(),
            ..Default::default()
        };
    }

    if let Some(rx) = &state.preview_rx {
        match rx.try_recv() {
            Ok(CertEvent::PreviewReady(bytes)) => {
                state.preview_rx = None;
                match load_texture_from_bytes(ui.ctx(), "certificate_preview", &bytes) {
                    Some(texture) => state.preview_texture = Some(texture),
                    None => notices.push(NoticeKind::Error, "Preview image could not be decoded"),
                }
            }
            Ok(CertEvent::PreviewFailed { message }) => {
                state.preview_rx = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.preview_rx = None;
            }
        }
    }

    if let Some(rx) = &state.save_rx {
        match rx.try_recv() {
            Ok(CertEvent::Saved) => {
                state.save_rx = None;
                notices.push(NoticeKind::Success, "Certificate template saved");
            }
            Ok(CertEvent::SaveFailed { message }) => {
                state.save_rx = None;
                notices.push(NoticeKind::Error, message);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                ui.ctx().request_repaint();
            }
            Err(TryRecvError::Disconnected) => {
                state.save_rx = None;
            }
        }
    }

    let mut action = CertificateAction::Stay;
    ui.horizontal(|ui| {
        if ui.button("< Back").clicked() {
            action = CertificateAction::Back;
        }
        ui.heading("Certificate Designer");
    });
    ui.add_space(8.0);

    ui.horizontal(|ui| {
        if ui.button("Upload Template...").clicked() {
            let picked = FileDialog::new()
                .add_filter("Image", &["png", "jpg", "jpeg"])
                .pick_file();
            if let Some(path) = picked {
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        state.template_texture =
                            load_texture_from_bytes(ui.ctx(), "certificate_template", &bytes);
                        if state.template_texture.is_none() {
                            notices.push(
                                NoticeKind::Error,
                                "Selected file is not a decodable image",
                            );
                        } else {
                            state.template_name = path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| "template.png".to_string());
                            state.template_mime = mime_for(&path);
                            state.template_bytes = Some(bytes);
                            state.preview_texture = None;
                        }
                    }
                    Err(err) => {
                        notices.push(NoticeKind::Error, format!("Failed to read file: {err}"));
                    }
                }
            }
        }
        if !state.template_name.is_empty() {
            ui.weak(&state.template_name);
        }

        let busy = state.preview_rx.is_some() || state.save_rx.is_some();
        let has_template = state.template_bytes.is_some();
        if ui
            .add_enabled(has_template && !busy, egui::Button::new("Refresh Preview"))
            .clicked()
        {
            state.preview_rx = Some(spawn_preview(
                api.clone(),
                event_id.to_string(),
                fields_json(&state.fields),
                template_part(&state),
            ));
            ui.ctx().request_repaint();
        }
        if ui
            .add_enabled(has_template && !busy, egui::Button::new("Save Template"))
            .clicked()
        {
            state.save_rx = Some(spawn_save(
                api.clone(),
                event_id.to_string(),
                fields_json(&state.fields),
                template_part(&state),
            ));
            ui.ctx().request_repaint();
        }
        if busy {
            ui.add(egui::Spinner::new());
        }
    });
    ui.add_space(12.0);

    ui.columns(2, |columns| {
        stage_column(&mut columns[0], &mut state);
        fields_column(&mut columns[1], &mut state);
    });

    action
}

/// The template with one draggable marker per field. Marker positions are
/// kept in percent space so the stage can be any on-screen size.
fn stage_column(ui: &mut egui::Ui, state: &mut DesignerUiState) {
    let texture = match state.preview_texture.as_ref().or(state.template_texture.as_ref()) {
        Some(texture) => texture.clone(),
        None => {
            ui.label("Upload a template image to start placing fields.");
            return;
        }
    };

    let texture_size = texture.size_vec2();
    let available = ui.available_width();
    let scale = (available / texture_size.x).min(1.0);
    let stage_size = texture_size * scale;
    let (stage_rect, _) = ui.allocate_exact_size(stage_size, egui::Sense::hover());
    egui::Image::new(&texture).paint_at(ui, stage_rect);

    for (index, field) in state.fields.iter_mut().enumerate() {
        let center = egui::pos2(
            stage_rect.left() + stage_rect.width() * field.x / 100.0,
            stage_rect.top() + stage_rect.height() * field.y / 100.0,
        );
        let marker_rect = egui::Rect::from_center_size(center, egui::vec2(14.0, 14.0));
        let id = ui.id().with(("field_marker", index));
        let response = ui.interact(marker_rect, id, egui::Sense::drag());

        if response.drag_started() {
            state.dragging = Some(index);
        }
        if response.dragged() && state.dragging == Some(index) {
            if let Some(pointer) = response.interact_pointer_pos() {
                if let Some((x, y)) = pointer_to_percent(
                    pointer.x,
                    pointer.y,
                    stage_rect.left(),
                    stage_rect.top(),
                    stage_rect.width(),
                    stage_rect.height(),
                ) {
                    field.x = x;
                    field.y = y;
                }
            }
        }
        if response.drag_stopped() {
            state.dragging = None;
        }

        let color = if field.locked {
            egui::Color32::LIGHT_BLUE
        } else {
            egui::Color32::LIGHT_GREEN
        };
        ui.painter().circle_filled(center, 6.0, color);
        ui.painter().text(
            center + egui::vec2(10.0, -10.0),
            egui::Align2::LEFT_BOTTOM,
            &field.field_name,
            egui::FontId::proportional(12.0),
            color,
        );
    }
}

fn fields_column(ui: &mut egui::Ui, state: &mut DesignerUiState) {
    ui.label(egui::RichText::new("Fields").strong());
    ui.add_space(4.0);

    let mut remove_at: Option<usize> = None;
    egui::ScrollArea::vertical().show(ui, |ui| {
        for (index, field) in state.fields.iter_mut().enumerate() {
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    if field.locked {
                        ui.label(egui::RichText::new(&field.field_name).strong());
                        ui.weak("(required)");
                    } else {
                        // Edits commit through a scratch buffer so a rename
                        // to a reserved name is refused, not deduped away.
                        let mut name_edit = field.field_name.clone();
                        let response = ui.text_edit_singleline(&mut name_edit);
                        if response.changed()
                            && !certificate::custom_name_is_reserved(&name_edit)
                        {
                            field.field_name = name_edit;
                        }
                        if ui.small_button("Remove").clicked() {
                            remove_at = Some(index);
                        }
                    }
                });
                ui.horizontal(|ui| {
                    ui.label("x");
                    ui.add(
                        egui::DragValue::new(&mut field.x)
                            .range(0.0..=100.0)
                            .speed(0.25),
                    );
                    ui.label("y");
                    ui.add(
                        egui::DragValue::new(&mut field.y)
                            .range(0.0..=100.0)
                            .speed(0.25),
                    );
                    ui.label("size");
                    ui.add(egui::DragValue::new(&mut field.font_size).range(6..=200));
                });
                ui.horizontal(|ui| {
                    ui.label("color");
                    ui.add(
                        egui::TextEdit::singleline(&mut field.font_color)
                            .desired_width(80.0)
                            .hint_text("#FFFFFF"),
                    );
                });
            });
            ui.add_space(6.0);
        }
    });

    if let Some(index) = remove_at {
        // Required fields carry the locked flag and never reach here, but
        // the guard keeps a renamed duplicate from sneaking them out.
        if !is_required_name(&state.fields[index].field_name) {
            state.fields.remove(index);
        }
        state.fields = certificate::ensure_required_fields(&state.fields);
    }

    if ui.button("Add Field").clicked() {
        let custom_count = state
            .fields
            .iter()
            .filter(|f| !is_required_name(&f.field_name))
            .count();
        state.fields.push(new_custom_field(custom_count));
    }
}
