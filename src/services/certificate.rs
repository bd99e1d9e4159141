use serde::Serialize;

use crate::models::CertificateField;

/// The two fields every template must carry. They cannot be removed or
/// renamed; normalization re-inserts them if the in-memory list lost them.
pub const REQUIRED_FIELD_NAMES: [&str; 2] = ["name", "qr"];

pub fn default_required_fields() -> Vec<CertificateField> {
    vec![
        CertificateField {
            field_name: "name".to_string(),
            x: 50.0,
            y: 60.0,
            font_size: 42,
            font_color: "#FFFFFF".to_string(),
            locked: true,
        },
        CertificateField {
            field_name: "qr".to_string(),
            x: 86.0,
            y: 82.0,
            font_size: 24,
            font_color: "#FFFFFF".to_string(),
            locked: true,
        },
    ]
}

pub fn is_required_name(name: &str) -> bool {
    REQUIRED_FIELD_NAMES.contains(&name)
}

/// A custom field may not take a reserved name. The designer refuses the
/// edit outright rather than letting payload dedupe silently drop the
/// field (and rendering two identical markers in the meantime).
pub fn custom_name_is_reserved(name: &str) -> bool {
    is_required_name(name.trim())
}

pub fn new_custom_field(existing_custom_count: usize) -> CertificateField {
    CertificateField {
        field_name: format!("field_{}", existing_custom_count + 1),
        x: 50.0,
        y: 50.0,
        font_size: 32,
        font_color: "#FFFFFF".to_string(),
        locked: false,
    }
}

/// Normalize a field list so the mandatory pair is always present, locked,
/// and first, regardless of how the list was mutated. Custom fields keep
/// their order; positions of an existing `name`/`qr` survive.
pub fn ensure_required_fields(fields: &[CertificateField]) -> Vec<CertificateField> {
    let mut normalized: Vec<CertificateField> = default_required_fields()
        .into_iter()
        .map(|required| {
            match fields.iter().find(|f| f.field_name == required.field_name) {
                Some(existing) => CertificateField {
                    locked: true,
                    ..existing.clone()
                },
                None => required,
            }
        })
        .collect();

    normalized.extend(
        fields
            .iter()
            .filter(|f| !is_required_name(&f.field_name))
            .cloned(),
    );
    normalized
}

/// What actually goes over the wire: normalized, clamped to the template,
/// and deduplicated by field name (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateFieldPayload {
    pub field_name: String,
    pub x: f32,
    pub y: f32,
    pub font_size: u32,
    pub font_color: String,
}

pub fn to_field_payload(fields: &[CertificateField]) -> Vec<CertificateFieldPayload> {
    let mut seen: Vec<String> = Vec::new();
    ensure_required_fields(fields)
        .into_iter()
        .filter(|field| {
            let name = field.field_name.clone();
            if seen.contains(&name) {
                false
            } else {
                seen.push(name);
                true
            }
        })
        .map(|field| CertificateFieldPayload {
            field_name: field.field_name,
            x: round2(field.x.clamp(0.0, 100.0)),
            y: round2(field.y.clamp(0.0, 100.0)),
            font_size: if field.font_size == 0 { 32 } else { field.font_size },
            font_color: if field.font_color.trim().is_empty() {
                "#FFFFFF".to_string()
            } else {
                field.font_color
            },
        })
        .collect()
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Translate a pointer position into template-percentage space. Positions
/// are relative to the rendered stage rect so they are independent of the
/// template's pixel resolution. Returns None for a degenerate rect.
pub fn pointer_to_percent(
    pointer_x: f32,
    pointer_y: f32,
    stage_left: f32,
    stage_top: f32,
    stage_width: f32,
    stage_height: f32,
) -> Option<(f32, f32)> {
    if stage_width <= 0.0 || stage_height <= 0.0 {
        return None;
    }
    let x = (pointer_x - stage_left) / stage_width * 100.0;
    let y = (pointer_y - stage_top) / stage_height * 100.0;
    Some((round2(x.clamp(0.0, 100.0)), round2(y.clamp(0.0, 100.0))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str, x: f32, y: f32) -> CertificateField {
        CertificateField {
            field_name: name.to_string(),
            x,
            y,
            font_size: 32,
            font_color: "#FF8800".to_string(),
            locked: false,
        }
    }

    #[test]
    fn payload_always_has_exactly_one_name_and_one_qr() {
        // Start empty, add and remove customs, even sneak in a duplicate qr.
        let mut fields: Vec<CertificateField> = Vec::new();
        fields.push(custom("college", 10.0, 20.0));
        fields.push(custom("qr", 5.0, 5.0));
        fields.push(custom("year", 30.0, 40.0));
        fields.retain(|f| f.field_name != "college");

        let payload = to_field_payload(&fields);
        let names: Vec<&str> = payload.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(
            payload.iter().filter(|f| f.field_name == "name").count(),
            1
        );
        assert_eq!(payload.iter().filter(|f| f.field_name == "qr").count(), 1);
        assert_eq!(names[0], "name");
        assert_eq!(names[1], "qr");
        assert!(names.contains(&"year"));

        // The user-positioned qr wins over the default one.
        let qr = payload.iter().find(|f| f.field_name == "qr").unwrap();
        assert_eq!((qr.x, qr.y), (5.0, 5.0));
    }

    #[test]
    fn reserved_names_cannot_be_taken_by_customs() {
        assert!(custom_name_is_reserved("name"));
        assert!(custom_name_is_reserved(" qr "));
        assert!(!custom_name_is_reserved("college"));
        assert!(!custom_name_is_reserved("qr_code"));
    }

    #[test]
    fn normalization_relocks_required_fields() {
        let mut fields = default_required_fields();
        fields[0].locked = false;
        fields[0].x = 70.0;
        let normalized = ensure_required_fields(&fields);
        assert!(normalized[0].locked);
        assert_eq!(normalized[0].x, 70.0);
    }

    #[test]
    fn payload_clamps_positions_into_the_template() {
        let fields = vec![custom("edge", -12.0, 140.0)];
        let payload = to_field_payload(&fields);
        let edge = payload.iter().find(|f| f.field_name == "edge").unwrap();
        assert_eq!((edge.x, edge.y), (0.0, 100.0));
    }

    #[test]
    fn payload_repairs_degenerate_size_and_color() {
        let mut field = custom("degenerate", 50.0, 50.0);
        field.font_size = 0;
        field.font_color = "  ".into();
        let payload = to_field_payload(&[field]);
        let fixed = payload
            .iter()
            .find(|f| f.field_name == "degenerate")
            .unwrap();
        assert_eq!(fixed.font_size, 32);
        assert_eq!(fixed.font_color, "#FFFFFF");
    }

    #[test]
    fn duplicate_customs_are_deduplicated_first_wins() {
        let fields = vec![custom("college", 10.0, 10.0), custom("college", 90.0, 90.0)];
        let payload = to_field_payload(&fields);
        let colleges: Vec<_> = payload
            .iter()
            .filter(|f| f.field_name == "college")
            .collect();
        assert_eq!(colleges.len(), 1);
        assert_eq!((colleges[0].x, colleges[0].y), (10.0, 10.0));
    }

    #[test]
    fn pointer_transform_clamps_and_rounds() {
        // Stage is 400x200 at (100, 50).
        assert_eq!(
            pointer_to_percent(300.0, 150.0, 100.0, 50.0, 400.0, 200.0),
            Some((50.0, 50.0))
        );
        assert_eq!(
            pointer_to_percent(0.0, 0.0, 100.0, 50.0, 400.0, 200.0),
            Some((0.0, 0.0))
        );
        assert_eq!(
            pointer_to_percent(900.0, 500.0, 100.0, 50.0, 400.0, 200.0),
            Some((100.0, 100.0))
        );
        assert_eq!(
            pointer_to_percent(101.0, 50.0, 100.0, 50.0, 400.0, 200.0),
            Some((0.25, 0.0))
        );
        assert_eq!(pointer_to_percent(10.0, 10.0, 0.0, 0.0, 0.0, 200.0), None);
    }
}
