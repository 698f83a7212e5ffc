use crate::ipc::helpers::{with_conn, write_err, HandlerErr};
use crate::ipc::queries::{load_profile, PROFILE_DOC_ID};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// Technical card layout: section title, then (field, label) pairs.
pub static PROFILE_SECTIONS: [(&str, &[(&str, &str)]); 3] = [
    (
        "البيانات الشخصية",
        &[
            ("lastName", "اللقب"),
            ("firstName", "الإسم"),
            ("dateOfBirth", "تاريخ الميلاد"),
            ("placeOfBirth", "مكان الميلاد"),
            ("maritalStatus", "الحالة العائلية"),
            ("address", "العنوان الشخصي"),
            ("phoneNumber", "رقم الهاتف"),
            ("email", "البريد الإلكتروني"),
        ],
    ),
    (
        "المعلومات الإدارية",
        &[
            ("rank", "الرتبة"),
            ("title", "الصفة"),
            ("appointmentDate", "تاريخ التعيين"),
            ("confirmationDate", "تاريخ الترسيم"),
            ("grade", "الدرجة"),
        ],
    ),
    (
        "الشهادات والمؤهلات",
        &[
            ("certificateName", "مسمى الشهادة"),
            ("certificateNumber", "رقم الشهادة"),
            ("specialization", "التخصص"),
            ("issuingInstitution", "المؤسسة المسلمة للشهادة"),
            ("certificationDate", "تاريخ الحصول على الشهادة"),
        ],
    ),
];

/// Fields shown in document headers rather than on the card.
pub static SCHOOL_FIELDS: [&str; 3] = ["wilaya", "schoolName", "schoolYear"];

fn is_known_field(key: &str) -> bool {
    SCHOOL_FIELDS.iter().any(|f| *f == key)
        || PROFILE_SECTIONS
            .iter()
            .any(|(_, fields)| fields.iter().any(|(k, _)| *k == key))
}

fn all_fields() -> impl Iterator<Item = &'static str> {
    PROFILE_SECTIONS
        .iter()
        .flat_map(|(_, fields)| fields.iter().map(|(k, _)| *k))
        .chain(SCHOOL_FIELDS)
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}

fn merge_profile_patch(current: &mut Map<String, Value>, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        if !is_known_field(k) {
            return Err(format!("unknown profile field: {}", k));
        }
        let value = match v {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            _ => return Err(format!("{} must be string or null", k)),
        };
        if k == "email" && !value.is_empty() && !looks_like_email(&value) {
            return Err("email must be a valid address".into());
        }
        if value.is_empty() {
            current.remove(k);
        } else {
            current.insert(k.clone(), Value::String(value));
        }
    }
    Ok(())
}

fn profile_get(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let stored = load_profile(conn)?;
    let profile: Map<String, Value> = all_fields()
        .map(|k| (k.to_string(), stored.get(k).cloned().unwrap_or(Value::Null)))
        .collect();
    Ok(json!({ "profile": profile }))
}

fn profile_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let mut current = load_profile(conn)?;
    merge_profile_patch(&mut current, patch).map_err(HandlerErr::bad_params)?;
    conn.execute(
        "INSERT INTO professor_profile(id, data, updated_at) VALUES(?, ?, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        (PROFILE_DOC_ID, Value::Object(current).to_string()),
    )
    .map_err(write_err("db_update_failed", "professor_profile"))?;
    info!(
        "event=profile_update module=profile status=ok fields={}",
        patch.len()
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "profile.get" => Some(with_conn(state, req, profile_get)),
        "profile.update" => Some(with_conn(state, req, profile_update)),
        _ => None,
    }
}
