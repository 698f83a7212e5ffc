use crate::calendar::SlotKind;
use crate::db;
use crate::ipc::helpers::{with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use log::info;
use serde_json::{json, Map, Value};

pub const DEFAULT_LEVELS: [&str; 5] = [
    "أولى ابتدائي",
    "ثانية ابتدائي",
    "ثالثة ابتدائي",
    "رابعة ابتدائي",
    "خامسة ابتدائي",
];

#[derive(Clone, Copy)]
pub enum SetupSection {
    Attendance,
    School,
    Printer,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "school" => Some(Self::School),
            "printer" => Some(Self::Printer),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Attendance => "setup.attendance",
            Self::School => "setup.school",
            Self::Printer => "setup.printer",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Attendance => json!({
            "slotKind": "week",
            "schoolYearStartMonth": 9,
            "annualMonths": [11, 12, 1, 2, 3, 4, 5, 6]
        }),
        SetupSection::School => json!({
            "levels": DEFAULT_LEVELS
        }),
        SetupSection::Printer => json!({
            "showGeneratedAt": true,
            "marginMm": 10
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_month_list(v: &Value, key: &str) -> Result<Vec<i64>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    if arr.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    let mut out: Vec<i64> = Vec::with_capacity(arr.len());
    for item in arr {
        let m = parse_i64_range(item, key, 1, 12)?;
        if out.contains(&m) {
            return Err(format!("{} must not repeat a month", key));
        }
        out.push(m);
    }
    Ok(out)
}

fn parse_levels(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} entries must be non-empty strings", key))?;
        if !out.iter().any(|l| l == s) {
            out.push(s.to_string());
        }
    }
    if out.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Attendance => match k.as_str() {
                "slotKind" => {
                    let kind = v
                        .as_str()
                        .and_then(SlotKind::parse)
                        .ok_or_else(|| "slotKind must be one of: week, day".to_string())?;
                    obj.insert(k.clone(), Value::String(kind.as_str().to_string()));
                }
                "schoolYearStartMonth" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 12)?));
                }
                "annualMonths" => {
                    obj.insert(k.clone(), json!(parse_month_list(v, k)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
            SetupSection::School => match k.as_str() {
                "levels" => {
                    obj.insert(k.clone(), json!(parse_levels(v, k)?));
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Printer => match k.as_str() {
                "showGeneratedAt" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "marginMm" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 30)?));
                }
                _ => return Err(format!("unknown printer field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> Result<Value, HandlerErr> {
    let mut current = default_section(section);
    let saved = db::settings_get_json(conn, section.key())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if let Some(saved_obj) = saved.as_ref().and_then(|v| v.as_object()) {
        // Malformed stored values fall back to defaults field by field.
        for (k, v) in saved_obj {
            let mut single = Map::new();
            single.insert(k.clone(), v.clone());
            let _ = merge_section_patch(section, &mut current, &single);
        }
    }
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct AttendanceSettings {
    pub slot_kind: SlotKind,
    pub school_year_start_month: u32,
    pub annual_months: Vec<u32>,
}

pub fn attendance_settings(conn: &rusqlite::Connection) -> Result<AttendanceSettings, HandlerErr> {
    let v = load_section(conn, SetupSection::Attendance)?;
    Ok(AttendanceSettings {
        slot_kind: v
            .get("slotKind")
            .and_then(|s| s.as_str())
            .and_then(SlotKind::parse)
            .unwrap_or(SlotKind::Week),
        school_year_start_month: v
            .get("schoolYearStartMonth")
            .and_then(|n| n.as_u64())
            .map(|n| n as u32)
            .unwrap_or(9),
        annual_months: v
            .get("annualMonths")
            .and_then(|a| a.as_array())
            .map(|a| a.iter().filter_map(|m| m.as_u64()).map(|m| m as u32).collect())
            .unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct PrinterSettings {
    pub show_generated_at: bool,
    pub margin_mm: u32,
}

pub fn printer_settings(conn: &rusqlite::Connection) -> Result<PrinterSettings, HandlerErr> {
    let v = load_section(conn, SetupSection::Printer)?;
    Ok(PrinterSettings {
        show_generated_at: v
            .get("showGeneratedAt")
            .and_then(|b| b.as_bool())
            .unwrap_or(true),
        margin_mm: v
            .get("marginMm")
            .and_then(|n| n.as_u64())
            .map(|n| n as u32)
            .unwrap_or(10),
    })
}

/// Configured level names in display order.
pub fn school_levels(conn: &rusqlite::Connection) -> Result<Vec<String>, HandlerErr> {
    let v = load_section(conn, SetupSection::School)?;
    Ok(v.get("levels")
        .and_then(|a| a.as_array())
        .map(|a| a.iter().filter_map(|l| l.as_str()).map(str::to_string).collect())
        .unwrap_or_default())
}

fn setup_get(conn: &rusqlite::Connection, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({
        "attendance": load_section(conn, SetupSection::Attendance)?,
        "school": load_section(conn, SetupSection::School)?,
        "printer": load_section(conn, SetupSection::Printer)?
    }))
}

fn setup_update(conn: &rusqlite::Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(section_raw) = params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing section"));
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    info!(
        "event=setup_update module=setup status=ok section={}",
        section_raw
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_conn(state, req, setup_get)),
        "setup.update" => Some(with_conn(state, req, setup_update)),
        _ => None,
    }
}
