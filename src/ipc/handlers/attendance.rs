use crate::calendar::{parse_month_key, SlotKind, YearMonth};
use crate::ipc::handlers::setup::attendance_settings;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_str_array, with_conn, write_err, HandlerErr,
};
use crate::ipc::queries::{
    attendance_doc_id, attendance_for_month, get_attendance, get_student, list_students,
    records_json, require_department, Student, StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Justified,
    NoOutfit,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "justified" => Some(Self::Justified),
            "no-outfit" => Some(Self::NoOutfit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Justified => "justified",
            Self::NoOutfit => "no-outfit",
        }
    }

    /// Printed mark.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Present => "ح",
            Self::Absent => "غ",
            Self::Justified => "م",
            Self::NoOutfit => "ب.ل",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Present => "حاضر",
            Self::Absent => "غائب",
            Self::Justified => "مبرر",
            Self::NoOutfit => "بدون لباس",
        }
    }

    pub const ALL: [AttendanceStatus; 4] =
        [Self::Present, Self::Absent, Self::Justified, Self::NoOutfit];
}

fn parse_month(params: &Value) -> Result<YearMonth, HandlerErr> {
    let raw = get_required_str(params, "month")?;
    parse_month_key(&raw).map_err(HandlerErr::bad_params)
}

fn parse_slot_kind(conn: &Connection, params: &Value) -> Result<SlotKind, HandlerErr> {
    match get_optional_str(params, "slotKind")? {
        Some(raw) => SlotKind::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("slotKind must be one of: week, day")),
        None => Ok(attendance_settings(conn)?.slot_kind),
    }
}

/// `null` clears; anything else must be a known status.
fn parse_status(params: &Value) -> Result<Option<AttendanceStatus>, HandlerErr> {
    match params.get("status") {
        None => Err(HandlerErr::bad_params("missing status")),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => AttendanceStatus::parse(s).map(Some).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: present, absent, justified, no-outfit")
        }),
        Some(_) => Err(HandlerErr::bad_params("status must be string or null")),
    }
}

fn parse_slot(params: &Value, ym: YearMonth, kind: SlotKind) -> Result<u32, HandlerErr> {
    let slot = params
        .get("slot")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("slot must be a positive integer"))?;
    let max = kind.slots_in(ym);
    if slot == 0 || slot > u64::from(max) {
        return Err(HandlerErr::bad_params(format!("slot must be in 1..={}", max))
            .with_details(json!({ "slot": slot, "max": max, "slotKind": kind.as_str() })));
    }
    Ok(slot as u32)
}

fn month_students(conn: &Connection, params: &Value) -> Result<(Option<String>, Vec<Student>), HandlerErr> {
    if let Some(department_id) = get_optional_str(params, "departmentId")? {
        require_department(conn, &department_id)?;
        let students = list_students(
            conn,
            &StudentFilter {
                department_id: Some(department_id.clone()),
                ..StudentFilter::default()
            },
        )?;
        return Ok((Some(department_id), students));
    }
    let institution_id = get_optional_str(params, "institutionId")?;
    let level = get_optional_str(params, "level")?;
    let (Some(institution_id), Some(level)) = (institution_id, level) else {
        return Err(HandlerErr::bad_params(
            "provide departmentId or both institutionId and level",
        ));
    };
    let students = list_students(
        conn,
        &StudentFilter {
            institution_id: Some(institution_id),
            level: Some(level),
            ..StudentFilter::default()
        },
    )?;
    Ok((None, students))
}

fn attendance_month_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let ym = parse_month(params)?;
    let kind = parse_slot_kind(conn, params)?;
    let (department_id, students) = month_students(conn, params)?;
    let docs = attendance_for_month(conn, &ym.key())?;

    let rows: Vec<Value> = students
        .iter()
        .map(|s| {
            let doc = docs.get(&s.id);
            json!({
                "studentId": s.id,
                "displayName": s.display_name(),
                "gender": s.gender,
                "status": s.status,
                "slotKind": doc.map(|d| d.slot_kind.as_str()),
                "records": doc.map(|d| records_json(&d.records)).unwrap_or_else(|| json!({}))
            })
        })
        .collect();
    let student_rows: Vec<Value> = students
        .iter()
        .map(|s| json!({ "id": s.id, "displayName": s.display_name() }))
        .collect();
    Ok(json!({
        "month": ym.key(),
        "departmentId": department_id,
        "slotKind": kind.as_str(),
        "slots": kind.slots_in(ym),
        "students": student_rows,
        "rows": rows
    }))
}

/// Merges one slot into the student's month record, creating it on first
/// write. The student's current department is stored alongside. A month
/// keeps one slot kind while it holds any marks.
fn write_slot(
    conn: &Connection,
    student: &Student,
    ym: YearMonth,
    kind: SlotKind,
    slot: u32,
    status: Option<AttendanceStatus>,
) -> Result<BTreeMap<u32, String>, HandlerErr> {
    let month = ym.key();
    let existing = get_attendance(conn, &student.id, &month)?;
    if let Some(doc) = existing.as_ref() {
        if doc.slot_kind != kind.as_str() && !doc.records.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "month {} is recorded by {}; cannot mix in {} slots",
                month,
                doc.slot_kind,
                kind.as_str()
            ))
            .with_details(json!({
                "studentId": student.id,
                "existing": doc.slot_kind,
                "requested": kind.as_str()
            })));
        }
    }
    let mut records = existing.map(|d| d.records).unwrap_or_default();
    match status {
        Some(s) => {
            records.insert(slot, s.as_str().to_string());
        }
        None => {
            records.remove(&slot);
        }
    }
    let records_text = records_json(&records).to_string();
    conn.execute(
        "INSERT INTO attendances(id, student_id, department_id, month, slot_kind, records, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, datetime('now'))
         ON CONFLICT(student_id, month) DO UPDATE SET
           department_id = excluded.department_id,
           slot_kind = excluded.slot_kind,
           records = excluded.records,
           updated_at = excluded.updated_at",
        (
            attendance_doc_id(&student.id, &month),
            &student.id,
            &student.department_id,
            &month,
            kind.as_str(),
            records_text,
        ),
    )
    .map_err(write_err("db_update_failed", "attendances"))?;
    Ok(records)
}

fn attendance_set_slot(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let ym = parse_month(params)?;
    let kind = parse_slot_kind(conn, params)?;
    let slot = parse_slot(params, ym, kind)?;
    let status = parse_status(params)?;
    let student = get_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let records = write_slot(conn, &student, ym, kind, slot, status)?;
    Ok(json!({
        "id": attendance_doc_id(&student_id, &ym.key()),
        "records": records_json(&records)
    }))
}

fn attendance_bulk_set_slot(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_ids = get_str_array(params, "studentIds")?;
    let ym = parse_month(params)?;
    let kind = parse_slot_kind(conn, params)?;
    let slot = parse_slot(params, ym, kind)?;
    let status = parse_status(params)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut updated = 0usize;
    let mut skipped: Vec<&str> = Vec::new();
    for id in &student_ids {
        let Some(student) = get_student(&tx, id)? else {
            skipped.push(id);
            continue;
        };
        write_slot(&tx, &student, ym, kind, slot, status)?;
        updated += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=attendance_bulk_set module=attendance status=ok month={} slot={} updated={} skipped={}",
        ym.key(),
        slot,
        updated,
        skipped.len()
    );
    Ok(json!({ "updated": updated, "skipped": skipped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.monthOpen" => Some(with_conn(state, req, attendance_month_open)),
        "attendance.setSlot" => Some(with_conn(state, req, attendance_set_slot)),
        "attendance.bulkSetSlot" => Some(with_conn(state, req, attendance_bulk_set_slot)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::AttendanceStatus;

    #[test]
    fn status_symbols_match_printed_legend() {
        let symbols: Vec<&str> = AttendanceStatus::ALL.iter().map(|s| s.symbol()).collect();
        assert_eq!(symbols, vec!["ح", "غ", "م", "ب.ل"]);
        assert_eq!(AttendanceStatus::parse("no-outfit"), Some(AttendanceStatus::NoOutfit));
        assert_eq!(AttendanceStatus::parse("late"), None);
    }
}
