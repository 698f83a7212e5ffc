use crate::calendar::parse_date;
use crate::ipc::helpers::{
    csv_quote, get_optional_str, get_required_str, get_str_array, non_empty_trimmed,
    parse_csv_record, with_conn, write_err, write_text_file, HandlerErr,
};
use crate::ipc::queries::{
    get_institution, institution_names, list_students, require_department, require_student,
    Student, StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

pub const CSV_TEMPLATE_HEADER: &str =
    "firstName,lastName,dateOfBirth,gender,level,institutionId,status";
const EXPORT_HEADER: [&str; 6] = ["اللقب", "الإسم", "المستوى", "الجنس", "المؤسسة", "الحالة"];
const UTF8_BOM: &str = "\u{feff}";

fn gender_label(gender: &str) -> &'static str {
    if gender == "female" {
        "أنثى"
    } else {
        "ذكر"
    }
}

fn status_label(status: &str) -> &'static str {
    if status == "exempt" {
        "معفي"
    } else {
        "يمارس"
    }
}

fn check_gender(v: &str) -> Result<(), HandlerErr> {
    match v {
        "male" | "female" => Ok(()),
        _ => Err(HandlerErr::bad_params("gender must be male or female")),
    }
}

fn check_status(v: &str) -> Result<(), HandlerErr> {
    match v {
        "active" | "exempt" => Ok(()),
        _ => Err(HandlerErr::bad_params("status must be active or exempt")),
    }
}

fn validate_student(conn: &Connection, s: &Student) -> Result<(), HandlerErr> {
    for (key, value) in [
        ("firstName", &s.first_name),
        ("lastName", &s.last_name),
        ("level", &s.level),
        ("institutionId", &s.institution_id),
    ] {
        if value.trim().is_empty() {
            return Err(HandlerErr::bad_params(format!("{} is required", key)));
        }
    }
    check_gender(&s.gender)?;
    check_status(&s.status)?;
    if let Some(dob) = &s.date_of_birth {
        parse_date(dob).map_err(HandlerErr::bad_params)?;
    }
    if get_institution(conn, &s.institution_id)?.is_none() {
        return Err(HandlerErr::bad_params("institution does not exist")
            .with_details(json!({ "institutionId": s.institution_id })));
    }
    if let Some(department_id) = &s.department_id {
        let department = require_department(conn, department_id)
            .map_err(|_| HandlerErr::bad_params("department does not exist"))?;
        if department.institution_id != s.institution_id || department.level != s.level {
            return Err(HandlerErr::bad_params(
                "student must share the department's institution and level",
            )
            .with_details(json!({
                "departmentId": department_id,
                "mismatched": [s.id]
            })));
        }
    }
    Ok(())
}

fn student_json(s: &Student, institution_name: Option<&String>) -> Value {
    let mut v = json!(s);
    v["displayName"] = json!(s.display_name());
    v["institutionName"] = json!(institution_name);
    v
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = StudentFilter {
        institution_id: get_optional_str(params, "institutionId")?,
        level: get_optional_str(params, "level")?,
        department_id: get_optional_str(params, "departmentId")?,
        unassigned: params
            .get("unassigned")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };
    let search = get_optional_str(params, "search")?.map(|s| s.to_lowercase());
    let names = institution_names(conn)?;
    let rows: Vec<Value> = list_students(conn, &filter)?
        .iter()
        .filter(|s| match &search {
            Some(q) => format!("{} {}", s.first_name, s.last_name)
                .to_lowercase()
                .contains(q.as_str()),
            None => true,
        })
        .map(|s| student_json(s, names.get(&s.institution_id)))
        .collect();
    Ok(json!({ "students": rows }))
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = require_student(conn, &student_id)?;
    let names = institution_names(conn)?;
    Ok(json!({ "student": student_json(&student, names.get(&student.institution_id)) }))
}

fn student_from_params(params: &Value) -> Result<Student, HandlerErr> {
    Ok(Student {
        id: Uuid::new_v4().to_string(),
        first_name: get_required_str(params, "firstName")?,
        last_name: get_required_str(params, "lastName")?,
        date_of_birth: get_optional_str(params, "dateOfBirth")?,
        gender: get_optional_str(params, "gender")?.unwrap_or_else(|| "male".to_string()),
        level: get_required_str(params, "level")?,
        institution_id: get_required_str(params, "institutionId")?,
        status: get_optional_str(params, "status")?.unwrap_or_else(|| "active".to_string()),
        department_id: get_optional_str(params, "departmentId")?,
    })
}

fn insert_student(conn: &Connection, s: &Student) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO students(
           id, first_name, last_name, date_of_birth, gender, level,
           institution_id, status, department_id, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        (
            &s.id,
            &s.first_name,
            &s.last_name,
            &s.date_of_birth,
            &s.gender,
            &s.level,
            &s.institution_id,
            &s.status,
            &s.department_id,
        ),
    )
    .map_err(write_err("db_insert_failed", "students"))?;
    Ok(())
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student = student_from_params(params)?;
    validate_student(conn, &student)?;
    insert_student(conn, &student)?;
    info!(
        "event=student_create module=students status=ok student_id={}",
        student.id
    );
    Ok(json!({ "studentId": student.id }))
}

fn patch_string(k: &str, v: &Value) -> Result<String, HandlerErr> {
    v.as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("patch.{} must be string", k)))
}

fn patch_nullable(k: &str, v: &Value) -> Result<Option<String>, HandlerErr> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(non_empty_trimmed(s)),
        _ => Err(HandlerErr::bad_params(format!(
            "patch.{} must be string or null",
            k
        ))),
    }
}

fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let mut s = require_student(conn, &student_id)?;
    for (k, v) in patch {
        match k.as_str() {
            "firstName" => s.first_name = patch_string(k, v)?,
            "lastName" => s.last_name = patch_string(k, v)?,
            "level" => s.level = patch_string(k, v)?,
            "gender" => s.gender = patch_string(k, v)?,
            "status" => s.status = patch_string(k, v)?,
            "institutionId" => s.institution_id = patch_string(k, v)?,
            "dateOfBirth" => s.date_of_birth = patch_nullable(k, v)?,
            "departmentId" => s.department_id = patch_nullable(k, v)?,
            other => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown student field: {}",
                    other
                )))
            }
        }
    }
    validate_student(conn, &s)?;
    conn.execute(
        "UPDATE students SET
           first_name = ?, last_name = ?, date_of_birth = ?, gender = ?, level = ?,
           institution_id = ?, status = ?, department_id = ?, updated_at = datetime('now')
         WHERE id = ?",
        (
            &s.first_name,
            &s.last_name,
            &s.date_of_birth,
            &s.gender,
            &s.level,
            &s.institution_id,
            &s.status,
            &s.department_id,
            &student_id,
        ),
    )
    .map_err(write_err("db_update_failed", "students"))?;
    Ok(json!({ "ok": true }))
}

fn delete_student_rows(conn: &Connection, student_id: &str) -> Result<usize, HandlerErr> {
    conn.execute("DELETE FROM attendances WHERE student_id = ?", [student_id])
        .map_err(write_err("db_delete_failed", "attendances"))?;
    conn.execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(write_err("db_delete_failed", "students"))
}

fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student(conn, &student_id)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    delete_student_rows(&tx, &student_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=student_delete module=students status=ok student_id={}",
        student_id
    );
    Ok(json!({ "ok": true }))
}

fn students_delete_many(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let ids = get_str_array(params, "studentIds")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut deleted = 0usize;
    for id in &ids {
        deleted += delete_student_rows(&tx, id)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=students_delete_many module=students status=ok requested={} deleted={}",
        ids.len(),
        deleted
    );
    Ok(json!({ "deleted": deleted }))
}

fn students_export_csv(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let all = list_students(conn, &StudentFilter::default())?;
    let selected: Vec<&Student> = match params.get("studentIds") {
        None | Some(Value::Null) => all.iter().collect(),
        Some(_) => {
            let ids = get_str_array(params, "studentIds")?;
            all.iter().filter(|s| ids.contains(&s.id)).collect()
        }
    };
    if selected.is_empty() {
        return Err(HandlerErr::new("no_data", "no students to export"));
    }
    let names = institution_names(conn)?;
    let mut lines: Vec<String> = Vec::with_capacity(selected.len() + 1);
    lines.push(EXPORT_HEADER.join(","));
    for s in &selected {
        let institution = names.get(&s.institution_id).map(String::as_str).unwrap_or("");
        let fields = [
            s.last_name.as_str(),
            s.first_name.as_str(),
            s.level.as_str(),
            gender_label(&s.gender),
            institution,
            status_label(&s.status),
        ];
        lines.push(
            fields
                .iter()
                .map(|f| csv_quote(f))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    let csv = format!("{}{}\n", UTF8_BOM, lines.join("\n"));
    if let Some(out_path) = get_optional_str(params, "outPath")? {
        write_text_file(&out_path, &csv)?;
    }
    Ok(json!({ "csv": csv, "rowCount": selected.len() }))
}

fn students_csv_template(_conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({ "csv": format!("{}\n", CSV_TEMPLATE_HEADER) }))
}

/// Header-mapped rows of a student CSV. Line numbers are 1-based and count
/// the header line.
fn parse_import_rows(text: &str) -> Vec<(usize, HashMap<String, String>)> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut lines = text.lines().enumerate();
    let Some((_, header_line)) = lines.next() else {
        return Vec::new();
    };
    let header: Vec<String> = parse_csv_record(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    lines
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let row = header
                .iter()
                .cloned()
                .zip(parse_csv_record(line).into_iter().map(|f| f.trim().to_string()))
                .collect();
            (idx + 1, row)
        })
        .collect()
}

fn students_import_csv(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let text = match get_optional_str(params, "csvText")? {
        Some(t) => t,
        None => {
            let in_path = get_required_str(params, "inPath")
                .map_err(|_| HandlerErr::bad_params("missing csvText or inPath"))?;
            std::fs::read_to_string(&in_path).map_err(|e| {
                HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": in_path }))
            })?
        }
    };

    let names = institution_names(conn)?;
    let mut accepted: Vec<Student> = Vec::new();
    let mut skipped: Vec<Value> = Vec::new();
    for (line, row) in parse_import_rows(&text) {
        let field = |k: &str| row.get(k).and_then(|v| non_empty_trimmed(v));
        let (Some(first_name), Some(last_name), Some(institution_id)) =
            (field("firstName"), field("lastName"), field("institutionId"))
        else {
            skipped.push(json!({ "line": line, "reason": "missing required field" }));
            continue;
        };
        if !names.contains_key(&institution_id) {
            skipped.push(json!({ "line": line, "reason": "unknown institution" }));
            continue;
        }
        let date_of_birth = field("dateOfBirth").filter(|d| parse_date(d).is_ok());
        let gender = match field("gender").as_deref() {
            Some("female") => "female",
            _ => "male",
        };
        let status = match field("status").as_deref() {
            Some("exempt") => "exempt",
            _ => "active",
        };
        accepted.push(Student {
            id: Uuid::new_v4().to_string(),
            first_name,
            last_name,
            date_of_birth,
            gender: gender.to_string(),
            level: field("level").unwrap_or_default(),
            institution_id,
            status: status.to_string(),
            department_id: None,
        });
    }

    if accepted.is_empty() {
        return Err(HandlerErr::new("no_valid_rows", "no importable rows found")
            .with_details(json!({ "skipped": skipped })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for s in &accepted {
        insert_student(&tx, s)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=students_import module=students status=ok imported={} skipped={}",
        accepted.len(),
        skipped.len()
    );
    Ok(json!({ "imported": accepted.len(), "skipped": skipped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.get" => Some(with_conn(state, req, students_get)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        "students.deleteMany" => Some(with_conn(state, req, students_delete_many)),
        "students.exportCsv" => Some(with_conn(state, req, students_export_csv)),
        "students.csvTemplate" => Some(with_conn(state, req, students_csv_template)),
        "students.importCsv" => Some(with_conn(state, req, students_import_csv)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_import_rows;

    #[test]
    fn import_rows_map_by_header_and_skip_blank_lines() {
        let text = "\u{feff}firstName,lastName,institutionId\nعلي,بن أحمد,i1\n\n\"Sara\",\"Ait, Ali\",i2\n";
        let rows = parse_import_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[0].1.get("firstName").map(String::as_str), Some("علي"));
        assert_eq!(rows[1].0, 4);
        assert_eq!(rows[1].1.get("lastName").map(String::as_str), Some("Ait, Ali"));
    }
}
