use crate::calendar::{
    arabic_month_name, arabic_weekday_name, month_in_range, parse_date, parse_month_key,
    school_days_between, SlotKind, YearMonth, SCHOOL_WEEKDAYS,
};
use crate::ipc::handlers::attendance::AttendanceStatus;
use crate::ipc::helpers::{get_optional_str, get_required_str, with_conn, HandlerErr};
use crate::ipc::queries::{
    attendance_between, attendance_for_student, list_students, require_department,
    require_student, AttendanceDoc, StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

fn parse_range(params: &Value) -> Result<(NaiveDate, NaiveDate), HandlerErr> {
    let from = parse_date(&get_required_str(params, "from")?).map_err(HandlerErr::bad_params)?;
    let to = parse_date(&get_required_str(params, "to")?).map_err(HandlerErr::bad_params)?;
    if from > to {
        return Err(HandlerErr::bad_params("from must not be after to"));
    }
    Ok((from, to))
}

fn absent(status: &str) -> bool {
    status == AttendanceStatus::Absent.as_str()
}

/// Absences in one record, bucketed by weekday. Week-kind records carry no
/// day of month, so they contribute nothing here.
fn weekday_absences(doc: &AttendanceDoc, into: &mut BTreeMap<u32, u64>) {
    if SlotKind::parse(&doc.slot_kind) != Some(SlotKind::Day) {
        return;
    }
    let Ok(ym) = parse_month_key(&doc.month) else {
        return;
    };
    for (day, status) in &doc.records {
        if !absent(status) {
            continue;
        }
        if let Some(weekday) = ym.weekday_of(*day) {
            *into.entry(weekday.num_days_from_sunday()).or_insert(0) += 1;
        }
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    (part / whole * 10000.0).round() / 100.0
}

fn attendance_stats(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let (from, to) = parse_range(params)?;
    let department_id = get_optional_str(params, "departmentId")?;
    if let Some(id) = &department_id {
        require_department(conn, id)?;
    }
    let students = list_students(
        conn,
        &StudentFilter {
            department_id: department_id.clone(),
            ..StudentFilter::default()
        },
    )?;
    let population: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
    let total_students = students.len() as u64;
    let total_departments = students
        .iter()
        .filter_map(|s| s.department_id.as_deref())
        .collect::<HashSet<_>>()
        .len();
    let school_days = u64::from(school_days_between(from, to));

    let docs = attendance_between(conn, &YearMonth::of(from).key(), &YearMonth::of(to).key())?;
    let mut total_absences = 0u64;
    let mut by_month: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_weekday: BTreeMap<u32, u64> = BTreeMap::new();
    for doc in docs
        .iter()
        .filter(|d| population.contains(d.student_id.as_str()))
    {
        let n = doc.records.values().filter(|s| absent(s)).count() as u64;
        if n > 0 {
            total_absences += n;
            *by_month.entry(doc.month.clone()).or_insert(0) += n;
        }
        weekday_absences(doc, &mut by_weekday);
    }

    let total_possible = total_students * school_days;
    let (attendance_pct, absence_pct) = if total_possible > 0 {
        let whole = total_possible as f64;
        (
            percentage(whole - total_absences as f64, whole),
            percentage(total_absences as f64, whole),
        )
    } else {
        (100.0, 0.0)
    };
    let average = if total_students > 0 {
        total_absences as f64 / total_students as f64
    } else {
        0.0
    };

    let monthly: Vec<Value> = by_month
        .iter()
        .map(|(month, total)| {
            let name = parse_month_key(month)
                .map(|ym| arabic_month_name(ym.month))
                .unwrap_or("");
            json!({ "month": month, "name": name, "total": total })
        })
        .collect();
    let weekly: Vec<Value> = SCHOOL_WEEKDAYS
        .iter()
        .map(|d| {
            json!({
                "name": arabic_weekday_name(*d),
                "total": by_weekday.get(&d.num_days_from_sunday()).copied().unwrap_or(0)
            })
        })
        .collect();

    Ok(json!({
        "from": from.format("%Y-%m-%d").to_string(),
        "to": to.format("%Y-%m-%d").to_string(),
        "totalStudents": total_students,
        "totalDepartments": total_departments,
        "totalAbsences": total_absences,
        "schoolDays": school_days,
        "totalPossible": total_possible,
        "attendancePercentage": attendance_pct,
        "absencePercentage": absence_pct,
        "averageAbsencePerStudent": average,
        "monthlyAbsenceDistribution": monthly,
        "weekdayAbsenceDistribution": weekly
    }))
}

fn student_attendance(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let (from, to) = parse_range(params)?;
    let student = require_student(conn, &student_id)?;

    let mut totals: BTreeMap<&'static str, u64> =
        AttendanceStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut months: Vec<Value> = Vec::new();
    for doc in attendance_for_student(conn, &student_id)? {
        let Ok(ym) = parse_month_key(&doc.month) else {
            continue;
        };
        if !month_in_range(ym, from, to) {
            continue;
        }
        let mut counts: BTreeMap<&'static str, u64> =
            AttendanceStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for status in doc.records.values().filter_map(|s| AttendanceStatus::parse(s)) {
            *counts.entry(status.as_str()).or_insert(0) += 1;
            *totals.entry(status.as_str()).or_insert(0) += 1;
        }
        months.push(json!({
            "month": doc.month,
            "name": arabic_month_name(ym.month),
            "slotKind": doc.slot_kind,
            "counts": counts
        }));
    }
    Ok(json!({
        "studentId": student.id,
        "displayName": student.display_name(),
        "totals": totals,
        "months": months
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.attendanceStats" => Some(with_conn(state, req, attendance_stats)),
        "reports.studentAttendance" => Some(with_conn(state, req, student_attendance)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{percentage, weekday_absences};
    use crate::ipc::queries::AttendanceDoc;
    use std::collections::BTreeMap;

    fn doc(kind: &str, records: &[(u32, &str)]) -> AttendanceDoc {
        AttendanceDoc {
            student_id: "s1".into(),
            department_id: None,
            month: "2024-09".into(),
            slot_kind: kind.into(),
            records: records.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        }
    }

    #[test]
    fn weekday_buckets_only_use_day_records() {
        let mut out = BTreeMap::new();
        // 2024-09-01 is a Sunday, 2024-09-03 a Tuesday.
        weekday_absences(&doc("day", &[(1, "absent"), (3, "absent"), (4, "present")]), &mut out);
        weekday_absences(&doc("week", &[(1, "absent")]), &mut out);
        assert_eq!(out.get(&0), Some(&1));
        assert_eq!(out.get(&2), Some(&1));
        assert_eq!(out.values().sum::<u64>(), 2);
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        assert_eq!(percentage(1.0, 3.0), 33.33);
        assert_eq!(percentage(0.0, 10.0), 0.0);
    }
}
