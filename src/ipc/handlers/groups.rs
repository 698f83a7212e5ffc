use crate::grouping::{divide, Candidate, GroupingError, Strategy};
use crate::ipc::handlers::attendance::AttendanceStatus;
use crate::ipc::helpers::{get_optional_str, get_required_str, with_conn, HandlerErr};
use crate::ipc::queries::{
    attendance_for_student, list_students, require_department, Student, StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Share of recorded slots marked present, as a percentage. 0 with no records.
fn present_rate(conn: &Connection, student_id: &str) -> Result<f64, HandlerErr> {
    let mut recorded = 0u64;
    let mut present = 0u64;
    for doc in attendance_for_student(conn, student_id)? {
        for status in doc.records.values() {
            recorded += 1;
            if AttendanceStatus::parse(status) == Some(AttendanceStatus::Present) {
                present += 1;
            }
        }
    }
    if recorded == 0 {
        return Ok(0.0);
    }
    Ok(present as f64 / recorded as f64 * 100.0)
}

fn parse_scores(params: &Value) -> Result<Option<&Map<String, Value>>, HandlerErr> {
    match params.get("scores") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(m)) => {
            if let Some((k, _)) = m.iter().find(|(_, v)| !v.is_number()) {
                return Err(HandlerErr::bad_params(format!("scores.{} must be a number", k)));
            }
            Ok(Some(m))
        }
        Some(_) => Err(HandlerErr::bad_params("scores must be an object")),
    }
}

fn build_candidates(
    conn: &Connection,
    students: &[Student],
    scores: Option<&Map<String, Value>>,
) -> Result<Vec<Candidate>, HandlerErr> {
    students
        .iter()
        .map(|s| {
            let given = scores.and_then(|m| m.get(&s.id)).and_then(|v| v.as_f64());
            let score = match given {
                Some(v) => v,
                None => present_rate(conn, &s.id)?,
            };
            Ok(Candidate {
                student_id: s.id.clone(),
                score,
            })
        })
        .collect()
}

fn groups_suggest(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    let number_of_groups = params
        .get("numberOfGroups")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("numberOfGroups must be a positive integer"))?
        as usize;
    let strategy = match get_optional_str(params, "strategy")? {
        Some(raw) => Strategy::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("strategy must be one of: balanced, random"))?,
        None => Strategy::Balanced,
    };
    let seed = match params.get("seed") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .ok_or_else(|| HandlerErr::bad_params("seed must be a non-negative integer"))?,
        ),
    };
    let scores = parse_scores(params)?;

    require_department(conn, &department_id)?;
    let students = list_students(
        conn,
        &StudentFilter {
            department_id: Some(department_id.clone()),
            ..StudentFilter::default()
        },
    )?;
    let candidates = build_candidates(conn, &students, scores)?;

    let buckets = divide(&candidates, number_of_groups, strategy, seed).map_err(|e| match e {
        GroupingError::TooFewGroups => HandlerErr::bad_params("numberOfGroups must be at least 2"),
        GroupingError::InsufficientStudents { students, groups } => HandlerErr::new(
            "insufficient_students",
            "not enough students for the requested number of groups",
        )
        .with_details(json!({ "students": students, "groups": groups })),
    })?;

    let by_id: HashMap<&str, (&Student, f64)> = students
        .iter()
        .zip(candidates.iter())
        .map(|(s, c)| (s.id.as_str(), (s, c.score)))
        .collect();
    let groups: Vec<Vec<Value>> = buckets
        .iter()
        .map(|bucket| {
            bucket
                .iter()
                .filter_map(|id| by_id.get(id.as_str()))
                .map(|(s, score)| {
                    json!({
                        "studentId": s.id,
                        "displayName": s.display_name(),
                        "score": (score * 100.0).round() / 100.0
                    })
                })
                .collect()
        })
        .collect();

    info!(
        "event=groups_suggest module=groups status=ok department_id={} strategy={} groups={} students={}",
        department_id,
        strategy.as_str(),
        number_of_groups,
        students.len()
    );
    Ok(json!({
        "groups": groups,
        "reasoning": strategy.reasoning(),
        "strategy": strategy.as_str()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "groups.suggest" => Some(with_conn(state, req, groups_suggest)),
        _ => None,
    }
}
