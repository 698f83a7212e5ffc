use crate::calendar::{
    arabic_month_name, default_school_year_start, parse_month_key, school_year_months, SlotKind,
    YearMonth,
};
use crate::ipc::handlers::attendance::AttendanceStatus;
use crate::ipc::handlers::profile::PROFILE_SECTIONS;
use crate::ipc::handlers::setup::{attendance_settings, printer_settings, school_levels};
use crate::ipc::helpers::{get_optional_str, get_required_str, with_conn, write_text_file, HandlerErr};
use crate::ipc::queries::{
    attendance_for_month, get_institution, institution_names, list_departments, list_students,
    load_profile, profile_str, require_department, require_institution, AttendanceDoc, Student,
    StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use crate::print::{
    render_attendance_annual, render_attendance_monthly, render_departments,
    render_students_list, render_technical_card, AnnualAttendanceModel, AnnualMonth,
    AttendanceRow, CardField, CardSection, DepartmentCard, DepartmentLevel, DepartmentsModel,
    DocumentHeader, LegendEntry, MonthlyAttendanceModel, Orientation, PageSetup, StudentGroup,
    StudentRow, StudentsListModel, TechnicalCardModel,
};
use chrono::Local;
use log::info;
use maud::Markup;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Columns per month on the annual sheet.
const ANNUAL_WEEKS_PER_MONTH: u32 = 5;

fn gender_label(gender: &str) -> &'static str {
    if gender == "female" {
        "أنثى"
    } else {
        "ذكر"
    }
}

fn legend() -> Vec<LegendEntry> {
    AttendanceStatus::ALL
        .iter()
        .map(|s| LegendEntry {
            symbol: s.symbol(),
            label: s.label(),
        })
        .collect()
}

fn mark(doc: Option<&AttendanceDoc>, slot: u32) -> String {
    doc.and_then(|d| d.records.get(&slot))
        .and_then(|s| AttendanceStatus::parse(s))
        .map(|s| s.symbol().to_string())
        .unwrap_or_default()
}

struct Context {
    header: DocumentHeader,
    margin_mm: u32,
}

/// Header fields shared by every document. `school_name` overrides the
/// profile's school when the document belongs to one institution.
fn context(conn: &Connection, title: String, school_name: Option<String>) -> Result<Context, HandlerErr> {
    let profile = load_profile(conn)?;
    let printer = printer_settings(conn)?;
    let professor = format!(
        "{} {}",
        profile_str(&profile, "firstName"),
        profile_str(&profile, "lastName")
    )
    .trim()
    .to_string();
    Ok(Context {
        header: DocumentHeader {
            wilaya: profile_str(&profile, "wilaya"),
            school_name: school_name.unwrap_or_else(|| profile_str(&profile, "schoolName")),
            school_year: profile_str(&profile, "schoolYear"),
            professor,
            title,
            generated_at: printer
                .show_generated_at
                .then(|| Local::now().format("%Y-%m-%d %H:%M").to_string()),
        },
        margin_mm: printer.margin_mm,
    })
}

fn page(ctx: &Context, orientation: Orientation) -> PageSetup {
    PageSetup {
        orientation,
        margin_mm: ctx.margin_mm,
    }
}

fn level_rank(levels: &[String], level: &str) -> (usize, String) {
    let pos = levels.iter().position(|l| l == level).unwrap_or(usize::MAX);
    (pos, level.to_string())
}

/// Sorted by "last first", numbered from 1.
fn numbered_rows(students: &[&Student]) -> Vec<StudentRow> {
    let mut sorted: Vec<&Student> = students.to_vec();
    sorted.sort_by_key(|s| s.display_name());
    sorted
        .iter()
        .enumerate()
        .map(|(i, s)| StudentRow {
            number: i + 1,
            display_name: s.display_name(),
            date_of_birth: s.date_of_birth.clone().unwrap_or_default(),
            gender: gender_label(&s.gender).to_string(),
        })
        .collect()
}

fn finish<M: Serialize>(
    params: &Value,
    kind: &str,
    model: &M,
    render: fn(&M) -> Markup,
) -> Result<Value, HandlerErr> {
    let html = render(model).into_string();
    if let Some(out_path) = get_optional_str(params, "outPath")? {
        write_text_file(&out_path, &html)?;
        info!(
            "event=print_write module=print status=ok document={} path={}",
            kind, out_path
        );
    }
    Ok(json!({ "html": html, "model": model }))
}

fn print_students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_optional_str(params, "institutionId")?;
    let level = get_optional_str(params, "level")?;
    let students = list_students(
        conn,
        &StudentFilter {
            institution_id: institution_id.clone(),
            level: level.clone(),
            ..StudentFilter::default()
        },
    )?;
    if students.is_empty() {
        return Err(HandlerErr::new("no_data", "no students match the selection"));
    }
    let names = institution_names(conn)?;
    let levels = school_levels(conn)?;

    let mut grouped: BTreeMap<(String, (usize, String)), Vec<&Student>> = BTreeMap::new();
    for s in &students {
        let inst = names
            .get(&s.institution_id)
            .cloned()
            .unwrap_or_else(|| "مؤسسة غير معروفة".to_string());
        grouped
            .entry((inst, level_rank(&levels, &s.level)))
            .or_default()
            .push(s);
    }
    let groups: Vec<StudentGroup> = grouped
        .into_iter()
        .map(|((institution_name, (_, level)), members)| StudentGroup {
            institution_name,
            level,
            rows: numbered_rows(&members),
        })
        .collect();

    let institution_name = institution_id.as_ref().and_then(|id| names.get(id));
    let title = match (&level, institution_name) {
        (Some(l), Some(i)) => format!("قائمة تلاميذ {} - {}", l, i),
        (Some(l), None) => format!("قائمة تلاميذ {}", l),
        (None, Some(i)) => format!("قائمة تلاميذ مؤسسة {}", i),
        (None, None) => "القائمة الإسمية للتلاميذ".to_string(),
    };
    let ctx = context(conn, title, None)?;
    let model = StudentsListModel {
        page: page(&ctx, Orientation::Portrait),
        header: ctx.header,
        groups,
    };
    finish(params, "studentsList", &model, render_students_list)
}

fn print_departments(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_optional_str(params, "institutionId")?;
    let departments = list_departments(conn, institution_id.as_deref())?;
    if departments.is_empty() {
        return Err(HandlerErr::new("no_data", "no departments to print"));
    }
    let names = institution_names(conn)?;
    let levels = school_levels(conn)?;

    let mut by_level: BTreeMap<(usize, String), Vec<DepartmentCard>> = BTreeMap::new();
    for d in &departments {
        let members = list_students(
            conn,
            &StudentFilter {
                department_id: Some(d.id.clone()),
                ..StudentFilter::default()
            },
        )?;
        let refs: Vec<&Student> = members.iter().collect();
        by_level
            .entry(level_rank(&levels, &d.level))
            .or_default()
            .push(DepartmentCard {
                name: d.name.clone(),
                institution_name: names.get(&d.institution_id).cloned().unwrap_or_default(),
                student_count: members.len(),
                students: numbered_rows(&refs),
            });
    }
    let school_name = match &institution_id {
        Some(id) => get_institution(conn, id)?.map(|i| i.name),
        None => None,
    };
    let ctx = context(conn, "قائمة الأفواج".to_string(), school_name)?;
    let model = DepartmentsModel {
        page: page(&ctx, Orientation::Portrait),
        header: ctx.header,
        levels: by_level
            .into_iter()
            .map(|((_, level), departments)| DepartmentLevel { level, departments })
            .collect(),
    };
    finish(params, "departments", &model, render_departments)
}

fn print_attendance_monthly(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    let ym = parse_month_key(&get_required_str(params, "month")?).map_err(HandlerErr::bad_params)?;
    let kind = match get_optional_str(params, "slotKind")? {
        Some(raw) => SlotKind::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("slotKind must be one of: week, day"))?,
        None => attendance_settings(conn)?.slot_kind,
    };
    let department = require_department(conn, &department_id)?;
    let students = list_students(
        conn,
        &StudentFilter {
            department_id: Some(department_id.clone()),
            ..StudentFilter::default()
        },
    )?;
    if students.is_empty() {
        return Err(HandlerErr::new("no_data", "department has no students"));
    }
    let docs = attendance_for_month(conn, &ym.key())?;
    let slots = kind.slots_in(ym);
    let columns: Vec<String> = (1..=slots)
        .map(|n| match kind {
            SlotKind::Week => format!("الأسبوع {}", n),
            SlotKind::Day => n.to_string(),
        })
        .collect();
    let rows: Vec<AttendanceRow> = students
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let doc = docs
                .get(&s.id)
                .filter(|d| SlotKind::parse(&d.slot_kind) == Some(kind));
            AttendanceRow {
                number: i + 1,
                display_name: s.display_name(),
                marks: (1..=slots).map(|slot| mark(doc, slot)).collect(),
            }
        })
        .collect();

    let institution = require_institution(conn, &department.institution_id)?;
    let title = format!(
        "كشف الحضور الشهري - {} - {} {}",
        department.name,
        arabic_month_name(ym.month),
        ym.year
    );
    let ctx = context(conn, title, Some(institution.name))?;
    let model = MonthlyAttendanceModel {
        page: page(&ctx, Orientation::Portrait),
        header: ctx.header,
        department_name: department.name,
        month: ym.key(),
        slot_kind: kind.as_str().to_string(),
        columns,
        rows,
        legend: legend(),
    };
    finish(params, "attendanceMonthly", &model, render_attendance_monthly)
}

fn print_attendance_annual(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_required_str(params, "institutionId")?;
    let level = get_required_str(params, "level")?;
    let settings = attendance_settings(conn)?;
    let start_year = match params.get("schoolYearStart") {
        None | Some(Value::Null) => default_school_year_start(
            Local::now().date_naive(),
            settings.school_year_start_month,
        ),
        Some(v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| HandlerErr::bad_params("schoolYearStart must be a year"))?,
    };
    let institution = require_institution(conn, &institution_id)?;
    let students = list_students(
        conn,
        &StudentFilter {
            institution_id: Some(institution_id.clone()),
            level: Some(level.clone()),
            ..StudentFilter::default()
        },
    )?;
    if students.is_empty() {
        return Err(HandlerErr::new("no_data", "no students for this institution and level"));
    }

    let months: Vec<YearMonth> = school_year_months(
        start_year,
        settings.school_year_start_month,
        &settings.annual_months,
    );
    // Only week-kind records map onto the week columns.
    let mut by_month: Vec<HashMap<String, AttendanceDoc>> = Vec::with_capacity(months.len());
    for ym in &months {
        let docs = attendance_for_month(conn, &ym.key())?
            .into_iter()
            .filter(|(_, d)| SlotKind::parse(&d.slot_kind) != Some(SlotKind::Day))
            .collect();
        by_month.push(docs);
    }
    let rows: Vec<AttendanceRow> = students
        .iter()
        .enumerate()
        .map(|(i, s)| AttendanceRow {
            number: i + 1,
            display_name: s.display_name(),
            marks: by_month
                .iter()
                .flat_map(|docs| {
                    let doc = docs.get(&s.id);
                    (1..=ANNUAL_WEEKS_PER_MONTH).map(move |week| mark(doc, week))
                })
                .collect(),
        })
        .collect();

    let ctx = context(conn, format!("كشف الحضور السنوي - {}", level), Some(institution.name))?;
    let model = AnnualAttendanceModel {
        page: page(&ctx, Orientation::Landscape),
        header: ctx.header,
        level,
        months: months
            .iter()
            .map(|ym| AnnualMonth {
                key: ym.key(),
                name: arabic_month_name(ym.month).to_string(),
            })
            .collect(),
        weeks_per_month: ANNUAL_WEEKS_PER_MONTH,
        rows,
        legend: legend(),
    };
    finish(params, "attendanceAnnual", &model, render_attendance_annual)
}

fn print_technical_card(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let profile = load_profile(conn)?;
    let sections: Vec<CardSection> = PROFILE_SECTIONS
        .iter()
        .map(|(title, fields)| CardSection {
            title: *title,
            fields: fields
                .iter()
                .map(|(key, label)| CardField {
                    label: *label,
                    value: profile_str(&profile, key),
                })
                .collect(),
        })
        .collect();
    let ctx = context(conn, "البطاقة الفنية للأستاذ".to_string(), None)?;
    let model = TechnicalCardModel {
        page: page(&ctx, Orientation::Portrait),
        header: ctx.header,
        sections,
    };
    finish(params, "technicalCard", &model, render_technical_card)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "print.studentsList" => Some(with_conn(state, req, print_students_list)),
        "print.departments" => Some(with_conn(state, req, print_departments)),
        "print.attendanceMonthly" => Some(with_conn(state, req, print_attendance_monthly)),
        "print.attendanceAnnual" => Some(with_conn(state, req, print_attendance_annual)),
        "print.technicalCard" => Some(with_conn(state, req, print_technical_card)),
        _ => None,
    }
}
