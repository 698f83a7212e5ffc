//! Printable Arabic documents.
//!
//! Every document is a self-contained right-to-left HTML page with its own
//! `@page` rules; the shell hands it to the platform print dialog as is.

use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde::Serialize;

const PLACEHOLDER: &str = "...";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    fn css(self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSetup {
    pub orientation: Orientation,
    pub margin_mm: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHeader {
    pub wilaya: String,
    pub school_name: String,
    pub school_year: String,
    pub professor: String,
    pub title: String,
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub number: usize,
    pub display_name: String,
    pub date_of_birth: String,
    pub gender: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub institution_name: String,
    pub level: String,
    pub rows: Vec<StudentRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentsListModel {
    pub page: PageSetup,
    pub header: DocumentHeader,
    pub groups: Vec<StudentGroup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentCard {
    pub name: String,
    pub institution_name: String,
    pub student_count: usize,
    pub students: Vec<StudentRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentLevel {
    pub level: String,
    pub departments: Vec<DepartmentCard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentsModel {
    pub page: PageSetup,
    pub header: DocumentHeader,
    pub levels: Vec<DepartmentLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub symbol: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub number: usize,
    pub display_name: String,
    /// One printed mark per column; empty when nothing was recorded.
    pub marks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAttendanceModel {
    pub page: PageSetup,
    pub header: DocumentHeader,
    pub department_name: String,
    pub month: String,
    pub slot_kind: String,
    pub columns: Vec<String>,
    pub rows: Vec<AttendanceRow>,
    pub legend: Vec<LegendEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualMonth {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualAttendanceModel {
    pub page: PageSetup,
    pub header: DocumentHeader,
    pub level: String,
    pub months: Vec<AnnualMonth>,
    pub weeks_per_month: u32,
    pub rows: Vec<AttendanceRow>,
    pub legend: Vec<LegendEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSection {
    pub title: &'static str,
    pub fields: Vec<CardField>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalCardModel {
    pub page: PageSetup,
    pub header: DocumentHeader,
    pub sections: Vec<CardSection>,
}

fn or_placeholder(s: &str) -> &str {
    if s.trim().is_empty() {
        PLACEHOLDER
    } else {
        s
    }
}

fn page_css(page: &PageSetup) -> String {
    format!(
        "@page {{ size: A4 {}; margin: {}mm; }}\n{}",
        page.orientation.css(),
        page.margin_mm,
        BASE_CSS
    )
}

fn document(page: &PageSetup, header: &DocumentHeader, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="ar" dir="rtl" {
            head {
                meta charset="UTF-8";
                title { (header.title) }
                style { (PreEscaped(page_css(page))) }
            }
            body {
                (render_header(header))
                main { (body) }
                @if let Some(at) = &header.generated_at {
                    p.generated { "تاريخ الإنشاء: " (at) }
                }
            }
        }
    }
}

fn render_header(h: &DocumentHeader) -> Markup {
    html! {
        header.print-header {
            h1 { "مديرية التربية لولاية: " (or_placeholder(&h.wilaya)) }
            h2 { "المدرسة الابتدائية: " (or_placeholder(&h.school_name)) }
            div.header-line {
                span { "السنة الدراسية: " (or_placeholder(&h.school_year)) }
                span { "الأستاذ: " (or_placeholder(&h.professor)) }
            }
            h1.title { (h.title) }
        }
    }
}

fn render_legend(legend: &[LegendEntry]) -> Markup {
    html! {
        div.legend {
            @for entry in legend {
                span { b { (entry.symbol) ":" } " " (entry.label) }
            }
        }
    }
}

fn render_signatures() -> Markup {
    html! {
        footer.signatures {
            div { h4 { "إمضاء المفتش" } }
            div { h4 { "إمضاء المدير" } }
        }
    }
}

pub fn render_students_list(model: &StudentsListModel) -> Markup {
    let body = html! {
        @for (idx, group) in model.groups.iter().enumerate() {
            section.student-table.page-break-before[idx > 0] {
                h2 { "المؤسسة: " (group.institution_name) " - المستوى: " (group.level) }
                table.print-table {
                    thead {
                        tr {
                            th.num { "الرقم" }
                            th { "اللقب والإسم" }
                            th { "تاريخ الميلاد" }
                        }
                    }
                    tbody {
                        @for row in &group.rows {
                            tr {
                                td.num { (row.number) }
                                td { (row.display_name) }
                                td { (row.date_of_birth) }
                            }
                        }
                    }
                }
            }
        }
        (render_signatures())
    };
    document(&model.page, &model.header, body)
}

pub fn render_departments(model: &DepartmentsModel) -> Markup {
    let body = html! {
        @for level in &model.levels {
            section {
                h2.level-title { "أفواج " (level.level) }
                div.department-grid {
                    @for dept in &level.departments {
                        div.department-card {
                            div.department-header {
                                (dept.name) " ( العدد: " (dept.student_count) " )"
                            }
                            @if dept.students.is_empty() {
                                p.empty { "لا يوجد تلاميذ." }
                            } @else {
                                table.print-table {
                                    tbody {
                                        @for row in &dept.students {
                                            tr {
                                                td.num { (row.number) }
                                                td { (row.display_name) }
                                                td { (row.gender) }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };
    document(&model.page, &model.header, body)
}

pub fn render_attendance_monthly(model: &MonthlyAttendanceModel) -> Markup {
    let body = html! {
        table.print-table {
            thead {
                tr {
                    th.num { "الرقم" }
                    th { "اللقب والإسم" }
                    @for col in &model.columns {
                        th.slot { (col) }
                    }
                }
            }
            tbody {
                @for row in &model.rows {
                    tr {
                        td.num { (row.number) }
                        td { (row.display_name) }
                        @for mark in &row.marks {
                            td.mark { (mark) }
                        }
                    }
                }
            }
        }
        (render_legend(&model.legend))
        (render_signatures())
    };
    document(&model.page, &model.header, body)
}

pub fn render_attendance_annual(model: &AnnualAttendanceModel) -> Markup {
    let body = html! {
        table.print-table.compact {
            thead {
                tr {
                    th.num rowspan="2" { "الرقم" }
                    th rowspan="2" { "اللقب والإسم" }
                    @for month in &model.months {
                        th colspan=(model.weeks_per_month) { (month.name) }
                    }
                }
                tr {
                    @for _ in &model.months {
                        @for week in 1..=model.weeks_per_month {
                            th.week { (week) }
                        }
                    }
                }
            }
            tbody {
                @for row in &model.rows {
                    tr {
                        td.num { (row.number) }
                        td { (row.display_name) }
                        @for mark in &row.marks {
                            td.mark { (mark) }
                        }
                    }
                }
            }
        }
        (render_legend(&model.legend))
        (render_signatures())
    };
    document(&model.page, &model.header, body)
}

pub fn render_technical_card(model: &TechnicalCardModel) -> Markup {
    let body = html! {
        @for section in &model.sections {
            section.card-section {
                h2 { (section.title) }
                table.card-table {
                    tbody {
                        @for field in &section.fields {
                            tr {
                                th { (field.label) }
                                td { (or_placeholder(&field.value)) }
                            }
                        }
                    }
                }
            }
        }
    };
    document(&model.page, &model.header, body)
}

const BASE_CSS: &str = r#"
* { box-sizing: border-box; }
body {
    font-family: 'Amiri', 'Traditional Arabic', 'Arial', sans-serif;
    color: #000;
    background: #fff;
    font-size: 12px;
    margin: 0;
    -webkit-print-color-adjust: exact;
    print-color-adjust: exact;
}
.print-header { text-align: center; margin-bottom: 12px; }
.print-header h1 { font-size: 16px; margin: 2px 0; }
.print-header h2 { font-size: 14px; margin: 2px 0; }
.print-header .title { font-size: 18px; margin-top: 8px; text-decoration: underline double; }
.header-line { display: flex; justify-content: space-between; font-size: 13px; }
.print-table { width: 100%; border-collapse: collapse; page-break-inside: auto; }
.print-table thead { display: table-header-group; }
.print-table tr { page-break-inside: avoid; }
.print-table th, .print-table td { border: 1px solid #555; padding: 3px; }
.print-table th { background: #e5e5e5; }
.print-table.compact th, .print-table.compact td { padding: 1px; font-size: 10px; }
td.num, th.num { width: 36px; text-align: center; }
td.mark { text-align: center; font-weight: bold; }
.page-break-before { page-break-before: always; }
.legend { margin-top: 12px; display: flex; gap: 24px; font-size: 13px; }
.signatures { margin-top: 32px; display: flex; justify-content: space-around; }
.level-title { text-align: center; background: #e5e5e5; padding: 4px; }
.department-grid { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; }
.department-card { border: 1px solid #888; page-break-inside: avoid; }
.department-header { background: #f0f0f0; text-align: center; font-weight: bold; padding: 4px; }
.empty { text-align: center; color: #666; }
.card-section { margin-bottom: 16px; page-break-inside: avoid; }
.card-table { width: 100%; border-collapse: collapse; }
.card-table th { width: 40%; text-align: right; background: #f0f0f0; }
.card-table th, .card-table td { border: 1px solid #888; padding: 6px; }
.generated { font-size: 10px; color: #555; text-align: left; }
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageSetup {
        PageSetup {
            orientation: Orientation::Landscape,
            margin_mm: 12,
        }
    }

    #[test]
    fn header_uses_placeholders_for_missing_profile_fields() {
        let header = DocumentHeader {
            title: "قائمة".into(),
            professor: "بن علي".into(),
            ..DocumentHeader::default()
        };
        let out = render_header(&header).into_string();
        assert!(out.contains("مديرية التربية لولاية: ..."));
        assert!(out.contains("الأستاذ: بن علي"));
    }

    #[test]
    fn annual_sheet_has_week_columns_per_month() {
        let model = AnnualAttendanceModel {
            page: page(),
            header: DocumentHeader::default(),
            level: "أولى ابتدائي".into(),
            months: vec![
                AnnualMonth { key: "2024-11".into(), name: "نوفمبر".into() },
                AnnualMonth { key: "2024-12".into(), name: "ديسمبر".into() },
            ],
            weeks_per_month: 5,
            rows: vec![AttendanceRow {
                number: 1,
                display_name: "x y".into(),
                marks: vec!["ح".into(); 10],
            }],
            legend: vec![],
        };
        let out = render_attendance_annual(&model).into_string();
        assert!(out.contains("size: A4 landscape"));
        assert!(out.contains("colspan=\"5\""));
        assert_eq!(out.matches("<th class=\"week\">").count(), 10);
        assert_eq!(out.matches("<td class=\"mark\">ح</td>").count(), 10);
    }

    #[test]
    fn student_names_are_escaped() {
        let model = StudentsListModel {
            page: page(),
            header: DocumentHeader::default(),
            groups: vec![StudentGroup {
                institution_name: "م".into(),
                level: "ل".into(),
                rows: vec![StudentRow {
                    number: 1,
                    display_name: "<b>x</b>".into(),
                    date_of_birth: String::new(),
                    gender: String::new(),
                }],
            }],
        };
        let out = render_students_list(&model).into_string();
        assert!(out.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(out.contains("dir=\"rtl\""));
    }
}
