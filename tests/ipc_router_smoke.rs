mod common;

use common::{create_department, create_institution, create_student, Sidecar};
use serde_json::json;

#[test]
fn data_methods_require_a_workspace() {
    let mut s = Sidecar::spawn();
    let health = s.ok("health", json!({}));
    assert!(health["version"].as_str().is_some());
    assert!(health["workspacePath"].is_null());

    for method in [
        "dashboard.summary",
        "institutions.list",
        "students.list",
        "departments.list",
        "profile.get",
        "setup.get",
    ] {
        assert_eq!(s.err_code(method, json!({})), "no_workspace", "{}", method);
    }
    assert_eq!(
        s.err_code("backup.exportWorkspaceBundle", json!({ "outPath": "/tmp/x.zip" })),
        "no_workspace"
    );
}

#[test]
fn bad_json_and_unknown_methods_are_reported() {
    let mut s = Sidecar::spawn();
    let resp = s.send_raw("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");

    assert_eq!(s.err_code("grades.list", json!({})), "not_implemented");
    // The loop keeps serving after a bad line.
    s.ok("health", json!({}));
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut s, workspace) = Sidecar::with_workspace("school-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let csv_out = workspace.join("smoke-export.csv");

    let inst = create_institution(&mut s, "مدرسة الأمل");
    let a = create_student(&mut s, &inst, "أولى ابتدائي", "علي", "بن سالم", "male");
    let b = create_student(&mut s, &inst, "أولى ابتدائي", "سارة", "قاسمي", "female");
    let dept = create_department(&mut s, &inst, "أولى ابتدائي", "الفوج 1", &[a.clone(), b.clone()]);

    s.ok("institutions.list", json!({}));
    s.ok("students.list", json!({ "institutionId": inst }));
    s.ok("students.get", json!({ "studentId": a }));
    s.ok("students.csvTemplate", json!({}));
    s.ok("students.exportCsv", json!({ "outPath": csv_out.to_string_lossy() }));
    s.ok("departments.list", json!({}));
    s.ok(
        "departments.unassignedStudents",
        json!({ "institutionId": inst, "level": "أولى ابتدائي" }),
    );
    s.ok("attendance.monthOpen", json!({ "month": "2024-10", "departmentId": dept }));
    s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 1, "status": "present" }),
    );
    s.ok(
        "attendance.bulkSetSlot",
        json!({ "studentIds": [a, b], "month": "2024-10", "slot": 2, "status": "absent" }),
    );
    s.ok(
        "reports.attendanceStats",
        json!({ "from": "2024-10-01", "to": "2024-10-31" }),
    );
    s.ok(
        "reports.studentAttendance",
        json!({ "studentId": a, "from": "2024-09-01", "to": "2025-06-30" }),
    );
    s.ok("print.studentsList", json!({}));
    s.ok("print.departments", json!({}));
    s.ok("print.attendanceMonthly", json!({ "departmentId": dept, "month": "2024-10" }));
    s.ok(
        "print.attendanceAnnual",
        json!({ "institutionId": inst, "level": "أولى ابتدائي", "schoolYearStart": 2024 }),
    );
    s.ok("print.technicalCard", json!({}));
    s.ok("profile.get", json!({}));
    s.ok("profile.update", json!({ "patch": { "wilaya": "وهران" } }));
    s.ok("groups.suggest", json!({ "departmentId": dept, "numberOfGroups": 2 }));
    s.ok("setup.get", json!({}));
    s.ok("setup.update", json!({ "section": "printer", "patch": { "marginMm": 12 } }));

    let summary = s.ok("dashboard.summary", json!({}));
    assert_eq!(summary["totalStudents"], 2);
    assert_eq!(summary["totalMales"], 1);
    assert_eq!(summary["totalFemales"], 1);
    assert_eq!(summary["totalDepartments"], 1);
    assert_eq!(summary["totalInstitutions"], 1);
    assert_eq!(summary["unassignedStudents"], 0);

    s.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert!(bundle_out.is_file());
    assert!(csv_out.is_file());

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}
