mod common;

use common::{create_department, create_institution, create_student, Sidecar};
use serde_json::json;

const LEVEL: &str = "ثالثة ابتدائي";

#[test]
fn month_grid_follows_slot_kind() {
    let (mut s, workspace) = Sidecar::with_workspace("school-attendance-grid");
    let inst = create_institution(&mut s, "مدرسة");
    let a = create_student(&mut s, &inst, LEVEL, "a", "A", "male");
    let dept = create_department(&mut s, &inst, LEVEL, "ف1", &[a.clone()]);

    // September 2024 starts on a Sunday: five Saturday-started weeks, 30 days.
    let weeks = s.ok("attendance.monthOpen", json!({ "month": "2024-09", "departmentId": dept }));
    assert_eq!(weeks["slotKind"], "week");
    assert_eq!(weeks["slots"], 5);
    assert_eq!(weeks["rows"][0]["studentId"], a.as_str());
    assert_eq!(weeks["rows"][0]["records"], json!({}));

    let days = s.ok(
        "attendance.monthOpen",
        json!({ "month": "2024-09", "departmentId": dept, "slotKind": "day" }),
    );
    assert_eq!(days["slots"], 30);

    s.ok("setup.update", json!({ "section": "attendance", "patch": { "slotKind": "day" } }));
    let by_level = s.ok(
        "attendance.monthOpen",
        json!({ "month": "2024-02", "institutionId": inst, "level": LEVEL }),
    );
    assert_eq!(by_level["slotKind"], "day");
    assert_eq!(by_level["slots"], 29);
    assert!(by_level["departmentId"].is_null());

    assert_eq!(
        s.err_code("attendance.monthOpen", json!({ "month": "2024-9", "departmentId": dept })),
        "bad_params"
    );
    assert_eq!(
        s.err_code("attendance.monthOpen", json!({ "month": "2024-09" })),
        "bad_params"
    );

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn set_slot_merges_and_clears() {
    let (mut s, workspace) = Sidecar::with_workspace("school-attendance-set");
    let inst = create_institution(&mut s, "مدرسة");
    let a = create_student(&mut s, &inst, LEVEL, "a", "A", "male");

    s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 1, "status": "present" }),
    );
    let res = s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 2, "status": "no-outfit" }),
    );
    assert_eq!(res["id"], format!("{}_2024-10", a));
    assert_eq!(res["records"], json!({ "1": "present", "2": "no-outfit" }));

    let res = s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 1, "status": null }),
    );
    assert_eq!(res["records"], json!({ "2": "no-outfit" }));

    let error = s.error(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 6, "status": "absent" }),
    );
    assert_eq!(error["code"], "bad_params");
    assert_eq!(error["details"]["max"], 5);

    let error = s.error(
        "attendance.setSlot",
        json!({
            "studentId": a, "month": "2024-09", "slot": 31,
            "slotKind": "day", "status": "absent"
        }),
    );
    assert_eq!(error["details"]["max"], 30);

    assert_eq!(
        s.err_code(
            "attendance.setSlot",
            json!({ "studentId": a, "month": "2024-10", "slot": 1, "status": "late" })
        ),
        "bad_params"
    );
    assert_eq!(
        s.err_code(
            "attendance.setSlot",
            json!({ "studentId": a, "month": "2024-10", "slot": 1 })
        ),
        "bad_params"
    );
    assert_eq!(
        s.err_code(
            "attendance.setSlot",
            json!({ "studentId": "ghost", "month": "2024-10", "slot": 1, "status": "absent" })
        ),
        "not_found"
    );

    // October already holds week marks.
    let error = s.error(
        "attendance.setSlot",
        json!({
            "studentId": a, "month": "2024-10", "slot": 10,
            "slotKind": "day", "status": "present"
        }),
    );
    assert_eq!(error["code"], "bad_params");
    assert_eq!(error["details"]["existing"], "week");
    assert_eq!(error["details"]["requested"], "day");
    let grid = s.ok("attendance.monthOpen", json!({ "month": "2024-10", "institutionId": inst, "level": LEVEL }));
    assert_eq!(grid["rows"][0]["records"], json!({ "2": "no-outfit" }));
    assert_eq!(grid["rows"][0]["slotKind"], "week");

    // Once cleared, the month can switch kind.
    s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 2, "status": null }),
    );
    let res = s.ok(
        "attendance.setSlot",
        json!({
            "studentId": a, "month": "2024-10", "slot": 10,
            "slotKind": "day", "status": "present"
        }),
    );
    assert_eq!(res["records"], json!({ "10": "present" }));

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bulk_set_skips_unknown_students() {
    let (mut s, workspace) = Sidecar::with_workspace("school-attendance-bulk");
    let inst = create_institution(&mut s, "مدرسة");
    let a = create_student(&mut s, &inst, LEVEL, "a", "A", "male");
    let b = create_student(&mut s, &inst, LEVEL, "b", "B", "female");
    let dept = create_department(&mut s, &inst, LEVEL, "ف1", &[a.clone(), b.clone()]);

    let res = s.ok(
        "attendance.bulkSetSlot",
        json!({
            "studentIds": [a, b, "ghost"],
            "month": "2024-11",
            "slot": 3,
            "status": "justified"
        }),
    );
    assert_eq!(res["updated"], 2);
    assert_eq!(res["skipped"], json!(["ghost"]));

    let grid = s.ok("attendance.monthOpen", json!({ "month": "2024-11", "departmentId": dept }));
    for row in grid["rows"].as_array().expect("rows") {
        assert_eq!(row["records"], json!({ "3": "justified" }));
        assert_eq!(row["slotKind"], "week");
    }

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn attendance_stats_count_only_absences() {
    let (mut s, workspace) = Sidecar::with_workspace("school-reports-stats");
    let inst = create_institution(&mut s, "مدرسة");
    let a = create_student(&mut s, &inst, LEVEL, "a", "A", "male");
    let b = create_student(&mut s, &inst, LEVEL, "b", "B", "female");
    let dept = create_department(&mut s, &inst, LEVEL, "ف1", &[a.clone(), b.clone()]);

    // 2024-09-01 is a Sunday and 2024-09-03 a Tuesday.
    for (student, day, status) in [
        (&a, 1, "absent"),
        (&b, 3, "absent"),
        (&a, 2, "justified"),
        (&b, 4, "no-outfit"),
    ] {
        s.ok(
            "attendance.setSlot",
            json!({
                "studentId": student, "month": "2024-09", "slot": day,
                "slotKind": "day", "status": status
            }),
        );
    }
    // Week records count toward totals but not toward weekdays.
    s.ok(
        "attendance.setSlot",
        json!({ "studentId": a, "month": "2024-10", "slot": 1, "status": "absent" }),
    );

    let sept = s.ok(
        "reports.attendanceStats",
        json!({ "from": "2024-09-01", "to": "2024-09-30", "departmentId": dept }),
    );
    assert_eq!(sept["totalStudents"], 2);
    assert_eq!(sept["totalDepartments"], 1);
    assert_eq!(sept["schoolDays"], 22);
    assert_eq!(sept["totalPossible"], 44);
    assert_eq!(sept["totalAbsences"], 2);
    assert_eq!(sept["absencePercentage"], 4.55);
    assert_eq!(sept["attendancePercentage"], 95.45);
    assert_eq!(sept["averageAbsencePerStudent"], 1.0);
    let weekdays: Vec<u64> = sept["weekdayAbsenceDistribution"]
        .as_array()
        .expect("weekdays")
        .iter()
        .map(|d| d["total"].as_u64().expect("total"))
        .collect();
    assert_eq!(weekdays, vec![1, 0, 1, 0, 0]);
    assert_eq!(sept["weekdayAbsenceDistribution"][0]["name"], "الأحد");

    let term = s.ok(
        "reports.attendanceStats",
        json!({ "from": "2024-09-01", "to": "2024-10-31" }),
    );
    assert_eq!(term["totalAbsences"], 3);
    assert_eq!(
        term["monthlyAbsenceDistribution"],
        json!([
            { "month": "2024-09", "name": "سبتمبر", "total": 2 },
            { "month": "2024-10", "name": "أكتوبر", "total": 1 }
        ])
    );

    // A weekend-only range has no possible attendance.
    let weekend = s.ok(
        "reports.attendanceStats",
        json!({ "from": "2024-09-06", "to": "2024-09-07" }),
    );
    assert_eq!(weekend["schoolDays"], 0);
    assert_eq!(weekend["attendancePercentage"], 100.0);
    assert_eq!(weekend["absencePercentage"], 0.0);

    assert_eq!(
        s.err_code(
            "reports.attendanceStats",
            json!({ "from": "2024-10-01", "to": "2024-09-01" })
        ),
        "bad_params"
    );

    let one = s.ok(
        "reports.studentAttendance",
        json!({ "studentId": a, "from": "2024-09-01", "to": "2024-10-31" }),
    );
    assert_eq!(one["totals"]["absent"], 2);
    assert_eq!(one["totals"]["justified"], 1);
    assert_eq!(one["totals"]["present"], 0);
    assert_eq!(one["months"].as_array().expect("months").len(), 2);
    assert_eq!(one["months"][0]["slotKind"], "day");

    drop(s);
    let _ = std::fs::remove_dir_all(workspace);
}
