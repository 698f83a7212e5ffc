#[path = "../src/backup.rs"]
mod backup;

mod common;

use common::temp_dir;
use std::fs::File;
use std::io::{Read, Write};

fn sqlite_bytes(payload: &[u8]) -> Vec<u8> {
    [&backup::SQLITE_HEADER[..], payload].concat()
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("school-backup-src");
    let workspace2 = temp_dir("school-backup-dst");
    let out_dir = temp_dir("school-backup-out");

    let db_src = workspace.join("school.sqlite3");
    let bytes = sqlite_bytes(b"sqlite-test-payload");
    std::fs::write(&db_src, &bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.schoolbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/school.sqlite3")
        .expect("database entry in bundle");
    archive
        .by_name("meta/workspace.json")
        .expect("workspace metadata entry");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("school.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2.join("school.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn checksum_mismatch_is_rejected_and_keeps_existing_db() {
    let out_dir = temp_dir("school-backup-tampered");
    let workspace = temp_dir("school-backup-tampered-dst");
    std::fs::write(workspace.join("school.sqlite3"), b"current").expect("seed current db");

    let bundle_path = out_dir.join("tampered.zip");
    let file = File::create(&bundle_path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("manifest entry");
    zip.write_all(
        serde_json::json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "dbSha256": "00".repeat(32)
        })
        .to_string()
        .as_bytes(),
    )
    .expect("write manifest");
    zip.start_file("db/school.sqlite3", opts).expect("db entry");
    zip.write_all(b"payload").expect("write db");
    zip.finish().expect("finish zip");

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("checksum mismatch must fail");
    assert!(err.to_string().contains("checksum mismatch"));
    let current = std::fs::read(workspace.join("school.sqlite3")).expect("read current db");
    assert_eq!(current, b"current");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_bundle_format_is_rejected() {
    let out_dir = temp_dir("school-backup-format");
    let workspace = temp_dir("school-backup-format-dst");

    let bundle_path = out_dir.join("other.zip");
    let file = File::create(&bundle_path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("manifest.json", zip::write::FileOptions::default())
        .expect("manifest entry");
    zip.write_all(br#"{"format":"something-else"}"#)
        .expect("write manifest");
    zip.finish().expect("finish zip");

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("foreign format must fail");
    assert!(err.to_string().contains("unsupported bundle format"));

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("school-backup-legacy");
    let workspace = temp_dir("school-backup-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let bytes = sqlite_bytes(b"legacy-sqlite-copy");
    std::fs::write(&legacy_file, &bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join("school.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_sqlite_files_are_rejected_and_keep_existing_db() {
    let out_dir = temp_dir("school-backup-junk");
    let workspace = temp_dir("school-backup-junk-dst");
    let current = sqlite_bytes(b"current");
    std::fs::write(workspace.join("school.sqlite3"), &current).expect("seed current db");

    let csv = out_dir.join("students.csv");
    std::fs::write(&csv, "firstName,lastName\nx,y\n").expect("write csv");
    let err = backup::import_workspace_bundle(&csv, &workspace)
        .expect_err("csv must not restore");
    assert!(err.to_string().contains("not a SQLite database"));

    // A well-formed bundle whose database entry is not SQLite.
    let bundle_path = out_dir.join("junk.zip");
    let file = File::create(&bundle_path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("manifest entry");
    zip.write_all(format!(r#"{{"format":"{}"}}"#, backup::BUNDLE_FORMAT_V1).as_bytes())
        .expect("write manifest");
    zip.start_file("db/school.sqlite3", opts).expect("db entry");
    zip.write_all(b"%PDF-1.7").expect("write db");
    zip.finish().expect("finish zip");
    assert!(backup::import_workspace_bundle(&bundle_path, &workspace).is_err());

    let kept = std::fs::read(workspace.join("school.sqlite3")).expect("read current db");
    assert_eq!(kept, current);
    assert!(!workspace.join("school.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
