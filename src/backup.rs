//! Workspace backups: a zip bundle holding the SQLite file and a manifest
//! with its checksum. A bare SQLite file is accepted on import as the
//! legacy form.

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE_NAME: &str = "school.sqlite3";
const IMPORTING_SUFFIX: &str = "importing";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/school.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

pub const BUNDLE_FORMAT_V1: &str = "school-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    exported_at: Option<String>,
    #[serde(default)]
    db_sha256: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceMeta {
    source_workspace: String,
    db_bytes: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start bundle entry {}", name))?;
    zip.write_all(bytes)
        .with_context(|| format!("failed to write bundle entry {}", name))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("failed to read {}", db_path.display()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        exported_at: Some(chrono::Utc::now().to_rfc3339()),
        db_sha256: Some(db_sha256.clone()),
    };
    let meta = WorkspaceMeta {
        source_workspace: workspace_path.to_string_lossy().to_string(),
        db_bytes: db_bytes.len(),
    };
    let entries: [(&str, Vec<u8>); 3] = [
        (
            MANIFEST_ENTRY,
            serde_json::to_vec_pretty(&manifest).context("failed to serialize manifest")?,
        ),
        (DB_ENTRY, db_bytes),
        (
            META_WORKSPACE_ENTRY,
            serde_json::to_vec_pretty(&meta).context("failed to serialize workspace metadata")?,
        ),
    ];

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    for (name, bytes) in &entries {
        write_entry(&mut zip, name, bytes)?;
    }
    zip.finish().context("failed to finalize bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len(),
        db_sha256,
    })
}

fn starts_with_zip_magic(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut sig = [0u8; 4];
    let n = f.read(&mut sig).context("failed to read file signature")?;
    Ok(n == sig.len() && sig == ZIP_MAGIC)
}

/// Reads the manifest and database entry, checking format and checksum.
fn read_bundle(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle has no manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle has no db/school.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    if let Some(expected) = manifest.db_sha256.map(|s| s.to_ascii_lowercase()) {
        let actual = sha256_hex(&db_bytes);
        if actual != expected {
            return Err(anyhow!(
                "database checksum mismatch: manifest {} actual {}",
                expected,
                actual
            ));
        }
    }
    Ok(db_bytes)
}

/// Writes next to the target first, then renames over it, so a failed
/// write never leaves a half-restored database behind.
fn replace_database(workspace_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp = workspace_path.join(format!("{}.{}", DB_FILE_NAME, IMPORTING_SUFFIX));
    let _ = std::fs::remove_file(&tmp);
    {
        let mut out = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        out.write_all(bytes)
            .and_then(|_| out.sync_all())
            .context("failed to write restored database")?;
    }
    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("failed to remove {}", dst.display()))?;
    }
    std::fs::rename(&tmp, &dst)
        .with_context(|| format!("failed to move restored database to {}", dst.display()))
}

/// A backup read into memory and checked, not yet written to a workspace.
#[derive(Debug)]
pub struct StagedImport {
    db_bytes: Vec<u8>,
    format: &'static str,
}

/// Reads a bundle or legacy SQLite file and checks that it carries a SQLite
/// database. Nothing on disk changes.
pub fn stage_import(in_path: &Path) -> anyhow::Result<StagedImport> {
    let (db_bytes, format) = if starts_with_zip_magic(in_path)? {
        (read_bundle(in_path)?, BUNDLE_FORMAT_V1)
    } else {
        let raw = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.display()))?;
        (raw, LEGACY_SQLITE_FORMAT)
    };
    if !db_bytes.starts_with(SQLITE_HEADER) {
        bail!("{} is not a SQLite database", in_path.display());
    }
    Ok(StagedImport { db_bytes, format })
}

pub fn restore_staged(
    staged: &StagedImport,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    replace_database(workspace_path, &staged.db_bytes)?;
    Ok(ImportSummary {
        bundle_format_detected: staged.format.to_string(),
    })
}

pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let staged = stage_import(in_path)?;
    restore_staged(&staged, workspace_path)
}
