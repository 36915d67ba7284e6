//! Session Export
//!
//! Writes one JSON report per SKU session (`sku_<barcode>.json`) plus
//! `orphans.json` for captures outside any session.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::{Session, SessionGrouping};
use crate::storage::{format_timestamp, Database, TextCapture};

/// File name for captures that belong to no session
pub const ORPHANS_FILE_NAME: &str = "orphans.json";

/// Report for one SKU session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub barcode: String,
    /// Local `YYYY-MM-DD HH:MM`
    pub created: String,
    /// Epoch milliseconds
    pub created_at: i64,
    pub captures: Vec<CaptureRow>,
}

/// Report for captures outside any session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanReport {
    pub captures: Vec<CaptureRow>,
}

/// One capture table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureRow {
    /// 1-based position in the table
    pub number: usize,
    pub payload: String,
    pub label: String,
    pub source: String,
    pub note: String,
    /// Local `YYYY-MM-DD HH:MM`
    pub captured: String,
}

/// A written report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    /// SKU barcode of a session report; `None` for the orphan report
    pub barcode: Option<String>,
    pub capture_count: usize,
}

/// File-system safe form of a barcode
///
/// Lower-cased; anything other than ASCII letters, digits, `-` and `_`
/// becomes `_`; leading and trailing `_` removed; `unknown` when nothing is left.
pub fn sanitize_barcode(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Report file name for a barcode
pub fn session_file_name(barcode: &str) -> String {
    format!("sku_{}.json", sanitize_barcode(barcode))
}

fn capture_rows(captures: &[TextCapture]) -> Vec<CaptureRow> {
    captures
        .iter()
        .enumerate()
        .map(|(index, capture)| CaptureRow {
            number: index + 1,
            payload: capture.payload.clone(),
            label: capture.label.clone().unwrap_or_default(),
            source: capture.source.clone().unwrap_or_default(),
            note: capture.note.clone().unwrap_or_default(),
            captured: format_timestamp(capture.captured_at),
        })
        .collect()
}

/// Build the report for one session
pub fn session_report(session: &Session) -> SessionReport {
    SessionReport {
        barcode: session.event.barcode.clone(),
        created: format_timestamp(session.event.created_at),
        created_at: session.event.created_at,
        captures: capture_rows(&session.captures),
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

/// Write one session's report into `dir`
pub fn export_session(session: &Session, dir: &Path) -> Result<ExportedFile> {
    ensure_dir(dir)?;
    let path = dir.join(session_file_name(&session.event.barcode));
    write_session(session, path)
}

fn write_session(session: &Session, path: PathBuf) -> Result<ExportedFile> {
    write_json(&session_report(session), &path)?;
    info!(
        "Exported {} captures for SKU {} to {}",
        session.captures.len(),
        session.event.barcode,
        path.display()
    );
    Ok(ExportedFile {
        path,
        barcode: Some(session.event.barcode.clone()),
        capture_count: session.captures.len(),
    })
}

/// File name for a session not yet in `used`
///
/// A taken name gets the event id appended, then a counter.
fn unique_file_name(session: &Session, used: &mut HashSet<String>) -> String {
    let base = sanitize_barcode(&session.event.barcode);
    let id = session.event.id;
    let mut name = format!("sku_{base}.json");
    let mut attempt = 1u32;
    while !used.insert(name.clone()) {
        name = if attempt == 1 {
            format!("sku_{base}_{id}.json")
        } else {
            format!("sku_{base}_{id}_{attempt}.json")
        };
        attempt += 1;
    }
    name
}

/// Write every session plus the orphan report into `dir`
///
/// Barcodes that sanitize to a name already written get a distinct name.
pub fn export_grouping(grouping: &SessionGrouping, dir: &Path) -> Result<Vec<ExportedFile>> {
    ensure_dir(dir)?;
    let mut written = Vec::with_capacity(grouping.sessions.len() + 1);
    let mut used_names = HashSet::new();

    for session in &grouping.sessions {
        let name = unique_file_name(session, &mut used_names);
        written.push(write_session(session, dir.join(name))?);
    }

    let orphans_path = dir.join(ORPHANS_FILE_NAME);
    write_json(
        &OrphanReport {
            captures: capture_rows(&grouping.orphans),
        },
        &orphans_path,
    )?;
    written.push(ExportedFile {
        path: orphans_path,
        barcode: None,
        capture_count: grouping.orphans.len(),
    });

    info!("Exported {} report files to {}", written.len(), dir.display());
    Ok(written)
}

/// Refresh the report of the operator's current SKU
///
/// Returns `None` when no SKU is selected or its event no longer exists.
pub fn export_current_session(
    grouping: &SessionGrouping,
    current_sku_event_id: Option<i64>,
    dir: &Path,
) -> Result<Option<ExportedFile>> {
    let Some(session) = current_sku_event_id.and_then(|id| grouping.session_for(id)) else {
        return Ok(None);
    };
    export_session(session, dir).map(Some)
}

/// Add written session reports to the export history
///
/// The orphan report has no SKU and is not recorded.
pub fn record_exports(database: &Database, files: &[ExportedFile], updated_at: i64) -> Result<()> {
    for file in files {
        let Some(barcode) = &file.barcode else {
            continue;
        };
        let file_name = file
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        database.record_sku_export(barcode, &file_name, file.capture_count, updated_at)?;
    }
    Ok(())
}
