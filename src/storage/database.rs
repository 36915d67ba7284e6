//! SQLite database for persistent storage

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use tracing::{debug, info};

use super::records::{NewCapture, SkuEvent, SkuExport, TextCapture};
use super::CaptureStore;

const CURRENT_SCHEMA_VERSION: i32 = 2;

const CAPTURE_COLUMNS: &str =
    "id, payload, label, field_source, field_note, captured_at, sku_event_id";

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        info!("Opened capture database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    pub fn init_schema(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        run_migrations(&mut conn)
    }

    /// Record a scanned barcode, or return the event already stored for it
    pub fn insert_sku_event(&self, barcode: &str, created_at: i64) -> Result<SkuEvent> {
        let conn = self.conn.lock();
        if let Some(existing) = query_sku_event_by_barcode(&conn, barcode)? {
            debug!("Barcode {} already recorded as SKU event {}", barcode, existing.id);
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO sku_events (barcode, created_at) VALUES (?1, ?2)",
            params![barcode, created_at],
        )
        .with_context(|| format!("failed to insert SKU event for {barcode}"))?;

        let event = SkuEvent {
            id: conn.last_insert_rowid(),
            barcode: barcode.to_string(),
            created_at,
        };
        info!("Recorded SKU event {} for barcode {}", event.id, barcode);
        Ok(event)
    }

    pub fn find_sku_event_by_barcode(&self, barcode: &str) -> Result<Option<SkuEvent>> {
        let conn = self.conn.lock();
        query_sku_event_by_barcode(&conn, barcode)
    }

    pub fn find_sku_event(&self, id: i64) -> Result<Option<SkuEvent>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, barcode, created_at FROM sku_events WHERE id = ?1",
            params![id],
            row_to_sku_event,
        )
        .optional()
        .context("failed to query SKU event")
    }

    /// Delete a SKU event; captures that referenced it keep the dangling id
    pub fn delete_sku_event(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM sku_events WHERE id = ?1", params![id])
            .context("failed to delete SKU event")?;
        Ok(deleted > 0)
    }

    /// Record the latest report written for a barcode, replacing the previous one
    pub fn record_sku_export(
        &self,
        barcode: &str,
        file_name: &str,
        capture_count: usize,
        updated_at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sku_exports (barcode, file_name, capture_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(barcode) DO UPDATE SET
                 file_name = excluded.file_name,
                 capture_count = excluded.capture_count,
                 updated_at = excluded.updated_at",
            params![barcode, file_name, capture_count as i64, updated_at],
        )
        .with_context(|| format!("failed to record export for {barcode}"))?;
        Ok(())
    }

    /// Export history, most recently updated first
    pub fn list_sku_exports(&self) -> Result<Vec<SkuExport>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, barcode, file_name, capture_count, updated_at
                 FROM sku_exports ORDER BY updated_at DESC, id DESC",
            )
            .context("failed to prepare export history query")?;
        let exports = stmt
            .query_map([], |row| {
                let capture_count: i64 = row.get("capture_count")?;
                Ok(SkuExport {
                    id: row.get("id")?,
                    barcode: row.get("barcode")?,
                    file_name: row.get("file_name")?,
                    capture_count: usize::try_from(capture_count).unwrap_or_default(),
                    updated_at: row.get("updated_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read export history")?;
        Ok(exports)
    }

    pub fn delete_capture(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM text_captures WHERE id = ?1", params![id])
            .context("failed to delete capture")?;
        Ok(deleted > 0)
    }
}

impl CaptureStore for Database {
    fn find_capture_by_payload(&self, payload: &str) -> Result<Option<TextCapture>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {CAPTURE_COLUMNS} FROM text_captures WHERE payload = ?1"),
            params![payload],
            row_to_capture,
        )
        .optional()
        .context("failed to query capture by payload")
    }

    fn save_capture(&self, capture: &NewCapture) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO text_captures
                 (payload, label, field_source, field_note, captured_at, sku_event_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                capture.payload,
                capture.label,
                capture.source,
                capture.note,
                capture.captured_at,
                capture.sku_event_id,
            ],
        )
        .with_context(|| format!("failed to save capture {}", capture.payload))?;
        Ok(conn.last_insert_rowid())
    }

    fn list_sku_events(&self) -> Result<Vec<SkuEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, barcode, created_at FROM sku_events ORDER BY created_at, id")
            .context("failed to prepare SKU event query")?;
        let events = stmt
            .query_map([], row_to_sku_event)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read SKU events")?;
        Ok(events)
    }

    fn list_text_captures(&self) -> Result<Vec<TextCapture>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAPTURE_COLUMNS} FROM text_captures ORDER BY captured_at, id"
            ))
            .context("failed to prepare capture query")?;
        let captures = stmt
            .query_map([], row_to_capture)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read captures")?;
        Ok(captures)
    }
}

fn query_sku_event_by_barcode(conn: &Connection, barcode: &str) -> Result<Option<SkuEvent>> {
    conn.query_row(
        "SELECT id, barcode, created_at FROM sku_events WHERE barcode = ?1",
        params![barcode],
        row_to_sku_event,
    )
    .optional()
    .context("failed to query SKU event by barcode")
}

fn row_to_sku_event(row: &Row) -> rusqlite::Result<SkuEvent> {
    Ok(SkuEvent {
        id: row.get("id")?,
        barcode: row.get("barcode")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_capture(row: &Row) -> rusqlite::Result<TextCapture> {
    Ok(TextCapture {
        id: row.get("id")?,
        payload: row.get("payload")?,
        label: row.get("label")?,
        source: row.get("field_source")?,
        note: row.get("field_note")?,
        captured_at: row.get("captured_at")?,
        sku_event_id: row.get("sku_event_id")?,
    })
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    info!("Database schema migrated to version {}", CURRENT_SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schema_v1.sql"))
                .context("failed to execute schema_v1.sql")?;
            Ok(())
        }
        2 => {
            tx.execute_batch(include_str!("schema_v2.sql"))
                .context("failed to execute schema_v2.sql")?;
            Ok(())
        }
        _ => bail!("no migration defined for version {version}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_schema_version_set() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn
            .lock()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        // Re-running is a no-op
        db.init_schema().unwrap();
    }

    #[test]
    fn test_sku_event_barcode_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert_sku_event("9555000000012", 1_000).unwrap();
        let again = db.insert_sku_event("9555000000012", 5_000).unwrap();

        assert_eq!(first, again);
        assert_eq!(db.list_sku_events().unwrap().len(), 1);
        assert_eq!(
            db.find_sku_event_by_barcode("9555000000012").unwrap(),
            Some(first.clone())
        );
        assert_eq!(db.find_sku_event(first.id).unwrap(), Some(first));
        assert!(db.find_sku_event_by_barcode("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_and_find_capture() {
        let db = Database::open_in_memory().unwrap();
        let mut capture = NewCapture::new("TAB1234567").captured_at(2_000);
        capture.label = Some("Front".to_string());
        capture.source = Some("label".to_string());

        let id = db.save_capture(&capture).unwrap();
        let stored = db.find_capture_by_payload("TAB1234567").unwrap().unwrap();

        assert_eq!(stored.id, id);
        assert_eq!(stored.label.as_deref(), Some("Front"));
        assert_eq!(stored.source.as_deref(), Some("label"));
        assert!(stored.note.is_none());
        assert!(stored.sku_event_id.is_none());
        assert!(db.find_capture_by_payload("TXY0000000").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_payload_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.save_capture(&NewCapture::new("TAB1234567")).unwrap();
        assert!(db.save_capture(&NewCapture::new("TAB1234567")).is_err());
        assert_eq!(db.list_text_captures().unwrap().len(), 1);
    }

    #[test]
    fn test_deleting_event_leaves_reference_dangling() {
        let db = Database::open_in_memory().unwrap();
        let event = db.insert_sku_event("111", 1_000).unwrap();
        db.save_capture(&NewCapture::new("TAB1234567").with_sku_event(Some(event.id)))
            .unwrap();

        assert!(db.delete_sku_event(event.id).unwrap());
        assert!(!db.delete_sku_event(event.id).unwrap());

        let captures = db.list_text_captures().unwrap();
        assert_eq!(captures[0].sku_event_id, Some(event.id));
        assert!(db.list_sku_events().unwrap().is_empty());
    }

    #[test]
    fn test_lists_are_time_ordered() {
        let db = Database::open_in_memory().unwrap();
        db.insert_sku_event("B", 2_000).unwrap();
        db.insert_sku_event("A", 1_000).unwrap();
        db.save_capture(&NewCapture::new("TAB2222222").captured_at(20)).unwrap();
        db.save_capture(&NewCapture::new("TAB1111111").captured_at(10)).unwrap();

        let barcodes: Vec<_> = db.list_sku_events().unwrap().into_iter().map(|e| e.barcode).collect();
        assert_eq!(barcodes, vec!["A", "B"]);
        let payloads: Vec<_> = db
            .list_text_captures()
            .unwrap()
            .into_iter()
            .map(|c| c.payload)
            .collect();
        assert_eq!(payloads, vec!["TAB1111111", "TAB2222222"]);
    }

    #[test]
    fn test_delete_capture() {
        let db = Database::open_in_memory().unwrap();
        let id = db.save_capture(&NewCapture::new("TAB1234567")).unwrap();
        assert!(db.delete_capture(id).unwrap());
        assert!(db.list_text_captures().unwrap().is_empty());
    }

    #[test]
    fn test_export_history_keeps_latest_per_barcode() {
        let db = Database::open_in_memory().unwrap();
        db.record_sku_export("111", "sku_111.json", 2, 1_000).unwrap();
        db.record_sku_export("222", "sku_222.json", 0, 2_000).unwrap();
        db.record_sku_export("111", "sku_111.json", 5, 3_000).unwrap();

        let history = db.list_sku_exports().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].barcode, "111");
        assert_eq!(history[0].capture_count, 5);
        assert_eq!(history[0].updated_at, 3_000);
        assert_eq!(history[1].barcode, "222");
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("captures.db");

        {
            let db = Database::open(&path).unwrap();
            db.save_capture(&NewCapture::new("TAB1234567")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_text_captures().unwrap().len(), 1);
    }
}
