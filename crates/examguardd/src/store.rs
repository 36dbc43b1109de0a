//! SQLite-backed template store.

use chrono::{DateTime, Utc};
use examguard_core::{Embedding, FaceTemplate, StoreError, TemplateStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_templates (
    subject     TEXT PRIMARY KEY,
    template_id TEXT NOT NULL,
    embeddings  TEXT NOT NULL,
    dimension   INTEGER,
    created_at  TEXT NOT NULL
);
";

pub struct SqliteTemplateStore {
    conn: Connection,
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl SqliteTemplateStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        tracing::info!(path = %path.display(), "template database opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self { conn })
    }

    /// Number of enrolled subjects.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM face_templates", [], |row| row.get(0))
            .map_err(backend)?;
        Ok(n.max(0) as usize)
    }
}

impl TemplateStore for SqliteTemplateStore {
    fn load(&self, subject: &str) -> Result<Option<FaceTemplate>, StoreError> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT template_id, embeddings, created_at FROM face_templates WHERE subject = ?1",
                params![subject],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(backend)?;

        let Some((id, embeddings, created_at)) = row else {
            return Ok(None);
        };
        let corrupt = |reason: String| StoreError::Corrupt {
            subject: subject.to_string(),
            reason,
        };

        Ok(Some(FaceTemplate {
            id: id.parse().map_err(|e| corrupt(format!("template id: {e}")))?,
            embeddings: serde_json::from_str::<Vec<Embedding>>(&embeddings)
                .map_err(|e| corrupt(format!("embeddings: {e}")))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| corrupt(format!("created_at: {e}")))?
                .with_timezone(&Utc),
        }))
    }

    fn save(&mut self, subject: &str, template: &FaceTemplate) -> Result<(), StoreError> {
        let embeddings = serde_json::to_string(&template.embeddings)
            .map_err(|e| StoreError::Backend(format!("encode embeddings: {e}")))?;
        let dimension = template.embeddings.first().map(|e| e.dim() as i64);

        self.conn
            .execute(
                "INSERT INTO face_templates (subject, template_id, embeddings, dimension, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(subject) DO UPDATE SET
                     template_id = excluded.template_id,
                     embeddings  = excluded.embeddings,
                     dimension   = excluded.dimension,
                     created_at  = excluded.created_at",
                params![
                    subject,
                    template.id.to_string(),
                    embeddings,
                    dimension,
                    template.created_at.to_rfc3339(),
                ],
            )
            .map_err(backend)?;
        tracing::debug!(subject, embeddings = template.len(), "template saved");
        Ok(())
    }

    fn clear(&mut self, subject: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM face_templates WHERE subject = ?1", params![subject])
            .map_err(backend)?;
        Ok(removed > 0)
    }
}
