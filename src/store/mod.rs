// src/store/mod.rs

//! SQLite persistence for circulars and their attachments.
//!
//! All writes for one cycle run inside a single transaction; removal deltas
//! run in their own transaction with attachments deleted before their owning
//! circulars to respect the foreign key.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Attachment, Circular};

/// SQLite-backed store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a database file, configure the connection and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        bootstrap(&mut conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        bootstrap(&mut conn)?;
        Ok(Self { conn })
    }

    /// Persist one extraction pass inside a single transaction.
    ///
    /// The first `recent_window` circulars in parse order and their
    /// attachments are upserted, updating the mutable fields on conflict. The
    /// remainder is inserted only when absent and never updated; its
    /// `added_at` timestamp is set on first insert and kept afterwards.
    pub fn apply(&mut self, circulars: &[Circular], recent_window: usize) -> Result<()> {
        let tx = self.conn.transaction()?;
        let added_at = Utc::now().to_rfc3339();

        for (index, circular) in circulars.iter().enumerate() {
            if index < recent_window {
                tx.execute(
                    "INSERT INTO circular (id, title, category, published_on, valid_until, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         title = excluded.title,
                         category = excluded.category,
                         published_on = excluded.published_on,
                         valid_until = excluded.valid_until",
                    params![
                        circular.id,
                        circular.title,
                        circular.category,
                        circular.published_on.to_string(),
                        circular.valid_until.to_string(),
                        added_at,
                    ],
                )?;
                for attachment in &circular.attachments {
                    tx.execute(
                        "INSERT INTO attachment (id, title, circular_id)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET title = excluded.title",
                        params![attachment.id, attachment.title, circular.id],
                    )?;
                }
            } else {
                tx.execute(
                    "INSERT OR IGNORE INTO circular (id, title, category, published_on, valid_until, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        circular.id,
                        circular.title,
                        circular.category,
                        circular.published_on.to_string(),
                        circular.valid_until.to_string(),
                        added_at,
                    ],
                )?;
                for attachment in &circular.attachments {
                    tx.execute(
                        "INSERT OR IGNORE INTO attachment (id, title, circular_id)
                         VALUES (?1, ?2, ?3)",
                        params![attachment.id, attachment.title, circular.id],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Persisted circular ids, newest first.
    pub fn circular_ids(&self) -> Result<Vec<u64>> {
        self.ids("SELECT id FROM circular ORDER BY id DESC")
    }

    /// Persisted attachment ids, newest first.
    pub fn attachment_ids(&self) -> Result<Vec<u64>> {
        self.ids("SELECT id FROM attachment ORDER BY id DESC")
    }

    /// Load one circular with its attachments, ordered by attachment id.
    pub fn get(&self, id: u64) -> Result<Option<Circular>> {
        let circular = self
            .conn
            .query_row(
                "SELECT id, title, category, published_on, valid_until
                 FROM circular WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, category, published_on, valid_until)) = circular else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, title FROM attachment WHERE circular_id = ?1 ORDER BY id ASC",
        )?;
        let attachments = stmt
            .query_map([id], |row| {
                Ok(Attachment {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Circular {
            id,
            title,
            category,
            published_on: parse_stored_date(&published_on)?,
            valid_until: parse_stored_date(&valid_until)?,
            attachments,
        }))
    }

    /// Delete removal candidates in one transaction, attachments before their
    /// owning circulars. Returns (circulars, attachments) removed.
    pub fn delete_removed(
        &mut self,
        circulars: &[u64],
        attachments: &[u64],
    ) -> Result<(usize, usize)> {
        let tx = self.conn.transaction()?;

        let mut removed_attachments = 0;
        for id in attachments {
            removed_attachments += tx.execute("DELETE FROM attachment WHERE id = ?1", [id])?;
        }

        let mut removed_circulars = 0;
        for id in circulars {
            removed_circulars += tx.execute("DELETE FROM circular WHERE id = ?1", [id])?;
        }

        tx.commit()?;
        Ok((removed_circulars, removed_attachments))
    }

    fn ids(&self, sql: &str) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn bootstrap(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::apply_migrations(conn)?;
    Ok(())
}

fn parse_stored_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        crate::error::AppError::config(format!("corrupt stored date {raw:?}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circular(id: u64, title: &str, attachment_ids: &[u64]) -> Circular {
        Circular {
            id,
            title: title.to_string(),
            category: "Circolari".to_string(),
            published_on: NaiveDate::from_ymd_opt(2024, 9, 7).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            attachments: attachment_ids
                .iter()
                .map(|&id| Attachment {
                    id,
                    title: format!("file {id}.pdf"),
                })
                .collect(),
        }
    }

    #[test]
    fn apply_inserts_and_reads_back() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply(&[circular(1, "Prima", &[10, 11])], 25).unwrap();

        let stored = store.get(1).unwrap().unwrap();
        assert_eq!(stored.title, "Prima");
        assert_eq!(stored.category, "Circolari");
        assert_eq!(
            stored.published_on,
            NaiveDate::from_ymd_opt(2024, 9, 7).unwrap()
        );
        assert_eq!(stored.attachments.len(), 2);
        assert_eq!(store.circular_ids().unwrap(), vec![1]);
        assert_eq!(store.attachment_ids().unwrap(), vec![11, 10]);
    }

    #[test]
    fn recent_window_rows_are_updated() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply(&[circular(1, "Vecchio titolo", &[10])], 25).unwrap();
        store.apply(&[circular(1, "Nuovo titolo", &[10])], 25).unwrap();

        assert_eq!(store.get(1).unwrap().unwrap().title, "Nuovo titolo");
    }

    #[test]
    fn rows_outside_window_are_insert_only() {
        let mut store = Store::open_in_memory().unwrap();
        let batch = vec![circular(1, "Recente", &[]), circular(2, "Storica", &[])];
        store.apply(&batch, 1).unwrap();

        let changed = vec![
            circular(1, "Recente aggiornata", &[]),
            circular(2, "Storica aggiornata", &[]),
        ];
        store.apply(&changed, 1).unwrap();

        assert_eq!(store.get(1).unwrap().unwrap().title, "Recente aggiornata");
        assert_eq!(store.get(2).unwrap().unwrap().title, "Storica");
    }

    #[test]
    fn failed_statement_rolls_back_whole_cycle() {
        let mut store = Store::open_in_memory().unwrap();
        // Break the schema so the attachment insert fails mid-transaction.
        store.conn.execute_batch("DROP TABLE attachment").unwrap();

        let result = store.apply(&[circular(1, "Prima", &[10])], 25);
        assert!(result.is_err());
        assert!(store.circular_ids().unwrap().is_empty());
    }

    #[test]
    fn delete_removes_attachments_before_circulars() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .apply(&[circular(1, "Prima", &[10]), circular(2, "Seconda", &[20])], 25)
            .unwrap();

        let (removed_circulars, removed_attachments) =
            store.delete_removed(&[2], &[20]).unwrap();
        assert_eq!((removed_circulars, removed_attachments), (1, 1));
        assert_eq!(store.circular_ids().unwrap(), vec![1]);
        assert_eq!(store.attachment_ids().unwrap(), vec![10]);
    }

    #[test]
    fn delete_of_unknown_ids_is_a_no_op() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply(&[circular(1, "Prima", &[])], 25).unwrap();

        let (removed_circulars, removed_attachments) =
            store.delete_removed(&[99], &[999]).unwrap();
        assert_eq!((removed_circulars, removed_attachments), (0, 0));
        assert_eq!(store.circular_ids().unwrap(), vec![1]);
    }

    #[test]
    fn added_at_survives_recent_window_update() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply(&[circular(1, "Prima", &[])], 25).unwrap();
        let before: String = store
            .conn
            .query_row("SELECT added_at FROM circular WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();

        store.apply(&[circular(1, "Aggiornata", &[])], 25).unwrap();
        let after: String = store
            .conn
            .query_row("SELECT added_at FROM circular WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();

        assert_eq!(before, after);
        assert_eq!(store.get(1).unwrap().unwrap().title, "Aggiornata");
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circulars.db");
        {
            let mut store = Store::open(&path).unwrap();
            store.apply(&[circular(1, "Prima", &[])], 25).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.circular_ids().unwrap(), vec![1]);
    }
}
