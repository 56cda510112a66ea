use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::auction::AuctionRecord;

/// A remembered answer for one user's question.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub question: String,
    pub answer: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

pub struct ShapiroDatabase {
    conn: Mutex<Connection>,
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Escape LIKE wildcards so the snippet is matched literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl ShapiroDatabase {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Create or open the database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    /// Create the database schema
    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS auction_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                current_lord_id INTEGER,
                current_lord_username TEXT,
                current_price INTEGER NOT NULL DEFAULT 50,
                lord_until TEXT
            )"#,
            [],
        )?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS message_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )"#,
            [],
        )?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS bot_memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )"#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bot_memory_user ON bot_memory(user_id, id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_message_history_user ON message_history(user_id)",
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // Auction
    // ========================================================================

    /// Create the singleton auction row if it does not exist yet.
    pub fn seed_auction_state(&self, starting_price: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO auction_state (id, current_price) VALUES (1, ?1)",
            [starting_price],
        )?;
        Ok(())
    }

    /// Read the singleton auction row, if it has been created.
    pub fn get_auction_state(&self) -> Result<Option<AuctionRecord>> {
        let conn = self.lock_conn()?;
        Self::read_auction_row(&conn)
    }

    fn read_auction_row(conn: &Connection) -> Result<Option<AuctionRecord>> {
        let record = conn
            .query_row(
                "SELECT current_lord_id, current_lord_username, current_price, lord_until
                 FROM auction_state WHERE id = 1",
                [],
                |row| {
                    let lord_until = row
                        .get::<_, Option<String>>(3)?
                        .map(|raw| parse_timestamp(3, raw))
                        .transpose()?;
                    Ok(AuctionRecord {
                        lord_id: row.get(0)?,
                        lord_username: row.get(1)?,
                        price: row.get(2)?,
                        lord_until,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Hand the lordship to `user_id`, raising the price by `increment` over
    /// the stored price. Read and write happen in one transaction under the
    /// connection lock, so concurrent bids cannot lose an increment.
    pub fn apply_auction_bid(
        &self,
        user_id: i64,
        username: &str,
        increment: i64,
        lord_until: DateTime<Utc>,
        starting_price: i64,
    ) -> Result<AuctionRecord> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let current_price = Self::read_auction_row(&tx)?
            .map(|record| record.price)
            .unwrap_or(starting_price);
        let new_price = current_price + increment;

        tx.execute(
            "INSERT INTO auction_state (id, current_lord_id, current_lord_username, current_price, lord_until)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                current_lord_id = excluded.current_lord_id,
                current_lord_username = excluded.current_lord_username,
                current_price = excluded.current_price,
                lord_until = excluded.lord_until",
            params![user_id, username, new_price, lord_until.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(AuctionRecord {
            lord_id: Some(user_id),
            lord_username: Some(username.to_string()),
            price: new_price,
            lord_until: Some(lord_until),
        })
    }

    // ========================================================================
    // Answer memory
    // ========================================================================

    /// Find the lowest-id memory of `user_id` whose stored question contains
    /// `snippet`. Matching uses SQLite LIKE, so ASCII letters compare
    /// case-insensitively.
    pub fn find_memory_containing(&self, user_id: i64, snippet: &str) -> Result<Option<MemoryEntry>> {
        let pattern = format!("%{}%", escape_like(snippet));
        let conn = self.lock_conn()?;
        let entry = conn
            .query_row(
                "SELECT id, user_id, question, answer, usage_count, created_at
                 FROM bot_memory
                 WHERE user_id = ?1 AND question LIKE ?2 ESCAPE '\\'
                 ORDER BY id ASC
                 LIMIT 1",
                params![user_id, pattern],
                |row| {
                    Ok(MemoryEntry {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        question: row.get(2)?,
                        answer: row.get(3)?,
                        usage_count: row.get(4)?,
                        created_at: parse_timestamp(5, row.get(5)?)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert a memory row with a usage count of 1 and return its id.
    pub fn insert_memory(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO bot_memory (user_id, question, answer, usage_count, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![user_id, question, answer, created_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn count_memories(&self, user_id: i64) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(1) FROM bot_memory WHERE user_id = ?1",
            [user_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as usize)
    }

    // ========================================================================
    // Message log
    // ========================================================================

    /// Append a question and its answer to the log. Both rows are written in
    /// one transaction, so a turn is logged whole or not at all.
    pub fn add_chat_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
        asked_at: DateTime<Utc>,
        answered_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO message_history (user_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            stmt.execute(params![user_id, "user", question, asked_at.to_rfc3339()])?;
            stmt.execute(params![user_id, "assistant", answer, answered_at.to_rfc3339()])?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count_messages(&self, user_id: i64) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(1) FROM message_history WHERE user_id = ?1",
            [user_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
