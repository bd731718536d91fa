use super::*;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::SecondsFormat;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        CREATE VIRTUAL TABLE IF NOT EXISTS knowledge USING fts5(
            title,
            content,
            tags,
            source_file,
            tokenize='unicode61'
        );
        CREATE TABLE IF NOT EXISTS knowledge_meta (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            dedup INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_knowledge_hash ON knowledge_meta(content_hash);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_knowledge_hash_dedup
            ON knowledge_meta(content_hash) WHERE dedup = 1;
        CREATE INDEX IF NOT EXISTS idx_knowledge_created ON knowledge_meta(created_at);
        CREATE INDEX IF NOT EXISTS idx_knowledge_type ON knowledge_meta(type, created_at);
        CREATE TABLE IF NOT EXISTS knowledge_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id INTEGER NOT NULL,
            to_id INTEGER NOT NULL,
            link_type TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_knowledge_links_from ON knowledge_links(from_id);
        "#,
    )?;
    Ok(())
}

fn open_conn(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    init_db(&conn)?;
    Ok(conn)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_sqlite_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn conv_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn parse_item_type(idx: usize, s: &str) -> rusqlite::Result<ItemType> {
    s.parse()
        .map_err(|_| conv_err(idx, format!("invalid type: {s}")))
}

fn parse_link_type(idx: usize, s: &str) -> rusqlite::Result<LinkType> {
    s.parse()
        .map_err(|_| conv_err(idx, format!("invalid link type: {s}")))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message
                    .as_deref()
                    .is_some_and(|value| value.contains("UNIQUE constraint failed"))
        }
        _ => false,
    }
}

const HIT_COLUMNS: &str = "m.id, k.title, k.content, m.type, m.created_at";

fn row_to_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    let type_s: String = row.get(3)?;
    Ok(SearchHit {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        item_type: parse_item_type(3, &type_s)?,
        created_at: row.get(4)?,
    })
}

const ITEM_COLUMNS: &str =
    "m.id, k.title, k.content, m.type, k.tags, k.source_file, m.created_at";

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    let type_s: String = row.get(3)?;
    let tags_s: String = row.get(4)?;
    let source_file: String = row.get(5)?;
    Ok(KnowledgeItem {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        item_type: parse_item_type(3, &type_s)?,
        tags: serde_json::from_str(&tags_s)
            .map_err(|e| conv_err(4, format!("tags decode: {e}")))?,
        source_file: (!source_file.is_empty()).then_some(source_file),
        created_at: row.get(6)?,
    })
}

fn find_by_hash(conn: &Connection, hash: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM knowledge_meta WHERE content_hash = ?1 ORDER BY id LIMIT 1",
        params![hash],
        |r| r.get(0),
    )
    .optional()
}

fn insert_item(conn: &mut Connection, item: &NewItem, skip_duplicates: bool) -> Result<i64> {
    // IMMEDIATE takes the write lock up front, so the lookup and the insert
    // cannot interleave with another writer.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = insert_in_tx(&tx, item, skip_duplicates)?;
    tx.commit()?;
    Ok(id)
}

/// Insert inside a transaction the caller owns and commits.
fn insert_in_tx(conn: &Connection, item: &NewItem, skip_duplicates: bool) -> Result<i64> {
    let hash = content_hash(&item.content);
    let tags_json = serde_json::to_string(&item.tags)?;
    let source_file = item.source_file.as_deref().unwrap_or_default();

    if skip_duplicates && let Some(existing) = find_by_hash(conn, &hash)? {
        tracing::debug!("knowledge: duplicate content, reusing id {existing}");
        return Ok(existing);
    }

    let inserted = conn.execute(
        "INSERT INTO knowledge_meta (type, created_at, content_hash, dedup)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            item.item_type.as_str(),
            now_rfc3339(),
            hash,
            i64::from(skip_duplicates)
        ],
    );
    if let Err(err) = inserted {
        if is_constraint_violation(&err)
            && let Some(existing) = find_by_hash(conn, &hash)?
        {
            tracing::debug!("knowledge: dedup conflict, reusing id {existing}");
            return Ok(existing);
        }
        return Err(err.into());
    }

    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO knowledge (rowid, title, content, tags, source_file)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, item.title, item.content, tags_json, source_file],
    )?;
    Ok(id)
}

fn scan_recent(
    conn: &Connection,
    item_type: Option<&str>,
    limit: i64,
) -> rusqlite::Result<Vec<SearchHit>> {
    let sql = format!(
        "SELECT {HIT_COLUMNS} FROM knowledge_meta m
         JOIN knowledge k ON k.rowid = m.id
         WHERE (?1 IS NULL OR m.type = ?1)
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![item_type, limit], row_to_hit)?;
    rows.collect()
}

fn match_query(
    conn: &Connection,
    query: &str,
    item_type: Option<&str>,
    limit: i64,
) -> rusqlite::Result<Vec<SearchHit>> {
    // The FTS table stays unaliased: MATCH and rank resolve against its name.
    let mut stmt = conn.prepare(
        "SELECT m.id, knowledge.title, knowledge.content, m.type, m.created_at
         FROM knowledge
         JOIN knowledge_meta m ON m.id = knowledge.rowid
         WHERE knowledge MATCH ?1 AND (?2 IS NULL OR m.type = ?2)
         ORDER BY knowledge.rank
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![query, item_type, limit], row_to_hit)?;
    rows.collect()
}

/// SQLite/FTS5 knowledge store holding one connection for its whole life.
#[derive(Debug)]
pub struct SqliteKnowledgeStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteKnowledgeStore {
    /// Open (or create) the database file, creating its directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let conn = open_conn(&path)?;
        tracing::debug!("knowledge: opened {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().map_err(|_| KnowledgeError::LockPoisoned)?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| KnowledgeError::Closed(self.path.clone()))?;
        f(conn)
    }
}

impl KnowledgeStore for SqliteKnowledgeStore {
    fn add(&self, item: NewItem, skip_duplicates: bool) -> Result<i64> {
        item.validate()?;
        self.with_conn(|conn| insert_item(conn, &item, skip_duplicates))
    }

    fn search(
        &self,
        query: &str,
        item_type: Option<ItemType>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let type_filter = item_type.as_ref().map(ItemType::as_str);
        let limit = to_sqlite_limit(limit);
        self.with_conn(|conn| {
            if is_match_all(query) {
                return Ok(scan_recent(conn, type_filter, limit)?);
            }
            match match_query(conn, query, type_filter, limit) {
                Ok(hits) => Ok(hits),
                Err(err) if fts::is_query_syntax_error(&err) => {
                    let Some(neutral) = fts::neutralize(query) else {
                        tracing::debug!("knowledge: nothing searchable in {query:?}: {err}");
                        return Ok(Vec::new());
                    };
                    tracing::debug!("knowledge: retrying {query:?} as {neutral:?}: {err}");
                    Ok(match_query(conn, &neutral, type_filter, limit)?)
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn link(&self, from_id: i64, to_id: i64, link_type: LinkType) -> Result<()> {
        validate_link_id("from_id", from_id)?;
        validate_link_id("to_id", to_id)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_links (from_id, to_id, link_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![from_id, to_id, link_type.as_str(), now_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn get_linked(&self, id: i64) -> Result<Vec<LinkedItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.to_id, k.title, l.link_type
                 FROM knowledge_links l
                 LEFT JOIN knowledge k ON k.rowid = l.to_id
                 WHERE l.from_id = ?1
                 ORDER BY l.id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                let link_s: String = row.get(2)?;
                Ok(LinkedItem {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    link_type: parse_link_type(2, &link_s)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn get_stats(&self) -> Result<StoreStats> {
        let by_type = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT type, COUNT(*) FROM knowledge_meta GROUP BY type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut by_type = BTreeMap::new();
            for row in rows {
                let (item_type, n) = row?;
                by_type.insert(item_type, u64::try_from(n).unwrap_or_default());
            }
            Ok(by_type)
        })?;
        Ok(StoreStats {
            total_items: by_type.values().sum(),
            by_type,
            storage_location: self.path.display().to_string(),
        })
    }

    fn content_exists(&self, content: &str) -> Result<Option<i64>> {
        let hash = content_hash(content);
        self.with_conn(|conn| Ok(find_by_hash(conn, &hash)?))
    }

    fn get(&self, id: i64) -> Result<Option<KnowledgeItem>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM knowledge_meta m
                 JOIN knowledge k ON k.rowid = m.id
                 WHERE m.id = ?1"
            );
            Ok(conn.query_row(&sql, params![id], row_to_item).optional()?)
        })
    }

    fn export(&self, out: &mut dyn std::io::Write) -> Result<usize> {
        let items = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM knowledge_meta m
                 JOIN knowledge k ON k.rowid = m.id
                 ORDER BY m.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_item)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;
        for item in &items {
            let line = serde_json::to_string(item)?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        Ok(items.len())
    }

    fn import(&self, input: &mut dyn std::io::Read, skip_duplicates: bool) -> Result<usize> {
        let mut data = String::new();
        input.read_to_string(&mut data)?;
        // Parse everything first so a bad line leaves the store untouched.
        let items = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str::<NewItem>(line))
            .collect::<serde_json::Result<Vec<_>>>()?;
        for item in &items {
            item.validate()?;
        }
        // One transaction for the whole file: any failure rolls every line back.
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for item in &items {
                insert_in_tx(&tx, item, skip_duplicates)?;
            }
            tx.commit()?;
            Ok(items.len())
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| KnowledgeError::LockPoisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, err)| KnowledgeError::Sqlite(err))?;
            tracing::debug!("knowledge: closed {}", self.path.display());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
