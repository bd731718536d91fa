//! Helpers for handing user text to an FTS5 `MATCH`.

/// Rewrite free text so FTS5 parses it as plain terms: every whitespace
/// separated token becomes a double-quoted string (inner quotes doubled), and
/// the tokens are ANDed implicitly. Returns `None` when no token carries a
/// searchable character.
pub fn neutralize(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Whether SQLite rejected the text of a `MATCH` expression rather than
/// failing for a storage reason. The search statements only name tables this
/// crate creates, so a plain `SQLITE_ERROR` from them comes from the query
/// text (`fts5: syntax error`, `unknown special query`, a malformed `NEAR`,
/// an unknown column filter). Busy, locked, I/O and corruption failures carry
/// their own codes and are not retried.
pub fn is_query_syntax_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == rusqlite::ErrorCode::Unknown
    )
}
