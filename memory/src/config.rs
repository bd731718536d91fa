use std::path::Path;
use std::path::PathBuf;

use crate::error::KnowledgeError;
use crate::error::Result;

/// Per-project tooling directory, relative to the project root.
pub const TOOLING_DIR: &str = ".memory-bank";
pub const DB_FILE: &str = "knowledge.db";
pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_DB: &str = "MEMORY_BANK_DB";
pub const ENV_SKIP_DUPLICATES: &str = "MEMORY_BANK_SKIP_DUPLICATES";
pub const ENV_SEARCH_LIMIT: &str = "MEMORY_BANK_SEARCH_LIMIT";

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file. Relative paths are resolved against the project root.
    pub db_path: Option<PathBuf>,
    pub skip_duplicates: bool,
    pub search_limit: usize,
    /// Route opens through the process-wide registry.
    pub shared: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            skip_duplicates: true,
            search_limit: 10,
            shared: true,
        }
    }
}

impl StoreConfig {
    /// `<project>/.memory-bank/config.toml` if present, then environment overrides.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Self::from_file(&project_root.join(TOOLING_DIR).join(CONFIG_FILE))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&data)
            .map_err(|e| KnowledgeError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply `MEMORY_BANK_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(v) = lookup(ENV_SKIP_DUPLICATES) {
            self.skip_duplicates = parse_bool(ENV_SKIP_DUPLICATES, &v)?;
        }
        if let Some(v) = lookup(ENV_SEARCH_LIMIT) {
            self.search_limit = v
                .trim()
                .parse()
                .map_err(|_| KnowledgeError::Config(format!("{ENV_SEARCH_LIMIT}: not a count: {v}")))?;
        }
        Ok(())
    }

    pub fn resolve_db_path(&self, project_root: &Path) -> PathBuf {
        match &self.db_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_root.join(path),
            None => project_root.join(TOOLING_DIR).join(DB_FILE),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(KnowledgeError::Config(format!("{key}: not a boolean: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::from_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(
            config.resolve_db_path(dir.path()),
            dir.path().join(".memory-bank").join("knowledge.db")
        );
    }

    #[test]
    fn file_values_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_path = \"kb/notes.db\"\nskip_duplicates = false\nsearch_limit = 25\n",
        )
        .unwrap();
        let mut config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.search_limit, 25);
        assert!(!config.skip_duplicates);
        assert!(config.shared);
        assert_eq!(
            config.resolve_db_path(dir.path()),
            dir.path().join("kb").join("notes.db")
        );

        let env: HashMap<&str, &str> = [
            (ENV_SKIP_DUPLICATES, "yes"),
            (ENV_SEARCH_LIMIT, " 3 "),
            (ENV_DB, "/tmp/elsewhere.db"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert!(config.skip_duplicates);
        assert_eq!(config.search_limit, 3);
        assert_eq!(
            config.resolve_db_path(dir.path()),
            PathBuf::from("/tmp/elsewhere.db")
        );
    }

    #[test]
    fn bad_values_are_config_errors() {
        let mut config = StoreConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_SKIP_DUPLICATES).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Config(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(matches!(
            StoreConfig::from_file(&path),
            Err(KnowledgeError::Config(_))
        ));
    }
}
