pub mod types;

use crate::error::{ConfigError, Result};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default location of the configuration document
pub const DEFAULT_CONFIG_FILE: &str = "guac-stack.json";

/// Key-path addressable configuration document persisted as JSON.
///
/// The whole document is loaded once; every `set` rewrites the file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    document: Value,
}

impl ConfigStore {
    /// Create an empty document at `path`; refuses to overwrite an existing one
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(ConfigError::InvalidValue {
                path: path.display().to_string(),
                reason: "configuration document already exists".to_string(),
            }
            .into());
        }
        let store = Self {
            path: path.to_path_buf(),
            document: Value::Object(Map::new()),
        };
        store.persist()?;
        Ok(store)
    }

    /// Load an existing document
    pub fn open(path: &Path) -> Result<Self> {
        let unreadable = |reason: String| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let document: Value =
            serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?;
        if !document.is_object() {
            return Err(unreadable("top level is not an object".to_string()).into());
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// In-memory document, for tests and dry runs
    pub fn from_value(path: &Path, document: Value) -> Self {
        Self {
            path: path.to_path_buf(),
            document,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value at a dotted path; explicit nulls count as absent
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut cur = &self.document;
        for part in dotted.split('.') {
            cur = cur.get(part)?;
        }
        (!cur.is_null()).then_some(cur)
    }

    /// String view of a scalar; empty strings count as absent
    pub fn get_str(&self, dotted: &str) -> Option<String> {
        match self.get(dotted)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_or_default(&self, dotted: &str, default: &str) -> String {
        self.get_str(dotted).unwrap_or_else(|| default.to_string())
    }

    /// True when the caller should collect a value for `dotted`
    pub fn is_unset(&self, dotted: &str) -> bool {
        self.get_str(dotted).is_none()
    }

    /// Upsert a value and persist the document
    pub fn set(&mut self, dotted: &str, value: impl Into<Value>) -> Result<()> {
        validate_path(dotted)?;
        insert_dotted(&mut self.document, dotted, value.into());
        self.persist()?;
        debug!("Set {} in {}", dotted, self.path.display());
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut content = serde_json::to_string_pretty(&self.document)?;
        content.push('\n');

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Coerce a command-line value: only `true`/`false` become booleans
pub fn parse_cli_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

fn validate_path(dotted: &str) -> std::result::Result<(), ConfigError> {
    if dotted.is_empty() || dotted.split('.').any(str::is_empty) {
        return Err(ConfigError::InvalidValue {
            path: dotted.to_string(),
            reason: "key paths are dot-separated, non-empty segments".to_string(),
        });
    }
    Ok(())
}

fn insert_dotted(root: &mut Value, dotted: &str, v: Value) {
    let mut cur = root;
    let mut parts = dotted.split('.').peekable();
    while let Some(part) = parts.next() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let map = match cur {
            Value::Object(map) => map,
            _ => unreachable!("replaced with an object above"),
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), v);
            return;
        }
        cur = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
