use crate::error::{Error, Result};
use crate::types::{Collection, SCHEMA_VERSION};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the document file inside the data directory
pub const DOC_FILE: &str = "problems.json";
const CONFIG_FILE: &str = "config.yaml";

/// Whole-document persistence.
///
/// `load` must return a well-formed empty collection when no backing
/// document exists yet; `save` must replace the document atomically.
/// There is deliberately no cross-process locking: two writers racing on
/// the same document is last-writer-wins at whole-document granularity.
pub trait Store {
    fn load(&self) -> Result<Collection>;
    fn save(&mut self, doc: &Collection) -> Result<()>;
}

/// File-backed store rooted at a `.lifetrack` directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store at the given data directory, creating it (and a
    /// config.yaml with an inferred item prefix) if missing
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            let prefix = infer_prefix(&dir).unwrap_or_else(|| "lt".to_string());
            write_config(&config_path, &prefix)?;
        }

        Ok(Self { dir })
    }

    /// Initialize a new data directory with an explicit or inferred prefix
    pub fn init(dir: PathBuf, prefix: Option<String>) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let prefix = prefix
            .or_else(|| infer_prefix(&dir))
            .unwrap_or_else(|| "lt".to_string());
        write_config(&dir.join(CONFIG_FILE), &prefix)?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backing document
    pub fn doc_path(&self) -> PathBuf {
        self.dir.join(DOC_FILE)
    }

    /// Read the item-prefix from config.yaml
    pub fn prefix(&self) -> Result<String> {
        let content = fs::read_to_string(self.dir.join(CONFIG_FILE))?;
        let config: HashMap<String, String> = serde_yaml::from_str(&content)?;
        config
            .get("item-prefix")
            .cloned()
            .ok_or_else(|| Error::InvalidValue("config.yaml is missing 'item-prefix'".to_string()))
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Collection> {
        let path = self.doc_path();
        if !path.exists() {
            return Ok(Collection::empty());
        }

        let content = fs::read_to_string(&path)?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| Error::Corrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        parse_document(value, &path)
    }

    fn save(&mut self, doc: &Collection) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        atomic_write(&self.dir, &self.doc_path(), json.as_bytes())
    }
}

/// Validate and decode a raw document value.
///
/// A legacy problems/tasks document is reported as such rather than
/// treated as empty or corrupt; everything else that is not a version-2
/// collection with an items array is a fatal corruption error.
pub(crate) fn parse_document(value: serde_json::Value, path: &Path) -> Result<Collection> {
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version == Some(SCHEMA_VERSION as u64) {
        if !value.get("items").map(|v| v.is_array()).unwrap_or(false) {
            return Err(Error::Corrupt {
                path: path.to_path_buf(),
                detail: "missing top-level 'items' array".to_string(),
            });
        }
        return serde_json::from_value(value).map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        });
    }

    if value.get("problems").is_some() || value.get("tasks").is_some() {
        return Err(Error::UnmigratedSchema {
            path: path.to_path_buf(),
        });
    }

    Err(Error::Corrupt {
        path: path.to_path_buf(),
        detail: format!("unrecognized schema (version: {:?})", version),
    })
}

/// Write `contents` to `path` atomically: serialize into a sibling
/// temporary file, then rename over the real location. A crash before the
/// rename leaves the previous document intact; after it, the new one.
pub(crate) fn atomic_write(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn write_config(config_path: &Path, prefix: &str) -> Result<()> {
    let mut config = HashMap::new();
    config.insert("item-prefix".to_string(), prefix.to_string());
    fs::write(config_path, serde_yaml::to_string(&config)?)?;
    Ok(())
}

/// Infer a prefix from the directory enclosing the data dir
fn infer_prefix(dir: &Path) -> Option<String> {
    let parent = dir.parent()?;
    let name = parent.file_name()?.to_str()?;
    Some(name.to_lowercase().replace([' ', '_'], "-"))
}

/// In-memory store with the same contract, for tests
#[derive(Default)]
pub struct MemStore {
    doc: Collection,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn load(&self) -> Result<Collection> {
        Ok(self.doc.clone())
    }

    fn save(&mut self, doc: &Collection) -> Result<()> {
        self.doc = doc.clone();
        Ok(())
    }
}
