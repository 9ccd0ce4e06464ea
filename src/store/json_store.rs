use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Serialize, de::DeserializeOwned};

pub const LEDGER_FILE: &str = "placements.json";
pub const ATTEMPTS_FILE: &str = "best_stats.json";
pub const AGGREGATES_FILE: &str = "aggregates.json";
pub const WIZARD_FILE: &str = "wizard.json";
pub const WIZARD_MIRROR_FILE: &str = "wizard_mirror.json";

/// Directory of pretty-printed JSON documents, written atomically.
#[derive(Clone, Debug)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sortquest");
        Self::with_base_dir(base_dir)
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("cannot create {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Lenient load: missing or unreadable files yield the default value.
    pub fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.file_path(name);
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => T::default(),
            }
        } else {
            T::default()
        }
    }

    /// Strict load: `Ok(None)` only when the file does not exist yet.
    pub fn load_strict<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let data = serde_json::from_str(&content)
            .with_context(|| format!("corrupt store file {}", path.display()))?;
        Ok(Some(data))
    }

    pub fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        self.write_atomic(&self.file_path(name), json.as_bytes())
    }

    /// Write raw bytes below the store directory, creating parents.
    /// `relative` must stay inside the store.
    pub fn write_blob(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("blob path escapes the store: {relative}");
        }
        let path = self.base_dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_atomic(&path, bytes)?;
        Ok(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::TempDir;

    fn make_test_store() -> (TempDir, JsonStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_missing_file_loads_default() {
        let (_dir, store) = make_test_store();
        let data: BTreeMap<String, u32> = store.load("nothing.json");
        assert!(data.is_empty());
        let strict: Option<BTreeMap<String, u32>> = store.load_strict("nothing.json").unwrap();
        assert!(strict.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = make_test_store();
        let mut data = BTreeMap::new();
        data.insert("a".to_string(), 3u32);
        store.save("data.json", &data).unwrap();
        let loaded: BTreeMap<String, u32> = store.load("data.json");
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_no_residual_tmp_files() {
        let (dir, store) = make_test_store();
        store.save("data.json", &vec![1, 2, 3]).unwrap();
        let tmp_files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(tmp_files.is_empty(), "no residual .tmp files");
    }

    #[test]
    fn test_corrupt_file_is_lenient_but_strict_errors() {
        let (_dir, store) = make_test_store();
        fs::write(store.file_path("bad.json"), "{not json").unwrap();
        let lenient: Vec<u32> = store.load("bad.json");
        assert!(lenient.is_empty());
        let strict: Result<Option<Vec<u32>>> = store.load_strict("bad.json");
        assert!(strict.unwrap_err().to_string().contains("corrupt store file"));
    }

    #[test]
    fn test_blob_cannot_escape_store() {
        let (_dir, store) = make_test_store();
        assert!(store.write_blob("../evil.bin", b"x").is_err());
        let path = store.write_blob("attachments/u1/a.pdf", b"pdf").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"pdf");
    }
}
