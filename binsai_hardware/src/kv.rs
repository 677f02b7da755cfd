//! Key/value areas backing the persisted config.
//!
//! `MemKvStore` lives in RAM (tests, simulation). `FileKvStore` keeps one TOML
//! document with a table per namespace and rewrites it atomically on every `set`.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io::Write};

use binsai_traits::{BoxError, KvStore, KvValue};

use crate::error::HwError;

type Namespaces = BTreeMap<String, BTreeMap<String, KvValue>>;

fn not_open() -> BoxError {
    Box::new(HwError::Store("no namespace open".into()))
}

#[derive(Debug, Default, Clone)]
pub struct MemKvStore {
    data: Namespaces,
    open: Option<String>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemKvStore {
    fn open(&mut self, namespace: &str) -> Result<(), BoxError> {
        self.open = Some(namespace.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.open = None;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<KvValue>, BoxError> {
        let ns = self.open.as_ref().ok_or_else(not_open)?;
        Ok(self.data.get(ns).and_then(|t| t.get(key)).cloned())
    }

    fn set(&mut self, key: &str, value: KvValue) -> Result<(), BoxError> {
        let ns = self.open.clone().ok_or_else(not_open)?;
        self.data.entry(ns).or_default().insert(key.to_string(), value);
        Ok(())
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    mem: MemKvStore,
}

impl FileKvStore {
    /// Open (or start) the store at `path`. A missing file is an empty store.
    pub fn open_path(path: &Path) -> Result<Self, HwError> {
        let mut mem = MemKvStore::new();
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let doc: toml::Table = text
                .parse()
                .map_err(|e| HwError::Store(format!("parse {}: {e}", path.display())))?;
            for (ns, table) in doc {
                let toml::Value::Table(table) = table else {
                    continue;
                };
                let entries = mem.data.entry(ns).or_default();
                for (k, v) in table {
                    if let Some(v) = from_toml(v) {
                        entries.insert(k, v);
                    } else {
                        tracing::warn!(key = %k, "skipping unsupported value in key/value file");
                    }
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            mem,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), HwError> {
        let mut doc = toml::Table::new();
        for (ns, entries) in &self.mem.data {
            let table: toml::Table = entries
                .iter()
                .map(|(k, v)| (k.clone(), to_toml(v)))
                .collect();
            doc.insert(ns.clone(), toml::Value::Table(table));
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&self.path, doc.to_string().as_bytes())?;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn open(&mut self, namespace: &str) -> Result<(), BoxError> {
        self.mem.open(namespace)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.mem.close()
    }

    fn get(&self, key: &str) -> Result<Option<KvValue>, BoxError> {
        self.mem.get(key)
    }

    fn set(&mut self, key: &str, value: KvValue) -> Result<(), BoxError> {
        self.mem.set(key, value)?;
        self.flush()?;
        Ok(())
    }
}

fn to_toml(v: &KvValue) -> toml::Value {
    match v {
        KvValue::Str(s) => toml::Value::String(s.clone()),
        KvValue::F32(f) => toml::Value::Float(f64::from(*f)),
        KvValue::U32(u) => toml::Value::Integer(i64::from(*u)),
        KvValue::U64(u) => toml::Value::Integer(i64::try_from(*u).unwrap_or(i64::MAX)),
        KvValue::Bool(b) => toml::Value::Boolean(*b),
    }
}

fn from_toml(v: toml::Value) -> Option<KvValue> {
    match v {
        toml::Value::String(s) => Some(KvValue::Str(s)),
        #[allow(clippy::cast_possible_truncation)]
        toml::Value::Float(f) => Some(KvValue::F32(f as f32)),
        toml::Value::Integer(i) => u64::try_from(i).ok().map(KvValue::U64),
        toml::Value::Boolean(b) => Some(KvValue::Bool(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_without_open_is_an_error() {
        let kv = MemKvStore::new();
        assert!(kv.get("x").is_err());
    }

    #[test]
    fn namespaces_are_isolated() {
        let mut kv = MemKvStore::new();
        kv.open("a").unwrap();
        kv.set("k", KvValue::U32(1)).unwrap();
        kv.close().unwrap();
        kv.open("b").unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
        kv.open("a").unwrap();
        assert_eq!(kv.get("k").unwrap(), Some(KvValue::U32(1)));
    }

    #[test]
    fn file_store_writes_every_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvs").join("store.toml");
        let mut kv = FileKvStore::open_path(&path).unwrap();
        kv.open("binsai_cfg").unwrap();
        kv.set("mq135_r0", KvValue::F32(12.5)).unwrap();
        kv.set("sms_cd", KvValue::U64(300_000)).unwrap();
        kv.set("wifi_ssid", KvValue::Str("depot".into())).unwrap();

        let mut again = FileKvStore::open_path(&path).unwrap();
        again.open("binsai_cfg").unwrap();
        assert_eq!(again.get("mq135_r0").unwrap(), Some(KvValue::F32(12.5)));
        assert_eq!(again.get("sms_cd").unwrap(), Some(KvValue::U64(300_000)));
        assert_eq!(
            again.get("wifi_ssid").unwrap(),
            Some(KvValue::Str("depot".into()))
        );
        assert!(!path.with_extension("new").exists());
    }
}
