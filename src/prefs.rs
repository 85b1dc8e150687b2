//! Typed key-value persistence for resume state, grounded directly in
//! `chromeos_update_engine::FakePrefs`: a store that associates a key
//! with exactly one scalar type for its whole lifetime and flags any
//! attempt to read or write it as a different type.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait Prefs {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: &str);
    fn get_int64(&self, key: &str) -> Option<i64>;
    fn set_int64(&mut self, key: &str, value: i64);
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&mut self, key: &str, value: bool);
    fn exists(&self, key: &str) -> bool;
    fn delete(&mut self, key: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefType {
    String,
    Int64,
    Bool,
}

#[derive(Debug, Clone)]
enum PrefValue {
    String(String),
    Int64(i64),
    Bool(bool),
}

impl PrefValue {
    fn kind(&self) -> PrefType {
        match self {
            PrefValue::String(_) => PrefType::String,
            PrefValue::Int64(_) => PrefType::Int64,
            PrefValue::Bool(_) => PrefType::Bool,
        }
    }
}

/// In-memory preferences store, for tests.
#[derive(Debug, Default)]
pub struct FakePrefs {
    values: HashMap<String, PrefValue>,
}

impl FakePrefs {
    pub fn new() -> Self {
        FakePrefs::default()
    }

    fn check_key_type(&self, key: &str, wanted: PrefType) {
        if let Some(existing) = self.values.get(key) {
            debug_assert_eq!(
                existing.kind(),
                wanted,
                "key {key:?} was previously set as {:?}, accessed as {:?}",
                existing.kind(),
                wanted
            );
        }
    }
}

impl Prefs for FakePrefs {
    fn get_string(&self, key: &str) -> Option<String> {
        self.check_key_type(key, PrefType::String);
        match self.values.get(key) {
            Some(PrefValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.check_key_type(key, PrefType::String);
        self.values.insert(key.to_string(), PrefValue::String(value.to_string()));
    }

    fn get_int64(&self, key: &str) -> Option<i64> {
        self.check_key_type(key, PrefType::Int64);
        match self.values.get(key) {
            Some(PrefValue::Int64(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_int64(&mut self, key: &str, value: i64) {
        self.check_key_type(key, PrefType::Int64);
        self.values.insert(key.to_string(), PrefValue::Int64(value));
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.check_key_type(key, PrefType::Bool);
        match self.values.get(key) {
            Some(PrefValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.check_key_type(key, PrefType::Bool);
        self.values.insert(key.to_string(), PrefValue::Bool(value));
    }

    fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// File-backed preferences store: one regular file per key under a root
/// directory, contents are the value's string form. Survives a process
/// restart, which is the entire point of a resumable update.
#[derive(Debug)]
pub struct FilePrefs {
    root: PathBuf,
}

impl FilePrefs {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FilePrefs { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn read(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = fs::write(self.path_for(key), value) {
            log::warn!("failed to persist preference {key:?}: {err}");
        }
    }
}

impl Prefs for FilePrefs {
    fn get_string(&self, key: &str) -> Option<String> {
        self.read(key)
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.write(key, value);
    }

    fn get_int64(&self, key: &str) -> Option<i64> {
        self.read(key).and_then(|s| s.parse().ok())
    }

    fn set_int64(&mut self, key: &str, value: i64) {
        self.write(key, &value.to_string());
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.read(key).and_then(|s| s.parse().ok())
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.write(key, &value.to_string());
    }

    fn exists(&self, key: &str) -> bool {
        Path::new(&self.path_for(key)).exists()
    }

    fn delete(&mut self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}
