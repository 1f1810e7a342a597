use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use ndarray::Array3;

use crate::error::{AleError, Result};
use crate::io::volume::{read_table, read_volume, write_table, write_volume};
use crate::template::Affine;

/// Name-addressed persistence for analysis products. An existing key is
/// the sole completion signal: analyses skip work whose key is present,
/// so implementations must never expose partially written entries.
pub trait ResultStore: Send + Sync {
    fn exists(&self, key: &str) -> bool;
    fn save_volume(&self, key: &str, volume: &Array3<f64>, affine: &Affine) -> Result<()>;
    fn load_volume(&self, key: &str) -> Result<Array3<f64>>;
    fn save_table(&self, key: &str, rows: &[Vec<f64>]) -> Result<()>;
    fn load_table(&self, key: &str) -> Result<Vec<Vec<f64>>>;
}

/// Filesystem store rooted at a results directory. Volumes land at
/// `<root>/<key>.vol`, tables at `<root>/<key>.tbl`; both are written
/// through a temp file and atomic rename.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn volume_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.vol"))
    }

    fn table_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.tbl"))
    }
}

impl ResultStore for FsStore {
    fn exists(&self, key: &str) -> bool {
        self.volume_path(key).exists() || self.table_path(key).exists()
    }

    fn save_volume(&self, key: &str, volume: &Array3<f64>, affine: &Affine) -> Result<()> {
        write_volume(&self.volume_path(key), volume, affine)
    }

    fn load_volume(&self, key: &str) -> Result<Array3<f64>> {
        let path = self.volume_path(key);
        if !path.exists() {
            return Err(AleError::MissingResult(key.to_string()));
        }
        let (volume, _) = read_volume(&path)?;
        Ok(volume)
    }

    fn save_table(&self, key: &str, rows: &[Vec<f64>]) -> Result<()> {
        write_table(&self.table_path(key), rows)
    }

    fn load_table(&self, key: &str) -> Result<Vec<Vec<f64>>> {
        let path = self.table_path(key);
        if !path.exists() {
            return Err(AleError::MissingResult(key.to_string()));
        }
        read_table(&path)
    }
}

#[derive(Default)]
struct MemInner {
    volumes: HashMap<String, (Array3<f64>, Affine)>,
    tables: HashMap<String, Vec<Vec<f64>>>,
}

/// In-memory store for tests: same contract, no filesystem.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemStore {
    fn exists(&self, key: &str) -> bool {
        let inner = self.inner.lock().expect("store lock");
        inner.volumes.contains_key(key) || inner.tables.contains_key(key)
    }

    fn save_volume(&self, key: &str, volume: &Array3<f64>, affine: &Affine) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .volumes
            .insert(key.to_string(), (volume.clone(), *affine));
        Ok(())
    }

    fn load_volume(&self, key: &str) -> Result<Array3<f64>> {
        let inner = self.inner.lock().expect("store lock");
        inner
            .volumes
            .get(key)
            .map(|(v, _)| v.clone())
            .ok_or_else(|| AleError::MissingResult(key.to_string()))
    }

    fn save_table(&self, key: &str, rows: &[Vec<f64>]) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.tables.insert(key.to_string(), rows.to_vec());
        Ok(())
    }

    fn load_table(&self, key: &str) -> Result<Vec<Vec<f64>>> {
        let inner = self.inner.lock().expect("store lock");
        inner
            .tables
            .get(key)
            .cloned()
            .ok_or_else(|| AleError::MissingResult(key.to_string()))
    }
}
