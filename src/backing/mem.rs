//! In-memory backing store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{Error, Result};

use super::{ArrayRead, ArrayWrite, ByteStore, ColumnData, Scalar};

#[derive(Default)]
struct Inner {
    columns: HashMap<String, ColumnData>,
    version: Option<String>,
}

/// Backing store holding every dataset in memory.
///
/// Cloning is shallow: clones share the same datasets, so a writer can be
/// finalized into a store while readers open later see the data.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    fn lock_err() -> Error {
        Error::Io(std::io::Error::other("memory store lock poisoned"))
    }
}

impl ByteStore for MemStore {
    fn reader<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayRead<T>>> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        let col = inner
            .columns
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let len = T::column_slice(col).ok_or_else(|| Error::Type {
            name: name.to_string(),
            stored: col.kind_name(),
            requested: T::KIND.name(),
        })?
        .len() as u64;
        Ok(Box::new(MemReader::<T> {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            pos: 0,
            len,
            _marker: std::marker::PhantomData,
        }))
    }

    fn writer<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayWrite<T>>> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        if inner.columns.contains_key(name) {
            return Err(Error::Conflict(format!("dataset '{name}' already exists")));
        }
        drop(inner);
        Ok(Box::new(MemWriter::<T> {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn read_str_array(&self, name: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        match inner.columns.get(name) {
            Some(ColumnData::Str(v)) => Ok(v.clone()),
            Some(col) => Err(Error::Type {
                name: name.to_string(),
                stored: col.kind_name(),
                requested: "string",
            }),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    fn write_str_array(&self, name: &str, vals: &[String]) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| MemStore::lock_err())?;
        if inner.columns.contains_key(name) {
            return Err(Error::Conflict(format!("dataset '{name}' already exists")));
        }
        inner
            .columns
            .insert(name.to_string(), ColumnData::Str(vals.to_vec()));
        Ok(())
    }

    fn version(&self) -> Result<String> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        inner
            .version
            .clone()
            .ok_or_else(|| Error::NotFound("version".to_string()))
    }

    fn set_version(&self, version: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| MemStore::lock_err())?;
        inner.version = Some(version.to_string());
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        let mut names: Vec<String> = inner.columns.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.columns.contains_key(name))
            .unwrap_or(false)
    }
}

struct MemReader<T> {
    inner: Arc<RwLock<Inner>>,
    name: String,
    pos: u64,
    len: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> ArrayRead<T> for MemReader<T> {
    fn len(&self) -> u64 {
        self.len
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("seek to {pos} past end of '{}' ({})", self.name, self.len),
            )));
        }
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, out: &mut [T]) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| MemStore::lock_err())?;
        let col = inner
            .columns
            .get(&self.name)
            .ok_or_else(|| Error::NotFound(self.name.clone()))?;
        let data = T::column_slice(col).ok_or_else(|| Error::Type {
            name: self.name.clone(),
            stored: col.kind_name(),
            requested: T::KIND.name(),
        })?;
        let n = out.len().min((self.len - self.pos) as usize);
        let start = self.pos as usize;
        out[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

struct MemWriter<T> {
    inner: Arc<RwLock<Inner>>,
    name: String,
    buf: Vec<T>,
}

impl<T: Scalar> ArrayWrite<T> for MemWriter<T> {
    fn push(&mut self, v: T) -> Result<()> {
        self.buf.push(v);
        Ok(())
    }

    fn extend(&mut self, vals: &[T]) -> Result<()> {
        self.buf.extend_from_slice(vals);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| MemStore::lock_err())?;
        if inner.columns.contains_key(&self.name) {
            return Err(Error::Conflict(format!(
                "dataset '{}' already exists",
                self.name
            )));
        }
        inner.columns.insert(self.name, T::into_column(self.buf));
        Ok(())
    }
}
