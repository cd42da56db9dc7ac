//! Decoded form fields and file uploads

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::FilesConfig;

/// The value stored under one form field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Single(String),
    /// A plain name submitted more than once, in submission order
    Multi(Vec<String>),
    /// Bracketed names `base[key]` collected under `base`
    Nested(HashMap<String, String>),
}

impl FormValue {
    /// First scalar value, if this is not a nested map
    pub fn first(&self) -> Option<&str> {
        match self {
            FormValue::Single(value) => Some(value),
            FormValue::Multi(values) => values.first().map(|s| s.as_str()),
            FormValue::Nested(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, String>> {
        match self {
            FormValue::Nested(map) => Some(map),
            _ => None,
        }
    }
}

/// Form fields decoded from a url-encoded or multipart body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: HashMap<String, FormValue>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded field.
    ///
    /// `a[b]` lands in the nested map under `a`, replacing a scalar `a`.
    pub fn insert(&mut self, name: &str, value: String) {
        if let Some((base, key)) = split_bracketed(name) {
            match self.fields.get_mut(base) {
                Some(FormValue::Nested(map)) => {
                    map.insert(key.to_string(), value);
                }
                _ => {
                    let mut map = HashMap::new();
                    map.insert(key.to_string(), value);
                    self.fields.insert(base.to_string(), FormValue::Nested(map));
                }
            }
            return;
        }

        // `a[]` is a repeated plain field
        let name = name.strip_suffix("[]").unwrap_or(name);
        match self.fields.remove(name) {
            Some(FormValue::Single(first)) => {
                self.fields.insert(name.to_string(), FormValue::Multi(vec![first, value]));
            }
            Some(FormValue::Multi(mut values)) => {
                values.push(value);
                self.fields.insert(name.to_string(), FormValue::Multi(values));
            }
            _ => {
                self.fields.insert(name.to_string(), FormValue::Single(value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name)
    }

    /// First scalar value of a field
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FormValue::first)
    }

    pub fn nested(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.fields.get(name).and_then(FormValue::as_map)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.fields.iter()
    }
}

fn split_bracketed(name: &str) -> Option<(&str, &str)> {
    let open = name.find('[')?;
    let inner = name.strip_suffix(']')?.get(open + 1..)?;
    let base = &name[..open];
    if base.is_empty() || inner.is_empty() {
        return None;
    }
    Some((base, inner))
}

/// A temporary file holding a spilled upload
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    delete_on_drop: bool,
}

impl SpillFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if !self.delete_on_drop {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove upload file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Where an upload's bytes live
#[derive(Debug)]
pub enum UploadStorage {
    Memory(Vec<u8>),
    Disk(SpillFile),
}

/// A file part of a multipart body
#[derive(Debug)]
pub struct FileUpload {
    field: String,
    file_name: String,
    content_type: Option<String>,
    len: u64,
    storage: UploadStorage,
}

impl FileUpload {
    /// An in-memory upload
    pub fn in_memory(field: &str, file_name: &str, content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            field: field.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.map(str::to_string),
            len: data.len() as u64,
            storage: UploadStorage::Memory(data),
        }
    }

    /// Form field name the file was submitted under
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Client-supplied file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn storage(&self) -> &UploadStorage {
        &self.storage
    }

    /// Path of the spill file, for uploads that outgrew memory
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            UploadStorage::Memory(_) => None,
            UploadStorage::Disk(file) => Some(file.path()),
        }
    }

    /// The upload's content, read back from disk if it was spilled
    pub fn bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match &self.storage {
            UploadStorage::Memory(data) => Ok(Cow::Borrowed(data)),
            UploadStorage::Disk(file) => fs::read(file.path()).map(Cow::Owned),
        }
    }
}

/// Receives one file part while it streams in, spilling to disk past the
/// configured memory threshold.
pub(crate) struct UploadSink {
    field: String,
    file_name: String,
    content_type: Option<String>,
    memory: Vec<u8>,
    spill: Option<(File, SpillFile)>,
    len: u64,
    memory_threshold: usize,
    temp_directory: PathBuf,
    delete_on_drop: bool,
}

impl UploadSink {
    pub(crate) fn new(
        field: String,
        file_name: String,
        content_type: Option<String>,
        config: &FilesConfig,
    ) -> Self {
        Self {
            field,
            file_name,
            content_type,
            memory: Vec::new(),
            spill: None,
            len: 0,
            memory_threshold: config.memory_threshold,
            temp_directory: config.temp_directory.clone(),
            delete_on_drop: config.delete_temp_on_exit,
        }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.len += data.len() as u64;

        if self.spill.is_none() && self.memory.len() + data.len() > self.memory_threshold {
            let path = self
                .temp_directory
                .join(format!("courier-upload-{}.tmp", uuid::Uuid::new_v4()));
            let mut file = File::create(&path)?;
            // Unfinished uploads are always removed
            let spill = SpillFile { path, delete_on_drop: true };
            file.write_all(&self.memory)?;
            log::debug!(
                "Upload '{}' exceeded {} bytes, spilling to {}",
                self.file_name,
                self.memory_threshold,
                spill.path.display()
            );
            self.memory = Vec::new();
            self.spill = Some((file, spill));
        }

        match &mut self.spill {
            Some((file, _)) => file.write_all(data),
            None => {
                self.memory.extend_from_slice(data);
                Ok(())
            }
        }
    }

    pub(crate) fn finish(mut self) -> io::Result<FileUpload> {
        let storage = match self.spill.take() {
            Some((mut file, mut spill)) => {
                file.flush()?;
                spill.delete_on_drop = self.delete_on_drop;
                UploadStorage::Disk(spill)
            }
            None => UploadStorage::Memory(std::mem::take(&mut self.memory)),
        };

        Ok(FileUpload {
            field: self.field,
            file_name: self.file_name,
            content_type: self.content_type,
            len: self.len,
            storage,
        })
    }
}
