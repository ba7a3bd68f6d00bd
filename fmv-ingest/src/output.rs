//! Hand-off of rolled-over chunks: the chunk file, its attribute sidecar
//! and a stream-level record updated from every chunk.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Local;
use fmv_core::pipeline::{geometry, name, AttributeMap, AttributeValue};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::IngestError;
use crate::filename::FilenameTemplate;

/// Extension of chunk files.
pub const CHUNK_EXTENSION: &str = "ts";

/// Extension of attribute sidecars.
pub const SIDECAR_EXTENSION: &str = "json";

/// Attribute of the stream record listing its chunk files.
pub const CHILDREN: &str = "children";

/// Writes chunks into the output directory.
#[derive(Debug)]
pub struct Output {
    dir: PathBuf,
    template: FilenameTemplate,
    record: StreamRecord,
}

impl Output {
    pub fn new(dir: impl Into<PathBuf>, template: FilenameTemplate) -> Result<Self, IngestError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let record = StreamRecord::new(template.expand(&Local::now()));
        Ok(Self { dir, template, record })
    }

    /// Move `file` into the output directory and write its sidecar. Returns
    /// the chunk path.
    pub fn persist(&mut self, file: NamedTempFile, attributes: &AttributeMap) -> Result<PathBuf, IngestError> {
        let base = self.template.expand(&Local::now());
        let path = unique_path(&self.dir, &base);

        if let Err(e) = file.persist_noclobber(&path) {
            debug!("Rename failed ({}), copying {:?}", e.error, e.file.path());
            fs::copy(e.file.path(), &path)?;
        }
        write_json(&path.with_extension(SIDECAR_EXTENSION), attributes)?;

        info!("Chunk written: {:?} ({} attributes)", path, attributes.len());
        self.record.update(&path, attributes);
        Ok(path)
    }

    /// Write the stream record. Nothing is written when no chunk was persisted.
    pub fn finish(&self) -> Result<Option<PathBuf>, IngestError> {
        if self.record.chunks == 0 {
            return Ok(None);
        }
        let path = self.dir.join(format!("{}-stream.{}", self.record.name, SIDECAR_EXTENSION));
        write_json(&path, &self.record.attributes)?;
        info!("Stream record written: {:?} ({} chunks)", path, self.record.chunks);
        Ok(Some(path))
    }

    pub fn record(&self) -> &StreamRecord {
        &self.record
    }
}

/// `<base>.ts`, or `<base>-<n>.ts` with the first free `n`.
fn unique_path(dir: &Path, base: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", base, CHUNK_EXTENSION));
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| dir.join(format!("{}-{}.{}", base, n, CHUNK_EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn write_json(path: &Path, attributes: &AttributeMap) -> Result<(), IngestError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, attributes)?;
    Ok(())
}

/// Stream-level attributes accumulated from every chunk.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    name: String,
    chunks: usize,
    attributes: AttributeMap,
}

impl StreamRecord {
    pub fn new(name: String) -> Self {
        Self {
            name,
            chunks: 0,
            attributes: AttributeMap::new(),
        }
    }

    /// Fold one chunk into the record: the location is merged with the
    /// chunk's, the temporal start is kept from the first chunk that has one
    /// and the temporal end follows the latest chunk.
    pub fn update(&mut self, chunk: &Path, attributes: &AttributeMap) {
        self.chunks += 1;

        let child_location = attributes.first(name::LOCATION).and_then(AttributeValue::as_geometry);
        let parent_location = self.attributes.first(name::LOCATION).and_then(AttributeValue::as_geometry);
        let merged = match (parent_location, child_location) {
            (None, Some(child)) => Some(child.clone()),
            (Some(parent), Some(child)) => Some(geometry::normalize(geometry::merge(parent.clone(), child.clone()))),
            _ => None,
        };
        if let Some(location) = merged {
            if geometry::is_valid(&location) {
                self.attributes.set_single(name::LOCATION, AttributeValue::Geometry(location));
            } else {
                warn!("Discarding invalid merged stream location");
            }
        }

        if !self.attributes.contains(name::TEMPORAL_START) {
            if let Some(start) = attributes.first(name::TEMPORAL_START) {
                self.attributes.set_single(name::TEMPORAL_START, start.clone());
            }
        }
        if let Some(end) = attributes.first(name::TEMPORAL_END) {
            self.attributes.set_single(name::TEMPORAL_END, end.clone());
        }

        let mut children = self.attributes.remove(CHILDREN).unwrap_or_default();
        let file_name = chunk
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| chunk.display().to_string());
        children.push(AttributeValue::Text(file_name));
        self.attributes.set(CHILDREN, children);
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }
}
