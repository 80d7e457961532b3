//! Persisting catalog columns and metadata through a writer collaborator.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use pcat_result::{Error, Result};

use crate::attrs::{AttrValue, Attrs};
use crate::catalog::Catalog;

/// Destination of [`Catalog::save`].
///
/// Attribute maps handed to the writer only hold values it reported as supported;
/// everything else arrives already encoded as a `json://` string.
pub trait CatalogWriter {
    /// Whether `value` can be stored as-is.
    fn supports_attr(&self, value: &AttrValue) -> bool;

    fn write_header(&mut self, header: &str, attrs: &Attrs) -> Result<()>;

    fn write_column(&mut self, dataset: &str, array: &ArrayRef, attrs: &Attrs) -> Result<()>;
}

fn encode_attrs(writer: &dyn CatalogWriter, attrs: &Attrs) -> Result<Attrs> {
    attrs
        .iter()
        .map(|(key, value)| {
            if writer.supports_attr(value) {
                return Ok((key.clone(), value.clone()));
            }
            let encoded = value.encode_fallback().map_err(|err| {
                Error::InvalidArgumentError(format!("cannot save '{key}' key in attrs: {err}"))
            })?;
            Ok((key.clone(), AttrValue::Str(encoded)))
        })
        .collect()
}

impl Catalog {
    /// Persist `columns` (stored under `datasets`, defaulting to the column names)
    /// with their column attributes, and the catalog attributes under `header`.
    ///
    /// Columns are checked and forced in one batch before anything is written.
    /// Writer I/O failures are returned unchanged.
    pub fn save<S: AsRef<str>>(
        &self,
        writer: &mut dyn CatalogWriter,
        columns: &[S],
        datasets: Option<&[S]>,
        header: &str,
    ) -> Result<()> {
        let datasets = datasets.unwrap_or(columns);
        if datasets.len() != columns.len() {
            return Err(Error::InvalidArgumentError(format!(
                "`datasets` must have the same length as `columns` ({} != {})",
                datasets.len(),
                columns.len()
            )));
        }

        let accessors = self.read(columns)?;
        let lazy: Vec<_> = accessors.iter().map(|column| column.array().clone()).collect();
        let arrays = self.gateway().force(&lazy)?;

        let header_attrs = encode_attrs(writer, &self.attrs())?;
        writer.write_header(header, &header_attrs)?;
        for ((accessor, array), dataset) in accessors.iter().zip(&arrays).zip(datasets) {
            let dataset: &str = dataset.as_ref();
            let attrs = encode_attrs(writer, accessor.attrs())?;
            tracing::debug!(column = accessor.name(), dataset, rows = accessor.len(), "saving column");
            writer.write_column(dataset, array, &attrs)?;
        }
        Ok(())
    }
}

/// Keeps everything in memory. Stores scalars and flat lists natively.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub headers: BTreeMap<String, Attrs>,
    pub datasets: BTreeMap<String, (ArrayRef, Attrs)>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogWriter for MemoryWriter {
    fn supports_attr(&self, value: &AttrValue) -> bool {
        match value {
            AttrValue::Null | AttrValue::Map(_) => false,
            AttrValue::List(items) => items
                .iter()
                .all(|item| item.is_scalar() && !matches!(item, AttrValue::Null)),
            _ => true,
        }
    }

    fn write_header(&mut self, header: &str, attrs: &Attrs) -> Result<()> {
        self.headers
            .entry(header.to_string())
            .or_default()
            .extend(attrs.clone());
        Ok(())
    }

    fn write_column(&mut self, dataset: &str, array: &ArrayRef, attrs: &Attrs) -> Result<()> {
        self.datasets
            .insert(dataset.to_string(), (Arc::clone(array), attrs.clone()));
        Ok(())
    }
}

/// Writes one Arrow IPC file per dataset and rank under a directory:
/// `<dir>/<dataset>/<rank>.arrow`, with column attributes as schema metadata.
/// Rank 0 also writes the header attributes to `<dir>/<header>.json`.
///
/// Only strings are stored natively.
#[derive(Debug)]
pub struct IpcDirectoryWriter {
    dir: PathBuf,
    rank: usize,
}

impl IpcDirectoryWriter {
    pub fn create(dir: impl AsRef<Path>, rank: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, rank })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.dir
            .join(dataset)
            .join(format!("{:05}.arrow", self.rank))
    }

    pub fn header_path(&self, header: &str) -> PathBuf {
        self.dir.join(format!("{header}.json"))
    }
}

fn metadata(attrs: &Attrs) -> HashMap<String, String> {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), value.to_string()))
        .collect()
}

impl CatalogWriter for IpcDirectoryWriter {
    fn supports_attr(&self, value: &AttrValue) -> bool {
        matches!(value, AttrValue::Str(_))
    }

    fn write_header(&mut self, header: &str, attrs: &Attrs) -> Result<()> {
        if self.rank != 0 {
            return Ok(());
        }
        let file = File::create(self.header_path(header))?;
        serde_json::to_writer_pretty(BufWriter::new(file), attrs)?;
        Ok(())
    }

    fn write_column(&mut self, dataset: &str, array: &ArrayRef, attrs: &Attrs) -> Result<()> {
        let path = self.dataset_path(dataset);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let field = Field::new(dataset, array.data_type().clone(), true);
        let schema = Arc::new(Schema::new(vec![field]).with_metadata(metadata(attrs)));
        let batch = RecordBatch::try_new(Arc::clone(&schema), vec![Arc::clone(array)])?;

        let mut writer = FileWriter::try_new(BufWriter::new(File::create(&path)?), &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
        tracing::trace!(path = %path.display(), rows = batch.num_rows(), "wrote dataset");
        Ok(())
    }
}
