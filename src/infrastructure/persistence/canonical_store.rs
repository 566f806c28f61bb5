use crate::domain::features::{CanonicalDataset, FeatureRecord};
use crate::domain::repositories::CanonicalStore;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

/// Canonical dataset as a CSV log, one column per record field, rows in
/// (timestamp, entity_id) order.
pub struct CsvCanonicalStore {
    file_path: PathBuf,
}

impl CsvCanonicalStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl CanonicalStore for CsvCanonicalStore {
    fn load(&self) -> Result<CanonicalDataset> {
        if !self.file_path.exists() {
            info!("No canonical dataset at {:?}, starting empty", self.file_path);
            return Ok(CanonicalDataset::new());
        }

        let file = File::open(&self.file_path).context("Failed to open canonical dataset")?;
        let mut rdr = csv::Reader::from_reader(BufReader::new(file));

        let mut records = Vec::new();
        for (line, result) in rdr.deserialize::<FeatureRecord>().enumerate() {
            let record = result.with_context(|| format!("Corrupt canonical dataset row {}", line + 1))?;
            records.push(record);
        }

        let dataset = CanonicalDataset::from_records(records);
        info!("Loaded {} canonical records from {:?}", dataset.len(), self.file_path);
        Ok(dataset)
    }

    fn commit(&self, dataset: &CanonicalDataset) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create dataset directory")?;
        }

        // Atomic write: write to temp file then rename
        let temp_path = self.file_path.with_extension("tmp");
        {
            let mut wtr = csv::Writer::from_path(&temp_path).context("Failed to create temp dataset file")?;
            for record in dataset.iter() {
                wtr.serialize(record).context("Failed to write dataset row")?;
            }
            wtr.flush().context("Failed to flush dataset file")?;
        }
        fs::rename(&temp_path, &self.file_path).context("Failed to rename dataset file")?;

        info!("Committed {} canonical records to {:?}", dataset.len(), self.file_path);
        Ok(())
    }
}
