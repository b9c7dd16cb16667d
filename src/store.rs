//! The mosaic store boundary and a filesystem-backed catalog implementation.
//!
//! The pipeline only ever talks to [`MosaicStore`]: overwrite a raster
//! registered under its canonical name, then stamp the validity interval
//! onto the matching metadata row. The engine behind the boundary owns
//! indexing, pyramids, and pixel extraction; [`FileMosaicStore`] keeps one
//! directory per dataset with a `catalog.json` of metadata rows.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::pipeline::{LoadDescriptor, ValidityInterval};

const CATALOG_FILE: &str = "catalog.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pixel values strictly inside this range are valid data; everything else
/// is zero fill or the upstream no-data sentinel (29999).
pub const VALID_PIXEL_RANGE: ValueRange = ValueRange {
    lower: 0.0,
    upper: 29900.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub lower: f64,
    pub upper: f64,
}

/// The persistent raster store as the pipeline sees it.
pub trait MosaicStore {
    /// Registers `source` under `canonical_name` in `dataset`, replacing any
    /// prior raster of that name. The valid-range filter travels with the
    /// raster so the engine can mask sentinel values when serving it.
    fn replace_raster(
        &self,
        dataset: &str,
        canonical_name: &str,
        source: &Path,
        valid_range: &ValueRange,
    ) -> Result<()>;

    /// Writes the validity interval onto the metadata row matching
    /// `canonical_name`.
    fn set_validity(
        &self,
        dataset: &str,
        canonical_name: &str,
        validity: &ValidityInterval,
    ) -> Result<()>;
}

/// Performs the two-step commit consumed by the orchestrator.
pub struct CommitAdapter<S> {
    store: S,
    valid_range: ValueRange,
}

impl<S: MosaicStore> CommitAdapter<S> {
    pub fn new(store: S) -> Self {
        CommitAdapter {
            store,
            valid_range: VALID_PIXEL_RANGE,
        }
    }

    /// Overwrites the raster registered under the descriptor's canonical
    /// name, then writes the validity interval onto its metadata row. A
    /// failed metadata write leaves the raster committed and is downgraded
    /// to a warning.
    pub fn commit(&self, load: &LoadDescriptor) -> Result<()> {
        self.store
            .replace_raster(
                &load.target_dataset,
                load.load_name,
                &load.local_path,
                &self.valid_range,
            )
            .map_err(|e| IngestError::commit(load.load_name, load.target_dataset.as_str(), e))?;

        if let Err(e) =
            self.store
                .set_validity(&load.target_dataset, load.load_name, &load.validity)
        {
            let e = IngestError::metadata(load.load_name, load.target_dataset.as_str(), e);
            warn!(error = %e, "raster committed but validity metadata not updated");
        }

        Ok(())
    }
}

/// Filesystem catalog: `<root>/<dataset>/<canonical name>` plus a
/// `catalog.json` of metadata rows keyed by the canonical name minus its
/// extension.
pub struct FileMosaicStore {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    rasters: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogEntry {
    name: String,
    file: String,
    valid_min: f64,
    valid_max: f64,
    start_datetime: Option<String>,
    end_datetime: Option<String>,
}

impl FileMosaicStore {
    pub fn new(root: PathBuf) -> Self {
        FileMosaicStore { root }
    }

    fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    fn load_catalog(dir: &Path) -> Result<Catalog> {
        let path = dir.join(CATALOG_FILE);
        if !path.is_file() {
            return Ok(Catalog::default());
        }

        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save_catalog(dir: &Path, catalog: &Catalog) -> Result<()> {
        fs::write(
            dir.join(CATALOG_FILE),
            serde_json::to_string_pretty(catalog)?,
        )?;

        Ok(())
    }
}

// The metadata rows are keyed without the file extension.
fn entry_name(canonical_name: &str) -> &str {
    canonical_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(canonical_name)
}

impl MosaicStore for FileMosaicStore {
    fn replace_raster(
        &self,
        dataset: &str,
        canonical_name: &str,
        source: &Path,
        valid_range: &ValueRange,
    ) -> Result<()> {
        let dir = self.dataset_dir(dataset);
        fs::create_dir_all(&dir)?;
        fs::copy(source, dir.join(canonical_name))?;

        let mut catalog = Self::load_catalog(&dir)?;
        let name = entry_name(canonical_name);

        // A replaced raster's previous interval no longer applies; it is
        // cleared here and re-stamped by set_validity.
        match catalog.rasters.iter_mut().find(|r| r.name == name) {
            Some(entry) => {
                entry.file = canonical_name.to_string();
                entry.valid_min = valid_range.lower;
                entry.valid_max = valid_range.upper;
                entry.start_datetime = None;
                entry.end_datetime = None;
            }
            None => catalog.rasters.push(CatalogEntry {
                name: name.to_string(),
                file: canonical_name.to_string(),
                valid_min: valid_range.lower,
                valid_max: valid_range.upper,
                start_datetime: None,
                end_datetime: None,
            }),
        }

        Self::save_catalog(&dir, &catalog)?;
        debug!(dataset, raster = canonical_name, "raster replaced in catalog");

        Ok(())
    }

    fn set_validity(
        &self,
        dataset: &str,
        canonical_name: &str,
        validity: &ValidityInterval,
    ) -> Result<()> {
        let dir = self.dataset_dir(dataset);
        let mut catalog = Self::load_catalog(&dir)?;
        let name = entry_name(canonical_name);

        let entry = catalog
            .rasters
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| IngestError::EntryNotFound {
                dataset: dataset.to_string(),
                name: name.to_string(),
            })?;

        entry.start_datetime = Some(validity.start.format(TIMESTAMP_FORMAT).to_string());
        entry.end_datetime = Some(validity.end.format(TIMESTAMP_FORMAT).to_string());

        Self::save_catalog(&dir, &catalog)?;

        Ok(())
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use crate::category::AccumulationCategory;

    use super::*;

    fn validity() -> ValidityInterval {
        let end = NaiveDate::from_ymd_opt(2018, 8, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        ValidityInterval::ending_at(end, AccumulationCategory::OneDay)
    }

    fn write_source(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("source.tif");
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn should_register_raster_and_stamp_validity() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), b"raster-bytes");
        let store = FileMosaicStore::new(dir.path().join("mosaics"));

        store
            .replace_raster("IMERG1Day", "IMERG1Day.tif", &source, &VALID_PIXEL_RANGE)
            .unwrap();
        store
            .set_validity("IMERG1Day", "IMERG1Day.tif", &validity())
            .unwrap();

        let stored = dir.path().join("mosaics/IMERG1Day/IMERG1Day.tif");
        assert_eq!(fs::read(stored).unwrap(), b"raster-bytes");

        let catalog: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("mosaics/IMERG1Day/catalog.json")).unwrap(),
        )
        .unwrap();
        let entry = &catalog["rasters"][0];
        assert_eq!(entry["name"], "IMERG1Day");
        assert_eq!(entry["valid_min"], 0.0);
        assert_eq!(entry["valid_max"], 29900.0);
        assert_eq!(entry["start_datetime"], "2018-07-31 08:30:00");
        assert_eq!(entry["end_datetime"], "2018-08-01 08:30:00");
    }

    #[test]
    fn should_overwrite_previous_raster_without_duplicating_rows() {
        let dir = TempDir::new().unwrap();
        let store = FileMosaicStore::new(dir.path().join("mosaics"));

        let first = write_source(dir.path(), b"first");
        store
            .replace_raster("IMERG3Day", "IMERG3Day.tif", &first, &VALID_PIXEL_RANGE)
            .unwrap();

        let second = write_source(dir.path(), b"second");
        store
            .replace_raster("IMERG3Day", "IMERG3Day.tif", &second, &VALID_PIXEL_RANGE)
            .unwrap();

        let stored = dir.path().join("mosaics/IMERG3Day/IMERG3Day.tif");
        assert_eq!(fs::read(stored).unwrap(), b"second");

        let catalog: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("mosaics/IMERG3Day/catalog.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(catalog["rasters"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn should_clear_stale_validity_when_raster_is_replaced() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), b"bytes");
        let store = FileMosaicStore::new(dir.path().join("mosaics"));

        store
            .replace_raster("IMERG7Day", "IMERG7Day.tif", &source, &VALID_PIXEL_RANGE)
            .unwrap();
        store
            .set_validity("IMERG7Day", "IMERG7Day.tif", &validity())
            .unwrap();
        store
            .replace_raster("IMERG7Day", "IMERG7Day.tif", &source, &VALID_PIXEL_RANGE)
            .unwrap();

        let catalog: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("mosaics/IMERG7Day/catalog.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(catalog["rasters"][0]["start_datetime"], serde_json::Value::Null);
    }

    #[test]
    fn should_error_when_stamping_an_unknown_entry() {
        let dir = TempDir::new().unwrap();
        let store = FileMosaicStore::new(dir.path().join("mosaics"));

        let err = store
            .set_validity("IMERG1Day", "IMERG1Day.tif", &validity())
            .unwrap_err();

        assert!(matches!(err, IngestError::EntryNotFound { .. }));
    }
}
