use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::LabError;
use crate::types::{SERIES_FORMAT_VERSION, Series, Trace};

/// Sibling path used while a document is being written
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `data` as pretty JSON and move it into place in one step.
///
/// The document is written to a temporary sibling first and then renamed over
/// `path`, so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(data: &T, path: &Path) -> Result<(), LabError> {
    let json =
        serde_json::to_vec_pretty(data).map_err(|e| LabError::storage(path, e.into()))?;
    let tmp = temp_path(path);

    let write_result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(source) = write_result {
        if tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("Could not remove temporary file {:?}: {}", tmp, e);
            }
        }
        return Err(LabError::storage(path, source));
    }

    debug!("Wrote {} bytes to {:?}", json.len(), path);
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LabError> {
    let content = fs::read(path).map_err(|source| LabError::storage(path, source))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Persist a recorded series to `path`
pub fn save_series(series: &Series, path: &Path) -> Result<(), LabError> {
    write_json_atomic(series, path)?;
    info!("Saved {} samples to {:?}", series.len(), path);
    Ok(())
}

/// Load a series written by [`save_series`]
pub fn load_series(path: &Path) -> Result<Series, LabError> {
    let series: Series = read_json(path)?;
    if series.version != SERIES_FORMAT_VERSION {
        return Err(LabError::Format(format!(
            "{:?} has version {}, expected {}",
            path, series.version, SERIES_FORMAT_VERSION
        )));
    }
    info!("Loaded {} samples from {:?}", series.len(), path);
    Ok(series)
}

pub fn save_trace(trace: &Trace, path: &Path) -> Result<(), LabError> {
    write_json_atomic(trace, path)?;
    info!(
        "Saved {} capture(s) x {} samples to {:?}",
        trace.num_captures(),
        trace.samples_per_capture(),
        path
    );
    Ok(())
}

pub fn load_trace(path: &Path) -> Result<Trace, LabError> {
    read_json(path)
}
