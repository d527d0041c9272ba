//! Legacy chip provenance cards (CHIPID, OBSID, OUTFILE).
//!
//! Older downstream tooling identifies a chip by a compact id such as
//! `R22_S11` and expects an output-file stem derived from it. Only cameras
//! that opt in get these cards, and only for detector file names following
//! the `R_<d>_<d>_S_<d>_<d>` grammar.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::fits_header::FitsHeader;

use super::WcsError;
use crate::hardware::observation::{BandSelection, ObservationMetadata};

/// OBSID written when the observation has no history id.
pub const DEFAULT_OBS_ID: i64 = 9999;

/// Band index used in OUTFILE when the exposure lists several bands.
pub const MULTI_BAND_INDEX: u8 = 2;

static CHIP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^R_[0-9]_[0-9]_S_[0-9]_[0-9]").expect("chip name pattern is valid")
});

/// Compact chip id for a detector file name, e.g. `R_2_2_S_1_1` → `R22_S11`.
///
/// The name only has to *start* with the raft/sensor pattern; any trailing
/// characters are carried into the id.
pub fn legacy_chip_id(file_name: &str) -> Option<String> {
    if !CHIP_NAME.is_match(file_name) {
        return None;
    }
    Some(file_name.replace('_', "").replace('S', "_S"))
}

/// Numeric filter index of the observation's bandpass.
pub fn band_index(selection: Option<&BandSelection>) -> Result<u8, WcsError> {
    let band = match selection {
        Some(BandSelection::Single(band)) => band,
        Some(BandSelection::Multi(_)) | None => return Ok(MULTI_BAND_INDEX),
    };
    match band.as_str() {
        "u" => Ok(0),
        "g" => Ok(1),
        "r" => Ok(2),
        "i" => Ok(3),
        "z" => Ok(4),
        "y" => Ok(5),
        other => Err(WcsError::UnknownFilter(other.to_string())),
    }
}

/// Add CHIPID, OBSID and OUTFILE when `file_name` parses as a chip id.
///
/// Returns whether the cards were written.
pub fn apply_legacy_provenance(
    header: &mut FitsHeader,
    file_name: &str,
    observation: &ObservationMetadata,
) -> Result<bool, WcsError> {
    let Some(chip_id) = legacy_chip_id(file_name) else {
        debug!("{file_name} is not a raft/sensor name, skipping provenance cards");
        return Ok(false);
    };
    let obs_id = observation.obs_history_id().unwrap_or(DEFAULT_OBS_ID);
    let filter = band_index(observation.bandpass())?;

    header.set("CHIPID", chip_id.as_str());
    header.set("OBSID", obs_id);
    header.set("OUTFILE", format!("lsst_e_{obs_id}_f{filter}_{chip_id}_E000"));
    Ok(true)
}
