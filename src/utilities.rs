//! Scratch-directory and frame-file helpers.
//!
//! Small pieces shared by the sequencer, the aggregator adapter and the CLI
//! that do not belong in any single public module.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use image::DynamicImage;

use crate::error::FramePullError;
use crate::run::FRAME_EXTENSION;

/// Create the scratch directory if it does not exist yet.
pub fn ensure_scratch_dir(dir: &Path) -> Result<(), FramePullError> {
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Count the frame files currently sitting in `dir`, across all runs.
///
/// A missing directory counts as empty.
pub fn count_scratch_frames(dir: &Path) -> Result<usize, FramePullError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error.into()),
    };

    let mut count = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| extension == FRAME_EXTENSION)
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Delete a delivered frame file.
///
/// A file that is already gone is fine: another path may have reclaimed it.
/// Other failures are logged and otherwise ignored; reclamation is best
/// effort and never fails a pull.
pub(crate) fn reclaim_frame_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::trace!("Reclaimed {}", path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            log::trace!("{} was already reclaimed", path.display());
        }
        Err(error) => log::warn!("Failed to remove {}: {error}", path.display()),
    }
}

/// Decode a frame file into an in-memory image.
pub fn decode_frame(path: &Path) -> Result<DynamicImage, FramePullError> {
    Ok(image::open(path)?)
}
