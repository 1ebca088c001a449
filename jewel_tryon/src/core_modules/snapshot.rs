// THEORY:
// The `snapshot` module persists a composited frame when, and only when, the user
// asks for it. It never runs on its own.
//
// Filenames embed the wall-clock time in milliseconds. Two captures inside the
// same millisecond (or a clock that went backwards) must not overwrite each other,
// so files are created with `create_new` and a numeric suffix is appended until
// the name is free. A file whose write fails is removed again, so a failed
// capture leaves nothing behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{Error, Result};
use crate::Frame;

const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Writes PNG snapshots into one directory.
#[derive(Debug, Clone)]
pub struct SnapshotRecorder {
    dest_dir: PathBuf,
}

impl SnapshotRecorder {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Saves `frame` and returns the path written. Creates the directory if needed.
    pub fn save(&self, frame: &Frame) -> Result<PathBuf> {
        fs::create_dir_all(&self.dest_dir).map_err(|err| Error::SnapshotWrite {
            path: self.dest_dir.clone(),
            reason: err.to_string(),
        })?;

        let (path, file) = self.create_unique(timestamp_token())?;
        if let Err(reason) = write_png(file, frame) {
            if let Err(err) = fs::remove_file(&path) {
                debug!("removing partial snapshot {}: {err}", path.display());
            }
            return Err(Error::SnapshotWrite { path, reason });
        }

        info!("saved snapshot {}", path.display());
        Ok(path)
    }

    fn create_unique(&self, token: u128) -> Result<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => format!("snapshot_{token}.png"),
                n => format!("snapshot_{token}_{n}.png"),
            };
            let path = self.dest_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(Error::SnapshotWrite {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Err(Error::SnapshotWrite {
            path: self.dest_dir.clone(),
            reason: format!("no free snapshot name for token {token}"),
        })
    }
}

/// Encodes `frame` as PNG through a buffer and flushes it. A failed flush is an error.
fn write_png<W: Write>(output: W, frame: &Frame) -> std::result::Result<(), String> {
    let mut writer = BufWriter::new(output);
    image_helper::save_png(&mut writer, frame).map_err(|err| err.to_string())?;
    writer.flush().map_err(|err| err.to_string())
}

fn timestamp_token() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
