//! Per-tile completion markers.
//!
//! A marker file exists for a tile only once every output band of that tile
//! has been written and flushed. Runs skip tiles whose marker is present.
//! Each marker records the tile size and input stack that produced it, and a
//! marker left by a different tile size or stack is an error rather than a
//! reason to skip.

use crate::error::{HmmError, Result};
use crate::tiling::Tile;
use log::debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const MARKER_PREFIX: &str = "hmm";
const MARKER_EXT: &str = ".txt";

/// Identity of the run a marker belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStamp {
    pub tile_size: usize,
    /// File name of the first image of the input stack.
    pub stack: String,
}

impl MarkerStamp {
    pub fn new(tile_size: usize, stack: impl Into<String>) -> Self {
        Self {
            tile_size,
            stack: stack.into(),
        }
    }

    /// Stamp for a stack whose first image is `first_image`; directories are
    /// dropped so the same stack reached through another path still matches.
    pub fn for_stack(tile_size: usize, first_image: &str) -> Self {
        let stack = Path::new(first_image)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| first_image.to_string());
        Self::new(tile_size, stack)
    }

    fn render(&self) -> String {
        format!("complete\ntile_size={}\nstack={}\n", self.tile_size, self.stack)
    }

    fn describe(&self) -> String {
        format!("tile_size={}, stack={}", self.tile_size, self.stack)
    }
}

#[derive(Debug, Clone)]
pub struct TileMarkers {
    dir: PathBuf,
}

impl TileMarkers {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Marker path, keyed by the tile's row and column offsets.
    pub fn path(&self, tile: &Tile) -> PathBuf {
        self.dir.join(format!(
            "{}{:04}_{:04}{}",
            MARKER_PREFIX, tile.row_offset, tile.col_offset, MARKER_EXT
        ))
    }

    /// `Ok(true)` when the tile was completed by a run with the same stamp,
    /// `Ok(false)` when no marker exists.
    pub fn is_complete(&self, tile: &Tile, stamp: &MarkerStamp) -> Result<bool> {
        let path = self.path(tile);
        let found = match fs::read_to_string(&path) {
            Ok(found) => found,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if found == stamp.render() {
            return Ok(true);
        }
        Err(HmmError::MarkerMismatch {
            path: path.display().to_string(),
            expected: stamp.describe(),
            found: found.trim().replace('\n', ", "),
        })
    }

    /// Writes the marker through a temporary file and renames it into place
    /// so a crash never leaves a truncated marker behind.
    pub fn mark_complete(&self, tile: &Tile, stamp: &MarkerStamp) -> Result<()> {
        let path = self.path(tile);
        let tmp = path.with_extension("txt.tmp");

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(stamp.render().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!("Marked tile ({}, {}) complete: {}", tile.row_offset, tile.col_offset, path.display());
        Ok(())
    }

    /// Number of marker files currently present in the directory.
    pub fn count(&self) -> Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let mut n = 0;
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if is_marker_name(&name.to_string_lossy()) {
                n += 1;
            }
        }
        Ok(n)
    }
}

/// `hmm<row>_<col>.txt` with offsets of at least four digits.
fn is_marker_name(name: &str) -> bool {
    let Some(offsets) = name
        .strip_prefix(MARKER_PREFIX)
        .and_then(|rest| rest.strip_suffix(MARKER_EXT))
    else {
        return false;
    };
    match offsets.split_once('_') {
        Some((row, col)) => [row, col]
            .iter()
            .all(|part| part.len() >= 4 && part.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}
