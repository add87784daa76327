use log::debug;

/// A rectangular window of the raster extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row_offset: usize,
    pub col_offset: usize,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl Tile {
    pub fn new(row_offset: usize, col_offset: usize, n_rows: usize, n_cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            n_rows,
            n_cols,
        }
    }

    /// Number of pixels in the tile.
    pub fn n_pixels(&self) -> usize {
        self.n_rows * self.n_cols
    }

    pub fn row_end(&self) -> usize {
        self.row_offset + self.n_rows
    }

    pub fn col_end(&self) -> usize {
        self.col_offset + self.n_cols
    }
}

/// Partition of `[0, rows) x [0, cols)` into tiles of at most
/// `tile_size x tile_size` pixels.
pub struct TileGrid {
    rows: usize,
    cols: usize,
    tile_size: usize,
    pub num_tiles_y: usize,
    pub num_tiles_x: usize,
    pub total_tiles: usize,
}

impl TileGrid {
    pub fn new(rows: usize, cols: usize, tile_size: usize) -> Self {
        let num_tiles_y = rows.div_ceil(tile_size);
        let num_tiles_x = cols.div_ceil(tile_size);
        let total_tiles = num_tiles_y * num_tiles_x;

        debug!(
            "TileGrid: {}x{} raster, tile_size={} → {}x{} tiles ({} total)",
            rows, cols, tile_size, num_tiles_y, num_tiles_x, total_tiles
        );

        Self {
            rows,
            cols,
            tile_size,
            num_tiles_y,
            num_tiles_x,
            total_tiles,
        }
    }

    pub fn iter(&self) -> TileIterator<'_> {
        TileIterator::new(self)
    }

    /// Tile at a linear row-major index.
    pub fn get_tile(&self, tile_idx: usize) -> Tile {
        let tile_y = tile_idx / self.num_tiles_x;
        let tile_x = tile_idx % self.num_tiles_x;

        let row_offset = tile_y * self.tile_size;
        let col_offset = tile_x * self.tile_size;
        let n_rows = self.tile_size.min(self.rows - row_offset);
        let n_cols = self.tile_size.min(self.cols - col_offset);

        Tile::new(row_offset, col_offset, n_rows, n_cols)
    }
}

pub struct TileIterator<'a> {
    grid: &'a TileGrid,
    current_idx: usize,
}

impl<'a> TileIterator<'a> {
    fn new(grid: &'a TileGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for TileIterator<'a> {
    type Item = (usize, Tile);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_tiles {
            let tile = self.grid.get_tile(self.current_idx);
            let idx = self.current_idx;
            self.current_idx += 1;
            Some((idx, tile))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total_tiles - self.current_idx;
        (remaining, Some(remaining))
    }
}
