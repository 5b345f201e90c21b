//! A uniform grid over the playground, used to find hosts near a position.

use crate::math::Point3d;
use itertools::{iproduct, Itertools};
use smallvec::SmallVec;
use std::collections::HashMap;

/// The distance a tracked vehicle is assumed to extend from its reported position, in m.
pub const VEHICLE_REACH: f64 = 4.5;

/// The column and row of a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub col: usize,
    pub row: usize,
}

impl GridCoord {
    pub const fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

/// The cells an entity is registered in.
pub type CellList = SmallVec<[GridCoord; 9]>;

/// A fixed arena of cells, each mapping identifiers to the record of an entity
/// overlapping that cell. Cells are stored row-major.
#[derive(Clone, Debug)]
pub struct Grid<T> {
    cols: usize,
    rows: usize,
    /// The edge length of a cell in m, or zero for a single cell.
    cell_size: f64,
    cells: Vec<HashMap<String, T>>,
}

impl<T: Copy> Grid<T> {
    /// Creates a grid covering a `width` by `height` playground.
    /// A `cell_size` of zero produces a single cell covering everything.
    pub fn new(width: f64, height: f64, cell_size: f64) -> Self {
        let (cols, rows) = if cell_size > 0.0 {
            (
                usize::max((width / cell_size).ceil() as usize, 1),
                usize::max((height / cell_size).ceil() as usize, 1),
            )
        } else {
            (1, 1)
        };
        Self {
            cols,
            rows,
            cell_size: f64::max(cell_size, 0.0),
            cells: vec![HashMap::new(); cols * rows],
        }
    }

    /// The number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Gets the cell at the given coordinate, if it is inside the grid.
    pub fn cell(&self, coord: GridCoord) -> Option<&HashMap<String, T>> {
        self.index(coord).map(|idx| &self.cells[idx])
    }

    fn cell_mut(&mut self, coord: GridCoord) -> &mut HashMap<String, T> {
        let idx = self
            .index(coord)
            .unwrap_or_else(|| panic!("grid cell {:?} is outside the grid", coord));
        &mut self.cells[idx]
    }

    fn index(&self, coord: GridCoord) -> Option<usize> {
        (coord.col < self.cols && coord.row < self.rows).then(|| coord.row * self.cols + coord.col)
    }

    /// Computes the cells overlapped by a square of half-width `reach` around `position`,
    /// clamped to the grid. Both ends of the range are inclusive.
    pub fn cells_around(&self, position: Point3d, reach: f64) -> CellList {
        if self.cell_size == 0.0 {
            return std::iter::once(GridCoord::new(0, 0)).collect();
        }
        let span = |value: f64, count: usize| {
            let clamp = |v: f64| (f64::max((v / self.cell_size).floor(), 0.0) as usize).min(count - 1);
            clamp(value - reach)..=clamp(value + reach)
        };
        iproduct!(span(position.y, self.rows), span(position.x, self.cols))
            .map(|(row, col)| GridCoord::new(col, row))
            .collect()
    }

    /// Registers `id` in every cell its footprint overlaps and returns those cells.
    pub fn insert(&mut self, id: &str, position: Point3d, record: T) -> CellList {
        let cells = self.cells_around(position, VEHICLE_REACH);
        for coord in &cells {
            self.cell_mut(*coord).insert(id.to_string(), record);
        }
        cells
    }

    /// Removes `id` from the cells it occupied, then registers it at its new position.
    pub fn relocate(&mut self, id: &str, old_cells: &[GridCoord], position: Point3d, record: T) -> CellList {
        self.erase(id, old_cells);
        self.insert(id, position, record)
    }

    /// Removes `id` from every listed cell.
    pub fn erase(&mut self, id: &str, cells: &[GridCoord]) {
        for coord in cells {
            self.cell_mut(*coord).remove(id);
        }
    }

    /// Lists the cells that currently reference `id`.
    pub fn cells_of(&self, id: &str) -> Vec<GridCoord> {
        iproduct!(0..self.rows, 0..self.cols)
            .map(|(row, col)| GridCoord::new(col, row))
            .filter(|coord| self.cells[row_major(*coord, self.cols)].contains_key(id))
            .collect()
    }

    /// Finds the entities registered in the cells within `radius` of `position`.
    /// Each entity is returned once.
    pub fn query(&self, position: Point3d, radius: f64) -> Vec<(&str, T)> {
        self.cells_around(position, radius)
            .into_iter()
            .flat_map(|coord| &self.cells[row_major(coord, self.cols)])
            .map(|(id, record)| (id.as_str(), *record))
            .unique_by(|(id, _)| *id)
            .collect()
    }

    /// Whether no cell references any entity.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }
}

fn row_major(coord: GridCoord, cols: usize) -> usize {
    coord.row * cols + coord.col
}
