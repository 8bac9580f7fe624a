//! Initial node placement.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Vector2};

/// Hands out one starting position per node, in node order.
pub trait PositionAllocator {
    fn next_position(&mut self) -> Vector2;
}

/// Whether a grid fills rows or columns first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridLayout {
    #[default]
    RowFirst,
    ColumnFirst,
}

/// Places nodes on a regular grid `grid_width` cells wide (or tall, for
/// [`GridLayout::ColumnFirst`]).
#[derive(Debug, Clone, PartialEq)]
pub struct GridPositionAllocator {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: u32,
    pub layout: GridLayout,
    index: u64,
}

impl GridPositionAllocator {
    pub fn new(
        min_x: f64,
        min_y: f64,
        delta_x: f64,
        delta_y: f64,
        grid_width: u32,
        layout: GridLayout,
    ) -> Self {
        GridPositionAllocator {
            min_x,
            min_y,
            delta_x,
            delta_y,
            grid_width: grid_width.max(1),
            layout,
            index: 0,
        }
    }
}

impl PositionAllocator for GridPositionAllocator {
    fn next_position(&mut self) -> Vector2 {
        let width = self.grid_width as u64;
        let (major, minor) = (self.index / width, self.index % width);
        self.index += 1;
        let (col, row) = match self.layout {
            GridLayout::RowFirst => (minor, major),
            GridLayout::ColumnFirst => (major, minor),
        };
        Vector2::new(
            self.min_x + self.delta_x * col as f64,
            self.min_y + self.delta_y * row as f64,
        )
    }
}

/// Draws each position uniformly inside a rectangle.
#[derive(Debug, Clone)]
pub struct RandomRectanglePositionAllocator {
    bounds: Rect,
    rng: ChaCha8Rng,
}

impl RandomRectanglePositionAllocator {
    pub fn new(bounds: Rect, rng: ChaCha8Rng) -> Self {
        RandomRectanglePositionAllocator { bounds, rng }
    }
}

impl PositionAllocator for RandomRectanglePositionAllocator {
    fn next_position(&mut self) -> Vector2 {
        let b = self.bounds;
        let x = if b.max_x > b.min_x {
            self.rng.gen_range(b.min_x..=b.max_x)
        } else {
            b.min_x
        };
        let y = if b.max_y > b.min_y {
            self.rng.gen_range(b.min_y..=b.max_y)
        } else {
            b.min_y
        };
        Vector2::new(x, y)
    }
}
