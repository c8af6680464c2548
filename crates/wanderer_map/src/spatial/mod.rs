//! Spatial layout for map systems
//!
//! This module keeps every system's bounding rectangle in an R-tree and
//! computes collision-free positions for newly discovered systems.

mod index;
mod position;

pub use index::{Rect, SpatialIndex};
pub use position::{
    system_rect, PositionCalculator, DEFAULT_ANCHOR, MARGIN_X, MARGIN_Y, SYSTEM_HEIGHT, SYSTEM_WIDTH,
};
