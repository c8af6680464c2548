/// Placement of newly discovered systems
/// Tries slots around an origin in growing rings and takes the first free one.
use super::index::{Rect, SpatialIndex};
use crate::types::{LayoutDirection, MapOptions, Position};

/// Rendered width of a system node
pub const SYSTEM_WIDTH: i32 = 130;
/// Rendered height of a system node
pub const SYSTEM_HEIGHT: i32 = 34;
/// Horizontal gap kept between neighbouring nodes
pub const MARGIN_X: i32 = 50;
/// Vertical gap kept between neighbouring nodes
pub const MARGIN_Y: i32 = 20;
/// Where the first system of an empty map (or one with no origin) goes
pub const DEFAULT_ANCHOR: Position = Position::new(0, 0);
/// Rings tried before falling back to placing below the whole map
const MAX_LEVEL: i32 = 10;

const STEP_X: i32 = SYSTEM_WIDTH + MARGIN_X;
const STEP_Y: i32 = SYSTEM_HEIGHT + MARGIN_Y;

/// Bounding rectangle of a system node whose top-left corner is `position`.
pub fn system_rect(position: Position) -> Rect {
    Rect::at(position, SYSTEM_WIDTH, SYSTEM_HEIGHT)
}

/// Computes non-overlapping positions for new systems.
///
/// Placement is deterministic: the same index contents and origin always
/// yield the same slot. The first free slot wins; no global optimisation is
/// attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCalculator {
    layout: LayoutDirection,
}

impl PositionCalculator {
    pub fn new(options: &MapOptions) -> Self {
        Self {
            layout: options.layout,
        }
    }

    /// Finds a free slot near `origin`, or near [`DEFAULT_ANCHOR`] when the
    /// new system has no known origin.
    pub fn new_system_position(&self, origin: Option<Position>, index: &SpatialIndex) -> Position {
        let (anchor, first_level) = match origin {
            Some(origin) => (origin, 1),
            None => (DEFAULT_ANCHOR, 0),
        };

        for level in first_level..=MAX_LEVEL {
            for candidate in self.ring(anchor, level) {
                if index.is_free(&system_rect(candidate)) {
                    return candidate;
                }
            }
        }

        self.below_everything(anchor, index)
    }

    /// Candidate slots at ring `level`, nearest first.
    ///
    /// A ring holds the slots whose grid distance from the anchor is exactly
    /// `level`, on the layout's growth side (right of the origin for
    /// left-to-right maps, below it for top-to-bottom maps).
    fn ring(&self, anchor: Position, level: i32) -> Vec<Position> {
        if level == 0 {
            return vec![anchor];
        }

        let mut slots = Vec::new();
        for depth in 1..=level {
            for spread in spread_order(level) {
                if depth.max(spread.abs()) != level {
                    continue;
                }
                slots.push(self.slot(anchor, depth, spread));
            }
        }
        slots
    }

    fn slot(&self, anchor: Position, depth: i32, spread: i32) -> Position {
        match self.layout {
            LayoutDirection::LeftToRight => Position::new(
                anchor.x.saturating_add(depth * STEP_X),
                anchor.y.saturating_add(spread * STEP_Y),
            ),
            LayoutDirection::TopToBottom => Position::new(
                anchor.x.saturating_add(spread * STEP_X),
                anchor.y.saturating_add(depth * STEP_Y),
            ),
        }
    }

    fn below_everything(&self, anchor: Position, index: &SpatialIndex) -> Position {
        match index.bounds() {
            Some(bounds) => Position::new(anchor.x, bounds.max.y.saturating_add(MARGIN_Y + 1)),
            None => anchor,
        }
    }
}

/// 0, -1, 1, -2, 2, ... up to `level`
fn spread_order(level: i32) -> impl Iterator<Item = i32> {
    std::iter::once(0).chain((1..=level).flat_map(|n| [-n, n]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> PositionCalculator {
        PositionCalculator::new(&MapOptions::default())
    }

    #[test]
    fn empty_map_uses_the_default_anchor() {
        let index = SpatialIndex::new();
        assert_eq!(calculator().new_system_position(None, &index), DEFAULT_ANCHOR);
    }

    #[test]
    fn origin_places_to_the_right_first() {
        let mut index = SpatialIndex::new();
        let origin = Position::new(100, 100);
        index.insert(1, system_rect(origin));

        let placed = calculator().new_system_position(Some(origin), &index);
        assert_eq!(placed, Position::new(100 + STEP_X, 100));
    }

    #[test]
    fn top_to_bottom_places_below() {
        let mut index = SpatialIndex::new();
        let origin = Position::new(0, 0);
        index.insert(1, system_rect(origin));

        let calculator = PositionCalculator::new(&MapOptions {
            layout: LayoutDirection::TopToBottom,
        });
        assert_eq!(
            calculator.new_system_position(Some(origin), &index),
            Position::new(0, STEP_Y)
        );
    }

    #[test]
    fn crowded_slot_moves_to_the_next_candidate() {
        let mut index = SpatialIndex::new();
        let origin = Position::new(0, 0);
        index.insert(1, system_rect(origin));
        index.insert(2, system_rect(Position::new(STEP_X, 0)));

        let placed = calculator().new_system_position(Some(origin), &index);
        assert_eq!(placed, Position::new(STEP_X, -STEP_Y));
    }

    #[test]
    fn placement_is_deterministic() {
        let mut index = SpatialIndex::new();
        index.insert(1, system_rect(Position::new(0, 0)));

        let first = calculator().new_system_position(Some(Position::new(0, 0)), &index);
        let second = calculator().new_system_position(Some(Position::new(0, 0)), &index);
        assert_eq!(first, second);
    }

    #[test]
    fn sequential_inserts_never_overlap() {
        let mut index = SpatialIndex::new();
        let origin = Position::new(0, 0);
        index.insert(0, system_rect(origin));

        let mut rects = vec![system_rect(origin)];
        for id in 1..=300 {
            let position = calculator().new_system_position(Some(origin), &index);
            let rect = system_rect(position);
            index.insert(id, rect);
            rects.push(rect);
        }

        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }
}
