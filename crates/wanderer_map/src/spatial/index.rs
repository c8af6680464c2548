/// R-tree backed index of system bounding rectangles
/// Insert, update and delete are O(log n); overlap checks never scan the whole map.
use crate::types::{Position, SolarSystemId};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;

/// Axis-aligned rectangle in canvas coordinates (inclusive corners).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min: Position,
    pub max: Position,
}

impl Rect {
    /// Rectangle anchored at `origin` (top-left) with the given size.
    pub fn at(origin: Position, width: i32, height: i32) -> Self {
        Self {
            min: origin,
            max: Position::new(origin.x.saturating_add(width), origin.y.saturating_add(height)),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    fn envelope(&self) -> AABB<[i32; 2]> {
        AABB::from_corners([self.min.x, self.min.y], [self.max.x, self.max.y])
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Position::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Position::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// Entry stored in the R-tree
#[derive(Debug, Clone, PartialEq)]
struct IndexedRect {
    solar_system_id: SolarSystemId,
    rect: Rect,
}

impl RTreeObject for IndexedRect {
    type Envelope = AABB<[i32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.rect.envelope()
    }
}

/// Mutable rectangle index keyed by solar system.
///
/// Owned by exactly one map engine; nothing else mutates it.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedRect>,
    entries: HashMap<SolarSystemId, Rect>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index in one pass from existing rectangles.
    pub fn bulk_load(rects: impl IntoIterator<Item = (SolarSystemId, Rect)>) -> Self {
        let entries: HashMap<SolarSystemId, Rect> = rects.into_iter().collect();
        let items = entries
            .iter()
            .map(|(id, rect)| IndexedRect {
                solar_system_id: *id,
                rect: *rect,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(items),
            entries,
        }
    }

    /// Inserts a rectangle, replacing any previous one for the same system.
    pub fn insert(&mut self, solar_system_id: SolarSystemId, rect: Rect) {
        if self.entries.contains_key(&solar_system_id) {
            self.update(solar_system_id, rect);
            return;
        }
        self.tree.insert(IndexedRect { solar_system_id, rect });
        self.entries.insert(solar_system_id, rect);
    }

    pub fn update(&mut self, solar_system_id: SolarSystemId, rect: Rect) {
        if let Some(previous) = self.entries.insert(solar_system_id, rect) {
            self.tree.remove(&IndexedRect {
                solar_system_id,
                rect: previous,
            });
        }
        self.tree.insert(IndexedRect { solar_system_id, rect });
    }

    pub fn delete(&mut self, solar_system_ids: &[SolarSystemId]) {
        for solar_system_id in solar_system_ids {
            if let Some(rect) = self.entries.remove(solar_system_id) {
                self.tree.remove(&IndexedRect {
                    solar_system_id: *solar_system_id,
                    rect,
                });
            }
        }
    }

    pub fn get(&self, solar_system_id: SolarSystemId) -> Option<Rect> {
        self.entries.get(&solar_system_id).copied()
    }

    /// True when no indexed rectangle touches `rect`.
    pub fn is_free(&self, rect: &Rect) -> bool {
        self.tree
            .locate_in_envelope_intersecting(&rect.envelope())
            .next()
            .is_none()
    }

    /// Systems whose rectangles touch `rect`, sorted for stable output.
    pub fn intersecting(&self, rect: &Rect) -> Vec<SolarSystemId> {
        let mut ids: Vec<SolarSystemId> = self
            .tree
            .locate_in_envelope_intersecting(&rect.envelope())
            .map(|entry| entry.solar_system_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Smallest rectangle covering every entry.
    pub fn bounds(&self) -> Option<Rect> {
        self.entries.values().copied().reduce(|acc, rect| acc.union(&rect))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32) -> Rect {
        Rect::at(Position::new(x, y), 100, 30)
    }

    #[test]
    fn insert_then_query() {
        let mut index = SpatialIndex::new();
        index.insert(1, rect(0, 0));

        assert!(!index.is_free(&rect(50, 10)));
        assert!(index.is_free(&rect(200, 0)));
        assert_eq!(index.intersecting(&rect(50, 10)), vec![1]);
    }

    #[test]
    fn rectangles_at_the_edge_saturate() {
        let edge = Rect::at(Position::new(i32::MAX - 10, i32::MAX), 100, 30);
        assert_eq!(edge.max, Position::new(i32::MAX, i32::MAX));

        let mut index = SpatialIndex::new();
        index.insert(1, edge);
        assert!(!index.is_free(&Rect::at(Position::new(i32::MAX - 5, i32::MAX - 5), 1, 1)));
    }

    #[test]
    fn update_moves_the_rectangle() {
        let mut index = SpatialIndex::new();
        index.insert(1, rect(0, 0));
        index.update(1, rect(500, 500));

        assert!(index.is_free(&rect(0, 0)));
        assert!(!index.is_free(&rect(520, 510)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn reinsert_behaves_like_update() {
        let mut index = SpatialIndex::new();
        index.insert(1, rect(0, 0));
        index.insert(1, rect(300, 0));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1), Some(rect(300, 0)));
        assert!(index.is_free(&rect(0, 0)));
    }

    #[test]
    fn delete_removes_entries_and_ignores_unknown_ids() {
        let mut index = SpatialIndex::new();
        index.insert(1, rect(0, 0));
        index.insert(2, rect(200, 0));
        index.delete(&[1, 99]);

        assert_eq!(index.len(), 1);
        assert!(index.is_free(&rect(0, 0)));
        assert!(index.get(2).is_some());
    }

    #[test]
    fn bulk_load_and_bounds() {
        let index = SpatialIndex::bulk_load(vec![(1, rect(0, 0)), (2, rect(200, 100))]);
        let bounds = index.bounds().unwrap();

        assert_eq!(bounds.min, Position::new(0, 0));
        assert_eq!(bounds.max, Position::new(300, 130));
        assert!(!index.is_free(&rect(210, 110)));
    }
}
