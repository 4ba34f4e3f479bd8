//! Nearest-neighbour index over geodetic positions.
//!
//! Entries are projected onto the unit sphere so that nearest queries
//! compare chord distances instead of repeatedly evaluating the haversine
//! formula. Entries sitting at the null island origin (0/0/0) are kept in
//! the store but never returned from [`SpatialIndex::nearest`]; callers
//! use that position as the "coordinates unknown" marker.

use super::Pos;

/// Anything that can be placed in a [`SpatialIndex`].
pub trait Positioned {
    fn pos(&self) -> Pos;
}

/// A position-keyed nearest-neighbour store.
///
/// The index is rebuilt wholesale by its owner whenever the underlying
/// data changes; lookups scan the projected point list. Station counts in
/// practice are a few thousand, so the linear scan is not a bottleneck.
#[derive(Debug, Default)]
pub struct SpatialIndex<T> {
    entries: Vec<T>,
    points: Vec<Option<[f64; 3]>>,
}

impl<T: Positioned> SpatialIndex<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            points: Vec::new(),
        }
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.points.clear();
    }

    /// Number of entries, including unplaced ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry. Null-island entries are stored but not indexed.
    ///
    /// Returns the slot index of the new entry.
    pub fn insert(&mut self, entry: T) -> usize {
        let pos = entry.pos();
        self.points.push(if pos.is_null() {
            None
        } else {
            Some(pos.to_cartesian())
        });
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Access by slot index.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Returns the indexed entry closest to the given position.
    ///
    /// Unplaced entries are skipped. Returns `None` for an empty index or
    /// one that contains only unplaced entries.
    pub fn nearest(&self, pos: &Pos) -> Option<&T> {
        let target = pos.to_cartesian();
        let mut best: Option<(usize, f64)> = None;

        for (i, point) in self.points.iter().enumerate() {
            let Some(p) = point else { continue };
            let d = (p[0] - target[0]).powi(2)
                + (p[1] - target[1]).powi(2)
                + (p[2] - target[2]).powi(2);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        best.map(|(i, _)| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Station {
        ident: &'static str,
        pos: Pos,
    }

    impl Positioned for Station {
        fn pos(&self) -> Pos {
            self.pos
        }
    }

    #[test]
    fn test_nearest_picks_closest() {
        let mut index = SpatialIndex::new();
        index.insert(Station {
            ident: "KAAA",
            pos: Pos::new(0.0, 0.1),
        });
        index.insert(Station {
            ident: "KBBB",
            pos: Pos::new(1.0, 1.0),
        });

        let hit = index.nearest(&Pos::new(0.1, 0.1)).unwrap();
        assert_eq!(hit.ident, "KAAA");

        let hit = index.nearest(&Pos::new(0.9, 0.9)).unwrap();
        assert_eq!(hit.ident, "KBBB");
    }

    #[test]
    fn test_null_island_entries_excluded() {
        let mut index = SpatialIndex::new();
        index.insert(Station {
            ident: "NOPOS",
            pos: Pos::default(),
        });
        assert!(index.nearest(&Pos::new(0.0, 0.0)).is_none());

        index.insert(Station {
            ident: "KAAA",
            pos: Pos::new(10.0, 10.0),
        });
        assert_eq!(index.nearest(&Pos::new(0.0, 0.0)).unwrap().ident, "KAAA");
    }

    #[test]
    fn test_empty_index() {
        let index: SpatialIndex<Station> = SpatialIndex::new();
        assert!(index.is_empty());
        assert!(index.nearest(&Pos::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_antimeridian_neighbours() {
        // 179.9E and 179.9W are close on the sphere even though the
        // longitude values are far apart.
        let mut index = SpatialIndex::new();
        index.insert(Station {
            ident: "EAST",
            pos: Pos::new(179.9, 0.0),
        });
        index.insert(Station {
            ident: "FAR",
            pos: Pos::new(0.0, 45.0),
        });

        let hit = index.nearest(&Pos::new(-179.9, 0.0)).unwrap();
        assert_eq!(hit.ident, "EAST");
    }
}
