//! Geographic bounding rectangle.

use super::Pos;

/// An axis-aligned bounding rectangle in degrees.
///
/// Stored as a top-left / bottom-right pair, matching the four-column
/// layout of the output schema (`left_lonx`, `top_laty`, `right_lonx`,
/// `bottom_laty`). Does not handle anti-meridian crossing; sources with
/// such geometry split their records beforehand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top_left: Pos,
    pub bottom_right: Pos,
}

impl Rect {
    /// Creates a degenerate rectangle containing a single position.
    pub fn from_pos(pos: Pos) -> Self {
        Self {
            top_left: pos,
            bottom_right: pos,
        }
    }

    /// Creates a rectangle spanning two positions in any order.
    pub fn from_pair(a: Pos, b: Pos) -> Self {
        let mut rect = Rect::from_pos(a);
        rect.extend(b);
        rect
    }

    /// Grows the rectangle by the given amounts on each side.
    pub fn inflate(&mut self, dlon: f64, dlat: f64) {
        self.top_left.lonx -= dlon;
        self.top_left.laty += dlat;
        self.bottom_right.lonx += dlon;
        self.bottom_right.laty -= dlat;
    }

    /// Extends the rectangle to contain a position.
    pub fn extend(&mut self, pos: Pos) {
        if pos.lonx < self.top_left.lonx {
            self.top_left.lonx = pos.lonx;
        }
        if pos.lonx > self.bottom_right.lonx {
            self.bottom_right.lonx = pos.lonx;
        }
        if pos.laty > self.top_left.laty {
            self.top_left.laty = pos.laty;
        }
        if pos.laty < self.bottom_right.laty {
            self.bottom_right.laty = pos.laty;
        }
    }

    /// True if the position lies inside or on the boundary.
    pub fn contains(&self, pos: &Pos) -> bool {
        pos.lonx >= self.top_left.lonx
            && pos.lonx <= self.bottom_right.lonx
            && pos.laty <= self.top_left.laty
            && pos.laty >= self.bottom_right.laty
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.bottom_right.lonx - self.top_left.lonx
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.top_left.laty - self.bottom_right.laty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_grows_in_all_directions() {
        let mut rect = Rect::from_pos(Pos::new(10.0, 50.0));
        rect.extend(Pos::new(11.0, 51.0));
        rect.extend(Pos::new(9.0, 49.0));

        assert_eq!(rect.top_left.lonx, 9.0);
        assert_eq!(rect.top_left.laty, 51.0);
        assert_eq!(rect.bottom_right.lonx, 11.0);
        assert_eq!(rect.bottom_right.laty, 49.0);
    }

    #[test]
    fn test_inflate() {
        let mut rect = Rect::from_pos(Pos::new(0.0, 0.0));
        rect.inflate(0.5, 0.25);
        assert_eq!(rect.top_left.lonx, -0.5);
        assert_eq!(rect.top_left.laty, 0.25);
        assert_eq!(rect.bottom_right.lonx, 0.5);
        assert_eq!(rect.bottom_right.laty, -0.25);
        assert!((rect.width() - 1.0).abs() < 1e-12);
        assert!((rect.height() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_contains() {
        let rect = Rect::from_pair(Pos::new(-1.0, -1.0), Pos::new(1.0, 1.0));
        assert!(rect.contains(&Pos::new(0.0, 0.0)));
        assert!(rect.contains(&Pos::new(1.0, 1.0)));
        assert!(!rect.contains(&Pos::new(1.5, 0.0)));
        assert!(!rect.contains(&Pos::new(0.0, -1.5)));
    }
}
