//! Geometry primitives shared by the live model and the stored records

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel size of a mode or an output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Both dimensions positive
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Logical size after applying output scale and rotation
    pub fn logical(&self, scale: f64, rotation: Rotation) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let size = Size::new(
            (self.width as f64 / scale) as i32,
            (self.height as f64 / scale) as i32,
        );
        if rotation.is_portrait() {
            size.transposed()
        } else {
            size
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(pos: Position, size: Size) -> Self {
        Self {
            x: pos.x,
            y: pos.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    /// Saturates instead of overflowing for far-off rectangles
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Vertical extents intersect (touching edges do not count)
    pub fn overlaps_vertically(&self, other: &Rect) -> bool {
        self.bottom() > other.top() && self.top() < other.bottom()
    }

    /// Smallest rectangle anchored at the origin containing both
    pub fn united_extent(&self, size: Size) -> Size {
        Size::new(size.width.max(self.right()), size.height.max(self.bottom()))
    }
}

/// Output rotation, stored as its bit code (1, 2, 4, 8)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rotation {
    #[default]
    None,
    /// 90 degrees counter-clockwise
    Left,
    Inverted,
    /// 90 degrees clockwise
    Right,
}

impl Rotation {
    pub fn code(&self) -> u8 {
        match self {
            Rotation::None => 1,
            Rotation::Left => 2,
            Rotation::Inverted => 4,
            Rotation::Right => 8,
        }
    }

    pub fn is_portrait(&self) -> bool {
        matches!(self, Rotation::Left | Rotation::Right)
    }
}

impl TryFrom<u8> for Rotation {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Rotation::None),
            2 => Ok(Rotation::Left),
            4 => Ok(Rotation::Inverted),
            8 => Ok(Rotation::Right),
            other => Err(format!("invalid rotation code {other}, expected 1, 2, 4 or 8")),
        }
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        rotation.code()
    }
}
