use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Integer 2D vector used both as a board coordinate and as a ray direction.
///
/// Screen orientation: positive x is to the right, positive y is down, so
/// `rotate_right` is a clockwise quarter turn on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: i32,
    pub y: i32,
}

impl Vector2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Quarter turn counter-clockwise on screen: `(x, y) -> (y, -x)`.
    pub fn rotate_left(&self) -> Vector2 {
        Vector2 {
            x: self.y,
            y: -self.x,
        }
    }

    /// Quarter turn clockwise on screen: `(x, y) -> (-y, x)`.
    pub fn rotate_right(&self) -> Vector2 {
        Vector2 {
            x: -self.y,
            y: self.x,
        }
    }

    pub fn reversed(&self) -> Vector2 {
        Vector2 {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, other: Vector2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
