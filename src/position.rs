use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-extents of the default stage.
pub const STAGE_HALF_WIDTH: i64 = 240;
pub const STAGE_HALF_HEIGHT: i64 = 180;

/// A point on the stage with coordinates truncated towards zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position2D {
    x: i64,
    y: i64,
}

impl Position2D {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.trunc() as i64,
            y: y.trunc() as i64,
        }
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn distance_to(&self, other: &Position2D) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        dx.hypot(dy)
    }

    /// Moves `distance` units along `degree`, measured from the x axis.
    #[must_use]
    pub fn go_in_direction(&self, degree: f64, distance: f64) -> Self {
        let radian = degree.to_radians();
        Self::new(
            self.x as f64 + distance * radian.cos(),
            self.y as f64 + distance * radian.sin(),
        )
    }

    /// Like [`go_in_direction`](Self::go_in_direction) with the angle
    /// measured from the y axis, as sprite directions are.
    #[must_use]
    pub fn go_in_direction_tilted(&self, degree: f64, distance: f64) -> Self {
        let radian = degree.to_radians();
        Self::new(
            self.x as f64 + distance * radian.sin(),
            self.y as f64 + distance * radian.cos(),
        )
    }

    #[must_use]
    pub fn clamp_to_stage(&self) -> Self {
        Self {
            x: self.x.clamp(-STAGE_HALF_WIDTH, STAGE_HALF_WIDTH),
            y: self.y.clamp(-STAGE_HALF_HEIGHT, STAGE_HALF_HEIGHT),
        }
    }

    /// Length of the stage diagonal, the largest possible distance.
    pub fn stage_diagonal() -> f64 {
        ((2 * STAGE_HALF_WIDTH) as f64).hypot((2 * STAGE_HALF_HEIGHT) as f64)
    }
}

impl fmt::Display for Position2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position2D({}/{})", self.x, self.y)
    }
}
