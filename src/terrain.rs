//! Terrain elevation queries
//!
//! The terrain itself belongs to the game; geometry builders only need the
//! height at a metric position.

/// Height of the terrain at metric coordinates
pub trait Elevation {
    fn height(&self, x: f32, z: f32) -> f32;
}

/// Terrain at one constant height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatTerrain {
    pub height: f32,
}

impl FlatTerrain {
    /// Default height of a freshly terraformed city
    pub const DEFAULT_HEIGHT: f32 = 270.0;

    pub fn new(height: f32) -> Self {
        FlatTerrain { height }
    }
}

impl Default for FlatTerrain {
    fn default() -> Self {
        FlatTerrain::new(Self::DEFAULT_HEIGHT)
    }
}

impl Elevation for FlatTerrain {
    fn height(&self, _x: f32, _z: f32) -> f32 {
        self.height
    }
}

impl<F> Elevation for F
where
    F: Fn(f32, f32) -> f32,
{
    fn height(&self, x: f32, z: f32) -> f32 {
        self(x, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_terrain() {
        let terrain = FlatTerrain::default();
        assert_eq!(terrain.height(0.0, 4000.0), 270.0);
    }

    #[test]
    fn test_closure_terrain() {
        let slope = |x: f32, _z: f32| 250.0 + x / 16.0;
        assert_eq!(slope.height(32.0, 0.0), 252.0);
    }
}
