use crate::core::error::Result;
use crate::core::stream::{ByteReader, ByteWriter};
use serde::{Deserialize, Serialize};

/// RGBA color as stored after a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(0xFF, 0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Textured vertex: position, uv and color (24 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
    pub color: Color,
}

impl Vertex {
    pub const SIZE: usize = 24;

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Vertex {
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            u: r.f32()?,
            v: r.f32()?,
            color: Color::new(r.u8()?, r.u8()?, r.u8()?, r.u8()?),
        })
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        for value in [self.x, self.y, self.z, self.u, self.v] {
            w.f32(value)?;
        }
        w.bytes(&[self.color.r, self.color.g, self.color.b, self.color.a])
    }

    /// Read a u32 count followed by that many vertices
    pub fn read_list(r: &mut ByteReader<'_>) -> Result<Vec<Vertex>> {
        let count = r.count(Self::SIZE)?;
        (0..count).map(|_| Vertex::read(r)).collect()
    }

    pub fn write_list(list: &[Vertex], w: &mut ByteWriter) -> Result<()> {
        w.u32(list.len() as u32)?;
        list.iter().try_for_each(|v| v.write(w))
    }
}

/// Column-major 4x4 model transform
///
/// Columns 0..3 are the x, y and z axes, column 3 the position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform(pub [f32; 16]);

impl Default for Transform {
    fn default() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Transform(m)
    }
}

impl Transform {
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let mut m = [0.0; 16];
        for value in m.iter_mut() {
            *value = r.f32()?;
        }
        Ok(Transform(m))
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        self.0.iter().try_for_each(|v| w.f32(*v))
    }

    fn set_column(&mut self, column: usize, value: [f32; 3]) {
        self.0[4 * column..4 * column + 3].copy_from_slice(&value);
    }

    pub fn position(&self) -> [f32; 3] {
        [self.0[12], self.0[13], self.0[14]]
    }

    pub fn set_position(&mut self, position: [f32; 3]) {
        self.set_column(3, position);
    }

    pub fn set_ex(&mut self, axis: [f32; 3]) {
        self.set_column(0, axis);
    }

    pub fn set_ez(&mut self, axis: [f32; 3]) {
        self.set_column(2, axis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        let vertex = Vertex {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            u: 0.5,
            v: 0.25,
            color: Color::new(1, 2, 3, 4),
        };
        let mut w = ByteWriter::new();
        vertex.write(&mut w).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), Vertex::SIZE);
        assert_eq!(&bytes[20..], &[1, 2, 3, 4]);
        assert_eq!(Vertex::read(&mut ByteReader::new(&bytes)).unwrap(), vertex);
    }

    #[test]
    fn test_transform_columns() {
        let mut m = Transform::default();
        m.set_position([8.0, 270.0, 24.0]);
        m.set_ex([0.0, 0.0, 1.0]);
        m.set_ez([-1.0, 0.0, 0.0]);
        assert_eq!(m.position(), [8.0, 270.0, 24.0]);
        assert_eq!(&m.0[0..3], &[0.0, 0.0, 1.0]);
        assert_eq!(&m.0[8..11], &[-1.0, 0.0, 0.0]);
        assert_eq!(m.0[15], 1.0);
    }
}
