use super::entity::{Entity, EntityList, RecordHeader};
use super::geometry::{Transform, Vertex};
use super::lot::serde_bytes_hex;
use super::{FileType, Record};
use crate::core::error::Result;
use crate::core::stream::ByteReader;
use serde::{Deserialize, Serialize};

/// Tag written after the network occupant header of every pipe
pub const PIPE_TAG: u32 = 0xC772_BF98;

/// Occupant TGI of a pipe tile
pub const PIPE_GID: u32 = 0xA870_7E7E;
pub const PIPE_TID: u32 = 0x6534_284A;

/// Network type byte of pipes
pub const NETWORK_PIPE: u8 = 0x04;

/// Number of side texture lists a pipe tile carries
pub const SIDE_TEXTURE_LISTS: usize = 5;

/// Subfile holding every pipe tile of the city
pub type PipeFile = EntityList<Pipe>;

/// One pipe network tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub header: RecordHeader,
    pub minor: u16,
    pub zot: u16,
    pub unknown0: u8,
    pub appearance: u8,
    pub tag: u32,
    pub x_min_tract: u8,
    pub z_min_tract: u8,
    pub x_max_tract: u8,
    pub z_max_tract: u8,
    pub x_tract_size: u16,
    pub z_tract_size: u16,
    pub gid: u32,
    pub tid: u32,
    pub iid: u32,
    pub unknown1: u8,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vertices: [Vertex; 4],
    pub texture_id: u32,
    pub unknown2: [u8; 5],
    pub orientation: u8,
    pub unknown3: [u8; 3],
    pub network_type: u8,
    pub west_connection: u8,
    pub north_connection: u8,
    pub east_connection: u8,
    pub south_connection: u8,
    pub unknown4: [u8; 4],
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub z_min: f32,
    pub z_max: f32,
    pub y_nw: f32,
    pub y_ne: f32,
    pub y_sw: f32,
    pub y_se: f32,
    pub y_model: f32,
    pub x_tile: u32,
    pub z_tile: u32,
    pub matrix: Transform,
    pub blocks: u32,
    pub side_textures: Vec<Vec<Vertex>>,
    pub bottom: Vec<Vertex>,
    #[serde(with = "serde_bytes_hex")]
    pub tail: Vec<u8>,
}

impl Default for Pipe {
    fn default() -> Self {
        Pipe::new()
    }
}

impl Pipe {
    /// A pipe tile with the header values the game writes for new pipes
    pub fn new() -> Self {
        Pipe {
            header: RecordHeader::new(0x0003),
            minor: 0x0004,
            zot: 0x0000,
            unknown0: 0x00,
            appearance: 0x05,
            tag: PIPE_TAG,
            x_min_tract: 0x40,
            z_min_tract: 0x40,
            x_max_tract: 0x40,
            z_max_tract: 0x40,
            x_tract_size: 0x0002,
            z_tract_size: 0x0002,
            gid: PIPE_GID,
            tid: PIPE_TID,
            iid: 0x0000_0000,
            unknown1: 0x00,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vertices: [Vertex::default(); 4],
            texture_id: 0,
            unknown2: [0x00, 0x00, 0x00, 0x00, 0x00],
            orientation: 0,
            unknown3: [0x02, 0x00, 0x00],
            network_type: NETWORK_PIPE,
            west_connection: 0,
            north_connection: 0,
            east_connection: 0,
            south_connection: 0,
            unknown4: [0x00; 4],
            x_min: 0.0,
            x_max: 0.0,
            y_min: 0.0,
            y_max: 0.0,
            z_min: 0.0,
            z_max: 0.0,
            y_nw: 0.0,
            y_ne: 0.0,
            y_sw: 0.0,
            y_se: 0.0,
            y_model: 0.0,
            x_tile: 0,
            z_tile: 0,
            matrix: Transform::default(),
            blocks: 0,
            side_textures: vec![Vec::new(); SIDE_TEXTURE_LISTS],
            bottom: Vec::new(),
            tail: Vec::new(),
        }
    }

    /// Connection bytes in west, north, east, south order
    pub fn connections(&self) -> [u8; 4] {
        [
            self.west_connection,
            self.north_connection,
            self.east_connection,
            self.south_connection,
        ]
    }
}

impl Entity for Pipe {
    const TYPE_ID: u32 = FileType::Pipe as u32;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = RecordHeader::read(&mut r, bytes)?;
        let minor = r.u16()?;
        let zot = r.u16()?;
        let unknown0 = r.u8()?;
        let appearance = r.u8()?;
        let tag = r.u32()?;
        let x_min_tract = r.u8()?;
        let z_min_tract = r.u8()?;
        let x_max_tract = r.u8()?;
        let z_max_tract = r.u8()?;
        let x_tract_size = r.u16()?;
        let z_tract_size = r.u16()?;
        let gid = r.u32()?;
        let tid = r.u32()?;
        let iid = r.u32()?;
        let unknown1 = r.u8()?;
        let x = r.f32()?;
        let y = r.f32()?;
        let z = r.f32()?;
        let vertices = [
            Vertex::read(&mut r)?,
            Vertex::read(&mut r)?,
            Vertex::read(&mut r)?,
            Vertex::read(&mut r)?,
        ];
        let texture_id = r.u32()?;
        let unknown2 = r.array()?;
        let orientation = r.u8()?;
        let unknown3 = r.array()?;
        let network_type = r.u8()?;
        let west_connection = r.u8()?;
        let north_connection = r.u8()?;
        let east_connection = r.u8()?;
        let south_connection = r.u8()?;
        let unknown4 = r.array()?;
        let x_min = r.f32()?;
        let x_max = r.f32()?;
        let y_min = r.f32()?;
        let y_max = r.f32()?;
        let z_min = r.f32()?;
        let z_max = r.f32()?;
        let y_nw = r.f32()?;
        let y_ne = r.f32()?;
        let y_sw = r.f32()?;
        let y_se = r.f32()?;
        let y_model = r.f32()?;
        let x_tile = r.u32()?;
        let z_tile = r.u32()?;
        let matrix = Transform::read(&mut r)?;
        let blocks = r.u32()?;
        let lists = r.count(4)?;
        let side_textures = (0..lists)
            .map(|_| Vertex::read_list(&mut r))
            .collect::<Result<Vec<_>>>()?;
        let bottom = Vertex::read_list(&mut r)?;

        Ok(Pipe {
            header,
            minor,
            zot,
            unknown0,
            appearance,
            tag,
            x_min_tract,
            z_min_tract,
            x_max_tract,
            z_max_tract,
            x_tract_size,
            z_tract_size,
            gid,
            tid,
            iid,
            unknown1,
            x,
            y,
            z,
            vertices,
            texture_id,
            unknown2,
            orientation,
            unknown3,
            network_type,
            west_connection,
            north_connection,
            east_connection,
            south_connection,
            unknown4,
            x_min,
            x_max,
            y_min,
            y_max,
            z_min,
            z_max,
            y_nw,
            y_ne,
            y_sw,
            y_se,
            y_model,
            x_tile,
            z_tile,
            matrix,
            blocks,
            side_textures,
            bottom,
            tail: r.rest().to_vec(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = self.header.begin()?;
        w.u16(self.minor)?;
        w.u16(self.zot)?;
        w.u8(self.unknown0)?;
        w.u8(self.appearance)?;
        w.u32(self.tag)?;
        w.bytes(&[
            self.x_min_tract,
            self.z_min_tract,
            self.x_max_tract,
            self.z_max_tract,
        ])?;
        w.u16(self.x_tract_size)?;
        w.u16(self.z_tract_size)?;
        w.u32(self.gid)?;
        w.u32(self.tid)?;
        w.u32(self.iid)?;
        w.u8(self.unknown1)?;
        w.f32(self.x)?;
        w.f32(self.y)?;
        w.f32(self.z)?;
        for vertex in &self.vertices {
            vertex.write(&mut w)?;
        }
        w.u32(self.texture_id)?;
        w.bytes(&self.unknown2)?;
        w.u8(self.orientation)?;
        w.bytes(&self.unknown3)?;
        w.u8(self.network_type)?;
        w.bytes(&self.connections())?;
        w.bytes(&self.unknown4)?;
        for value in [
            self.x_min,
            self.x_max,
            self.y_min,
            self.y_max,
            self.z_min,
            self.z_max,
            self.y_nw,
            self.y_ne,
            self.y_sw,
            self.y_se,
            self.y_model,
        ] {
            w.f32(value)?;
        }
        w.u32(self.x_tile)?;
        w.u32(self.z_tile)?;
        self.matrix.write(&mut w)?;
        w.u32(self.blocks)?;
        w.u32(self.side_textures.len() as u32)?;
        for list in &self.side_textures {
            Vertex::write_list(list, &mut w)?;
        }
        Vertex::write_list(&self.bottom, &mut w)?;
        w.bytes(&self.tail)?;
        Ok(RecordHeader::finish(w))
    }

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    fn wrap(list: PipeFile) -> Record {
        Record::Pipes(list)
    }

    fn unwrap(record: &Record) -> Option<&PipeFile> {
        match record {
            Record::Pipes(pipes) => Some(pipes),
            _ => None,
        }
    }

    fn unwrap_mut(record: &mut Record) -> Option<&mut PipeFile> {
        match record {
            Record::Pipes(pipes) => Some(pipes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum;
    use crate::core::subfile::{Color, Subfile};

    fn sample() -> Pipe {
        let mut pipe = Pipe::new();
        pipe.header.mem = 0x10;
        pipe.x = 8.0;
        pipe.z = 24.0;
        pipe.vertices[2] = Vertex {
            x: 16.0,
            y: 259.8,
            z: 16.0,
            u: 1.0,
            v: 1.0,
            color: Color::new(0xFF, 0xFF, 0xFF, 0x80),
        };
        pipe.side_textures[0] = vec![Vertex::default(); 4];
        pipe.bottom = pipe.vertices.to_vec();
        pipe.east_connection = 0x02;
        pipe
    }

    #[test]
    fn test_pipe_roundtrip() {
        let bytes = sample().encode().unwrap();
        assert!(checksum::verify(&bytes));
        let decoded = Pipe::decode(&bytes).unwrap();
        assert_eq!(decoded, {
            let mut expected = sample();
            expected.header = decoded.header.clone();
            expected
        });
        assert_eq!(decoded.header.mem, 0x10);
        assert_eq!(decoded.connections(), [0, 0, 0x02, 0]);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_pipe_list_preserves_trailing_bytes() {
        let mut with_tail = sample();
        with_tail.tail = vec![1, 2, 3];
        let file: PipeFile = vec![sample(), with_tail].into();
        let bytes = file.encode().unwrap();
        let decoded = PipeFile::decode(&bytes).unwrap();
        assert_eq!(decoded[1].tail, vec![1, 2, 3]);
        assert!(decoded[0].tail.is_empty());
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_vertex_list_fails() {
        let bytes = sample().encode().unwrap();
        let mut cut = bytes[..bytes.len() - 10].to_vec();
        let len = cut.len() as u32;
        cut[0..4].copy_from_slice(&len.to_le_bytes());
        assert!(Pipe::decode(&cut).is_err());
    }
}
