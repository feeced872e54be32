//! Exemplar and cohort property lists
//!
//! Only the binary form (`EQZB1###` / `CQZB1###`) is supported. Each
//! property is a numeric id with a typed array of values; strings are stored
//! as byte arrays.

use super::{record_variant, FileType, Record, Subfile, SubfileKind};
use crate::core::error::{DbpfError, Result};
use crate::core::header::Tgi;
use crate::core::stream::{ByteReader, ByteWriter};
use serde::Serialize;

const SIGNATURE_TAIL: &[u8; 7] = b"QZB1###";
const KEY_SINGLE: u16 = 0x00;
const KEY_MULTI: u16 = 0x80;

/// Property holding building style values in building exemplars
pub const OCCUPANT_GROUPS: u32 = 0xAA1D_D396;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExemplarKind {
    Exemplar,
    Cohort,
}

impl ExemplarKind {
    fn signature(self) -> [u8; 8] {
        let mut sig = [0u8; 8];
        sig[0] = match self {
            ExemplarKind::Exemplar => b'E',
            ExemplarKind::Cohort => b'C',
        };
        sig[1..].copy_from_slice(SIGNATURE_TAIL);
        sig
    }
}

/// Typed values of one property
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values")]
pub enum PropertyValue {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    Bool(Vec<bool>),
    String(String),
    /// String property whose bytes are not UTF-8
    RawString(Vec<u8>),
}

impl PropertyValue {
    fn type_code(&self) -> u16 {
        match self {
            PropertyValue::U8(_) => 0x0100,
            PropertyValue::U16(_) => 0x0200,
            PropertyValue::U32(_) => 0x0300,
            PropertyValue::I32(_) => 0x0700,
            PropertyValue::I64(_) => 0x0800,
            PropertyValue::F32(_) => 0x0900,
            PropertyValue::Bool(_) => 0x0B00,
            PropertyValue::String(_) | PropertyValue::RawString(_) => 0x0C00,
        }
    }

    /// Number of stored elements (bytes for strings)
    pub fn len(&self) -> usize {
        match self {
            PropertyValue::U8(v) => v.len(),
            PropertyValue::U16(v) => v.len(),
            PropertyValue::U32(v) => v.len(),
            PropertyValue::I32(v) => v.len(),
            PropertyValue::I64(v) => v.len(),
            PropertyValue::F32(v) => v.len(),
            PropertyValue::Bool(v) => v.len(),
            PropertyValue::String(s) => s.len(),
            PropertyValue::RawString(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_string(&self) -> bool {
        matches!(self, PropertyValue::String(_) | PropertyValue::RawString(_))
    }

    pub fn as_u32s(&self) -> Option<&[u32]> {
        match self {
            PropertyValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32s_mut(&mut self) -> Option<&mut Vec<u32>> {
        match self {
            PropertyValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn read(r: &mut ByteReader<'_>, code: u16, reps: usize) -> Result<Self> {
        let value = match code {
            0x0100 => PropertyValue::U8(r.bytes(reps)?.to_vec()),
            0x0200 => PropertyValue::U16((0..reps).map(|_| r.u16()).collect::<Result<_>>()?),
            0x0300 => PropertyValue::U32((0..reps).map(|_| r.u32()).collect::<Result<_>>()?),
            0x0700 => PropertyValue::I32((0..reps).map(|_| r.i32()).collect::<Result<_>>()?),
            0x0800 => PropertyValue::I64((0..reps).map(|_| r.i64()).collect::<Result<_>>()?),
            0x0900 => PropertyValue::F32((0..reps).map(|_| r.f32()).collect::<Result<_>>()?),
            0x0B00 => {
                let mut values = Vec::with_capacity(reps);
                for &byte in r.bytes(reps)? {
                    values.push(match byte {
                        0 => false,
                        1 => true,
                        other => {
                            return Err(DbpfError::malformed(format!(
                                "bool property value {:#04x}",
                                other
                            )))
                        }
                    });
                }
                PropertyValue::Bool(values)
            }
            0x0C00 => {
                let bytes = r.bytes(reps)?;
                match std::str::from_utf8(bytes) {
                    Ok(s) => PropertyValue::String(s.to_owned()),
                    Err(_) => PropertyValue::RawString(bytes.to_vec()),
                }
            }
            other => {
                return Err(DbpfError::malformed(format!(
                    "unknown property type {:#06x}",
                    other
                )))
            }
        };
        Ok(value)
    }

    fn write(&self, w: &mut ByteWriter) -> Result<()> {
        match self {
            PropertyValue::U8(v) => w.bytes(v),
            PropertyValue::U16(v) => v.iter().try_for_each(|x| w.u16(*x)),
            PropertyValue::U32(v) => v.iter().try_for_each(|x| w.u32(*x)),
            PropertyValue::I32(v) => v.iter().try_for_each(|x| w.i32(*x)),
            PropertyValue::I64(v) => v.iter().try_for_each(|x| w.i64(*x)),
            PropertyValue::F32(v) => v.iter().try_for_each(|x| w.f32(*x)),
            PropertyValue::Bool(v) => v.iter().try_for_each(|x| w.u8(*x as u8)),
            PropertyValue::String(s) => w.bytes(s.as_bytes()),
            PropertyValue::RawString(b) => w.bytes(b),
        }
    }

    fn element_size(code: u16) -> usize {
        match code {
            0x0200 => 2,
            0x0300 | 0x0700 | 0x0900 => 4,
            0x0800 => 8,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub id: u32,
    pub value: PropertyValue,
    /// Stored with a repetition count even when it holds one value
    pub multi: bool,
    /// Byte after the key type, kept as read
    pub unused: u8,
}

impl Property {
    pub fn new(id: u32, value: PropertyValue) -> Self {
        Property {
            id,
            multi: value.is_string(),
            value,
            unused: 0,
        }
    }

    fn key_type(&self) -> u16 {
        if self.multi || self.value.len() != 1 {
            KEY_MULTI
        } else {
            KEY_SINGLE
        }
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let id = r.u32()?;
        let code = r.u16()?;
        let key_type = r.u16()?;
        let unused = r.u8()?;
        let (multi, reps) = match key_type {
            KEY_SINGLE => (false, 1),
            KEY_MULTI => (true, r.count(PropertyValue::element_size(code))?),
            other => {
                return Err(DbpfError::malformed(format!(
                    "property {:#010x} has key type {:#06x}",
                    id, other
                )))
            }
        };
        let value = PropertyValue::read(r, code, reps)?;
        Ok(Property {
            id,
            value,
            multi,
            unused,
        })
    }

    fn write(&self, w: &mut ByteWriter) -> Result<()> {
        let key_type = self.key_type();
        w.u32(self.id)?;
        w.u16(self.value.type_code())?;
        w.u16(key_type)?;
        w.u8(self.unused)?;
        if key_type == KEY_MULTI {
            w.u32(self.value.len() as u32)?;
        }
        self.value.write(w)
    }
}

/// Binary exemplar or cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exemplar {
    pub kind: ExemplarKind,
    pub parent: Tgi,
    pub properties: Vec<Property>,
}

impl Exemplar {
    pub fn new(kind: ExemplarKind) -> Self {
        Exemplar {
            kind,
            parent: Tgi::new(0, 0, 0),
            properties: Vec::new(),
        }
    }

    pub fn get(&self, id: u32) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut PropertyValue> {
        self.properties
            .iter_mut()
            .find(|p| p.id == id)
            .map(|p| &mut p.value)
    }

    /// Replace the value of `id`, appending the property when absent
    pub fn set(&mut self, id: u32, value: PropertyValue) {
        match self.properties.iter_mut().find(|p| p.id == id) {
            Some(prop) => prop.value = value,
            None => self.properties.push(Property::new(id, value)),
        }
    }
}

impl Subfile for Exemplar {
    const TYPE_ID: u32 = FileType::Exemplar as u32;
    const KIND: SubfileKind = SubfileKind::PropertyList;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let signature: [u8; 8] = r.array()?;
        let kind = match signature[0] {
            b'E' if &signature[1..] == SIGNATURE_TAIL => ExemplarKind::Exemplar,
            b'C' if &signature[1..] == SIGNATURE_TAIL => ExemplarKind::Cohort,
            _ => {
                return Err(DbpfError::malformed(format!(
                    "exemplar signature {:?} is not binary",
                    String::from_utf8_lossy(&signature)
                )))
            }
        };
        let parent = Tgi::new(r.u32()?, r.u32()?, r.u32()?);
        let count = r.count(9)?;
        let mut properties = Vec::with_capacity(count);
        for _ in 0..count {
            properties.push(Property::read(&mut r)?);
        }
        if !r.is_empty() {
            return Err(DbpfError::malformed(format!(
                "{} bytes after the last property",
                r.remaining()
            )));
        }
        Ok(Exemplar {
            kind,
            parent,
            properties,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.bytes(&self.kind.signature())?;
        w.u32(self.parent.type_id)?;
        w.u32(self.parent.group_id)?;
        w.u32(self.parent.instance_id)?;
        w.u32(self.properties.len() as u32)?;
        for prop in &self.properties {
            prop.write(&mut w)?;
        }
        Ok(w.into_inner())
    }

    record_variant!(Exemplar, Exemplar);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building() -> Exemplar {
        let mut ex = Exemplar::new(ExemplarKind::Exemplar);
        ex.parent = Tgi::new(0x0534_2861, 0x4A3D_8C23, 0x0000_0001);
        ex.set(0x0000_0010, PropertyValue::U32(vec![0x02]));
        ex.set(0x0000_0020, PropertyValue::String("Maxis Building".into()));
        ex.set(OCCUPANT_GROUPS, PropertyValue::U32(vec![0x1000, 0x2000, 0x2001]));
        ex.set(0x27812810, PropertyValue::F32(vec![1.5, -2.0]));
        ex.set(0x4A0F_7E10, PropertyValue::Bool(vec![true]));
        ex
    }

    #[test]
    fn test_exemplar_roundtrip() {
        let ex = building();
        let bytes = ex.encode().unwrap();
        assert_eq!(&bytes[0..8], b"EQZB1###");
        let decoded = Exemplar::decode(&bytes).unwrap();
        assert_eq!(decoded.parent, ex.parent);
        assert_eq!(decoded.get(0x20).and_then(|v| v.as_str()), Some("Maxis Building"));
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_single_value_multi_flag_is_kept() {
        let mut ex = Exemplar::new(ExemplarKind::Cohort);
        let mut prop = Property::new(1, PropertyValue::U8(vec![7]));
        prop.multi = true;
        ex.properties.push(prop);
        ex.properties.push(Property::new(2, PropertyValue::U8(vec![8])));
        let bytes = ex.encode().unwrap();
        assert_eq!(&bytes[0..8], b"CQZB1###");

        let decoded = Exemplar::decode(&bytes).unwrap();
        assert!(decoded.properties[0].multi);
        assert!(!decoded.properties[1].multi);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_edit_u32_array() {
        let mut ex = building();
        let styles = ex.get_mut(OCCUPANT_GROUPS).and_then(|v| v.as_u32s_mut()).unwrap();
        styles.retain(|s| !(0x2000..=0x2003).contains(s));
        let decoded = Exemplar::decode(&ex.encode().unwrap()).unwrap();
        assert_eq!(
            decoded.get(OCCUPANT_GROUPS).and_then(|v| v.as_u32s()),
            Some(&[0x1000][..])
        );
    }

    #[test]
    fn test_text_exemplar_rejected() {
        let mut bytes = building().encode().unwrap();
        bytes[0..8].copy_from_slice(b"EQZT1###");
        assert!(matches!(
            Exemplar::decode(&bytes),
            Err(DbpfError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_string_preserved() {
        let mut ex = Exemplar::new(ExemplarKind::Exemplar);
        ex.set(0x20, PropertyValue::RawString(vec![0xFF, 0xFE, b'a']));
        let bytes = ex.encode().unwrap();
        let decoded = Exemplar::decode(&bytes).unwrap();
        assert_eq!(decoded.get(0x20), Some(&PropertyValue::RawString(vec![0xFF, 0xFE, b'a'])));
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_bad_bool_rejected() {
        let mut ex = Exemplar::new(ExemplarKind::Exemplar);
        ex.set(1, PropertyValue::Bool(vec![true]));
        let mut bytes = ex.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 2;
        assert!(Exemplar::decode(&bytes).is_err());
    }
}
