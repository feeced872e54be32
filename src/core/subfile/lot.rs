use super::entity::{Entity, EntityList, RecordHeader};
use super::{FileType, Record};
use crate::core::error::Result;
use crate::core::stream::ByteReader;
use serde::{Deserialize, Serialize};

/// Bit of `flag1` marking a lot as historical
pub const HISTORICAL: u8 = 0x20;

/// Subfile holding every lot of the city
pub type LotFile = EntityList<Lot>;

/// One lot record
///
/// Fields after the building iid (zone stats, jobs, capacity tables) are
/// kept as opaque trailing bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub header: RecordHeader,
    pub iid: u32,
    pub flag1: u8,
    pub min_x: u8,
    pub min_z: u8,
    pub max_x: u8,
    pub max_z: u8,
    pub commute_x: u8,
    pub commute_z: u8,
    pub y: f32,
    pub width: u8,
    pub depth: u8,
    pub orientation: u8,
    pub flag2: u8,
    pub flag3: u8,
    pub zone_type: u8,
    pub zone_wealth: u8,
    pub date_created: u32,
    pub building_iid: u32,
    #[serde(with = "serde_bytes_hex")]
    pub tail: Vec<u8>,
}

impl Lot {
    pub fn is_historical(&self) -> bool {
        self.flag1 & HISTORICAL != 0
    }

    pub fn set_historical(&mut self, historical: bool) {
        if historical {
            self.flag1 |= HISTORICAL;
        } else {
            self.flag1 &= !HISTORICAL;
        }
    }
}

impl Entity for Lot {
    const TYPE_ID: u32 = FileType::Lot as u32;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = RecordHeader::read(&mut r, bytes)?;
        Ok(Lot {
            header,
            iid: r.u32()?,
            flag1: r.u8()?,
            min_x: r.u8()?,
            min_z: r.u8()?,
            max_x: r.u8()?,
            max_z: r.u8()?,
            commute_x: r.u8()?,
            commute_z: r.u8()?,
            y: r.f32()?,
            width: r.u8()?,
            depth: r.u8()?,
            orientation: r.u8()?,
            flag2: r.u8()?,
            flag3: r.u8()?,
            zone_type: r.u8()?,
            zone_wealth: r.u8()?,
            date_created: r.u32()?,
            building_iid: r.u32()?,
            tail: r.rest().to_vec(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = self.header.begin()?;
        w.u32(self.iid)?;
        w.bytes(&[
            self.flag1,
            self.min_x,
            self.min_z,
            self.max_x,
            self.max_z,
            self.commute_x,
            self.commute_z,
        ])?;
        w.f32(self.y)?;
        w.bytes(&[
            self.width,
            self.depth,
            self.orientation,
            self.flag2,
            self.flag3,
            self.zone_type,
            self.zone_wealth,
        ])?;
        w.u32(self.date_created)?;
        w.u32(self.building_iid)?;
        w.bytes(&self.tail)?;
        Ok(RecordHeader::finish(w))
    }

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut RecordHeader {
        &mut self.header
    }

    fn wrap(list: LotFile) -> Record {
        Record::Lots(list)
    }

    fn unwrap(record: &Record) -> Option<&LotFile> {
        match record {
            Record::Lots(lots) => Some(lots),
            _ => None,
        }
    }

    fn unwrap_mut(record: &mut Record) -> Option<&mut LotFile> {
        match record {
            Record::Lots(lots) => Some(lots),
            _ => None,
        }
    }
}

/// Trailing bytes are shown as a hex string in JSON output
pub(crate) mod serde_bytes_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum;
    use crate::core::subfile::Subfile;

    fn lot(mem: u32, iid: u32) -> Lot {
        let mut header = RecordHeader::new(8);
        header.mem = mem;
        Lot {
            header,
            iid,
            min_x: 10,
            min_z: 12,
            max_x: 11,
            max_z: 13,
            y: 270.5,
            width: 2,
            depth: 2,
            zone_type: 1,
            zone_wealth: 2,
            date_created: 0x0025_1D3A,
            building_iid: 0x6A63_3C20,
            tail: vec![0xAB; 37],
            ..Default::default()
        }
    }

    #[test]
    fn test_lot_list_roundtrip() {
        let file: LotFile = vec![lot(1, 100), lot(2, 200)].into();
        let bytes = file.encode().unwrap();
        let decoded = LotFile::decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].iid, 200);
        assert_eq!(decoded[0].tail, vec![0xAB; 37]);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_historical_flag_reencodes_checksum() {
        let bytes = lot(5, 1).encode().unwrap();
        let mut decoded = Lot::decode(&bytes).unwrap();
        assert!(!decoded.is_historical());

        decoded.set_historical(true);
        decoded.flag1 |= 0x01;
        let out = decoded.encode().unwrap();
        assert!(checksum::verify(&out));
        assert_ne!(out, bytes);

        let again = Lot::decode(&out).unwrap();
        assert!(again.is_historical());
        assert_eq!(again.flag1, HISTORICAL | 0x01);
        decoded.set_historical(false);
        assert_eq!(decoded.flag1, 0x01);
    }

    #[test]
    fn test_size_overrun_is_malformed() {
        let mut bytes = lot(1, 1).encode().unwrap();
        let len = bytes.len() as u32 + 4;
        bytes[0..4].copy_from_slice(&len.to_le_bytes());
        assert!(LotFile::decode(&bytes).is_err());
    }

    #[test]
    fn test_hex_tail_serialization() {
        let json = serde_json::to_value(lot(1, 1)).unwrap();
        assert_eq!(json["tail"].as_str().unwrap().len(), 74);
        let back: Lot = serde_json::from_value(json).unwrap();
        assert_eq!(back.tail, vec![0xAB; 37]);
    }

    #[test]
    fn test_hex_tail_rejects_bad_digits() {
        let mut json = serde_json::to_value(lot(1, 1)).unwrap();
        assert!(json["tail"].as_str().unwrap().starts_with("abab"));

        json["tail"] = serde_json::Value::String("abc".into());
        assert!(serde_json::from_value::<Lot>(json.clone()).is_err());
        json["tail"] = serde_json::Value::String("zz".into());
        assert!(serde_json::from_value::<Lot>(json).is_err());
    }
}
