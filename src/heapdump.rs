//! On-disk heap dump messages
//!
//! A heap dump is a zstd-compressed protobuf `HeapDump` message
//! (`.binpb.zst`). Only object-typed field values are recorded; primitive
//! field contents never influence reachability.
mod generated_src {
    include!(concat!(env!("OUT_DIR"), "/heapdump.generated_src.rs"));
}
use anyhow::Result;
use prost::Message;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub use generated_src::*;

impl HeapDump {
    pub fn from_binpb_zst(p: impl AsRef<Path>) -> Result<HeapDump> {
        let file = File::open(p)?;
        let mut reader = zstd::Decoder::new(file)?;
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(HeapDump::decode(buf.as_slice())?)
    }

    pub fn to_binpb_zst(&self, p: impl AsRef<Path>) -> Result<()> {
        let file = File::create(p)?;
        let mut writer = zstd::Encoder::new(file, 0)?;
        writer.write_all(&self.encode_to_vec())?;
        writer.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binpb_zst_round_trip() {
        let dump = HeapDump {
            objects: vec![HeapObject {
                id: 0x100,
                klass: 0x10,
                size: 24,
                kind: ObjectKind::ObjectArray as i32,
                fields: vec![],
                elements: vec![0, 0x100],
            }],
            roots: vec![RootEdge {
                objref: 0x100,
                kind: "thread".to_string(),
            }],
            classes: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heapdump.0.binpb.zst");
        dump.to_binpb_zst(&path).unwrap();
        assert_eq!(HeapDump::from_binpb_zst(&path).unwrap(), dump);
    }

    #[test]
    fn test_unknown_kind_survives_decoding() {
        let object = HeapObject {
            id: 1,
            kind: 42,
            ..Default::default()
        };
        let decoded = HeapObject::decode(object.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.kind, 42);
        assert_eq!(ObjectKind::from_i32(decoded.kind), None);
    }
}
