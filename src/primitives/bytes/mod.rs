#![forbid(unsafe_code)]
//! Little-endian encoders and the packed edge record layout used on disk.

pub mod le {
    //! Fixed-width little-endian integers.

    const U64_LEN: usize = core::mem::size_of::<u64>();
    const U32_LEN: usize = core::mem::size_of::<u32>();

    /// Appends `v` as eight little-endian bytes.
    pub fn put_u64(dst: &mut Vec<u8>, v: u64) {
        dst.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends `v` as four little-endian bytes.
    pub fn put_u32(dst: &mut Vec<u8>, v: u32) {
        dst.extend_from_slice(&v.to_le_bytes());
    }

    /// Decodes the first eight bytes of `src`, or `None` when it is shorter.
    pub fn get_u64(src: &[u8]) -> Option<u64> {
        let head: [u8; U64_LEN] = src.get(..U64_LEN)?.try_into().ok()?;
        Some(u64::from_le_bytes(head))
    }

    /// Decodes the first four bytes of `src`, or `None` when it is shorter.
    pub fn get_u32(src: &[u8]) -> Option<u32> {
        let head: [u8; U32_LEN] = src.get(..U32_LEN)?.try_into().ok()?;
        Some(u32::from_le_bytes(head))
    }

    /// Decodes consecutive u64 words; trailing bytes that do not fill a word are ignored.
    pub fn get_u64s<const N: usize>(src: &[u8]) -> Option<[u64; N]> {
        let mut out = [0u64; N];
        for (idx, word) in out.iter_mut().enumerate() {
            *word = get_u64(src.get(idx * U64_LEN..)?)?;
        }
        Some(out)
    }
}

pub mod record {
    //! `(u64 src, u64 dst[, u64 data])` packed records shared by the binary
    //! edge list and the X-Stream edge stream.

    use super::le;
    use crate::types::{EdgeDataKind, EdgeRecord};

    /// Bytes per packed record for `kind`.
    pub const fn width(kind: EdgeDataKind) -> usize {
        if kind.has_data() {
            24
        } else {
            16
        }
    }

    /// Appends one packed record. Payload bits are written only for weighted kinds.
    pub fn encode(edge: &EdgeRecord, kind: EdgeDataKind, out: &mut Vec<u8>) {
        le::put_u64(out, edge.src);
        le::put_u64(out, edge.dst);
        if kind.has_data() {
            le::put_u64(out, edge.data);
        }
    }

    /// Decodes one packed record from the front of `src`.
    pub fn decode(src: &[u8], kind: EdgeDataKind) -> Option<EdgeRecord> {
        if kind.has_data() {
            let [src_id, dst, data] = le::get_u64s::<3>(src)?;
            Some(EdgeRecord::with_data(src_id, dst, data))
        } else {
            let [src_id, dst] = le::get_u64s::<2>(src)?;
            Some(EdgeRecord::new(src_id, dst))
        }
    }
}
