//! Quetzal save-file container
//!
//! An IFF `FORM` of type `IFZS` holding named chunks. Each chunk is a 4-byte
//! tag, a big-endian length, the payload, and a pad byte when the length is odd.
//! The container attaches no meaning to the chunks it carries.

use thiserror::Error;

pub type ChunkTag = [u8; 4];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuetzalError {
    #[error("not an IFF FORM file")]
    NotForm,

    #[error("FORM type is not IFZS")]
    NotQuetzal,

    #[error("truncated save file at offset {0}")]
    Truncated(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quetzal {
    chunks: Vec<(ChunkTag, Vec<u8>)>,
}

impl Quetzal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk, replacing any existing chunk with the same tag
    pub fn add_chunk(&mut self, tag: ChunkTag, data: Vec<u8>) {
        match self.chunks.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, existing)) => *existing = data,
            None => self.chunks.push((tag, data)),
        }
    }

    pub fn get_chunk(&self, tag: ChunkTag) -> Option<&[u8]> {
        self.chunks
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, d)| d.as_slice())
    }

    pub fn contains(&self, tag: ChunkTag) -> bool {
        self.get_chunk(tag).is_some()
    }

    pub fn tags(&self) -> impl Iterator<Item = &ChunkTag> {
        self.chunks.iter().map(|(t, _)| t)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let body_len: usize = self
            .chunks
            .iter()
            .map(|(_, d)| 8 + d.len() + d.len() % 2)
            .sum();
        let mut out = Vec::with_capacity(12 + body_len);
        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&((4 + body_len) as u32).to_be_bytes());
        out.extend_from_slice(b"IFZS");
        for (tag, data) in &self.chunks {
            out.extend_from_slice(tag);
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
            if data.len() % 2 == 1 {
                out.push(0);
            }
        }
        out
    }

    pub fn load(bytes: &[u8]) -> Result<Quetzal, QuetzalError> {
        let word = |i: usize| -> Result<u32, QuetzalError> {
            let b = bytes.get(i..i + 4).ok_or(QuetzalError::Truncated(i))?;
            Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        };
        if bytes.get(0..4) != Some(b"FORM".as_slice()) {
            return Err(QuetzalError::NotForm);
        }
        let form_end = 8 + word(4)? as usize;
        if bytes.get(8..12) != Some(b"IFZS".as_slice()) {
            return Err(QuetzalError::NotQuetzal);
        }
        if form_end > bytes.len() {
            return Err(QuetzalError::Truncated(bytes.len()));
        }

        let mut quetzal = Quetzal::new();
        let mut pos = 12;
        while pos + 8 <= form_end {
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&bytes[pos..pos + 4]);
            let len = word(pos + 4)? as usize;
            let start = pos + 8;
            let data = bytes
                .get(start..start + len)
                .filter(|_| start + len <= form_end)
                .ok_or(QuetzalError::Truncated(start))?;
            quetzal.chunks.push((tag, data.to_vec()));
            pos = start + len + len % 2;
        }
        Ok(quetzal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_odd_chunk() {
        let mut q = Quetzal::new();
        q.add_chunk(*b"IFhd", vec![1, 2, 3]);
        q.add_chunk(*b"Stks", vec![4, 5, 6, 7]);
        let bytes = q.serialize();
        // 12 header + (8+3+1) + (8+4)
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[4..8], &28u32.to_be_bytes());

        let loaded = Quetzal::load(&bytes).unwrap();
        assert_eq!(loaded.get_chunk(*b"IFhd"), Some([1u8, 2, 3].as_slice()));
        assert_eq!(loaded.get_chunk(*b"Stks"), Some([4u8, 5, 6, 7].as_slice()));
        assert_eq!(loaded, q);
    }

    #[test]
    fn test_add_chunk_replaces() {
        let mut q = Quetzal::new();
        q.add_chunk(*b"UMem", vec![1]);
        q.add_chunk(*b"UMem", vec![2]);
        assert_eq!(q.tags().count(), 1);
        assert_eq!(q.get_chunk(*b"UMem"), Some([2u8].as_slice()));
    }

    #[test]
    fn test_rejects_non_quetzal() {
        assert_eq!(Quetzal::load(b"JUNKJUNKJUNK"), Err(QuetzalError::NotForm));
        let mut bytes = Quetzal::new().serialize();
        bytes[8..12].copy_from_slice(b"AIFF");
        assert_eq!(Quetzal::load(&bytes), Err(QuetzalError::NotQuetzal));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut q = Quetzal::new();
        q.add_chunk(*b"Stks", vec![0; 16]);
        let mut bytes = q.serialize();
        bytes.truncate(bytes.len() - 4);
        assert!(Quetzal::load(&bytes).is_err());
    }
}
