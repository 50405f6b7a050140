use bytes::Bytes;

use crate::model::{DfsConfig, ModelError, ModelResult};

/// Splits file bytes into ordered pieces of at most `chunk_size` bytes
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize) -> ModelResult<Self> {
        if chunk_size == 0 {
            return Err(ModelError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn from_config(config: &DfsConfig) -> ModelResult<Self> {
        Self::new(config.chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Zero-copy split. An empty input yields no pieces.
    pub fn split(&self, data: &Bytes) -> Vec<Bytes> {
        let mut pieces = Vec::with_capacity(data.len().div_ceil(self.chunk_size));
        let mut offset = 0;

        while offset < data.len() {
            let end = std::cmp::min(offset + self.chunk_size, data.len());
            pieces.push(data.slice(offset..end));
            offset = end;
        }

        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact_multiple() {
        let chunker = Chunker::new(3).unwrap();
        let pieces = chunker.split(&Bytes::from_static(b"AAABBBCCC"));
        assert_eq!(pieces, vec![&b"AAA"[..], &b"BBB"[..], &b"CCC"[..]]);
    }

    #[test]
    fn test_split_with_remainder() {
        let chunker = Chunker::new(4).unwrap();
        let pieces = chunker.split(&Bytes::from_static(b"0123456789"));
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2].as_ref(), b"89");
        assert!(pieces.iter().all(|p| p.len() <= 4));
    }

    #[test]
    fn test_split_empty() {
        let chunker = Chunker::new(4).unwrap();
        assert!(chunker.split(&Bytes::new()).is_empty());
    }

    #[test]
    fn test_rejects_zero_size() {
        assert!(Chunker::new(0).is_err());
    }

    #[test]
    fn test_reassembly_preserves_bytes() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let chunker = Chunker::from_config(&DfsConfig::default().with_chunk_size(1024)).unwrap();

        let pieces = chunker.split(&Bytes::from(data.clone()));
        assert_eq!(pieces.len(), 10);
        assert_eq!(pieces.concat(), data);
    }
}
