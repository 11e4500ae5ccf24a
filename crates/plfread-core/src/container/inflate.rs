//! Payload decompression and page reassembly.
//!
//! Compressed block payloads are zlib streams. Inflated content is organized
//! as 4 KB data pages; a logical object larger than one page spans several
//! consecutive pages, which are reassembled in declaration order into one
//! contiguous buffer before interpretation. Decompression is pure: identical
//! input always yields identical output.

use crate::container::BlockRecord;
use crate::error::{Error, Result};
use crate::PAGE_SIZE;
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::trace;

/// A block payload after decompression and page reassembly.
#[derive(Debug, Clone)]
pub struct InflatedBlock {
    /// Index of the originating block in framing order
    pub block_index: usize,
    /// The contiguous logical buffer
    pub data: Vec<u8>,
}

impl InflatedBlock {
    /// The 4 KB pages making up this buffer; the final page may be partial.
    pub fn pages(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(PAGE_SIZE)
    }

    /// Number of pages, counting a trailing partial page.
    pub fn page_count(&self) -> usize {
        self.data.len().div_ceil(PAGE_SIZE)
    }
}

/// Inflates a block's stored payload.
///
/// Uncompressed payloads pass through unchanged. A corrupt zlib stream is
/// [`Error::Decompression`] with the block index for diagnosis.
pub fn inflate_block(block: &BlockRecord) -> Result<InflatedBlock> {
    let data = if block.flags.compressed() {
        let mut decoder = ZlibDecoder::new(block.payload.as_slice());
        let mut out = Vec::with_capacity(block.payload.len().max(PAGE_SIZE));
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::decompression(block.index, e.to_string()))?;
        trace!(
            block = block.index,
            compressed = block.payload.len(),
            inflated = out.len(),
            "inflated payload"
        );
        out
    } else {
        block.payload.clone()
    };

    Ok(InflatedBlock {
        block_index: block.index,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::ContainerBuilder;
    use crate::container::{BlockFramer, Frame, Preamble};

    fn blocks_of(image: &[u8]) -> Vec<BlockRecord> {
        let preamble = Preamble::parse(image).unwrap();
        BlockFramer::new(image, preamble.header.data_size)
            .filter_map(|f| match f.unwrap() {
                Frame::Block(b) => Some(b),
                Frame::Marker { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_inflate_compressed_payload() {
        let payload = vec![0x42u8; 3 * PAGE_SIZE + 100];
        let mut builder = ContainerBuilder::new(14);
        builder.push_block(1, 1, 0, &payload, true, false);
        let image = builder.build();

        let blocks = blocks_of(&image);
        assert!(blocks[0].payload.len() < payload.len(), "should compress");
        let inflated = inflate_block(&blocks[0]).unwrap();
        assert_eq!(inflated.data, payload);
        assert_eq!(inflated.page_count(), 4);
    }

    #[test]
    fn test_uncompressed_passthrough() {
        let mut builder = ContainerBuilder::new(14);
        builder.push_block(1, 1, 0, b"plain", false, false);
        let image = builder.build();

        let inflated = inflate_block(&blocks_of(&image)[0]).unwrap();
        assert_eq!(inflated.data, b"plain");
        assert_eq!(inflated.page_count(), 1);
    }

    #[test]
    fn test_corrupt_stream() {
        let mut builder = ContainerBuilder::new(14);
        builder.push_block(1, 7, 0, &[0xAA; 2000], true, false);
        let image = builder.build();

        // A zlib stream cut short mid-body cannot inflate
        let mut block = blocks_of(&image)[0].clone();
        block.payload.truncate(block.payload.len() / 2);
        let result = inflate_block(&block);
        assert!(matches!(
            result,
            Err(Error::Decompression { block_index: 0, .. })
        ));
    }

    #[test]
    fn test_idempotent() {
        let mut builder = ContainerBuilder::new(14);
        builder.push_block(1, 1, 0, &[0x10; 5000], true, false);
        let image = builder.build();
        let block = &blocks_of(&image)[0];

        let a = inflate_block(block).unwrap();
        let b = inflate_block(block).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_pages_split_and_reassemble() {
        let data: Vec<u8> = (0..(2 * PAGE_SIZE + 17)).map(|i| i as u8).collect();
        let inflated = InflatedBlock {
            block_index: 0,
            data: data.clone(),
        };
        let pages: Vec<&[u8]> = inflated.pages().collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), PAGE_SIZE);
        assert_eq!(pages[2].len(), 17);
        // Concatenating the pages in declaration order restores the buffer
        let reassembled: Vec<u8> = pages.concat();
        assert_eq!(reassembled, data);
    }
}
