//! Batched memory reads.
//!
//! Every read transaction costs an address sequence and a command before any
//! data flows, roughly eleven nybbles worth of line time. Requests that sit
//! close together in memory are therefore cheaper to fetch as one block,
//! even if that drags in a few unwanted nybbles between them.
//!
//! [`BatchPlan`] sorts requests by address, merges neighbours into blocks
//! and lays the blocks out back to back in a scratch buffer. After one reset,
//! [`Station::read_batch`] reads each block and slices every request's data
//! back out of the scratch buffer in the caller's original order.

use log::debug;
use std::collections::BTreeMap;

use crate::field::{DecodeError, PhysicalValue};
use crate::memory_map::Measure;
use crate::nybble::{self, byte_len};
use crate::protocol::{check_span, ProtocolError, Station};
use crate::transport::Transport;

/// Gap, in nybbles, below which two requests share a block.
pub const FRAMING_OVERHEAD: usize = 11;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequest {
    pub address: u16,
    pub nybbles: usize,
}

impl MemoryRequest {
    pub const fn new(address: u16, nybbles: usize) -> Self {
        Self { address, nybbles }
    }
}

impl From<&Measure> for MemoryRequest {
    fn from(measure: &Measure) -> Self {
        Self::new(measure.address, measure.spec.width)
    }
}

/// A contiguous memory range read in one go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub address: u16,
    pub nybbles: usize,
    /// Where the block's first byte lands in the scratch buffer
    pub byte_offset: usize,
}

impl Block {
    fn end(&self) -> usize {
        usize::from(self.address) + self.nybbles
    }

    fn next_byte(&self) -> usize {
        self.byte_offset + byte_len(self.nybbles)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    pub blocks: Vec<Block>,
    /// Nybble offset of each request's data in the scratch buffer, in
    /// request order
    pub offsets: Vec<usize>,
    pub scratch_len: usize,
}

impl BatchPlan {
    pub fn new(requests: &[MemoryRequest]) -> Result<Self, ProtocolError> {
        for request in requests {
            check_span(request.address, request.nybbles)?;
        }

        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|&i| requests[i].address);

        let mut blocks: Vec<Block> = Vec::new();
        let mut offsets = vec![0; requests.len()];

        for i in order {
            let request = requests[i];
            let start = usize::from(request.address);
            let end = start + request.nybbles;

            let merges = blocks
                .last()
                .is_some_and(|b| b.end() + FRAMING_OVERHEAD >= start);

            if merges {
                if let Some(block) = blocks.last_mut() {
                    block.nybbles = block.nybbles.max(end - usize::from(block.address));
                }
            } else {
                let byte_offset = blocks.last().map_or(0, Block::next_byte);
                blocks.push(Block {
                    address: request.address,
                    nybbles: request.nybbles,
                    byte_offset,
                });
            }

            if let Some(block) = blocks.last() {
                offsets[i] = 2 * block.byte_offset + (start - usize::from(block.address));
            }
        }

        let scratch_len = blocks.last().map_or(0, Block::next_byte);

        Ok(Self {
            blocks,
            offsets,
            scratch_len,
        })
    }
}

/// Decoded values keyed by measure id.
pub type Reading = BTreeMap<&'static str, Result<PhysicalValue, DecodeError>>;

impl<T: Transport> Station<T> {
    /// Read every request with as few transactions as possible.
    ///
    /// Returns one packed buffer per request, in request order.
    pub fn read_batch(&mut self, requests: &[MemoryRequest]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let plan = BatchPlan::new(requests)?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Reading {} requests as {} blocks ({} bytes)",
            requests.len(),
            plan.blocks.len(),
            plan.scratch_len
        );

        self.reset()?;

        let mut scratch = vec![0u8; plan.scratch_len];
        for block in &plan.blocks {
            let data = self.read_block(block.address, block.nybbles)?;
            scratch[block.byte_offset..block.byte_offset + data.len()].copy_from_slice(&data);
        }

        requests
            .iter()
            .zip(&plan.offsets)
            .map(|(request, &offset)| {
                let mut out = vec![0u8; byte_len(request.nybbles)];
                nybble::copy_nybbles(&mut out, &scratch, request.nybbles, offset)?;
                Ok(out)
            })
            .collect()
    }

    /// Read and decode a set of measures in one batch.
    ///
    /// Transport failures abort the whole batch; a field that fails to decode
    /// only affects its own entry.
    pub fn acquire(&mut self, measures: &[Measure]) -> Result<Reading, ProtocolError> {
        let requests: Vec<MemoryRequest> = measures.iter().map(MemoryRequest::from).collect();
        let buffers = self.read_batch(&requests)?;

        Ok(measures
            .iter()
            .zip(&buffers)
            .map(|(measure, buf)| (measure.id, measure.spec.decode(buf, 0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbours_merge() {
        let plan = BatchPlan::new(&[
            MemoryRequest::new(0x100, 4),
            MemoryRequest::new(0x105, 2),
            MemoryRequest::new(0x200, 2),
        ])
        .unwrap();

        assert_eq!(
            plan.blocks,
            vec![
                Block {
                    address: 0x100,
                    nybbles: 7,
                    byte_offset: 0
                },
                Block {
                    address: 0x200,
                    nybbles: 2,
                    byte_offset: 4
                },
            ]
        );
        assert_eq!(plan.offsets, vec![0, 5, 8]);
        assert_eq!(plan.scratch_len, 5);
    }

    #[test]
    fn test_merge_threshold() {
        // block ends at 0x104; 0x104 + 11 = 0x10f
        let joined = BatchPlan::new(&[MemoryRequest::new(0x100, 4), MemoryRequest::new(0x10f, 1)])
            .unwrap();
        assert_eq!(joined.blocks.len(), 1);
        assert_eq!(joined.blocks[0].nybbles, 0x10);

        let split = BatchPlan::new(&[MemoryRequest::new(0x100, 4), MemoryRequest::new(0x110, 1)])
            .unwrap();
        assert_eq!(split.blocks.len(), 2);
    }

    #[test]
    fn test_contained_request_does_not_shrink_block() {
        let plan = BatchPlan::new(&[MemoryRequest::new(0x300, 10), MemoryRequest::new(0x302, 2)])
            .unwrap();
        assert_eq!(plan.blocks.len(), 1);
        assert_eq!(plan.blocks[0].nybbles, 10);
        assert_eq!(plan.offsets, vec![0, 2]);
    }

    #[test]
    fn test_offsets_follow_request_order() {
        let plan = BatchPlan::new(&[
            MemoryRequest::new(0x500, 3),
            MemoryRequest::new(0x100, 5),
            MemoryRequest::new(0x103, 2),
        ])
        .unwrap();

        assert_eq!(plan.blocks.len(), 2);
        assert_eq!(plan.blocks[0].address, 0x100);
        assert_eq!(plan.blocks[1].byte_offset, 3);
        assert_eq!(plan.offsets, vec![6, 0, 3]);
    }

    #[test]
    fn test_rejects_empty_request() {
        assert!(matches!(
            BatchPlan::new(&[MemoryRequest::new(0x100, 0)]),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }
}
