#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Records what a register machine did, one postcard COBS frame per
//! executed instruction, so a run can be shipped elsewhere and replayed
//! or inspected.

use core::mem::take;

use heapless::Vec;
use postcard::{from_bytes_cobs, to_slice_cobs};
use register_machine::{Instruction, Observer, Registers, Word};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Large enough for the worst case varint encoding of a [`TraceRecord`]
/// plus COBS overhead and the frame terminator.
pub const FRAME_CAP: usize = 48;

const FRAME_TERMINATOR: u8 = 0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    /// Zero based index of the step in the run.
    pub step: u64,
    pub pc: Word,
    pub instruction: Instruction,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceError {
    #[error("trace frame {0} could not be decoded")]
    Decode(usize),
}

/// An [`Observer`] that appends a frame per step to a fixed size buffer.
///
/// Once a frame does not fit the recorder stops and marks the trace as
/// truncated. It never fails the run it is watching.
pub struct CobsTrace<const BYTES: usize> {
    buffer: Vec<u8, BYTES>,
    next_step: u64,
    frames: usize,
    truncated: bool,
}

impl<const BYTES: usize> CobsTrace<BYTES> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            next_step: 0,
            frames: 0,
            truncated: false,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8, BYTES> {
        self.buffer
    }

    fn record(&mut self, record: &TraceRecord) {
        let mut scratch = [0u8; FRAME_CAP];
        let Ok(frame) = to_slice_cobs(record, &mut scratch) else {
            self.truncated = true;
            return;
        };
        if self.buffer.extend_from_slice(frame).is_err() {
            self.truncated = true;
            return;
        }
        self.frames = self.frames.saturating_add(1);
    }
}

impl<const BYTES: usize> Default for CobsTrace<BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BYTES: usize, const REGISTER_CAP: usize> Observer<REGISTER_CAP> for CobsTrace<BYTES> {
    fn observe(
        &mut self,
        instruction: &Instruction,
        _registers: &Registers<REGISTER_CAP>,
        pc: Word,
    ) {
        if self.truncated {
            return;
        }
        let record = TraceRecord {
            step: self.next_step,
            pc,
            instruction: *instruction,
        };
        self.next_step = self.next_step.saturating_add(1);
        self.record(&record);
    }
}

/// Decodes frames in place, so the bytes are not usable afterwards.
pub fn decode_frames(bytes: &mut [u8]) -> TraceReader<'_> {
    TraceReader {
        remaining: bytes,
        frame: 0,
    }
}

pub struct TraceReader<'b> {
    remaining: &'b mut [u8],
    frame: usize,
}

impl Iterator for TraceReader<'_> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let bytes = take(&mut self.remaining);
        let end = bytes
            .iter()
            .position(|byte| *byte == FRAME_TERMINATOR)
            .map_or(bytes.len(), |index| index.saturating_add(1));
        let (frame, rest) = bytes.split_at_mut(end);
        self.remaining = rest;

        let index = self.frame;
        self.frame = self.frame.saturating_add(1);
        Some(from_bytes_cobs(frame).map_err(|_| TraceError::Decode(index)))
    }
}
