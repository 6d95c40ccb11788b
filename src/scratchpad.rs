//! Scratch memory booked while a primitive is configured and handed over
//! by the caller (or allocated per call) at execution time.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchKey {
    /// Accumulator staging buffer used when dst is not a 32-bit type.
    IprodAccumulator,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchpadRegistry {
    entries: Vec<(ScratchKey, usize)>,
}

impl ScratchpadRegistry {
    /// Reserve `bytes` under `key`; booking a key twice keeps the larger size.
    pub fn book(&mut self, key: ScratchKey, bytes: usize) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, size)) => *size = (*size).max(bytes),
            None => self.entries.push((key, bytes)),
        }
    }

    pub fn size(&self, key: ScratchKey) -> usize {
        self.entries.iter().find(|(k, _)| *k == key).map_or(0, |&(_, s)| s)
    }

    pub fn total_bytes(&self) -> usize { self.entries.iter().map(|&(_, s)| s).sum() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Backing memory for a registry. Every entry is stored as i32 words.
pub struct Scratchpad {
    buffers: Vec<(ScratchKey, Vec<i32>)>,
}

impl Scratchpad {
    pub fn new(registry: &ScratchpadRegistry) -> Self {
        let word = std::mem::size_of::<i32>();
        let buffers = registry
            .entries
            .iter()
            .map(|&(key, bytes)| (key, vec![0i32; bytes.div_ceil(word)]))
            .collect();
        Self { buffers }
    }

    pub fn get_acc(&mut self, key: ScratchKey) -> Option<&mut [i32]> {
        self.buffers.iter_mut().find(|(k, _)| *k == key).map(|(_, b)| b.as_mut_slice())
    }

    /// Accumulator buffer of exactly `len` words under `key`.
    pub(crate) fn acc_for(&mut self, key: ScratchKey, len: usize) -> Result<&mut [i32]> {
        let buf = self.get_acc(key).ok_or(Error::BufferSize {
            arg: "scratchpad",
            expected: len,
            actual: 0,
        })?;
        if buf.len() < len {
            return Err(Error::BufferSize { arg: "scratchpad", expected: len, actual: buf.len() });
        }
        Ok(&mut buf[..len])
    }
}
