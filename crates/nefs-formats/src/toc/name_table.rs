//! Name table: a pool of NUL-terminated strings addressed by byte offset

use std::collections::HashMap;

/// Parsed name table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameTable {
    bytes: Vec<u8>,
}

impl NameTable {
    /// Wrap raw table bytes
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw table bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Table size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Name starting at `offset`
    ///
    /// A missing terminator ends the name at the table end. Returns `None`
    /// when the offset lies outside the table.
    pub fn get(&self, offset: u32) -> Option<String> {
        let start = offset as usize;
        let tail = self.bytes.get(start..)?;
        if tail.is_empty() {
            return None;
        }
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Some(String::from_utf8_lossy(&tail[..end]).into_owned())
    }
}

/// Builds a name table, storing each distinct name once
#[derive(Debug, Default)]
pub struct NameTableBuilder {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl NameTableBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name and return its offset
    pub fn add(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(name) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), offset);
        offset
    }

    /// Finish the table
    pub fn build(self) -> NameTable {
        NameTable::from_bytes(self.bytes)
    }
}
