//! HPACK header compression (RFC 7541) with fingerprint control.
//!
//! One encoder and one decoder exist per connection and share nothing with
//! other connections; their dynamic tables advance monotonically for the
//! connection's lifetime and are never reinitialized. The representation
//! chosen per header (indexed / incremental / without-indexing / never-
//! indexed) follows the profile's indexing policy, which is itself part of
//! the fingerprint.

pub mod huffman;
pub mod integer;
pub mod table;

use bytes::Bytes;

use crate::profile::http2::{HpackIndexing, Indexing};

use table::{static_exact, static_name, DynamicTable, STATIC_TABLE};

/// HPACK coding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpackError {
    Truncated,
    IntegerOverflow,
    InvalidHuffman,
    InvalidIndex(usize),
}

impl std::fmt::Display for HpackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => f.write_str("truncated header block"),
            Self::IntegerOverflow => f.write_str("integer overflow"),
            Self::InvalidHuffman => f.write_str("invalid huffman coding"),
            Self::InvalidIndex(i) => write!(f, "invalid table index {}", i),
        }
    }
}

impl std::error::Error for HpackError {}

const STATIC_LEN: usize = STATIC_TABLE.len();

/// One header field with its resolved representation.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub indexing: Indexing,
}

impl Field {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, indexing: Indexing) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            indexing,
        }
    }
}

/// HPACK encoder with a connection-lifetime dynamic table.
pub struct Encoder {
    table: DynamicTable,
    /// Size update to announce at the start of the next block.
    pending_size_update: Option<usize>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
            pending_size_update: None,
        }
    }

    /// Adjust the table limit (bounded by the peer's
    /// SETTINGS_HEADER_TABLE_SIZE); announced in the next header block.
    pub fn set_max_table_size(&mut self, size: usize) {
        if size != self.table.max_size() {
            self.table.set_max_size(size);
            self.pending_size_update = Some(size);
        }
    }

    /// Encode one header block. Field order is the wire order.
    pub fn encode(&mut self, fields: &[Field]) -> Bytes {
        let mut out = Vec::with_capacity(fields.len() * 32);

        if let Some(size) = self.pending_size_update.take() {
            integer::encode(size, 5, 0x20, &mut out);
        }

        for field in fields {
            self.encode_field(field, &mut out);
        }
        Bytes::from(out)
    }

    fn encode_field(&mut self, field: &Field, out: &mut Vec<u8>) {
        let name = field.name.as_slice();
        let value = field.value.as_slice();

        match field.indexing {
            Indexing::Incremental => {
                // Fully-indexed representation when the pair is known.
                if let Some(idx) = static_exact(name, value) {
                    integer::encode(idx, 7, 0x80, out);
                    return;
                }
                if let Some(idx) = self.table.find_exact(name, value) {
                    integer::encode(STATIC_LEN + 1 + idx, 7, 0x80, out);
                    return;
                }
                // Literal with incremental indexing (6-bit name prefix).
                match self.find_name(name) {
                    Some(idx) => integer::encode(idx, 6, 0x40, out),
                    None => {
                        out.push(0x40);
                        encode_string(name, out);
                    }
                }
                encode_string(value, out);
                self.table.insert(name.to_vec(), value.to_vec());
            }
            Indexing::WithoutIndexing => {
                self.encode_literal(name, value, 0x00, out);
            }
            Indexing::NeverIndexed => {
                self.encode_literal(name, value, 0x10, out);
            }
        }
    }

    /// Literal with a 4-bit name prefix (without-indexing / never-indexed).
    fn encode_literal(&mut self, name: &[u8], value: &[u8], flags: u8, out: &mut Vec<u8>) {
        match self.find_name(name) {
            Some(idx) => integer::encode(idx, 4, flags, out),
            None => {
                out.push(flags);
                encode_string(name, out);
            }
        }
        encode_string(value, out);
    }

    fn find_name(&self, name: &[u8]) -> Option<usize> {
        static_name(name).or_else(|| self.table.find_name(name).map(|i| STATIC_LEN + 1 + i))
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_string(raw: &[u8], out: &mut Vec<u8>) {
    let (bytes, huffman) = huffman::encode_if_smaller(raw);
    integer::encode(bytes.len(), 7, if huffman { 0x80 } else { 0x00 }, out);
    out.extend_from_slice(&bytes);
}

/// HPACK decoder with a connection-lifetime dynamic table.
pub struct Decoder {
    table: DynamicTable,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
        }
    }

    /// Ceiling for dynamic-table size updates (our
    /// SETTINGS_HEADER_TABLE_SIZE).
    pub fn set_max_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
    }

    /// Decode one header block into (name, value) pairs.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>, HpackError> {
        let mut headers = Vec::new();
        let mut pos = 0;

        while pos < block.len() {
            let byte = block[pos];
            if byte & 0x80 != 0 {
                // Indexed field.
                let (index, used) = integer::decode(&block[pos..], 7)?;
                pos += used;
                if index == 0 {
                    return Err(HpackError::InvalidIndex(0));
                }
                let (name, value) = self.lookup(index)?;
                headers.push((name, value));
            } else if byte & 0xc0 == 0x40 {
                // Literal with incremental indexing.
                let (name, value, used) = self.decode_literal(&block[pos..], 6)?;
                pos += used;
                self.table.insert(name.clone(), value.clone());
                headers.push(to_string_pair(name, value));
            } else if byte & 0xe0 == 0x20 {
                // Dynamic table size update.
                let (size, used) = integer::decode(&block[pos..], 5)?;
                pos += used;
                self.table.set_max_size(size);
            } else {
                // Literal without indexing (0x00) or never indexed (0x10).
                let (name, value, used) = self.decode_literal(&block[pos..], 4)?;
                pos += used;
                headers.push(to_string_pair(name, value));
            }
        }
        Ok(headers)
    }

    fn decode_literal(
        &self,
        buf: &[u8],
        prefix_bits: u8,
    ) -> Result<(Vec<u8>, Vec<u8>, usize), HpackError> {
        let (name_index, mut pos) = integer::decode(buf, prefix_bits)?;
        let name = if name_index == 0 {
            let (name, used) = decode_string(&buf[pos..])?;
            pos += used;
            name
        } else {
            self.lookup_name(name_index)?
        };
        let (value, used) = decode_string(&buf[pos..])?;
        pos += used;
        Ok((name, value, pos))
    }

    fn lookup(&self, index: usize) -> Result<(String, String), HpackError> {
        if index <= STATIC_LEN {
            let (n, v) = STATIC_TABLE[index - 1];
            return Ok((
                String::from_utf8_lossy(n).into_owned(),
                String::from_utf8_lossy(v).into_owned(),
            ));
        }
        let (n, v) = self
            .table
            .get(index - STATIC_LEN - 1)
            .ok_or(HpackError::InvalidIndex(index))?;
        Ok((
            String::from_utf8_lossy(n).into_owned(),
            String::from_utf8_lossy(v).into_owned(),
        ))
    }

    fn lookup_name(&self, index: usize) -> Result<Vec<u8>, HpackError> {
        if index <= STATIC_LEN {
            return Ok(STATIC_TABLE[index - 1].0.to_vec());
        }
        self.table
            .get(index - STATIC_LEN - 1)
            .map(|(n, _)| n.to_vec())
            .ok_or(HpackError::InvalidIndex(index))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_string(buf: &[u8]) -> Result<(Vec<u8>, usize), HpackError> {
    if buf.is_empty() {
        return Err(HpackError::Truncated);
    }
    let huffman = buf[0] & 0x80 != 0;
    let (len, mut pos) = integer::decode(buf, 7)?;
    if buf.len() < pos + len {
        return Err(HpackError::Truncated);
    }
    let raw = &buf[pos..pos + len];
    pos += len;
    let bytes = if huffman {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok((bytes, pos))
}

fn to_string_pair(name: Vec<u8>, value: Vec<u8>) -> (String, String) {
    (
        String::from_utf8_lossy(&name).into_owned(),
        String::from_utf8_lossy(&value).into_owned(),
    )
}

/// Resolve the representation for each header per the policy.
///
/// Pseudo-headers are incrementally indexed unless the policy is `Never`
/// (their values are short, stable, and in every browser's dynamic table).
pub fn classify_pseudo(policy: &HpackIndexing) -> Indexing {
    match policy {
        HpackIndexing::Never => Indexing::WithoutIndexing,
        _ => Indexing::Incremental,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)], indexing: Indexing) -> Vec<Field> {
        pairs
            .iter()
            .map(|(n, v)| Field::new(n.as_bytes().to_vec(), v.as_bytes().to_vec(), indexing))
            .collect()
    }

    #[test]
    fn static_match_encodes_as_single_byte() {
        let mut encoder = Encoder::new();
        let block = encoder.encode(&fields(&[(":method", "GET")], Indexing::Incremental));
        assert_eq!(block.as_ref(), &[0x82]);
    }

    #[test]
    fn never_indexed_uses_0x10_prefix_with_name_index() {
        let mut encoder = Encoder::new();
        let block = encoder.encode(&[Field::new(
            b"cookie".to_vec(),
            b"sid=1".to_vec(),
            Indexing::NeverIndexed,
        )]);
        // cookie is static index 32: 0x10 | 15, then 32-15=17 continuation.
        assert_eq!(block[0], 0x1f);
        assert_eq!(block[1], 17);

        let mut decoder = Decoder::new();
        let headers = decoder.decode(&block).unwrap();
        assert_eq!(headers, vec![("cookie".to_string(), "sid=1".to_string())]);
    }

    #[test]
    fn incremental_entry_lands_in_both_tables() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();

        let first = encoder.encode(&fields(&[("user-agent", "mirage")], Indexing::Incremental));
        assert_eq!(
            decoder.decode(&first).unwrap(),
            vec![("user-agent".to_string(), "mirage".to_string())]
        );

        // Second occurrence is a dynamic-table hit: one indexed byte.
        let second = encoder.encode(&fields(&[("user-agent", "mirage")], Indexing::Incremental));
        assert_eq!(second.len(), 1);
        assert_eq!(
            decoder.decode(&second).unwrap(),
            vec![("user-agent".to_string(), "mirage".to_string())]
        );
    }

    #[test]
    fn fresh_decoder_cannot_follow_dynamic_references() {
        let mut encoder = Encoder::new();
        let first = encoder.encode(&fields(&[("x-token", "abc")], Indexing::Incremental));
        let second = encoder.encode(&fields(&[("x-token", "abc")], Indexing::Incremental));

        let mut continuous = Decoder::new();
        assert!(continuous.decode(&first).is_ok());
        assert!(continuous.decode(&second).is_ok());

        // A decoder that missed the first block has no table entry.
        let mut fresh = Decoder::new();
        assert!(matches!(
            fresh.decode(&second),
            Err(HpackError::InvalidIndex(_))
        ));
    }

    #[test]
    fn without_indexing_never_populates_the_table() {
        let mut encoder = Encoder::new();
        let b1 = encoder.encode(&fields(&[("x-a", "1")], Indexing::WithoutIndexing));
        let b2 = encoder.encode(&fields(&[("x-a", "1")], Indexing::WithoutIndexing));
        // No table growth: both blocks are identical literals.
        assert_eq!(b1, b2);
    }

    #[test]
    fn table_size_update_is_emitted_once() {
        let mut encoder = Encoder::new();
        encoder.set_max_table_size(0);
        let block = encoder.encode(&fields(&[(":method", "GET")], Indexing::Incremental));
        assert_eq!(block[0], 0x20);
        let next = encoder.encode(&fields(&[(":method", "GET")], Indexing::Incremental));
        assert_eq!(next[0], 0x82);
    }
}
