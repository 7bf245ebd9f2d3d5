//! Log record codec
//!
//! Defines the on-disk record layout, record positions and the
//! sequence-tagged key encoding shared by plain writes and batches.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

/// crc (4) + type (1) + key size varint (5) + value size varint (5)
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

/// Fewer bytes than this cannot hold a header
const MIN_HEADER_SIZE: usize = 4 + 1;

/// Sequence number tagged onto writes made outside a batch
pub const NON_TXN_SEQ: u64 = 0;

/// User-key part of a transaction finish marker
pub const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Kind of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key-value pair
    Normal = 0,

    /// A tombstone
    Deleted = 1,

    /// Closes the batch whose sequence number prefixes the key
    TxnFinished = 2,
}

impl LogRecordType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Normal),
            1 => Some(Self::Deleted),
            2 => Some(Self::TxnFinished),
            _ => None,
        }
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    pub crc: u32,
    pub rec_type: u8,
    pub key_size: u32,
    pub value_size: u32,
}

/// Where the current value of a key lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
}

impl LogRecordPos {
    /// Encode as `varint(file_id) ++ varint(offset)` (hint file values)
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + 10);
        encode_varint(&mut buf, self.file_id as u64);
        encode_varint(&mut buf, self.offset);
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let mut cursor = buf;
        let file_id = u32::try_from(decode_varint(&mut cursor)?).ok()?;
        let offset = decode_varint(&mut cursor)?;
        Some(Self { file_id, offset })
    }
}

/// A single key-value record as written to a data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

impl LogRecord {
    pub fn normal(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            rec_type: LogRecordType::Normal,
        }
    }

    pub fn deleted(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        }
    }

    /// Finish marker for the batch tagged `seq`
    pub fn txn_finished(seq: u64) -> Self {
        Self {
            key: encode_key_with_seq(seq, TXN_FIN_KEY),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        }
    }

    /// Encoded length in bytes
    pub fn size(&self) -> usize {
        4 + 1
            + varint_len(self.key.len() as u64)
            + varint_len(self.value.len() as u64)
            + self.key.len()
            + self.value.len()
    }

    /// Encode as `[crc][type][key size][value size][key][value]`
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());

        // CRC placeholder, patched once the rest is laid out
        buf.put_u32_le(0);
        buf.put_u8(self.rec_type as u8);
        encode_varint(&mut buf, self.key.len() as u64);
        encode_varint(&mut buf, self.value.len() as u64);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_le_bytes());

        buf.freeze()
    }

    /// Decode one record from the front of `buf`
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, header_len) = decode_header(buf)?.ok_or(CaskError::UnexpectedEof)?;

        let total = header_len + header.key_size as usize + header.value_size as usize;
        if buf.len() < total {
            return Err(CaskError::UnexpectedEof);
        }

        let record = Self::decode_payload(&header, &buf[..header_len], &buf[header_len..total])?;
        Ok((record, total))
    }

    /// Verify the CRC over header bytes + payload and split the payload
    ///
    /// `payload` must be exactly `key_size + value_size` bytes.
    pub(crate) fn decode_payload(
        header: &LogRecordHeader,
        header_bytes: &[u8],
        payload: &[u8],
    ) -> Result<Self> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes[4..]);
        hasher.update(payload);
        let computed = hasher.finalize();

        if computed != header.crc {
            return Err(CaskError::DataCorrupted {
                stored: header.crc,
                computed,
            });
        }

        let rec_type = LogRecordType::from_u8(header.rec_type).ok_or_else(|| {
            CaskError::MalformedRecord(format!("unknown record type {}", header.rec_type))
        })?;

        let (key, value) = payload.split_at(header.key_size as usize);

        Ok(Self {
            key: key.to_vec(),
            value: value.to_vec(),
            rec_type,
        })
    }
}

/// Decode a record header from the front of `buf`
///
/// Returns `Ok(None)` when `buf` ends before the header does (torn tail) or
/// the header is all zeroes (unwritten tail of a file). A size varint that is
/// longer than 5 bytes or overflows `u32` is `MalformedRecord`.
pub fn decode_header(buf: &[u8]) -> Result<Option<(LogRecordHeader, usize)>> {
    if buf.len() < MIN_HEADER_SIZE {
        return Ok(None);
    }

    let mut cursor = buf;
    let crc = cursor.get_u32_le();
    let rec_type = cursor.get_u8();
    let key_size = match decode_size(&mut cursor)? {
        Some(size) => size,
        None => return Ok(None),
    };
    let value_size = match decode_size(&mut cursor)? {
        Some(size) => size,
        None => return Ok(None),
    };

    if crc == 0 && key_size == 0 && value_size == 0 {
        return Ok(None);
    }

    let header = LogRecordHeader {
        crc,
        rec_type,
        key_size,
        value_size,
    };
    Ok(Some((header, buf.len() - cursor.len())))
}

/// Prefix `key` with the varint-encoded sequence number
pub fn encode_key_with_seq(seq: u64, key: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(varint_len(seq) + key.len());
    encode_varint(&mut buf, seq);
    buf.put_slice(key);
    buf.to_vec()
}

/// Split a record key into its sequence number and user key
pub fn parse_key_with_seq(key: &[u8]) -> Option<(u64, &[u8])> {
    let mut cursor = key;
    let seq = decode_varint(&mut cursor)?;
    Some((seq, cursor))
}

// =============================================================================
// Varint (LEB128)
// =============================================================================

fn encode_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_varint(data: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        if data.is_empty() || shift >= 64 {
            return None;
        }

        let byte = data[0];
        data.advance(1);

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }
}

/// Decode a header size field: at most 5 varint bytes, must fit `u32`
///
/// `Ok(None)` if the input ends first.
fn decode_size(data: &mut &[u8]) -> Result<Option<u32>> {
    let mut result = 0u64;

    for i in 0..5 {
        let Some(&byte) = data.first() else {
            return Ok(None);
        };
        data.advance(1);

        result |= ((byte & 0x7F) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            return u32::try_from(result).map(Some).map_err(|_| {
                CaskError::MalformedRecord(format!("size {} overflows u32", result))
            });
        }
    }

    Err(CaskError::MalformedRecord(
        "size varint longer than 5 bytes".to_string(),
    ))
}

fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}
