//! Wire-format definitions for data and acknowledgement frames.
//!
//! Every datagram exchanged between the two endpoints is one of two frames:
//!
//! - a **data frame**: `seq : u64 ‖ send_ts_ns : u64` (both big-endian)
//!   followed by zero padding up to the configured message size;
//! - a **SACK frame**: `ack_seq : u64 ‖ bitmap_len : u16` (big-endian)
//!   followed by `bitmap_len` bytes of presence bitmap.
//!
//! The bitmap covers the `bitmap_len * 8` sequences immediately above
//! `ack_seq`, LSB-first within each byte: bit `i` is **set** iff sequence
//! `ack_seq + 1 + i` has been received.  The decoder reports the complement —
//! every clear bit is a missing sequence.
//!
//! No I/O happens here — this is pure data transformation.

use thiserror::Error;

/// Fixed size of the data-frame header (`seq` + `send_ts_ns`).
pub const DATA_HEADER_LEN: usize = 16;

/// Fixed size of the SACK-frame header (`ack_seq` + `bitmap_len`).
pub const ACK_HEADER_LEN: usize = 10;

/// Smallest legal message size: a data frame is at least its header.
pub const MIN_MESSAGE_SIZE: usize = DATA_HEADER_LEN;

/// Largest datagram either endpoint will send or accept.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram shorter than the fixed data-frame header.
    #[error("data frame too short: {len} bytes, need at least {DATA_HEADER_LEN}")]
    DataTooShort { len: usize },

    /// Datagram shorter than the fixed SACK-frame header.
    #[error("ack frame too short: {len} bytes, need at least {ACK_HEADER_LEN}")]
    AckTooShort { len: usize },

    /// `bitmap_len` claims more bytes than the datagram actually carries.
    #[error("ack bitmap truncated: header claims {claimed} bytes, {available} present")]
    BitmapTruncated { claimed: usize, available: usize },
}

// ---------------------------------------------------------------------------
// Data frames
// ---------------------------------------------------------------------------

/// Parsed header of a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Sender-assigned monotonic sequence number (starts at 1).
    pub seq: u64,
    /// Sender's monotonic clock at transmission, in nanoseconds.
    pub send_ts_ns: u64,
}

/// Serialise a data frame of `total_size` bytes (clamped up to the header).
///
/// Bytes past the header are zero padding; the receiver only reads the
/// header, so padding exists purely to shape the datagram to the size under
/// measurement.
pub fn encode_data_frame(seq: u64, send_ts_ns: u64, total_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; total_size.max(DATA_HEADER_LEN)];
    buf[..8].copy_from_slice(&seq.to_be_bytes());
    buf[8..16].copy_from_slice(&send_ts_ns.to_be_bytes());
    buf
}

/// Parse a data frame from a raw datagram.
///
/// Accepts any datagram of at least [`DATA_HEADER_LEN`] bytes; trailing
/// padding is ignored.
pub fn decode_data_frame(buf: &[u8]) -> Result<DataHeader, FrameError> {
    if buf.len() < DATA_HEADER_LEN {
        return Err(FrameError::DataTooShort { len: buf.len() });
    }
    Ok(DataHeader {
        seq: u64::from_be_bytes(buf[..8].try_into().unwrap()),
        send_ts_ns: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
    })
}

// ---------------------------------------------------------------------------
// SACK frames
// ---------------------------------------------------------------------------

/// Parsed contents of a SACK frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SackFrame {
    /// Cumulative watermark: every sequence `1..=ack_seq` has been received.
    pub ack_seq: u64,
    /// Sequences in `(ack_seq, ack_seq + bitmap_len * 8]` reported missing.
    pub missing: Vec<u64>,
}

/// Serialise a SACK frame.
///
/// `window_size` is the bitmap span in sequences and must be a multiple of
/// eight.  The bitmap starts all-present; the bit of every `missing`
/// sequence inside `(ack_seq, ack_seq + window_size]` is cleared.  Missing
/// sequences outside that range are silently ignored — they become visible
/// once the watermark advances.
pub fn encode_sack_frame(ack_seq: u64, missing: &[u64], window_size: usize) -> Vec<u8> {
    debug_assert!(window_size % 8 == 0, "window must be a whole number of bytes");
    let bitmap_len = window_size / 8;

    let mut buf = vec![0u8; ACK_HEADER_LEN + bitmap_len];
    buf[..8].copy_from_slice(&ack_seq.to_be_bytes());
    buf[8..10].copy_from_slice(&(bitmap_len as u16).to_be_bytes());
    // Present until proven missing.
    buf[ACK_HEADER_LEN..].fill(0xff);

    for &seq in missing {
        if seq > ack_seq && seq <= ack_seq + window_size as u64 {
            let bit = (seq - ack_seq - 1) as usize;
            buf[ACK_HEADER_LEN + bit / 8] &= !(1 << (bit % 8));
        }
    }
    buf
}

/// Parse a SACK frame from a raw datagram.
///
/// Rejects datagrams shorter than the header or shorter than the bitmap the
/// header claims.  The window is implicit in `bitmap_len`.
pub fn decode_sack_frame(buf: &[u8]) -> Result<SackFrame, FrameError> {
    if buf.len() < ACK_HEADER_LEN {
        return Err(FrameError::AckTooShort { len: buf.len() });
    }

    let ack_seq = u64::from_be_bytes(buf[..8].try_into().unwrap());
    let bitmap_len = u16::from_be_bytes(buf[8..10].try_into().unwrap()) as usize;

    let bitmap = &buf[ACK_HEADER_LEN..];
    if bitmap.len() < bitmap_len {
        return Err(FrameError::BitmapTruncated {
            claimed: bitmap_len,
            available: bitmap.len(),
        });
    }

    let mut missing = Vec::new();
    for i in 0..bitmap_len * 8 {
        if bitmap[i / 8] & (1 << (i % 8)) == 0 {
            missing.push(ack_seq + 1 + i as u64);
        }
    }
    Ok(SackFrame { ack_seq, missing })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
