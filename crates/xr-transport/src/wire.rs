//! # Wire Format
//!
//! Every fragment travels as one datagram: a fixed 32-byte header followed by
//! `payload_size` opaque payload bytes.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Frame Number                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Component Count                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Reconstruction Error (f64)                   |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Frame Size (bytes)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Generation Time (f64, seconds)               |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Fragment Index         |        Fragment Count         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All fields are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::fragment::FragmentDescriptor;

/// Encoded header length in bytes.
pub const HEADER_SIZE: usize = 32;

// ─── Fragment Header ────────────────────────────────────────────────────────

/// Decoded fragment header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentHeader {
    pub frame_number: u32,
    pub component_count: u32,
    pub reconstruction_error: f64,
    pub frame_size_bytes: u32,
    pub generation_time: f64,
    pub fragment_index: u16,
    pub fragment_count: u16,
}

impl FragmentHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.frame_number);
        buf.put_u32(self.component_count);
        buf.put_f64(self.reconstruction_error);
        buf.put_u32(self.frame_size_bytes);
        buf.put_f64(self.generation_time);
        buf.put_u16(self.fragment_index);
        buf.put_u16(self.fragment_count);
    }

    /// Decode a header. Returns `None` if the buffer is short or the
    /// fragment numbering is impossible.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HEADER_SIZE {
            return None;
        }
        let header = FragmentHeader {
            frame_number: buf.get_u32(),
            component_count: buf.get_u32(),
            reconstruction_error: buf.get_f64(),
            frame_size_bytes: buf.get_u32(),
            generation_time: buf.get_f64(),
            fragment_index: buf.get_u16(),
            fragment_count: buf.get_u16(),
        };
        if header.fragment_count == 0 || header.fragment_index >= header.fragment_count {
            return None;
        }
        Some(header)
    }
}

// ─── Datagram ───────────────────────────────────────────────────────────────

/// Header plus payload, ready for (or fresh off) the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub header: FragmentHeader,
    pub payload: Bytes,
}

impl Datagram {
    /// Build the datagram for a fragment. The payload is zero-filled; media
    /// content itself is not modelled.
    pub fn from_fragment(frag: &FragmentDescriptor) -> Self {
        Datagram {
            header: FragmentHeader {
                frame_number: frag.frame_sequence_number,
                component_count: frag.component_count,
                reconstruction_error: frag.reconstruction_error,
                frame_size_bytes: frag.frame_size_bytes,
                generation_time: frag.generation_timestamp,
                fragment_index: frag.fragment_index,
                fragment_count: frag.fragment_count,
            },
            payload: Bytes::from(vec![0u8; frag.payload_size as usize]),
        }
    }

    /// The fragment this datagram carries.
    pub fn to_fragment(&self) -> FragmentDescriptor {
        FragmentDescriptor {
            frame_sequence_number: self.header.frame_number,
            fragment_index: self.header.fragment_index,
            fragment_count: self.header.fragment_count,
            payload_size: self.payload.len() as u32,
            generation_timestamp: self.header.generation_time,
            component_count: self.header.component_count,
            reconstruction_error: self.header.reconstruction_error,
            frame_size_bytes: self.header.frame_size_bytes,
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Decode a whole datagram; everything after the header is payload.
    /// An empty payload is rejected since fragments always carry data.
    pub fn decode(mut buf: Bytes) -> Option<Self> {
        let header = FragmentHeader::decode(&mut buf)?;
        if buf.is_empty() {
            return None;
        }
        Some(Datagram {
            header,
            payload: buf,
        })
    }
}
