//! # Fragmentation Engine
//!
//! Splits one frame into `ceil(size / max_payload)` fragments. Every fragment
//! but the last carries exactly `max_payload` bytes; the last carries the
//! remainder. All fragments of a frame share the generation timestamp and the
//! fragment count, and carry the frame-level metadata so the receiver can
//! rebuild its view of the frame from whichever fragment arrives first.

use serde::Serialize;

use crate::catalog::FrameDescriptor;
use crate::error::ConfigError;

/// One transport-sized slice of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FragmentDescriptor {
    pub frame_sequence_number: u32,
    /// 0-based position within the frame.
    pub fragment_index: u16,
    /// Total fragments for this frame.
    pub fragment_count: u16,
    pub payload_size: u32,
    /// Instant fragmentation began, in seconds.
    pub generation_timestamp: f64,
    pub component_count: u32,
    pub reconstruction_error: f64,
    pub frame_size_bytes: u32,
}

/// Number of fragments `size_bytes` needs at `max_payload_size`.
pub fn fragment_count(size_bytes: u32, max_payload_size: usize) -> Result<u64, ConfigError> {
    if max_payload_size == 0 {
        return Err(ConfigError::InvalidPayloadSize(max_payload_size));
    }
    Ok((size_bytes as u64).div_ceil(max_payload_size as u64))
}

/// Fragment `frame` into payloads of at most `max_payload_size` bytes.
pub fn fragment_frame(
    frame: &FrameDescriptor,
    max_payload_size: usize,
    generation_timestamp: f64,
) -> Result<Vec<FragmentDescriptor>, ConfigError> {
    if max_payload_size == 0 {
        return Err(ConfigError::InvalidPayloadSize(max_payload_size));
    }
    if frame.size_bytes == 0 {
        return Err(ConfigError::EmptyFrame {
            sequence_number: frame.sequence_number,
        });
    }

    let count = fragment_count(frame.size_bytes, max_payload_size)?;
    let count = u16::try_from(count).map_err(|_| ConfigError::TooManyFragments {
        sequence_number: frame.sequence_number,
        fragments: count,
    })?;

    // Payloads larger than a frame can be are capped by the frame size anyway.
    let max_payload = max_payload_size.min(frame.size_bytes as usize) as u32;
    let mut remaining = frame.size_bytes;
    let mut out = Vec::with_capacity(count as usize);
    for index in 0..count {
        let payload_size = remaining.min(max_payload);
        remaining -= payload_size;
        out.push(FragmentDescriptor {
            frame_sequence_number: frame.sequence_number,
            fragment_index: index,
            fragment_count: count,
            payload_size,
            generation_timestamp,
            component_count: frame.component_count,
            reconstruction_error: frame.reconstruction_error,
            frame_size_bytes: frame.size_bytes,
        });
    }
    debug_assert_eq!(remaining, 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u32, size: u32) -> FrameDescriptor {
        FrameDescriptor {
            sequence_number: seq,
            component_count: 10,
            reconstruction_error: 4.5,
            size_bytes: size,
        }
    }

    #[test]
    fn catalog_example_counts() {
        let counts: Vec<_> = [100u32, 250, 50]
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                fragment_frame(&frame(i as u32 + 1, size), 100, 0.0)
                    .unwrap()
                    .len()
            })
            .collect();
        assert_eq!(counts, vec![1, 3, 1]);
    }

    #[test]
    fn last_fragment_carries_remainder() {
        let frags = fragment_frame(&frame(2, 250), 100, 1.5).unwrap();
        let sizes: Vec<_> = frags.iter().map(|f| f.payload_size).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        for (i, f) in frags.iter().enumerate() {
            assert_eq!(f.fragment_index as usize, i);
            assert_eq!(f.fragment_count, 3);
            assert_eq!(f.generation_timestamp, 1.5);
            assert_eq!(f.frame_sequence_number, 2);
            assert_eq!(f.frame_size_bytes, 250);
            assert_eq!(f.component_count, 10);
        }
    }

    #[test]
    fn exact_multiple_fills_last_fragment() {
        let frags = fragment_frame(&frame(1, 300), 100, 0.0).unwrap();
        assert_eq!(frags.len(), 3);
        assert!(frags.iter().all(|f| f.payload_size == 100));
    }

    #[test]
    fn frame_smaller_than_payload_is_single_fragment() {
        let frags = fragment_frame(&frame(1, 7), 1400, 0.0).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].payload_size, 7);
    }

    #[test]
    fn zero_size_frame_rejected() {
        let err = fragment_frame(&frame(9, 0), 100, 0.0).unwrap_err();
        assert_eq!(err, ConfigError::EmptyFrame { sequence_number: 9 });
    }

    #[test]
    fn zero_payload_size_rejected() {
        let err = fragment_frame(&frame(1, 10), 0, 0.0).unwrap_err();
        assert_eq!(err, ConfigError::InvalidPayloadSize(0));
    }

    #[test]
    fn fragment_count_overflow_rejected() {
        let err = fragment_frame(&frame(1, 70_000), 1, 0.0).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyFragments { fragments: 70_000, .. }));
    }
}
