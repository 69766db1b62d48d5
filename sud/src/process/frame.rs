use anyhow::{Result, ensure};

use crate::codec::FrameCodec;
use crate::endian::swap_byte_pairs;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Compresses one frame into `scratch` and returns the stored payload:
/// padded to even length and byte-pair swapped.
pub fn pack_audio_frame<C: FrameCodec + ?Sized>(
    codec: &mut C,
    samples: &[i16],
    scratch: &mut Vec<u8>,
    n_channels: usize,
    n_samples: usize,
    capacity: usize,
) -> Result<Vec<u8>> {
    if scratch.len() < capacity {
        scratch.resize(capacity, 0);
    }

    let written = codec.encode_frame(samples, &mut scratch[..capacity], n_channels, n_samples)?;
    ensure!(
        written <= capacity,
        "codec reported {written} bytes for a {capacity}-byte buffer"
    );

    let stored = written.next_multiple_of(2);
    let mut payload = Vec::with_capacity(stored);
    payload.extend_from_slice(&scratch[..written]);
    payload.resize(stored, 0);
    swap_byte_pairs(&mut payload);

    Ok(payload)
}

/// Undoes the storage swap and decompresses `n_samples` samples per channel.
pub fn unpack_audio_frame<C: FrameCodec + ?Sized>(
    codec: &mut C,
    payload: &[u8],
    n_channels: usize,
    n_samples: usize,
) -> Result<Vec<i16>> {
    let mut data = payload.to_vec();
    swap_byte_pairs(&mut data);
    codec.decode_frame(&data, n_channels, n_samples)
}

/// Chunk time derived from the running sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTime {
    pub seconds: i32,
    pub offset_micros: i32,
}

/// Running sample counter of a stream; the only source of chunk timestamps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start_time_ms: i64,
    sample_rate: u32,
    total_samples: u64,
}

impl FrameClock {
    pub fn new(start_time_ms: i64, sample_rate: u32) -> Self {
        Self {
            start_time_ms,
            sample_rate,
            total_samples: 0,
        }
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Microseconds elapsed at the current sample position.
    pub fn elapsed_micros(&self) -> i64 {
        (self.total_samples as u128 * MICROS_PER_SECOND as u128 / self.sample_rate.max(1) as u128)
            as i64
    }

    /// Time of the next chunk to be written.
    pub fn timestamp(&self) -> ChunkTime {
        let elapsed = self.elapsed_micros();
        ChunkTime {
            seconds: (self.start_time_ms / 1000 + elapsed / MICROS_PER_SECOND) as i32,
            offset_micros: (elapsed % MICROS_PER_SECOND) as i32,
        }
    }

    pub fn advance(&mut self, n_samples: usize) {
        self.total_samples += n_samples as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{X3Codec, scratch_capacity};

    #[test]
    fn clock_offsets_at_48k() {
        let mut clock = FrameClock::new(1_700_000_000_000, 48000);
        let mut offsets = Vec::new();
        for _ in 0..3 {
            let t = clock.timestamp();
            assert_eq!(t.seconds, 1_700_000_000);
            offsets.push(t.offset_micros);
            clock.advance(1000);
        }
        assert_eq!(offsets, [0, 20833, 41666]);
        assert_eq!(clock.total_samples(), 3000);
    }

    #[test]
    fn clock_rolls_into_seconds() {
        let mut clock = FrameClock::new(10_999, 1000);
        clock.advance(2500);
        assert_eq!(
            clock.timestamp(),
            ChunkTime {
                seconds: 12,
                offset_micros: 500_000
            }
        );
    }

    #[test]
    fn odd_frames_are_padded() -> Result<()> {
        let mut codec = X3Codec::new();
        let samples = [-12345i16, 42];
        let capacity = scratch_capacity(1, 1);
        let mut scratch = Vec::new();

        // 1 channel, 1 sample: 2 coded bytes, already even
        let payload = pack_audio_frame(&mut codec, &samples, &mut scratch, 1, 1, capacity)?;
        assert_eq!(payload.len(), 2);

        let samples: Vec<i16> = (0..21).map(|i| i * 3).collect();
        let capacity = scratch_capacity(1, samples.len());
        let written = codec.encode_frame(&samples, &mut vec![0u8; capacity], 1, 21)?;
        // 16 + 2 + 4 + 20 x 3 bits
        assert_eq!(written, 11);
        assert_eq!(written % 2, 1);
        let payload = pack_audio_frame(&mut codec, &samples, &mut scratch, 1, 21, capacity)?;
        assert_eq!(payload.len(), written.next_multiple_of(2));

        let decoded = unpack_audio_frame(&mut codec, &payload, 1, 21)?;
        assert_eq!(decoded, samples);
        Ok(())
    }
}
