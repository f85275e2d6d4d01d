//! Stateless PCM sample-format conversion.
//!
//! Used when the capture format (browser float32 PCM) differs from the
//! format the STT provider expects (little-endian int16 PCM). Both
//! transforms operate on raw little-endian byte buffers; trailing bytes
//! that do not form a whole sample are ignored. The round trip is lossy
//! by quantization.

/// Convert float32 PCM to int16 PCM.
///
/// Each sample is clamped to `[-1.0, 1.0]`, scaled by 32767, and
/// truncated to an integer.
pub fn f32_to_i16_pcm(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() / 2);
    for chunk in input.chunks_exact(4) {
        let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        output.extend_from_slice(&value.to_le_bytes());
    }
    output
}

/// Convert int16 PCM to float32 PCM (each sample divided by 32767.0).
pub fn i16_to_f32_pcm(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 2);
    for chunk in input.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        let value = sample as f32 / 32767.0;
        output.extend_from_slice(&value.to_le_bytes());
    }
    output
}
