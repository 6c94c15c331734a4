//! Sample-buffer helpers for batch delivery.

/// Peak-normalize in place: scale every sample so the maximum absolute
/// value becomes 1.0. A silent buffer is left unchanged, and re-normalizing
/// an already-normalized buffer is a no-op.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 && peak != 1.0 {
        let inv = 1.0 / peak;
        for s in samples.iter_mut() {
            *s *= inv;
        }
    }
}

/// Pack samples as raw little-endian 32-bit floats for the binary frame.
pub fn to_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_scales_peak_to_one() {
        let mut samples = vec![0.1, -0.5, 0.25];
        peak_normalize(&mut samples);
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
        // Ordering and relative amplitude preserved.
        assert!(samples[0] > 0.0 && samples[1] < 0.0 && samples[2] > 0.0);
        assert!((samples[0] / samples[2] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_silence_alone() {
        let mut samples = vec![0.0; 16];
        peak_normalize(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut samples = vec![0.5, -1.0, 0.125];
        peak_normalize(&mut samples);
        let once = samples.clone();
        peak_normalize(&mut samples);
        assert_eq!(once, samples);
    }

    #[test]
    fn le_bytes_layout() {
        let bytes = to_le_bytes(&[1.0f32]);
        assert_eq!(bytes, 1.0f32.to_le_bytes().to_vec());
        assert_eq!(to_le_bytes(&[0.0, 1.0]).len(), 8);
    }
}
