//! Validation tests for Pass 0: Stereo Downmix

use wav2midi::audio::{decode_sample, PcmBuffer, TranscriptionState, WaveSource};
use wav2midi::config::{Channel, Config};
use wav2midi::error::TranscribeError;
use wav2midi::passes::pass_0;

/// Reference mono value: mean of the two channels, half away from zero
fn expected_mono(left: i64, right: i64) -> f64 {
    ((left + right) as f64 / 2.0).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_2_extremes() {
        let frames = [
            (i16::MAX, i16::MAX),
            (i16::MIN, i16::MIN),
            (i16::MAX, i16::MIN),
            (1, 0),
            (-1, 0),
            (12_345, -2_001),
        ];
        let mut source = PcmBuffer::from_stereo_i16(44100, &frames);
        let mono = pass_0::downmix(&mut source, None).unwrap();

        assert_eq!(mono.len(), frames.len());
        for (value, &(l, r)) in mono.iter().zip(frames.iter()) {
            assert_eq!(*value, expected_mono(l as i64, r as i64));
        }
        assert_eq!(mono[0], 32767.0);
        assert_eq!(mono[1], -32768.0);
        assert_eq!(mono[3], 1.0);
        assert_eq!(mono[4], -1.0);
    }

    #[test]
    fn test_width_4_does_not_overflow() {
        let frames = [
            (i32::MAX, i32::MAX),
            (i32::MIN, i32::MIN),
            (70_000, -70_001),
        ];
        let mut source = PcmBuffer::from_stereo_i32(48000, &frames);
        let mono = pass_0::downmix(&mut source, None).unwrap();

        assert_eq!(mono[0], i32::MAX as f64);
        assert_eq!(mono[1], i32::MIN as f64);
        assert_eq!(mono[2], -1.0);
    }

    #[test]
    fn test_payload_decoding_matches_width() {
        let mut source = PcmBuffer::from_stereo_i32(48000, &[(-5, 9)]);
        let frame = source.read_frame().unwrap();
        assert_eq!(decode_sample(&frame[..4], 4).unwrap(), -5);
        assert_eq!(decode_sample(&frame[4..], 4).unwrap(), 9);
    }

    #[test]
    fn test_unsupported_widths() {
        for width in [1usize, 3, 8] {
            let mut source = PcmBuffer::new(8000, width, vec![vec![0; 2 * width]]);
            assert!(
                matches!(
                    pass_0::downmix(&mut source, None),
                    Err(TranscribeError::UnsupportedFormat(_))
                ),
                "width {} should be rejected",
                width
            );
        }
    }

    #[test]
    fn test_pass_stores_signal_and_consumes_source() {
        let source = PcmBuffer::from_stereo_i16(8000, &[(10, 20); 5]);
        let mut state = TranscriptionState::from_source(Box::new(source));

        pass_0::run(&mut state, &Config::default()).unwrap();

        assert!(state.source.is_none());
        assert_eq!(state.signal.as_ref().unwrap(), &vec![15.0; 5]);
        assert_eq!(state.n_frames, 5);
    }

    #[test]
    fn test_channel_selector_from_config() {
        let source = PcmBuffer::from_stereo_i16(8000, &[(10, 20); 3]);
        let mut state = TranscriptionState::from_source(Box::new(source));
        let mut config = Config::default();
        config.audio.channel = Some(Channel::Left);

        pass_0::run(&mut state, &config).unwrap();

        assert_eq!(state.signal.unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_pass_without_source_fails() {
        let source = PcmBuffer::from_stereo_i16(8000, &[]);
        let mut state = TranscriptionState::from_source(Box::new(source));
        state.source = None;
        assert!(matches!(
            pass_0::run(&mut state, &Config::default()),
            Err(TranscribeError::Pipeline(_))
        ));
    }
}
