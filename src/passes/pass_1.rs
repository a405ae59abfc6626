//! Pass 1: Spectrogram

use crate::analysis::FrameTiming;
use crate::audio::TranscriptionState;
use crate::config::Config;
use crate::error::{Result, TranscribeError};
use crate::spectral::{SpectralAnalyzer, Spectrogram, SpectrogramRequest, StftAnalyzer};

/// Window overlap giving one analysis frame per `resolution_ms`
pub fn overlap_for(sample_rate: u32, window_length: usize, resolution_ms: f64) -> f64 {
    window_length as f64 - (sample_rate as f64 / 960.0 * resolution_ms)
}

/// Audio time step between frames, after rounding the hop to whole samples
pub fn frame_timing(
    sample_rate: u32,
    window_length: usize,
    resolution_ms: f64,
) -> Result<FrameTiming> {
    let request = SpectrogramRequest {
        signal: &[],
        window_length,
        sample_rate,
        overlap: overlap_for(sample_rate, window_length, resolution_ms),
    };
    Ok(FrameTiming {
        hop_length: request.hop_length()?,
        sample_rate,
    })
}

/// Run the spectral primitive over a mono signal.
///
/// `Ok(None)` means the primitive could not reserve its working memory;
/// callers must stop rather than continue without a spectrogram.
pub fn compute_spectrogram(
    analyzer: &dyn SpectralAnalyzer,
    signal: &[f64],
    sample_rate: u32,
    window_length: usize,
    resolution_ms: f64,
) -> Result<Option<Spectrogram>> {
    let request = SpectrogramRequest {
        signal,
        window_length,
        sample_rate,
        overlap: overlap_for(sample_rate, window_length, resolution_ms),
    };
    log::debug!(
        "  window={} overlap={:.3} hop={:?}",
        request.window_length,
        request.overlap,
        request.hop_length().ok()
    );
    analyzer.analyze(&request)
}

pub fn run(state: &mut TranscriptionState, config: &Config) -> Result<()> {
    run_with(state, config, &StftAnalyzer)
}

/// Pass 1 with a caller-chosen spectral backend
pub fn run_with(
    state: &mut TranscriptionState,
    config: &Config,
    analyzer: &dyn SpectralAnalyzer,
) -> Result<()> {
    log::info!("Pass 1: Spectrogram");

    let signal = state.signal.take().ok_or_else(|| {
        TranscribeError::Pipeline("Pass 0 must be run before Pass 1".to_string())
    })?;

    let timing = frame_timing(
        state.sample_rate,
        config.stft.n_fft,
        config.stft.note_resolution_ms,
    )?;

    let spectrogram = compute_spectrogram(
        analyzer,
        &signal,
        state.sample_rate,
        config.stft.n_fft,
        config.stft.note_resolution_ms,
    )?
    .ok_or_else(|| {
        TranscribeError::SpectralAllocation(format!(
            "could not reserve a spectrogram for {} samples with a {}-sample window",
            signal.len(),
            config.stft.n_fft
        ))
    })?;

    log::info!(
        "  {} bins x {} frames",
        spectrogram.n_bins(),
        spectrogram.n_frames()
    );

    state.spectrogram_frames = spectrogram.n_frames();
    state.frame_timing = Some(timing);
    state.spectrogram = Some(spectrogram);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmBuffer;

    struct ExhaustedAnalyzer;

    impl SpectralAnalyzer for ExhaustedAnalyzer {
        fn analyze(&self, _request: &SpectrogramRequest<'_>) -> Result<Option<Spectrogram>> {
            Ok(None)
        }
    }

    #[test]
    fn test_overlap_formula() {
        // 48 kHz at 5 ms: 250-sample hop
        assert_eq!(overlap_for(48000, 2400, 5.0), 2150.0);
        assert_eq!(overlap_for(9600, 100, 1.0), 90.0);
    }

    #[test]
    fn test_frame_timing_uses_rounded_hop() {
        let timing = frame_timing(48000, 2400, 5.0).unwrap();
        assert_eq!(timing.hop_length, 250);
        assert_eq!(frame_timing(44100, 2400, 5.0).unwrap().hop_length, 230);
        assert!(matches!(
            frame_timing(48000, 2400, 100.0),
            Err(TranscribeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_oversized_hop_stops_before_analysis() {
        let source = PcmBuffer::from_stereo_i16(48000, &[(0, 0); 16]);
        let mut state = TranscriptionState::from_source(Box::new(source));
        state.signal = Some(vec![0.0; 16]);
        let mut config = Config::default();
        config.stft.note_resolution_ms = 100.0;

        let err = run_with(&mut state, &config, &ExhaustedAnalyzer).unwrap_err();
        assert!(matches!(err, TranscribeError::ConfigValidation(_)));
        assert!(state.frame_timing.is_none());
    }

    #[test]
    fn test_no_result_stops_pipeline() {
        let source = PcmBuffer::from_stereo_i16(48000, &[(0, 0); 16]);
        let mut state = TranscriptionState::from_source(Box::new(source));
        state.signal = Some(vec![0.0; 16]);

        let err = run_with(&mut state, &Config::default(), &ExhaustedAnalyzer).unwrap_err();
        assert!(matches!(err, TranscribeError::SpectralAllocation(_)));
        assert!(state.spectrogram.is_none());
    }

    #[test]
    fn test_requires_signal() {
        let source = PcmBuffer::from_stereo_i16(48000, &[]);
        let mut state = TranscriptionState::from_source(Box::new(source));
        assert!(matches!(
            run(&mut state, &Config::default()),
            Err(TranscribeError::Pipeline(_))
        ));
    }
}
