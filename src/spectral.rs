//! Spectral analysis primitive (windowed STFT power spectrogram)

use crate::error::{Result, TranscribeError};
use ndarray::Array2;
use rustfft::{num_complex::Complex64, FftPlanner};

/// Magnitude matrix indexed `[frequency_bin, time_frame]` plus its axes
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub magnitudes: Array2<f64>,
    /// Hertz per bin
    pub freqs: Vec<f64>,
    /// Seconds at the centre of each frame
    pub times: Vec<f64>,
}

impl Spectrogram {
    pub fn n_bins(&self) -> usize {
        self.magnitudes.nrows()
    }

    pub fn n_frames(&self) -> usize {
        self.magnitudes.ncols()
    }
}

/// Inputs to one spectral analysis call
#[derive(Debug, Clone, Copy)]
pub struct SpectrogramRequest<'a> {
    pub signal: &'a [f64],
    pub window_length: usize,
    pub sample_rate: u32,
    /// Samples shared by consecutive windows; may be fractional
    pub overlap: f64,
}

impl SpectrogramRequest<'_> {
    /// Distance between window starts in whole samples.
    ///
    /// The hop must fit in the window, otherwise samples between windows
    /// would never be analysed.
    pub fn hop_length(&self) -> Result<usize> {
        let hop = (self.window_length as f64 - self.overlap).round();
        if !(hop >= 1.0) {
            return Err(TranscribeError::ConfigValidation(format!(
                "overlap {:.3} leaves no hop inside a {}-sample window",
                self.overlap, self.window_length
            )));
        }
        if hop > self.window_length as f64 {
            return Err(TranscribeError::ConfigValidation(format!(
                "hop of {} samples does not fit in a {}-sample window",
                hop, self.window_length
            )));
        }
        Ok(hop as usize)
    }
}

/// Time/frequency analysis backend
pub trait SpectralAnalyzer {
    /// Returns `Ok(None)` when working memory cannot be reserved
    fn analyze(&self, request: &SpectrogramRequest<'_>) -> Result<Option<Spectrogram>>;
}

/// Hann-windowed one-sided power spectral density, one column per window
#[derive(Debug, Clone, Copy, Default)]
pub struct StftAnalyzer;

impl SpectralAnalyzer for StftAnalyzer {
    fn analyze(&self, request: &SpectrogramRequest<'_>) -> Result<Option<Spectrogram>> {
        let n_fft = request.window_length;
        if n_fft == 0 || request.sample_rate == 0 {
            return Err(TranscribeError::ConfigValidation(
                "window length and sample rate must be > 0".to_string(),
            ));
        }
        let hop_length = request.hop_length()?;
        let y = request.signal;

        // Short input is zero-padded to a single window
        let n_frames = if y.len() <= n_fft {
            1
        } else {
            (y.len() - n_fft) / hop_length + 1
        };
        let n_bins = n_fft / 2 + 1;

        let Some(cells) = n_bins.checked_mul(n_frames) else {
            return Ok(None);
        };
        let mut data: Vec<f64> = Vec::new();
        if data.try_reserve_exact(cells).is_err() {
            return Ok(None);
        }
        data.resize(cells, 0.0);

        let window_fn = hann_window(n_fft);
        let window_power: f64 = window_fn.iter().map(|w| w * w).sum();
        let scale = 1.0 / (request.sample_rate as f64 * window_power);

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut frame = vec![Complex64::new(0.0, 0.0); n_fft];

        for frame_idx in 0..n_frames {
            let start = frame_idx * hop_length;

            for (i, slot) in frame.iter_mut().enumerate() {
                let sample = y.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex64::new(sample * window_fn[i], 0.0);
            }

            fft.process(&mut frame);

            for (bin, value) in frame[..n_bins].iter().enumerate() {
                let mut power = value.norm_sqr() * scale;
                // Fold negative frequencies into the one-sided spectrum
                let is_nyquist = n_fft % 2 == 0 && bin == n_fft / 2;
                if bin != 0 && !is_nyquist {
                    power *= 2.0;
                }
                data[bin * n_frames + frame_idx] = power;
            }
        }

        let magnitudes = Array2::from_shape_vec((n_bins, n_frames), data)
            .map_err(|e| TranscribeError::Pipeline(format!("spectrogram shape: {}", e)))?;

        let freqs = (0..n_bins)
            .map(|i| i as f64 * request.sample_rate as f64 / n_fft as f64)
            .collect();
        let sr = request.sample_rate as f64;
        let times = (0..n_frames)
            .map(|i| ((i * hop_length) as f64 + n_fft as f64 / 2.0) / sr)
            .collect();

        Ok(Some(Spectrogram {
            magnitudes,
            freqs,
            times,
        }))
    }
}

/// Symmetric Hann window
fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos()))
        .collect()
}
