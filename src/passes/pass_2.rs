//! Pass 2: Pitch Mapping

use crate::analysis::{MappingMatrix, PITCH_COUNT};
use crate::audio::TranscriptionState;
use crate::config::Config;
use crate::error::{Result, TranscribeError};
use crate::spectral::Spectrogram;
use ndarray::Array2;

/// Reference frequency in hertz of every MIDI pitch
#[derive(Debug, Clone)]
pub struct PitchTable {
    freqs: [f64; PITCH_COUNT],
}

impl PitchTable {
    /// Twelve-tone equal temperament with pitch 69 at `tuning_hz`
    pub fn equal_tempered(tuning_hz: f64) -> Self {
        let mut freqs = [0.0; PITCH_COUNT];
        for (pitch, freq) in freqs.iter_mut().enumerate() {
            *freq = tuning_hz * 2f64.powf((pitch as f64 - 69.0) / 12.0);
        }
        Self { freqs }
    }

    pub fn frequency(&self, pitch: usize) -> f64 {
        self.freqs[pitch]
    }

    pub fn frequencies(&self) -> &[f64; PITCH_COUNT] {
        &self.freqs
    }
}

impl Default for PitchTable {
    fn default() -> Self {
        Self::equal_tempered(440.0)
    }
}

/// Linear interpolation at a fractional index.
///
/// Returns `None` when `floor(position) + 1` is past the last index
/// (or the position is negative or not a number).
pub fn interpolate(seq: &[f64], position: f64) -> Option<f64> {
    if !(position >= 0.0) {
        return None;
    }
    let floor = position.floor();
    let i = floor as usize;
    let lower = *seq.get(i)?;
    let upper = *seq.get(i.checked_add(1)?)?;
    Some(lower * (floor + 1.0 - position) + upper * (position - floor))
}

/// Fourth-root loudness compression; negative or NaN magnitudes carry no signal
pub fn compress(magnitude: f64, limvel: f64) -> Option<f64> {
    if !(magnitude >= 0.0) {
        return None;
    }
    Some(magnitude.sqrt().sqrt() * 4.0 / limvel)
}

/// Fractional spectrogram bin of a frequency
pub fn bin_position(freq_hz: f64, sample_rate: u32, window_length: usize) -> f64 {
    freq_hz / sample_rate as f64 * window_length as f64
}

/// Resample every spectrogram frame onto the 128-pitch grid
pub fn map_pitches(
    spectrogram: &Spectrogram,
    sample_rate: u32,
    window_length: usize,
    limvel: f64,
    table: &PitchTable,
) -> MappingMatrix {
    let n_frames = spectrogram.n_frames();
    let positions: Vec<f64> = table
        .frequencies()
        .iter()
        .map(|&f| bin_position(f, sample_rate, window_length))
        .collect();

    let mut cells = Array2::from_elem((n_frames, PITCH_COUNT), None);
    for (t, column) in spectrogram.magnitudes.columns().into_iter().enumerate() {
        let column = column.to_vec();
        for (p, &position) in positions.iter().enumerate() {
            cells[[t, p]] = interpolate(&column, position).and_then(|m| compress(m, limvel));
        }
    }

    MappingMatrix::new(cells)
}

pub fn run(state: &mut TranscriptionState, config: &Config) -> Result<()> {
    log::info!("Pass 2: Pitch Mapping");

    let spectrogram = state.spectrogram.take().ok_or_else(|| {
        TranscribeError::Pipeline("Pass 1 must be run before Pass 2".to_string())
    })?;

    let table = PitchTable::equal_tempered(config.mapping.tuning_hz);
    let mapping = map_pitches(
        &spectrogram,
        state.sample_rate,
        config.stft.n_fft,
        config.mapping.limvel,
        &table,
    );

    state.undefined_cells = mapping.undefined_count();
    log::info!(
        "  {} frames mapped, {} cells outside the analysed range",
        mapping.n_frames(),
        state.undefined_cells
    );

    state.mapping = Some(mapping);
    Ok(())
}
