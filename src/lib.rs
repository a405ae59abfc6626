//! Waveform-to-MIDI Transcription
//!
//! Converts a stereo PCM recording into eight velocity-banded MIDI lanes by
//! downmixing, taking a spectrogram, resampling it onto the 128 MIDI pitches
//! and quantizing every audible cell into a note on its loudness lane.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod passes;
pub mod qa;
pub mod spectral;

pub use audio::{TranscriptionState, WaveSource};
pub use config::Config;
pub use error::{Result, TranscribeError};

use std::path::{Path, PathBuf};

/// Main processing pipeline for waveform-to-MIDI conversion
pub struct WavToMidi {
    config: Config,
}

impl WavToMidi {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transcribe a WAV file and write the MIDI file (plus optional artifacts)
    /// into `output_dir`. Returns the MIDI path.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> Result<PathBuf> {
        let mut state = TranscriptionState::load(input_path)?;

        self.run_pipeline(&mut state)?;

        self.export_results(&state, output_dir.as_ref())
    }

    /// Transcribe an already-open source straight to MIDI file bytes
    pub fn transcribe(&self, source: Box<dyn WaveSource>) -> Result<Vec<u8>> {
        let mut state = TranscriptionState::from_source(source);
        self.run_pipeline(&mut state)?;
        let score = state
            .score
            .as_ref()
            .ok_or_else(|| TranscribeError::Pipeline("scheduler produced no score".to_string()))?;
        midi::encode_score(score, &self.config)
    }

    /// Execute the complete pass pipeline
    pub fn run_pipeline(&self, state: &mut TranscriptionState) -> Result<()> {
        config::validate_config(&self.config)?;

        // Pass 0: Stereo Downmix
        passes::pass_0::run(state, &self.config)?;

        // Pass 1: Spectrogram
        passes::pass_1::run(state, &self.config)?;

        // Pass 2: Pitch Mapping
        passes::pass_2::run(state, &self.config)?;

        // Pass 3: Note Event Scheduling
        passes::pass_3::run(state, &self.config)?;

        Ok(())
    }

    /// Export MIDI and optional report artifacts
    fn export_results(&self, state: &TranscriptionState, output_dir: &Path) -> Result<PathBuf> {
        let score = state
            .score
            .as_ref()
            .ok_or_else(|| TranscribeError::Pipeline("scheduler produced no score".to_string()))?;

        let midi_path = midi::export_midi(score, output_dir, &self.config)?;
        if self.config.export.write_report {
            analysis::export_report(state, output_dir)?;
        }
        if self.config.export.write_piano_roll {
            qa::generate_piano_roll(score, output_dir)?;
        }
        Ok(midi_path)
    }
}

/// Validate configuration and input file before running
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> Result<()> {
    // Check input file exists and is a regular file
    audio::validate_input_path(input_path)?;

    // Validate configuration
    config::validate_config(config)?;

    Ok(())
}
