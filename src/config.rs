//! Configuration system for the transcriber

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub stft: StftConfig,
    pub mapping: MappingConfig,
    pub scheduler: SchedulerConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            stft: StftConfig::default(),
            mapping: MappingConfig::default(),
            scheduler: SchedulerConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Stereo channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
}

/// Waveform decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AudioConfig {
    /// When set, frames are not summed and the mono slot stays at zero
    pub channel: Option<Channel>,
}

/// STFT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    /// FFT window length in samples
    pub n_fft: usize,
    /// Target note timing resolution in milliseconds (`NT`)
    pub note_resolution_ms: f64,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            n_fft: 2400,
            note_resolution_ms: 5.0,
        }
    }
}

/// Pitch mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Loudness-limiting divisor applied after fourth-root compression
    pub limvel: f64,
    /// Reference frequency of pitch 69 (A4)
    pub tuning_hz: f64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            limvel: 1.0,
            tuning_hz: 440.0,
        }
    }
}

/// Note scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Audibility floor; mapped values at or below it emit nothing
    pub lim: f64,
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Divisor turning compressed loudness into MIDI velocity
    pub velocity_ratio: f64,
    pub ticks_per_beat: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lim: 8.0,
            bpm: 500.0,
            velocity_ratio: 2.0,
            ticks_per_beat: 480,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Standard MIDI file type tag (1 = parallel, 2 = sequential)
    pub midi_type: u16,
    pub midi_filename: String,
    pub write_report: bool,
    pub write_piano_roll: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            midi_type: 1,
            midi_filename: "transcription.mid".to_string(),
            write_report: true,
            write_piano_roll: false,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.stft.n_fft == 0 {
        anyhow::bail!("stft.n_fft must be > 0");
    }
    if !(config.stft.note_resolution_ms > 0.0) {
        anyhow::bail!("stft.note_resolution_ms must be > 0");
    }
    if !(config.mapping.limvel > 0.0) {
        anyhow::bail!("mapping.limvel must be > 0");
    }
    if !(config.mapping.tuning_hz > 0.0) {
        anyhow::bail!("mapping.tuning_hz must be > 0");
    }
    if !config.scheduler.lim.is_finite() {
        anyhow::bail!("scheduler.lim must be finite");
    }
    if !(config.scheduler.bpm > 0.0) {
        anyhow::bail!("scheduler.bpm must be > 0");
    }
    if !(config.scheduler.velocity_ratio > 0.0) {
        anyhow::bail!("scheduler.velocity_ratio must be > 0");
    }
    // Metrical timing stores ticks per beat in 15 bits
    if config.scheduler.ticks_per_beat == 0 || config.scheduler.ticks_per_beat > 0x7FFF {
        anyhow::bail!("scheduler.ticks_per_beat must be in 1..=32767");
    }
    // Eight lane tracks cannot live in a single-track file
    if !matches!(config.export.midi_type, 1 | 2) {
        anyhow::bail!(
            "export.midi_type must be 1 or 2, got {}",
            config.export.midi_type
        );
    }
    if config.export.midi_filename.trim().is_empty() {
        anyhow::bail!("export.midi_filename must not be empty");
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
