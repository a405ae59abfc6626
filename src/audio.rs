//! Waveform access and pipeline state

use crate::analysis::{FrameTiming, MappingMatrix, Score};
use crate::error::{Result, TranscribeError};
use crate::spectral::Spectrogram;
use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Sequential, frame-addressed view of a PCM waveform
pub trait WaveSource {
    /// Total number of sample frames
    fn n_frames(&self) -> usize;
    /// Bytes per sample per channel
    fn sample_width(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Raw payload of the next frame: left then right, `sample_width` little-endian bytes each
    fn read_frame(&mut self) -> Result<Vec<u8>>;
}

/// WAV file reader backed by hound
pub struct HoundWaveSource {
    reader: WavReader<BufReader<File>>,
    channels: u16,
    sample_width: usize,
    frames_read: usize,
}

impl HoundWaveSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int {
            return Err(TranscribeError::UnsupportedFormat(
                "only linear integer PCM is accepted".to_string(),
            ));
        }
        if spec.channels == 0 || spec.channels > 2 {
            return Err(TranscribeError::UnsupportedFormat(format!(
                "{} channels (expected mono or stereo)",
                spec.channels
            )));
        }

        let sample_width = (spec.bits_per_sample as usize).div_ceil(8);
        Ok(Self {
            reader,
            channels: spec.channels,
            sample_width,
            frames_read: 0,
        })
    }
}

impl WaveSource for HoundWaveSource {
    fn n_frames(&self) -> usize {
        self.reader.duration() as usize
    }

    fn sample_width(&self) -> usize {
        self.sample_width
    }

    fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let width = self.sample_width.min(4);
        let channels = self.channels;
        let frame_index = self.frames_read;
        let mut payload = Vec::with_capacity(2 * width);
        let mut samples = self.reader.samples::<i32>();

        for _ in 0..channels {
            let sample = samples.next().ok_or_else(|| {
                TranscribeError::AudioFile(format!(
                    "unexpected end of data at frame {}",
                    frame_index
                ))
            })??;
            payload.extend_from_slice(&sample.to_le_bytes()[..width]);
        }
        // Mono files present the same sample on both sides
        if channels == 1 {
            payload.extend_from_within(..width);
        }

        self.frames_read += 1;
        Ok(payload)
    }
}

/// In-memory waveform, mostly for synthetic input
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    sample_rate: u32,
    sample_width: usize,
    frames: Vec<Vec<u8>>,
    cursor: usize,
}

impl PcmBuffer {
    /// Wrap already-encoded frame payloads
    pub fn new(sample_rate: u32, sample_width: usize, frames: Vec<Vec<u8>>) -> Self {
        Self {
            sample_rate,
            sample_width,
            frames,
            cursor: 0,
        }
    }

    pub fn from_stereo_i16(sample_rate: u32, frames: &[(i16, i16)]) -> Self {
        let frames = frames
            .iter()
            .map(|&(l, r)| [l.to_le_bytes(), r.to_le_bytes()].concat())
            .collect();
        Self::new(sample_rate, 2, frames)
    }

    pub fn from_stereo_i32(sample_rate: u32, frames: &[(i32, i32)]) -> Self {
        let frames = frames
            .iter()
            .map(|&(l, r)| [l.to_le_bytes(), r.to_le_bytes()].concat())
            .collect();
        Self::new(sample_rate, 4, frames)
    }

    /// Frames handed out so far
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl WaveSource for PcmBuffer {
    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn sample_width(&self) -> usize {
        self.sample_width
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let frame = self.frames.get(self.cursor).cloned().ok_or_else(|| {
            TranscribeError::AudioFile(format!("no frame at index {}", self.cursor))
        })?;
        self.cursor += 1;
        Ok(frame)
    }
}

/// Decode one little-endian signed sample of the given width
pub fn decode_sample(bytes: &[u8], sample_width: usize) -> Result<i64> {
    match (sample_width, bytes) {
        (2, &[a, b]) => Ok(i16::from_le_bytes([a, b]) as i64),
        (4, &[a, b, c, d]) => Ok(i32::from_le_bytes([a, b, c, d]) as i64),
        (2 | 4, _) => Err(TranscribeError::AudioFile(format!(
            "sample payload of {} bytes does not match width {}",
            bytes.len(),
            sample_width
        ))),
        _ => Err(TranscribeError::UnsupportedFormat(format!(
            "sample width {} bytes (expected 2 or 4)",
            sample_width
        ))),
    }
}

/// Check that the input path names an existing regular file
pub fn validate_input_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TranscribeError::InvalidPath(format!(
            "file does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(TranscribeError::InvalidPath(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Pipeline state; each pass takes its predecessor's output and stores its own
pub struct TranscriptionState {
    pub sample_rate: u32,
    /// Frame count of the input waveform
    pub n_frames: usize,

    // Pass 0: Downmix
    pub source: Option<Box<dyn WaveSource>>,
    pub signal: Option<Vec<f64>>,

    // Pass 1: Spectrogram
    pub spectrogram: Option<Spectrogram>,
    pub spectrogram_frames: usize,
    pub frame_timing: Option<FrameTiming>,

    // Pass 2: Pitch mapping
    pub mapping: Option<MappingMatrix>,
    pub undefined_cells: usize,

    // Pass 3: Note scheduling
    pub score: Option<Score>,
    /// Cells loud enough to pass the floor but above the top velocity band
    pub overflow_cells: usize,
}

impl TranscriptionState {
    /// Open a WAV file and create the initial state
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        validate_input_path(&path)?;
        let source = HoundWaveSource::open(path)?;
        Ok(Self::from_source(Box::new(source)))
    }

    pub fn from_source(source: Box<dyn WaveSource>) -> Self {
        TranscriptionState {
            sample_rate: source.sample_rate(),
            n_frames: source.n_frames(),
            source: Some(source),
            signal: None,
            spectrogram: None,
            spectrogram_frames: 0,
            frame_timing: None,
            mapping: None,
            undefined_cells: 0,
            score: None,
            overflow_cells: 0,
        }
    }

    /// Duration of the input in seconds
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.n_frames as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sample_widths() {
        assert_eq!(decode_sample(&(-2i16).to_le_bytes(), 2).unwrap(), -2);
        assert_eq!(
            decode_sample(&i32::MIN.to_le_bytes(), 4).unwrap(),
            i32::MIN as i64
        );
        assert!(matches!(
            decode_sample(&[0, 0, 0], 3),
            Err(TranscribeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            decode_sample(&[0, 0, 0], 2),
            Err(TranscribeError::AudioFile(_))
        ));
    }

    #[test]
    fn test_pcm_buffer_reads_sequentially() {
        let mut buffer = PcmBuffer::from_stereo_i16(8000, &[(1, 2), (3, 4)]);
        assert_eq!(buffer.n_frames(), 2);
        assert_eq!(buffer.read_frame().unwrap(), vec![1, 0, 2, 0]);
        assert_eq!(buffer.position(), 1);
        assert_eq!(buffer.read_frame().unwrap(), vec![3, 0, 4, 0]);
        assert!(buffer.read_frame().is_err());
    }

    #[test]
    fn test_validate_input_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_input_path(dir.path().join("missing.wav")),
            Err(TranscribeError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_input_path(dir.path()),
            Err(TranscribeError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_hound_source_encodes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [100i16, -300, 7, 9] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = HoundWaveSource::open(&path).unwrap();
        assert_eq!(source.n_frames(), 2);
        assert_eq!(source.sample_width(), 2);
        assert_eq!(source.sample_rate(), 22050);
        let frame = source.read_frame().unwrap();
        assert_eq!(decode_sample(&frame[..2], 2).unwrap(), 100);
        assert_eq!(decode_sample(&frame[2..], 2).unwrap(), -300);
    }

    #[test]
    fn test_hound_source_duplicates_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(-70_000i32).unwrap();
        writer.finalize().unwrap();

        let mut source = HoundWaveSource::open(&path).unwrap();
        let frame = source.read_frame().unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(decode_sample(&frame[..4], 4).unwrap(), -70_000);
        assert_eq!(decode_sample(&frame[4..], 4).unwrap(), -70_000);
    }

    #[test]
    fn test_hound_source_rejects_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            HoundWaveSource::open(&path),
            Err(TranscribeError::UnsupportedFormat(_))
        ));
    }
}
