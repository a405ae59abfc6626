//! Intermediate representations shared by the passes, and the run report

use crate::audio::TranscriptionState;
use crate::error::{Result, TranscribeError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of chromatic pitches on the mapping grid
pub const PITCH_COUNT: usize = 128;
/// Number of velocity lanes (one MIDI track each)
pub const LANE_COUNT: usize = 8;

/// Spectrogram resampled onto the pitch grid, indexed `[time_frame, pitch]`.
/// `None` marks a cell whose pitch fell outside the analysed frequency range
/// or whose magnitude could not be compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingMatrix {
    pub cells: Array2<Option<f64>>,
}

impl MappingMatrix {
    pub fn new(cells: Array2<Option<f64>>) -> Self {
        Self { cells }
    }

    /// Build from per-frame rows; all rows must share one length
    pub fn from_rows(rows: Vec<Vec<Option<f64>>>) -> Result<Self> {
        let n_frames = rows.len();
        let width = rows.first().map_or(PITCH_COUNT, Vec::len);

        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TranscribeError::MalformedInput(format!(
                "row {} has {} columns, expected {}",
                idx,
                row.len(),
                width
            )));
        }

        let flat: Vec<Option<f64>> = rows.into_iter().flatten().collect();
        let cells = Array2::from_shape_vec((n_frames, width), flat)
            .map_err(|e| TranscribeError::MalformedInput(e.to_string()))?;
        Ok(Self { cells })
    }

    /// A matrix of `n_frames` silent columns
    pub fn silent(n_frames: usize) -> Self {
        Self {
            cells: Array2::from_elem((n_frames, PITCH_COUNT), None),
        }
    }

    pub fn n_frames(&self) -> usize {
        self.cells.nrows()
    }

    pub fn n_pitches(&self) -> usize {
        self.cells.ncols()
    }

    pub fn undefined_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }
}

/// One message on a lane track; `delta` is in ticks since the previous message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneMessage {
    NoteOn { key: u8, velocity: u8, delta: u32 },
    NoteOff { key: u8, velocity: u8, delta: u32 },
    EndOfTrack { delta: u32 },
}

impl LaneMessage {
    pub fn delta(&self) -> u32 {
        match *self {
            LaneMessage::NoteOn { delta, .. }
            | LaneMessage::NoteOff { delta, .. }
            | LaneMessage::EndOfTrack { delta } => delta,
        }
    }
}

/// Ordered messages of one velocity lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneTrack {
    pub lane: usize,
    pub messages: Vec<LaneMessage>,
}

impl LaneTrack {
    pub fn new(lane: usize) -> Self {
        Self {
            lane,
            messages: Vec::new(),
        }
    }

    pub fn note_on_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, LaneMessage::NoteOn { .. }))
            .count()
    }

    pub fn note_off_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, LaneMessage::NoteOff { .. }))
            .count()
    }

    pub fn end_of_track_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, LaneMessage::EndOfTrack { .. }))
            .count()
    }

    /// Sum of all deltas, i.e. the tick of the last message
    pub fn total_ticks(&self) -> u64 {
        self.messages.iter().map(|m| m.delta() as u64).sum()
    }

    /// Note-ons as `(absolute_tick, key, velocity)`
    pub fn note_ons(&self) -> Vec<(u64, u8, u8)> {
        let mut tick = 0u64;
        let mut notes = Vec::new();
        for message in &self.messages {
            tick += message.delta() as u64;
            if let LaneMessage::NoteOn { key, velocity, .. } = *message {
                notes.push((tick, key, velocity));
            }
        }
        notes
    }

    /// Note-ons placed by the scheduler; the lane's closing flush note is left out
    pub fn played_notes(&self) -> Vec<(u64, u8, u8)> {
        let mut notes = self.note_ons();
        notes.pop();
        notes
    }
}

/// Audio time covered by one spectrogram frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTiming {
    /// Samples between consecutive window starts
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl FrameTiming {
    pub fn seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.hop_length as f64 / self.sample_rate as f64
    }
}

/// Scheduler output: one track per velocity lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub tick_per_frame: u32,
    /// Frame duration in the source audio, when known
    pub frame_timing: Option<FrameTiming>,
    pub tracks: Vec<LaneTrack>,
}

impl Score {
    /// Notes placed by the scheduler, excluding each lane's trailing flush pair
    pub fn note_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.note_on_count().saturating_sub(1))
            .sum()
    }
}

/// Summary written next to the MIDI file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionReport {
    pub sample_rate: u32,
    pub n_frames: usize,
    pub duration_sec: f64,
    pub spectrogram_frames: usize,
    pub undefined_cells: usize,
    pub overflow_cells: usize,
    pub tick_per_frame: u32,
    pub total_notes: usize,
    pub lanes: Vec<LaneSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSummary {
    pub lane: usize,
    /// Compressed-loudness band covered by the lane
    pub band: [f64; 2],
    pub notes: usize,
    pub total_ticks: u64,
}

/// Build the run summary from a completed state
pub fn build_report(state: &TranscriptionState) -> Result<TranscriptionReport> {
    let score = state.score.as_ref().ok_or_else(|| {
        TranscribeError::Pipeline("no score to report on; run the scheduler first".to_string())
    })?;

    let lanes = score
        .tracks
        .iter()
        .map(|track| LaneSummary {
            lane: track.lane,
            band: [track.lane as f64 * 32.0, (track.lane + 1) as f64 * 32.0],
            notes: track.note_on_count().saturating_sub(1),
            total_ticks: track.total_ticks(),
        })
        .collect();

    Ok(TranscriptionReport {
        sample_rate: state.sample_rate,
        n_frames: state.n_frames,
        duration_sec: state.duration_sec(),
        spectrogram_frames: state.spectrogram_frames,
        undefined_cells: state.undefined_cells,
        overflow_cells: state.overflow_cells,
        tick_per_frame: score.tick_per_frame,
        total_notes: score.note_count(),
        lanes,
    })
}

/// Export the run summary to JSON
pub fn export_report(
    state: &TranscriptionState,
    output_dir: &std::path::Path,
) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let report_path = output_dir.join("report.json");

    let report = build_report(state)?;
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&report_path, json)
        .map_err(|e| TranscribeError::ReportExport(e.to_string()))?;

    log::info!("Exported transcription report to {}", report_path.display());
    Ok(report_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let rows = vec![vec![None; PITCH_COUNT], vec![None; PITCH_COUNT - 1]];
        assert!(matches!(
            MappingMatrix::from_rows(rows),
            Err(TranscribeError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_from_rows_keeps_layout() {
        let mut rows = vec![vec![None; PITCH_COUNT]; 3];
        rows[2][60] = Some(12.5);
        let mapping = MappingMatrix::from_rows(rows).unwrap();
        assert_eq!(mapping.n_frames(), 3);
        assert_eq!(mapping.n_pitches(), PITCH_COUNT);
        assert_eq!(mapping.cells[[2, 60]], Some(12.5));
        assert_eq!(mapping.undefined_count(), 3 * PITCH_COUNT - 1);
    }

    #[test]
    fn test_lane_track_accounting() {
        let mut track = LaneTrack::new(2);
        track.messages = vec![
            LaneMessage::NoteOn { key: 60, velocity: 40, delta: 20 },
            LaneMessage::NoteOn { key: 64, velocity: 41, delta: 0 },
            LaneMessage::NoteOff { key: 60, velocity: 40, delta: 20 },
            LaneMessage::NoteOff { key: 64, velocity: 41, delta: 0 },
            LaneMessage::EndOfTrack { delta: 0 },
        ];
        assert_eq!(track.note_on_count(), 2);
        assert_eq!(track.note_off_count(), 2);
        assert_eq!(track.end_of_track_count(), 1);
        assert_eq!(track.total_ticks(), 40);
        assert_eq!(track.note_ons(), vec![(20, 60, 40), (20, 64, 41)]);
    }

    #[test]
    fn test_played_notes_keep_real_pitch_zero() {
        let mut track = LaneTrack::new(0);
        track.messages = vec![
            LaneMessage::NoteOn { key: 0, velocity: 9, delta: 0 },
            LaneMessage::NoteOff { key: 0, velocity: 9, delta: 20 },
            LaneMessage::NoteOn { key: 0, velocity: 1, delta: 0 },
            LaneMessage::NoteOff { key: 0, velocity: 1, delta: 0 },
            LaneMessage::EndOfTrack { delta: 0 },
        ];
        assert_eq!(track.played_notes(), vec![(0, 0, 9)]);
        assert!(LaneTrack::new(3).played_notes().is_empty());
    }

    #[test]
    fn test_frame_timing_seconds() {
        let timing = FrameTiming {
            hop_length: 250,
            sample_rate: 48000,
        };
        assert!((timing.seconds() - 250.0 / 48000.0).abs() < 1e-15);
    }
}
