//! Pass 3: Note Event Scheduling
//!
//! Walks the mapping matrix one time frame (column) at a time and turns every
//! audible cell into a note on the lane of its loudness band. Notes start at
//! the column they were heard in and are released one column later; notes that
//! share a lane and a column form a chord with zero delta between them.

use crate::analysis::{LaneMessage, LaneTrack, MappingMatrix, Score, LANE_COUNT, PITCH_COUNT};
use crate::audio::TranscriptionState;
use crate::config::Config;
use crate::error::{Result, TranscribeError};

/// Width of one velocity band on the compressed loudness scale
pub const LANE_WIDTH: f64 = 32.0;
/// Key of the silent note pair that closes every lane
pub const FLUSH_PITCH: u8 = 0;
const FLUSH_VELOCITY: u8 = 1;
const MAX_VELOCITY: f64 = 127.0;

/// Numeric inputs of the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerParams {
    /// Audibility floor; values at or below it are skipped
    pub lim: f64,
    pub velocity_ratio: f64,
    pub tick_per_frame: u32,
}

impl SchedulerParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lim: config.scheduler.lim,
            velocity_ratio: config.scheduler.velocity_ratio,
            tick_per_frame: tick_per_frame(
                config.stft.note_resolution_ms,
                config.scheduler.bpm,
                config.scheduler.ticks_per_beat,
            ),
        }
    }
}

/// Ticks elapsing in 500 ms (one beat of the MIDI default tempo) at `bpm`
pub fn tempo_in_ticks(bpm: f64, ticks_per_beat: u16) -> f64 {
    ticks_per_beat as f64 * bpm / 120.0
}

/// Ticks covered by one spectrogram frame of `resolution_ms`
pub fn tick_per_frame(resolution_ms: f64, bpm: f64, ticks_per_beat: u16) -> u32 {
    (resolution_ms * (tempo_in_ticks(bpm, ticks_per_beat) / 500.0)).round() as u32
}

/// Lane of a compressed loudness value: `(0, 32]` is lane 0 up to `(224, 256]`
/// for lane 7. Anything outside `(0, 256]` has no lane.
pub fn lane_for(vol: f64) -> Option<usize> {
    if !(vol > 0.0) {
        return None;
    }
    let lane = (vol / LANE_WIDTH).ceil() as usize - 1;
    (lane < LANE_COUNT).then_some(lane)
}

/// MIDI velocity of a compressed loudness value
pub fn velocity_for(vol: f64, ratio: f64) -> u8 {
    (vol / ratio).round().clamp(1.0, MAX_VELOCITY) as u8
}

/// Per-lane timing state, reset at the end of each column
#[derive(Debug, Clone, Copy)]
struct LaneClock {
    /// Ticks since the lane's last message, plus one frame
    tc: u32,
    first_row: bool,
}

/// Reject mappings the scheduler cannot walk
pub fn validate_mapping(mapping: &MappingMatrix) -> Result<()> {
    if mapping.n_pitches() != PITCH_COUNT {
        return Err(TranscribeError::MalformedInput(format!(
            "mapping rows have {} pitches, expected {}",
            mapping.n_pitches(),
            PITCH_COUNT
        )));
    }
    if let Some(((frame, pitch), _)) = mapping
        .cells
        .indexed_iter()
        .find(|(_, cell)| cell.is_some_and(|v| !v.is_finite()))
    {
        return Err(TranscribeError::MalformedInput(format!(
            "non-finite value at frame {}, pitch {}",
            frame, pitch
        )));
    }
    Ok(())
}

/// Turn a mapping matrix into eight lane tracks.
///
/// Returns the score and the number of cells skipped for being louder than
/// the top band.
pub fn schedule(mapping: &MappingMatrix, params: &SchedulerParams) -> Result<(Score, usize)> {
    validate_mapping(mapping)?;

    let tpf = params.tick_per_frame;
    // One frame of credit so the first column's note-on lands at tick 0
    let mut clocks = [LaneClock {
        tc: tpf,
        first_row: true,
    }; LANE_COUNT];
    let mut tracks: Vec<LaneTrack> = (0..LANE_COUNT).map(LaneTrack::new).collect();
    let mut pending_offs: Vec<Vec<LaneMessage>> = vec![Vec::new(); LANE_COUNT];
    let mut overflow = 0usize;

    for column in mapping.cells.rows() {
        for (pitch, cell) in column.iter().enumerate() {
            let Some(vol) = *cell else { continue };
            if vol <= params.lim {
                continue;
            }
            let Some(lane) = lane_for(vol) else {
                overflow += 1;
                continue;
            };

            let key = pitch as u8;
            let velocity = velocity_for(vol, params.velocity_ratio);
            let clock = &mut clocks[lane];

            let (on_delta, off_delta) = if clock.first_row {
                let on_delta = clock.tc.saturating_sub(tpf);
                clock.tc = 0;
                clock.first_row = false;
                (on_delta, tpf)
            } else {
                (0, 0)
            };

            tracks[lane].messages.push(LaneMessage::NoteOn {
                key,
                velocity,
                delta: on_delta,
            });
            pending_offs[lane].push(LaneMessage::NoteOff {
                key,
                velocity,
                delta: off_delta,
            });
        }

        for ((track, offs), clock) in tracks
            .iter_mut()
            .zip(pending_offs.iter_mut())
            .zip(clocks.iter_mut())
        {
            track.messages.append(offs);
            clock.tc = clock.tc.saturating_add(tpf);
            clock.first_row = true;
        }
    }

    // Close every lane at the end of the last column
    for (track, clock) in tracks.iter_mut().zip(clocks.iter()) {
        track.messages.push(LaneMessage::NoteOn {
            key: FLUSH_PITCH,
            velocity: FLUSH_VELOCITY,
            delta: clock.tc.saturating_sub(tpf),
        });
        track.messages.push(LaneMessage::NoteOff {
            key: FLUSH_PITCH,
            velocity: FLUSH_VELOCITY,
            delta: 0,
        });
        track.messages.push(LaneMessage::EndOfTrack { delta: 0 });
    }

    Ok((
        Score {
            tick_per_frame: tpf,
            frame_timing: None,
            tracks,
        },
        overflow,
    ))
}

pub fn run(state: &mut TranscriptionState, config: &Config) -> Result<()> {
    log::info!("Pass 3: Note Event Scheduling");

    let mapping = state.mapping.take().ok_or_else(|| {
        TranscribeError::Pipeline("Pass 2 must be run before Pass 3".to_string())
    })?;

    let params = SchedulerParams::from_config(config);
    if params.tick_per_frame == 0 {
        log::warn!("  Frame resolution rounds to 0 ticks; all notes collapse onto tick 0");
    }
    log::debug!("  {:?}", params);

    let (mut score, overflow) = schedule(&mapping, &params)?;
    score.frame_timing = state.frame_timing;
    if overflow > 0 {
        log::warn!(
            "  {} cells above the top velocity band were dropped",
            overflow
        );
    }
    for track in &score.tracks {
        log::debug!(
            "  lane {}: {} notes",
            track.lane,
            track.note_on_count().saturating_sub(1)
        );
    }
    log::info!(
        "  {} notes over {} frames ({} ticks per frame)",
        score.note_count(),
        mapping.n_frames(),
        score.tick_per_frame
    );

    state.overflow_cells = overflow;
    state.score = Some(score);
    Ok(())
}
