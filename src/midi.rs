//! MIDI export functionality

use crate::analysis::{LaneMessage, Score};
use crate::config::Config;
use crate::error::{Result, TranscribeError};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::{Path, PathBuf};

const MAX_DELTA: u32 = 0x0FFF_FFFF;
const MAX_TEMPO: u32 = 0x00FF_FFFF;

/// Map the numeric file type tag onto a midly format
pub fn format_for(midi_type: u16) -> Result<Format> {
    match midi_type {
        1 => Ok(Format::Parallel),
        2 => Ok(Format::Sequential),
        other => Err(TranscribeError::MidiExport(format!(
            "file type {} cannot hold one track per lane",
            other
        ))),
    }
}

/// Microseconds per quarter note at `bpm`
pub fn tempo_micros(bpm: f64) -> u32 {
    ((60_000_000.0 / bpm).round() as u32).clamp(1, MAX_TEMPO)
}

/// Tempo that plays `tick_per_frame` ticks in exactly one audio frame.
///
/// Falls back to the nominal `bpm` when the frame duration is unknown or a
/// frame spans no ticks.
pub fn score_tempo_micros(score: &Score, ticks_per_beat: u16, bpm: f64) -> u32 {
    match score.frame_timing {
        Some(timing) if score.tick_per_frame > 0 && timing.seconds() > 0.0 => {
            let micros_per_tick = timing.seconds() * 1e6 / score.tick_per_frame as f64;
            ((micros_per_tick * ticks_per_beat as f64).round() as u32).clamp(1, MAX_TEMPO)
        }
        _ => tempo_micros(bpm),
    }
}

fn delta(ticks: u32) -> Result<u28> {
    if ticks > MAX_DELTA {
        return Err(TranscribeError::MidiExport(format!(
            "delta of {} ticks exceeds the variable-length limit",
            ticks
        )));
    }
    Ok(u28::from(ticks))
}

fn note_event<'a>(ticks: u32, message: MidiMessage) -> Result<TrackEvent<'a>> {
    Ok(TrackEvent {
        delta: delta(ticks)?,
        kind: TrackEventKind::Midi {
            channel: u4::from(0),
            message,
        },
    })
}

/// Serialize a score into standard MIDI file bytes
pub fn encode_score(score: &Score, config: &Config) -> Result<Vec<u8>> {
    let format = format_for(config.export.midi_type)?;
    let tempo = score_tempo_micros(
        score,
        config.scheduler.ticks_per_beat,
        config.scheduler.bpm,
    );
    log::debug!("  tempo {} us per beat", tempo);
    let names: Vec<String> = score
        .tracks
        .iter()
        .map(|t| format!("velocity {}-{}", t.lane * 32, (t.lane + 1) * 32))
        .collect();

    let mut tracks = Vec::with_capacity(score.tracks.len());
    for (idx, (lane, name)) in score.tracks.iter().zip(&names).enumerate() {
        let mut events = Vec::with_capacity(lane.messages.len() + 2);

        events.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        });
        if idx == 0 {
            events.push(TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo))),
            });
        }

        for message in &lane.messages {
            let event = match *message {
                LaneMessage::NoteOn {
                    key,
                    velocity,
                    delta: ticks,
                } => note_event(
                    ticks,
                    MidiMessage::NoteOn {
                        key: u7::from(key),
                        vel: u7::from(velocity),
                    },
                )?,
                LaneMessage::NoteOff {
                    key,
                    velocity,
                    delta: ticks,
                } => note_event(
                    ticks,
                    MidiMessage::NoteOff {
                        key: u7::from(key),
                        vel: u7::from(velocity),
                    },
                )?,
                LaneMessage::EndOfTrack { delta: ticks } => TrackEvent {
                    delta: delta(ticks)?,
                    kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
                },
            };
            events.push(event);
        }
        tracks.push(events);
    }

    let header = Header::new(
        format,
        Timing::Metrical(u15::from(config.scheduler.ticks_per_beat)),
    );
    let smf = Smf { header, tracks };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| TranscribeError::MidiExport(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}

/// Write the score as a MIDI file in `output_dir`; nothing is written on error
pub fn export_midi(score: &Score, output_dir: &Path, config: &Config) -> Result<PathBuf> {
    let midi_data = encode_score(score, config)?;

    std::fs::create_dir_all(output_dir)?;
    let midi_path = output_dir.join(&config.export.midi_filename);
    std::fs::write(&midi_path, &midi_data)
        .map_err(|e| TranscribeError::MidiExport(format!("{}: {}", midi_path.display(), e)))?;

    log::info!(
        "Exported {} notes on {} tracks to {}",
        score.note_count(),
        score.tracks.len(),
        midi_path.display()
    );
    Ok(midi_path)
}
