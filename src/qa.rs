//! QA artifacts generation

use crate::analysis::{Score, PITCH_COUNT};
use crate::error::{Result, TranscribeError};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const ROLL_WIDTH: u32 = 1600;
const ROW_HEIGHT: u32 = 4;

/// Lane colours from quietest (light) to loudest (dark)
fn lane_color(lane: usize) -> RGBColor {
    let shade = 220u8.saturating_sub((lane as u8).saturating_mul(28));
    RGBColor(shade, shade / 2, 255 - shade / 2)
}

/// Render the score as a piano roll: time left to right, pitch bottom to top
pub fn generate_piano_roll(score: &Score, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join("piano_roll.png");

    let total_ticks = score
        .tracks
        .iter()
        .map(|t| t.total_ticks())
        .max()
        .unwrap_or(0)
        .max(1);
    let height = ROW_HEIGHT * PITCH_COUNT as u32;
    let x_scale = ROLL_WIDTH as f64 / total_ticks as f64;
    let note_width = ((score.tick_per_frame as f64 * x_scale).ceil() as i32).max(1);

    let root = BitMapBackend::new(&path, (ROLL_WIDTH, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| {
        TranscribeError::ReportExport(format!("Failed to fill plot background: {:?}", e))
    })?;

    for track in &score.tracks {
        let color = lane_color(track.lane);
        for (tick, key, _velocity) in track.played_notes() {
            let x0 = (tick as f64 * x_scale) as i32;
            let y0 = ((PITCH_COUNT as u32 - 1 - key as u32) * ROW_HEIGHT) as i32;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + note_width, y0 + ROW_HEIGHT as i32)],
                color.filled(),
            ))
            .map_err(|e| TranscribeError::ReportExport(format!("Failed to draw note: {:?}", e)))?;
        }
    }

    root.present().map_err(|e| {
        TranscribeError::ReportExport(format!("Failed to save piano roll: {:?}", e))
    })?;
    drop(root);

    log::info!("Piano roll written to {}", path.display());
    Ok(path)
}
