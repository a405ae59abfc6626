//! Pass 0: Stereo Downmix

use crate::audio::{decode_sample, TranscriptionState, WaveSource};
use crate::config::{Channel, Config};
use crate::error::{Result, TranscribeError};

/// Collapse a stereo PCM source into one amplitude per frame.
///
/// Each frame's payload is split into left and right samples of
/// `sample_width` bytes, decoded as signed little-endian integers and
/// averaged, rounding half away from zero. When `channel` is set the
/// frame is still consumed but its slot keeps the default of zero.
pub fn downmix(source: &mut dyn WaveSource, channel: Option<Channel>) -> Result<Vec<f64>> {
    let width = source.sample_width();
    if width != 2 && width != 4 {
        return Err(TranscribeError::UnsupportedFormat(format!(
            "sample width {} bytes (expected 2 or 4)",
            width
        )));
    }

    let n_frames = source.n_frames();
    let mut result = vec![0.0; n_frames];

    for (idx, slot) in result.iter_mut().enumerate() {
        let frame = source.read_frame()?;
        if channel.is_some() {
            continue;
        }
        if frame.len() < 2 * width {
            return Err(TranscribeError::AudioFile(format!(
                "frame {} carries {} bytes, expected {}",
                idx,
                frame.len(),
                2 * width
            )));
        }

        let left = decode_sample(&frame[..width], width)?;
        let right = decode_sample(&frame[width..2 * width], width)?;
        *slot = ((left + right) as f64 / 2.0).round();
    }

    Ok(result)
}

pub fn run(state: &mut TranscriptionState, config: &Config) -> Result<()> {
    log::info!("Pass 0: Stereo Downmix");

    let mut source = state.source.take().ok_or_else(|| {
        TranscribeError::Pipeline("no waveform source attached to the state".to_string())
    })?;

    if let Some(channel) = config.audio.channel {
        log::warn!(
            "  Channel selector {:?} set; frames are left at zero instead of summed",
            channel
        );
    }

    let signal = downmix(source.as_mut(), config.audio.channel)?;
    log::info!(
        "  {} frames at {} Hz ({:.2}s)",
        signal.len(),
        state.sample_rate,
        state.duration_sec()
    );

    state.signal = Some(signal);
    Ok(())
}
