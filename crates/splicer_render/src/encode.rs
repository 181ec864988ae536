use splicer_core::options::{MergeAudioTrack, MergeMediaEntry, MergeVideoTrack};
use splicer_core::request::EncodeRequestData;
use tracing::info;

use crate::command::{FfmpegCommand, SynthesisSettings};
use crate::error::Result;
use crate::merge::{plan_merge, MergeLayout};
use crate::probe::MediaProbe;

/// Express an encode as a one-file merge: every kept stream becomes its own
/// output group.
pub fn encode_layout(data: &EncodeRequestData) -> MergeLayout {
    MergeLayout {
        width: data.width,
        height: data.height,
        video_tracks: data
            .video_tracks
            .iter()
            .map(|entry| MergeVideoTrack {
                tracks: vec![MergeMediaEntry::new(0, entry.entry_index)],
                width: entry.width,
                height: entry.height,
            })
            .collect(),
        audio_tracks: data
            .audio_tracks
            .iter()
            .map(|&index| MergeAudioTrack {
                tracks: vec![MergeMediaEntry::new(0, index)],
            })
            .collect(),
    }
}

/// Probe the input of an encode request and build its ffmpeg command.
pub fn synthesize_encode(
    probe: &dyn MediaProbe,
    data: &EncodeRequestData,
    settings: &SynthesisSettings,
) -> Result<FfmpegCommand> {
    let layout = encode_layout(data);
    layout.validate(settings)?;

    let info = probe.probe(&data.input)?;
    let plan = plan_merge(std::slice::from_ref(&info), &layout, settings)?;
    let command = plan.to_command(&data.output, data.codec, data.frame_rate, settings);
    info!(input = %data.input.display(), "encode command: {}", command.command_line());
    Ok(command)
}
