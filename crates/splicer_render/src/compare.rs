use splicer_core::types::{AudioTrackInfo, VideoInformation, VideoTrackInfo};
use std::path::PathBuf;
use tracing::debug;

use crate::error::Result;
use crate::probe::MediaProbe;

/// Whether `files` can be joined by stream copy.
///
/// Every file is checked against the first one; the check stops at the first
/// mismatch. Zero or one file is trivially compatible.
pub fn compare(probe: &dyn MediaProbe, files: &[PathBuf]) -> Result<bool> {
    let Some((first, rest)) = files.split_first() else {
        return Ok(true);
    };
    if rest.is_empty() {
        return Ok(true);
    }

    let reference = probe.probe(first)?;
    for file in rest {
        let other = probe.probe(file)?;
        if let Some(reason) = mismatch(&reference, &other) {
            debug!(
                reference = %first.display(),
                file = %file.display(),
                reason,
                "files are not concat compatible"
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// [`compare`] over files that were already probed.
pub fn all_compatible(infos: &[VideoInformation]) -> bool {
    match infos.split_first() {
        Some((first, rest)) => rest.iter().all(|other| is_compatible(first, other)),
        None => true,
    }
}

pub fn is_compatible(a: &VideoInformation, b: &VideoInformation) -> bool {
    mismatch(a, b).is_none()
}

/// First field that differs between `a` and `b`, if any.
fn mismatch(a: &VideoInformation, b: &VideoInformation) -> Option<&'static str> {
    if a.video_tracks.len() != b.video_tracks.len() {
        return Some("video track count");
    }
    if a.audio_tracks.len() != b.audio_tracks.len() {
        return Some("audio track count");
    }
    if a.format != b.format {
        return Some("container format");
    }
    for (va, vb) in a.video_tracks.iter().zip(&b.video_tracks) {
        if let Some(field) = video_mismatch(va, vb) {
            return Some(field);
        }
    }
    for (aa, ab) in a.audio_tracks.iter().zip(&b.audio_tracks) {
        if let Some(field) = audio_mismatch(aa, ab) {
            return Some(field);
        }
    }
    None
}

fn video_mismatch(a: &VideoTrackInfo, b: &VideoTrackInfo) -> Option<&'static str> {
    if a.width != b.width {
        Some("video width")
    } else if a.rotated_width != b.rotated_width {
        Some("video rotated width")
    } else if a.height != b.height {
        Some("video height")
    } else if a.rotated_height != b.rotated_height {
        Some("video rotated height")
    } else if a.bitrate != b.bitrate {
        Some("video bitrate")
    } else if a.codec != b.codec {
        Some("video codec")
    } else if a.codec_tag != b.codec_tag {
        Some("video codec tag")
    } else if a.frame_rate != b.frame_rate {
        Some("video frame rate")
    } else if a.pixel_format != b.pixel_format {
        Some("video pixel format")
    } else if a.rotation != b.rotation {
        Some("video rotation")
    } else {
        None
    }
}

fn audio_mismatch(a: &AudioTrackInfo, b: &AudioTrackInfo) -> Option<&'static str> {
    if a.codec != b.codec {
        Some("audio codec")
    } else if a.codec_tag != b.codec_tag {
        Some("audio codec tag")
    } else if a.sample_format != b.sample_format {
        Some("audio sample format")
    } else if a.bitrate != b.bitrate {
        Some("audio bitrate")
    } else if a.sample_rate != b.sample_rate {
        Some("audio sample rate")
    } else if a.channels != b.channels {
        Some("audio channels")
    } else if a.channel_layout != b.channel_layout {
        Some("audio channel layout")
    } else {
        None
    }
}
