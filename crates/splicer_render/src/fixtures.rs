use splicer_core::types::{AudioTrackInfo, Rotation, TimeMs, VideoInformation, VideoTrackInfo};
use std::path::PathBuf;

pub fn video(index: u32, width: u32, height: u32, duration_ms: i64) -> VideoTrackInfo {
    VideoTrackInfo {
        index,
        width,
        height,
        rotated_width: width,
        rotated_height: height,
        codec: "h264".to_string(),
        codec_tag: "avc1".to_string(),
        pixel_format: "yuv420p".to_string(),
        bitrate: 2_000_000,
        frame_rate: "30/1".to_string(),
        rotation: Rotation::Degrees0,
        duration: TimeMs(duration_ms),
    }
}

pub fn audio(index: u32, duration_ms: i64) -> AudioTrackInfo {
    AudioTrackInfo {
        index,
        codec: "aac".to_string(),
        codec_tag: "mp4a".to_string(),
        sample_format: "fltp".to_string(),
        bitrate: 128_000,
        sample_rate: 48_000,
        channels: 2,
        channel_layout: "stereo".to_string(),
        duration: TimeMs(duration_ms),
    }
}

pub fn media(
    path: &str,
    duration_ms: i64,
    video_tracks: Vec<VideoTrackInfo>,
    audio_tracks: Vec<AudioTrackInfo>,
) -> VideoInformation {
    VideoInformation {
        path: PathBuf::from(path),
        size: 1_000_000,
        duration: TimeMs(duration_ms),
        format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        video_tracks,
        audio_tracks,
    }
}
