//! Merge synthesis: many inputs, any number of output streams.
//!
//! Each output stream is a *track group*: one slot per input file, played in
//! order. Slots whose file lacks the selected stream, or whose stream is
//! shorter than the file, are padded with black video or silence so every
//! group stays aligned with the files' total durations.

use splicer_core::options::{FrameRate, MergeAudioTrack, MergeMediaEntry, MergeVideoTrack, VideoCodec};
use splicer_core::request::MergeRequestData;
use splicer_core::types::{AudioTrackInfo, TimeMs, VideoInformation, VideoTrackInfo};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, SynthesisSettings};
use crate::error::{RenderError, Result};
use crate::filter::{Filter, FilterChain, FilterGraph, StreamKind};
use crate::probe::{probe_all, MediaProbe};

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Declarative description of the output streams of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeLayout {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Empty means one group per video track position.
    pub video_tracks: Vec<MergeVideoTrack>,
    /// Empty means one group per audio track position.
    pub audio_tracks: Vec<MergeAudioTrack>,
}

impl MergeLayout {
    pub fn from_request(data: &MergeRequestData) -> Self {
        Self {
            width: data.width,
            height: data.height,
            video_tracks: data.video_tracks.clone(),
            audio_tracks: data.audio_tracks.clone(),
        }
    }

    /// Reject caller supplied sizes below the minimum. Runs before any probing.
    pub fn validate(&self, settings: &SynthesisSettings) -> Result<()> {
        check_dimension("width", self.width, settings)?;
        check_dimension("height", self.height, settings)?;
        for group in &self.video_tracks {
            check_dimension("width", group.width, settings)?;
            check_dimension("height", group.height, settings)?;
        }
        Ok(())
    }

    /// Reject entries pointing past the input list.
    pub fn validate_file_indexes(&self, file_count: usize) -> Result<()> {
        let entries = self
            .video_tracks
            .iter()
            .flat_map(|g| g.tracks.iter())
            .chain(self.audio_tracks.iter().flat_map(|g| g.tracks.iter()));
        for entry in entries {
            if entry.file_index >= file_count {
                return Err(RenderError::InvalidInput(format!(
                    "track entry refers to file {} but there are only {} inputs",
                    entry.file_index, file_count
                )));
            }
        }
        Ok(())
    }
}

fn check_dimension(name: &str, value: Option<u32>, settings: &SynthesisSettings) -> Result<()> {
    match value {
        Some(v) if v < settings.min_dimension => Err(RenderError::InvalidInput(format!(
            "{name} must be greater than or equal to {}, got {v}",
            settings.min_dimension
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A real stream: `ordinal` is its position among the file's streams of
    /// the same kind.
    Source {
        file_index: usize,
        ordinal: usize,
        duration: TimeMs,
    },
    Filler { duration: TimeMs },
}

impl Segment {
    pub fn duration(&self) -> TimeMs {
        match self {
            Segment::Source { duration, .. } | Segment::Filler { duration } => *duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoGroup {
    pub width: u32,
    pub height: u32,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioGroup {
    pub segments: Vec<Segment>,
}

/// Result of track alignment, before any ffmpeg syntax is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub inputs: Vec<PathBuf>,
    pub video: Vec<VideoGroup>,
    pub audio: Vec<AudioGroup>,
    /// Sum of the input durations.
    pub total_duration: TimeMs,
}

struct Slot<'a, T> {
    file_index: usize,
    info: &'a VideoInformation,
    track: Option<&'a T>,
}

/// Align the selected tracks of `infos` into output groups.
pub fn plan_merge(
    infos: &[VideoInformation],
    layout: &MergeLayout,
    settings: &SynthesisSettings,
) -> Result<MergePlan> {
    layout.validate(settings)?;
    layout.validate_file_indexes(infos.len())?;

    let mut video = Vec::new();
    for (t, (slots, width, height)) in video_slots(infos, layout).into_iter().enumerate() {
        if slots.is_empty() {
            debug!(group = t, "skipping empty video group");
            continue;
        }
        let (w, h) = group_size(infos, &slots, width, height, settings)?;
        let segments = align(&slots, |info, track: &VideoTrackInfo| {
            info.video_ordinal(track.index).map(|o| (o, track.duration))
        });
        video.push(VideoGroup {
            width: w,
            height: h,
            segments,
        });
    }

    let mut audio = Vec::new();
    for (t, slots) in audio_slots(infos, layout).into_iter().enumerate() {
        if slots.is_empty() {
            debug!(group = t, "skipping empty audio group");
            continue;
        }
        let segments = align(&slots, |info, track: &AudioTrackInfo| {
            info.audio_ordinal(track.index).map(|o| (o, track.duration))
        });
        audio.push(AudioGroup { segments });
    }

    if video.is_empty() && audio.is_empty() {
        return Err(RenderError::NoTracks);
    }

    Ok(MergePlan {
        inputs: infos.iter().map(|i| i.path.clone()).collect(),
        video,
        audio,
        total_duration: infos.iter().map(|i| i.duration).sum(),
    })
}

type VideoSlots<'a> = (Vec<Slot<'a, VideoTrackInfo>>, Option<u32>, Option<u32>);

fn video_slots<'a>(infos: &'a [VideoInformation], layout: &MergeLayout) -> Vec<VideoSlots<'a>> {
    if layout.video_tracks.is_empty() {
        let groups = infos.iter().map(|i| i.video_tracks.len()).max().unwrap_or(0);
        (0..groups)
            .map(|position| {
                let slots: Vec<_> = infos
                    .iter()
                    .enumerate()
                    .map(|(file_index, info)| Slot {
                        file_index,
                        info,
                        track: info.video_tracks.get(position),
                    })
                    .collect();
                (slots, layout.width, layout.height)
            })
            .collect()
    } else {
        layout
            .video_tracks
            .iter()
            .map(|group| {
                let slots = explicit_slots(infos, &group.tracks, |info, index| info.video_track(index));
                (
                    slots,
                    group.width.or(layout.width),
                    group.height.or(layout.height),
                )
            })
            .collect()
    }
}

fn audio_slots<'a>(
    infos: &'a [VideoInformation],
    layout: &MergeLayout,
) -> Vec<Vec<Slot<'a, AudioTrackInfo>>> {
    if layout.audio_tracks.is_empty() {
        let groups = infos.iter().map(|i| i.audio_tracks.len()).max().unwrap_or(0);
        (0..groups)
            .map(|position| {
                infos
                    .iter()
                    .enumerate()
                    .map(|(file_index, info)| Slot {
                        file_index,
                        info,
                        track: info.audio_tracks.get(position),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    } else {
        layout
            .audio_tracks
            .iter()
            .map(|group| explicit_slots(infos, &group.tracks, |info, index| info.audio_track(index)))
            .collect()
    }
}

fn explicit_slots<'a, T>(
    infos: &'a [VideoInformation],
    entries: &[MergeMediaEntry],
    lookup: impl Fn(&'a VideoInformation, u32) -> Option<&'a T>,
) -> Vec<Slot<'a, T>> {
    entries
        .iter()
        .filter_map(|entry| {
            let info = infos.get(entry.file_index)?;
            Some(Slot {
                file_index: entry.file_index,
                info,
                track: lookup(info, entry.entry_index),
            })
        })
        .collect()
}

/// One source segment per matched slot, plus filler for whatever part of the
/// file the stream does not cover.
fn align<T>(
    slots: &[Slot<'_, T>],
    locate: impl Fn(&VideoInformation, &T) -> Option<(usize, TimeMs)>,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    for slot in slots {
        let located = slot.track.and_then(|track| locate(slot.info, track));
        match located {
            Some((ordinal, duration)) => {
                segments.push(Segment::Source {
                    file_index: slot.file_index,
                    ordinal,
                    duration,
                });
                let rest = slot.info.duration - duration;
                if rest.is_positive() {
                    segments.push(Segment::Filler { duration: rest });
                }
            }
            None => segments.push(Segment::Filler {
                duration: slot.info.duration,
            }),
        }
    }
    segments
}

/// Target size of a video group.
///
/// Explicit sizes win. Otherwise the largest displayed width and height of the
/// matched tracks are used, deriving a missing dimension from their aspect
/// ratio when only one was given. Both dimensions end up even.
fn group_size(
    infos: &[VideoInformation],
    slots: &[Slot<'_, VideoTrackInfo>],
    width: Option<u32>,
    height: Option<u32>,
    settings: &SynthesisSettings,
) -> Result<(u32, u32)> {
    if let (Some(w), Some(h)) = (width, height) {
        return Ok((even(w), even(h)));
    }

    let matched: Vec<&VideoTrackInfo> = slots.iter().filter_map(|s| s.track).collect();
    let pool: Vec<&VideoTrackInfo> = if matched.is_empty() {
        // filler-only group: size it like the largest video among the inputs
        infos.iter().flat_map(|i| i.video_tracks.iter()).collect()
    } else {
        matched
    };

    let max_w = pool.iter().map(|t| t.rotated_width).max().unwrap_or(0);
    let max_h = pool.iter().map(|t| t.rotated_height).max().unwrap_or(0);
    if max_w == 0 || max_h == 0 {
        return Err(RenderError::InvalidInput(
            "none of the videos of the video track has a width or height".to_string(),
        ));
    }

    let (w, h) = match (width, height) {
        (Some(w), None) => (w, scale_dimension(w, max_h, max_w)),
        (None, Some(h)) => (scale_dimension(h, max_w, max_h), h),
        _ => (max_w, max_h),
    };
    if width.is_some() || height.is_some() {
        check_dimension("width", Some(w), settings)?;
        check_dimension("height", Some(h), settings)?;
    }
    Ok((even(w), even(h)))
}

fn scale_dimension(given: u32, numerator: u32, denominator: u32) -> u32 {
    (u64::from(given) * u64::from(numerator) / u64::from(denominator)) as u32
}

fn even(n: u32) -> u32 {
    if n % 2 != 0 {
        n + 1
    } else {
        n
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

impl MergePlan {
    pub fn video_label(group: usize) -> String {
        format!("v_track{group}")
    }

    pub fn audio_label(group: usize) -> String {
        format!("a_track{group}")
    }

    pub fn filter_graph(&self, settings: &SynthesisSettings) -> FilterGraph {
        let mut graph = FilterGraph::default();

        for (t, group) in self.video.iter().enumerate() {
            let (w, h) = (group.width, group.height);
            let mut labels = Vec::with_capacity(group.segments.len());
            for (n, segment) in group.segments.iter().enumerate() {
                let label = format!("v_track{t}_video{n}");
                let chain = match *segment {
                    Segment::Source {
                        file_index,
                        ordinal,
                        ..
                    } => FilterChain::new(
                        vec![format!("{file_index}:v:{ordinal}")],
                        vec![
                            Filter::Scale {
                                width: w,
                                height: h,
                            },
                            Filter::Pad {
                                width: w,
                                height: h,
                            },
                            Filter::SetSar,
                        ],
                        label.clone(),
                    ),
                    Segment::Filler { duration } => FilterChain::source(
                        Filter::Color {
                            color: settings.filler_color.clone(),
                            width: w,
                            height: h,
                            duration,
                        },
                        label.clone(),
                    ),
                };
                graph.push(chain);
                labels.push(label);
            }
            graph.push(FilterChain::new(
                labels,
                vec![Filter::Concat {
                    segments: group.segments.len(),
                    kind: StreamKind::Video,
                }],
                Self::video_label(t),
            ));
        }

        for (t, group) in self.audio.iter().enumerate() {
            let mut labels = Vec::with_capacity(group.segments.len());
            for (n, segment) in group.segments.iter().enumerate() {
                let label = format!("a_track{t}_audio{n}");
                let input = match *segment {
                    Segment::Source {
                        file_index,
                        ordinal,
                        ..
                    } => format!("{file_index}:a:{ordinal}"),
                    Segment::Filler { duration } => {
                        let rest = format!("{label}_rest");
                        graph.push(FilterChain::source(
                            Filter::AEvalSrc {
                                sample_rate: settings.audio_sample_rate,
                                duration,
                            },
                            rest.clone(),
                        ));
                        rest
                    }
                };
                graph.push(FilterChain::new(
                    vec![input],
                    vec![audio_format(settings)],
                    label.clone(),
                ));
                labels.push(label);
            }
            graph.push(FilterChain::new(
                labels,
                vec![Filter::Concat {
                    segments: group.segments.len(),
                    kind: StreamKind::Audio,
                }],
                Self::audio_label(t),
            ));
        }

        graph
    }

    /// Build the full ffmpeg invocation writing to `output`.
    pub fn to_command(
        &self,
        output: &Path,
        codec: VideoCodec,
        frame_rate: FrameRate,
        settings: &SynthesisSettings,
    ) -> FfmpegCommand {
        let mut args = vec!["-y".to_string()];
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        let graph = self.filter_graph(settings);
        if !graph.is_empty() {
            args.push("-filter_complex".to_string());
            args.push(graph.to_string());
        }

        for t in 0..self.video.len() {
            args.push("-map".to_string());
            args.push(format!("[{}]", Self::video_label(t)));
            args.push("-c:v".to_string());
            args.push(codec.encoder().to_string());
            if let Some(tag) = codec.tag() {
                args.push("-tag:v".to_string());
                args.push(tag.to_string());
            }
            args.push("-pix_fmt".to_string());
            args.push(settings.pixel_format.clone());
            args.push("-r".to_string());
            args.push(frame_rate.value().to_string());
        }

        for t in 0..self.audio.len() {
            args.push("-map".to_string());
            args.push(format!("[{}]", Self::audio_label(t)));
            args.push("-c:a".to_string());
            args.push(settings.audio_codec.clone());
            args.push("-ar".to_string());
            args.push(settings.audio_sample_rate.to_string());
            args.push("-ac".to_string());
            args.push(settings.audio_channels.to_string());
        }

        args.push(output.to_string_lossy().to_string());
        FfmpegCommand::new(args, output.to_path_buf(), self.total_duration)
    }
}

fn audio_format(settings: &SynthesisSettings) -> Filter {
    Filter::AFormat {
        sample_format: settings.audio_sample_format.clone(),
        sample_rate: settings.audio_sample_rate,
        channel_layout: settings.audio_channel_layout.clone(),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Probe the inputs of a merge request and build its ffmpeg command.
pub fn synthesize_merge(
    probe: &dyn MediaProbe,
    data: &MergeRequestData,
    settings: &SynthesisSettings,
) -> Result<FfmpegCommand> {
    if data.inputs.is_empty() {
        return Err(RenderError::InvalidInput("no input files".to_string()));
    }
    let layout = MergeLayout::from_request(data);
    layout.validate(settings)?;

    let infos = probe_all(probe, &data.inputs)?;
    let plan = plan_merge(&infos, &layout, settings)?;
    for (t, group) in plan.video.iter().enumerate() {
        let duration: TimeMs = group.segments.iter().map(Segment::duration).sum();
        debug!(group = t, width = group.width, height = group.height, %duration, "video group");
    }

    let command = plan.to_command(&data.output, data.codec, data.frame_rate, settings);
    info!(
        inputs = data.inputs.len(),
        video_groups = plan.video.len(),
        audio_groups = plan.audio.len(),
        "merge command: {}",
        command.command_line()
    );
    Ok(command)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{audio, media, video};
    use crate::probe::MockMediaProbe;

    fn settings() -> SynthesisSettings {
        SynthesisSettings::default()
    }

    fn source(file_index: usize, ordinal: usize, ms: i64) -> Segment {
        Segment::Source {
            file_index,
            ordinal,
            duration: TimeMs(ms),
        }
    }

    fn filler(ms: i64) -> Segment {
        Segment::Filler {
            duration: TimeMs(ms),
        }
    }

    #[test]
    fn same_resolution_keeps_common_size() {
        let a = media("/a.mp4", 4_000, vec![video(0, 1920, 1080, 4_000)], vec![]);
        let b = media("/b.mp4", 2_000, vec![video(0, 1920, 1080, 2_000)], vec![]);
        let plan = plan_merge(&[a, b], &MergeLayout::default(), &settings()).unwrap();

        assert_eq!(plan.video.len(), 1);
        assert!(plan.audio.is_empty());
        assert_eq!((plan.video[0].width, plan.video[0].height), (1920, 1080));
        assert_eq!(plan.video[0].segments, vec![source(0, 0, 4_000), source(1, 0, 2_000)]);
        assert_eq!(plan.total_duration, TimeMs(6_000));
    }

    #[test]
    fn mixed_resolutions_and_missing_audio() {
        let a = media(
            "/a.mp4",
            5_000,
            vec![video(0, 720, 480, 5_000)],
            vec![audio(1, 5_000)],
        );
        let b = media("/b.mp4", 3_000, vec![video(0, 1280, 720, 3_000)], vec![]);
        let plan = plan_merge(&[a, b], &MergeLayout::default(), &settings()).unwrap();

        let v = &plan.video[0];
        assert_eq!((v.width, v.height), (1280, 720));
        assert_eq!(v.segments, vec![source(0, 0, 5_000), source(1, 0, 3_000)]);

        assert_eq!(plan.audio.len(), 1);
        assert_eq!(plan.audio[0].segments, vec![source(0, 0, 5_000), filler(3_000)]);
    }

    #[test]
    fn short_track_gets_remainder_filler() {
        let a = media("/a.mp4", 5_000, vec![video(0, 640, 480, 3_000)], vec![]);
        let plan = plan_merge(&[a], &MergeLayout::default(), &settings()).unwrap();
        assert_eq!(plan.video[0].segments, vec![source(0, 0, 3_000), filler(2_000)]);
    }

    #[test]
    fn odd_sizes_round_up_to_even() {
        let a = media("/a.mp4", 1_000, vec![video(0, 641, 479, 1_000)], vec![]);
        let b = media("/b.mp4", 1_000, vec![video(0, 300, 361, 1_000)], vec![]);
        let plan = plan_merge(&[a, b], &MergeLayout::default(), &settings()).unwrap();
        assert_eq!((plan.video[0].width, plan.video[0].height), (642, 362));
    }

    #[test]
    fn rotated_tracks_use_display_size() {
        let mut portrait = video(0, 1920, 1080, 1_000);
        portrait.rotated_width = 1080;
        portrait.rotated_height = 1920;
        let a = media("/a.mp4", 1_000, vec![portrait], vec![]);
        let plan = plan_merge(&[a], &MergeLayout::default(), &settings()).unwrap();
        assert_eq!((plan.video[0].width, plan.video[0].height), (1080, 1920));
    }

    #[test]
    fn single_dimension_keeps_aspect() {
        let a = media("/a.mp4", 1_000, vec![video(0, 1920, 1080, 1_000)], vec![]);
        let layout = MergeLayout {
            width: Some(1280),
            ..Default::default()
        };
        let plan = plan_merge(&[a.clone()], &layout, &settings()).unwrap();
        assert_eq!((plan.video[0].width, plan.video[0].height), (1280, 720));

        let layout = MergeLayout {
            height: Some(480),
            ..Default::default()
        };
        let plan = plan_merge(&[a], &layout, &settings()).unwrap();
        assert_eq!((plan.video[0].width, plan.video[0].height), (854, 480));
    }

    #[test]
    fn small_dimensions_are_rejected() {
        let a = media("/a.mp4", 1_000, vec![video(0, 1920, 1080, 1_000)], vec![]);
        let layout = MergeLayout {
            width: Some(100),
            ..Default::default()
        };
        let err = plan_merge(&[a.clone()], &layout, &settings()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidInput(_)));

        // derived height 135 * 1080 / 1920 = 75
        let layout = MergeLayout {
            width: Some(135),
            ..Default::default()
        };
        let err = plan_merge(&[a], &layout, &settings()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidInput(_)));
    }

    #[test]
    fn explicit_groups_select_streams_and_sizes() {
        let a = media(
            "/a.mp4",
            4_000,
            vec![video(0, 1280, 720, 4_000), video(1, 640, 360, 4_000)],
            vec![audio(2, 4_000)],
        );
        let b = media("/b.mp4", 2_000, vec![video(0, 1920, 1080, 2_000)], vec![]);
        let layout = MergeLayout {
            width: Some(1920),
            height: Some(1080),
            video_tracks: vec![MergeVideoTrack {
                tracks: vec![MergeMediaEntry::new(0, 1), MergeMediaEntry::new(1, 5)],
                width: Some(640),
                height: None,
            }],
            audio_tracks: vec![MergeAudioTrack {
                tracks: vec![MergeMediaEntry::new(1, 0), MergeMediaEntry::new(0, 2)],
            }],
        };
        let plan = plan_merge(&[a, b], &layout, &settings()).unwrap();

        let v = &plan.video[0];
        // group width overrides, group height falls back to the request
        assert_eq!((v.width, v.height), (640, 1080));
        // stream 1 is the second video of file 0; file 1 has no stream 5
        assert_eq!(v.segments, vec![source(0, 1, 4_000), filler(2_000)]);

        assert_eq!(plan.audio[0].segments, vec![filler(2_000), source(0, 0, 4_000)]);
    }

    #[test]
    fn filler_only_group_is_sized_from_inputs() {
        let a = media("/a.mp4", 1_000, vec![video(0, 800, 600, 1_000)], vec![]);
        let layout = MergeLayout {
            video_tracks: vec![MergeVideoTrack {
                tracks: vec![MergeMediaEntry::new(0, 9)],
                width: None,
                height: None,
            }],
            ..Default::default()
        };
        let plan = plan_merge(&[a], &layout, &settings()).unwrap();
        assert_eq!((plan.video[0].width, plan.video[0].height), (800, 600));
        assert_eq!(plan.video[0].segments, vec![filler(1_000)]);
    }

    #[test]
    fn out_of_range_file_index_is_rejected() {
        let a = media("/a.mp4", 1_000, vec![video(0, 800, 600, 1_000)], vec![]);
        let layout = MergeLayout {
            audio_tracks: vec![MergeAudioTrack {
                tracks: vec![MergeMediaEntry::new(3, 0)],
            }],
            ..Default::default()
        };
        assert!(matches!(
            plan_merge(&[a], &layout, &settings()),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn no_groups_is_an_error() {
        let a = media("/a.mp4", 1_000, vec![video(0, 800, 600, 1_000)], vec![]);
        let layout = MergeLayout {
            video_tracks: vec![MergeVideoTrack::default()],
            ..Default::default()
        };
        assert!(matches!(
            plan_merge(&[a], &layout, &settings()),
            Err(RenderError::NoTracks)
        ));
    }

    #[test]
    fn filter_graph_layout() {
        let a = media(
            "/a.mp4",
            5_000,
            vec![video(0, 720, 480, 3_000)],
            vec![audio(1, 5_000)],
        );
        let b = media("/b.mp4", 2_000, vec![video(0, 1280, 720, 2_000)], vec![]);
        let plan = plan_merge(&[a, b], &MergeLayout::default(), &settings()).unwrap();
        let graph = plan.filter_graph(&settings());

        let concat = graph.producer("v_track0").unwrap();
        assert_eq!(
            concat.inputs,
            vec!["v_track0_video0", "v_track0_video1", "v_track0_video2"]
        );
        assert_eq!(
            graph.producer("v_track0_video1").unwrap().to_string(),
            "color=c=black:s=1280x720:d=2000ms[v_track0_video1]"
        );
        assert_eq!(graph.producer("v_track0_video2").unwrap().inputs, vec!["1:v:0"]);

        assert_eq!(
            graph.producer("a_track0_audio1_rest").unwrap().to_string(),
            "aevalsrc=0:s=44100:d=2000ms[a_track0_audio1_rest]"
        );
        assert_eq!(
            graph.producer("a_track0").unwrap().to_string(),
            "[a_track0_audio0][a_track0_audio1]concat=n=2:v=0:a=1[a_track0]"
        );
    }

    #[test]
    fn command_maps_every_group() {
        let a = media(
            "/a.mp4",
            1_000,
            vec![video(0, 640, 480, 1_000)],
            vec![audio(1, 1_000)],
        );
        let plan = plan_merge(&[a], &MergeLayout::default(), &settings()).unwrap();
        let cmd = plan.to_command(
            Path::new("/out/merged.mp4"),
            VideoCodec::H265,
            FrameRate::Fps24,
            &settings(),
        );

        let args = cmd.args.join(" ");
        assert!(args.starts_with("-y -i /a.mp4 -filter_complex "));
        assert!(args.contains("-map [v_track0] -c:v hevc -tag:v hvc1 -pix_fmt yuv420p -r 24"));
        assert!(args.contains("-map [a_track0] -c:a aac -ar 44100 -ac 2"));
        assert_eq!(cmd.args.last().unwrap(), "/out/merged.mp4");
        assert_eq!(cmd.total_duration, TimeMs(1_000));
    }

    #[test]
    fn synthesize_validates_before_probing() {
        let mut mock = MockMediaProbe::new();
        mock.expect_probe().never();
        let data = MergeRequestData {
            inputs: vec![PathBuf::from("/a.mp4")],
            output: PathBuf::from("/out.mp4"),
            result_path: None,
            width: None,
            height: Some(64),
            frame_rate: FrameRate::default(),
            codec: VideoCodec::default(),
            video_tracks: vec![],
            audio_tracks: vec![],
        };
        assert!(matches!(
            synthesize_merge(&mock, &data, &settings()),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn synthesize_probes_each_input_once() {
        let mut mock = MockMediaProbe::new();
        mock.expect_probe().times(2).returning(|p: &Path| {
            Ok(media(
                &p.to_string_lossy(),
                2_000,
                vec![video(0, 640, 360, 2_000)],
                vec![],
            ))
        });
        let data = MergeRequestData {
            inputs: vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")],
            output: PathBuf::from("/out.mp4"),
            result_path: None,
            width: None,
            height: None,
            frame_rate: FrameRate::Fps30,
            codec: VideoCodec::Default,
            video_tracks: vec![],
            audio_tracks: vec![],
        };
        let cmd = synthesize_merge(&mock, &data, &settings()).unwrap();
        assert_eq!(cmd.output_path, PathBuf::from("/out.mp4"));
        assert_eq!(cmd.total_duration, TimeMs(4_000));
        assert!(cmd.args.contains(&"libx264".to_string()));
    }
}
