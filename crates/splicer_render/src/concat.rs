use splicer_core::types::{TimeMs, VideoInformation};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, SynthesisSettings};
use crate::error::{RenderError, Result};

/// Build a stream-copy concatenation of already compatible inputs.
///
/// The input list is written to a temp file in `scratch_dir` that lives as
/// long as the returned command.
pub fn synthesize_concat(
    infos: &[VideoInformation],
    output: &Path,
    scratch_dir: &Path,
    settings: &SynthesisSettings,
) -> Result<FfmpegCommand> {
    if infos.is_empty() {
        return Err(RenderError::InvalidInput("no input files".to_string()));
    }

    std::fs::create_dir_all(scratch_dir)?;
    let mut list = tempfile::Builder::new()
        .prefix("concat-")
        .suffix(".txt")
        .tempfile_in(scratch_dir)?;
    list.write_all(concat_list(infos).as_bytes())?;
    list.flush()?;

    let args = vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        list.path().to_string_lossy().to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        output.to_string_lossy().to_string(),
    ];
    let total: TimeMs = infos.iter().map(|i| i.duration).sum();
    let command = FfmpegCommand::new(args, output.to_path_buf(), total).with_scratch_file(list);
    info!(inputs = infos.len(), "concat command: {}", command.command_line());
    Ok(command)
}

/// Contents of an ffmpeg concat demuxer list.
fn concat_list(infos: &[VideoInformation]) -> String {
    infos
        .iter()
        .map(|info| {
            let path = info.path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{path}'")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{audio, media, video};
    use tempfile::TempDir;

    fn clip(path: &str, ms: i64) -> VideoInformation {
        media(path, ms, vec![video(0, 1280, 720, ms)], vec![audio(1, ms)])
    }

    #[test]
    fn list_escapes_quotes() {
        let list = concat_list(&[clip("/media/a.mp4", 1_000), clip("/media/bob's.mp4", 1_000)]);
        assert_eq!(list, "file '/media/a.mp4'\nfile '/media/bob'\\''s.mp4'");
    }

    #[test]
    fn command_reads_list_file() {
        let dir = TempDir::new().unwrap();
        let infos = vec![clip("/media/a.mp4", 2_000), clip("/media/b.mp4", 3_000)];
        let cmd = synthesize_concat(
            &infos,
            Path::new("/out/joined.mp4"),
            dir.path(),
            &SynthesisSettings::default(),
        )
        .unwrap();

        assert_eq!(&cmd.args[..4], &["-f", "concat", "-safe", "0"]);
        let list_path = &cmd.args[cmd.args.iter().position(|a| a == "-i").unwrap() + 1];
        let contents = std::fs::read_to_string(list_path).unwrap();
        assert_eq!(contents, "file '/media/a.mp4'\nfile '/media/b.mp4'");
        assert!(cmd.args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert_eq!(cmd.total_duration, TimeMs(5_000));

        let list_path = list_path.clone();
        drop(cmd);
        assert!(!Path::new(&list_path).exists());
    }

    #[test]
    fn empty_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = synthesize_concat(
            &[],
            Path::new("/out/joined.mp4"),
            dir.path(),
            &SynthesisSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidInput(_)));
    }
}
