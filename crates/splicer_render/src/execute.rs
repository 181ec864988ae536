use splicer_core::request::CommandId;
use splicer_core::types::TimeMs;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::command::FfmpegCommand;
use crate::error::{RenderError, Result};

/// Terminal result of one command run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(PathBuf),
    Canceled,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// Always the first event of a run.
    Created(CommandId),
    /// Media time encoded so far.
    Progress(TimeMs),
    /// Always the last event of a run.
    Finished(Outcome),
}

/// Runs synthesized commands in the background.
pub trait CommandExecutor: Send + Sync {
    /// Start `command`. Events of the run arrive on the returned channel.
    fn execute(&self, command: FfmpegCommand) -> Result<mpsc::UnboundedReceiver<ExecutionEvent>>;

    /// Ask a running command to stop. Unknown or finished ids are ignored.
    fn cancel(&self, id: CommandId);
}

// ---------------------------------------------------------------------------
// FfmpegExecutor
// ---------------------------------------------------------------------------

type CancelMap = Arc<Mutex<HashMap<CommandId, oneshot::Sender<()>>>>;

const STDERR_TAIL_LINES: usize = 8;

/// [`CommandExecutor`] spawning the `ffmpeg` binary.
pub struct FfmpegExecutor {
    ffmpeg: PathBuf,
    next_id: AtomicU64,
    running: CancelMap,
}

impl FfmpegExecutor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            next_id: AtomicU64::new(1),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for FfmpegExecutor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl CommandExecutor for FfmpegExecutor {
    fn execute(&self, command: FfmpegCommand) -> Result<mpsc::UnboundedReceiver<ExecutionEvent>> {
        let mut child = Command::new(&self.ffmpeg)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::FfmpegNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::FfmpegFailed("stderr was not captured".to_string()))?;

        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Ok(mut running) = self.running.lock() {
            running.insert(id, cancel_tx);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ExecutionEvent::Created(id));
        info!(%id, "started {}", command.command_line());

        let reader = tokio::spawn(read_stderr(stderr, tx.clone()));
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            // keeps scratch files alive until ffmpeg exits
            let command = command;

            enum Exit {
                Status(std::io::Result<ExitStatus>),
                Canceled,
            }

            let mut cancel_rx = cancel_rx;
            let exit = tokio::select! {
                status = child.wait() => Exit::Status(status),
                Ok(()) = &mut cancel_rx => Exit::Canceled,
            };

            if let Exit::Canceled = exit {
                if let Err(e) = child.kill().await {
                    warn!(%id, "failed to kill ffmpeg: {}", e);
                }
            }
            // stderr closes once the process is gone
            let tail = reader.await.unwrap_or_default();

            let outcome = match exit {
                Exit::Canceled => Outcome::Canceled,
                Exit::Status(Ok(status)) if status.success() => {
                    Outcome::Success(command.output_path.clone())
                }
                Exit::Status(Ok(status)) => {
                    Outcome::Error(format!("ffmpeg exited with {status}: {tail}"))
                }
                Exit::Status(Err(e)) => Outcome::Error(format!("failed to wait for ffmpeg: {e}")),
            };

            if let Ok(mut running) = running.lock() {
                running.remove(&id);
            }
            debug!(%id, ?outcome, "command finished");
            let _ = tx.send(ExecutionEvent::Finished(outcome));
        });

        Ok(rx)
    }

    fn cancel(&self, id: CommandId) {
        let sender = self.running.lock().ok().and_then(|mut m| m.remove(&id));
        match sender {
            Some(tx) => {
                info!(%id, "canceling command");
                let _ = tx.send(());
            }
            None => debug!(%id, "cancel ignored, command not running"),
        }
    }
}

/// Forward progress from ffmpeg's stderr and return its last lines.
///
/// ffmpeg ends progress updates with `\r` and log lines with `\n`; both
/// delimit a line here.
async fn read_stderr<R: AsyncRead + Unpin>(
    stderr: R,
    tx: mpsc::UnboundedSender<ExecutionEvent>,
) -> String {
    let mut segments = BufReader::new(stderr).split(b'\r');
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(segment)) = segments.next_segment().await {
        let text = String::from_utf8_lossy(&segment);
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(elapsed) = parse_progress(line) {
                let _ = tx.send(ExecutionEvent::Progress(elapsed));
                continue;
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Parse the elapsed media time from an ffmpeg stderr progress line.
///
/// Example line: `frame=  123 fps= 60 ... time=00:01:02.05 speed=1.50x`
pub fn parse_progress(line: &str) -> Option<TimeMs> {
    let value = extract_value(line, "time=")?;
    parse_time_str(&value).map(TimeMs::from_seconds)
}

/// Extract a value from an ffmpeg key=value progress line.
fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let trimmed = rest.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    let val = trimmed[..end].to_string();
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Parse an ffmpeg time string like "00:01:02.05" into seconds.
fn parse_time_str(s: &str) -> Option<f64> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let mins: f64 = parts[1].parse().ok()?;
    let secs: f64 = parts[2].parse().ok()?;
    let total = hours * 3600.0 + mins * 60.0 + secs;
    // ffmpeg reports a negative time before the first frame
    Some(if negative { 0.0 } else { total })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_progress_extracts_time() {
        let line =
            "frame=  150 fps= 30 q=28.0 size=    1024kB time=00:00:05.00 bitrate= 200.0kbits/s speed=1.50x";
        assert_eq!(parse_progress(line), Some(TimeMs(5_000)));
    }

    #[test]
    fn parse_progress_returns_none_for_non_progress_lines() {
        assert!(parse_progress("Input #0, mov,mp4...").is_none());
        assert!(parse_progress("Stream #0:0: Video: h264").is_none());
        assert!(parse_progress("").is_none());
        assert!(parse_progress("size=N/A time=N/A bitrate=N/A speed=N/A").is_none());
    }

    #[test]
    fn parse_time_str_valid() {
        assert!((parse_time_str("00:01:02.05").unwrap() - 62.05).abs() < 0.001);
        assert!((parse_time_str("01:00:00.00").unwrap() - 3600.0).abs() < 0.001);
        assert_eq!(parse_time_str("-00:00:00.02"), Some(0.0));
    }

    #[test]
    fn parse_time_str_invalid() {
        assert!(parse_time_str("invalid").is_none());
        assert!(parse_time_str("00:00").is_none());
    }

    #[test]
    fn extract_value_works() {
        let line = "frame=  150 fps= 30.0 time=00:00:05.00 speed=1.50x";
        assert_eq!(extract_value(line, "frame=").unwrap(), "150");
        assert_eq!(extract_value(line, "time=").unwrap(), "00:00:05.00");
        assert!(extract_value(line, "missing=").is_none());
    }

    #[tokio::test]
    async fn stderr_reader_splits_carriage_returns() {
        let stderr: &[u8] = b"Input #0, mov\nframe=1 time=00:00:01.00 speed=1x\rframe=2 time=00:00:02.50 speed=1x\rConversion failed!\n";
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tail = read_stderr(stderr, tx).await;

        assert_eq!(rx.recv().await, Some(ExecutionEvent::Progress(TimeMs(1_000))));
        assert_eq!(rx.recv().await, Some(ExecutionEvent::Progress(TimeMs(2_500))));
        assert_eq!(rx.recv().await, None);
        assert_eq!(tail, "Input #0, mov\nConversion failed!");
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let executor = FfmpegExecutor::new("/nonexistent/splicer-ffmpeg");
        let cmd = FfmpegCommand::new(vec![], PathBuf::from("/out.mp4"), TimeMs::ZERO);
        assert!(matches!(
            executor.execute(cmd),
            Err(RenderError::FfmpegNotFound)
        ));
        assert_eq!(executor.running_count(), 0);
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_a_noop() {
        let executor = FfmpegExecutor::default();
        executor.cancel(CommandId(42));
        executor.cancel(CommandId(42));
        assert_eq!(executor.running_count(), 0);
    }

    /// Collect events of one run until `Finished`, skipping progress.
    #[cfg(unix)]
    async fn finished(rx: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Outcome {
        let wait = async {
            while let Some(event) = rx.recv().await {
                if let ExecutionEvent::Finished(outcome) = event {
                    return outcome;
                }
            }
            panic!("run ended without a result");
        };
        tokio::time::timeout(std::time::Duration::from_secs(10), wait)
            .await
            .expect("timed out waiting for the run to finish")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_kills_running_process() {
        let executor = FfmpegExecutor::new("sleep");
        let cmd = FfmpegCommand::new(vec!["30".to_string()], PathBuf::from("/out.mp4"), TimeMs::ZERO);
        let mut rx = executor.execute(cmd).unwrap();

        let Some(ExecutionEvent::Created(id)) = rx.recv().await else {
            panic!("expected Created first");
        };
        assert_eq!(executor.running_count(), 1);

        executor.cancel(id);
        assert_eq!(finished(&mut rx).await, Outcome::Canceled);
        assert_eq!(executor.running_count(), 0);
        assert_eq!(rx.recv().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_process_reports_stderr_tail() {
        let executor = FfmpegExecutor::new("sh");
        let args = vec![
            "-c".to_string(),
            "echo 'Invalid data found when processing input' >&2; exit 3".to_string(),
        ];
        let cmd = FfmpegCommand::new(args, PathBuf::from("/out.mp4"), TimeMs::ZERO);
        let mut rx = executor.execute(cmd).unwrap();

        let Outcome::Error(message) = finished(&mut rx).await else {
            panic!("expected an error outcome");
        };
        assert!(message.starts_with("ffmpeg exited with"), "{message}");
        assert!(message.contains('3'), "{message}");
        assert!(message.ends_with("Invalid data found when processing input"), "{message}");
        assert_eq!(executor.running_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_process_reports_output_path() {
        let executor = FfmpegExecutor::new("sh");
        let args = vec![
            "-c".to_string(),
            "printf 'frame=1 time=00:00:01.50 speed=1x\\r' >&2".to_string(),
        ];
        let cmd = FfmpegCommand::new(args, PathBuf::from("/out/joined.mp4"), TimeMs(3_000));
        let mut rx = executor.execute(cmd).unwrap();

        assert!(matches!(rx.recv().await, Some(ExecutionEvent::Created(_))));
        assert_eq!(rx.recv().await, Some(ExecutionEvent::Progress(TimeMs(1_500))));
        assert_eq!(
            rx.recv().await,
            Some(ExecutionEvent::Finished(Outcome::Success(PathBuf::from("/out/joined.mp4"))))
        );
        assert_eq!(executor.running_count(), 0);
    }
}
