use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use splicer_core::options::{EncodeVideoEntry, FrameRate, VideoCodec};
use splicer_core::request::{Request, RequestStatus};
use splicer_engine::{EngineConfig, EngineError, Splicer};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "splicer", about = "Merge, concatenate and re-encode videos with ffmpeg")]
struct Cli {
    /// JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print probed metadata of a file as JSON.
    Info { file: PathBuf },
    /// Check whether files can be concatenated without re-encoding.
    Compare {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a merge request.
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        video: VideoArgs,
        /// Process right away.
        #[arg(long)]
        run: bool,
    },
    /// Create a concat request.
    Concat {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        run: bool,
    },
    /// Create an encode request.
    Encode {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        video: VideoArgs,
        /// Video stream index to keep; repeat for several.
        #[arg(long = "video-track")]
        video_tracks: Vec<u32>,
        /// Audio stream index to keep; repeat for several.
        #[arg(long = "audio-track")]
        audio_tracks: Vec<u32>,
        #[arg(long)]
        run: bool,
    },
    /// List stored requests.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<RequestStatus>,
    },
    /// Print one request as JSON.
    Show { id: Uuid },
    /// Run a request. Ctrl-C cancels it.
    Process { id: Uuid },
    Delete { id: Uuid },
    /// Write a config file with every default spelled out.
    InitConfig { path: PathBuf },
}

impl Command {
    /// Whether this invocation executes requests. Only those reclaim records
    /// left PROCESSING, since other invocations may run beside a live one.
    fn runs_requests(&self) -> bool {
        match self {
            Command::Process { .. } => true,
            Command::Merge { run, .. } | Command::Concat { run, .. } | Command::Encode { run, .. } => {
                *run
            }
            _ => false,
        }
    }
}

#[derive(Debug, clap::Args)]
struct VideoArgs {
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long, value_parser = parse_frame_rate)]
    fps: Option<FrameRate>,
    #[arg(long, value_parser = parse_codec)]
    codec: Option<VideoCodec>,
}

fn parse_frame_rate(s: &str) -> Result<FrameRate, String> {
    s.parse::<u32>()
        .ok()
        .and_then(FrameRate::from_value)
        .ok_or_else(|| format!("unsupported frame rate {s}, expected 24, 25, 30, 50 or 60"))
}

fn parse_codec(s: &str) -> Result<VideoCodec, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown codec {s}"))
}

fn parse_status(s: &str) -> Result<RequestStatus, String> {
    serde_json::from_value(serde_json::Value::String(s.to_uppercase()))
        .map_err(|_| format!("unknown status {s}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Command::InitConfig { path } = &cli.command {
        EngineConfig::default().save_to_file(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    let splicer = if cli.command.runs_requests() {
        Splicer::open(config).await
    } else {
        Splicer::open_without_recovery(config)
    };
    let splicer = Arc::new(splicer.context("failed to open request store")?);

    match cli.command {
        Command::Info { file } => {
            let info = splicer.get_info(file).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Compare { files } => {
            let same = splicer.compare(files).await?;
            println!("{}", if same { "compatible" } else { "not compatible" });
        }
        Command::Merge {
            inputs,
            output,
            video,
            run,
        } => {
            let mut builder = splicer.merge_builder(inputs, output);
            if let Some(w) = video.width {
                builder = builder.width(w);
            }
            if let Some(h) = video.height {
                builder = builder.height(h);
            }
            if let Some(fps) = video.fps {
                builder = builder.frame_rate(fps);
            }
            if let Some(codec) = video.codec {
                builder = builder.codec(codec);
            }
            let request = builder.build().await?;
            created(&splicer, request, run).await?;
        }
        Command::Concat {
            inputs,
            output,
            run,
        } => {
            let request = splicer.concat_builder(inputs, output).build().await?;
            created(&splicer, request, run).await?;
        }
        Command::Encode {
            input,
            output,
            video,
            video_tracks,
            audio_tracks,
            run,
        } => {
            let entries = video_tracks
                .into_iter()
                .map(|entry_index| EncodeVideoEntry {
                    entry_index,
                    width: None,
                    height: None,
                })
                .collect();
            let mut builder = splicer
                .encode_builder(input, output)
                .video_tracks(entries)
                .audio_tracks(audio_tracks);
            if let Some(w) = video.width {
                builder = builder.width(w);
            }
            if let Some(h) = video.height {
                builder = builder.height(h);
            }
            if let Some(fps) = video.fps {
                builder = builder.frame_rate(fps);
            }
            if let Some(codec) = video.codec {
                builder = builder.codec(codec);
            }
            let request = builder.build().await?;
            created(&splicer, request, run).await?;
        }
        Command::List { status } => {
            for request in splicer.get_all_requests(status)? {
                println!("{}", summary(&request));
            }
        }
        Command::Show { id } => {
            let request = splicer.get_request(id)?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Command::Process { id } => process(&splicer, id).await?,
        Command::Delete { id } => {
            splicer.delete(id).await?;
            println!("deleted {id}");
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

async fn created(splicer: &Arc<Splicer>, request: Request, run: bool) -> anyhow::Result<()> {
    println!("{}", summary(&request));
    if run {
        process(splicer, request.id).await?;
    }
    Ok(())
}

/// Run `id` in the foreground, printing progress. Ctrl-C cancels the request.
async fn process(splicer: &Arc<Splicer>, id: Uuid) -> anyhow::Result<()> {
    let mut updates = splicer.stream_request(id);
    let mut task = tokio::spawn({
        let splicer = Arc::clone(splicer);
        async move { splicer.process(id).await }
    });
    let mut interrupted = false;
    let mut watching = true;

    let result = loop {
        tokio::select! {
            joined = &mut task => break joined.context("processing task panicked")?,
            update = updates.next(), if watching => match update {
                Some(Some(request)) if request.status == RequestStatus::Processing => {
                    eprint!("\r{:>6.1}%", request.progress * 100.0);
                }
                Some(_) => {}
                None => watching = false,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = splicer.cancel(id).await {
                    tracing::warn!(%id, "cancel failed: {}", e);
                }
            }
        }
    };
    eprintln!();

    match result {
        Ok(path) => {
            println!("completed {}", path.display());
            Ok(())
        }
        Err(EngineError::Canceled(_)) => {
            println!("canceled {id}");
            Ok(())
        }
        Err(e) => bail!("request {id} failed: {e}"),
    }
}

fn summary(request: &Request) -> String {
    let detail = match (&request.error_message, request.result_path()) {
        (Some(message), _) => message.clone(),
        (None, Some(path)) => path.display().to_string(),
        (None, None) => request.payload.output_path().display().to_string(),
    };
    format!(
        "{}  {:<6}  {:<10}  {:>5.1}%  {}",
        request.id,
        request.kind(),
        request.status,
        request.progress * 100.0,
        detail
    )
}
