//! Small AST for ffmpeg filter graphs.
//!
//! Synthesizers assemble [`FilterChain`]s and only flatten them to the
//! `-filter_complex` text at the very end, so the layout of a graph can be
//! inspected in tests without parsing ffmpeg syntax.

use splicer_core::types::TimeMs;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Fit inside `width`x`height` keeping the aspect ratio.
    Scale { width: u32, height: u32 },
    /// Center on a `width`x`height` canvas.
    Pad { width: u32, height: u32 },
    SetSar,
    /// Solid color video source.
    Color {
        color: String,
        width: u32,
        height: u32,
        duration: TimeMs,
    },
    /// Silence source.
    AEvalSrc { sample_rate: u32, duration: TimeMs },
    AFormat {
        sample_format: String,
        sample_rate: u32,
        channel_layout: String,
    },
    Concat { segments: usize, kind: StreamKind },
}

impl Filter {
    pub fn is_source(&self) -> bool {
        matches!(self, Filter::Color { .. } | Filter::AEvalSrc { .. })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scale { width: w, height: h } => write!(
                f,
                "scale='if(gt(iw/ih,{w}/{h}),{w},-2)':'if(gt(iw/ih,{w}/{h}),-2,{h})'"
            ),
            Filter::Pad { width, height } => {
                write!(f, "pad={width}:{height}:(ow-iw)/2:(oh-ih)/2")
            }
            Filter::SetSar => f.write_str("setsar=1"),
            Filter::Color {
                color,
                width,
                height,
                duration,
            } => write!(
                f,
                "color=c={color}:s={width}x{height}:d={}",
                duration.to_ffmpeg()
            ),
            Filter::AEvalSrc {
                sample_rate,
                duration,
            } => write!(f, "aevalsrc=0:s={sample_rate}:d={}", duration.to_ffmpeg()),
            Filter::AFormat {
                sample_format,
                sample_rate,
                channel_layout,
            } => write!(
                f,
                "aformat=sample_fmts={sample_format}:sample_rates={sample_rate}:channel_layouts={channel_layout}"
            ),
            Filter::Concat { segments, kind } => {
                let (v, a) = match kind {
                    StreamKind::Video => (1, 0),
                    StreamKind::Audio => (0, 1),
                };
                write!(f, "concat=n={segments}:v={v}:a={a}")
            }
        }
    }
}

/// `[in...]filter,filter[out]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub output: String,
}

impl FilterChain {
    pub fn new(inputs: Vec<String>, filters: Vec<Filter>, output: impl Into<String>) -> Self {
        Self {
            inputs,
            filters,
            output: output.into(),
        }
    }

    /// A chain starting from a source filter, with no input pads.
    pub fn source(filter: Filter, output: impl Into<String>) -> Self {
        Self::new(Vec::new(), vec![filter], output)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        write!(f, "[{}]", self.output)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chain producing the pad `label`.
    pub fn producer(&self, label: &str) -> Option<&FilterChain> {
        self.chains.iter().find(|c| c.output == label)
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}
