use splicer_core::request::{Request, RequestKind, RequestPayload};
use splicer_render::compare::all_compatible;
use splicer_render::concat::synthesize_concat;
use splicer_render::encode::synthesize_encode;
use splicer_render::merge::synthesize_merge;
use splicer_render::probe::{probe_all, MediaProbe};
use splicer_render::FfmpegCommand;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Turns one kind of request into a runnable command.
///
/// Implementations block on probing; engines call them off the async runtime.
pub trait JobKind: Send + Sync + 'static {
    const KIND: RequestKind;

    fn synthesize(
        probe: &dyn MediaProbe,
        config: &EngineConfig,
        request: &Request,
    ) -> Result<FfmpegCommand>;
}

pub struct MergeJob;
pub struct ConcatJob;
pub struct EncodeJob;

/// Error for a request handed to the job of another kind.
pub(crate) fn wrong_kind(expected: RequestKind, request: &Request) -> EngineError {
    EngineError::InvalidInput(format!(
        "request {} is {}, expected {}",
        request.id,
        request.kind(),
        expected
    ))
}

impl JobKind for MergeJob {
    const KIND: RequestKind = RequestKind::Merge;

    fn synthesize(
        probe: &dyn MediaProbe,
        config: &EngineConfig,
        request: &Request,
    ) -> Result<FfmpegCommand> {
        let RequestPayload::Merge(data) = &request.payload else {
            return Err(wrong_kind(Self::KIND, request));
        };
        Ok(synthesize_merge(probe, data, &config.synthesis)?)
    }
}

impl JobKind for EncodeJob {
    const KIND: RequestKind = RequestKind::Encode;

    fn synthesize(
        probe: &dyn MediaProbe,
        config: &EngineConfig,
        request: &Request,
    ) -> Result<FfmpegCommand> {
        let RequestPayload::Encode(data) = &request.payload else {
            return Err(wrong_kind(Self::KIND, request));
        };
        Ok(synthesize_encode(probe, data, &config.synthesis)?)
    }
}

impl JobKind for ConcatJob {
    const KIND: RequestKind = RequestKind::Concat;

    fn synthesize(
        probe: &dyn MediaProbe,
        config: &EngineConfig,
        request: &Request,
    ) -> Result<FfmpegCommand> {
        let RequestPayload::Concat(data) = &request.payload else {
            return Err(wrong_kind(Self::KIND, request));
        };
        if data.inputs.is_empty() {
            return Err(EngineError::InvalidInput("no input files".to_string()));
        }
        let infos = probe_all(probe, &data.inputs)?;
        if !all_compatible(&infos) {
            return Err(EngineError::IncompatibleMedia(format!(
                "{} inputs do not share codecs, sizes and track layout",
                infos.len()
            )));
        }
        Ok(synthesize_concat(
            &infos,
            &data.output,
            &config.scratch_dir,
            &config.synthesis,
        )?)
    }
}
