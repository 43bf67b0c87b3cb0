//! FFmpeg argument construction.
//!
//! [`CommandBuilder::build`] is a pure function from (operation, inputs,
//! output, parameters) to an [`FfmpegInvocation`]; it performs no I/O, so
//! the same request always produces the same argument vector.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vproc_models::{OperationType, ProcessingParams};

use crate::error::{MediaError, MediaResult};

/// Flags prepended to every invocation: overwrite the output and keep the
/// transcoder quiet so stderr carries only real errors.
const BASE_ARGS: &[&str] = &["-y", "-hide_banner", "-loglevel", "error"];

/// Offset of a watermark overlay from the bottom-right corner, in pixels.
const WATERMARK_MARGIN: u32 = 20;

/// One ready-to-run transcoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInvocation {
    /// Binary to spawn
    pub binary: PathBuf,
    /// Full argument vector, output path last
    pub args: Vec<String>,
}

impl FfmpegInvocation {
    /// Render the invocation for logging.
    pub fn display(&self) -> String {
        format!("{} {}", self.binary.display(), self.args.join(" "))
    }
}

/// Builds transcoder invocations for every operation type.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    binary: PathBuf,
    default_quality: String,
    quality_presets: HashMap<String, String>,
}

impl CommandBuilder {
    /// Create a builder for the given binary and default quality preset.
    pub fn new(binary: impl Into<PathBuf>, default_quality: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            default_quality: default_quality.into(),
            quality_presets: HashMap::new(),
        }
    }

    /// Map quality names to encoder presets (unknown names pass through).
    pub fn with_quality_presets(mut self, presets: HashMap<String, String>) -> Self {
        self.quality_presets = presets;
        self
    }

    /// Resolve the encoder preset for a requested quality.
    fn preset(&self, quality: Option<&str>) -> String {
        let quality = quality.unwrap_or(&self.default_quality);
        self.quality_presets
            .get(quality)
            .cloned()
            .unwrap_or_else(|| quality.to_string())
    }

    /// Build the invocation for a job.
    pub fn build(
        &self,
        operation: OperationType,
        inputs: &[PathBuf],
        output: &Path,
        params: &ProcessingParams,
    ) -> MediaResult<FfmpegInvocation> {
        validate(operation, inputs.len(), params)?;

        let mut args: Vec<String> = BASE_ARGS.iter().map(|s| s.to_string()).collect();

        match operation {
            OperationType::Merge => self.build_merge(&mut args, inputs, params),
            OperationType::Convert => {
                self.build_encode(&mut args, &inputs[0], params, FilterOrder::ScaleThenCrop)
            }
            OperationType::Compress => {
                self.build_encode(&mut args, &inputs[0], params, FilterOrder::CropThenScale)
            }
            OperationType::Trim => build_trim(&mut args, &inputs[0], params),
            OperationType::ExtractAudio => build_extract_audio(&mut args, &inputs[0]),
            OperationType::AddWatermark => self.build_watermark(&mut args, &inputs[0], params),
        }

        args.push(path_arg(output));

        Ok(FfmpegInvocation {
            binary: self.binary.clone(),
            args,
        })
    }

    /// Concatenate every input's video+audio pair through one concat node.
    /// A single input is a valid degenerate concat.
    fn build_merge(&self, args: &mut Vec<String>, inputs: &[PathBuf], params: &ProcessingParams) {
        for input in inputs {
            args.push("-i".to_string());
            args.push(path_arg(input));
        }

        let mut graph = String::new();
        for index in 0..inputs.len() {
            graph.push_str(&format!("[{index}:v][{index}:a]"));
        }
        graph.push_str(&format!("concat=n={}:v=1:a=1[outv][outa]", inputs.len()));

        args.extend([
            "-filter_complex".to_string(),
            graph,
            "-map".to_string(),
            "[outv]".to_string(),
            "-map".to_string(),
            "[outa]".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset(params.quality.as_deref()),
            "-c:a".to_string(),
            "aac".to_string(),
        ]);
    }

    /// Shared Convert/Compress path. The two operations differ only in
    /// filter order: Convert scales then crops, Compress crops then scales.
    /// The orders produce different frames and are kept distinct on purpose.
    fn build_encode(
        &self,
        args: &mut Vec<String>,
        input: &Path,
        params: &ProcessingParams,
        order: FilterOrder,
    ) {
        args.push("-i".to_string());
        args.push(path_arg(input));

        let scale = params
            .resolution
            .as_deref()
            .map(|resolution| format!("scale={resolution}"));
        let crop = params.has_crop().then(|| {
            format!(
                "crop={}:{}:{}:{}",
                params.crop_width.unwrap_or(0),
                params.crop_height.unwrap_or(0),
                params.crop_x.unwrap_or(0),
                params.crop_y.unwrap_or(0),
            )
        });

        let filters: Vec<String> = match order {
            FilterOrder::ScaleThenCrop => [scale, crop],
            FilterOrder::CropThenScale => [crop, scale],
        }
        .into_iter()
        .flatten()
        .collect();

        if !filters.is_empty() {
            args.push("-vf".to_string());
            args.push(filters.join(","));
        }

        if let Some(kbps) = params.bitrate_kbps {
            args.push("-b:v".to_string());
            args.push(format!("{kbps}k"));
        }

        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset(params.quality.as_deref()),
        ]);
    }

    /// Overlay an image (second input) or drawn text in the bottom-right
    /// corner; audio is stream-copied.
    fn build_watermark(&self, args: &mut Vec<String>, input: &Path, params: &ProcessingParams) {
        args.push("-i".to_string());
        args.push(path_arg(input));

        if let Some(image) = params.watermark_image.as_deref() {
            args.push("-i".to_string());
            args.push(image.to_string());
            args.push("-filter_complex".to_string());
            args.push(format!(
                "[0:v][1:v]overlay=W-w-{m}:H-h-{m}:format=auto",
                m = WATERMARK_MARGIN
            ));
        } else if let Some(text) = params.watermark_text.as_deref() {
            args.push("-vf".to_string());
            args.push(format!(
                "drawtext=text='{}':fontcolor=white:fontsize=24:box=1:boxcolor=black@0.4:x=w-tw-{m}:y=h-th-{m}",
                escape_filter_text(text),
                m = WATERMARK_MARGIN
            ));
        }

        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset(params.quality.as_deref()),
            "-c:a".to_string(),
            "copy".to_string(),
        ]);
    }
}

enum FilterOrder {
    ScaleThenCrop,
    CropThenScale,
}

/// Stream-copy trim: `-ss <start> -t <end - start> -c copy`.
fn build_trim(args: &mut Vec<String>, input: &Path, params: &ProcessingParams) {
    // validate() has already guaranteed both times are present and ordered.
    let start = params.start_time.unwrap_or(0.0);
    let end = params.end_time.unwrap_or(0.0);

    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-ss".to_string(),
        format!("{start:.3}"),
        "-t".to_string(),
        format!("{:.3}", end - start),
        "-c".to_string(),
        "copy".to_string(),
    ]);
}

fn build_extract_audio(args: &mut Vec<String>, input: &Path) {
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-vn".to_string(),
        "-acodec".to_string(),
        "copy".to_string(),
    ]);
}

/// Check that an operation has the inputs and parameters it requires.
///
/// Exposed separately so job submission can reject a bad request before a
/// job record ever exists; `build` re-runs the same checks.
pub fn validate(
    operation: OperationType,
    input_count: usize,
    params: &ProcessingParams,
) -> MediaResult<()> {
    if input_count == 0 {
        return Err(MediaError::invalid_operation(format!(
            "No input files provided for {operation} operation"
        )));
    }

    match operation {
        OperationType::Trim => {
            let (start, end) = match (params.start_time, params.end_time) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(MediaError::invalid_operation(
                        "Trim operation requires start_time and end_time",
                    ))
                }
            };
            if end <= start {
                return Err(MediaError::invalid_operation(
                    "Trim end_time must be greater than start_time",
                ));
            }
        }
        OperationType::AddWatermark => {
            if params.watermark_text.is_none() && params.watermark_image.is_none() {
                return Err(MediaError::invalid_operation(
                    "Watermark operation requires watermark_text or watermark_image",
                ));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Paths go into the argument vector as single entries; no shell is
/// involved, so no quoting is needed or wanted.
fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Escape characters that terminate or alter a drawtext filter expression.
fn escape_filter_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}
