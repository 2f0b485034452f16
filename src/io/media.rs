use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::AudioSettings;
use crate::workflow::AudioProcessor;

/// Audio extraction and normalization through the `ffmpeg` binary
pub struct FfmpegAudioProcessor {
    ffmpeg: PathBuf,
    work_dir: PathBuf,
}

impl FfmpegAudioProcessor {
    /// Write intermediate audio files into `work_dir`
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_binary(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn output_path(&self, input: &Path, suffix: &str, settings: &AudioSettings) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.work_dir
            .join(format!("{}.{}.{}", stem, suffix, settings.format))
    }

    async fn run(&self, args: Vec<OsString>) -> Result<()> {
        debug!("Running {:?} {:?}", self.ffmpeg, args);
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run {:?}; is ffmpeg installed?", self.ffmpeg))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AudioProcessor for FfmpegAudioProcessor {
    async fn extract_audio(&self, video: &Path, settings: &AudioSettings) -> Result<PathBuf> {
        let output = self.output_path(video, "extracted", settings);
        self.run(ffmpeg_args(video, &output, settings, false)).await?;
        Ok(output)
    }

    async fn process_audio(&self, audio: &Path, settings: &AudioSettings) -> Result<PathBuf> {
        let output = self.output_path(audio, "normalized", settings);
        self.run(ffmpeg_args(audio, &output, settings, true)).await?;
        Ok(output)
    }
}

/// Command line for one ffmpeg invocation.
///
/// With `normalize` a loudness filter is applied; without it the audio track is
/// only demuxed and resampled.
pub fn ffmpeg_args(
    input: &Path,
    output: &Path,
    settings: &AudioSettings,
    normalize: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
        "-vn".into(),
        "-ac".into(),
        settings.channels.to_string().into(),
        "-ar".into(),
        settings.sample_rate.to_string().into(),
    ];

    if normalize {
        args.push("-af".into());
        args.push("loudnorm".into());
    }

    match settings.format.to_ascii_lowercase().as_str() {
        "wav" => {
            args.push("-c:a".into());
            args.push("pcm_s16le".into());
        }
        "flac" => {
            args.push("-c:a".into());
            args.push("flac".into());
        }
        "mp3" => {
            args.push("-c:a".into());
            args.push("libmp3lame".into());
            args.push("-q:a".into());
            args.push(settings.quality.vbr_quality().to_string().into());
        }
        _ => {
            args.push("-q:a".into());
            args.push(settings.quality.vbr_quality().to_string().into());
        }
    }

    args.push(output.as_os_str().to_owned());
    args
}
