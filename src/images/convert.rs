//! Vector-to-raster conversion for WMF/EMF payloads.
//!
//! No decoder handles every metafile, so backends are tried in order and the
//! first one that leaves a non-empty PNG at the target path wins. A failed
//! backend never leaves a partial file behind.
use crate::config::ConverterKind;
use crate::config::ExtractionConfig;
use crate::helpers::process::run_with_timeout;
use crate::helpers::process::ProcessOutcome;
use crate::images::ImageFormat;
use std::io;
#[cfg(unix)]
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

#[derive(Error, Debug)]
pub(crate) enum RasterizeError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Decode(#[from] image::ImageError),

    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),

    #[error("{0} exited with {1}")]
    Failed(String, String),

    #[error("{0} did not finish within {1} seconds")]
    TimedOut(String, u64),

    #[error("{0} produced no output")]
    NoOutput(String),

    #[error("no converter could rasterize the image")]
    Exhausted,
}

/// A backend that renders vector image bytes to a PNG file.
pub(crate) trait VectorRasterizer {
    fn name(&self) -> &'static str;

    /// Writes a PNG rendering of `data` to `output`
    ///
    /// # Arguments
    /// * `data` - Raw WMF/EMF bytes
    /// * `format` - Sniffed format, used for temporary file suffixes
    /// * `output` - Destination PNG path
    fn rasterize(&self, data: &[u8], format: ImageFormat, output: &Path) -> Result<(), RasterizeError>;
}

/// In-process decoding; only succeeds for payloads the `image` crate understands.
pub(crate) struct ImageDecoder;

impl VectorRasterizer for ImageDecoder {
    fn name(&self) -> &'static str {
        "image decoder"
    }

    fn rasterize(&self, data: &[u8], _format: ImageFormat, output: &Path) -> Result<(), RasterizeError> {
        let image = image::load_from_memory(data)?;
        image.save_with_format(output, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// ImageMagick `convert input output`, through a temporary input file.
pub(crate) struct ImageMagick {
    pub(crate) command: String,
    pub(crate) timeout: Duration,
}

impl VectorRasterizer for ImageMagick {
    fn name(&self) -> &'static str {
        "ImageMagick"
    }

    #[cfg(unix)]
    fn rasterize(&self, data: &[u8], format: ImageFormat, output: &Path) -> Result<(), RasterizeError> {
        let input = write_temp_input(data, format)?;
        let mut command = Command::new(&self.command);
        command.arg(input.path()).arg(output);
        match run_with_timeout(&mut command, self.timeout)? {
            ProcessOutcome::Exited(status) if status.success() => (),
            ProcessOutcome::Exited(status) => Err(RasterizeError::Failed(self.command.clone(), status.to_string()))?,
            ProcessOutcome::TimedOut => Err(RasterizeError::TimedOut(self.command.clone(), self.timeout.as_secs()))?,
        }
        ensure_output(output, &self.command)
    }

    #[cfg(not(unix))]
    fn rasterize(&self, _data: &[u8], _format: ImageFormat, _output: &Path) -> Result<(), RasterizeError> {
        Err(RasterizeError::Unsupported(self.name()))
    }
}

/// Headless LibreOffice `--convert-to png`, run inside a scratch directory.
pub(crate) struct LibreOffice {
    /// Binaries to try, in order, until one can be spawned
    pub(crate) commands: Vec<String>,
    pub(crate) timeout: Duration,
}

impl VectorRasterizer for LibreOffice {
    fn name(&self) -> &'static str {
        "LibreOffice"
    }

    fn rasterize(&self, data: &[u8], format: ImageFormat, output: &Path) -> Result<(), RasterizeError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join(format!("input.{}", format.extension()));
        std::fs::write(&input, data)?;

        let mut last_error = RasterizeError::Unsupported(self.name());
        for program in &self.commands {
            let mut command = Command::new(program);
            command
                .args(["--headless", "--convert-to", "png", "--outdir"])
                .arg(workdir.path())
                .arg(&input);
            match run_with_timeout(&mut command, self.timeout) {
                Ok(ProcessOutcome::Exited(status)) if status.success() => {
                    let produced = find_png(workdir.path())?.ok_or_else(|| RasterizeError::NoOutput(program.clone()))?;
                    std::fs::copy(&produced, output)?;
                    return ensure_output(output, program);
                }
                Ok(ProcessOutcome::Exited(status)) => return Err(RasterizeError::Failed(program.clone(), status.to_string())),
                Ok(ProcessOutcome::TimedOut) => return Err(RasterizeError::TimedOut(program.clone(), self.timeout.as_secs())),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    debug!("{} is not installed", program);
                    last_error = RasterizeError::Io(error);
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(last_error)
    }
}

/// Ordered backends; the first success wins.
pub(crate) struct ConversionChain {
    backends: Vec<Box<dyn VectorRasterizer>>,
}

impl ConversionChain {
    pub(crate) fn new(backends: Vec<Box<dyn VectorRasterizer>>) -> Self {
        ConversionChain { backends }
    }

    pub(crate) fn from_config(config: &ExtractionConfig) -> Self {
        let backends = config
            .vector_converters
            .iter()
            .map(|kind| -> Box<dyn VectorRasterizer> {
                match kind {
                    ConverterKind::ImageDecoder => Box::new(ImageDecoder),
                    ConverterKind::ImageMagick => Box::new(ImageMagick {
                        command: config.magick_command.clone(),
                        timeout: Duration::from_secs(config.magick_timeout_secs),
                    }),
                    ConverterKind::LibreOffice => Box::new(LibreOffice {
                        commands: config.office_commands.clone(),
                        timeout: Duration::from_secs(config.office_timeout_secs),
                    }),
                }
            })
            .collect();
        Self::new(backends)
    }

    /// Renders `data` to a PNG at `output`
    ///
    /// # Arguments
    /// * `data` - Raw vector image bytes
    /// * `format` - Sniffed format of `data`
    /// * `output` - Destination PNG path
    ///
    /// # Returns
    /// Name of the backend that succeeded; on failure nothing is left at `output`
    pub(crate) fn convert(&self, data: &[u8], format: ImageFormat, output: &Path) -> Result<&'static str, RasterizeError> {
        for backend in &self.backends {
            match backend.rasterize(data, format, output) {
                Ok(()) => {
                    debug!("Converted {:?} image with {}", format, backend.name());
                    return Ok(backend.name());
                }
                Err(error) => {
                    debug!("{} could not convert {:?} image: {}", backend.name(), format, error);
                    remove_partial(output);
                }
            }
        }
        warn!(
            "Failed to convert {:?} image to PNG; conversion needs ImageMagick or LibreOffice",
            format
        );
        Err(RasterizeError::Exhausted)
    }
}

#[cfg(unix)]
fn write_temp_input(data: &[u8], format: ImageFormat) -> Result<tempfile::NamedTempFile, RasterizeError> {
    let mut input = tempfile::Builder::new()
        .suffix(&format!(".{}", format.extension()))
        .tempfile()?;
    input.as_file_mut().write_all(data)?;
    input.as_file_mut().flush()?;
    Ok(input)
}

fn ensure_output(output: &Path, program: &str) -> Result<(), RasterizeError> {
    match std::fs::metadata(output) {
        Ok(metadata) if metadata.len() > 0 => Ok(()),
        _ => Err(RasterizeError::NoOutput(program.to_owned())),
    }
}

fn find_png(dir: &Path) -> io::Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|extension| extension.eq_ignore_ascii_case("png")).unwrap_or(false) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(error) = std::fs::remove_file(output) {
            warn!("Cannot remove partial output {}: {}", output.display(), error);
        }
    }
}
