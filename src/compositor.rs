//! Where acquired shots go.
//!
//! A [`Compositor`] receives each shot as an [`RgbImage`] together with its
//! slot number. [`ContactSheet`] lays shots out on a grid canvas and saves
//! it when the run ends; [`FrameFiles`] writes every shot to its own file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{GenericImage, Rgb, RgbImage, imageops::FilterType};
use log::{debug, warn};

use crate::conversion::resolve_ratio;
use crate::error::SnapError;

/// Default file name suffix for contact sheets.
pub const DEFAULT_SUFFIX: &str = "_thumb";

/// Default output image extension.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Canvas layout announced before the first shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasSpec {
    /// File name or label of the source.
    pub label: String,
    /// Grid columns; 0 in separate-file mode.
    pub columns: u32,
    /// Grid rows, or 0 when unknown in advance.
    pub rows: u32,
    /// Planned shots, or 0 when unknown in advance.
    pub shots: u32,
    /// Width of each shot.
    pub thumbnail_width: u32,
    /// Height of each shot.
    pub thumbnail_height: u32,
    /// Media duration covered by the canvas in milliseconds.
    pub duration_ms: i64,
}

/// Outcome announced after the last shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// File name or label of the source.
    pub label: String,
    /// Shots placed.
    pub taken: usize,
    /// Shots planned.
    pub planned: usize,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

/// Receives shots from a session.
pub trait Compositor {
    /// Prepare for the shots described by `canvas`.
    fn begin(&mut self, canvas: &CanvasSpec) -> Result<(), SnapError>;

    /// Store the shot for `slot`.
    fn place(&mut self, slot: u32, image: &RgbImage) -> Result<(), SnapError>;

    /// Attach a caption (the media timestamp) to the shot in `slot`.
    fn burn_in(&mut self, _slot: u32, _text: &str) -> Result<(), SnapError> {
        Ok(())
    }

    /// Finish the canvas.
    fn end(&mut self, summary: &RunSummary) -> Result<(), SnapError>;
}

/// Build `<dir>/<stem><suffix>.<extension>` for `input`.
///
/// Without `dir` the output lands next to the input.
///
/// # Example
///
/// ```
/// use std::path::Path;
///
/// use snapsheet::output_path;
///
/// let path = output_path(Path::new("/media/clip.mkv"), None, "_thumb", "jpg");
/// assert_eq!(path, Path::new("/media/clip_thumb.jpg"));
/// ```
pub fn output_path(input: &Path, dir: Option<&Path>, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let parent = dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    parent.join(format!("{stem}{suffix}.{extension}"))
}

/// A grid of shots saved as one image.
///
/// Gaps and the outer rim accept ratio values from
/// [`ratio`](crate::conversion::ratio), resolved against the thumbnail
/// width. Captions are collected per slot and exposed through
/// [`captions`](ContactSheet::captions); text is not rasterised.
#[derive(Debug)]
pub struct ContactSheet {
    output: PathBuf,
    gap: i32,
    rim: i32,
    background: Rgb<u8>,
    canvas: Option<CanvasSpec>,
    shots: BTreeMap<u32, RgbImage>,
    captions: BTreeMap<u32, String>,
    canvas_size: Option<(u32, u32)>,
}

impl ContactSheet {
    /// A sheet saved to `output` with 4 px gaps, no rim and a black
    /// background.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            gap: 4,
            rim: 0,
            background: Rgb([0, 0, 0]),
            canvas: None,
            shots: BTreeMap::new(),
            captions: BTreeMap::new(),
            canvas_size: None,
        }
    }

    /// Space between shots, absolute pixels or a ratio value.
    #[must_use]
    pub fn with_gap(mut self, gap: i32) -> Self {
        self.gap = gap;
        self
    }

    /// Border around the grid, absolute pixels or a ratio value.
    #[must_use]
    pub fn with_rim(mut self, rim: i32) -> Self {
        self.rim = rim;
        self
    }

    /// Canvas background colour.
    #[must_use]
    pub fn with_background(mut self, background: Rgb<u8>) -> Self {
        self.background = background;
        self
    }

    /// Where the sheet is saved.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Captions received so far, by slot.
    pub fn captions(&self) -> &BTreeMap<u32, String> {
        &self.captions
    }

    /// Size of the last rendered canvas.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.canvas_size
    }

    /// Compose the grid from the shots placed so far.
    pub fn render(&self) -> Option<RgbImage> {
        let canvas = self.canvas.as_ref()?;
        let last_slot = *self.shots.keys().next_back()?;
        let (width, height) = (canvas.thumbnail_width, canvas.thumbnail_height);
        let columns = canvas.columns.max(1);
        let cells = (last_slot + 1).max(canvas.shots);
        let rows = canvas.rows.max(cells.div_ceil(columns));

        let gap = resolve_ratio(self.gap, width as i32) as u32;
        let rim = resolve_ratio(self.rim, width as i32) as u32;
        let canvas_width = rim * 2 + columns * width + (columns - 1) * gap;
        let canvas_height = rim * 2 + rows * height + rows.saturating_sub(1) * gap;
        let mut sheet = RgbImage::from_pixel(canvas_width, canvas_height, self.background);

        for (&slot, shot) in &self.shots {
            let column = slot % columns;
            let row = slot / columns;
            if row >= rows {
                break;
            }
            let x = rim + column * (width + gap);
            let y = rim + row * (height + gap);
            let placed = if shot.dimensions() == (width, height) {
                sheet.copy_from(shot, x, y)
            } else {
                let resized = image::imageops::resize(shot, width, height, FilterType::Triangle);
                sheet.copy_from(&resized, x, y)
            };
            if let Err(error) = placed {
                warn!("Shot {slot} does not fit the canvas: {error}");
            }
        }
        Some(sheet)
    }
}

impl Compositor for ContactSheet {
    fn begin(&mut self, canvas: &CanvasSpec) -> Result<(), SnapError> {
        debug!(
            "Contact sheet {}x{} of {}x{} shots for {}",
            canvas.columns,
            canvas.rows,
            canvas.thumbnail_width,
            canvas.thumbnail_height,
            canvas.label
        );
        self.canvas = Some(canvas.clone());
        self.shots.clear();
        self.captions.clear();
        Ok(())
    }

    fn place(&mut self, slot: u32, image: &RgbImage) -> Result<(), SnapError> {
        self.shots.insert(slot, image.clone());
        Ok(())
    }

    fn burn_in(&mut self, slot: u32, text: &str) -> Result<(), SnapError> {
        self.captions.insert(slot, text.to_string());
        Ok(())
    }

    fn end(&mut self, summary: &RunSummary) -> Result<(), SnapError> {
        let Some(sheet) = self.render() else {
            warn!("No shots for {}, nothing saved", summary.label);
            return Ok(());
        };
        self.canvas_size = Some(sheet.dimensions());
        sheet.save(&self.output)?;
        debug!(
            "Saved {} of {} shots to {}",
            summary.taken,
            summary.planned,
            self.output.display()
        );
        Ok(())
    }
}

/// Every shot saved to its own numbered file.
#[derive(Debug)]
pub struct FrameFiles {
    directory: PathBuf,
    stem: String,
    extension: String,
    written: Vec<PathBuf>,
}

impl FrameFiles {
    /// Save shots as `<directory>/<stem>-<slot>.<extension>`.
    pub fn new(directory: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            stem: stem.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            written: Vec::new(),
        }
    }

    /// Image format extension, which also selects the encoder.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl Compositor for FrameFiles {
    fn begin(&mut self, _canvas: &CanvasSpec) -> Result<(), SnapError> {
        std::fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    fn place(&mut self, slot: u32, image: &RgbImage) -> Result<(), SnapError> {
        let path = self
            .directory
            .join(format!("{}-{slot:03}.{}", self.stem, self.extension));
        image.save(&path)?;
        self.written.push(path);
        Ok(())
    }

    fn end(&mut self, summary: &RunSummary) -> Result<(), SnapError> {
        debug!(
            "Wrote {} files for {}",
            self.written.len(),
            summary.label
        );
        Ok(())
    }
}
