//! Pure Rust engine built on the `image` crate.
//!
//! | Step | Implementation |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` with format sniffing |
//! | Shadow | translucent rectangle composited with `imageops::overlay` |
//! | Layout | solid canvases + `imageops::overlay`, see [`crate::layout`] |
//! | Blurred background | downscale, `imageops::blur`, upscale |
//! | Preview downscale | `imageops::resize` with `Triangle` filter |
//! | Encode | `JpegEncoder` at the configured quality, `PngEncoder` for PNG inputs |
//!
//! Text elements and logos are not drawn.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};
use semi_core::processing_config::{LayoutType, PreviewOptions, ProcessingConfig};

use crate::engine::{EngineError, ProcessError, ProcessingEngine};
use crate::layout;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const DARK_BAR: Rgba<u8> = Rgba([30, 30, 30, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 90]);

/// Prefix of preview output names.
const PREVIEW_PREFIX: &str = "preview_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Jpeg,
    Png,
}

/// Read only the header of `path` and return its dimensions.
///
/// Used to reject uploads that are not decodable images before a job is
/// created.
pub fn probe_image(path: &Path) -> Result<(u32, u32), image::ImageError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
}

/// The bundled engine.
#[derive(Debug, Default)]
pub struct ImageEngine;

impl ImageEngine {
    pub fn new() -> Self {
        tracing::warn!("Text overlay unavailable: element slots and logos will not be drawn");
        Self
    }
}

impl ProcessingEngine for ImageEngine {
    fn process_one(
        &self,
        input: &Path,
        config: &ProcessingConfig,
        output_dir: &Path,
        preview: Option<&PreviewOptions>,
    ) -> Result<PathBuf, ProcessError> {
        let photo = load_image(input)?;
        let mut canvas = render(photo.to_rgba8(), config);

        if let Some(options) = preview {
            let (w, h) = layout::fit_within(canvas.dimensions(), options.max_size);
            if (w, h) != canvas.dimensions() {
                canvas = imageops::resize(&canvas, w, h, FilterType::Triangle);
            }
        }

        let quality = preview.map_or(config.base.quality, |options| options.quality);
        let (output, format) = output_path(input, output_dir, preview.is_some())?;
        save(canvas, &output, format, quality)?;

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            "Image processed",
        );
        Ok(output)
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, ProcessError> {
    let name = display_name(path);
    ImageReader::open(path)
        .map_err(|e| ProcessError::input(format!("Cannot open {name}: {e}")))?
        .with_guessed_format()
        .map_err(|e| ProcessError::input(format!("Cannot read {name}: {e}")))?
        .decode()
        .map_err(|e| ProcessError::input(format!("Cannot decode {name}: {e}")))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Apply shadow, layout, margin and ratio padding in that order.
fn render(photo: RgbaImage, config: &ProcessingConfig) -> RgbaImage {
    let layout_type = config.layout.layout_type;
    let original = photo.dimensions();
    let background = parse_hex(&config.layout.background_color).unwrap_or(WHITE);

    let mut canvas = photo;
    if config.global.shadow.enable && layout_type != LayoutType::Square {
        canvas = add_shadow(&canvas, background);
    }

    canvas = match layout_type {
        LayoutType::WatermarkLeftLogo
        | LayoutType::WatermarkRightLogo
        | LayoutType::CustomWatermark => {
            let bar = layout::text_bar_height(canvas.dimensions());
            append_bar(&canvas, bar, background)
        }
        LayoutType::DarkWatermarkLeftLogo | LayoutType::DarkWatermarkRightLogo => {
            let bar = layout::text_bar_height(canvas.dimensions());
            append_bar(&canvas, bar, DARK_BAR)
        }
        LayoutType::Square => {
            let side = layout::square_canvas(canvas.dimensions());
            pad_to(&canvas, (side, side), background)
        }
        LayoutType::Simple => canvas,
        LayoutType::BackgroundBlur => blurred_background(&canvas),
        LayoutType::BackgroundBlurWithWhiteBorder => {
            let border = layout::blur_border(canvas.dimensions());
            blurred_background(&frame(&canvas, border, WHITE))
        }
        LayoutType::PureWhiteMargin => {
            let percent = config.global.white_margin.width.max(1);
            let margin = layout::white_margin(canvas.dimensions(), percent);
            frame(&canvas, margin, WHITE)
        }
    };

    let white_margin = config.global.white_margin;
    if white_margin.enable && layout_type.has_text_bar() {
        let margin = layout::white_margin(canvas.dimensions(), white_margin.width);
        canvas = frame(&canvas, margin, WHITE);
    }

    if config.global.padding_with_original_ratio.enable && layout_type != LayoutType::Square {
        let target = layout::pad_to_ratio(canvas.dimensions(), original);
        if target != canvas.dimensions() {
            canvas = pad_to(&canvas, target, background);
        }
    }

    canvas
}

/// `#rrggbb` to an opaque pixel.
fn parse_hex(color: &str) -> Option<Rgba<u8>> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

fn pad_to(img: &RgbaImage, (w, h): (u32, u32), color: Rgba<u8>) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(w, h, color);
    let (x, y) = layout::centre((w, h), img.dimensions());
    imageops::overlay(&mut canvas, img, x, y);
    canvas
}

fn frame(img: &RgbaImage, border: u32, color: Rgba<u8>) -> RgbaImage {
    if border == 0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    pad_to(img, (w + 2 * border, h + 2 * border), color)
}

fn append_bar(img: &RgbaImage, bar: u32, color: Rgba<u8>) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut canvas = RgbaImage::from_pixel(w, h + bar, color);
    imageops::overlay(&mut canvas, img, 0, 0);
    canvas
}

fn add_shadow(img: &RgbaImage, background: Rgba<u8>) -> RgbaImage {
    let (w, h) = img.dimensions();
    let spread = layout::shadow_spread((w, h));
    let mut canvas = RgbaImage::from_pixel(w + 2 * spread, h + 2 * spread, background);
    let shadow = RgbaImage::from_pixel(w, h, SHADOW);
    let offset = i64::from(spread + spread / 2);
    imageops::overlay(&mut canvas, &shadow, offset, offset);
    imageops::overlay(&mut canvas, img, i64::from(spread), i64::from(spread));
    canvas
}

fn blurred_background(img: &RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    let margin = layout::blur_margin((w, h));
    let (cw, ch) = (w + 2 * margin, h + 2 * margin);

    // Blur a small copy; blurring at full resolution is far too slow.
    let small = imageops::resize(img, (cw / 8).max(1), (ch / 8).max(1), FilterType::Triangle);
    let blurred = imageops::blur(&small, 4.0);
    let mut canvas = imageops::resize(&blurred, cw, ch, FilterType::Triangle);

    imageops::overlay(&mut canvas, img, i64::from(margin), i64::from(margin));
    canvas
}

/// Output keeps the input file name (PNG stays PNG, everything else is
/// written as JPEG). Preview outputs are prefixed.
fn output_path(
    input: &Path,
    output_dir: &Path,
    preview: bool,
) -> Result<(PathBuf, OutputFormat), ProcessError> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ProcessError::input(format!("Invalid file name: {}", input.display())))?;

    let format = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => OutputFormat::Png,
        _ => OutputFormat::Jpeg,
    };

    let file_name = if preview {
        format!("{PREVIEW_PREFIX}{name}")
    } else {
        name.to_string()
    };
    Ok((output_dir.join(file_name), format))
}

fn save(img: RgbaImage, path: &Path, format: OutputFormat, quality: u8) -> Result<(), EngineError> {
    let writer = BufWriter::new(File::create(path)?);
    let encoded = match format {
        OutputFormat::Png => DynamicImage::ImageRgba8(img).write_with_encoder(PngEncoder::new(writer)),
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
            DynamicImage::ImageRgb8(rgb)
                .write_with_encoder(JpegEncoder::new_with_quality(writer, quality))
        }
    };
    encoded.map_err(|e| EngineError::Encode(format!("{}: {e}", path.display())))
}
