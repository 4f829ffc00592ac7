//! Image normalisation: any supported image → PNG (or JPEG passed through).
//!
//! The page renderer only ever sees one of two encodings. PNG and JPEG bytes
//! are returned untouched; SVG is rasterised with resvg onto an opaque white
//! canvas; GIF, BMP, TIFF and WEBP are decoded and re-encoded as PNG at their
//! original size.
//!
//! Every failure here is an `Option::None`, never an error: the composer
//! treats "no bytes" as "omit this image" and keeps going.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// System fonts for `<text>` elements in SVG sources, loaded on first use.
static FONTDB: Lazy<Arc<resvg::usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = resvg::usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
});

/// Image encodings the normaliser recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Svg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl ImageKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "svg" => Some(ImageKind::Svg),
            "gif" => Some(ImageKind::Gif),
            "bmp" => Some(ImageKind::Bmp),
            "tif" | "tiff" => Some(ImageKind::Tiff),
            "webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse a declared media type such as `image/svg+xml`.
    pub fn from_media_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            "image/svg+xml" => Some(ImageKind::Svg),
            "image/gif" => Some(ImageKind::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageKind::Bmp),
            "image/tiff" => Some(ImageKind::Tiff),
            "image/webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    fn raster_format(self) -> Option<image::ImageFormat> {
        match self {
            ImageKind::Gif => Some(image::ImageFormat::Gif),
            ImageKind::Bmp => Some(image::ImageFormat::Bmp),
            ImageKind::Tiff => Some(image::ImageFormat::Tiff),
            ImageKind::Webp => Some(image::ImageFormat::WebP),
            ImageKind::Png | ImageKind::Jpeg | ImageKind::Svg => None,
        }
    }
}

/// Canvas bounds applied when rasterising SVG.
///
/// A source dimension below `small_threshold` is replaced by the matching
/// minimum; the result is then capped at the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvgSizePolicy {
    pub small_threshold: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SvgSizePolicy {
    fn default() -> Self {
        Self {
            small_threshold: 100,
            min_width: 200,
            min_height: 150,
            max_width: 2000,
            max_height: 2000,
        }
    }
}

/// Pixel canvas for an SVG with intrinsic size `width` × `height`.
///
/// Non-positive or non-finite bounds count as "below threshold", which yields
/// the minimum canvas.
pub fn svg_canvas_size(width: f32, height: f32, policy: &SvgSizePolicy) -> (u32, u32) {
    let fit = |v: f32, min: u32, max: u32| -> u32 {
        let px = if !v.is_finite() || v < policy.small_threshold as f32 {
            min
        } else {
            v.ceil() as u32
        };
        px.clamp(1, max.max(1))
    };
    (
        fit(width, policy.min_width, policy.max_width),
        fit(height, policy.min_height, policy.max_height),
    )
}

/// Normalise image bytes whose encoding is given by `kind`.
pub fn normalize(bytes: &[u8], kind: ImageKind, policy: &SvgSizePolicy) -> Option<Vec<u8>> {
    match kind {
        ImageKind::Png | ImageKind::Jpeg => Some(bytes.to_vec()),
        ImageKind::Svg => rasterize_svg(bytes, policy),
        other => {
            let format = other.raster_format()?;
            reencode_png(bytes, format)
        }
    }
}

/// Read `path` and normalise it, using the extension as the format hint.
pub fn normalize_file(path: &Path, policy: &SvgSizePolicy) -> Option<Vec<u8>> {
    let Some(kind) = ImageKind::from_path(path) else {
        warn!("Unsupported image format: {}", path.display());
        return None;
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("Cannot read image {}: {}", path.display(), e);
            return None;
        }
    };
    normalize(&bytes, kind, policy)
}

/// Decode a `data:<mime>;base64,<payload>` URI into its kind and bytes.
pub fn decode_data_uri(uri: &str) -> Option<(ImageKind, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let kind = ImageKind::from_media_type(mime)?;
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(cleaned.as_bytes()) {
        Ok(bytes) => Some((kind, bytes)),
        Err(e) => {
            warn!("Malformed base64 in data URI: {}", e);
            None
        }
    }
}

fn rasterize_svg(bytes: &[u8], policy: &SvgSizePolicy) -> Option<Vec<u8>> {
    use image::codecs::png::PngEncoder;
    use image::ImageEncoder;

    let opts = resvg::usvg::Options {
        fontdb: FONTDB.clone(),
        ..Default::default()
    };
    let tree = match resvg::usvg::Tree::from_data(bytes, &opts) {
        Ok(t) => t,
        Err(e) => {
            warn!("SVG parse failed: {}", e);
            return None;
        }
    };

    let size = tree.size();
    let (src_w, src_h) = (size.width(), size.height());
    let (width, height) = svg_canvas_size(src_w, src_h, policy);

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)?;
    pixmap.fill(resvg::tiny_skia::Color::from_rgba8(255, 255, 255, 255));

    let transform = if src_w > 0.0 && src_h > 0.0 {
        let scale = (width as f32 / src_w).min(height as f32 / src_h);
        resvg::tiny_skia::Transform::from_scale(scale, scale)
    } else {
        resvg::tiny_skia::Transform::default()
    };
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // The canvas is fully opaque, so premultiplied data equals straight RGBA.
    let mut png_buf = Vec::new();
    PngEncoder::new(&mut png_buf)
        .write_image(pixmap.data(), width, height, image::ExtendedColorType::Rgba8)
        .ok()?;

    debug!(
        "Rasterised SVG {}x{} → {}x{} px ({} bytes)",
        src_w,
        src_h,
        width,
        height,
        png_buf.len()
    );
    Some(png_buf)
}

fn reencode_png(bytes: &[u8], format: image::ImageFormat) -> Option<Vec<u8>> {
    let img = match image::load_from_memory_with_format(bytes, format) {
        Ok(img) => img,
        Err(e) => {
            warn!("Image decode failed ({:?}): {}", format, e);
            return None;
        }
    };
    let mut buf = Vec::new();
    if let Err(e) = img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png) {
        warn!("PNG re-encode failed: {}", e);
        return None;
    }
    debug!("Re-encoded {:?} {}x{} → PNG", format, img.width(), img.height());
    Some(buf)
}
