//! Artifact capture: turning a realized [`RenderTree`] into final image
//! bytes through an ordered chain of fallible strategies.
//!
//! PNG runs the full chain: the vector strategy first (one paint model,
//! serialized to SVG or rasterized onto a bitmap), then the direct
//! rasterizer. A strategy failure, or a suspiciously small result, moves on
//! to the next strategy with a `warn!` only; the caller sees a plain
//! success as long as any strategy delivers. SVG has no raster fallback.

use std::io::Cursor;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::theme::{NodeKind, Rect, RenderNode, RenderTree};
use crate::{Error, Result};

/// Results smaller than this are treated as a failed strategy attempt.
/// A sanity check against truncated encodes, not a correctness guarantee.
pub const MIN_SANE_PNG_BYTES: usize = 1000;

/// Upper bound on waiting for font readiness before capture proceeds
/// regardless of outcome.
pub const FONT_WAIT_BOUND_MS: u64 = 1500;

/// Output format for one capture call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Png,
    Svg,
}

impl Format {
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Svg => "image/svg+xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Svg => "svg",
        }
    }
}

/// Parameters for one capture call. Never persisted.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// Background fill. `None` keeps PNG output transparent.
    pub background_color: Option<String>,
    pub format: Format,
}

/// Bounded waits executed before any strategy reads the tree, so the
/// theme's own fit passes can finish their asynchronous steps.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub font_wait_ms: u64,
    pub icon_font_wait_ms: u64,
    pub settle_ms: u64,
}

impl WaitPolicy {
    pub fn standard() -> Self {
        Self {
            font_wait_ms: FONT_WAIT_BOUND_MS,
            icon_font_wait_ms: 120,
            settle_ms: 180,
        }
    }

    /// No waiting at all; test use.
    pub fn none() -> Self {
        Self {
            font_wait_ms: 0,
            icon_font_wait_ms: 0,
            settle_ms: 0,
        }
    }
}

/// Run the pre-capture waits, always in the same order: embedded fonts
/// (bounded, proceeding regardless of outcome), icon-font faces, then one
/// frame tick plus the settle delay (clamped to 180..=700ms).
pub async fn settle(policy: &WaitPolicy) {
    // In-process trees have no async font pipeline; the bound still applies
    // so a hook that does wait can never stall capture.
    let font_bound = policy.font_wait_ms.min(FONT_WAIT_BOUND_MS);
    let _ = tokio::time::timeout(
        Duration::from_millis(font_bound),
        std::future::ready(()),
    )
    .await;

    if policy.icon_font_wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(policy.icon_font_wait_ms)).await;
    }

    if policy.settle_ms > 0 {
        // One paint-frame tick, then the settle delay.
        tokio::time::sleep(Duration::from_millis(16)).await;
        tokio::time::sleep(Duration::from_millis(policy.settle_ms.clamp(180, 700))).await;
    }
}

/// One technique for producing image bytes from a realized tree.
/// Strategies only read the tree; buffers they create are owned locals.
pub trait CaptureStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can emit the requested format.
    fn handles(&self, format: Format) -> bool;

    fn attempt(&self, tree: &RenderTree, opts: &CaptureOptions) -> Result<Vec<u8>>;
}

/// Ordered fallback chain over capture strategies.
pub struct Capturer {
    strategies: Vec<Box<dyn CaptureStrategy>>,
}

impl Capturer {
    /// The production chain: vector capture first, direct raster second.
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(VectorStrategy), Box::new(DirectRasterStrategy)],
        }
    }

    /// Custom chain, primarily for tests.
    pub fn with_strategies(strategies: Vec<Box<dyn CaptureStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain for the requested format.
    ///
    /// Every applicable strategy is attempted before the call fails; a
    /// fallback that succeeds is logged and otherwise invisible to the
    /// caller.
    pub fn capture(&self, tree: &RenderTree, opts: &CaptureOptions) -> Result<Vec<u8>> {
        let mut last_err: Option<Error> = None;
        let mut attempted = 0usize;

        for strategy in self.strategies.iter().filter(|s| s.handles(opts.format)) {
            attempted += 1;
            match strategy.attempt(tree, opts) {
                Ok(bytes) => {
                    if opts.format == Format::Png && bytes.len() < MIN_SANE_PNG_BYTES {
                        warn!(
                            "capture strategy '{}' produced a suspiciously small result ({} bytes); trying next",
                            strategy.name(),
                            bytes.len()
                        );
                        last_err = Some(Error::Render(format!(
                            "{}: output below {} byte sanity threshold",
                            strategy.name(),
                            MIN_SANE_PNG_BYTES
                        )));
                        continue;
                    }
                    if attempted > 1 {
                        warn!(
                            "capture degraded: strategy '{}' succeeded after {} failed attempt(s)",
                            strategy.name(),
                            attempted - 1
                        );
                    }
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!("capture strategy '{}' failed: {}", strategy.name(), e);
                    last_err = Some(e);
                }
            }
        }

        let detail = match last_err {
            Some(e) => e.to_string(),
            None => format!("no strategy handles {:?}", opts.format),
        };
        Err(Error::CaptureFailed(detail))
    }
}

impl Default for Capturer {
    fn default() -> Self {
        Self::new()
    }
}

// --- Paint model --------------------------------------------------------

/// Flat draw list shared by the vector strategy's two sinks.
#[derive(Debug, Clone, PartialEq)]
enum PaintCommand {
    Rect {
        rect: Rect,
        rgba: [u8; 4],
    },
    Text {
        x: f64,
        y: f64,
        size: f64,
        rgba: [u8; 4],
        text: String,
    },
}

fn flatten(node: &RenderNode, out: &mut Vec<PaintCommand>) {
    if !node.fill.is_empty() && node.kind != NodeKind::Root {
        out.push(PaintCommand::Rect {
            rect: node.rect,
            rgba: parse_color(&node.fill),
        });
    }
    if let Some(text) = &node.text {
        out.push(PaintCommand::Text {
            x: node.rect.x,
            y: node.rect.y + node.font_size,
            size: node.font_size,
            rgba: parse_color(&node.color),
            text: text.clone(),
        });
    }
    for child in &node.children {
        flatten(child, out);
    }
}

/// Parse `#rrggbb` / `#rgb`; unknown inputs paint opaque black.
fn parse_color(s: &str) -> [u8; 4] {
    let hex = s.trim().trim_start_matches('#');
    match hex.len() {
        6 => {
            let v = u32::from_str_radix(hex, 16).unwrap_or(0);
            [(v >> 16) as u8, (v >> 8) as u8, v as u8, 255]
        }
        3 => {
            let v = u32::from_str_radix(hex, 16).unwrap_or(0);
            let (r, g, b) = ((v >> 8) & 0xf, (v >> 4) & 0xf, v & 0xf);
            [(r * 17) as u8, (g * 17) as u8, (b * 17) as u8, 255]
        }
        _ => [0, 0, 0, 255],
    }
}

// --- Strategies ---------------------------------------------------------

/// Vector capture: one paint model, serialized to SVG markup. For PNG the
/// same model is rasterized onto an offscreen bitmap at the requested
/// pixel ratio, background filled first.
pub struct VectorStrategy;

impl CaptureStrategy for VectorStrategy {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn handles(&self, _format: Format) -> bool {
        true
    }

    fn attempt(&self, tree: &RenderTree, opts: &CaptureOptions) -> Result<Vec<u8>> {
        let mut commands = Vec::new();
        flatten(&tree.root, &mut commands);

        match opts.format {
            Format::Svg => Ok(serialize_svg(tree, &commands, opts).into_bytes()),
            Format::Png => rasterize(tree, &commands, opts),
        }
    }
}

/// Direct rasterizer: walks the live subtree and paints straight into the
/// bitmap, no vector intermediary. PNG only.
pub struct DirectRasterStrategy;

impl CaptureStrategy for DirectRasterStrategy {
    fn name(&self) -> &'static str {
        "direct-raster"
    }

    fn handles(&self, format: Format) -> bool {
        format == Format::Png
    }

    fn attempt(&self, tree: &RenderTree, opts: &CaptureOptions) -> Result<Vec<u8>> {
        let mut img = blank_bitmap(opts);
        let ratio = opts.pixel_ratio as f64 * tree.content_scale;
        paint_node(&mut img, &tree.root, ratio, center_offset(opts, tree.content_scale));
        encode_png(img)
    }
}

/// Horizontal offset, in output pixels, that re-centers shrunk content.
/// The embedded script scales about `top center`; the in-process sinks
/// must land on the same geometry.
fn center_offset(opts: &CaptureOptions, content_scale: f64) -> f64 {
    opts.width as f64 * opts.pixel_ratio as f64 * (1.0 - content_scale) / 2.0
}

fn paint_node(img: &mut image::RgbaImage, node: &RenderNode, ratio: f64, dx: f64) {
    if !node.fill.is_empty() && node.kind != NodeKind::Root {
        fill_rect(img, &node.rect, ratio, dx, parse_color(&node.fill));
    }
    if let Some(text) = &node.text {
        paint_text(
            img,
            node.rect.x,
            node.rect.y + node.font_size,
            node.font_size,
            ratio,
            dx,
            parse_color(&node.color),
            text,
        );
    }
    for child in &node.children {
        paint_node(img, child, ratio, dx);
    }
}

fn serialize_svg(tree: &RenderTree, commands: &[PaintCommand], opts: &CaptureOptions) -> String {
    let mut svg = format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" ",
            "viewBox=\"0 0 {w} {h}\" font-family=\"system-ui, sans-serif\">\n"
        ),
        w = tree.width,
        h = tree.height,
    );

    if let Some(bg) = &opts.background_color {
        svg.push_str(&format!(
            "<rect width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
            tree.width, tree.height, bg
        ));
    }

    // Scale about top center, matching the embedded script's
    // transform-origin.
    let tx = tree.width as f64 * (1.0 - tree.content_scale) / 2.0;
    svg.push_str(&format!(
        "<g transform=\"translate({:.1} 0) scale({})\">\n",
        tx, tree.content_scale
    ));

    for cmd in commands {
        match cmd {
            PaintCommand::Rect { rect, rgba } => {
                svg.push_str(&format!(
                    "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"12\" fill=\"{}\"/>\n",
                    rect.x, rect.y, rect.width, rect.height, css_color(*rgba)
                ));
            }
            PaintCommand::Text { x, y, size, rgba, text } => {
                svg.push_str(&format!(
                    "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" fill=\"{}\">{}</text>\n",
                    x, y, size, css_color(*rgba), crate::theme::escape_text(text)
                ));
            }
        }
    }

    svg.push_str("</g>\n</svg>\n");
    svg
}

fn css_color(rgba: [u8; 4]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgba[0], rgba[1], rgba[2])
}

fn rasterize(tree: &RenderTree, commands: &[PaintCommand], opts: &CaptureOptions) -> Result<Vec<u8>> {
    let mut img = blank_bitmap(opts);
    let ratio = opts.pixel_ratio as f64 * tree.content_scale;
    let dx = center_offset(opts, tree.content_scale);

    for cmd in commands {
        match cmd {
            PaintCommand::Rect { rect, rgba } => fill_rect(&mut img, rect, ratio, dx, *rgba),
            PaintCommand::Text { x, y, size, rgba, text } => {
                paint_text(&mut img, *x, *y, *size, ratio, dx, *rgba, text)
            }
        }
    }

    encode_png(img)
}

/// Fresh bitmap at output resolution with the background filled first.
/// Transparency is honored only when no background color was requested.
fn blank_bitmap(opts: &CaptureOptions) -> image::RgbaImage {
    let out_w = ((opts.width as f32 * opts.pixel_ratio).round() as u32).max(1);
    let out_h = ((opts.height as f32 * opts.pixel_ratio).round() as u32).max(1);
    let bg = match &opts.background_color {
        Some(color) => parse_color(color),
        None => [0, 0, 0, 0],
    };
    image::RgbaImage::from_pixel(out_w, out_h, image::Rgba(bg))
}

fn fill_rect(img: &mut image::RgbaImage, rect: &Rect, ratio: f64, dx: f64, rgba: [u8; 4]) {
    let x0 = (rect.x * ratio + dx).max(0.0) as u32;
    let y0 = (rect.y * ratio).max(0.0) as u32;
    let x1 = (((rect.x + rect.width) * ratio + dx).max(0.0) as u32).min(img.width());
    let y1 = (((rect.y + rect.height) * ratio) as u32).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, image::Rgba(rgba));
        }
    }
}

/// Glyph-box text painting: one filled box per character advance. The
/// bitmap sinks approximate glyph shapes; geometry, not typography, is
/// what the raster strategies guarantee.
fn paint_text(
    img: &mut image::RgbaImage,
    x: f64,
    baseline_y: f64,
    size: f64,
    ratio: f64,
    dx: f64,
    rgba: [u8; 4],
    text: &str,
) {
    let mut pen = x;
    for c in text.chars() {
        if c.is_whitespace() {
            pen += size * 0.3;
            continue;
        }
        let advance = crate::layout::measure_text_width(&c.to_string(), size as u32);
        let glyph = Rect {
            x: pen,
            y: baseline_y - size * 0.72,
            width: (advance - size * 0.08).max(1.0),
            height: size * 0.72,
        };
        fill_rect(img, &glyph, ratio, dx, rgba);
        pen += advance;
    }
}

fn encode_png(img: image::RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| Error::Render(format!("PNG encode failed: {}", e)))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Card, CardContent};
    use crate::theme::{Theme, ThemeRegistry};

    fn sample_tree() -> RenderTree {
        let cards = vec![
            Card::new("Alpha", "First thing", "bolt").unwrap(),
            Card::new("Beta", "Second thing", "database").unwrap(),
        ];
        let content = CardContent::new("Capture Me", cards).unwrap();
        ThemeRegistry::builtin()
            .get("classic")
            .unwrap()
            .render(&content, 1.0)
    }

    fn png_opts() -> CaptureOptions {
        CaptureOptions {
            width: 1920,
            height: 1080,
            pixel_ratio: 1.0,
            background_color: Some("#0f172a".into()),
            format: Format::Png,
        }
    }

    struct AlwaysFails;
    impl CaptureStrategy for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }
        fn handles(&self, _f: Format) -> bool {
            true
        }
        fn attempt(&self, _t: &RenderTree, _o: &CaptureOptions) -> Result<Vec<u8>> {
            Err(Error::Render("simulated failure".into()))
        }
    }

    struct TinyOutput;
    impl CaptureStrategy for TinyOutput {
        fn name(&self) -> &'static str {
            "tiny-output"
        }
        fn handles(&self, _f: Format) -> bool {
            true
        }
        fn attempt(&self, _t: &RenderTree, _o: &CaptureOptions) -> Result<Vec<u8>> {
            Ok(vec![0u8; 12])
        }
    }

    #[test]
    fn png_capture_yields_sane_bytes() {
        let bytes = Capturer::new().capture(&sample_tree(), &png_opts()).unwrap();
        assert!(bytes.len() >= MIN_SANE_PNG_BYTES);
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn svg_capture_serializes_content() {
        let opts = CaptureOptions {
            format: Format::Svg,
            ..png_opts()
        };
        let bytes = Capturer::new().capture(&sample_tree(), &opts).unwrap();
        let svg = String::from_utf8(bytes).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Capture Me"));
        assert!(svg.contains("Alpha"));
    }

    #[test]
    fn primary_failure_falls_back_silently() {
        let capturer = Capturer::with_strategies(vec![
            Box::new(AlwaysFails),
            Box::new(DirectRasterStrategy),
        ]);
        let bytes = capturer.capture(&sample_tree(), &png_opts()).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn tiny_primary_output_triggers_fallback() {
        let capturer = Capturer::with_strategies(vec![
            Box::new(TinyOutput),
            Box::new(DirectRasterStrategy),
        ]);
        let bytes = capturer.capture(&sample_tree(), &png_opts()).unwrap();
        assert!(bytes.len() >= MIN_SANE_PNG_BYTES);
    }

    #[test]
    fn total_failure_raises_capture_failed() {
        let capturer =
            Capturer::with_strategies(vec![Box::new(AlwaysFails), Box::new(AlwaysFails)]);
        let err = capturer.capture(&sample_tree(), &png_opts()).unwrap_err();
        assert!(matches!(err, Error::CaptureFailed(_)));
        assert!(err.to_string().contains("simulated failure"));
    }

    #[test]
    fn svg_has_no_raster_fallback() {
        let capturer = Capturer::with_strategies(vec![
            Box::new(AlwaysFails),
            Box::new(DirectRasterStrategy),
        ]);
        let opts = CaptureOptions {
            format: Format::Svg,
            ..png_opts()
        };
        // direct-raster does not handle svg, so the chain is the failing
        // strategy alone and the call must fail.
        assert!(capturer.capture(&sample_tree(), &opts).is_err());
    }

    /// A 100x100 tree at half content scale holding one full-width box.
    fn shrunk_tree() -> RenderTree {
        let card = RenderNode {
            kind: NodeKind::CardBox,
            rect: Rect {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 100.0,
            },
            text: None,
            font_size: 0.0,
            fill: "#ffffff".into(),
            color: String::new(),
            children: Vec::new(),
        };
        RenderTree {
            width: 100,
            height: 100,
            background: String::new(),
            content_scale: 0.5,
            title_font_size: 0,
            root: RenderNode {
                kind: NodeKind::Root,
                rect: Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 100.0,
                    height: 100.0,
                },
                text: None,
                font_size: 0.0,
                fill: String::new(),
                color: String::new(),
                children: vec![card],
            },
        }
    }

    #[test]
    fn shrunk_raster_content_is_horizontally_centered() {
        let opts = CaptureOptions {
            width: 100,
            height: 100,
            pixel_ratio: 1.0,
            background_color: None,
            format: Format::Png,
        };
        let bytes = DirectRasterStrategy.attempt(&shrunk_tree(), &opts).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // Half-scale full-width box must occupy x in 25..75, not 0..50.
        assert_eq!(img.get_pixel(10, 10).0[3], 0);
        assert_eq!(img.get_pixel(50, 10).0[3], 255);
        assert_eq!(img.get_pixel(90, 10).0[3], 0);
    }

    #[test]
    fn shrunk_svg_scales_about_top_center() {
        let tree = shrunk_tree();
        let mut commands = Vec::new();
        flatten(&tree.root, &mut commands);
        let opts = CaptureOptions {
            format: Format::Svg,
            background_color: None,
            ..png_opts()
        };
        let svg = serialize_svg(&tree, &commands, &opts);
        assert!(svg.contains("translate(25.0 0) scale(0.5)"));
    }

    #[test]
    fn no_background_keeps_transparency() {
        let opts = CaptureOptions {
            background_color: None,
            ..png_opts()
        };
        let img = blank_bitmap(&opts);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }

    #[tokio::test]
    async fn settle_completes_with_zero_policy() {
        settle(&WaitPolicy::none()).await;
    }
}
