//! Fallback-chain behavior of the artifact capturer.

use cardshot::capture::{
    CaptureOptions, CaptureStrategy, Capturer, DirectRasterStrategy, Format, VectorStrategy,
    MIN_SANE_PNG_BYTES,
};
use cardshot::content::{Card, CardContent};
use cardshot::theme::{RenderTree, ThemeRegistry};
use cardshot::{Error, Result};

fn tree() -> RenderTree {
    let cards = vec![
        Card::new("Ingest", "Readers stream rows in", "database").unwrap(),
        Card::new("Transform", "Rules rewrite <code>desc</code>", "bolt").unwrap(),
        Card::new("Publish", "Artifacts ship out", "send").unwrap(),
    ];
    let content = CardContent::new("Pipeline Overview", cards).unwrap();
    ThemeRegistry::builtin()
        .get("classic")
        .unwrap()
        .render(&content, 1.0)
}

fn opts(format: Format) -> CaptureOptions {
    CaptureOptions {
        width: 1920,
        height: 1080,
        pixel_ratio: 1.0,
        background_color: Some("#0f172a".into()),
        format,
    }
}

struct Exploding;

impl CaptureStrategy for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }
    fn handles(&self, _format: Format) -> bool {
        true
    }
    fn attempt(&self, _tree: &RenderTree, _opts: &CaptureOptions) -> Result<Vec<u8>> {
        Err(Error::Render("boom".into()))
    }
}

#[test]
fn default_chain_produces_png() {
    let bytes = Capturer::new().capture(&tree(), &opts(Format::Png)).unwrap();
    assert!(bytes.len() >= MIN_SANE_PNG_BYTES);
    assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[test]
fn forced_primary_failure_still_yields_bytes() {
    let capturer =
        Capturer::with_strategies(vec![Box::new(Exploding), Box::new(DirectRasterStrategy)]);
    let result = capturer.capture(&tree(), &opts(Format::Png));
    // The caller must see an ordinary success, never the primary's error.
    let bytes = result.expect("fallback must absorb the primary failure");
    assert!(!bytes.is_empty());
}

#[test]
fn exhausted_chain_fails_with_last_message() {
    let capturer = Capturer::with_strategies(vec![Box::new(Exploding), Box::new(Exploding)]);
    match capturer.capture(&tree(), &opts(Format::Png)) {
        Err(Error::CaptureFailed(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected CaptureFailed, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn svg_failure_is_terminal() {
    let capturer =
        Capturer::with_strategies(vec![Box::new(Exploding), Box::new(DirectRasterStrategy)]);
    assert!(capturer.capture(&tree(), &opts(Format::Svg)).is_err());
}

#[test]
fn vector_svg_embeds_card_text() {
    let bytes = VectorStrategy
        .attempt(&tree(), &opts(Format::Svg))
        .unwrap();
    let svg = String::from_utf8(bytes).unwrap();
    assert!(svg.contains("Pipeline Overview"));
    assert!(svg.contains("Ingest"));
    // Text nodes are escaped on the way into markup.
    assert!(svg.contains("&lt;code&gt;"));
}

#[test]
fn pixel_ratio_scales_output_dimensions() {
    let t = tree();
    let two = CaptureOptions {
        pixel_ratio: 2.0,
        ..opts(Format::Png)
    };
    let bytes = Capturer::new().capture(&t, &two).unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.width(), 3840);
    assert_eq!(img.height(), 2160);
}
