//! Theme capability interface and registry.
//!
//! A theme is an opaque producer: give it validated [`CardContent`] and it
//! returns either a realized [`RenderTree`] (for in-process capture) or
//! static markup (for the headless service and downloaded documents). The
//! ~90 real presentation variants live outside this crate; the two themes
//! registered here exercise the pipeline and document the contract.

use std::collections::HashMap;
use std::sync::Arc;

use crate::content::CardContent;
use crate::layout::{
    self, compute_layout, compute_title_config, fit_title, fit_viewport, measure_text_width,
    LayoutPlan, ViewportFitSpec, CANVAS_HEIGHT, CANVAS_WIDTH, TITLE_ELEMENT_ID,
    WRAPPER_ELEMENT_ID,
};

/// Axis-aligned box in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What a node in the realized tree represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    MainTitle,
    CardBox,
    Icon,
    CardTitle,
    CardDesc,
}

/// One node of the realized visual tree. Capture strategies only read it.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub kind: NodeKind,
    pub rect: Rect,
    pub text: Option<String>,
    pub font_size: f64,
    /// CSS-style fill color, e.g. "#1e293b". Empty string means no fill.
    pub fill: String,
    /// Text color for text-bearing nodes.
    pub color: String,
    pub children: Vec<RenderNode>,
}

/// A fully realized visual tree at the canonical 1920x1080 canvas size.
#[derive(Debug, Clone)]
pub struct RenderTree {
    pub width: u32,
    pub height: u32,
    pub background: String,
    /// Uniform shrink applied by the viewport fit pass, in `[0.6, 1.0]`.
    pub content_scale: f64,
    /// Final title font size after the title fit loop.
    pub title_font_size: u32,
    pub root: RenderNode,
}

/// Closed capability interface over all theme variants.
pub trait Theme: Send + Sync {
    /// Stable identifier used in requests and filenames.
    fn id(&self) -> &str;

    /// Realize the content as a visual tree at the given scale.
    fn render(&self, content: &CardContent, scale: f64) -> RenderTree;

    /// Render the content as static markup addressable by the fit scripts.
    fn render_static(&self, content: &CardContent) -> String;

    /// Self-contained themes need no external stylesheet or font links in
    /// the downloaded document shell.
    fn is_self_contained(&self) -> bool {
        false
    }

    /// Whether the headless service may render this theme.
    fn is_headless_renderable(&self) -> bool {
        true
    }
}

/// Explicit theme registry, built once at startup and passed by reference.
/// Read-only after construction.
pub struct ThemeRegistry {
    themes: HashMap<String, Arc<dyn Theme>>,
}

impl ThemeRegistry {
    pub fn new() -> Self {
        Self {
            themes: HashMap::new(),
        }
    }

    /// Registry with the built-in sample themes.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(ClassicTheme));
        reg.register(Arc::new(MonoTheme));
        reg
    }

    pub fn register(&mut self, theme: Arc<dyn Theme>) {
        self.themes.insert(theme.id().to_string(), theme);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Theme>> {
        self.themes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.themes.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.themes.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for ThemeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Colors a palette-driven theme feeds into the shared tree builder.
struct Palette {
    background: &'static str,
    card_fill: &'static str,
    title_color: &'static str,
    text_color: &'static str,
    accent: &'static str,
}

/// Dark palette with an accent stripe; links external fonts.
pub struct ClassicTheme;

/// Monochrome palette; fully self-contained.
pub struct MonoTheme;

impl Theme for ClassicTheme {
    fn id(&self) -> &str {
        "classic"
    }

    fn render(&self, content: &CardContent, scale: f64) -> RenderTree {
        build_tree(content, scale, &CLASSIC_PALETTE)
    }

    fn render_static(&self, content: &CardContent) -> String {
        build_static_markup(content, &CLASSIC_PALETTE)
    }
}

impl Theme for MonoTheme {
    fn id(&self) -> &str {
        "mono"
    }

    fn render(&self, content: &CardContent, scale: f64) -> RenderTree {
        build_tree(content, scale, &MONO_PALETTE)
    }

    fn render_static(&self, content: &CardContent) -> String {
        build_static_markup(content, &MONO_PALETTE)
    }

    fn is_self_contained(&self) -> bool {
        true
    }
}

const CLASSIC_PALETTE: Palette = Palette {
    background: "#0f172a",
    card_fill: "#1e293b",
    title_color: "#f8fafc",
    text_color: "#cbd5e1",
    accent: "#38bdf8",
};

const MONO_PALETTE: Palette = Palette {
    background: "#ffffff",
    card_fill: "#f4f4f5",
    title_color: "#111111",
    text_color: "#333333",
    accent: "#111111",
};

/// Shared realization: layout plan -> title fit -> card grid -> viewport fit.
///
/// Runs the same declarative fit records the lowered script runs, so the
/// in-process tree and a browser-rendered document land on the same title
/// size and content scale for identical content.
fn build_tree(content: &CardContent, scale: f64, palette: &Palette) -> RenderTree {
    let plan = compute_layout(content.card_count());
    let title_spec = compute_title_config(content.card_count(), None);

    let title_fit = fit_title(&title_spec, |size| {
        measure_text_width(&content.main_title, size)
    });
    let title_size = title_fit.font_size as f64;

    let inner_width = (CANVAS_WIDTH - 2 * plan.wrapper_padding_x) as f64;
    let title_height = title_size * 1.25;
    let mut y = 96.0 + title_height + plan.wrapper_gap as f64;

    let mut root = RenderNode {
        kind: NodeKind::Root,
        rect: Rect {
            x: 0.0,
            y: 0.0,
            width: CANVAS_WIDTH as f64,
            height: CANVAS_HEIGHT as f64,
        },
        text: None,
        font_size: 0.0,
        fill: palette.background.to_string(),
        color: String::new(),
        children: Vec::new(),
    };

    root.children.push(RenderNode {
        kind: NodeKind::MainTitle,
        rect: Rect {
            x: plan.wrapper_padding_x as f64,
            y: 96.0,
            width: inner_width,
            height: title_height,
        },
        text: Some(content.main_title.clone()),
        font_size: title_size,
        fill: String::new(),
        color: palette.title_color.to_string(),
        children: Vec::new(),
    });

    // Cards flow in a single row up to 4, then wrap to a second row.
    let per_row = content.card_count().min(4).max(1);
    let gap = plan.container_gap as f64;
    let card_w = (inner_width - gap * (per_row as f64 - 1.0)) / per_row as f64;
    let card_h = card_height(&plan);

    for (i, card) in content.cards.iter().enumerate() {
        let row = i / per_row;
        let col = i % per_row;
        let x = plan.wrapper_padding_x as f64 + col as f64 * (card_w + gap);
        let cy = y + row as f64 * (card_h + gap);

        let pad = plan.card_padding as f64;
        let icon = plan.icon_size as f64;
        let title_fs = card_title_size(&plan);
        let desc_fs = card_desc_size(&plan);

        root.children.push(RenderNode {
            kind: NodeKind::CardBox,
            rect: Rect {
                x,
                y: cy,
                width: card_w,
                height: card_h,
            },
            text: None,
            font_size: 0.0,
            fill: palette.card_fill.to_string(),
            color: String::new(),
            children: vec![
                RenderNode {
                    kind: NodeKind::Icon,
                    rect: Rect {
                        x: x + pad,
                        y: cy + pad,
                        width: icon,
                        height: icon,
                    },
                    text: Some(card.icon.clone()),
                    font_size: icon,
                    fill: String::new(),
                    color: palette.accent.to_string(),
                    children: Vec::new(),
                },
                RenderNode {
                    kind: NodeKind::CardTitle,
                    rect: Rect {
                        x: x + pad,
                        y: cy + pad + icon + 16.0,
                        width: card_w - 2.0 * pad,
                        height: title_fs * 1.3,
                    },
                    text: Some(card.title.clone()),
                    font_size: title_fs,
                    fill: String::new(),
                    color: palette.title_color.to_string(),
                    children: Vec::new(),
                },
                RenderNode {
                    kind: NodeKind::CardDesc,
                    rect: Rect {
                        x: x + pad,
                        y: cy + pad + icon + 16.0 + title_fs * 1.3 + 12.0,
                        width: card_w - 2.0 * pad,
                        height: desc_fs * 2.8,
                    },
                    text: Some(card.desc.clone()),
                    font_size: desc_fs,
                    fill: String::new(),
                    color: palette.text_color.to_string(),
                    children: Vec::new(),
                },
            ],
        });
    }

    let rows = content.card_count().div_ceil(per_row);
    y += rows as f64 * card_h + (rows as f64 - 1.0) * gap;

    let content_scale = fit_viewport(&ViewportFitSpec::default(), y);

    // Realization happens at canonical canvas size; a non-unit scale then
    // multiplies all geometry uniformly (the live-element export path uses
    // this to match on-screen pixels).
    let s = scale.clamp(0.1, 4.0);
    if (s - 1.0).abs() > f64::EPSILON {
        scale_node(&mut root, s);
    }

    RenderTree {
        width: (CANVAS_WIDTH as f64 * s).round() as u32,
        height: (CANVAS_HEIGHT as f64 * s).round() as u32,
        background: palette.background.to_string(),
        content_scale,
        title_font_size: title_fit.font_size,
        root,
    }
}

fn scale_node(node: &mut RenderNode, s: f64) {
    node.rect.x *= s;
    node.rect.y *= s;
    node.rect.width *= s;
    node.rect.height *= s;
    node.font_size *= s;
    for child in &mut node.children {
        scale_node(child, s);
    }
}

fn card_height(plan: &LayoutPlan) -> f64 {
    (plan.icon_size + plan.card_padding * 2) as f64
        + card_title_size(plan) * 1.3
        + card_desc_size(plan) * 2.8
        + 28.0
}

fn card_title_size(plan: &LayoutPlan) -> f64 {
    match plan.title_size_class {
        "title-xl" => 40.0,
        "title-lg" => 34.0,
        _ => 28.0,
    }
}

fn card_desc_size(plan: &LayoutPlan) -> f64 {
    match plan.desc_size_class {
        "desc-lg" => 26.0,
        "desc-md" => 22.0,
        _ => 18.0,
    }
}

/// Static markup with the element ids the fit scripts address. The desc
/// field is inserted as-is: its tag subset was enforced at construction.
fn build_static_markup(content: &CardContent, palette: &Palette) -> String {
    let plan = compute_layout(content.card_count());
    let title_spec = compute_title_config(content.card_count(), None);

    let mut cards = String::new();
    for card in &content.cards {
        cards.push_str(&format!(
            concat!(
                "<div class=\"card\" style=\"padding:{pad}px\">",
                "<span class=\"icon\" style=\"font-size:{icon}px\">{icon_name}</span>",
                "<h2>{title}</h2><p>{desc}</p></div>"
            ),
            pad = plan.card_padding,
            icon = plan.icon_size,
            icon_name = escape_text(&card.icon),
            title = escape_text(&card.title),
            desc = card.desc,
        ));
    }

    format!(
        concat!(
            "<div id=\"{wrapper_id}\" style=\"width:{w}px;min-height:{h}px;",
            "background:{bg};color:{fg};padding:96px {px}px;box-sizing:border-box\">",
            "<h1 id=\"{title_id}\" style=\"font-size:{title_fs}px;color:{title_color};",
            "white-space:nowrap\">{title}</h1>",
            "<div class=\"cards\" style=\"display:flex;flex-wrap:wrap;gap:{gap}px;",
            "margin-top:{wgap}px\">{cards}</div></div>"
        ),
        wrapper_id = WRAPPER_ELEMENT_ID,
        w = CANVAS_WIDTH,
        h = layout::DEFAULT_HEIGHT_BUDGET,
        bg = palette.background,
        fg = palette.text_color,
        px = plan.wrapper_padding_x,
        title_id = TITLE_ELEMENT_ID,
        title_fs = title_spec.initial_size,
        title_color = palette.title_color,
        title = escape_text(&content.main_title),
        gap = plan.container_gap,
        wgap = plan.wrapper_gap,
        cards = cards,
    )
}

/// Escape text nodes for markup insertion.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
