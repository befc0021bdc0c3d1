//! Deterministic layout fitting.
//!
//! The fitting algorithm is kept declarative: [`TitleFitSpec`] and
//! [`ViewportFitSpec`] are plain records, and there are two interpreters
//! over them. [`fit_title`]/[`fit_viewport`] run directly against measured
//! values; [`title_fit_script`]/[`viewport_fit_script`] lower the same
//! record to dependency-free script text that a browser (or a downloaded
//! standalone document) can execute with no runtime present. Because both
//! interpreters read the same record, the two environments cannot drift.

use serde::{Deserialize, Serialize};

/// Fixed intrinsic canvas all themes render into.
pub const CANVAS_WIDTH: u32 = 1920;
pub const CANVAS_HEIGHT: u32 = 1080;

/// Element ids the fit scripts address. Theme static markup must use these.
pub const TITLE_ELEMENT_ID: &str = "card-main-title";
pub const WRAPPER_ELEMENT_ID: &str = "card-content-wrapper";

/// Pixel budget the title must fit inside. Themes may override within the
/// 1600..=1700 band via [`compute_title_config`] overrides.
pub const DEFAULT_TITLE_WIDTH_BUDGET: u32 = 1648;

/// Vertical budget for the content wrapper: the 1080px canvas minus
/// reserved footer space.
pub const DEFAULT_HEIGHT_BUDGET: u32 = 1040;

/// Title auto-size configuration exposed in a [`LayoutPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleConfig {
    pub initial_font_size: u32,
    pub min_font_size: u32,
}

/// Deterministic layout plan for a given card count.
///
/// Pure function of the count: identical inputs always yield structurally
/// identical plans, in any execution environment. Freely cacheable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutPlan {
    pub wrapper_gap: u32,
    pub wrapper_padding_x: u32,
    pub container_gap: u32,
    pub card_padding: u32,
    pub card_width_class: &'static str,
    pub icon_size: u32,
    pub title_size_class: &'static str,
    pub desc_size_class: &'static str,
    pub title_config: TitleConfig,
}

/// Compute the layout plan for `card_count` cards.
///
/// Counts bucket as 1 / 2 / 3 / 4 / 5-6 / 7-8; anything past 8 clamps to
/// the densest bucket so the function stays total.
pub fn compute_layout(card_count: usize) -> LayoutPlan {
    match card_count {
        0 | 1 => LayoutPlan {
            wrapper_gap: 48,
            wrapper_padding_x: 120,
            container_gap: 0,
            card_padding: 48,
            card_width_class: "card-w-2of5",
            icon_size: 96,
            title_size_class: "title-xl",
            desc_size_class: "desc-lg",
            title_config: TitleConfig {
                initial_font_size: 96,
                min_font_size: 48,
            },
        },
        2 => LayoutPlan {
            wrapper_gap: 44,
            wrapper_padding_x: 96,
            container_gap: 48,
            card_padding: 40,
            card_width_class: "card-w-1of3",
            icon_size: 80,
            title_size_class: "title-xl",
            desc_size_class: "desc-lg",
            title_config: TitleConfig {
                initial_font_size: 88,
                min_font_size: 48,
            },
        },
        3 => LayoutPlan {
            wrapper_gap: 40,
            wrapper_padding_x: 80,
            container_gap: 40,
            card_padding: 36,
            card_width_class: "card-w-1of4",
            icon_size: 72,
            title_size_class: "title-lg",
            desc_size_class: "desc-md",
            title_config: TitleConfig {
                initial_font_size: 80,
                min_font_size: 44,
            },
        },
        4 => LayoutPlan {
            wrapper_gap: 36,
            wrapper_padding_x: 64,
            container_gap: 32,
            card_padding: 32,
            card_width_class: "card-w-1of4",
            icon_size: 64,
            title_size_class: "title-lg",
            desc_size_class: "desc-md",
            title_config: TitleConfig {
                initial_font_size: 72,
                min_font_size: 40,
            },
        },
        5 | 6 => LayoutPlan {
            wrapper_gap: 32,
            wrapper_padding_x: 56,
            container_gap: 28,
            card_padding: 28,
            card_width_class: "card-w-1of3",
            icon_size: 56,
            title_size_class: "title-md",
            desc_size_class: "desc-sm",
            title_config: TitleConfig {
                initial_font_size: 68,
                min_font_size: 40,
            },
        },
        _ => LayoutPlan {
            wrapper_gap: 28,
            wrapper_padding_x: 48,
            container_gap: 24,
            card_padding: 24,
            card_width_class: "card-w-1of4",
            icon_size: 48,
            title_size_class: "title-md",
            desc_size_class: "desc-sm",
            title_config: TitleConfig {
                initial_font_size: 64,
                min_font_size: 40,
            },
        },
    }
}

/// Optional per-theme overrides for [`compute_title_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleOverrides {
    pub initial_font_size: Option<u32>,
    pub min_font_size: Option<u32>,
    pub width_budget: Option<u32>,
}

/// Full declarative record for the title auto-size loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFitSpec {
    pub initial_size: u32,
    pub min_size: u32,
    pub width_budget: u32,
    pub step: u32,
    pub guard_limit: u32,
}

/// Declarative record for the viewport shrink pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportFitSpec {
    pub height_budget: u32,
    pub min_scale: f64,
}

impl Default for ViewportFitSpec {
    fn default() -> Self {
        Self {
            height_budget: DEFAULT_HEIGHT_BUDGET,
            min_scale: 0.6,
        }
    }
}

/// Title fit record for `card_count` cards, with optional theme overrides.
pub fn compute_title_config(card_count: usize, overrides: Option<TitleOverrides>) -> TitleFitSpec {
    let base = compute_layout(card_count).title_config;
    let ov = overrides.unwrap_or_default();
    TitleFitSpec {
        initial_size: ov.initial_font_size.unwrap_or(base.initial_font_size),
        min_size: ov.min_font_size.unwrap_or(base.min_font_size),
        width_budget: ov.width_budget.unwrap_or(DEFAULT_TITLE_WIDTH_BUDGET),
        step: 2,
        guard_limit: 100,
    }
}

/// How the title fit loop terminated. All three are valid outcomes, none
/// is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleFitTerminal {
    /// Measured width dropped inside the budget.
    Fit,
    /// The size floor was reached while still over budget.
    Floor,
    /// The guard counter tripped before fitting or flooring.
    GuardStop,
}

/// Result of one title fit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleFitOutcome {
    pub font_size: u32,
    pub terminal: TitleFitTerminal,
    pub iterations: u32,
}

/// Run the title fit loop against a caller-supplied width measurement.
///
/// Intentionally a linear decrement, not a binary search: the font size
/// must step down through the same sequence the embedded script walks.
/// Idempotent at the floor: re-running at `min_size` never shrinks further.
pub fn fit_title<F>(spec: &TitleFitSpec, mut measure: F) -> TitleFitOutcome
where
    F: FnMut(u32) -> f64,
{
    let mut size = spec.initial_size;
    let mut guard = 0u32;
    while measure(size) > spec.width_budget as f64 && size > spec.min_size && guard < spec.guard_limit
    {
        size = size.saturating_sub(spec.step).max(spec.min_size);
        guard += 1;
    }
    let terminal = if measure(size) <= spec.width_budget as f64 {
        TitleFitTerminal::Fit
    } else if size <= spec.min_size {
        TitleFitTerminal::Floor
    } else {
        TitleFitTerminal::GuardStop
    };
    TitleFitOutcome {
        font_size: size,
        terminal,
        iterations: guard,
    }
}

/// Run the viewport shrink pass against a measured content height.
///
/// Returns the uniform scale to apply, always in `[min_scale, 1.0]`.
/// Content that would need a scale below the floor keeps the floor scale
/// and is accepted as overflowing.
pub fn fit_viewport(spec: &ViewportFitSpec, measured_height: f64) -> f64 {
    if measured_height <= spec.height_budget as f64 || measured_height <= 0.0 {
        return 1.0;
    }
    (spec.height_budget as f64 / measured_height).max(spec.min_scale)
}

/// Approximate rendered width of `text` at `font_size` px.
///
/// Static advance-width table, the same trade the page-fill simulator
/// makes: exact glyph metrics are not needed to catch real overflows, and
/// a table keeps the measurement deterministic everywhere.
pub fn measure_text_width(text: &str, font_size: u32) -> f64 {
    let em: f64 = text.chars().map(char_advance_em).sum();
    em * font_size as f64
}

fn char_advance_em(c: char) -> f64 {
    match c {
        // CJK and fullwidth forms are square
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FF60}' => 1.0,
        ' ' => 0.3,
        'i' | 'j' | 'l' | '\'' | '.' | ',' | ':' | ';' | '|' | '!' => 0.28,
        'f' | 'r' | 't' | '(' | ')' | '[' | ']' | '-' => 0.36,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        'A'..='Z' => 0.66,
        '0'..='9' => 0.55,
        _ => 0.5,
    }
}

// --- Script lowering ---------------------------------------------------
//
// The lowered scripts are built from templates with token substitution so
// the emitted text carries the record's exact constants and nothing else:
// no helper bindings, no references back into the runtime that emitted
// them.

const TITLE_FIT_TEMPLATE: &str = r#"(function(){
  var el = document.getElementById('{{TITLE_ID}}');
  if (!el) return;
  var size = {{INITIAL}};
  var guard = 0;
  el.style.fontSize = size + 'px';
  while (el.scrollWidth > {{BUDGET}} && size > {{MIN}} && guard < {{GUARD}}) {
    size = Math.max(size - {{STEP}}, {{MIN}});
    el.style.fontSize = size + 'px';
    guard++;
  }
})();"#;

const VIEWPORT_FIT_TEMPLATE: &str = r#"(function(){
  var wrap = document.getElementById('{{WRAPPER_ID}}');
  if (!wrap) return;
  wrap.style.transform = '';
  var h = wrap.getBoundingClientRect().height;
  if (h > {{BUDGET}}) {
    var scale = Math.max({{MIN_SCALE}}, {{BUDGET}} / h);
    wrap.style.transform = 'scale(' + scale + ')';
    wrap.style.transformOrigin = 'top center';
  }
})();"#;

/// Lower a title fit record to self-contained script text.
pub fn title_fit_script(spec: &TitleFitSpec) -> String {
    TITLE_FIT_TEMPLATE
        .replace("{{TITLE_ID}}", TITLE_ELEMENT_ID)
        .replace("{{INITIAL}}", &spec.initial_size.to_string())
        .replace("{{BUDGET}}", &spec.width_budget.to_string())
        .replace("{{MIN}}", &spec.min_size.to_string())
        .replace("{{GUARD}}", &spec.guard_limit.to_string())
        .replace("{{STEP}}", &spec.step.to_string())
}

/// Lower a viewport fit record to self-contained script text.
pub fn viewport_fit_script(spec: &ViewportFitSpec) -> String {
    VIEWPORT_FIT_TEMPLATE
        .replace("{{WRAPPER_ID}}", WRAPPER_ELEMENT_ID)
        .replace("{{BUDGET}}", &spec.height_budget.to_string())
        .replace("{{MIN_SCALE}}", &format!("{}", spec.min_scale))
}

/// Bundle both fit passes into one embeddable procedure: wait for fonts
/// (bounded so a never-loading font cannot stall it), fit the title, let
/// the reflow settle, then shrink the viewport if needed.
pub fn fit_procedure_script(
    title: &TitleFitSpec,
    viewport: &ViewportFitSpec,
    settle_ms: u64,
) -> String {
    format!(
        r#"(function(){{
  function run(){{
    {title_fit}
    setTimeout(function(){{
      {viewport_fit}
    }}, {settle});
  }}
  var started = false;
  function kick(){{ if (!started) {{ started = true; run(); }} }}
  if (document.fonts && document.fonts.ready) {{
    document.fonts.ready.then(kick);
    setTimeout(kick, 1500);
  }} else {{
    kick();
  }}
}})();"#,
        title_fit = title_fit_script(title),
        viewport_fit = viewport_fit_script(viewport),
        settle = settle_ms,
    )
}
