//! Isolated headless render service.
//!
//! Reconstructs a themed document offscreen in a real browser engine,
//! waits for settlement, captures the fixed 1920x1080 region, and returns
//! PNG bytes. Validation runs before anything is spawned; each request
//! gets its own short-lived browser process whose teardown is guaranteed
//! on every exit path. No pooling: one hung render cannot starve others.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::content::{normalize_icon, Card, CardContent, MAX_CARDS};
use crate::layout::{
    compute_title_config, fit_procedure_script, ViewportFitSpec, CANVAS_HEIGHT, CANVAS_WIDTH,
    TITLE_ELEMENT_ID, WRAPPER_ELEMENT_ID,
};
use crate::theme::{Theme, ThemeRegistry};
use crate::{Error, Result};

/// Hard bound on the offscreen document load. Exceeding it is an
/// [`Error::UpstreamTimeout`], never retried.
pub const PAGE_LOAD_TIMEOUT_MS: u64 = 12_000;

/// Delay after navigation for the injected fit procedure to run.
pub const SETTLE_DELAY_MS: u64 = 180;

/// Wire request for one headless render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub template_id: String,
    pub main_title: String,
    pub cards: Vec<CardSpec>,
    /// Device scale factor, 1 or 2. Omitted means 1.
    #[serde(default)]
    pub dpr: Option<u8>,
}

/// Card fields as they arrive on the wire, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSpec {
    pub title: String,
    pub desc: String,
    pub icon: String,
}

/// Structured error body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderError {
    pub error: String,
}

/// A request that passed validation: resolved theme, normalized content,
/// defaulted dpr.
pub struct ValidatedRender {
    pub theme: Arc<dyn Theme>,
    pub content: CardContent,
    pub dpr: u8,
}

impl std::fmt::Debug for ValidatedRender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedRender")
            .field("theme", &self.theme.id())
            .field("content", &self.content)
            .field("dpr", &self.dpr)
            .finish()
    }
}

/// Validate a wire request against the registry and the content
/// invariants. Icons are normalized with silent fallback; everything else
/// that fails is a [`Error::Validation`]. Runs before any process launch.
pub fn validate(req: &RenderRequest, registry: &ThemeRegistry) -> Result<ValidatedRender> {
    let theme = registry
        .get(&req.template_id)
        .ok_or_else(|| Error::Validation(format!("unknown template '{}'", req.template_id)))?;
    if !theme.is_headless_renderable() {
        return Err(Error::Validation(format!(
            "template '{}' cannot be rendered headlessly",
            req.template_id
        )));
    }

    if req.main_title.trim().is_empty() {
        return Err(Error::Validation("mainTitle must not be empty".into()));
    }
    if req.cards.is_empty() || req.cards.len() > MAX_CARDS {
        return Err(Error::Validation(format!(
            "cards length must be between 1 and {}, got {}",
            MAX_CARDS,
            req.cards.len()
        )));
    }

    let mut cards = Vec::with_capacity(req.cards.len());
    for (i, spec) in req.cards.iter().enumerate() {
        if spec.title.trim().is_empty() {
            return Err(Error::Validation(format!("cards[{}].title is empty", i)));
        }
        if spec.desc.trim().is_empty() {
            return Err(Error::Validation(format!("cards[{}].desc is empty", i)));
        }
        let card = Card::new(&spec.title, &spec.desc, &normalize_icon(&spec.icon))
            .map_err(|e| Error::Validation(format!("cards[{}]: {}", i, e)))?;
        cards.push(card);
    }

    let content = CardContent::new(&req.main_title, cards)?;

    let dpr = match req.dpr {
        None | Some(1) => 1,
        Some(2) => 2,
        Some(other) => {
            return Err(Error::Validation(format!(
                "dpr must be 1 or 2, got {}",
                other
            )))
        }
    };

    Ok(ValidatedRender {
        theme,
        content,
        dpr,
    })
}

/// The render service proper. Holds a reference to the read-only registry
/// and the per-call bounds; all per-request state is local to one call.
pub struct HeadlessRenderService {
    registry: Arc<ThemeRegistry>,
    load_timeout_ms: u64,
    settle_ms: u64,
}

impl HeadlessRenderService {
    pub fn new(registry: Arc<ThemeRegistry>) -> Self {
        Self {
            registry,
            load_timeout_ms: PAGE_LOAD_TIMEOUT_MS,
            settle_ms: SETTLE_DELAY_MS,
        }
    }

    pub fn with_timeouts(mut self, load_timeout_ms: u64, settle_ms: u64) -> Self {
        self.load_timeout_ms = load_timeout_ms;
        self.settle_ms = settle_ms;
        self
    }

    pub fn registry(&self) -> &ThemeRegistry {
        &self.registry
    }

    /// Build the full offscreen document: the theme's static markup plus
    /// the fit procedure script, embedded so the page re-derives layout
    /// with no access to this process.
    pub fn build_page(&self, validated: &ValidatedRender) -> Result<String> {
        let markup = validated.theme.render_static(&validated.content);
        let title_spec = compute_title_config(validated.content.card_count(), None);
        let script =
            fit_procedure_script(&title_spec, &ViewportFitSpec::default(), self.settle_ms);

        let page = format!(
            concat!(
                "<!doctype html><html><head><meta charset=\"utf-8\">",
                "<style>html,body{{margin:0;padding:0;width:{w}px;height:{h}px;overflow:hidden}}</style>",
                "</head><body>{markup}<script>{script}</script></body></html>"
            ),
            w = CANVAS_WIDTH,
            h = CANVAS_HEIGHT,
            markup = markup,
            script = script,
        );

        // The injected procedure addresses elements by id; a theme whose
        // static markup lacks them would render un-fitted. Check before
        // spending a browser launch.
        let doc = scraper::Html::parse_document(&page);
        for id in [TITLE_ELEMENT_ID, WRAPPER_ELEMENT_ID] {
            let selector = scraper::Selector::parse(&format!("#{}", id))
                .map_err(|e| Error::Render(format!("bad selector: {:?}", e)))?;
            if doc.select(&selector).next().is_none() {
                return Err(Error::Render(format!(
                    "template '{}' markup is missing #{}",
                    validated.theme.id(),
                    id
                )));
            }
        }

        Ok(page)
    }

    /// Render one request to PNG bytes.
    ///
    /// The synchronous browser work runs on a dedicated thread (the CDP
    /// client is blocking); this method bridges to it with a oneshot and
    /// bounds the whole attempt.
    #[cfg(feature = "chrome")]
    pub async fn render(&self, req: &RenderRequest) -> Result<Vec<u8>> {
        let validated = validate(req, &self.registry)?;
        let page = self.build_page(&validated)?;
        let dpr = validated.dpr;
        let load_timeout_ms = self.load_timeout_ms;
        let settle_ms = self.settle_ms;

        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(chrome_render(&page, dpr, load_timeout_ms, settle_ms));
        });

        // Outer bound: load timeout plus slack for launch and capture.
        match tokio::time::timeout(Duration::from_millis(load_timeout_ms + 8_000), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Render("render worker exited unexpectedly".into())),
            Err(_) => Err(Error::UpstreamTimeout(load_timeout_ms)),
        }
    }
}

/// One full browser lifecycle: launch, load, settle, capture, teardown.
///
/// The `Browser` handle is an owned local, so the spawned process is torn
/// down exactly once on every path out of this function, including load
/// timeouts.
#[cfg(feature = "chrome")]
fn chrome_render(page: &str, dpr: u8, load_timeout_ms: u64, settle_ms: u64) -> Result<Vec<u8>> {
    use base64::Engine as Base64Engine;
    use headless_chrome::protocol::cdp::Page;
    use headless_chrome::{Browser, LaunchOptions};

    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .window_size(Some((CANVAS_WIDTH, CANVAS_HEIGHT)))
        .build()
        .map_err(|e| Error::Render(format!("Failed to build launch options: {}", e)))?;

    let browser = Browser::new(launch_options)
        .map_err(|e| Error::Render(format!("Failed to launch browser: {}", e)))?;

    let tab = browser
        .new_tab()
        .map_err(|e| Error::Render(format!("Failed to create tab: {}", e)))?;
    tab.set_default_timeout(Duration::from_millis(load_timeout_ms));

    let b64 = base64::engine::general_purpose::STANDARD.encode(page);
    let url = format!("data:text/html;base64,{}", b64);

    tab.navigate_to(&url)
        .map_err(|e| classify_load_error(e, load_timeout_ms))?;
    tab.wait_until_navigated()
        .map_err(|e| classify_load_error(e, load_timeout_ms))?;

    // Let the injected fit procedure finish before capturing.
    std::thread::sleep(Duration::from_millis(settle_ms + 120));

    // Exactly the canvas region; clip scale doubles pixels for dpr=2.
    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: CANVAS_WIDTH as f64,
        height: CANVAS_HEIGHT as f64,
        scale: dpr as f64,
    };
    let png = tab
        .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
        .map_err(|e| Error::Render(format!("Screenshot failed: {}", e)))?;

    drop(tab);
    drop(browser);
    Ok(png)
}

#[cfg(feature = "chrome")]
fn classify_load_error(err: anyhow::Error, load_timeout_ms: u64) -> Error {
    let msg = err.to_string();
    if msg.to_ascii_lowercase().contains("timed out") || msg.contains("Timeout") {
        Error::UpstreamTimeout(load_timeout_ms)
    } else {
        Error::Render(format!("Page load failed: {}", msg))
    }
}
