//! Export orchestration: the two top-level entry points that sequence
//! mounting, settlement, capture, and packaging.
//!
//! `export_as_document` produces a standalone HTML document that re-derives
//! its own layout via the embedded fit procedure. `export_as_image`
//! produces PNG or SVG bytes, optionally trying the remote render service
//! first and falling back to local capture without surfacing the failure.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::capture::{settle, CaptureOptions, Capturer, Format, WaitPolicy};
use crate::content::CardContent;
use crate::headless::{CardSpec, RenderRequest};
use crate::layout::{
    compute_title_config, fit_procedure_script, ViewportFitSpec, CANVAS_HEIGHT, CANVAS_WIDTH,
};
use crate::theme::{RenderTree, Theme};
use crate::{Error, RenderConfig, Result};

/// Transient parameters for one image export. Never persisted.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub format: Format,
    pub pixel_ratio: f32,
    pub background_color: Option<String>,
    pub template_id: String,
    pub bottom_reserved_px: u32,
}

impl ExportJob {
    pub fn new(format: Format, theme: &dyn Theme, config: &RenderConfig) -> Self {
        Self {
            format,
            pixel_ratio: config.pixel_ratio,
            background_color: config.background_color.clone(),
            template_id: theme.id().to_string(),
            bottom_reserved_px: config.bottom_reserved_px,
        }
    }
}

/// Measured size of an element the caller already has on screen. Exports
/// against it match the on-screen pixels instead of the canonical canvas.
#[derive(Debug, Clone, Copy)]
pub struct LiveElement {
    pub width: f64,
    pub height: f64,
}

/// Final packaged output of an image export.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

/// The live instantiation of a theme for one export call.
///
/// Exclusively owned by the call that created it; the realized tree is
/// torn down when the target drops, on every exit path.
pub struct RenderTarget {
    theme_id: String,
    tree: RenderTree,
}

impl RenderTarget {
    pub fn mount(theme: &dyn Theme, content: &CardContent, scale: f64) -> Self {
        debug!("mounting render target for theme '{}'", theme.id());
        Self {
            theme_id: theme.id().to_string(),
            tree: theme.render(content, scale),
        }
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        debug!("render target for theme '{}' torn down", self.theme_id);
    }
}

/// Download filename: `{templateId}-{unixMillis}.{ext}`.
pub fn export_filename(template_id: &str, format: Format) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}.{}", template_id, millis, format.extension())
}

/// The orchestrator. Owns the capture chain and the remote-render client;
/// config and registry are read-only after construction.
pub struct ExportOrchestrator {
    capturer: Capturer,
    config: RenderConfig,
    http: reqwest::Client,
}

impl ExportOrchestrator {
    pub fn new(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.remote_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self {
            capturer: Capturer::new(),
            config,
            http,
        })
    }

    /// Swap the capture chain; test use.
    pub fn with_capturer(mut self, capturer: Capturer) -> Self {
        self.capturer = capturer;
        self
    }

    /// Export as a standalone document.
    ///
    /// The file carries the fit procedure inline, so it lays itself out
    /// correctly with no trace of the runtime that produced it. External
    /// font and icon stylesheets are declared only when the theme is not
    /// self-contained.
    pub async fn export_as_document(
        &self,
        theme: &dyn Theme,
        content: &CardContent,
    ) -> Result<String> {
        // Settle exactly as the image path does, so the document is
        // serialized under the same timing regime. The markup itself comes
        // from the theme; no tree is realized for this path.
        settle(&self.config.wait).await;

        let markup = theme.render_static(content);
        let title_spec = compute_title_config(content.card_count(), None);
        let script = fit_procedure_script(
            &title_spec,
            &ViewportFitSpec::default(),
            self.config.wait.settle_ms.max(180),
        );

        let head_links = if theme.is_self_contained() {
            String::new()
        } else {
            concat!(
                "<link rel=\"stylesheet\" href=\"https://fonts.googleapis.com/css2",
                "?family=Inter:wght@400;600;700&display=swap\">\n",
                "<link rel=\"stylesheet\" href=\"https://fonts.googleapis.com/icon",
                "?family=Material+Icons\">\n"
            )
            .to_string()
        };

        Ok(format!(
            concat!(
                "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
                "<title>{title}</title>\n{links}",
                "<style>html,body{{margin:0;padding:0}}",
                "#export-canvas{{width:{w}px;height:{h}px;overflow:hidden;",
                "padding-bottom:{reserved}px;box-sizing:border-box}}</style>\n",
                "</head>\n<body>\n<div id=\"export-canvas\">{markup}</div>\n",
                "<script>{script}</script>\n</body>\n</html>\n"
            ),
            title = crate::theme::escape_text(&content.main_title),
            links = head_links,
            w = CANVAS_WIDTH,
            h = CANVAS_HEIGHT,
            reserved = self.config.bottom_reserved_px,
            markup = markup,
            script = script,
        ))
    }

    /// Export as an image.
    ///
    /// With a live element, the capture scale is derived from its measured
    /// size so output matches on-screen pixels; otherwise a fresh target
    /// mounts at the canonical 1920x1080. When the remote path is
    /// preferred and the format is raster, the remote attempt runs first
    /// and must fully resolve before local capture starts; its failure is
    /// logged, never surfaced.
    pub async fn export_as_image(
        &self,
        theme: &dyn Theme,
        content: &CardContent,
        job: &ExportJob,
        live: Option<LiveElement>,
    ) -> Result<Artifact> {
        let scale = live
            .map(|el| (el.width / CANVAS_WIDTH as f64).clamp(0.1, 4.0))
            .unwrap_or(1.0);

        let target = RenderTarget::mount(theme, content, scale);
        settle(&self.config.wait).await;

        if self.config.prefer_remote && job.format == Format::Png {
            match self.remote_render(content, job).await {
                Ok(bytes) => {
                    return Ok(Artifact {
                        bytes,
                        content_type: Format::Png.content_type(),
                        filename: export_filename(&job.template_id, Format::Png),
                    });
                }
                Err(e) => {
                    warn!(
                        "remote render failed ({}); falling back to local capture",
                        e
                    );
                }
            }
        }

        let opts = CaptureOptions {
            width: target.tree().width,
            height: target.tree().height,
            pixel_ratio: job.pixel_ratio,
            background_color: job.background_color.clone(),
            format: job.format,
        };
        let bytes = self.capturer.capture(target.tree(), &opts)?;

        Ok(Artifact {
            bytes,
            content_type: job.format.content_type(),
            filename: export_filename(&job.template_id, job.format),
        })
    }

    /// One bounded attempt against the remote render service. Any failure
    /// class (network, non-2xx, non-image body) is an `Err` here; the
    /// caller decides whether that is terminal.
    async fn remote_render(&self, content: &CardContent, job: &ExportJob) -> Result<Vec<u8>> {
        let endpoint = self
            .config
            .remote_endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("remote render preferred but no endpoint set".into()))?;

        let request = RenderRequest {
            template_id: job.template_id.clone(),
            main_title: content.main_title.clone(),
            cards: content
                .cards
                .iter()
                .map(|c| CardSpec {
                    title: c.title.clone(),
                    desc: c.desc.clone(),
                    icon: c.icon.clone(),
                })
                .collect(),
            dpr: Some(if job.pixel_ratio >= 2.0 { 2 } else { 1 }),
        };

        let mut req = self.http.post(endpoint).json(&request);
        if let Some(token) = &self.config.remote_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout(self.config.remote_timeout_ms)
            } else {
                Error::Other(format!("remote render request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "remote render returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(Error::Other(format!(
                "remote render returned non-image content type '{}'",
                content_type
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Other(format!("remote render body read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
