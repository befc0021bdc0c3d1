//! cardshot
//!
//! A render/export pipeline for structured card content: a main title plus
//! 1..8 title/description/icon cards, turned into a live preview tree, a
//! standalone downloadable document, or raster/vector image bytes.
//!
//! The pipeline has three load-bearing parts:
//!
//! - **Layout fitting** (`layout`): a deterministic title-autosize and
//!   viewport-autoscale algorithm, kept declarative so the same record can
//!   run in-process or be lowered to dependency-free script text embedded
//!   in a foreign document. Both environments reach identical results.
//! - **Artifact capture** (`capture`): an ordered chain of fallible
//!   strategies turning a realized visual tree into PNG or SVG bytes;
//!   fallbacks are logged, never surfaced.
//! - **Headless rendering** (`headless`): an isolated per-request browser
//!   process that reconstructs a themed document offscreen and captures
//!   the fixed 1920x1080 region, with its lifecycle fully owned.
//!
//! # Example
//!
//! ```no_run
//! use cardshot::content::{Card, CardContent};
//! use cardshot::capture::Format;
//! use cardshot::export::{ExportJob, ExportOrchestrator};
//! use cardshot::theme::ThemeRegistry;
//! use cardshot::RenderConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ThemeRegistry::builtin();
//! let theme = registry.get("classic").unwrap();
//! let cards = vec![Card::new("Fast", "Renders in one pass", "bolt")?];
//! let content = CardContent::new("Why cardshot", cards)?;
//!
//! let orchestrator = ExportOrchestrator::new(RenderConfig::default())?;
//! let job = ExportJob::new(Format::Png, theme.as_ref(), &RenderConfig::default());
//! let artifact = orchestrator
//!     .export_as_image(theme.as_ref(), &content, &job, None)
//!     .await?;
//! std::fs::write(&artifact.filename, &artifact.bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod content;
pub mod export;
pub mod headless;
pub mod layout;
pub mod server;
pub mod theme;

use capture::WaitPolicy;

/// Read-only configuration for the export pipeline.
///
/// Built once at process start and passed by reference; nothing mutates
/// it afterwards.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Output pixel ratio for raster exports, 1.0..=4.0.
    pub pixel_ratio: f32,
    /// Footer space reserved at the bottom of exported documents, 0..=600 px.
    pub bottom_reserved_px: u32,
    /// Background fill for raster output. `None` keeps PNG transparent.
    pub background_color: Option<String>,
    /// Try the remote render service before local capture for raster
    /// formats. Remote failure falls back to local capture silently.
    pub prefer_remote: bool,
    /// Remote render endpoint, e.g. `http://render.internal/render`.
    pub remote_endpoint: Option<String>,
    /// Bearer token sent to the remote render endpoint.
    pub remote_token: Option<String>,
    /// Abort bound for the remote render call.
    pub remote_timeout_ms: u64,
    /// Pre-capture wait policy.
    pub wait: WaitPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            bottom_reserved_px: 100,
            background_color: None,
            prefer_remote: false,
            remote_endpoint: None,
            remote_token: None,
            remote_timeout_ms: 12_000,
            wait: WaitPolicy::standard(),
        }
    }
}

impl RenderConfig {
    /// Check the numeric bounds. Called by consumers at construction so a
    /// bad config fails fast instead of producing odd artifacts.
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=4.0).contains(&self.pixel_ratio) {
            return Err(Error::Config(format!(
                "pixel_ratio must be within 1.0..=4.0, got {}",
                self.pixel_ratio
            )));
        }
        if self.bottom_reserved_px > 600 {
            return Err(Error::Config(format!(
                "bottom_reserved_px must be at most 600, got {}",
                self.bottom_reserved_px
            )));
        }
        if self.prefer_remote && self.remote_endpoint.is_none() {
            return Err(Error::Config(
                "prefer_remote requires remote_endpoint".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pixel_ratio, 2.0);
        assert_eq!(config.bottom_reserved_px, 100);
    }

    #[test]
    fn out_of_band_values_are_rejected() {
        let mut config = RenderConfig {
            pixel_ratio: 5.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.pixel_ratio = 2.0;
        config.bottom_reserved_px = 601;
        assert!(config.validate().is_err());

        config.bottom_reserved_px = 0;
        config.prefer_remote = true;
        assert!(config.validate().is_err());
        config.remote_endpoint = Some("http://localhost:9000/render".into());
        assert!(config.validate().is_ok());
    }
}
