use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardshot::capture::Format;
use cardshot::export::{ExportJob, ExportOrchestrator};
use cardshot::headless::{validate, HeadlessRenderService, RenderRequest};
use cardshot::server::{build_router, AppState, ServerConfig};
use cardshot::theme::ThemeRegistry;
use cardshot::RenderConfig;

#[derive(Parser)]
#[command(name = "cardshot", version, about = "Card-content render and export pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the headless render service.
    Serve {
        /// Port to bind; overrides the PORT environment variable.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Render a request JSON file to an image locally, without a server.
    Export {
        /// Path to a render-request JSON file ({"templateId", "mainTitle", "cards", ...}).
        #[arg(long)]
        input: PathBuf,
        /// Output format: png or svg.
        #[arg(long, default_value = "png")]
        format: String,
        /// Output file; defaults to the generated artifact filename.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => serve(port).await,
        Command::Export { input, format, out } => export(input, &format, out).await,
    }
}

async fn serve(port: Option<u16>) -> Result<()> {
    let mut config = ServerConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    if config.token.is_none() && !config.allow_unauthenticated {
        bail!("set CARDSHOT_TOKEN or opt in with CARDSHOT_ALLOW_UNAUTHENTICATED=1");
    }

    let registry = Arc::new(ThemeRegistry::builtin());
    info!("themes registered: {:?}", registry.ids());

    let state = AppState {
        service: Arc::new(HeadlessRenderService::new(registry)),
        token: config.token.clone(),
        allow_unauthenticated: config.allow_unauthenticated,
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn export(input: PathBuf, format: &str, out: Option<PathBuf>) -> Result<()> {
    let format = match format {
        "png" => Format::Png,
        "svg" => Format::Svg,
        other => bail!("unsupported format '{}', expected png or svg", other),
    };

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let request: RenderRequest = serde_json::from_str(&raw).context("parsing render request")?;

    let registry = ThemeRegistry::builtin();
    let validated = validate(&request, &registry)?;

    let config = RenderConfig::default();
    let orchestrator = ExportOrchestrator::new(config.clone())?;
    let job = ExportJob::new(format, validated.theme.as_ref(), &config);
    let artifact = orchestrator
        .export_as_image(validated.theme.as_ref(), &validated.content, &job, None)
        .await?;

    let path = out.unwrap_or_else(|| PathBuf::from(&artifact.filename));
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {} ({} bytes)", path.display(), artifact.bytes.len());
    Ok(())
}
