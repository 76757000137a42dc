//! storyforge server binary.

use std::sync::Arc;

use clap::Parser;

use storyforge_llm::OpenAiCompatModel;
use storyforge_pipeline::{broker_hook, ProgressBroker};
use storyforge_story::{story_graph, StoryState};

mod routes;

#[derive(Parser)]
#[command(
    name = "storyforge",
    version,
    about = "Interactive story generation service with streaming progress"
)]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:8787")]
    addr: String,

    /// Model identifier sent to the completion endpoint
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible base URL override
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Credentials are checked up front: a missing key fails startup, not the
    // first run.
    let mut model = OpenAiCompatModel::from_env()?;
    if let Some(name) = cli.model {
        model = model.with_model(name);
    }
    if let Some(base_url) = cli.base_url {
        model = model.with_base_url(base_url);
    }

    let broker = ProgressBroker::new();
    let hook = broker_hook(broker.clone(), |state: &StoryState| {
        state.stream_id.as_deref()
    });
    let graph = Arc::new(story_graph(Arc::new(model), Some(hook))?);

    let app = routes::router(routes::AppState { graph, broker });

    tracing::info!("listening on http://{}", cli.addr);
    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
