use anyhow::{bail, Context};
use futures::StreamExt;
use kbase::{
    api::routes::create_router,
    cli::{output::Output, Cli, Commands},
    types::{IngestOutcome, StreamEvent},
    AppState, ConfigManager, KbConfig, KnowledgeBase,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(config: &KbConfig, verbose: bool) {
    let filter = if let Ok(env) = std::env::var("RUST_LOG") {
        EnvFilter::new(env)
    } else if verbose {
        EnvFilter::new("kbase=debug,tower_http=debug,info")
    } else {
        EnvFilter::new(format!(
            "kbase={level},tower_http={level},warn",
            level = config.server.log_level
        ))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.server.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config_manager = match ConfigManager::new(&cli.config) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            output.error(&format!("Invalid configuration {:?}: {}", cli.config, e));
            return Err(e).context("failed to load configuration");
        }
    };
    let config = config_manager.config();
    init_tracing(&config, cli.verbose);

    match cli.command() {
        Commands::Serve => cmd_serve(config_manager, &output).await,
        Commands::Ingest { files } => cmd_ingest(&config, files, &output).await,
        Commands::Ask {
            question,
            top_k,
            stream,
        } => {
            let top_k = top_k.unwrap_or(config.rag.top_k);
            cmd_ask(&config, question, top_k, *stream, &output).await
        }
        Commands::Clear { yes } => cmd_clear(&config, *yes, &output).await,
        Commands::Stats => cmd_stats(&config, &output).await,
        Commands::Config { validate } => cmd_config(&config_manager, *validate, &output),
    }
}

async fn cmd_serve(config_manager: Arc<ConfigManager>, output: &Output) -> anyhow::Result<()> {
    let config = config_manager.config();
    let kb = Arc::new(KnowledgeBase::from_config(&config).await?);

    if let Err(e) = config_manager.start_watching() {
        warn!("Config hot-reload disabled: {}", e);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let app = create_router(AppState { config_manager, kb });

    output.banner();
    output.info(&format!("Listening on http://{}", addr));
    output.info(&format!("OpenAPI document at http://{}/api/openapi.json", addr));
    info!(%addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn cmd_ingest(config: &KbConfig, files: &[PathBuf], output: &Output) -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_config(config).await?;
    let mut failures = 0;

    for path in files {
        match kb.ingest_file(path).await {
            Ok(report) => match &report.outcome {
                IngestOutcome::Complete => output.success(&format!(
                    "{}: {} segments, {} vectors (id {})",
                    report.document.display_name,
                    report.segments_count(),
                    report.vectors_count(),
                    report.document.id
                )),
                IngestOutcome::Partial { skipped_segments } => output.warning(&format!(
                    "{}: {} of {} segments embedded, skipped {:?} (id {})",
                    report.document.display_name,
                    report.vectors_count(),
                    report.segments_count(),
                    skipped_segments,
                    report.document.id
                )),
            },
            Err(e) => {
                failures += 1;
                output.error(&format!("{}: {}", path.display(), e));
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files failed to ingest", failures, files.len());
    }
    Ok(())
}

async fn cmd_ask(
    config: &KbConfig,
    question: &str,
    top_k: usize,
    stream: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_config(config).await?;

    if !stream {
        let result = kb.answer(question, top_k).await?;
        output.subheader(&format!("Thinking ({})", result.mode));
        output.block(&result.thinking);
        output.subheader("Answer");
        output.block(&result.final_answer);
        print_sources(output, &result.sources);
        return Ok(());
    }

    let mut events = kb.answer_stream(question, top_k).await?;
    let mut sources = Vec::new();
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Metadata {
                sources: found,
                mode,
                ..
            } => {
                output.subheader(&format!("Answer ({})", mode));
                output.newline();
                sources = found;
            }
            StreamEvent::Fragment { fragment } => output.fragment(&fragment),
            StreamEvent::Done => output.newline(),
        }
    }
    print_sources(output, &sources);
    Ok(())
}

fn print_sources(output: &Output, sources: &[kbase::types::Source]) {
    if sources.is_empty() {
        return;
    }
    output.subheader("Sources");
    for source in sources {
        output.list_item(&format!(
            "{} #{} (score {:.3})",
            source.filename, source.sequence_index, source.score
        ));
    }
}

async fn cmd_clear(config: &KbConfig, yes: bool, output: &Output) -> anyhow::Result<()> {
    if !yes && !output.confirm("Remove every document, vector and chat entry?") {
        output.info("Aborted");
        return Ok(());
    }

    let kb = KnowledgeBase::from_config(config).await?;
    kb.clear_all().await?;
    output.success("Knowledge base cleared");
    Ok(())
}

async fn cmd_stats(config: &KbConfig, output: &Output) -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_config(config).await?;
    let stats = kb.stats().await?;

    output.header("Knowledge Base");
    output.kv("Documents", &stats.total_documents.to_string());
    output.kv("Segments", &stats.total_chunks.to_string());
    output.kv("Vectors", &stats.total_vectors.to_string());
    output.kv("Chats", &stats.total_chats.to_string());
    output.kv(
        "Indexed points",
        &stats
            .indexed_points
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unavailable".to_string()),
    );

    let page = kb.list_documents(1, 10).await?;
    if !page.documents.is_empty() {
        output.subheader("Recent documents");
        output.table_header(&["Name", "Segments", "Vectors", "Uploaded"]);
        for doc in &page.documents {
            output.table_row(&[
                &doc.display_name,
                &doc.segment_count.to_string(),
                &doc.vector_count.to_string(),
                &doc.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
    }
    Ok(())
}

fn cmd_config(config_manager: &ConfigManager, validate: bool, output: &Output) -> anyhow::Result<()> {
    let config = config_manager.config();

    if validate {
        output.success(&format!(
            "Configuration {:?} is valid",
            config_manager.config_path()
        ));
        return Ok(());
    }

    output.header(&format!("Configuration ({:?})", config_manager.config_path()));
    output.newline();
    println!("{}", toml::to_string_pretty(config.as_ref())?);
    Ok(())
}
