use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use super::{CliContext, EvaluateArgs, QueryArgs, ServeArgs};
use crate::embedding::build_embedder;
use crate::eval::{default_cases, load_cases, EvalReport, Evaluator};
use crate::ingest::{DocumentLoader, TextSplitter};
use crate::rag::{IndexBuilder, Retriever, VectorIndex};
use crate::server::router::router;
use crate::state::{build_chat_service, AppState};

pub async fn index(ctx: &CliContext) -> Result<()> {
    let settings = &ctx.settings;
    let loader = DocumentLoader::new(TextSplitter::new(
        settings.ingest.chunk_size,
        settings.ingest.chunk_overlap,
    ));

    let (chunks, report) = loader
        .load_chunks(&ctx.paths.data_dir)
        .await
        .context("Failed to load documents")?;

    if report.created_dir {
        println!(
            "Created {}; add PDF files to it and run `aivancity-assistant index` again.",
            ctx.paths.data_dir.display()
        );
    }
    for skipped in &report.skipped {
        println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let embedder = build_embedder(&settings.embedding, &settings.llm, &ctx.paths.model_cache_dir)
        .context("Failed to initialize embedder")?;
    let builder = IndexBuilder::new(embedder, &ctx.paths, settings.embedding.batch_size);
    let built = builder
        .build(chunks)
        .await
        .context("Failed to build index")?;

    println!(
        "Indexed {} chunks from {} files ({}, dim {}) into {}",
        built.chunk_count,
        report.files_loaded,
        built.embedding_model,
        built.dimension,
        built.db_path.display()
    );
    println!("Processed text written to {}", built.dump_path.display());
    Ok(())
}

pub async fn serve(ctx: CliContext, args: ServeArgs) -> Result<()> {
    let mut settings = ctx.settings;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    let state = AppState::initialize(ctx.config, settings)
        .await
        .context("Failed to initialize application state")?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}

pub async fn query(ctx: &CliContext, args: QueryArgs) -> Result<()> {
    let settings = &ctx.settings;
    let embedder = build_embedder(&settings.embedding, &settings.llm, &ctx.paths.model_cache_dir)
        .context("Failed to initialize embedder")?;
    let index = VectorIndex::load(&ctx.paths.index_db_path(), &embedder.model_id())
        .await
        .context("Failed to load vector index")?;

    let retriever = Retriever::new(Arc::new(index), embedder);
    let k = args.k.unwrap_or(settings.retrieval.top_k);
    let results = retriever
        .retrieve(&args.question, k)
        .await
        .context("Retrieval failed")?;

    if results.is_empty() {
        println!("No chunks retrieved.");
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "[{}] score {:.3}  {} page {}  ({})",
            rank + 1,
            result.score,
            result.chunk.source_file,
            result.chunk.page,
            result.chunk.id
        );
        println!("{}\n", result.chunk.text);
    }
    Ok(())
}

pub async fn evaluate(ctx: CliContext, args: EvaluateArgs) -> Result<()> {
    let mut settings = ctx.settings;
    // grades reflect the index alone
    settings.search.enabled = false;

    let chat = build_chat_service(&ctx.paths, &settings)
        .await
        .context("Failed to initialize the answer pipeline")?;

    let cases = match &args.cases {
        Some(path) => load_cases(path).await?,
        None => default_cases(),
    };

    let evaluator = Evaluator::new(Arc::new(chat)).with_top_k(args.top_k);
    let results = evaluator.run(&cases).await.context("Evaluation failed")?;
    let report = EvalReport::new(results);

    let output = args.output.unwrap_or_else(|| ctx.paths.eval_dir.clone());
    let files = report.write(&output).await?;

    println!(
        "Evaluation completed. Results saved to {} and {}",
        files.text.display(),
        files.json.display()
    );
    Ok(())
}
