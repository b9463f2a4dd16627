mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::logging;

/// Aivancity Assistant: question answering over school documents
#[derive(Parser, Debug)]
#[command(name = "aivancity-assistant")]
#[command(version)]
#[command(about = "RAG assistant over Aivancity documents, with web search and streaming chat", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to config.yml
    #[arg(long, global = true, env = "ASSISTANT_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the source PDFs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the vector index (defaults to <data-dir>/index)
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the vector index from the PDFs in the data directory
    Index,

    /// Start the chat server
    Serve(ServeArgs),

    /// Print the chunks retrieved for a question
    Query(QueryArgs),

    /// Grade retrieval and answers on a set of test questions
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides server.port)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Question to retrieve chunks for
    pub question: String,

    /// Number of chunks (defaults to retrieval.top_k)
    #[arg(short, long)]
    pub k: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSON file with an array of {"question", "expected_answer"} objects
    #[arg(long)]
    pub cases: Option<PathBuf>,

    /// Output directory (defaults to ./evaluation_results)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = crate::eval::EVAL_TOP_K)]
    pub top_k: usize,
}

/// Resolved paths, config source and typed settings for one invocation.
pub struct CliContext {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Settings,
}

impl CliContext {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let mut paths = AppPaths::new();
        if let Some(dir) = &global.data_dir {
            paths = paths.override_data_dir(dir.clone());
        }
        if let Some(dir) = &global.index_dir {
            paths = paths.override_index_dir(dir.clone());
        }
        let paths = Arc::new(paths);

        let config = ConfigService::new(paths.clone()).with_config_path(global.config.clone());
        let settings = config
            .load_settings()
            .with_context(|| format!("Failed to load {}", config.config_path().display()))?;

        Ok(Self {
            paths,
            config,
            settings,
        })
    }
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = CliContext::load(&cli.global)?;
    logging::init(&ctx.paths, "aivancity-assistant.log");
    tracing::debug!(
        data_dir = %ctx.paths.data_dir.display(),
        index_dir = %ctx.paths.index_dir.display(),
        "Paths resolved"
    );

    match cli.command {
        Commands::Index => commands::index(&ctx).await,
        Commands::Serve(args) => commands::serve(ctx, args).await,
        Commands::Query(args) => commands::query(&ctx, args).await,
        Commands::Evaluate(args) => commands::evaluate(ctx, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "aivancity-assistant",
            "serve",
            "--port",
            "9000",
            "--data-dir",
            "/tmp/pdfs",
        ])
        .unwrap();

        assert_eq!(cli.global.data_dir, Some(PathBuf::from("/tmp/pdfs")));
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.port, Some(9000));
                assert!(args.host.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn evaluate_defaults_to_three_chunks() {
        let cli = Cli::try_parse_from(["aivancity-assistant", "evaluate"]).unwrap();
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.top_k, 3);
                assert!(args.cases.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn query_takes_positional_question() {
        let cli =
            Cli::try_parse_from(["aivancity-assistant", "query", "Where is the campus?", "-k", "2"])
                .unwrap();
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.question, "Where is the campus?");
                assert_eq!(args.k, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
