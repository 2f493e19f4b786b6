mod commands;
mod setup;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::EnvFilter,
};

#[derive(Parser, Debug)]
#[command(
    name = "gqlrag",
    version,
    about = "Ask questions about a GraphQL schema, grounded in the schema itself"
)]
pub struct Cli {
    /// Config file (defaults to ./gqlrag.toml, then the user config dir).
    #[arg(long, global = true, env = "GQLRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Schema file, overriding `[schema] path`.
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Index directory, overriding `[index] dir`.
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk and embed the schema, then save the index.
    Index,
    /// Print the chunks closest to a query, without calling the model.
    Search {
        query: String,
        /// Number of chunks to print.
        #[arg(long)]
        k: Option<usize>,
    },
    /// Interactive conversation about the schema.
    Chat {
        /// Answer from the schema only; no GraphQL calls.
        #[arg(long)]
        no_tools: bool,
        /// Chunks retrieved per question.
        #[arg(long)]
        k: Option<usize>,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let config = setup::load_config(&cli)?;
    match cli.command {
        Command::Index => commands::index(&config).await,
        Command::Search { query, .. } => commands::search(&config, &query).await,
        Command::Chat { .. } => commands::chat(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gqlrag",
            "search",
            "user orders",
            "--k",
            "3",
            "--index-dir",
            "/tmp/idx",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(cli.index_dir, Some(PathBuf::from("/tmp/idx")));
        match cli.command {
            Command::Search { query, k } => {
                assert_eq!(query, "user orders");
                assert_eq!(k, Some(3));
            },
            other => panic!("unexpected command {other:?}"),
        }
    }
}
