use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use eduquery_core::config::{load_app_config, AppConfig};
use eduquery_core::graph_client::GraphClient;
use eduquery_core::queries::{CypherQueryRepository, QueryName};
use eduquery_core::traits::GraphStore;
use eduquery_pipeline::graph_pipeline::GraphQueryPipeline;
use eduquery_pipeline::QueryPipeline;

mod loader;

#[derive(Parser)]
#[command(
    name = "eduquery",
    about = "Natural-language question answering over a course graph",
    version
)]
struct Cli {
    /// Path to the application config file
    #[arg(long, global = true, default_value = "config/app_config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question, or start an interactive session when none is given
    Ask {
        question: Option<String>,

        /// Log each pipeline stage as it runs
        #[arg(long)]
        verbose: bool,
    },
    /// Load course CSV folders into the graph
    Load {
        /// Directory containing one folder per course section
        #[arg(long)]
        data_dir: PathBuf,
    },
    /// Create the full-text name index used for entity matching
    Init,
    /// Delete all nodes and relationships, then drop the name index
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_app_config(&cli.config)?;

    match cli.command {
        Commands::Ask { question, verbose } => run_ask(&config, question, verbose).await,
        Commands::Load { data_dir } => run_load(&config, &data_dir).await,
        Commands::Init => run_init(&config).await,
        Commands::Purge => run_purge(&config).await,
    }
}

async fn run_ask(config: &AppConfig, question: Option<String>, verbose: bool) -> Result<()> {
    let pipeline = GraphQueryPipeline::from_config(config).await?;

    if let Some(question) = question {
        let answer = pipeline.ask(&question, verbose).await?;
        println!("{}", answer);
        return Ok(());
    }

    println!("Enter exit to stop");
    let stdin = io::stdin();
    loop {
        print!("Enter your question: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" {
            break;
        }

        // Per-question failures are displayed and the session continues.
        match pipeline.ask(question, verbose).await {
            Ok(answer) => println!("\nAnswer: {}\n", answer),
            Err(e) => eprintln!("{:#}", e),
        }
    }
    Ok(())
}

async fn run_load(config: &AppConfig, data_dir: &std::path::Path) -> Result<()> {
    let graph = GraphClient::connect(&config.db.neo4j).await?;
    let queries = CypherQueryRepository::new(
        &config.db.neo4j.examples_file,
        &config.db.neo4j.queries_file,
    )?;

    let loader = loader::CourseLoader::new(&graph, &queries);
    loader.load_data_dir(data_dir).await
}

async fn run_init(config: &AppConfig) -> Result<()> {
    let graph = GraphClient::connect(&config.db.neo4j).await?;
    let queries = CypherQueryRepository::new(
        &config.db.neo4j.examples_file,
        &config.db.neo4j.queries_file,
    )?;

    graph
        .run(queries.get(QueryName::CreateNameIndex)?, Vec::new())
        .await?;
    info!("Created full-text name index");
    Ok(())
}

async fn run_purge(config: &AppConfig) -> Result<()> {
    let graph = GraphClient::connect(&config.db.neo4j).await?;
    let queries = CypherQueryRepository::new(
        &config.db.neo4j.examples_file,
        &config.db.neo4j.queries_file,
    )?;

    graph
        .run(queries.get(QueryName::DelNodesRelationships)?, Vec::new())
        .await?;
    graph
        .run(queries.get(QueryName::DelNameIndex)?, Vec::new())
        .await?;
    info!("Deleted all nodes, relationships and the name index");
    Ok(())
}
