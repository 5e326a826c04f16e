use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use founder_rag::config::Config;
use founder_rag::llm::{HttpEmbedder, HttpGenerator};
use founder_rag::models::QueryRequest;
use founder_rag::Pipeline;

#[derive(Parser)]
#[command(name = "founder-rag")]
#[command(about = "Grounded question answering over startup founder records")]
#[command(version)]
struct Cli {
    /// Records file (defaults to founders.json in the data directory)
    #[arg(long, global = true)]
    records: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load records, embed what changed and persist the index
    Index,
    /// Show the records retrieved for a query without generating an answer
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Answer a question from the records
    Ask {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
        /// Context budget in characters
        #[arg(long)]
        budget: Option<usize>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(config.generate_timeout())
        .build()?;
    let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
    let generator = Arc::new(HttpGenerator::new(http_client, config.llm.clone()));

    let records_path = cli.records.unwrap_or_else(|| config.records_path());
    let pipeline = Pipeline::new(config, embedder, generator)?;

    let report = pipeline.load_records_file(&records_path).await?;
    pipeline.persist_index()?;

    match cli.command {
        Commands::Index => {
            println!(
                "Indexed {} records (generation {}): {} reused, {} embedded",
                report.records, report.generation, report.stats.reused, report.stats.embedded
            );
        }
        Commands::Search {
            query,
            top_k,
            min_score,
        } => {
            let request = QueryRequest {
                top_k,
                min_score,
                ..QueryRequest::new(query)
            };
            let result = pipeline.search(&request).await?;
            if result.is_empty() {
                println!("No records above the similarity floor.");
            }
            for hit in &result.hits {
                let record = pipeline.records().get(&hit.record_id)?;
                println!("{:>2}. [{}] {:.4}  {}", hit.rank + 1, hit.record_id, hit.score, record.embedding_text);
            }
        }
        Commands::Ask {
            query,
            top_k,
            min_score,
            budget,
            json,
        } => {
            let request = QueryRequest {
                top_k,
                min_score,
                budget,
                ..QueryRequest::new(query)
            };
            let response = pipeline.ask(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer.text);
                if !response.answer.citations.is_empty() {
                    println!("\nSources: {}", response.answer.citations.join(", "));
                }
                if response.truncated {
                    println!("({} retrieved records did not fit the context)", response.dropped_count);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ask_overrides() {
        let cli = Cli::try_parse_from([
            "founder-rag",
            "ask",
            "who builds payments in London?",
            "--top-k",
            "3",
            "--budget",
            "2000",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                query,
                top_k,
                budget,
                json,
                ..
            } => {
                assert_eq!(query, "who builds payments in London?");
                assert_eq!(top_k, Some(3));
                assert_eq!(budget, Some(2000));
                assert!(!json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_cli_records_flag_is_global() {
        let cli = Cli::try_parse_from(["founder-rag", "index", "--records", "/tmp/f.json"]).unwrap();
        assert_eq!(cli.records, Some(PathBuf::from("/tmp/f.json")));
        assert!(matches!(cli.command, Commands::Index));
    }
}
