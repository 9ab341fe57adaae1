//! Command-line entrypoint for the retrieval pipeline and verification codes.
use anyhow::{Context, Result};
use campuslink::{
    config::{self, Config},
    embedding::HttpEmbeddingClient,
    logging,
    processing::{RetrievalService, split_text},
    qdrant::{FilterValue, VectorStoreGateway},
    verification::{
        CodeStore, CodeType, InMemoryCodeStore, LogMailer, MailQueue, Mailer, RedisCodeStore,
        RelayMailer, VerificationService,
    },
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MAIL_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "campuslink",
    about = "Document retrieval and verification-code tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a text file into overlapping chunks and print them.
    Chunk {
        file: PathBuf,
        #[arg(long, default_value_t = 500)]
        max_chars: usize,
        #[arg(long, default_value_t = 50)]
        overlap: usize,
    },
    /// Chunk, embed and store a document.
    Index {
        #[arg(long)]
        document: String,
        file: PathBuf,
    },
    /// Print the stored chunks of a document in order.
    Chunks {
        #[arg(long)]
        document: String,
        #[arg(long, default_value_t = 100)]
        top_k: usize,
    },
    /// Similarity search over stored chunks.
    Search {
        query: String,
        #[arg(long)]
        document: Option<String>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Issue a verification code and deliver it.
    RequestCode {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code_type: CodeType,
    },
    /// Validate a previously issued code.
    ValidateCode {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code_type: CodeType,
        #[arg(long)]
        code: String,
    },
}

#[derive(Serialize)]
struct ValidationReport<'a> {
    valid: bool,
    message: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Chunk {
            file,
            max_chars,
            overlap,
        } => {
            let text = read_document(&file).await?;
            print_json(&split_text(&text, max_chars, overlap))
        }
        Command::Index { document, file } => {
            let service = retrieval_service(load_config()?)?;
            let text = read_document(&file).await?;
            let outcome = service
                .index_document(&FilterValue::infer(&document), &text)
                .await
                .with_context(|| format!("failed to index document {document}"))?;
            print_json(&outcome)
        }
        Command::Chunks { document, top_k } => {
            let service = retrieval_service(load_config()?)?;
            let chunks = service
                .document_chunks(&FilterValue::infer(&document), top_k)
                .await;
            print_json(&chunks)
        }
        Command::Search {
            query,
            document,
            top_k,
        } => {
            let service = retrieval_service(load_config()?)?;
            let document = document.as_deref().map(FilterValue::infer);
            let hits = service.search(&query, document.as_ref(), top_k).await;
            print_json(&hits)
        }
        Command::RequestCode { email, code_type } => {
            let service = verification_service(load_config()?)?;
            let issued = service.request_code(&email, code_type).await;
            service.shutdown().await;
            print_json(&serde_json::json!({ "issued": issued }))
        }
        Command::ValidateCode {
            email,
            code_type,
            code,
        } => {
            let service = verification_service(load_config()?)?;
            let (valid, message) = service
                .validate_code(&email, &code, code_type)
                .await
                .as_pair();
            service.shutdown().await;
            print_json(&ValidationReport { valid, message })
        }
    }
}

fn load_config() -> Result<&'static Config> {
    config::init_config().context("failed to load configuration")
}

fn retrieval_service(config: &Config) -> Result<RetrievalService> {
    let embedding = HttpEmbeddingClient::new(config.embedding_settings())
        .context("failed to build embedding client")?;
    let gateway = VectorStoreGateway::new(config.vector_store_settings())
        .context("failed to build vector store gateway")?;
    Ok(RetrievalService::new(
        Arc::new(embedding),
        gateway,
        config.chunking_settings(),
    ))
}

fn verification_service(config: &Config) -> Result<VerificationService> {
    let store: Arc<dyn CodeStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCodeStore::new(url, config.redis_timeout).context("invalid REDIS_URL")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set; codes are kept in memory for this process only");
            Arc::new(InMemoryCodeStore::new())
        }
    };
    let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
        Some(url) => Arc::new(
            RelayMailer::new(url.clone(), MAIL_RELAY_TIMEOUT)
                .context("failed to build mail relay client")?,
        ),
        None => Arc::new(LogMailer),
    };
    let mail = MailQueue::start(mailer, config.mail_retry_policy());
    Ok(VerificationService::new(
        store,
        mail,
        config.verification_settings(),
    ))
}

async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
