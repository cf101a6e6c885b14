//! Ask a question about one or more papers.
//!
//! Usage: cargo run -p scholar-retrieval --example ask -- "<question>" <doi|url|file>...
//!
//! Local files are read as uploads; anything else is fetched. Without
//! `OPENAI_API_KEY` the offline hashing embedder is used, and without
//! `OPENROUTER_API_KEY` the assembled context is printed instead of an
//! answer.

use std::path::Path;

use scholar_documents::HttpFetcher;
use scholar_embeddings::EmbeddingCache;
use scholar_retrieval::{
    ChatCompletionsClient, DocumentSource, EmbeddingConfig, EmbeddingProviderType,
    RetrievalConfig, Session, TechnicalLevel,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logs
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let question = args.next().ok_or("missing question")?;
    let sources: Vec<String> = args.collect();
    if sources.is_empty() {
        return Err("at least one DOI, URL or file is required".into());
    }

    let mut config = match std::env::var("SCHOLAR_CONFIG") {
        Ok(path) => RetrievalConfig::load(path)?,
        Err(_) => RetrievalConfig::default(),
    };
    if std::env::var("OPENAI_API_KEY").is_err() {
        config = config.with_embedding(EmbeddingConfig {
            provider: EmbeddingProviderType::Hashing,
            ..EmbeddingConfig::default()
        });
    }

    let mut session = Session::from_config(config, EmbeddingCache::new())?;
    let fetcher = HttpFetcher::new();

    for source in &sources {
        let path = Path::new(source);
        let source = if path.is_file() {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.clone());
            DocumentSource::upload(filename, std::fs::read(path)?)
        } else {
            DocumentSource::remote(source.as_str())
        };

        match session.ingest(&source, &fetcher).await {
            Ok(id) => {
                if let Some(document) = session.document(&id) {
                    println!(
                        "✓ Fetched `{}` ({} words)",
                        document.title().unwrap_or(id.as_str()),
                        document.word_count()
                    );
                }
            }
            Err(e) => println!("✗ {} ({} stage): {e}", source.id(), e.stage()),
        }
    }

    let client = ChatCompletionsClient::from_config(&session.config().model)
        .with_timeout(session.config().timeouts.generate());
    if !client.is_available() {
        let context = session.context_for(&question).await?;
        println!("\n{:?} context ({} chunks):\n", context.mode, context.chunks.len());
        println!("{}", context.text);
        return Ok(());
    }

    let answer = session
        .ask(&question, &client, TechnicalLevel::default(), None)
        .await?;

    println!("\n{}\n", answer.text);
    println!("Mode: {:?}", answer.mode);
    for source in &answer.sources {
        println!("Source: {source}");
    }
    Ok(())
}
