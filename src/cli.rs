use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::io::{self, Read};
#[cfg(feature = "web")]
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use concordance_rs::header::metadata_from_response;
use concordance_rs::{
    CorpusSettings, DocumentMap, ResultViewer, SentenceBatch, ViewerError, WordBatch,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "concordance-rs",
    about = "Render corpus search hits as annotated HTML",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Directory containing corpus.json. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a sentence search response.
    Sentences {
        /// Backend response JSON file, or `-` for stdin.
        response: PathBuf,
        /// JSON object mapping document ids to their metadata records.
        #[arg(long)]
        documents: Option<PathBuf>,
    },
    /// Render a word search response as table rows.
    Words {
        /// Backend response JSON file, or `-` for stdin.
        response: PathBuf,
    },
    /// Serve the renderer over HTTP.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// JSON object mapping document ids to their metadata records.
        #[arg(long)]
        documents: Option<PathBuf>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let settings = match &cli.settings {
        Some(dir) => CorpusSettings::load(dir)?,
        None => CorpusSettings::default(),
    };
    match cli.command {
        Command::Sentences {
            response,
            documents,
        } => handle_sentences(settings, &response, documents.as_deref(), cli.json),
        Command::Words { response } => handle_words(settings, &response, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr, documents } => handle_serve(settings, addr, documents.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_sentences(
    settings: CorpusSettings,
    response: &Path,
    documents: Option<&Path>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let response = read_json(response)?;
    let viewer = ResultViewer::new(settings, load_documents(documents)?);
    let batch = viewer.process_sentences(&response);
    if as_json {
        print_json(&batch)?;
    } else {
        print_sentence_batch(&batch);
    }
    Ok(())
}

fn handle_words(
    settings: CorpusSettings,
    response: &Path,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let response = read_json(response)?;
    let viewer = ResultViewer::without_documents(settings);
    let batch = viewer.process_words(&response);
    if as_json {
        print_json(&batch)?;
    } else {
        print_word_batch(&batch);
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    settings: CorpusSettings,
    addr: SocketAddr,
    documents: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    use concordance_rs::web::{WebConfig, serve};

    let viewer = ResultViewer::new(settings, load_documents(documents)?);
    let config = WebConfig {
        addr,
        ..WebConfig::default()
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config, viewer))?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Value, ViewerError> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

// Each entry is either a metadata object or a raw backend lookup response for
// that document.
fn load_documents(path: Option<&Path>) -> Result<DocumentMap, ViewerError> {
    let Some(path) = path else {
        return Ok(DocumentMap::new());
    };
    let raw: HashMap<String, Value> = serde_json::from_str(&fs::read_to_string(path)?)?;
    let documents: DocumentMap = raw
        .into_iter()
        .filter_map(|(doc_id, entry)| {
            let meta = metadata_from_response(&entry).or_else(|| entry.as_object().cloned())?;
            Some((doc_id, meta))
        })
        .collect();
    debug!(count = documents.len(), "Loaded document metadata");
    Ok(documents)
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), serde_json::Error> {
    let rendered = if stdout_is_tty() {
        serde_json::to_string_pretty(payload)?
    } else {
        serde_json::to_string(payload)?
    };
    println!("{rendered}");
    Ok(())
}

fn print_sentence_batch(batch: &SentenceBatch) {
    if batch.is_nothing_found() {
        println!("{}", batch.message);
        return;
    }
    println!(
        "{} sentences in {} documents; {} matched words on this page.",
        batch.sentences, batch.docs, batch.occurrences
    );
    for (idx, context) in batch.contexts.iter().enumerate() {
        let relations = if context.relations_satisfied {
            ""
        } else {
            " (relations not satisfied)"
        };
        println!("\n#{} [{}]{}", idx + 1, context.language, relations);
        if let Some(header) = context.header.as_deref() {
            println!("{header}");
        }
        println!("{}", context.text);
    }
}

fn print_word_batch(batch: &WordBatch) {
    if !batch.message.is_empty() {
        println!("{}", batch.message);
        return;
    }
    println!(
        "{} occurrences in {} documents.",
        batch.occurrences, batch.docs
    );
    for row in &batch.words {
        println!("{row}");
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}
