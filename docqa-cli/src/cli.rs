use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Ask questions about local documents")]
pub struct Cli {
    /// Directory holding the uploaded documents.
    #[arg(long, global = true, default_value = "documents")]
    pub docs_dir: PathBuf,

    /// Directory holding persisted indices.
    #[arg(long, global = true, default_value = ".docqa/indices")]
    pub index_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question about one document.
    Ask(AskArgs),
    /// Build a document's index ahead of time.
    Index(DocumentArgs),
    /// Drop a document's persisted index.
    Forget(DocumentArgs),
    /// List supported documents and whether they are indexed.
    List,
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    /// File name of the document inside the documents directory.
    #[arg(long)]
    pub document: String,

    /// Language code of the answer to print.
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Print the whole outcome, including every translation, as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// The question.
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    /// File name of the document inside the documents directory.
    #[arg(long)]
    pub document: String,
}
