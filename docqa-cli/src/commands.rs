use std::sync::Arc;

use anyhow::{Context, Result, bail};
use docqa_rag::{
    DocQaConfig, DocQaPipeline, DocumentId, FsDocumentLoader, FsIndexStore, GoogleTranslator,
    IndexStore, OpenAIChatGenerator, OpenAIEmbeddingProvider, ProviderSettings, QueryRequest,
};
use tracing::{info, warn};

use crate::cli::{AskArgs, Cli, DocumentArgs};

fn pipeline(cli: &Cli) -> Result<DocQaPipeline> {
    let config = DocQaConfig::from_env().context("invalid DOCQA_* configuration")?;
    let settings = ProviderSettings::from_env().context("invalid provider settings")?;

    let embedder = OpenAIEmbeddingProvider::from_settings(&settings)?;
    let generator = OpenAIChatGenerator::from_settings(&settings)?;

    let pipeline = DocQaPipeline::builder()
        .config(config)
        .loader(Arc::new(FsDocumentLoader::new(cli.docs_dir.clone())))
        .embedding_provider(Arc::new(embedder))
        .index_store(Arc::new(FsIndexStore::new(cli.index_dir.clone())))
        .generator(Arc::new(generator))
        .translator(Arc::new(GoogleTranslator::new()))
        .build()?;
    Ok(pipeline)
}

fn document_id(name: &str) -> Result<DocumentId> {
    let id = DocumentId::new(name)?;
    if id.kind().is_none() {
        bail!("'{name}' is not a supported document (expected one of csv, txt, pdf, xlsx, xls)");
    }
    Ok(id)
}

pub async fn ask(cli: &Cli, args: &AskArgs) -> Result<()> {
    let document = document_id(&args.document)?;
    let pipeline = pipeline(cli)?;
    let session = pipeline.new_session();

    let request = QueryRequest::new(document, args.question.join(" "), &args.language);
    let outcome = pipeline.ask(&session, &request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        if outcome.language != args.language {
            warn!(
                requested = %args.language,
                language = %outcome.language,
                "translation unavailable, showing source language"
            );
        }
        println!("{}", outcome.answer);
    }
    Ok(())
}

pub async fn index(cli: &Cli, args: &DocumentArgs) -> Result<()> {
    let document = document_id(&args.document)?;
    let source = pipeline(cli)?.prepare(&document).await?;
    info!(document.id = %document, source = ?source, "index ready");
    Ok(())
}

pub async fn forget(cli: &Cli, args: &DocumentArgs) -> Result<()> {
    let document = DocumentId::new(args.document.as_str())?;
    // Each invocation is its own process with no in-memory cache, so deleting
    // the persisted file is all `DocQaPipeline::forget` would do here, minus
    // the provider credentials building a pipeline requires.
    FsIndexStore::new(cli.index_dir.clone()).delete(&document).await?;
    info!(document.id = %document, "index forgotten");
    Ok(())
}

pub async fn list(cli: &Cli) -> Result<()> {
    let loader = FsDocumentLoader::new(cli.docs_dir.clone());
    let store = FsIndexStore::new(cli.index_dir.clone());

    let documents = loader
        .list()
        .await
        .with_context(|| format!("failed to list {}", cli.docs_dir.display()))?;
    for document in documents {
        let marker = if store.contains(&document).await? { "indexed" } else { "-" };
        println!("{marker:8} {document}");
    }
    Ok(())
}
