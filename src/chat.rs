//! One-shot question answering over a processed document.
//!
//! `deck chat <document_id> "<question>"` packs the sections of the
//! document's current version into a single prompt (in reading order, up to
//! a character budget) and sends it through the resilient completion
//! client. Failures are classified and shown with the localized message.

use anyhow::{anyhow, bail, Result};

use crate::completion::{create_client, ChatMessage, CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::db;
use crate::error::{structure, ErrorContext};
use crate::models::DocumentSection;
use crate::store::{DocumentStore, SqliteDocumentStore};

/// Context characters sent along with a question.
pub const CONTEXT_BUDGET_CHARS: usize = 12_000;

/// Build the request: a system prompt carrying as many whole sections as fit
/// in `budget_chars`, then the user's question. At least one section is
/// always included, truncated if it alone exceeds the budget.
pub fn build_chat_request(
    model: &str,
    title: &str,
    sections: &[DocumentSection],
    question: &str,
    budget_chars: usize,
    max_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    let mut context = String::new();
    let mut used = 0;
    for (i, section) in sections.iter().enumerate() {
        let block = format!("## {}\n{}\n\n", section.heading, section.content);
        let len = block.chars().count();
        if i > 0 && used + len > budget_chars {
            break;
        }
        if len > budget_chars {
            context.extend(block.chars().take(budget_chars));
            break;
        }
        context.push_str(&block);
        used += len;
    }

    let system = format!(
        "You are a study assistant. Answer using only the study material below from \"{}\". \
         If the material does not contain the answer, say so.\n\n{}",
        title,
        context.trim_end()
    );

    CompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system), ChatMessage::user(question)],
        max_tokens,
        temperature,
    }
}

pub async fn run_chat(config: &Config, document_id: &str, question: &str) -> Result<()> {
    if !config.completion.is_enabled() {
        bail!("No completion provider configured. Set [completion] provider in the config.");
    }

    let pool = db::connect(&config.db.path).await?;
    let store = SqliteDocumentStore::new(pool);

    let doc = store
        .get_document(document_id)
        .await?
        .ok_or_else(|| anyhow!("document not found: {}", document_id))?;
    let version_id = doc
        .current_version_id
        .clone()
        .ok_or_else(|| anyhow!("document {} has not been processed yet", document_id))?;
    let sections = store.list_sections(&version_id).await?;

    let context = ErrorContext::for_document(&doc.user_id, &doc.id).with("phase", "chat");
    let client = create_client(&config.completion, &config.retry, config.locale)?
        .with_context(context.clone());

    let request = build_chat_request(
        client.default_model(),
        &doc.title,
        &sections,
        question,
        CONTEXT_BUDGET_CHARS,
        config.completion.max_tokens,
        config.completion.temperature,
    );

    match client.complete(&request).await {
        Ok(answer) => {
            println!("{}", answer.trim());
            store.pool().close().await;
            Ok(())
        }
        Err(e) => {
            let err = structure(e, context, config.locale);
            eprintln!("{}", err.user_message);
            store.pool().close().await;
            Err(err.into())
        }
    }
}
