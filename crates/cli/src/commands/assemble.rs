//! `contexta assemble` — Assemble a budgeted context.

use contexta_core::message::{ActiveDocument, Role};
use contexta_engine::{AssembleOptions, to_prompt};

use super::{CmdResult, load_config, open_engine};
use crate::AssembleArgs;

/// Id of the throwaway session built from command-line flags.
const CLI_SESSION: &str = "cli";

pub async fn run(args: AssembleArgs) -> CmdResult {
    let config = load_config()?;
    let engine = open_engine(&config)?;

    let session_id = if args.messages.is_empty() && args.intent.is_none() && args.document.is_none() {
        None
    } else {
        let sessions = engine.sessions();
        sessions
            .create(CLI_SESSION, args.entity.clone(), args.domain.clone())
            .await;
        if let Some(intent) = &args.intent {
            sessions.set_intent(CLI_SESSION, intent.as_str()).await?;
        }
        if let Some(title) = &args.document {
            sessions
                .set_active_document(CLI_SESSION, Some(ActiveDocument::new(CLI_SESSION, title.as_str())))
                .await?;
        }
        for message in &args.messages {
            sessions
                .append_message(CLI_SESSION, Role::User, message.as_str())
                .await?;
        }
        Some(CLI_SESSION)
    };

    let options = AssembleOptions {
        total_budget: args.budget,
    };
    let entity = args.entity.as_deref();
    let context = match (&args.domain, &args.text) {
        (Some(domain), _) => engine.assemble(domain, entity, session_id, options).await?,
        (None, Some(text)) => {
            engine
                .assemble_for_text(text, entity, session_id, options)
                .await?
        }
        (None, None) => return Err("either --domain or --text is required".into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    if args.prompt {
        println!("{}", to_prompt(&context));
    } else {
        println!("{}", context.text());
    }

    let meta = &context.metadata;
    eprintln!();
    eprintln!(
        "📐 {} / {} tokens ({:.1}%) for domain {}",
        context.token_breakdown.total, meta.total_budget, meta.utilization_pct, meta.domain_id
    );
    for layer in &meta.layers {
        eprintln!(
            "   {:<8} {:>5} / {:<5} {}",
            layer.layer.as_str(),
            layer.tokens,
            layer.budget,
            if layer.present { "" } else { "(empty)" }
        );
    }
    for drop in &meta.drops {
        eprintln!(
            "   ✂️  {}: dropped {} item(s), ~{} tokens ({})",
            drop.layer, drop.items_dropped, drop.tokens_dropped, drop.reason
        );
    }
    Ok(())
}
