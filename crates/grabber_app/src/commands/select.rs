use std::process::ExitCode;

use grabber_core::ToggleOutcome;
use serde_json::json;

use super::Context;
use crate::cli::SelectAction;

pub(super) async fn run(ctx: &Context, action: SelectAction) -> anyhow::Result<ExitCode> {
    let store = ctx.selection_store();
    match action {
        SelectAction::List => {
            let urls = store.get().await?;
            ctx.print(&json!({ "ok": true, "selection": urls }), || {
                for url in &urls {
                    println!("{url}");
                }
                println!("{} of {} selected", urls.len(), store.cap());
            })?;
        }
        SelectAction::Toggle { url } => {
            let outcome = store.toggle(&url).await?;
            let (label, ok) = match outcome {
                ToggleOutcome::Added => ("added", true),
                ToggleOutcome::Removed => ("removed", true),
                ToggleOutcome::AtCapacity => ("selection full", false),
                ToggleOutcome::Ignored => ("ignored", false),
            };
            ctx.print(&json!({ "ok": ok, "result": label }), || {
                println!("{label}: {url}");
            })?;
            if !ok {
                return Ok(ExitCode::FAILURE);
            }
        }
        SelectAction::Add { urls } => {
            let requested = urls.len();
            let selection = store.add_all(urls).await?;
            ctx.print(&json!({ "ok": true, "selection": selection }), || {
                println!(
                    "{} selected ({} requested, cap {})",
                    selection.len(),
                    requested,
                    store.cap()
                );
            })?;
        }
        SelectAction::Clear => {
            store.clear().await?;
            ctx.print(&json!({ "ok": true }), || println!("selection cleared"))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
