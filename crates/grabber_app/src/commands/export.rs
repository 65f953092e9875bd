use std::fs;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{bail, Context as _};
use grabber_core::{DeliveryMode, ExportFormat, ExportOutcome, ExportRequest, NamingMode};
use grabber_engine::{
    ChannelProgressSink, DirectorySink, ExportEvent, FetchSettings, Orchestrator,
    RasterConverter, ReqwestFetcher,
};
use grabber_logging::grab_info;
use serde_json::Value;

use super::Context;
use crate::cli::ExportArgs;

pub(super) async fn run(ctx: &Context, args: ExportArgs) -> anyhow::Result<ExitCode> {
    let file = match &args.request {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
            Some(serde_json::from_str::<Value>(&text).with_context(|| format!("parsing {path:?}"))?)
        }
        None => None,
    };

    let selection = ctx.selection_store();
    let stored = selection.get().await?;
    let request = build_request(&ctx.config.defaults_json(), file.as_ref(), &args, stored)?;
    grab_info!(
        "Exporting {} urls into {:?}",
        request.urls.len(),
        ctx.config.output_dir
    );

    let fetcher = ReqwestFetcher::new(FetchSettings {
        request_timeout: ctx.config.fetch_timeout(),
        ..FetchSettings::default()
    })?;
    let (tx, rx) = mpsc::channel();
    let orchestrator = Orchestrator::new(
        Arc::new(fetcher),
        Arc::new(RasterConverter),
        Arc::new(DirectorySink::new(ctx.config.output_dir.clone())),
        selection,
    )
    .with_progress(Arc::new(ChannelProgressSink::new(tx)));

    let show_progress = !ctx.json;
    let reporter = thread::spawn(move || {
        for event in rx {
            if show_progress {
                report(&event);
            }
        }
    });

    let outcome = orchestrator.run(request).await;
    drop(orchestrator);
    let _ = reporter.join();

    ctx.print(&outcome.to_json(), || match &outcome {
        ExportOutcome::Completed => println!("Export finished."),
        ExportOutcome::Rejected(error) => println!("Export failed: {error}"),
        ExportOutcome::PartialFailure(failures) => {
            println!("Export finished with {} failures:", failures.len());
            for failure in failures {
                println!("  {}: {}", failure.url, failure.error);
            }
        }
    })?;

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(event: &ExportEvent) {
    match event {
        ExportEvent::BatchStarted { index, size } => {
            eprintln!("batch {} ({size} items)", index + 1)
        }
        ExportEvent::ItemSaved { filename, .. } => eprintln!("saved {filename}"),
        ExportEvent::ItemFailed { url, error } => eprintln!("failed {url}: {error}"),
        ExportEvent::ArchiveSaved { filename, entries } => {
            eprintln!("saved {filename} ({entries} entries)")
        }
    }
}

/// Config defaults, then the request file, then command-line flags.
///
/// URLs come from the request file when it has any, else from the stored selection.
fn build_request(
    defaults: &Value,
    file: Option<&Value>,
    args: &ExportArgs,
    stored_selection: Vec<String>,
) -> anyhow::Result<ExportRequest> {
    let mut request = ExportRequest::from_json(defaults);
    if let Some(file) = file {
        request = request.merge_json(file);
    }
    if request.urls.is_empty() {
        request.urls = stored_selection;
    }

    if args.archive {
        request.delivery_mode = DeliveryMode::Archive;
    }
    if let Some(format) = &args.format {
        let Some(parsed) = ExportFormat::parse(format) else {
            bail!("unknown format {format:?}");
        };
        request.format = parsed;
    }
    if let Some(quality) = args.quality {
        request.quality = quality;
    }
    if let Some(folder) = &args.folder {
        request.folder_name = folder.clone();
    }
    if let Some(naming) = &args.naming {
        let Some(parsed) = NamingMode::parse(naming) else {
            bail!("unknown naming mode {naming:?}");
        };
        request.naming_mode = parsed;
    }
    if let Some(template) = &args.template {
        request.custom_template = template.clone();
        if args.naming.is_none() {
            request.naming_mode = NamingMode::Custom;
        }
    }
    if let Some(batch_size) = args.batch_size {
        request.batch_size = usize::try_from(batch_size)?;
    }
    if let Some(delay) = args.delay_ms {
        request.inter_batch_delay_ms = delay;
    }
    if args.low_perf {
        request.low_performance_mode = true;
    }
    if let Some(title) = &args.title {
        request.page_title = title.clone();
    }
    if let Some(site) = &args.site {
        request.site_id = site.clone();
    }
    Ok(request)
}
