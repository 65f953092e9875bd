use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context as _};
use grabber_core::CandidateResolver;
use grabber_engine::{
    decode_page, filter_candidates, FetchSettings, Fetcher, ImageKind, PageInfo, PageScanner,
    ReqwestFetcher, ScannedImage, SelectionMode,
};
use grabber_logging::{grab_info, grab_warn};
use serde_json::json;
use url::Url;

use super::Context;
use crate::cli::ScanMode;

struct LoadedPage {
    bytes: Vec<u8>,
    content_type: Option<String>,
    url: Option<String>,
}

pub(super) async fn run(
    ctx: &Context,
    page: &str,
    mode: ScanMode,
    like: Option<&str>,
    select: bool,
) -> anyhow::Result<ExitCode> {
    let loaded = load_page(ctx, page).await?;
    let decoded = decode_page(&loaded.bytes, loaded.content_type.as_deref());
    if decoded.lossy {
        grab_warn!(
            "Page {} contained bytes invalid in {}",
            page,
            decoded.encoding_label
        );
    }

    let info = PageInfo::from_html(&decoded.html, loaded.url.as_deref());
    let resolver = CandidateResolver::new(info.base_url.clone());
    let images = PageScanner::new().scan(&decoded.html, &resolver);
    let mode = selection_mode(mode, like, &images, &resolver)?;
    let candidates = filter_candidates(&images, mode);
    grab_info!(
        "Scanned {}: {} images, {} candidates",
        page,
        images.len(),
        candidates.len()
    );

    let selection = if select {
        Some(ctx.selection_store().add_all(candidates.clone()).await?)
    } else {
        None
    };

    let data = json!({
        "ok": true,
        "page": { "title": info.title, "site": info.site_id },
        "candidates": candidates,
        "selection": selection,
    });
    ctx.print(&data, || {
        println!("{} ({})", info.title, info.site_id);
        for url in &candidates {
            println!("  {url}");
        }
        if let Some(selection) = &selection {
            println!("{} selected", selection.len());
        }
    })?;
    Ok(ExitCode::SUCCESS)
}

async fn load_page(ctx: &Context, page: &str) -> anyhow::Result<LoadedPage> {
    if let Ok(url) = Url::parse(page) {
        if matches!(url.scheme(), "http" | "https") {
            let settings = FetchSettings {
                request_timeout: ctx.config.fetch_timeout(),
                ..FetchSettings::for_pages()
            };
            let output = ReqwestFetcher::new(settings)?
                .fetch(page)
                .await
                .with_context(|| format!("fetching {page}"))?;
            return Ok(LoadedPage {
                bytes: output.bytes.to_vec(),
                content_type: output.metadata.content_type,
                url: Some(output.metadata.final_url),
            });
        }
    }

    let path = Path::new(page);
    let bytes = fs::read(path).with_context(|| format!("reading {page}"))?;
    let url = fs::canonicalize(path)
        .ok()
        .and_then(|abs| Url::from_file_path(abs).ok())
        .map(String::from);
    Ok(LoadedPage {
        bytes,
        content_type: None,
        url,
    })
}

fn selection_mode(
    mode: ScanMode,
    like: Option<&str>,
    images: &[ScannedImage],
    resolver: &CandidateResolver,
) -> anyhow::Result<SelectionMode> {
    match mode {
        ScanMode::All => Ok(SelectionMode::default()),
        ScanMode::Large => Ok(SelectionMode::Large),
        ScanMode::SameSize => {
            let Some(like) = like else {
                bail!("--mode same-size needs --like <IMAGE URL>");
            };
            let target = resolver
                .resolve_url(like)
                .ok_or_else(|| anyhow!("cannot resolve {like}"))?;
            let reference = images
                .iter()
                .find(|image| image.kind == ImageKind::Img && image.url == target)
                .ok_or_else(|| anyhow!("{like} is not an image on this page"))?;
            match (reference.width, reference.height) {
                (Some(width), Some(height)) => Ok(SelectionMode::SameSize { width, height }),
                _ => bail!("{like} has no declared width and height"),
            }
        }
    }
}
