#![warn(clippy::pedantic)]

pub mod canvas;
pub mod render_device;
pub mod renderer;
pub mod replay;
pub mod settings;
pub mod view_transform;

use anyhow::Result as AnyResult;
use daub_core::{
    brush::Brush,
    document::{load_document, store::BlobStore, store::FolderStore, DocumentMeta, DocumentSnapshot},
    document::debounce::SaveDebouncer,
    state::CanvasData,
};
use std::{path::PathBuf, sync::Arc};

/// Longest side of the preview written next to each document.
const PREVIEW_SIZE: u32 = 256;
const PREVIEW_FILE: &str = "preview.png";

/// Open the first document in the store, or start a new one from settings.
fn open_or_create(
    context: &Arc<render_device::RenderContext>,
    store: &FolderStore,
    settings: &settings::Settings,
) -> AnyResult<(DocumentMeta, canvas::Canvas)> {
    if let Some(id) = store.documents()?.into_iter().next() {
        let bytes = store
            .read_meta(id)?
            .ok_or_else(|| anyhow::anyhow!("document {id} vanished"))?;
        let peek: DocumentMeta = serde_json::from_slice(&bytes)?;
        let mut renderer = renderer::Renderer::new(context.clone(), peek.size)?;
        let (meta, mut data, report) = load_document(store, id, &mut renderer)?;
        if !report.is_complete() {
            log::warn!(
                "{id} loaded with {} missing blobs and {} dropped elements",
                report.missing.len(),
                report.dropped_elements.len()
            );
        }
        data.set_stroke_commit(settings.stroke_commit);
        log::info!("Opened {id}");
        let canvas = canvas::Canvas::from_parts(data, renderer, meta.background, meta.size);
        Ok((meta, canvas))
    } else {
        let mut meta = DocumentMeta::new(settings.canvas_size);
        meta.default_brush = settings.brush.clone();
        meta.background = settings.background;
        let renderer = renderer::Renderer::new(context.clone(), meta.size)?;
        let mut data = CanvasData::new();
        data.set_stroke_commit(settings.stroke_commit);
        log::info!("Created {}", meta.id);
        let canvas = canvas::Canvas::from_parts(data, renderer, meta.background, meta.size);
        Ok((meta, canvas))
    }
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    // Everything passes the logger, the max level below does the filtering.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Trace);
    }
    let settings = settings::Settings::get();
    log::set_max_level(settings.log_level.into());
    if settings.did_fail_to_load() {
        log::warn!("Running with default settings.");
    }

    // Args are `[document dir] [strokes.json]`.
    // Paths are OSStrings, let the system handle character encoding restrictions.
    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let root = args
        .next()
        .or_else(|| settings.document_root())
        .ok_or_else(|| anyhow::anyhow!("No document folder given, and none configured"))?;
    let strokes = args.next();
    std::fs::create_dir_all(&root)?;

    let context = render_device::RenderContext::new_headless()?;
    let store = Arc::new(FolderStore::new(root));
    let (mut meta, mut canvas) = open_or_create(&context, &store, settings)?;
    canvas.set_scale_factor(settings.scale_factor);

    if let Some(path) = strokes {
        let recording = replay::load(&path)?;
        let mut brush = Brush::new("default", meta.default_brush.clone());
        let played = replay::play(&mut brush, &recording, &mut canvas);
        if canvas.finish().is_none() && played > 0 {
            log::warn!("Replayed {played} strokes but nothing was committed");
        }
    }

    canvas.present()?;
    let preview = canvas.thumbnail(PREVIEW_SIZE)?.to_png()?;
    let document_dir = store.root().join(meta.id.to_string());
    std::fs::create_dir_all(&document_dir)?;
    std::fs::write(document_dir.join(PREVIEW_FILE), preview)?;

    let snapshot = {
        let (data, renderer) = canvas.parts();
        DocumentSnapshot::capture(&mut meta, data, renderer)
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let debouncer = SaveDebouncer::new(settings.save_delay(), runtime.handle().clone());
    {
        let store = store.clone();
        debouncer.schedule(meta.id, move || async move {
            if let Err(e) = snapshot.write(&*store) {
                log::error!("Failed to save {}: {e}", snapshot.meta.id);
            }
        });
    }
    // Nothing else is coming, don't wait out the delay.
    runtime.block_on(debouncer.flush());

    if let Err(e) = settings.save() {
        log::warn!("Failed to save settings:\n{e:?}");
    };
    Ok(())
}
