//! Performance benchmarks for vault processing
//!
//! These benchmarks run against a generated vault of linked pages to measure:
//! - Full scans (read, parse, index, link graph)
//! - Page rendering with reference resolution
//! - Incremental changes, applied directly and through the sync loop
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use folio_core::{
    codec::parse_page,
    config::VaultConfig,
    event::{Event, FileEvent},
    sync::{change_channel, run_sync_loop},
    vault::VaultIndex,
};
use parking_lot::RwLock;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::sync::broadcast;

const FOLDERS: usize = 10;
const PAGES_PER_FOLDER: usize = 50;

fn page_content(folder: usize, page: usize) -> String {
    let next = (page + 1) % PAGES_PER_FOLDER;
    let other = (folder + 1) % FOLDERS;
    format!(
        "---\ntitle: Page {folder}-{page}\ntags: [folder-{folder}, bench]\nrank: {page}\n---\n\
         # Summary\n\nLinks to [[Page {folder}-{next}]] and [[Page {other}-{page}|a neighbour]].\n\n\
         ## Details\n\nSee also [[Missing {page}]] and ||a secret||.\n\n\
         ```\n[[Not a reference]]\n```\n"
    )
}

// Vault corpus setup: FOLDERS x PAGES_PER_FOLDER pages, each with three references
fn setup_vault() -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("vault");
    for folder in 0..FOLDERS {
        let dir = root.join(format!("Folder {folder}"));
        std::fs::create_dir_all(&dir)?;
        for page in 0..PAGES_PER_FOLDER {
            std::fs::write(
                dir.join(format!("Page {folder}-{page}.md")),
                page_content(folder, page),
            )?;
        }
    }
    Ok((temp_dir, root))
}

// Benchmark: Full scan of the generated vault
fn bench_full_scan(c: &mut Criterion) {
    let (_temp_dir, root) = setup_vault().unwrap();

    c.bench_function("full_scan", |b| {
        b.iter(|| {
            let index = VaultIndex::build(&root, VaultConfig::default()).unwrap();
            index.page_count()
        });
    });
}

// Benchmark: Parsing a single page
fn bench_parse_page(c: &mut Criterion) {
    let content = page_content(3, 7);

    c.bench_function("parse_page", |b| {
        b.iter(|| parse_page(&content).references.len());
    });
}

// Benchmark: Rendering a page against a populated index
fn bench_render_page(c: &mut Criterion) {
    let (_temp_dir, root) = setup_vault().unwrap();
    let index = VaultIndex::build(&root, VaultConfig::default()).unwrap();
    let path = index.root().join("Folder 3/Page 3-7.md");
    let content = std::fs::read_to_string(&path).unwrap();

    c.bench_function("render_page", |b| {
        b.iter(|| index.render(Some(&path), &content).outline.len());
    });
}

// Benchmark: Applying one content change directly to the index
fn bench_apply_change(c: &mut Criterion) {
    let (_temp_dir, root) = setup_vault().unwrap();
    let mut index = VaultIndex::build(&root, VaultConfig::default()).unwrap();
    let path = index.root().join("Folder 0/Page 0-0.md");
    let mut counter = 0usize;

    c.bench_function("apply_change", |b| {
        b.iter(|| {
            counter += 1;
            std::fs::write(&path, format!("Edit {counter} links to [[Page 1-{}]]", counter % 50))
                .unwrap();
            index.apply_change(&FileEvent::Modified(path.clone())).changed
        });
    });
}

// Benchmark: A burst of changes coalesced and applied by the sync loop
fn bench_sync_loop_burst(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_temp_dir, root) = setup_vault().unwrap();
    let index = Arc::new(RwLock::new(
        VaultIndex::build(&root, VaultConfig::default()).unwrap(),
    ));
    let pages: Vec<PathBuf> = index.read().pages().into_iter().map(|h| h.path).collect();

    c.bench_function("sync_loop_burst", |b| {
        b.to_async(&rt).iter(|| async {
            let (sender, receiver) = change_channel(1024);
            let (events, mut updates) = broadcast::channel::<Event>(16);
            let handle = tokio::spawn(run_sync_loop(
                index.clone(),
                receiver,
                events,
                Duration::from_millis(1),
            ));
            for path in pages.iter().take(100) {
                sender.send(FileEvent::Modified(path.clone())).unwrap();
            }
            drop(sender);
            handle.await.unwrap();
            updates.try_recv().is_ok()
        });
    });
}

criterion_group!(
    benches,
    bench_full_scan,
    bench_parse_page,
    bench_render_page,
    bench_apply_change,
    bench_sync_loop_burst
);
criterion_main!(benches);
