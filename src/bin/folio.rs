//! folio CLI tool
//!
//! Command-line interface for inspecting and watching a vault with folio-core.
//!
//! ## Commands
//!
//! - `scan <vault>`: Index a vault once and print a summary
//! - `render <vault> <page>`: Render one page to HTML (or JSON)
//! - `broken <vault>`: List unresolved references
//! - `tags <vault>`: List tags and their pages
//! - `watch <vault>`: Keep the index live and report updates until Ctrl-C

use clap::{Parser, Subcommand};
use folio_core::{query::VaultService, watch::WatchService};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about = "Index, render and watch a vault of linked markdown pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a vault once and display a summary
    Scan {
        /// Vault root directory
        vault: PathBuf,

        /// Also recompute every derived structure and report inconsistencies
        #[arg(long)]
        check: bool,

        /// List pages that were indexed with errors
        #[arg(short, long)]
        verbose: bool,
    },

    /// Render a page
    Render {
        /// Vault root directory
        vault: PathBuf,

        /// Page path, relative to the vault root
        page: PathBuf,

        /// Print the whole page view as JSON instead of HTML
        #[arg(long)]
        json: bool,
    },

    /// List references whose target page does not exist
    Broken {
        /// Vault root directory
        vault: PathBuf,
    },

    /// List tags with the pages carrying them
    Tags {
        /// Vault root directory
        vault: PathBuf,
    },

    /// Watch a vault for changes and keep its index live
    Watch {
        /// Vault root directory
        vault: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            vault,
            check,
            verbose,
        } => {
            let service = VaultService::open(&vault)?;
            let index = service.read();
            let pages = index.pages();
            let with_errors: Vec<_> = pages
                .iter()
                .filter_map(|h| index.page(&h.path))
                .filter(|record| !record.errors.is_empty())
                .collect();

            println!("\n=== Scan Results ===");
            println!("Pages: {}", pages.len());
            println!("Folders: {}", index.directory_paths().len());
            println!("Tags: {}", index.tags().len());
            println!("References: {}", index.graph().edge_count());
            println!("Broken targets: {}", index.broken_links().len());
            println!("Pages with errors: {}", with_errors.len());

            if verbose {
                for record in with_errors {
                    for error in record.errors.iter() {
                        println!("  {}: {}", record.path.display(), error);
                    }
                }
            }

            if check {
                let problems = index.check_consistency();
                if problems.is_empty() {
                    println!("Consistency check passed");
                } else {
                    for problem in problems.iter() {
                        println!("  {problem}");
                    }
                    return Err(format!("{} consistency problems", problems.len()).into());
                }
            }
            Ok(())
        }

        Commands::Render { vault, page, json } => {
            let service = VaultService::open(&vault)?;
            let view = service.build_page_view(&page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", view.rendered.html_before_toc);
                for entry in view.rendered.outline.iter() {
                    println!("<!-- {} {} (#{}) -->", entry.number, entry.text, entry.id);
                }
                println!("{}", view.rendered.html_after_toc);
                if let Some(error) = view.rendered.metadata_error {
                    eprintln!("metadata error: {error}");
                }
                for target in view.rendered.unresolved_links.iter() {
                    eprintln!("unresolved reference: {target}");
                }
                for src in view.rendered.unresolved_images.iter() {
                    eprintln!("missing image: {src}");
                }
            }
            Ok(())
        }

        Commands::Broken { vault } => {
            let service = VaultService::open(&vault)?;
            for broken in service.broken_links_report() {
                let sources: Vec<String> = broken.sources.iter().map(|h| h.title.clone()).collect();
                println!("{} <- {}", broken.target, sources.join(", "));
            }
            Ok(())
        }

        Commands::Tags { vault } => {
            let service = VaultService::open(&vault)?;
            for (tag, pages) in service.get_all_tags() {
                let titles: Vec<String> = pages.iter().map(|h| h.title.clone()).collect();
                println!("#{tag} ({}): {}", pages.len(), titles.join(", "));
            }
            Ok(())
        }

        Commands::Watch { vault } => {
            let service = VaultService::open(&vault)?;
            let mut updates = service.subscribe();
            let reporter = service.clone();

            // Spawn event handler thread
            let event_handle = std::thread::spawn(move || loop {
                match updates.blocking_recv() {
                    Ok(event) => println!(
                        "[Event] {} ({} pages, {} broken targets)",
                        event,
                        reporter.get_all_pages().len(),
                        reporter.broken_links_report().len()
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("event reporter skipped {} updates", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            });

            let watcher = WatchService::new(service)?;
            println!(
                "Watching {} for changes. Press Ctrl-C to stop.",
                vault.display()
            );

            // Set up Ctrl-C handler
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            // Keep running until Ctrl-C
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }

            // Cleanup
            watcher.stop()?;
            drop(watcher);
            drop(event_handle);

            println!("Shutdown complete");
            Ok(())
        }
    }
}
