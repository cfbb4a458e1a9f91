//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Create a small vault under `temp_dir` and return its canonical root.
///
/// - `People/Ada.md`: tags, an infobox image, layout rules, two headings, a spoiler, a resolved
///   reference to Babbage and a broken one to "Analytical Engine"
/// - `People/Babbage.md`: two references to Ada
/// - `Places/London.md`: one reference to Ada and an image embed
/// - `images/portrait.png`, `images/map.png`
/// - `.obsidian/workspace.md`: hidden, never indexed
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir) -> PathBuf {
    let root = std::fs::canonicalize(temp_dir.path()).unwrap().join("vault");
    std::fs::create_dir(&root).unwrap();

    let ada = r#"---
title: Ada
tags: [person, npc]
image: portrait.png
born: 1815
died: 1852
layout:
  - type: header
    text: Basics
    anchor: born
  - type: group
    render_as: columns
    keys: [born, died]
---
# Early life

Ada worked with [[Babbage]] on the [[Analytical Engine|engine]].

## Notes

||She wrote the first program||
"#;
    write(&root, "People/Ada.md", ada);
    write(
        &root,
        "People/Babbage.md",
        "---\ntags: [person]\n---\nSee [[Ada]] and [[Ada#Early life|her youth]].\n",
    );
    write(
        &root,
        "Places/London.md",
        "---\ntags: [place]\n---\n[[Ada]] lived here.\n\n![[map.png|Map of London]]\n",
    );
    write(&root, "images/portrait.png", "not really a png");
    write(&root, "images/map.png", "not really a png");
    write(&root, ".obsidian/workspace.md", "[[Hidden]]");

    root
}
