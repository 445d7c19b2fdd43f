// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use credsweep::repository::Database;
use git2::{Repository, Signature};
use std::path::PathBuf;
use tempfile::TempDir;

/// Create in-memory database for benchmarks
pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Create a temporary git repository for benchmarks
pub fn create_bench_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = Repository::init(&repo_path).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Bench User").unwrap();
    config.set_str("user.email", "bench@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Add files and create a commit
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str) -> git2::Oid {
    let sig = Signature::now("Bench User", "bench@example.com").unwrap();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(std::path::Path::new(path)).unwrap();
    }

    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());

    if let Some(parent) = parent {
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent]).unwrap()
    } else {
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[]).unwrap()
    }
}

/// Source-like files; every tenth one carries an assigned secret
pub fn generate_files(num_files: usize) -> Vec<(String, Vec<u8>)> {
    (0..num_files)
        .map(|i| {
            let path = format!("src/dir_{}/file_{}.rs", i % 50, i);
            let secret = if i % 10 == 0 {
                format!("const API_TOKEN: &str = \"tok_{:08}abcdef\";\n", i)
            } else {
                String::new()
            };
            let content = format!("// File {}\n{}fn func_{}() {{}}\n", i, secret, i).into_bytes();
            (path, content)
        })
        .collect()
}
