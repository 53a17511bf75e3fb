use context_indexer::{DifferentialUpdater, FileScanner, Manifest, ScanOptions, WorkerPool};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn updater(root: &Path) -> DifferentialUpdater {
    let scanner = FileScanner::new(root, ScanOptions::default()).expect("scanner");
    DifferentialUpdater::new(scanner, WorkerPool::new(4))
}

async fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.expect("mkdir");
    }
    tokio::fs::write(path, content).await.expect("write file");
}

#[tokio::test]
async fn first_pass_adds_everything_second_pass_is_empty() {
    let temp = TempDir::new().expect("tempdir");
    write(temp.path(), "a.py", "def foo():\n    return 1\n").await;
    write(temp.path(), "pkg/b.py", "import a\n").await;

    let updater = updater(temp.path());
    let first = updater.reconcile(&Manifest::new()).await.expect("reconcile");
    let summary = first.changes.summary();
    assert_eq!(summary.added, vec!["a.py".to_string(), "pkg/b.py".to_string()]);
    assert!(summary.modified.is_empty() && summary.deleted.is_empty());
    assert_eq!(first.manifest.len(), 2);

    let second = updater.reconcile(&first.manifest).await.expect("reconcile");
    assert!(second.changes.is_empty());
    assert_eq!(second.changes.unchanged.len(), 2);
    assert_eq!(second.manifest, first.manifest);
}

#[tokio::test]
async fn only_touched_files_are_reported() {
    let temp = TempDir::new().expect("tempdir");
    for idx in 0..5 {
        write(temp.path(), &format!("m{idx}.py"), &format!("x = {idx}\n")).await;
    }
    let updater = updater(temp.path());
    let baseline = updater.reconcile(&Manifest::new()).await.expect("reconcile").manifest;

    write(temp.path(), "m2.py", "x = 'changed'\n").await;
    tokio::fs::remove_file(temp.path().join("m4.py")).await.expect("remove");
    write(temp.path(), "m9.py", "x = 9\n").await;

    let next = updater.reconcile(&baseline).await.expect("reconcile");
    let summary = next.changes.summary();
    assert_eq!(summary.added, vec!["m9.py".to_string()]);
    assert_eq!(summary.modified, vec!["m2.py".to_string()]);
    assert_eq!(summary.deleted, vec!["m4.py".to_string()]);
    assert_eq!(summary.unchanged, 3);

    let modified = &next.changes.modified[0];
    assert_eq!(&modified.bytes[..], b"x = 'changed'\n");
}

#[tokio::test]
async fn touching_a_file_without_changing_it_is_not_a_modification() {
    let temp = TempDir::new().expect("tempdir");
    write(temp.path(), "a.rs", "fn a() {}\n").await;
    let updater = updater(temp.path());
    let baseline = updater.reconcile(&Manifest::new()).await.expect("reconcile").manifest;

    write(temp.path(), "a.rs", "fn a() {}\n").await;
    let next = updater.reconcile(&baseline).await.expect("reconcile");
    assert!(next.changes.is_empty());
}

#[tokio::test]
async fn manifest_survives_a_save_load_cycle() {
    let temp = TempDir::new().expect("tempdir");
    let cache = TempDir::new().expect("cache dir");
    write(temp.path(), "lib.rs", "pub fn f() {}\n").await;

    let result = updater(temp.path())
        .reconcile(&Manifest::new())
        .await
        .expect("reconcile");
    let path = cache.path().join("manifest.json");
    result.manifest.save(&path).await.expect("save manifest");

    let (loaded, recovered) = Manifest::load_or_empty(&path).await;
    assert!(!recovered);
    let again = updater(temp.path()).reconcile(&loaded).await.expect("reconcile");
    assert!(again.changes.is_empty());
}
