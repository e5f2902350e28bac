// tests/import_pipeline.rs

mod common;
use crate::common::init_tracing;

use std::sync::Arc;
use std::time::Duration;

use sandcastle::config::ImportConfig;
use sandcastle::errors::SandcastleError;
use sandcastle::import::{ImportOutcome, ImportPipeline, SkipReason};
use sandcastle_test_utils::builders::import_config;
use sandcastle_test_utils::fake_host::{FakeHost, HostFailure};

async fn import_with(host: FakeHost, config: ImportConfig, reference: &str) -> (Arc<FakeHost>, Result<ImportOutcome, SandcastleError>) {
    init_tracing();
    let host = Arc::new(host);
    let pipeline = ImportPipeline::new(host.clone(), config).unwrap();
    let result = pipeline.import(reference).await;
    (host, result)
}

fn reasons(outcome: &ImportOutcome) -> Vec<(&str, SkipReason)> {
    outcome
        .skipped
        .iter()
        .map(|s| (s.path.as_str(), s.reason))
        .collect()
}

#[tokio::test]
async fn binary_entries_are_never_fetched() {
    let host = FakeHost::new()
        .with_blob("a.png", vec![0x89, b'P', b'N', b'G'])
        .with_file("b.txt", "bee")
        .with_file("c.txt", "sea");

    let (host, result) = import_with(host, import_config(8), "github.com/o/r").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/b.txt", "/c.txt"]);
    assert_eq!(outcome.state.get("/c.txt").unwrap().text(), "sea");
    assert_eq!(reasons(&outcome), [("a.png", SkipReason::Binary)]);
    assert!(!host.fetched().contains(&"a.png".to_string()));
    assert_eq!(outcome.revision, host.revision);
}

#[tokio::test]
async fn only_the_small_text_file_survives_admission() {
    let host = FakeHost::new()
        .with_blob("a.png", vec![0x89, b'P', b'N', b'G'])
        .with_file("b.txt", "hello")
        .with_sized_blob("c.txt", b"too big".to_vec(), 1_000_001);

    let (host, result) = import_with(host, import_config(8), "github.com/o/r").await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state.len(), 1);
    assert_eq!(outcome.state.get("/b.txt").unwrap().text(), "hello");
    assert_eq!(
        reasons(&outcome),
        [("a.png", SkipReason::Binary), ("c.txt", SkipReason::TooLarge)]
    );
    assert_eq!(host.fetched(), ["b.txt"]);
}

#[tokio::test]
async fn contents_land_on_their_own_paths_despite_completion_order() {
    let mut host = FakeHost::new();
    for i in 0..12u64 {
        host = host
            .with_file(&format!("f{i:02}.txt"), &format!("content {i}"))
            .with_delay(&format!("f{i:02}.txt"), Duration::from_millis(60 - i * 5));
    }

    let (_, result) = import_with(host, import_config(4), "github.com/o/r").await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state.len(), 12);
    for i in 0..12 {
        let record = outcome.state.get(&format!("/f{i:02}.txt")).unwrap();
        assert_eq!(record.text(), format!("content {i}"));
    }
}

#[tokio::test]
async fn undecodable_and_failed_entries_are_dropped_silently() {
    let host = FakeHost::new()
        .with_blob("data.txt", vec![0xff, 0xfe, 0x00])
        .with_file("flaky.js", "x")
        .with_fetch_failure("flaky.js", HostFailure::RateLimited)
        .with_file("ok.js", "ok");

    let (_, result) = import_with(host, import_config(2), "github.com/o/r").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/ok.js"]);
    let mut skipped = reasons(&outcome);
    skipped.sort();
    assert_eq!(
        skipped,
        [("data.txt", SkipReason::NotText), ("flaky.js", SkipReason::FetchFailed)]
    );
}

#[tokio::test]
async fn zero_survivors_fail_the_import() {
    let host = FakeHost::new()
        .with_blob("logo.PNG", vec![1, 2, 3])
        .with_blob("blob.bin", vec![0])
        .with_blob("raw.txt", vec![0xc3, 0x28]);

    let (_, result) = import_with(host, import_config(8), "github.com/o/r").await;
    assert!(matches!(result, Err(SandcastleError::NoImportableContent)));
}

#[tokio::test]
async fn subpath_selects_and_strips_the_wrapper() {
    let host = FakeHost::new()
        .with_dir("web")
        .with_file("web/index.html", "<html>")
        .with_file("web/js/app.js", "app")
        .with_file("server/main.rs", "fn main() {}");

    let (host, result) =
        import_with(host, import_config(8), "https://github.com/o/r/tree/main/web").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/index.html", "/js/app.js"]);
    assert!(!host.fetched().contains(&"server/main.rs".to_string()));
}

#[tokio::test]
async fn blob_reference_imports_only_that_file() {
    let host = FakeHost::new()
        .with_file("README.md", "# top")
        .with_dir("docs")
        .with_file("docs/guide.md", "guide")
        .with_file("docs/other.md", "other");

    let (host, result) =
        import_with(host, import_config(8), "github.com/o/r/blob/main/docs/guide.md").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/guide.md"]);
    assert_eq!(host.fetched(), ["docs/guide.md"]);

    let (_, top) = import_with(
        FakeHost::new().with_file("README.md", "# top").with_file("b.txt", "b"),
        import_config(8),
        "https://github.com/o/r/blob/main/README.md",
    )
    .await;
    let paths: Vec<_> = top.unwrap().state.paths().map(str::to_string).collect();
    assert_eq!(paths, ["/README.md"]);
}

#[tokio::test]
async fn vcs_metadata_is_excluded_before_admission() {
    let host = FakeHost::new()
        .with_file(".git/config", "[core]")
        .with_file("README.md", "# hi");

    let mut config = import_config(8);
    config.limits.max_files = 1;
    let (_, result) = import_with(host, config, "github.com/o/r").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/README.md"]);
    assert_eq!(reasons(&outcome), [(".git/config", SkipReason::VcsMetadata)]);
}

#[tokio::test]
async fn caps_stop_admission_in_listing_order() {
    let host = FakeHost::new()
        .with_file("1.txt", "one")
        .with_file("2.txt", "two")
        .with_file("3.txt", "three");

    let mut config = import_config(8);
    config.limits.max_files = 2;
    let (host, result) = import_with(host, config, "github.com/o/r").await;
    let outcome = result.unwrap();

    let paths: Vec<_> = outcome.state.paths().collect();
    assert_eq!(paths, ["/1.txt", "/2.txt"]);
    assert_eq!(reasons(&outcome), [("3.txt", SkipReason::FileCountCap)]);
    assert_eq!(host.fetched().len(), 2);
}

#[tokio::test]
async fn oversized_files_are_skipped_by_reported_size() {
    let host = FakeHost::new()
        .with_sized_blob("huge.json", b"{}".to_vec(), 5_000_000)
        .with_file("small.json", "{}");

    let (_, result) = import_with(host, import_config(8), "github.com/o/r").await;
    let outcome = result.unwrap();
    assert_eq!(reasons(&outcome), [("huge.json", SkipReason::TooLarge)]);
}

#[tokio::test]
async fn listing_problems_reject_the_whole_import() {
    let truncated = FakeHost::new().with_file("a.txt", "a").truncated();
    let (_, result) = import_with(truncated, import_config(8), "github.com/o/r").await;
    assert!(matches!(result, Err(SandcastleError::ArchiveTooLargeOrTruncated(_))));

    let big = FakeHost::new()
        .with_file("a.txt", "a")
        .with_file("b.txt", "b")
        .with_file("c.txt", "c");
    let mut config = import_config(8);
    config.max_listing_entries = 2;
    let (host, result) = import_with(big, config, "github.com/o/r").await;
    assert!(matches!(result, Err(SandcastleError::ArchiveTooLargeOrTruncated(_))));
    assert!(host.fetched().is_empty());
}

#[tokio::test]
async fn early_stage_failures_keep_their_kind() {
    let (_, private) = import_with(
        FakeHost::new().with_file("a.txt", "a").private(),
        import_config(8),
        "github.com/o/r",
    )
    .await;
    assert!(matches!(private, Err(SandcastleError::PrivateUnsupported)));

    let (_, missing) = import_with(
        FakeHost::new().with_metadata_failure(HostFailure::NotFound),
        import_config(8),
        "github.com/o/r",
    )
    .await;
    assert!(matches!(missing, Err(SandcastleError::ProjectNotFound(_))));

    let (_, limited) = import_with(
        FakeHost::new().with_metadata_failure(HostFailure::RateLimited),
        import_config(8),
        "github.com/o/r",
    )
    .await;
    assert!(matches!(limited, Err(SandcastleError::RateLimited)));

    let (host, foreign) = import_with(
        FakeHost::new().with_file("a.txt", "a"),
        import_config(8),
        "https://gitlab.com/o/r",
    )
    .await;
    assert!(matches!(foreign, Err(SandcastleError::UnsupportedHost(_))));
    assert!(host.fetched().is_empty());
}
