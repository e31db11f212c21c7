//! Build generation lifecycle: ids, aborts, commits, results and events.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_kernel::kiln_types::{CommitOp, Diagnostic};
use kiln_kernel::vfs::{MemoryFs, Vfs, WriteOptions};
use kiln_kernel::{BuildConfig, BuildController, BuildEvent, BuildStatus, WatcherResults};
use rstest::rstest;
use tokio::sync::broadcast::error::TryRecvError;

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

fn setup(config: BuildConfig) -> (Arc<MemoryFs>, BuildController) {
    let disk = Arc::new(MemoryFs::new());
    let fs = Arc::new(Vfs::new(disk.clone()));
    (disk, BuildController::new(config, fs))
}

fn rebuild() -> Option<WatcherResults> {
    Some(WatcherResults::default())
}

#[rstest]
#[case::initial(None, false, true)]
#[case::incremental(rebuild(), false, false)]
#[case::config_changed(Some(WatcherResults { config_updated: true, ..Default::default() }), false, true)]
#[case::after_error(rebuild(), true, true)]
fn requires_full_build(
    #[case] changes: Option<WatcherResults>,
    #[case] previous_failed: bool,
    #[case] expected: bool,
) {
    let (_disk, ctl) = setup(BuildConfig::default());
    if previous_failed {
        let mut failed = ctl.start_build(None);
        failed.add_diagnostic(Diagnostic::error("transpile", "boom"));
        assert!(ctl.should_abort(&mut failed));
    }

    let ctx = ctl.start_build(changes);
    assert_eq!(ctx.requires_full_build, expected);
}

#[tokio::test]
async fn superseded_build_stops_before_commit() {
    let (disk, ctl) = setup(BuildConfig::default());

    let mut first = ctl.start_build(None);
    ctl.fs().write_file("/www/a.js", "first", WriteOptions::default());

    let mut second = ctl.start_build(rebuild());
    assert!(ctl.should_abort(&mut first));
    assert_eq!(first.status, BuildStatus::Aborted);
    assert!(!ctl.should_abort(&mut second));

    assert!(ctl.commit(&mut first).await.is_none());
    assert!(disk.contents("/www/a.js").is_none());

    ctl.fs().write_file("/www/a.js", "second", WriteOptions::default());
    let summary = ctl.commit(&mut second).await.unwrap();
    assert_eq!(summary.files_written, vec![p("/www/a.js")]);
    assert_eq!(disk.contents("/www/a.js").as_deref(), Some("second"));

    let stale = ctl.finish_build(first);
    assert!(stale.aborted);
    assert!(!stale.has_error);
    let fresh = ctl.finish_build(second);
    assert!(!fresh.aborted);
}

#[test]
fn superseded_build_keeps_its_own_flavor() {
    let (_disk, ctl) = setup(BuildConfig::default().with_build_stats(true));
    let initial = ctl.start_build(None);
    let _newer = ctl.start_build(rebuild());
    let mut rx = ctl.subscribe();

    let result = ctl.finish_build(initial);
    assert!(matches!(rx.try_recv(), Ok(BuildEvent::Build(_))));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(!result.stats.expect("stats enabled").is_rebuild);
}

#[test]
fn superseded_finish_leaves_error_flag_alone() {
    let (_disk, ctl) = setup(BuildConfig::default());
    let stale = ctl.start_build(None);
    let mut active = ctl.start_build(rebuild());
    active.add_diagnostic(Diagnostic::error("transpile", "boom"));
    assert!(ctl.should_abort(&mut active));
    assert!(ctl.last_build_had_error());

    // never polled, so it still thinks it is running
    assert_eq!(stale.status, BuildStatus::Running);
    let result = ctl.finish_build(stale);
    assert!(result.aborted);
    assert!(!result.has_error);
    assert!(ctl.last_build_had_error());

    let next = ctl.start_build(rebuild());
    assert!(next.requires_full_build);
}

#[tokio::test]
async fn local_disk_controller_writes_under_root_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = BuildConfig {
        root_dir: dir.path().to_path_buf(),
        ..BuildConfig::production("shop")
    };
    let ctl = BuildController::on_local_disk(config);

    let mut ctx = ctl.start_build(None);
    ctl.fs().write_file("/www/index.html", "<html/>", WriteOptions::default());
    let summary = ctl.commit(&mut ctx).await.unwrap();
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("www/index.html")).unwrap(),
        "<html/>"
    );
    assert!(!ctl.finish_build(ctx).has_error);
}

#[tokio::test]
async fn commit_failure_fails_the_build() {
    let (disk, ctl) = setup(BuildConfig::default());
    disk.set_read_only(true);

    let mut ctx = ctl.start_build(None);
    ctl.fs().write_file("/www/a.js", "a", WriteOptions::default());
    let summary = ctl.commit(&mut ctx).await.unwrap();
    assert!(summary.has_failures());
    assert_eq!(summary.failures[0].op, CommitOp::EnsureDir);

    assert!(ctx.has_error());
    assert!(ctl.should_abort(&mut ctx));
    let result = ctl.finish_build(ctx);
    assert!(result.has_error);
    assert!(result.aborted);
    assert!(result.diagnostics.iter().all(|d| d.kind == "fs"));

    disk.set_read_only(false);
    let next = ctl.start_build(rebuild());
    assert!(next.requires_full_build);
}

#[tokio::test]
async fn events_for_build_and_rebuild() {
    let (_disk, ctl) = setup(BuildConfig::watching("app"));
    let mut rx = ctl.subscribe();

    let initial = ctl.start_build(None);
    let result = ctl.finish_build(initial);
    match rx.try_recv().unwrap() {
        BuildEvent::Build(r) => assert_eq!(r, result),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    let again = ctl.start_build(rebuild());
    let result = ctl.finish_build(again);
    let build = rx.try_recv().unwrap();
    let rebuild = rx.try_recv().unwrap();
    assert_eq!(build.name(), "build");
    assert_eq!(rebuild.name(), "rebuild");
    assert_eq!(build.result(), &result);
    assert_eq!(rebuild.result(), &result);
    assert_eq!(result.build_id, 2);
}

#[tokio::test]
async fn stats_reflect_the_generation() {
    let (_disk, ctl) = setup(BuildConfig::default().with_build_stats(true));

    let mut ctx = ctl.start_build(Some(WatcherResults {
        files_changed: vec![p("/src/b.ts"), p("/src/a.ts")],
        ..Default::default()
    }));
    ctx.transpile_build_count = 2;
    ctx.components.push("my-app".into());
    ctx.add_diagnostic(Diagnostic::warning("style", "unused selector"));
    ctx.add_diagnostic(Diagnostic::warning("style", "unused selector"));

    ctl.fs().write_file("/www/b.js", "b", WriteOptions::default());
    ctl.fs().write_file("/www/a.js", "a", WriteOptions::default());
    ctl.commit(&mut ctx).await.unwrap();

    let result = ctl.finish_build(ctx);
    assert_eq!(result.diagnostics.len(), 1);
    assert!(!result.has_error);

    let stats = result.stats.expect("stats enabled");
    assert!(stats.is_rebuild);
    assert_eq!(stats.transpile_build_count, 2);
    assert_eq!(stats.components, vec!["my-app".to_string()]);
    assert_eq!(stats.files_written, vec![p("/www/a.js"), p("/www/b.js")]);
    assert_eq!(stats.files_changed, vec![p("/src/a.ts"), p("/src/b.ts")]);
}

#[tokio::test]
async fn results_serialize_for_consumers() {
    let (_disk, ctl) = setup(BuildConfig::default());
    let mut ctx = ctl.start_build(None);
    ctx.add_diagnostic(Diagnostic::error("transpile", "bad").with_file("/src/a.ts", Some(3)));
    ctl.should_abort(&mut ctx);

    let result = ctl.finish_build(ctx);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["buildId"], 1);
    assert_eq!(json["hasError"], true);
    assert_eq!(json["aborted"], true);
    assert_eq!(json["diagnostics"][0]["severity"], "error");
    assert_eq!(json["diagnostics"][0]["line"], 3);
}
