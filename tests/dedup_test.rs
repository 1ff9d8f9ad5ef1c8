mod helpers;

use context_memory::memory::store::auto_save_brief;
use helpers::test_store;

const WINDOW: u32 = 5;

#[test]
fn recent_rich_session_skips_auto_save() {
    let t = test_store();
    t.save("rich", Some("/work/app"), "Implemented OAuth refresh", &["auth"]);
    assert!(t.store.should_skip_auto_save("/work/app", WINDOW).unwrap());
}

#[test]
fn equivalent_path_spelling_matches() {
    let t = test_store();
    t.save("rich", Some("/work/app"), "Implemented OAuth refresh", &[]);
    assert!(t.store.should_skip_auto_save("/work/app/", WINDOW).unwrap());
    assert!(t.store.should_skip_auto_save("/work/./app", WINDOW).unwrap());
}

#[test]
fn different_project_does_not_skip() {
    let t = test_store();
    t.save("rich", Some("/work/app"), "Implemented OAuth refresh", &[]);
    assert!(!t.store.should_skip_auto_save("/work/other", WINDOW).unwrap());
}

#[test]
fn expired_window_does_not_skip() {
    let t = test_store();
    t.save("rich", Some("/work/app"), "Implemented OAuth refresh", &[]);
    t.age_session_minutes("rich", WINDOW + 10);
    assert!(!t.store.should_skip_auto_save("/work/app", WINDOW).unwrap());
}

#[test]
fn auto_save_history_does_not_skip() {
    let t = test_store();
    t.save("auto-1", Some("/work/app"), &auto_save_brief(None), &["auto-save"]);
    t.save("auto-2", Some("/work/app"), &auto_save_brief(Some("fix the tests")), &["auto-save"]);
    assert!(!t.store.should_skip_auto_save("/work/app", WINDOW).unwrap());
}

#[test]
fn session_without_summary_does_not_skip() {
    let t = test_store();
    t.store.save_session("bare", Some("/work/app"), None).unwrap();
    assert!(!t.store.should_skip_auto_save("/work/app", WINDOW).unwrap());
}

#[test]
fn legacy_timestamp_inside_window_skips() {
    let t = test_store();
    t.save("rich", Some("/work/app"), "Implemented OAuth refresh", &[]);
    let two_minutes_ago = (chrono::Utc::now() - chrono::Duration::minutes(2))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    t.set_session_times("rich", &two_minutes_ago, &two_minutes_ago);
    assert!(t.store.should_skip_auto_save("/work/app", WINDOW).unwrap());
}
