use crate::error::StorageError;
use crate::message::{ProtocolRequest, TaskInfo};
use crate::storage::{FileName, ProtocolStorage, auto_file_name, sanitize_name};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

fn protocol(name: &str) -> ProtocolRequest {
    ProtocolRequest::new(name, "P01").with_task(TaskInfo::new("calibration", "{}"))
}

#[test]
fn given_missing_directory_when_storage_opened_then_directory_is_created() {
    let root = TempDir::new().expect("temp dir");
    let dir = root.path().join("nested").join("protocols");

    let storage = ProtocolStorage::new(&dir).expect("open");

    assert!(dir.is_dir());
    assert_eq!(storage.storage_dir(), dir.as_path());
}

#[test]
fn given_saved_protocol_when_loaded_then_equals_original() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let original = protocol("Foo").with_notes("pilot");

    let path = storage
        .save(&original, FileName::Custom("foo.json".to_string()))
        .expect("save");
    let loaded = storage.load(&path).expect("load");

    assert_eq!(path, root.path().join("foo.json"));
    assert_eq!(loaded, original);
}

/// **VALUE**: Saving over an existing file replaces it and leaves no temp files.
///
/// **WHY THIS MATTERS**: Protocol files are written through a temp file and a
/// rename. A leftover `.tmp_*` file would clutter the directory forever.
///
/// **BUG THIS CATCHES**: Writing in place, or leaking the temp file on success.
#[test]
fn given_existing_file_when_saved_again_then_replaced_without_temp_files() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let name = FileName::Custom("foo.json".to_string());

    storage.save(&protocol("First"), name.clone()).expect("save");
    let path = storage.save(&protocol("Second"), name).expect("save");

    assert_eq!(storage.load(&path).expect("load").name, "Second");
    let entries: Vec<_> = std::fs::read_dir(root.path())
        .expect("read dir")
        .flatten()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(entries.len(), 1, "unexpected files: {entries:?}");
}

#[test]
fn given_fixed_time_when_auto_named_then_uses_sanitised_name_and_utc_stamp() {
    // 2021-03-04T05:06:07Z
    let now = UNIX_EPOCH + Duration::from_secs(1_614_834_367);

    let name = auto_file_name("Smooth pursuit/v2", now);

    assert_eq!(name, "Smooth_pursuit_v2_20210304_050607.json");
}

#[test]
fn given_odd_characters_when_sanitised_then_replaced_by_underscore() {
    assert_eq!(sanitize_name("a b.c-d_e"), "a_b_c-d_e");
}

#[test]
fn given_auto_file_name_when_saved_then_file_lands_in_storage_dir() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");

    let path = storage.save(&protocol("Foo"), FileName::Auto).expect("save");

    assert_eq!(path.parent(), Some(root.path()));
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(file_name.starts_with("Foo_"), "got {file_name}");
    assert!(file_name.ends_with(".json"), "got {file_name}");
}

#[test]
fn given_valid_and_invalid_files_when_listed_then_invalid_are_skipped() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    storage
        .save(&protocol("Foo"), FileName::Custom("foo.json".to_string()))
        .expect("save");
    std::fs::write(root.path().join("broken.json"), "{").expect("write");
    std::fs::write(root.path().join("notes.txt"), "ignored").expect("write");

    let listed = storage.list().expect("list");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Foo");
    assert_eq!(listed[0].participant_id, "P01");
    assert_eq!(listed[0].file_name, "foo.json");
}

#[test]
fn given_files_with_different_mtimes_when_listed_then_newest_first() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let older = storage
        .save(&protocol("Older"), FileName::Custom("older.json".to_string()))
        .expect("save");
    storage
        .save(&protocol("Newer"), FileName::Custom("newer.json".to_string()))
        .expect("save");

    let past = SystemTime::now() - Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&older)
        .and_then(|file| file.set_modified(past))
        .expect("set mtime");

    let names: Vec<_> = storage
        .list()
        .expect("list")
        .into_iter()
        .map(|summary| summary.name)
        .collect();

    assert_eq!(names, vec!["Newer", "Older"]);
}

#[test]
fn given_missing_file_when_loaded_or_deleted_then_returns_not_found() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let missing = root.path().join("missing.json");

    assert!(matches!(
        storage.load(&missing),
        Err(StorageError::NotFound { .. })
    ));
    assert!(matches!(
        storage.delete(&missing),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn given_saved_file_when_deleted_then_gone() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let path = storage.save(&protocol("Foo"), FileName::Auto).expect("save");

    storage.delete(&path).expect("delete");

    assert!(!path.exists());
    assert!(storage.list().expect("list").is_empty());
}

#[test]
fn given_malformed_file_when_loaded_then_returns_parse_error() {
    let root = TempDir::new().expect("temp dir");
    let storage = ProtocolStorage::new(root.path()).expect("open");
    let path = root.path().join("bad.json");
    std::fs::write(&path, r#"{"name": "no participant"}"#).expect("write");

    assert!(matches!(
        storage.load(&path),
        Err(StorageError::Parse { .. })
    ));
}
