//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations and their error cases
//! - Active file rotation
//! - Recovery by replaying data files
//! - Sync strategies, stat, list_keys, fold
//! - Concurrent access patterns
//! - Engine lifecycle (open/close)

use std::fs;
use std::sync::Arc;
use std::thread;

use caskkv::data::{data_file_path, DataFile, LogRecord};
use caskkv::{CaskError, Config, Engine, IndexKind, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .sync_writes(true) // Sync every write for test reliability
        .max_file_size(1024 * 1024) // 1 MB
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine_with_small_files() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .max_file_size(128) // Very small to trigger rotation
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn reopen(temp_dir: &TempDir, max_file_size: u64) -> Engine {
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .max_file_size(max_file_size)
        .build();
    Engine::open(config).unwrap()
}

// =============================================================================
// Open / Config Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let config = Config::builder().dir_path(&data_dir).build();
    let engine = Engine::open(config).unwrap();

    assert!(data_dir.is_dir());
    assert_eq!(engine.active_file_id(), None);
}

#[test]
fn test_engine_open_rejects_zero_file_size() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .max_file_size(0)
        .build();

    let result = Engine::open(config);
    assert!(matches!(result, Err(CaskError::InvalidConfig(_))));
}

#[test]
fn test_engine_open_rejects_empty_dir() {
    let config = Config::builder().dir_path("").build();

    let result = Engine::open(config);
    assert!(matches!(result, Err(CaskError::InvalidConfig(_))));
}

#[test]
fn test_engine_open_rejects_zero_bytes_per_sync() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .sync_strategy(SyncStrategy::EveryNBytes { bytes: 0 })
        .build();

    let result = Engine::open(config);
    assert!(matches!(result, Err(CaskError::InvalidConfig(_))));
}

#[test]
fn test_engine_open_unsupported_index() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .index_kind(IndexKind::SkipList)
        .build();

    let result = Engine::open(config);
    assert!(matches!(
        result,
        Err(CaskError::UnsupportedIndexKind(IndexKind::SkipList))
    ));
}

#[test]
fn test_engine_open_rejects_bad_data_file_name() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("oops.scl"), b"").unwrap();

    let result = Engine::open_path(temp_dir.path());
    assert!(matches!(result, Err(CaskError::InvalidDataFileName(_))));
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_put_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"hello", b"world").unwrap();

    assert_eq!(engine.get(b"hello").unwrap(), b"world".to_vec());
    assert_eq!(engine.active_file_id(), Some(0));
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    let result = engine.get(b"nonexistent");

    assert!(matches!(result, Err(CaskError::KeyNotFound)));
}

#[test]
fn test_engine_put_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value1").unwrap();
    engine.put(b"key", b"value2").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), b"value2".to_vec());
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), b"value".to_vec());

    engine.delete(b"key").unwrap();

    assert!(matches!(engine.get(b"key"), Err(CaskError::KeyNotFound)));
    assert!(engine.list_keys().is_empty());
}

#[test]
fn test_engine_delete_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    let result = engine.delete(b"nonexistent");

    assert!(matches!(result, Err(CaskError::KeyNotFound)));
}

#[test]
fn test_engine_put_after_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"old").unwrap();
    engine.delete(b"key").unwrap();
    engine.put(b"key", b"new").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), b"new".to_vec());
}

#[test]
fn test_engine_empty_key() {
    let (_temp, engine) = setup_temp_engine();

    assert!(matches!(engine.put(b"", b"value"), Err(CaskError::KeyEmpty)));
    assert!(matches!(engine.get(b""), Err(CaskError::KeyEmpty)));
    assert!(matches!(engine.delete(b""), Err(CaskError::KeyEmpty)));
}

#[test]
fn test_engine_empty_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Vec::<u8>::new());
}

#[test]
fn test_engine_large_value() {
    let (_temp, engine) = setup_temp_engine();

    let large_value = vec![0xAB; 100_000]; // 100 KB
    engine.put(b"large_key", &large_value).unwrap();

    assert_eq!(engine.get(b"large_key").unwrap(), large_value);
}

#[test]
fn test_engine_binary_data() {
    let (_temp, engine) = setup_temp_engine();

    // Binary key and value with null bytes
    let key = b"\x00\x01\x02\xFF\xFE";
    let value = b"\xFF\x00\xAB\xCD\x00";

    engine.put(key, value).unwrap();
    assert_eq!(engine.get(key).unwrap(), value.to_vec());
}

#[test]
fn test_engine_multiple_keys() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key1", b"value1").unwrap();
    engine.put(b"key2", b"value2").unwrap();
    engine.put(b"key3", b"value3").unwrap();

    assert_eq!(engine.get(b"key1").unwrap(), b"value1".to_vec());
    assert_eq!(engine.get(b"key2").unwrap(), b"value2".to_vec());
    assert_eq!(engine.get(b"key3").unwrap(), b"value3".to_vec());
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_engine_rotates_active_file() {
    let (_temp, engine) = setup_temp_engine_with_small_files();

    for i in 0..20 {
        engine
            .put(format!("key{:02}", i).as_bytes(), &[b'v'; 20])
            .unwrap();
    }

    let active = engine.active_file_id().unwrap();
    assert!(active > 0);
    assert_eq!(engine.sealed_file_ids(), (0..active).collect::<Vec<u32>>());

    // Values before and after rotation stay readable
    for i in 0..20 {
        assert_eq!(
            engine.get(format!("key{:02}", i).as_bytes()).unwrap(),
            vec![b'v'; 20]
        );
    }
}

#[test]
fn test_engine_sealed_files_respect_max_size() {
    let (temp, engine) = setup_temp_engine_with_small_files();

    for i in 0..20 {
        engine
            .put(format!("key{:02}", i).as_bytes(), &[b'v'; 20])
            .unwrap();
    }

    for id in engine.sealed_file_ids() {
        let size = fs::metadata(data_file_path(temp.path(), id)).unwrap().len();
        assert!(size <= 128, "file {} has {} bytes", id, size);
    }
}

#[test]
fn test_engine_oversized_record_gets_own_file() {
    let (_temp, engine) = setup_temp_engine_with_small_files();

    engine.put(b"small", b"v").unwrap();
    engine.put(b"huge", &[b'x'; 1000]).unwrap();
    engine.put(b"after", b"v").unwrap();

    assert_eq!(engine.get(b"huge").unwrap(), vec![b'x'; 1000]);
    assert_eq!(engine.get(b"after").unwrap(), b"v".to_vec());
    assert_eq!(engine.sealed_file_ids(), vec![0, 1]);
    assert_eq!(engine.active_file_id(), Some(2));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_engine_recovery_after_drop() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"key1", b"value1").unwrap();
        engine.put(b"key2", b"value2").unwrap();
        engine.put(b"key3", b"value3").unwrap();
        engine.delete(b"key1").unwrap();
        engine.put(b"key2", b"value2-new").unwrap();
        drop(engine); // Crash
    }

    let engine = reopen(&temp_dir, 1024 * 1024);
    assert!(matches!(engine.get(b"key1"), Err(CaskError::KeyNotFound)));
    assert_eq!(engine.get(b"key2").unwrap(), b"value2-new".to_vec());
    assert_eq!(engine.get(b"key3").unwrap(), b"value3".to_vec());
}

#[test]
fn test_engine_recovery_across_rotated_files() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 128);
        for i in 0..30 {
            engine
                .put(format!("key{:02}", i % 10).as_bytes(), format!("v{}", i).as_bytes())
                .unwrap();
        }
        engine.delete(b"key03").unwrap();
        engine.close().unwrap();
    }

    let engine = reopen(&temp_dir, 128);
    for i in 0..10 {
        let key = format!("key{:02}", i);
        if i == 3 {
            assert!(matches!(engine.get(key.as_bytes()), Err(CaskError::KeyNotFound)));
        } else {
            assert_eq!(engine.get(key.as_bytes()).unwrap(), format!("v{}", 20 + i).into_bytes());
        }
    }
}

#[test]
fn test_engine_appends_continue_after_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"a", b"1").unwrap();
        engine.close().unwrap();
    }

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"b", b"2").unwrap();
        assert_eq!(engine.get(b"a").unwrap(), b"1".to_vec());
        assert_eq!(engine.get(b"b").unwrap(), b"2".to_vec());
        engine.close().unwrap();
    }

    let engine = reopen(&temp_dir, 1024 * 1024);
    assert_eq!(engine.list_keys(), vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_engine_recovery_truncates_torn_tail() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"good", b"value").unwrap();
        engine.close().unwrap();
    }

    // Simulate a crash halfway through an append
    let torn = LogRecord::normal(vec![0, b'x'], b"partial".to_vec()).encode();
    {
        let mut file = DataFile::open(temp_dir.path(), 0).unwrap();
        file.write(&torn[..torn.len() - 3]).unwrap();
        file.sync().unwrap();
    }

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        assert!(matches!(engine.get(b"x"), Err(CaskError::KeyNotFound)));

        engine.put(b"next", b"value2").unwrap();
        engine.close().unwrap();
    }

    let engine = reopen(&temp_dir, 1024 * 1024);
    assert_eq!(engine.get(b"good").unwrap(), b"value".to_vec());
    assert_eq!(engine.get(b"next").unwrap(), b"value2".to_vec());
}

#[test]
fn test_engine_recovery_reports_corruption() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    let path = data_file_path(temp_dir.path(), 0);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let config = Config::builder().dir_path(temp_dir.path()).build();
    let result = Engine::open(config);
    assert!(matches!(result, Err(CaskError::DataCorrupted { .. })));
}

#[test]
fn test_engine_recovery_rejects_corrupted_header() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = reopen(&temp_dir, 1024 * 1024);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.put(b"c", b"3").unwrap();
        engine.close().unwrap();
    }

    // Each record is 10 bytes; smash the size fields of the second one
    let path = data_file_path(temp_dir.path(), 0);
    let mut bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 30);
    bytes[15..20].fill(0xFF);
    fs::write(&path, &bytes).unwrap();

    let config = Config::builder().dir_path(temp_dir.path()).build();
    let result = Engine::open(config);
    assert!(matches!(result, Err(CaskError::MalformedRecord(_))));

    // The records behind the bad header are still on disk
    assert_eq!(fs::metadata(&path).unwrap().len(), 30);
}

// =============================================================================
// Sync / Stat / Listing Tests
// =============================================================================

#[test]
fn test_engine_sync_strategies() {
    for strategy in [
        SyncStrategy::OsBuffered,
        SyncStrategy::EveryWrite,
        SyncStrategy::EveryNBytes { bytes: 64 },
    ] {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::builder()
            .dir_path(temp_dir.path())
            .sync_strategy(strategy)
            .build();
        let engine = Engine::open(config).unwrap();

        for i in 0..10 {
            engine.put(format!("k{}", i).as_bytes(), b"value").unwrap();
        }
        engine.sync().unwrap();

        assert_eq!(engine.list_keys().len(), 10, "strategy {:?}", strategy);
    }
}

#[test]
fn test_engine_sync_without_active_file() {
    let (_temp, engine) = setup_temp_engine();
    engine.sync().unwrap();
}

#[test]
fn test_engine_stat() {
    let (_temp, engine) = setup_temp_engine_with_small_files();

    let empty = engine.stat().unwrap();
    assert_eq!(empty.key_count, 0);
    assert_eq!(empty.data_file_count, 0);
    assert_eq!(empty.disk_size, 0);

    for i in 0..20 {
        engine.put(format!("key{:02}", i).as_bytes(), &[b'v'; 20]).unwrap();
    }
    engine.delete(b"key00").unwrap();

    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_count, 19);
    assert_eq!(stat.data_file_count, engine.sealed_file_ids().len() + 1);
    assert!(stat.disk_size > 0);
}

#[test]
fn test_engine_list_keys_sorted() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"cherry", b"3").unwrap();
    engine.put(b"apple", b"1").unwrap();
    engine.put(b"banana", b"2").unwrap();

    assert_eq!(
        engine.list_keys(),
        vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]
    );
}

#[test]
fn test_engine_fold() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();

    let mut seen = Vec::new();
    engine
        .fold(|key, value| {
            seen.push((key.to_vec(), value.to_vec()));
            true
        })
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn test_engine_fold_stops_early() {
    let (_temp, engine) = setup_temp_engine();

    for key in [b"a", b"b", b"c"] {
        engine.put(key, b"v").unwrap();
    }

    let mut count = 0;
    engine
        .fold(|_, _| {
            count += 1;
            count < 2
        })
        .unwrap();

    assert_eq!(count, 2);
}

#[test]
fn test_engine_fold_callback_can_write() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();

    engine
        .fold(|key, value| {
            let mut copy = b"copy-".to_vec();
            copy.extend_from_slice(key);
            engine.put(&copy, value).unwrap();
            true
        })
        .unwrap();

    assert_eq!(engine.get(b"copy-a").unwrap(), b"1".to_vec());
    assert_eq!(engine.get(b"copy-b").unwrap(), b"2".to_vec());
    assert_eq!(engine.list_keys().len(), 4);
}

// =============================================================================
// Close/Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_close_writes_seq_file() {
    let (temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    engine.close().unwrap();

    assert!(temp.path().join("seq-no").exists());

    let engine = reopen(&temp, 1024 * 1024);
    assert_eq!(engine.get(b"key").unwrap(), b"value".to_vec());
}

#[test]
fn test_engine_open_path_convenience() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), b"value".to_vec());
    assert_eq!(engine.dir_path(), temp_dir.path());
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_concurrent_reads() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(reopen(&temp_dir, 1024 * 1024));

    // Pre-populate data
    for i in 0..100 {
        engine
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }

    // Spawn multiple reader threads
    let mut handles = vec![];
    for _ in 0..4 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let key = format!("key{}", i);
                let expected = format!("value{}", i);
                assert_eq!(engine_clone.get(key.as_bytes()).unwrap(), expected.into_bytes());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_concurrent_writes_with_rotation() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(reopen(&temp_dir, 512));

    // Spawn multiple writer threads
    let mut handles = vec![];
    for t in 0..4 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let key = format!("thread{}_key{}", t, i);
                let value = format!("thread{}_value{}", t, i);
                engine_clone.put(key.as_bytes(), value.as_bytes()).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Verify all writes succeeded
    for t in 0..4 {
        for i in 0..25 {
            let key = format!("thread{}_key{}", t, i);
            let expected = format!("thread{}_value{}", t, i);
            assert_eq!(engine.get(key.as_bytes()).unwrap(), expected.into_bytes());
        }
    }
    assert_eq!(engine.stat().unwrap().key_count, 100);
}
