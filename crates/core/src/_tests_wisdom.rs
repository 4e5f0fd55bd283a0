#![cfg(test)]

use std::path::PathBuf;

use super::backend::Direction;
use super::wisdom::{FsPlanCache, NullPlanCache, PlanCache, PlanKey, Precision, TransformKind};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wakefield-wisdom-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn r2c_key(len: usize) -> PlanKey {
    PlanKey {
        kind: TransformKind::RealToComplex,
        direction: Direction::Forward,
        precision: Precision::Double,
        len,
    }
}

#[test]
fn key_file_names_are_distinct_per_shape() {
    let forward = PlanKey {
        kind: TransformKind::ComplexToComplex,
        direction: Direction::Forward,
        precision: Precision::Double,
        len: 1024,
    };
    let backward = PlanKey {
        direction: Direction::Backward,
        ..forward
    };
    assert_eq!(forward.file_name(), "wisdom_cfc64_1024.plan");
    assert_eq!(backward.file_name(), "wisdom_cbc64_1024.plan");
    assert_eq!(r2c_key(1024).file_name(), "wisdom_r2c64_1024.plan");
    assert_ne!(r2c_key(1024).file_name(), r2c_key(2048).file_name());
}

#[test]
fn store_then_lookup_round_trips() {
    let dir = scratch_dir("roundtrip");
    let cache = FsPlanCache::new(&dir);
    let key = r2c_key(512);

    assert!(cache.lookup(&key).is_none());
    cache.store(&key, b"opaque planning record");
    assert_eq!(
        cache.lookup(&key).as_deref(),
        Some(b"opaque planning record".as_slice())
    );
    // a second store replaces the entry wholesale
    cache.store(&key, b"newer record");
    assert_eq!(cache.lookup(&key).as_deref(), Some(b"newer record".as_slice()));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn entries_do_not_collide_across_keys() {
    let dir = scratch_dir("collide");
    let cache = FsPlanCache::new(&dir);
    cache.store(&r2c_key(256), b"short");
    cache.store(&r2c_key(4096), b"long");
    assert_eq!(cache.lookup(&r2c_key(256)).as_deref(), Some(b"short".as_slice()));
    assert_eq!(cache.lookup(&r2c_key(4096)).as_deref(), Some(b"long".as_slice()));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_directory_is_a_miss_not_an_error() {
    let cache = FsPlanCache::new(scratch_dir("absent"));
    assert!(cache.lookup(&r2c_key(64)).is_none());
}

#[test]
fn null_cache_never_remembers() {
    let cache = NullPlanCache;
    cache.store(&r2c_key(128), b"ignored");
    assert!(cache.lookup(&r2c_key(128)).is_none());
}
