//! Black-box end-to-end scenarios against the public router API.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use tempfile::NamedTempFile;
use zipcache::{Error, ZipCache};

fn scratch_path() -> NamedTempFile {
    NamedTempFile::new().expect("failed to create scratch file")
}

#[test]
fn small_then_large_override() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();

    cache.put(b"k", b"abc").unwrap();
    assert_eq!(cache.get(b"k").unwrap(), Some(b"abc".to_vec()));
    assert_eq!(cache.stats().hits_dram, 1);

    let large = vec![0xABu8; 4096];
    cache.put(b"k", &large).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.puts_large, 1);
    assert!(stats.tombstones >= 1);

    assert_eq!(cache.get(b"k").unwrap(), Some(large));
    assert!(cache.stats().hits_lo >= 1);
}

#[test]
fn large_then_small_override() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();

    let large = vec![0xCDu8; 8192];
    cache.put(b"k", &large).unwrap();

    cache.put(b"k", b"z").unwrap();
    let hits_dram_before = cache.stats().hits_dram;

    assert_eq!(cache.get(b"k").unwrap(), Some(b"z".to_vec()));
    assert!(cache.stats().hits_dram > hits_dram_before);
}

#[test]
fn tombstone_does_not_leak_as_a_value() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();

    let large = vec![0x11u8; 6000];
    cache.put(b"k", &large).unwrap();

    let result = cache.get(b"k").unwrap();
    assert_eq!(result, Some(large));
    assert!(cache.stats().tombstones >= 1);
}

#[test]
fn checksum_failure_is_surfaced_then_recovers_on_overwrite() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();

    let large = vec![0x42u8; 4096];
    cache.put(b"k", &large).unwrap();

    let mut lo_path = tmp.path().as_os_str().to_owned();
    lo_path.push(".lo");
    let lo_file = OpenOptions::new().write(true).open(&lo_path).unwrap();
    lo_file.write_at(&[0xFF], 0).unwrap();

    assert!(matches!(cache.get(b"k"), Err(Error::Io(_))));

    cache.put(b"k", b"small again").unwrap();
    assert_eq!(cache.get(b"k").unwrap(), Some(b"small again".to_vec()));
}

#[test]
fn delete_is_idempotent_and_reports_presence() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();

    assert!(!cache.delete(b"missing").unwrap());

    cache.put(b"k", b"v").unwrap();
    assert!(cache.delete(b"k").unwrap());
    assert!(!cache.delete(b"k").unwrap());
    assert_eq!(cache.get(b"k").unwrap(), None);
}

#[test]
fn boundary_sizes_route_to_the_expected_class() {
    let tmp = scratch_path();
    let cache = ZipCache::open(1, tmp.path()).unwrap();
    cache.set_thresholds(128, 2048).unwrap();

    cache.put(b"tiny", &vec![0u8; 128]).unwrap();
    cache.put(b"medium", &vec![0u8; 2048]).unwrap();
    cache.put(b"large", &vec![0u8; 2049]).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.puts_tiny, 1);
    assert_eq!(stats.puts_medium, 1);
    assert_eq!(stats.puts_large, 1);
}

#[test]
fn random_payloads_of_every_class_round_trip() {
    let tmp = scratch_path();
    let cache = ZipCache::open(4, tmp.path()).unwrap();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let mut expected = Vec::new();
    for i in 0..64u32 {
        let len = rng.random_range(1..=6000usize);
        let mut payload = vec![0u8; len];
        rng.fill(payload.as_mut_slice());
        let key = format!("key-{i}").into_bytes();
        cache.put(&key, &payload).unwrap();
        expected.push((key, payload));
    }

    for (key, payload) in &expected {
        assert_eq!(cache.get(key).unwrap(), Some(payload.clone()));
    }
}
