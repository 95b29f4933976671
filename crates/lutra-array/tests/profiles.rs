//! Call site profiles and the sampling policy

use std::sync::Arc;
use std::thread;

use lutra_array::{
    ArrayRef, BespokeConfig, LoggingArray, ProfileRegistry, RefCountMode, ResumeMode, SrcKey,
    Value, configure, logging_enabled, maybe_enable_logging, set_logging_enabled,
};

const SITE: SrcKey = SrcKey::new(1, 8, ResumeMode::None);

fn sampled(registry: &ProfileRegistry, hits: u64) -> Vec<u64> {
    (1..=hits)
        .filter(|_| {
            let arr = registry.maybe_enable_logging(ArrayRef::vec([Value::Int(1)]), SITE, 0);
            !arr.is_vanilla()
        })
        .collect()
}

fn registry_with_rate(rate: u64) -> ProfileRegistry {
    ProfileRegistry::new(BespokeConfig {
        emit_sample_rate: rate,
        ..BespokeConfig::default()
    })
}

#[test]
fn test_rate_one_wraps_everything() {
    let registry = registry_with_rate(1);
    assert_eq!(sampled(&registry, 4), [1, 2, 3, 4]);
    assert_eq!(registry.get(SITE).unwrap().sample_count(), 4);
}

#[test]
fn test_sampling_rates() {
    assert_eq!(sampled(&registry_with_rate(2), 6), [2, 4, 6]);
    assert_eq!(sampled(&registry_with_rate(4), 8), [2, 6]);
    assert!(sampled(&registry_with_rate(0), 4).is_empty());
}

#[test]
fn test_test_mode() {
    let registry = ProfileRegistry::new(BespokeConfig {
        emit_sample_rate: 0,
        test_array_likes: true,
        retranslate_all: true,
    });
    let wraps = |request_id| {
        !registry
            .maybe_enable_logging(ArrayRef::dict([]), SITE, request_id)
            .is_vanilla()
    };
    assert!(!wraps(0));
    assert!(wraps(1));
    assert!(!wraps(2));
    assert!(wraps(3));

    registry.set_config(BespokeConfig {
        test_array_likes: true,
        ..BespokeConfig::default()
    });
    assert!(wraps(0));
    assert!(wraps(2));
    assert_eq!(registry.get(SITE).unwrap().sample_count(), 0);
}

#[test]
fn test_wrapped_array_carries_profile() {
    let registry = registry_with_rate(1);
    let arr = registry.maybe_enable_logging(ArrayRef::keyset([]), SITE, 0);
    let lad = LoggingArray::as_logging(arr.data());
    assert!(Arc::ptr_eq(lad.profile(), &registry.profile(SITE)));
    assert_eq!(arr.mode(), RefCountMode::Counted);
}

#[test]
fn test_static_array_is_wrapped_once() {
    let registry = registry_with_rate(1);
    let ad = ArrayRef::vec([Value::Int(1)]).into_static();

    let first = registry.maybe_enable_logging(ad.clone(), SITE, 0);
    let second = registry.maybe_enable_logging(ad.clone(), SITE, 0);

    assert!(first.ptr_eq(&second));
    assert_eq!(first.mode(), RefCountMode::Static);
    assert!(registry.get(SITE).unwrap().static_array().unwrap().ptr_eq(&first));

    let mut local = first.clone();
    local.append(Value::Int(2)).unwrap();
    assert!(!local.ptr_eq(&first));
    assert_eq!(local.mode(), RefCountMode::Counted);
    assert_eq!(first.size(), 1);
    assert_eq!(ad.size(), 1);
}

#[test]
fn test_dropping_registry_releases_static_wrapper() {
    let registry = registry_with_rate(1);
    let ad = ArrayRef::vec([Value::Int(1)]).into_static();
    let wrapper = registry.maybe_enable_logging(ad.clone(), SITE, 0);
    let profile = registry.profile(SITE);
    assert_eq!(ad.ref_count(), 2);
    drop(wrapper);

    drop(registry);

    assert_eq!(Arc::strong_count(&profile), 1);
    assert!(profile.static_array().is_none());
    assert_eq!(ad.ref_count(), 1);
}

#[test]
fn test_racing_creators_share_one_profile() {
    let registry = ProfileRegistry::default();
    let profiles = thread::scope(|s| {
        let handles = (0..8)
            .map(|_| s.spawn(|| registry.profile(SITE)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(registry.profile_count(), 1);
    assert!(profiles.iter().all(|p| Arc::ptr_eq(p, &profiles[0])));
}

#[test]
fn test_process_wide_switch() {
    let site = SrcKey::new(99, 0, ResumeMode::Async);

    set_logging_enabled(false);
    assert!(!logging_enabled());
    let arr = ArrayRef::vec([]);
    let out = maybe_enable_logging(arr.clone(), site, 0);
    assert!(out.ptr_eq(&arr));

    configure(BespokeConfig::default());
    set_logging_enabled(true);
    let out = maybe_enable_logging(arr.clone(), site, 0);
    assert!(!out.is_vanilla());
    assert!(LoggingArray::as_logging(out.data()).wrapped().ptr_eq(&arr));
    set_logging_enabled(false);
}
