//! Per-call-site logging profiles and sampling
//!
//! Every call site that may create an array has a [`SrcKey`]. The first time
//! an array flows through [`ProfileRegistry::maybe_enable_logging`] for a
//! call site, a [`LoggingProfile`] is created for it; later arrays from the
//! same site share that profile. Whether a given array gets wrapped is
//! decided by the sampling policy in [`BespokeConfig`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace};

use super::logging::LoggingArray;
use crate::array::{ArrayRef, RefCountMode};
use crate::config::BespokeConfig;

/// How a function was entered at a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResumeMode {
    /// Plain call
    None,
    /// Resumed async function
    Async,
    /// Resumed generator
    GenIter,
}

/// Source location of an array-creating instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SrcKey {
    /// Function id
    pub func: u32,
    /// Bytecode offset within the function
    pub offset: u32,
    /// Resume mode
    pub resume: ResumeMode,
}

impl SrcKey {
    /// Create a source key
    pub const fn new(func: u32, offset: u32, resume: ResumeMode) -> Self {
        Self {
            func,
            offset,
            resume,
        }
    }
}

/// Profile shared by every logging array created at one call site
#[derive(Debug)]
pub struct LoggingProfile {
    src_key: SrcKey,
    sample_count: AtomicU64,
    // The static wrapper points back at this profile; the owning registry
    // clears the slot on drop to break the cycle.
    static_array: Mutex<Option<ArrayRef>>,
}

impl LoggingProfile {
    /// Empty profile for a call site
    pub fn new(src_key: SrcKey) -> Self {
        Self {
            src_key,
            sample_count: AtomicU64::new(0),
            static_array: Mutex::new(None),
        }
    }

    /// Call site of this profile
    pub fn src_key(&self) -> SrcKey {
        self.src_key
    }

    /// Number of arrays sampled so far
    pub fn sample_count(&self) -> u64 {
        self.sample_count.load(Ordering::Relaxed)
    }

    /// The static wrapper handed out for static arrays, once created
    pub fn static_array(&self) -> Option<ArrayRef> {
        self.static_array.lock().clone()
    }

    fn static_array_or_init(&self, init: impl FnOnce() -> ArrayRef) -> ArrayRef {
        self.static_array.lock().get_or_insert_with(init).clone()
    }

    fn release_static_array(&self) -> Option<ArrayRef> {
        self.static_array.lock().take()
    }
}

/// Call site profiles plus the sampling policy
#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: DashMap<SrcKey, Arc<LoggingProfile>>,
    config: RwLock<BespokeConfig>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new(BespokeConfig::default())
    }
}

impl ProfileRegistry {
    /// Empty registry
    pub fn new(config: BespokeConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            config: RwLock::new(config),
        }
    }

    /// Current configuration
    pub fn config(&self) -> BespokeConfig {
        self.config.read().clone()
    }

    /// Replace the configuration
    pub fn set_config(&self, config: BespokeConfig) {
        *self.config.write() = config;
    }

    /// Number of call sites with a profile
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Profile of a call site, if one exists
    pub fn get(&self, sk: SrcKey) -> Option<Arc<LoggingProfile>> {
        self.profiles.get(&sk).map(|p| p.value().clone())
    }

    /// Profile of a call site, created on first use
    ///
    /// Racing creators agree on one profile: the first insert wins and the
    /// others drop theirs.
    pub fn profile(&self, sk: SrcKey) -> Arc<LoggingProfile> {
        if let Some(profile) = self.get(sk) {
            return profile;
        }
        let fresh = Arc::new(LoggingProfile::new(sk));
        match self.profiles.entry(sk) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                debug!(
                    func = sk.func,
                    offset = sk.offset,
                    resume = ?sk.resume,
                    "created logging profile"
                );
                slot.insert(fresh).value().clone()
            }
        }
    }

    fn should_emit(&self, profile: &LoggingProfile, request_id: u64) -> bool {
        let config = self.config.read();
        if config.test_array_likes {
            return !config.retranslate_all || request_id % 2 == 1;
        }
        if config.emit_sample_rate == 0 {
            return false;
        }
        let count = profile.sample_count.fetch_add(1, Ordering::Relaxed);
        count.wrapping_sub(1) % config.emit_sample_rate == 0
    }

    /// Wrap `ad` in a logging array if the call site is sampled
    ///
    /// Static arrays get one static wrapper per profile, created on the
    /// first sampled hit and handed out on every later one.
    pub fn maybe_enable_logging(&self, ad: ArrayRef, sk: SrcKey, request_id: u64) -> ArrayRef {
        let profile = self.profile(sk);
        if !self.should_emit(&profile, request_id) {
            trace!(func = sk.func, offset = sk.offset, "emit vanilla");
            return ad;
        }
        trace!(func = sk.func, offset = sk.offset, "emit bespoke");

        if ad.mode() == RefCountMode::Static {
            return profile
                .static_array_or_init(|| LoggingArray::make_static(ad, profile.clone()));
        }
        LoggingArray::make_with_profile(ad, profile)
    }
}

impl Drop for ProfileRegistry {
    fn drop(&mut self) {
        let released = self
            .profiles
            .iter()
            .filter_map(|profile| profile.release_static_array())
            .count();
        if released > 0 {
            debug!(released, "released static logging arrays");
        }
    }
}

// ==================== Process-wide state ====================

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static REGISTRY: LazyLock<ProfileRegistry> = LazyLock::new(ProfileRegistry::default);

/// Turn array logging on or off for the process
pub fn set_logging_enabled(enabled: bool) {
    LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether array logging is on
pub fn logging_enabled() -> bool {
    LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// The process-wide profile registry
pub fn registry() -> &'static ProfileRegistry {
    &REGISTRY
}

/// Replace the configuration of the process-wide registry
pub fn configure(config: BespokeConfig) {
    REGISTRY.set_config(config);
}

/// [`ProfileRegistry::maybe_enable_logging`] on the process-wide registry,
/// or `ad` itself while logging is off
pub fn maybe_enable_logging(ad: ArrayRef, sk: SrcKey, request_id: u64) -> ArrayRef {
    if !logging_enabled() {
        return ad;
    }
    REGISTRY.maybe_enable_logging(ad, sk, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    const SK: SrcKey = SrcKey::new(7, 12, ResumeMode::None);

    #[test]
    fn test_profile_is_created_once() {
        let registry = ProfileRegistry::default();
        let a = registry.profile(SK);
        let b = registry.profile(SK);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.profile_count(), 1);
        assert_eq!(a.src_key(), SK);
    }

    #[test]
    fn test_rate_zero_never_emits() {
        let registry = ProfileRegistry::new(BespokeConfig {
            emit_sample_rate: 0,
            ..BespokeConfig::default()
        });
        let out = registry.maybe_enable_logging(ArrayRef::vec([Value::Int(1)]), SK, 0);
        assert!(out.is_vanilla());
        assert_eq!(registry.profile(SK).sample_count(), 0);
    }
}
