//! Out-of-band quantization policy consulted by computation stages.
//!
//! A [`PolicyStore`] holds the `(enabled, target_format, target_layer)`
//! triple. Stages that have no parameter for fake quantization (the
//! feed-forward normalization, typically) consult a store by shared
//! reference and rewrite their own output buffer when the policy matches.
//!
//! The intended discipline is "configure, then run": `set`/`clear` during a
//! configuration phase, reads during inference. The triple lives behind a
//! `RwLock`, so a reader always sees one complete triple, but a `set` that
//! races an inference pass may be observed by some stages of that pass and
//! not others.
//!
//! [`PolicyStore::global`] is the process-wide instance used by the free
//! functions in the crate root. Components that can take the store as a
//! parameter should do so instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::quantize_in_place;
use crate::error::Result;
use crate::format::ElementFormat;
use crate::naming::{BlockConvention, NamingConvention};
use crate::selector::{FFN_NORM_PATTERN, extract_layer_with, is_target_layer, matches};

/// Process-wide store, disabled until first `set`.
static GLOBAL_POLICY: OnceLock<PolicyStore> = OnceLock::new();

/// The configured triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPolicy {
    pub enabled: bool,
    pub target_format: ElementFormat,
    /// `None` means all layers.
    pub target_layer: Option<u32>,
}

impl Default for GlobalPolicy {
    fn default() -> Self {
        Self { enabled: false, target_format: ElementFormat::FullPrecision32, target_layer: None }
    }
}

/// How often the buffer path rewrote or skipped since the last `set`/`clear`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCounters {
    pub quantized: u64,
    pub skipped: u64,
}

/// First-call tracking key: the layer index, or the whole name when the
/// convention finds none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SeenKey {
    Layer(u32),
    Name(String),
}

/// Single-writer, many-reader holder of a [`GlobalPolicy`].
#[derive(Debug)]
pub struct PolicyStore {
    policy: RwLock<GlobalPolicy>,
    convention: Arc<dyn NamingConvention>,
    first_call_only: AtomicBool,
    seen_layers: Mutex<HashSet<SeenKey>>,
    warned_formats: Mutex<HashSet<ElementFormat>>,
    quantized: AtomicU64,
    skipped: AtomicU64,
}

// Recover from poisoned locks: the guarded data stays consistent because
// every critical section is a plain read or a whole-value replace.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PolicyStore {
    /// Disabled store using the `blk.<index>.<component>` naming convention.
    pub fn new() -> Self {
        Self {
            policy: RwLock::new(GlobalPolicy::default()),
            convention: Arc::new(BlockConvention),
            first_call_only: AtomicBool::new(false),
            seen_layers: Mutex::new(HashSet::new()),
            warned_formats: Mutex::new(HashSet::new()),
            quantized: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Replace the naming convention used to extract layer indices.
    pub fn with_convention(mut self, convention: Arc<dyn NamingConvention>) -> Self {
        self.convention = convention;
        self
    }

    /// The process-wide store.
    pub fn global() -> &'static PolicyStore {
        GLOBAL_POLICY.get_or_init(PolicyStore::new)
    }

    /// Replace the whole triple. Resets first-call tracking and counters.
    pub fn set(&self, enabled: bool, target_format: ElementFormat, target_layer: Option<u32>) {
        self.replace(GlobalPolicy { enabled, target_format, target_layer });
        debug!(
            enabled,
            format = %target_format,
            layer = ?target_layer,
            "fake quantization policy set"
        );
    }

    /// Reset to disabled / `f32` / all layers.
    pub fn clear(&self) {
        self.replace(GlobalPolicy::default());
        debug!("fake quantization policy cleared");
    }

    fn replace(&self, policy: GlobalPolicy) {
        {
            let mut guard = match self.policy.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = policy;
        }
        lock(&self.seen_layers).clear();
        self.quantized.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
    }

    /// Consistent copy of the current triple.
    pub fn snapshot(&self) -> GlobalPolicy {
        match self.policy.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Only rewrite the first buffer seen per layer until the next `set`/`clear`.
    pub fn set_first_call_only(&self, first_call_only: bool) {
        self.first_call_only.store(first_call_only, Ordering::Relaxed);
        lock(&self.seen_layers).clear();
    }

    pub fn first_call_only(&self) -> bool {
        self.first_call_only.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> PolicyCounters {
        PolicyCounters {
            quantized: self.quantized.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn is_active_under(&self, policy: &GlobalPolicy, name: &str, pattern: &str) -> bool {
        policy.enabled
            && matches(name, pattern)
            && is_target_layer(
                extract_layer_with(self.convention.as_ref(), name, pattern),
                policy.target_layer,
            )
    }

    /// Whether the policy selects `name` for `pattern`. Always false when disabled.
    pub fn is_active_for(&self, name: &str, pattern: &str) -> bool {
        self.is_active_under(&self.snapshot(), name, pattern)
    }

    /// [`is_active_for`](Self::is_active_for) with the feed-forward norm pattern.
    pub fn applies_to(&self, name: &str) -> bool {
        self.is_active_for(name, FFN_NORM_PATTERN)
    }

    /// Rewrite the whole of `buffer` with the configured format if the policy
    /// selects `name` under the feed-forward norm pattern.
    ///
    /// Coverage does not apply on this path. Returns `Ok(true)` when the
    /// buffer was rewritten, `Ok(false)` when the policy did not apply.
    pub fn apply_to_buffer(&self, buffer: &mut [f32], name: &str) -> Result<bool> {
        self.apply_to_buffer_matching(buffer, name, FFN_NORM_PATTERN)
    }

    /// [`apply_to_buffer`](Self::apply_to_buffer) with an explicit pattern.
    pub fn apply_to_buffer_matching(
        &self,
        buffer: &mut [f32],
        name: &str,
        pattern: &str,
    ) -> Result<bool> {
        let policy = self.snapshot();
        if !self.is_active_under(&policy, name, pattern) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        if self.first_call_only() {
            let key = match extract_layer_with(self.convention.as_ref(), name, pattern) {
                Some(layer) => SeenKey::Layer(layer),
                None => SeenKey::Name(name.to_owned()),
            };
            if !lock(&self.seen_layers).insert(key) {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            }
        }

        if let Err(err) = quantize_in_place(buffer, policy.target_format) {
            if lock(&self.warned_formats).insert(policy.target_format) {
                warn!(tensor = name, "{err}");
            }
            return Err(err);
        }

        self.quantized.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuantizationError;
    use crate::naming::GraphNodeConvention;

    fn norm_output() -> Vec<f32> {
        vec![1.234_567_9, -0.987_654_3, 0.000_123_456, -1000.123_5, 3.141_592_7]
    }

    #[test]
    fn new_store_is_disabled() {
        let store = PolicyStore::new();
        assert_eq!(store.snapshot(), GlobalPolicy::default());
        assert!(!store.applies_to("blk.0.ffn_norm"));
    }

    #[test]
    fn set_replaces_the_triple() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::Half16, Some(4));
        assert_eq!(
            store.snapshot(),
            GlobalPolicy { enabled: true, target_format: ElementFormat::Half16, target_layer: Some(4) }
        );
        store.clear();
        assert_eq!(store.snapshot(), GlobalPolicy::default());
    }

    #[test]
    fn disabled_policy_never_matches() {
        let store = PolicyStore::new();
        store.set(false, ElementFormat::TruncatedHalf16, None);
        assert!(!store.is_active_for("blk.3.ffn_norm", FFN_NORM_PATTERN));
    }

    #[test]
    fn target_layer_restricts_matches() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::TruncatedHalf16, Some(5));
        assert!(store.applies_to("blk.5.ffn_norm"));
        assert!(!store.applies_to("blk.6.ffn_norm"));
        assert!(!store.applies_to("ffn_norm-5"));
        assert!(!store.applies_to("blk.5.attn_norm"));
    }

    #[test]
    fn all_layers_admits_unparsed_names_that_contain_the_pattern() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::TruncatedHalf16, None);
        assert!(store.applies_to("blk.5.ffn_norm"));
        assert!(store.applies_to("ffn_norm-5"));
        assert!(!store.applies_to("output_norm"));
    }

    #[test]
    fn apply_to_buffer_rewrites_matching_buffers_only() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::TruncatedHalf16, Some(2));

        let mut hit = norm_output();
        assert!(store.apply_to_buffer(&mut hit, "blk.2.ffn_norm").unwrap());
        assert!(hit.iter().all(|v| v.to_bits() & 0xFFFF == 0));

        let mut miss = norm_output();
        assert!(!store.apply_to_buffer(&mut miss, "blk.3.ffn_norm").unwrap());
        assert_eq!(miss, norm_output());

        assert_eq!(store.counters(), PolicyCounters { quantized: 1, skipped: 1 });
    }

    #[test]
    fn unsupported_format_is_surfaced_and_buffer_untouched() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::Unsupported(8), None);
        let mut data = norm_output();
        let err = store.apply_to_buffer(&mut data, "blk.0.ffn_norm").unwrap_err();
        assert!(matches!(err, QuantizationError::UnsupportedFormat { .. }));
        assert_eq!(data, norm_output());
        // A second failure is still reported.
        assert!(store.apply_to_buffer(&mut data, "blk.0.ffn_norm").is_err());
    }

    #[test]
    fn first_call_only_skips_repeat_calls_per_layer() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::TruncatedHalf16, None);
        store.set_first_call_only(true);

        let mut first = norm_output();
        let mut second = norm_output();
        let mut other_layer = norm_output();
        assert!(store.apply_to_buffer(&mut first, "blk.3.ffn_norm").unwrap());
        assert!(!store.apply_to_buffer(&mut second, "blk.3.ffn_norm").unwrap());
        assert!(store.apply_to_buffer(&mut other_layer, "blk.4.ffn_norm").unwrap());

        assert_ne!(first, norm_output());
        assert_eq!(second, norm_output());
        assert_eq!(store.counters(), PolicyCounters { quantized: 2, skipped: 1 });
    }

    #[test]
    fn first_call_only_tracks_unparsed_names_separately() {
        let store = PolicyStore::new();
        store.set(true, ElementFormat::TruncatedHalf16, None);
        store.set_first_call_only(true);

        // Graph-node names carry no index under the block convention.
        let mut layer3 = norm_output();
        let mut layer4 = norm_output();
        let mut layer4_again = norm_output();
        assert!(store.apply_to_buffer(&mut layer3, "ffn_norm-3").unwrap());
        assert!(store.apply_to_buffer(&mut layer4, "ffn_norm-4").unwrap());
        assert!(!store.apply_to_buffer(&mut layer4_again, "ffn_norm-4").unwrap());

        assert_ne!(layer4, norm_output());
        assert_eq!(layer4_again, norm_output());
        assert_eq!(store.counters(), PolicyCounters { quantized: 2, skipped: 1 });
    }

    #[test]
    fn set_resets_first_call_tracking_and_counters() {
        let store = PolicyStore::new();
        store.set_first_call_only(true);
        store.set(true, ElementFormat::Half16, None);
        let mut data = norm_output();
        assert!(store.apply_to_buffer(&mut data, "blk.1.ffn_norm").unwrap());

        store.set(true, ElementFormat::Half16, None);
        assert_eq!(store.counters(), PolicyCounters::default());
        let mut again = norm_output();
        assert!(store.apply_to_buffer(&mut again, "blk.1.ffn_norm").unwrap());
    }

    #[test]
    fn graph_node_convention_store() {
        let store = PolicyStore::new().with_convention(Arc::new(GraphNodeConvention));
        store.set(true, ElementFormat::TruncatedHalf16, Some(21));
        assert!(store.applies_to("ffn_norm-21"));
        assert!(!store.applies_to("ffn_norm-20"));
        assert!(!store.applies_to("blk.21.ffn_norm"));
    }

    #[test]
    fn concurrent_readers_see_complete_triples() {
        use std::thread;

        let store = Arc::new(PolicyStore::new());
        store.set(true, ElementFormat::TruncatedHalf16, Some(1));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let snap = store.snapshot();
                        let consistent = snap
                            == GlobalPolicy {
                                enabled: true,
                                target_format: ElementFormat::TruncatedHalf16,
                                target_layer: Some(1),
                            }
                            || snap
                                == GlobalPolicy {
                                    enabled: true,
                                    target_format: ElementFormat::Half16,
                                    target_layer: Some(2),
                                };
                        assert!(consistent, "torn read: {snap:?}");
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            store.set(true, ElementFormat::Half16, Some(2));
            store.set(true, ElementFormat::TruncatedHalf16, Some(1));
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
