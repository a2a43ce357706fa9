//! Batch planning - deterministic partition of an item snapshot into
//! submission-ordered batches
//!
//! Grouped items are emitted before ungrouped ones so related reads always
//! complete within the same cycle segment. Thresholds and sizing factors are
//! tuning constants, not invariants; tests assert bounds and direction.

use tracing::debug;

use crate::config::PollSettings;
use crate::domain::{AddressableItem, Priority};
use crate::reader::ReadRequest;

/// Load above which low-priority items are dropped and batches shrink
pub const HIGH_LOAD_THRESHOLD: f64 = 0.8;
/// Load below which batches grow
pub const LOW_LOAD_THRESHOLD: f64 = 0.3;
/// Batch size floor under adaptive shrinking
const MIN_ADAPTIVE_BATCH: usize = 5;
/// Batch size ceiling under adaptive growth
const MAX_ADAPTIVE_BATCH: usize = 50;

/// One reader call's worth of items
#[derive(Debug)]
pub struct Batch {
    /// Diagnostic tag: `{cycle}-{batch ordinal}`
    pub label: String,

    /// Ordered per-item requests
    pub requests: Vec<ReadRequest>,
}

/// The full plan for one cycle
#[derive(Debug)]
pub struct CyclePlan {
    /// Batches in submission order
    pub batches: Vec<Batch>,

    /// Ids withheld by priority throttling this cycle
    pub skipped: Vec<String>,
}

impl CyclePlan {
    /// Items submitted across all batches
    pub fn item_count(&self) -> usize {
        self.batches.iter().map(|b| b.requests.len()).sum()
    }
}

/// Effective batch size after load-adaptive adjustment
pub fn effective_batch_size(base: usize, load: f64, adaptive: bool) -> usize {
    if !adaptive {
        return base;
    }
    if load > HIGH_LOAD_THRESHOLD {
        (base / 2).max(MIN_ADAPTIVE_BATCH)
    } else if load < LOW_LOAD_THRESHOLD {
        ((base as f64 * 1.5) as usize).min(MAX_ADAPTIVE_BATCH)
    } else {
        base
    }
}

/// Plan the batches for one cycle
///
/// An empty item set yields an empty plan; the cycle is a no-op but still
/// counts toward metrics and timing.
pub fn plan_cycle(items: &[AddressableItem], settings: &PollSettings, load: f64, cycle: u64) -> CyclePlan {
    debug!(
        items = items.len(),
        load,
        cycle,
        batch_size = settings.batch_size,
        "plan_cycle: called"
    );

    let mut ordered: Vec<&AddressableItem> = items.iter().collect();
    let mut skipped = Vec::new();

    if settings.priority_throttling {
        // Stable sort keeps submission order within a priority class
        ordered.sort_by_key(|item| item.priority.rank());

        if load > HIGH_LOAD_THRESHOLD {
            let (kept, dropped): (Vec<_>, Vec<_>) = ordered.into_iter().partition(|i| i.priority != Priority::Low);
            skipped = dropped.into_iter().map(|i| i.id.clone()).collect();
            ordered = kept;
            if !skipped.is_empty() {
                debug!(dropped = skipped.len(), load, "plan_cycle: dropping low priority items");
            }
        }
    }

    // Partition into named groups (first-seen order), ungrouped items last
    let mut group_order: Vec<&str> = Vec::new();
    let mut grouped: Vec<Vec<&AddressableItem>> = Vec::new();
    let mut ungrouped: Vec<&AddressableItem> = Vec::new();

    for item in ordered {
        match item.batch_group.as_deref() {
            Some(group) => match group_order.iter().position(|g| *g == group) {
                Some(idx) => grouped[idx].push(item),
                None => {
                    group_order.push(group);
                    grouped.push(vec![item]);
                }
            },
            None => ungrouped.push(item),
        }
    }

    let size = effective_batch_size(settings.batch_size, load, settings.adaptive_polling).max(1);

    let mut batches = Vec::new();
    for members in grouped.iter().chain(std::iter::once(&ungrouped)) {
        for chunk in members.chunks(size) {
            let requests = chunk
                .iter()
                .map(|item| ReadRequest {
                    id: item.id.clone(),
                    spec: item.read_spec.clone(),
                    disable_caching: settings.disable_caching,
                })
                .collect();
            batches.push(Batch {
                label: format!("{}-{}", cycle, batches.len()),
                requests,
            });
        }
    }

    debug!(batches = batches.len(), skipped = skipped.len(), "plan_cycle: planned");
    CyclePlan { batches, skipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str) -> AddressableItem {
        AddressableItem::new(id, json!({}))
    }

    fn settings(batch_size: usize) -> PollSettings {
        PollSettings {
            batch_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_items_yield_empty_plan() {
        let plan = plan_cycle(&[], &settings(10), 0.5, 1);
        assert!(plan.batches.is_empty());
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.item_count(), 0);
    }

    #[test]
    fn test_grouped_batches_come_first() {
        // Group "g" with batch size 1 spans two batches, both before item 3
        let items = vec![
            item("1").with_group("g"),
            item("2").with_group("g"),
            item("3"),
        ];

        let plan = plan_cycle(&items, &settings(1), 0.5, 7);
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0].requests[0].id, "1");
        assert_eq!(plan.batches[1].requests[0].id, "2");
        assert_eq!(plan.batches[2].requests[0].id, "3");
        assert_eq!(plan.batches[0].label, "7-0");
        assert_eq!(plan.batches[2].label, "7-2");
    }

    #[test]
    fn test_group_spans_contiguous_batches() {
        let items = vec![
            item("a").with_group("g"),
            item("b").with_group("g"),
            item("c").with_group("g"),
            item("x"),
        ];

        let plan = plan_cycle(&items, &settings(2), 0.5, 1);
        // Group "g" chunks into [a,b] and [c]; ungrouped [x] last
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0].requests.len(), 2);
        assert_eq!(plan.batches[1].requests[0].id, "c");
        assert_eq!(plan.batches[2].requests[0].id, "x");
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let items = vec![
            item("1").with_group("b"),
            item("2").with_group("a"),
            item("3").with_group("b"),
        ];

        let plan = plan_cycle(&items, &settings(10), 0.5, 1);
        assert_eq!(plan.batches.len(), 2);
        // Group "b" was seen first, so its batch comes first
        let first: Vec<_> = plan.batches[0].requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first, vec!["1", "3"]);
        assert_eq!(plan.batches[1].requests[0].id, "2");
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let items = vec![
            item("n1"),
            item("h1").with_priority(Priority::High),
            item("n2"),
            item("l1").with_priority(Priority::Low),
            item("h2").with_priority(Priority::High),
        ];
        let cfg = PollSettings {
            priority_throttling: true,
            batch_size: 10,
            ..Default::default()
        };

        let plan = plan_cycle(&items, &cfg, 0.5, 1);
        let order: Vec<_> = plan.batches[0].requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2", "l1"]);
    }

    #[test]
    fn test_low_priority_dropped_under_high_load() {
        let items = vec![
            item("keep").with_priority(Priority::High),
            item("drop").with_priority(Priority::Low),
        ];
        let cfg = PollSettings {
            priority_throttling: true,
            batch_size: 10,
            ..Default::default()
        };

        let plan = plan_cycle(&items, &cfg, 0.95, 1);
        assert_eq!(plan.skipped, vec!["drop".to_string()]);
        assert_eq!(plan.item_count(), 1);

        // Without throttling nothing is dropped regardless of load
        let plan = plan_cycle(&items, &settings(10), 0.95, 1);
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.item_count(), 2);
    }

    #[test]
    fn test_adaptive_sizing_bounds() {
        // High load halves with a floor of 5
        assert_eq!(effective_batch_size(20, 0.95, true), 10);
        assert_eq!(effective_batch_size(6, 0.95, true), 5);
        assert_eq!(effective_batch_size(2, 0.95, true), 5);

        // Low load grows by 1.5x with a ceiling of 50
        assert_eq!(effective_batch_size(20, 0.1, true), 30);
        assert_eq!(effective_batch_size(40, 0.1, true), 50);

        // Mid-band load leaves the base untouched
        assert_eq!(effective_batch_size(20, 0.5, true), 20);

        // Adaptive disabled is a pass-through
        assert_eq!(effective_batch_size(20, 0.95, false), 20);
    }

    #[test]
    fn test_disable_caching_forwarded() {
        let items = vec![item("1")];
        let cfg = PollSettings {
            disable_caching: true,
            ..Default::default()
        };

        let plan = plan_cycle(&items, &cfg, 0.5, 1);
        assert!(plan.batches[0].requests[0].disable_caching);
    }
}
