//! Counter-name normalization
//!
//! Performance counter instances name an adapter or volume differently from
//! the inventory classes: characters that are reserved in counter paths are
//! substituted. Matching a counter row to an entity compares both names after
//! the same substitution.

use dashmap::DashMap;
use std::sync::Arc;

/// Reserved character → replacement in counter instance names.
const SUBSTITUTIONS: &[(char, char)] = &[('\\', '_'), ('/', '_'), ('(', '['), (')', ']'), ('#', '_')];

fn substitute(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            SUBSTITUTIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect()
}

/// Memoizing normalizer, shared by every node of the process.
///
/// Concurrent first inserts of the same name may both compute the value;
/// the mapping is pure, so whichever lands is equivalent.
#[derive(Debug, Default)]
pub struct NameNormalizer {
    cache: DashMap<String, Arc<str>>,
}

impl NameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, raw: &str) -> Arc<str> {
        if let Some(hit) = self.cache.get(raw) {
            return hit.value().clone();
        }
        let canonical: Arc<str> = substitute(raw).into();
        self.cache.entry(raw.to_string()).or_insert(canonical).value().clone()
    }

    /// True when `counter_name` and `entity_name` denote the same instance.
    pub fn matches(&self, entity_name: &str, counter_name: &str) -> bool {
        self.normalize(entity_name) == self.normalize(counter_name)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_map() {
        let n = NameNormalizer::new();
        assert_eq!(
            &*n.normalize(r"Intel(R) Ethernet Connection #2 \ port/1"),
            "Intel[R] Ethernet Connection _2 _ port_1"
        );
        assert_eq!(&*n.normalize("C:"), "C:");
    }

    #[test]
    fn test_repeated_calls_hit_cache() {
        let n = NameNormalizer::new();
        let first = n.normalize("Broadcom NetXtreme (#3)");
        let second = n.normalize("Broadcom NetXtreme (#3)");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(n.cached(), 1);
    }

    #[test]
    fn test_counter_name_matches_inventory_name() {
        let n = NameNormalizer::new();
        assert!(n.matches("Intel(R) 82574L Gigabit Network Connection #2", "Intel[R] 82574L Gigabit Network Connection _2"));
        assert!(!n.matches("Intel(R) NIC", "Realtek NIC"));
    }

    #[test]
    fn test_concurrent_use_converges() {
        let n = Arc::new(NameNormalizer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let n = n.clone();
                std::thread::spawn(move || n.normalize("vEthernet (Default Switch)"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| &**r == "vEthernet [Default Switch]"));
        assert_eq!(n.cached(), 1);
    }
}
