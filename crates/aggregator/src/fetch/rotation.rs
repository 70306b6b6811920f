//! Egress proxy and credential rotation

use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Immutable pool of proxy base URLs with memoryless selection
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Arc<Vec<String>>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        let proxies: Vec<String> = proxies
            .into_iter()
            .map(|p| p.trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            proxies: Arc::new(proxies),
        }
    }

    /// Uniform random pick; `None` when the pool is empty
    pub fn pick(&self) -> Option<&str> {
        self.proxies
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Round-robin over API credentials
///
/// The cursor is shared by every clone and by any other rotator built from
/// the same counter, so concurrent callers spread evenly across keys.
#[derive(Debug, Clone)]
pub struct KeyRotator {
    keys: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_cursor(keys, Arc::new(AtomicUsize::new(0)))
    }

    /// Build a rotator over an externally owned cursor
    pub fn with_cursor(keys: Vec<String>, cursor: Arc<AtomicUsize>) -> Self {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys: Arc::new(keys),
            cursor,
        }
    }

    /// Next key in rotation; `None` means enrichment is unconfigured
    pub fn next_key(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        Some(self.keys[index % self.keys.len()].as_str())
    }

    pub fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_proxy_pool_picks_nothing() {
        let pool = ProxyPool::new(vec![" ".to_string()]);
        assert!(pool.is_empty());
        assert_eq!(pool.pick(), None);
    }

    #[test]
    fn test_proxy_pick_draws_from_pool() {
        let pool = ProxyPool::new(vec![
            "http://p1.example/".to_string(),
            "http://p2.example".to_string(),
        ]);

        let mut seen = HashMap::new();
        for _ in 0..200 {
            let pick = pool.pick().unwrap().to_string();
            *seen.entry(pick).or_insert(0) += 1;
        }

        assert_eq!(seen.len(), 2);
        assert!(seen.contains_key("http://p1.example"));
    }

    #[test]
    fn test_unconfigured_rotator() {
        let rotator = KeyRotator::new(Vec::new());
        assert!(!rotator.is_configured());
        assert_eq!(rotator.next_key(), None);
    }

    #[test]
    fn test_round_robin_order() {
        let rotator = KeyRotator::new(vec!["a".into(), "b".into(), "c".into()]);
        let keys: Vec<&str> = (0..6).filter_map(|_| rotator.next_key()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_injected_cursor_is_shared() {
        let cursor = Arc::new(AtomicUsize::new(0));
        let first = KeyRotator::with_cursor(vec!["a".into(), "b".into()], cursor.clone());
        let second = KeyRotator::with_cursor(vec!["a".into(), "b".into()], cursor.clone());

        assert_eq!(first.next_key(), Some("a"));
        assert_eq!(second.next_key(), Some("b"));
        assert_eq!(cursor.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_callers_are_evenly_distributed() {
        let rotator = KeyRotator::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rotator = rotator.clone();
                std::thread::spawn(move || {
                    (0..1000)
                        .filter_map(|_| rotator.next_key().map(str::to_string))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                *counts.entry(key).or_default() += 1;
            }
        }

        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 2000));
    }
}
