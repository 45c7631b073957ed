use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub struct SimpleMetrics {
    counters: Mutex<HashMap<String, i64>>,
}

impl SimpleMetrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn make_key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut sorted_labels = labels.to_vec();
        sorted_labels.sort_by_key(|(k, _)| *k);
        let label_str: Vec<String> = sorted_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}{{{}}}", name, label_str.join(","))
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        // A panicked writer cannot leave a counter half-updated.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn increment(&self, name: &str, value: i64, labels: &[(&str, &str)]) {
        let key = Self::make_key(name, labels);
        *self.counters().entry(key).or_insert(0) += value;
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = Self::make_key(name, labels);
        self.counters().get(&key).copied().unwrap_or(0)
    }
}

impl Default for SimpleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref GLOBAL_METRICS: SimpleMetrics = SimpleMetrics::new();
}

pub struct MetricNames;

impl MetricNames {
    pub const GUARD_ALLOWED: &'static str = "gaesecure_guard_allowed";
    pub const GUARD_DENIED: &'static str = "gaesecure_guard_denied";
}
