use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::types::{ViewData, ViewMeasures};

// 分布型测度：固定桶上界，观测时累积
struct DistributionState {
    boundaries: Vec<f64>,
    counts: Vec<u64>,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl DistributionState {
    fn new(boundaries: Vec<f64>) -> Self {
        debug_assert!(
            boundaries.windows(2).all(|w| w[0] <= w[1]),
            "bucket boundaries must be ascending"
        );
        let counts = vec![0; boundaries.len()];
        Self {
            boundaries,
            counts,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        if !self.boundaries.is_empty() {
            // 超过最后一个上界的样本计入最后一个桶
            let idx = self
                .boundaries
                .iter()
                .position(|b| value <= *b)
                .unwrap_or(self.boundaries.len() - 1);
            self.counts[idx] += 1;
        }
        self.count += 1;
        self.sum += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn render(&self, tags: &str) -> ViewMeasures {
        let mut measures = ViewMeasures {
            tags: tags.to_owned(),
            distribution_count: Some(self.count),
            ..Default::default()
        };
        if self.count > 0 {
            measures.distribution_min = Some(self.min);
            measures.distribution_max = Some(self.max);
            measures.distribution_mean = Some(self.sum / self.count as f64);
        }
        if !self.boundaries.is_empty() {
            measures.distribution_bucket_boundaries = Some(self.boundaries.clone());
            measures.distribution_bucket_counts = Some(self.counts.clone());
        }
        measures
    }
}

enum MeasureState {
    Int(i64),
    Double(f64),
    Distribution(DistributionState),
}

impl MeasureState {
    fn render(&self, tags: &str) -> ViewMeasures {
        match self {
            MeasureState::Int(v) => ViewMeasures::scalar_int(tags, *v),
            MeasureState::Double(v) => ViewMeasures::scalar_double(tags, *v),
            MeasureState::Distribution(d) => d.render(tags),
        }
    }
}

#[derive(Default)]
struct ViewState {
    // tags -> 测度状态
    measures: BTreeMap<String, MeasureState>,
}

/// 本节点的指标视图表，快照时整体渲染为 ViewData 序列
pub struct ViewRegistry {
    views: Mutex<BTreeMap<String, ViewState>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            views: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set_int(&self, view: &str, tags: &str, value: i64) {
        let mut views = self.views.lock();
        let state = views.entry(view.to_owned()).or_default();
        let _ = state
            .measures
            .insert(tags.to_owned(), MeasureState::Int(value));
    }

    pub fn set_double(&self, view: &str, tags: &str, value: f64) {
        let mut views = self.views.lock();
        let state = views.entry(view.to_owned()).or_default();
        let _ = state
            .measures
            .insert(tags.to_owned(), MeasureState::Double(value));
    }

    /// 注册分布视图，重复注册保留已有状态
    pub fn register_distribution(&self, view: &str, tags: &str, boundaries: Vec<f64>) {
        let mut views = self.views.lock();
        let state = views.entry(view.to_owned()).or_default();
        let _ = state
            .measures
            .entry(tags.to_owned())
            .or_insert_with(|| MeasureState::Distribution(DistributionState::new(boundaries)));
    }

    pub fn observe(&self, view: &str, tags: &str, value: f64) {
        let mut views = self.views.lock();
        match views
            .get_mut(view)
            .and_then(|state| state.measures.get_mut(tags))
        {
            Some(MeasureState::Distribution(d)) => d.observe(value),
            _ => {
                tracing::warn!("observe on unregistered distribution {}/{}", view, tags);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<ViewData> {
        let views = self.views.lock();
        views
            .iter()
            .map(|(name, state)| ViewData {
                view_name: name.clone(),
                measures: state
                    .measures
                    .iter()
                    .map(|(tags, measure)| measure.render(tags))
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_places_values_into_buckets() {
        let registry = ViewRegistry::new();
        registry.register_distribution("latency", "", vec![1.0, 5.0, 10.0, 20.0]);
        for v in [0.5, 3.0, 7.0, 15.0, 100.0] {
            registry.observe("latency", "", v);
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        let m = &snapshot[0].measures[0];
        assert_eq!(
            m.distribution_bucket_boundaries.as_deref(),
            Some(&[1.0, 5.0, 10.0, 20.0][..])
        );
        // 100.0 超出最后上界，计入最后一个桶
        assert_eq!(m.distribution_bucket_counts.as_deref(), Some(&[1, 1, 1, 2][..]));
        assert_eq!(m.distribution_count, Some(5));
        assert_eq!(m.distribution_min, Some(0.5));
        assert_eq!(m.distribution_max, Some(100.0));
        let mean = m.distribution_mean.unwrap();
        assert!((mean - 25.1).abs() < 1e-9);
        m.validate().unwrap();
    }

    #[test]
    fn empty_distribution_has_zero_count_and_no_summary() {
        let registry = ViewRegistry::new();
        registry.register_distribution("latency", "", vec![1.0, 5.0]);
        let snapshot = registry.snapshot();
        let m = &snapshot[0].measures[0];
        assert_eq!(m.distribution_count, Some(0));
        assert!(m.distribution_min.is_none());
        assert!(m.distribution_mean.is_none());
        assert!(m.distribution_max.is_none());
        assert_eq!(m.distribution_bucket_counts.as_deref(), Some(&[0, 0][..]));
        m.validate().unwrap();
    }

    #[test]
    fn distribution_without_boundaries_skips_bucket_fields() {
        let registry = ViewRegistry::new();
        registry.register_distribution("latency", "", vec![]);
        registry.observe("latency", "", 2.0);
        registry.observe("latency", "", 4.0);
        let snapshot = registry.snapshot();
        let m = &snapshot[0].measures[0];
        assert!(m.distribution_bucket_boundaries.is_none());
        assert!(m.distribution_bucket_counts.is_none());
        assert_eq!(m.distribution_count, Some(2));
        assert_eq!(m.distribution_mean, Some(3.0));
    }

    #[test]
    fn scalar_set_overwrites_previous_value() {
        let registry = ViewRegistry::new();
        registry.set_double("process_stats", "cpu_percent", 10.0);
        registry.set_double("process_stats", "cpu_percent", 42.5);
        registry.set_int("process_stats", "memory_bytes", 1024);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        let measures = &snapshot[0].measures;
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].tags, "cpu_percent");
        assert_eq!(measures[0].double_value, Some(42.5));
        assert_eq!(measures[1].tags, "memory_bytes");
        assert_eq!(measures[1].int_value, Some(1024));
    }

    #[test]
    fn snapshot_view_order_is_stable() {
        let registry = ViewRegistry::new();
        registry.set_int("b_view", "", 1);
        registry.set_int("a_view", "", 2);
        let names: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|v| v.view_name)
            .collect();
        assert_eq!(names, vec!["a_view".to_owned(), "b_view".to_owned()]);
    }
}
