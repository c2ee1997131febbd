//! Runtime metrics and statistics for the risk service.

use crate::types::prediction::{ModelScore, RiskLevel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by all request workers
pub struct PipelineMetrics {
    /// Requests that produced a prediction
    pub predictions: AtomicU64,
    /// Requests rejected as invalid input
    pub rejected: AtomicU64,
    /// Requests that failed inside the models
    pub failed: AtomicU64,
    /// Predictions by risk label
    labels: RwLock<HashMap<RiskLevel, u64>>,
    /// Failures by base model name
    model_failures: RwLock<HashMap<String, u64>>,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Per-model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            labels: RwLock::new(HashMap::new()),
            model_failures: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, processing_time: Duration, probability: f64, label: RiskLevel) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        let bucket = ((probability * 10.0).max(0.0) as usize).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
        if let Ok(mut labels) = self.labels.write() {
            *labels.entry(label).or_insert(0) += 1;
        }
    }

    /// Record per-model inference times
    pub fn record_model_scores(&self, scores: &[ModelScore]) {
        if let Ok(mut times) = self.model_times.write() {
            for score in scores {
                let model_times = times.entry(score.model.clone()).or_default();
                model_times.push(score.elapsed.as_micros() as u64);
                // Keep only last 1000 per model
                if model_times.len() > 1000 {
                    model_times.drain(0..500);
                }
            }
        }
    }

    /// Record a request rejected by validation
    pub fn record_rejection(&self, processing_time: Duration) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);
    }

    /// Record a server-side failure, attributed to a base model when known
    pub fn record_failure(&self, processing_time: Duration, model: Option<&str>) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        if let Some(model) = model {
            if let Ok(mut failures) = self.model_failures.write() {
                *failures.entry(model.to_string()).or_insert(0) += 1;
            }
        }
    }

    fn record_processing_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Total requests seen
    pub fn total_requests(&self) -> u64 {
        self.predictions.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get per-model timing stats
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let mut stats = HashMap::new();
        let times = match self.model_times.read() {
            Ok(times) => times,
            Err(_) => return stats,
        };

        for (model, model_times) in times.iter() {
            if model_times.is_empty() {
                continue;
            }

            let mut sorted: Vec<u64> = model_times.clone();
            sorted.sort_unstable();

            let sum: u64 = sorted.iter().sum();
            let count = sorted.len();

            stats.insert(
                model.clone(),
                ModelStats {
                    calls: count as u64,
                    mean_us: sum / count as u64,
                    p50_us: sorted[count / 2],
                    p99_us: sorted[(count as f64 * 0.99) as usize],
                },
            );
        }

        stats
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_requests() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn get_label_counts(&self) -> HashMap<RiskLevel, u64> {
        self.labels.read().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn get_model_failures(&self) -> HashMap<String, u64> {
        self.model_failures.read().map(|f| f.clone()).unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let labels = self.get_label_counts();

        info!(
            requests = self.total_requests(),
            predictions = predictions,
            rejected = rejected,
            failed = failed,
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Risk service summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        info!(
            high = labels.get(&RiskLevel::High).copied().unwrap_or(0),
            low = labels.get(&RiskLevel::Low).copied().unwrap_or(0),
            "Predictions by risk level"
        );

        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "  {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }

        for (model, stats) in &self.get_model_stats() {
            info!(
                model = %model,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                calls = stats.calls,
                "Model inference time"
            );
        }
        for (model, count) in &self.get_model_failures() {
            info!(model = %model, failures = count, "Model failures");
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Model-specific statistics
#[derive(Debug)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters() {
        let metrics = PipelineMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), 0.2, RiskLevel::Low);
        metrics.record_prediction(Duration::from_micros(200), 0.8, RiskLevel::High);
        metrics.record_prediction(Duration::from_micros(300), 1.0, RiskLevel::High);
        metrics.record_rejection(Duration::from_micros(10));
        metrics.record_failure(Duration::from_micros(50), Some("XGBoost"));

        assert_eq!(metrics.total_requests(), 5);
        assert_eq!(metrics.get_label_counts().get(&RiskLevel::High), Some(&2));
        assert_eq!(metrics.get_model_failures().get("XGBoost"), Some(&1));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[2], 1);
        assert_eq!(dist[8], 1);
        assert_eq!(dist[9], 1);

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.max_us, 300);
    }

    #[test]
    fn test_model_timings() {
        let metrics = PipelineMetrics::new();
        let scores = vec![
            ModelScore {
                model: "RandomForest".to_string(),
                probability: 0.3,
                elapsed: Duration::from_micros(40),
            },
            ModelScore {
                model: "MLP".to_string(),
                probability: 0.6,
                elapsed: Duration::from_micros(20),
            },
        ];
        metrics.record_model_scores(&scores);
        metrics.record_model_scores(&scores);

        let stats = metrics.get_model_stats();
        assert_eq!(stats["RandomForest"].calls, 2);
        assert_eq!(stats["MLP"].mean_us, 20);
    }
}
