use prometheus::{CounterVec, Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsCollector {
    registry: Registry,

    // Traffic
    pub requests_total: CounterVec,
    pub responses_total: CounterVec,
    pub validation_rejections: IntCounter,

    // Registry
    pub registrations_total: IntCounter,
    pub contracts: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("proteus_requests_total", "Total number of mocked requests"),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let responses_total = CounterVec::new(
            Opts::new("proteus_responses_total", "Mocked responses by body source"),
            &["source"],
        )?;
        registry.register(Box::new(responses_total.clone()))?;

        let validation_rejections = IntCounter::new(
            "proteus_validation_rejections_total",
            "Requests rejected by a request schema",
        )?;
        registry.register(Box::new(validation_rejections.clone()))?;

        let registrations_total = IntCounter::new(
            "proteus_registrations_total",
            "Contract instances registered",
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let contracts = IntGauge::new("proteus_contracts", "Active contracts")?;
        registry.register(Box::new(contracts.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            responses_total,
            validation_rejections,
            registrations_total,
            contracts,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub async fn metrics(&self) -> String {
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        assert!(collector.is_ok());
    }

    #[test]
    fn test_metrics_encoding() {
        let collector = MetricsCollector::new().unwrap();

        collector.requests_total.with_label_values(&["POST", "201"]).inc();
        collector.responses_total.with_label_values(&["synthesized"]).inc();
        collector.contracts.set(3);

        let metrics_text = collector.encode().unwrap();
        assert!(metrics_text.contains("proteus_requests_total"));
        assert!(metrics_text.contains("proteus_responses_total"));
        assert!(metrics_text.contains("proteus_contracts 3"));
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let handler = MetricsHandler::new(collector.clone());

        collector.validation_rejections.inc();

        let metrics = handler.metrics().await;
        assert!(metrics.contains("proteus_validation_rejections_total 1"));
    }
}
