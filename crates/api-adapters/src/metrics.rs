//! Operation counters in OpenMetrics text format.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Ok,
    /// Validation, permission or state conflict.
    Rejected,
    /// Store or other dependency failure.
    Failed,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    operation: String,
    outcome: Outcome,
}

pub struct ApiMetrics {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("pairpoints");
        let operations = Family::<OperationLabels, Counter>::default();
        registry.register("operations", "Operations handled, by outcome", operations.clone());
        Self { registry, operations }
    }

    pub fn record(&self, operation: &str, outcome: Outcome) {
        self.operations
            .get_or_create(&OperationLabels { operation: operation.to_string(), outcome })
            .inc();
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}
