use anyhow::{Context, Result};
use dice_game::{RoundError, RoundRecord};
use opentelemetry::{
    global,
    metrics::{Counter, Meter},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

pub fn build_provider(registry: &Registry) -> Result<SdkMeterProvider> {
    Ok(SdkMeterProvider::builder()
        .with_reader(
            opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .context("starting prometheus exporter")?,
        )
        .build())
}

/// Init global metrics meter we expose as an endpoint
pub fn setup_metrics() -> Result<Registry> {
    let registry = Registry::new();
    let provider = build_provider(&registry)?;
    global::set_meter_provider(provider);
    Ok(registry)
}

pub fn render(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("metrics are not utf-8")
}

#[derive(Clone)]
pub struct RoundMetrics {
    resolved: Counter<u64>,
    won: Counter<u64>,
    rejected: Counter<u64>,
}

impl RoundMetrics {
    pub fn global() -> Self {
        Self::new(&global::meter("dice_party"))
    }

    pub fn new(meter: &Meter) -> Self {
        Self {
            resolved: meter
                .u64_counter("dice_rounds_resolved")
                .with_description("Rounds that drew a roll")
                .build(),
            won: meter
                .u64_counter("dice_rounds_won")
                .with_description("Resolved rounds the player won")
                .build(),
            rejected: meter
                .u64_counter("dice_rounds_rejected")
                .with_description("Round starts refused by the engine")
                .build(),
        }
    }

    pub fn record_resolved(&self, record: &RoundRecord) {
        let condition = KeyValue::new("condition", record.condition.to_string());
        self.resolved.add(1, &[condition.clone()]);
        if record.won {
            self.won.add(1, &[condition]);
        }
    }

    pub fn record_rejected(&self, err: &RoundError) {
        let reason = match err {
            RoundError::Validation(_) => "validation",
            RoundError::RoundInProgress => "in_progress",
            RoundError::NoRoundInProgress | RoundError::RollOutOfRange(_) => "internal",
        };
        self.rejected.add(1, &[KeyValue::new("reason", reason)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dice_game::{Condition, ValidationError};
    use opentelemetry::metrics::MeterProvider;

    #[test]
    fn counters_show_up_in_exposition() {
        let registry = Registry::new();
        let provider = build_provider(&registry).unwrap();
        let metrics = RoundMetrics::new(&provider.meter("dice_party_test"));

        metrics.record_resolved(&RoundRecord::new(1, 50, Condition::GreaterThan, 75, 1));
        metrics.record_resolved(&RoundRecord::new(2, 50, Condition::GreaterThan, 25, 2));
        metrics.record_rejected(&RoundError::Validation(ValidationError::Empty));

        let text = render(&registry).unwrap();
        assert!(text.contains("dice_rounds_resolved"), "{text}");
        assert!(text.contains("dice_rounds_won"), "{text}");
        assert!(text.contains("reason=\"validation\""), "{text}");
    }
}
