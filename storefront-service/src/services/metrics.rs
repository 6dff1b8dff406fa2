use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::models::OrderStatus;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process. Later calls reuse it.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("A global metrics recorder was already installed");
        }
        handle
    });
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_cart_mutation(operation: &'static str, outcome: &'static str) {
    counter!("storefront_cart_mutations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_checkout_transition(transition: &'static str) {
    counter!("storefront_checkout_transitions_total", "transition" => transition).increment(1);
}

pub fn record_order_status(status: OrderStatus) {
    counter!("storefront_orders_by_status_total", "status" => status.to_string()).increment(1);
}

pub fn record_saga_compensation(saga: &'static str, step: &'static str) {
    counter!("storefront_saga_compensations_total", "saga" => saga, "step" => step).increment(1);
}
