// ============================================================================
// Result Fan-out Router
// ============================================================================
//
// One verdict, several downstream queues, each with its own framing.
// The routing table is data: (queue, shape, condition) rows built from
// RabbitMqConfig, so adding a consumer queue is a config change.
//
// Shapes:
//   Result        {transferId, isFraud, status, amount, timestamp}
//   Event         Result + event_type = "FraudCheckCompleted"
//   DelayedEvent  Result + event_type = "DelayedFraudCheckCompleted"
//
// ============================================================================

use crate::fraud_worker::types::Verdict;
use fraud_config::RabbitMqConfig;
use serde_json::{Map, Value};

pub const FRAUD_CHECK_COMPLETED: &str = "FraudCheckCompleted";
pub const DELAYED_FRAUD_CHECK_COMPLETED: &str = "DelayedFraudCheckCompleted";

/// Presentation of a verdict on a given queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Result,
    Event,
    DelayedEvent,
}

impl PayloadShape {
    pub fn event_type(&self) -> Option<&'static str> {
        match self {
            PayloadShape::Result => None,
            PayloadShape::Event => Some(FRAUD_CHECK_COMPLETED),
            PayloadShape::DelayedEvent => Some(DELAYED_FRAUD_CHECK_COMPLETED),
        }
    }

    pub fn render(&self, verdict: &Verdict) -> Value {
        let mut fields = Map::new();
        if let Some(event_type) = self.event_type() {
            fields.insert("event_type".into(), Value::from(event_type));
        }
        fields.insert("transferId".into(), Value::from(verdict.transfer_id.as_str()));
        fields.insert("isFraud".into(), Value::Bool(verdict.is_fraud));
        fields.insert("status".into(), Value::from(verdict.status.to_string()));
        fields.insert(
            "amount".into(),
            Value::Number(verdict.amount.as_number().clone()),
        );
        fields.insert("timestamp".into(), Value::from(verdict.timestamp.as_str()));
        Value::Object(fields)
    }
}

/// When a route applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCondition {
    Always,
    /// Only for requests flagged `isDelayed`
    DelayedOnly,
}

impl RouteCondition {
    fn matches(&self, is_delayed: bool) -> bool {
        match self {
            RouteCondition::Always => true,
            RouteCondition::DelayedOnly => is_delayed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub queue: String,
    pub shape: PayloadShape,
    pub condition: RouteCondition,
}

impl Route {
    pub fn new(queue: impl Into<String>, shape: PayloadShape, condition: RouteCondition) -> Self {
        Self {
            queue: queue.into(),
            shape,
            condition,
        }
    }
}

/// A rendered message bound for one queue
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub queue: String,
    pub shape: PayloadShape,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Standard topology: events, results, delayed results, then mirrors
    pub fn from_config(config: &RabbitMqConfig) -> Self {
        let mut routes = vec![
            Route::new(&config.events_queue, PayloadShape::Event, RouteCondition::Always),
            Route::new(&config.result_queue, PayloadShape::Result, RouteCondition::Always),
            Route::new(
                &config.delayed_queue,
                PayloadShape::DelayedEvent,
                RouteCondition::DelayedOnly,
            ),
        ];
        routes.extend(
            config
                .mirror_result_queues
                .iter()
                .map(|q| Route::new(q, PayloadShape::Result, RouteCondition::Always)),
        );
        Self::new(routes)
    }

    /// Messages to publish for this verdict, in table order
    pub fn route(&self, verdict: &Verdict, is_delayed: bool) -> Vec<RoutedMessage> {
        self.routes
            .iter()
            .filter(|r| r.condition.matches(is_delayed))
            .map(|r| RoutedMessage {
                queue: r.queue.clone(),
                shape: r.shape,
                payload: r.shape.render(verdict),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::FraudStatus;
    use crate::fraud_worker::types::Amount;

    fn verdict() -> Verdict {
        Verdict {
            transfer_id: "t-1".to_string(),
            is_fraud: true,
            status: FraudStatus::Declined,
            amount: Amount::from(1500),
            timestamp: "2024-03-01T12:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_non_delayed_goes_to_events_and_results() {
        let table = RoutingTable::from_config(&RabbitMqConfig::default());
        let messages = table.route(&verdict(), false);

        let queues: Vec<&str> = messages.iter().map(|m| m.queue.as_str()).collect();
        assert_eq!(queues, vec!["FraudEvents", "FraudResult"]);
    }

    #[test]
    fn test_delayed_adds_delayed_queue() {
        let table = RoutingTable::from_config(&RabbitMqConfig::default());
        let messages = table.route(&verdict(), true);

        assert_eq!(messages.len(), 3);
        let delayed = &messages[2];
        assert_eq!(delayed.queue, "FraudCheckResults");
        assert_eq!(delayed.shape, PayloadShape::DelayedEvent);
        assert_eq!(delayed.payload["event_type"], DELAYED_FRAUD_CHECK_COMPLETED);
    }

    #[test]
    fn test_shapes_share_verdict_fields() {
        let v = verdict();
        let result = PayloadShape::Result.render(&v);
        let event = PayloadShape::Event.render(&v);

        assert!(result.get("event_type").is_none());
        assert_eq!(event["event_type"], FRAUD_CHECK_COMPLETED);
        for field in ["transferId", "isFraud", "status", "amount", "timestamp"] {
            assert_eq!(result[field], event[field], "field {field} differs");
        }
        assert_eq!(result, serde_json::to_value(&v).unwrap());
    }

    #[test]
    fn test_mirror_queues_receive_result_shape() {
        let config = RabbitMqConfig {
            mirror_result_queues: vec!["TransactionServiceQueue".to_string()],
            ..RabbitMqConfig::default()
        };
        let table = RoutingTable::from_config(&config);
        let messages = table.route(&verdict(), false);

        let mirror = messages.last().unwrap();
        assert_eq!(mirror.queue, "TransactionServiceQueue");
        assert_eq!(mirror.shape, PayloadShape::Result);
    }
}
