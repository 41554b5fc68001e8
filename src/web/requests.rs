//! # Function Request Bodies
//!
//! Each function endpoint accepts `{ "action": ..., ...fields }`. The action
//! tag selects the enum variant; unknown actions and missing or mistyped
//! fields are rejected while decoding, before any service is called.

use serde::Deserialize;
use uuid::Uuid;

use crate::models::{NewAutomationRule, NewOrder, QueueFilter};
use crate::orchestration::{
    BundleRequest, ExceptionRequest, PaymentConfirmation, QualityInspection, RoutingRequest,
    StatusUpdate, WeddingPartyRequest,
};

const DEFAULT_DASHBOARD_DAYS: i64 = 30;

fn default_days() -> i64 {
    DEFAULT_DASHBOARD_DAYS
}

/// `order-management`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderManagementRequest {
    CreateOrder(NewOrder),
    CreateOrderQueueEntry { order_id: Uuid },
    GetProcessingQueue(QueueFilter),
    UpdateOrderStatus(StatusUpdate),
    GetOrderAnalytics { order_id: Uuid },
    ProcessAutomationRules { order_id: Uuid },
    CreateAutomationRule(NewAutomationRule),
}

/// `order-workflow-automation`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowRequest {
    ProcessPaymentConfirmation(PaymentConfirmation),
    IntelligentOrderRouting(RoutingRequest),
    BundleOrderProcessing(BundleRequest),
    WeddingPartyCoordination(WeddingPartyRequest),
    ExceptionHandling(ExceptionRequest),
    QualityAssuranceWorkflow(QualityInspection),
}

/// `processing-analytics`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnalyticsRequest {
    CalculateOrderMetrics {
        order_id: Uuid,
    },
    GetEfficiencyDashboard {
        #[serde(default = "default_days")]
        days: i64,
    },
    ProcessorPerformance {
        #[serde(default = "default_days")]
        days: i64,
    },
    BottleneckAnalysis {
        #[serde(default = "default_days")]
        days: i64,
    },
    SlaCompliance {
        #[serde(default = "default_days")]
        days: i64,
    },
    RealTimeMetrics,
}

/// `exception-handling`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExceptionActionRequest {
    CreateException(ExceptionRequest),
    AttemptAutoResolution {
        exception_id: Uuid,
    },
    StartExceptionWork {
        exception_id: Uuid,
    },
    ResolveException {
        exception_id: Uuid,
        #[serde(default)]
        resolution_notes: Option<String>,
        #[serde(default)]
        actor: Option<String>,
    },
    EscalateException {
        exception_id: Uuid,
        escalated_to: String,
    },
    ListOrderExceptions {
        order_id: Uuid,
    },
}
