use serde::Serialize;
use tracing::{error, info, warn};

/// Everything the service records in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    #[serde(rename = "report.created")]
    ReportCreated,
    #[serde(rename = "report.reclaimed")]
    ReportReclaimed,
    #[serde(rename = "report.completed")]
    ReportCompleted,
    #[serde(rename = "report.failed")]
    ReportFailed,
    #[serde(rename = "report.low_quality")]
    ReportLowQuality,
    #[serde(rename = "payment.captured")]
    PaymentCaptured,
    #[serde(rename = "payment.capture_failed")]
    PaymentCaptureFailed,
    #[serde(rename = "payment.cancelled")]
    PaymentCancelled,
    #[serde(rename = "payment.cancel.manual_intervention")]
    PaymentManualIntervention,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ReportCreated => "report.created",
            AuditAction::ReportReclaimed => "report.reclaimed",
            AuditAction::ReportCompleted => "report.completed",
            AuditAction::ReportFailed => "report.failed",
            AuditAction::ReportLowQuality => "report.low_quality",
            AuditAction::PaymentCaptured => "payment.captured",
            AuditAction::PaymentCaptureFailed => "payment.capture_failed",
            AuditAction::PaymentCancelled => "payment.cancelled",
            AuditAction::PaymentManualIntervention => "payment.cancel.manual_intervention",
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            AuditAction::ReportCreated
            | AuditAction::ReportReclaimed
            | AuditAction::ReportCompleted
            | AuditAction::ReportFailed
            | AuditAction::ReportLowQuality => "report",
            AuditAction::PaymentCaptured
            | AuditAction::PaymentCaptureFailed
            | AuditAction::PaymentCancelled
            | AuditAction::PaymentManualIntervention => "payment",
        }
    }

    /// Someone has to look at this by hand.
    pub fn requires_attention(&self) -> bool {
        matches!(
            self,
            AuditAction::PaymentManualIntervention | AuditAction::ReportLowQuality
        )
    }
}

/// A structured audit event.
///
/// Payment vendor and storage calls are visible in their own logs; these
/// events record what the service decided to do with them.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub report_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_id: impl Into<String>) -> Self {
        Self {
            action,
            resource_type: action.resource_type(),
            resource_id: resource_id.into(),
            report_id: None,
            details: None,
        }
    }

    /// Event about a report, keyed by its report id.
    pub fn report(action: AuditAction, report_id: impl Into<String>) -> Self {
        let report_id = report_id.into();
        Self::new(action, report_id.clone()).with_report(report_id)
    }

    /// Event about a payment, keyed by its payment reference.
    pub fn payment(action: AuditAction, payment_ref: impl Into<String>) -> Self {
        Self::new(action, payment_ref)
    }

    pub fn with_report(mut self, report_id: impl Into<String>) -> Self {
        self.report_id = Some(report_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Emit this audit event via tracing.
    pub fn emit(&self) {
        let details = self
            .details
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        let report_id = self.report_id.as_deref().unwrap_or("");

        if self.action == AuditAction::PaymentManualIntervention {
            error!(
                audit.action = self.action.as_str(),
                audit.resource_type = self.resource_type,
                audit.resource_id = %self.resource_id,
                audit.report_id = report_id,
                audit.details = %details,
                "audit event requires manual intervention"
            );
        } else if self.action.requires_attention() {
            warn!(
                audit.action = self.action.as_str(),
                audit.resource_type = self.resource_type,
                audit.resource_id = %self.resource_id,
                audit.report_id = report_id,
                audit.details = %details,
                "audit event"
            );
        } else {
            info!(
                audit.action = self.action.as_str(),
                audit.resource_type = self.resource_type,
                audit.resource_id = %self.resource_id,
                audit.report_id = report_id,
                audit.details = %details,
                "audit event"
            );
        }
    }
}
