use futures::future::try_join_all;
use hrconnect_core::{
    FormErrors, HrError, LeaveBackend, LeaveBalance, LeaveRecord, LeaveRequest, LeaveType, Result,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const MAX_LEAVE_DAYS: f64 = 365.0;
pub const MAX_REASON_CHARS: usize = 500;

/// Leave application as entered by the user.
#[derive(Debug, Clone, Default)]
pub struct LeaveForm {
    pub leave_type: Option<LeaveType>,
    pub days: f64,
    pub reason: String,
}

impl LeaveForm {
    /// Check the fields and build the request body.
    pub fn validate(&self) -> Result<(LeaveType, LeaveRequest)> {
        let mut errors = FormErrors::new();

        if self.leave_type.is_none() {
            errors.add("leave_type", "Please select a leave type.");
        }

        if !self.days.is_finite() || self.days < 1.0 {
            errors.add("days", "Please enter at least 1 day.");
        } else if self.days > MAX_LEAVE_DAYS {
            errors.add("days", "Days cannot exceed 365.");
        } else if self.days.fract() != 0.0 {
            errors.add("days", "Days must be a whole number.");
        }

        let reason = self.reason.trim();
        if reason.is_empty() {
            errors.add("reason", "Please provide a reason for your leave.");
        } else if reason.chars().count() > MAX_REASON_CHARS {
            errors.add("reason", "Reason cannot exceed 500 characters.");
        }

        errors.into_result()?;

        let leave_type = self
            .leave_type
            .ok_or_else(|| HrError::Validation("Please select a leave type.".into()))?;
        Ok((
            leave_type,
            LeaveRequest {
                used_days: self.days as u32,
                reason: reason.to_string(),
            },
        ))
    }
}

/// A history record tagged with the kind of leave it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveEntry {
    pub leave_type: LeaveType,
    #[serde(flatten)]
    pub record: LeaveRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub balances: Vec<(LeaveType, LeaveBalance)>,
    pub total_remaining: f64,
    pub request_count: usize,
}

pub struct LeaveService {
    backend: Arc<dyn LeaveBackend>,
}

impl LeaveService {
    pub fn new(backend: Arc<dyn LeaveBackend>) -> Self {
        Self { backend }
    }

    /// Balances of every leave type, in dashboard order.
    pub async fn balances(&self) -> Result<Vec<(LeaveType, LeaveBalance)>> {
        let balances = try_join_all(LeaveType::ALL.iter().map(|&leave_type| async move {
            let balance = self.backend.balance(leave_type).await?;
            Ok::<_, HrError>((leave_type, balance))
        }))
        .await?;

        debug!("Loaded {} leave balances", balances.len());
        Ok(balances)
    }

    /// Request history of all leave types, grouped in dashboard order.
    pub async fn combined_history(&self) -> Result<Vec<LeaveEntry>> {
        let histories = try_join_all(LeaveType::ALL.iter().map(|&leave_type| async move {
            let history = self.backend.leave_history(leave_type).await?;
            Ok::<_, HrError>((leave_type, history))
        }))
        .await?;

        Ok(histories
            .into_iter()
            .flat_map(|(leave_type, history)| {
                history
                    .history
                    .into_iter()
                    .map(move |record| LeaveEntry { leave_type, record })
            })
            .collect())
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        let (balances, history) =
            futures::future::try_join(self.balances(), self.combined_history()).await?;

        let total_remaining = balances.iter().map(|(_, b)| b.remaining()).sum();
        Ok(DashboardSummary {
            balances,
            total_remaining,
            request_count: history.len(),
        })
    }

    /// Validate the form, check the balance, then file the request.
    #[instrument(skip(self, form))]
    pub async fn apply(&self, form: &LeaveForm) -> Result<LeaveRequest> {
        let (leave_type, request) = form.validate()?;

        let remaining = self.backend.balance(leave_type).await?.remaining();
        if f64::from(request.used_days) > remaining {
            return Err(HrError::Validation(format!(
                "Not enough balance. You have only {} day(s) left.",
                remaining
            )));
        }

        self.backend.create_leave(leave_type, &request).await?;
        info!("Filed {} request for {} day(s)", leave_type, request.used_days);
        Ok(request)
    }

    pub async fn update(&self, leave_type: LeaveType, request: &LeaveRequest) -> Result<()> {
        self.backend.update_leave(leave_type, request).await?;
        info!("Updated {} request", leave_type);
        Ok(())
    }
}
