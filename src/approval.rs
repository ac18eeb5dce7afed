//! Approval chain resolver.
//!
//! The chain is materialised once, at submission, from facts owned by other
//! systems (see [`Directory`]). Rows are stored in decision order and only the
//! single `Pending` row may be decided; later rows stay `Queued` until the row
//! before them is approved.
use crate::config::ApprovalConfig;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::request::{AssetRequest, AssetRequestApproval, RequestEventKind};
use crate::status::{ApprovalStatus, Decision, RequestStatus};
use crate::types::TimeStamp;
use std::collections::{HashMap, HashSet};

/// Organisational facts consumed by the resolver: the HRIS reporting chain and
/// per-category approval flags.
pub trait Directory: Send + Sync {
    /// Managers of `user`, nearest first
    fn reporting_chain(&self, user: &str) -> Vec<String>;
    /// Unknown categories must answer `true`
    fn category_requires_approval(&self, category: &str) -> bool;
}

/// In-memory directory, loaded from a snapshot of the HRIS data
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    managers: HashMap<String, String>,
    categories: HashMap<String, bool>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_manager(mut self, user: &str, manager: &str) -> Self {
        self.managers.insert(user.to_string(), manager.to_string());
        self
    }
    pub fn with_category(mut self, category: &str, requires_approval: bool) -> Self {
        self.categories
            .insert(category.to_lowercase(), requires_approval);
        self
    }
}

impl Directory for StaticDirectory {
    fn reporting_chain(&self, user: &str) -> Vec<String> {
        let mut chain = vec![];
        let mut seen = HashSet::from([user.to_string()]);
        let mut current = user;

        // stop on cycles in the org data
        while let Some(manager) = self.managers.get(current) {
            if !seen.insert(manager.clone()) {
                break;
            }
            chain.push(manager.clone());
            current = manager;
        }
        chain
    }
    fn category_requires_approval(&self, category: &str) -> bool {
        self.categories
            .get(&category.to_lowercase())
            .copied()
            .unwrap_or(true)
    }
}

pub struct ApprovalChainResolver<'a> {
    directory: &'a dyn Directory,
    config: &'a ApprovalConfig,
}

impl<'a> ApprovalChainResolver<'a> {
    pub fn new(directory: &'a dyn Directory, config: &'a ApprovalConfig) -> Self {
        Self { directory, config }
    }

    pub fn requires_approval(&self, request: &AssetRequest) -> bool {
        if self
            .config
            .skip_request_types
            .contains(&request.request_type)
        {
            return false;
        }
        request.items().iter().any(|item| match &item.category {
            Some(category) => self.directory.category_requires_approval(category),
            None => true,
        })
    }

    /// Builds the ordered approver rows for `request`; empty when no approval
    /// is needed.
    pub fn resolve(&self, request: &AssetRequest) -> Result<Vec<AssetRequestApproval>> {
        if !self.requires_approval(request) {
            return Ok(vec![]);
        }

        let mut approvers: Vec<String> = self
            .directory
            .reporting_chain(&request.requester)
            .into_iter()
            .take(self.config.max_chain_depth)
            .collect();
        if approvers.is_empty() {
            approvers = self.config.fallback_approvers.clone();
        }

        let mut seen = HashSet::new();
        let approvers: Vec<String> = approvers
            .into_iter()
            .filter(|a| a != &request.requester && seen.insert(a.clone()))
            .collect();

        if approvers.is_empty() {
            return Err(ValidationError::NoApprover(request.request_number.clone()).into());
        }

        Ok(approvers
            .into_iter()
            .enumerate()
            .map(|(sequence, approver)| AssetRequestApproval::new(sequence as u32, approver))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Approved at this step, the named approver is now current
    Advanced { next_approver: String },
    /// Final approval, the request is approved
    Approved,
    Rejected,
}

/// Records `approver`'s decision on the current approval row.
///
/// A rejection ends the request immediately; the rows after it are left
/// `Queued` and are never re-activated.
pub fn decide(
    request: &mut AssetRequest,
    approver: &str,
    decision: Decision,
    remarks: Option<String>,
) -> Result<DecisionOutcome> {
    request.ensure_status(RequestStatus::can_decide, "decide")?;

    let index = request
        .approvals
        .iter()
        .position(|a| a.status == ApprovalStatus::Pending)
        .filter(|&i| request.approvals[i].approver == approver)
        .ok_or_else(|| WorkflowError::NotCurrentApprover {
            request_id: request.request_number.clone(),
            approver: approver.to_string(),
        })?;

    let remarks = remarks.filter(|r| !r.trim().is_empty());
    // a rejection is only recorded together with its reason
    if decision == Decision::Reject && remarks.is_none() {
        return Err(ValidationError::MissingField("remarks").into());
    }

    let sequence = request.approvals[index].sequence;
    let row = &mut request.approvals[index];
    row.decided_at = Some(TimeStamp::new());
    row.remarks = remarks.clone();

    let outcome = match decision {
        Decision::Approve => {
            row.status = ApprovalStatus::Approved;
            request.record(approver, RequestEventKind::Approved { sequence });

            match request.approvals.get_mut(index + 1) {
                Some(next) => {
                    next.status = ApprovalStatus::Pending;
                    DecisionOutcome::Advanced {
                        next_approver: next.approver.clone(),
                    }
                }
                None => {
                    request.status = RequestStatus::Approved;
                    DecisionOutcome::Approved
                }
            }
        }
        Decision::Reject => {
            row.status = ApprovalStatus::Rejected;
            request.status = RequestStatus::Rejected;
            request.rejection_reason = remarks;
            request.record(approver, RequestEventKind::Rejected { sequence });
            DecisionOutcome::Rejected
        }
    };

    debug_assert!(request.approval_chain_consistent());
    Ok(outcome)
}
