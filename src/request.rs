//! Asset requests and the request workflow engine.
//!
//! ```text
//! Draft -> Submitted -> PendingApproval -> Approved -> PendingFulfillment -> Fulfilled -> Closed
//!   |          |              |      \______________________________________/^
//!   +----------+--------------+--> Cancelled (requester only)
//!                             +--> Rejected (any approver)
//! ```
//!
//! A request whose approval chain resolves empty goes straight from
//! `Submitted` to `Approved`. `Fulfilled`, `Closed`, `Cancelled` and `Rejected`
//! are terminal; the one exception is closing a fulfilled request.
use crate::error::{Result, ValidationError, WorkflowError};
use crate::status::{ApprovalStatus, RequestStatus, RequestType};
use crate::types::TimeStamp;
use chrono::Utc;
use std::collections::HashSet;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AssetRequestItem {
    #[n(0)]
    pub line: u32, // 1-based, stable for the life of the request
    #[n(1)]
    pub category: Option<String>,
    #[n(2)]
    pub asset_tag: Option<String>,
    #[n(3)]
    pub quantity: u32,
    #[n(4)]
    pub specifications: Option<String>,
    #[n(5)]
    pub transfer_to: Option<String>,
    #[n(6)]
    pub fulfilled_assets: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AssetRequestApproval {
    #[n(0)]
    pub sequence: u32,
    #[n(1)]
    pub approver: String,
    #[n(2)]
    pub status: ApprovalStatus,
    #[n(3)]
    pub remarks: Option<String>,
    #[n(4)]
    pub decided_at: Option<TimeStamp<Utc>>,
}

impl AssetRequestApproval {
    pub fn new(sequence: u32, approver: String) -> Self {
        let status = if sequence == 0 {
            ApprovalStatus::Pending
        } else {
            ApprovalStatus::Queued
        };
        Self {
            sequence,
            approver,
            status,
            remarks: None,
            decided_at: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum RequestEventKind {
    #[n(0)]
    Created,
    #[n(1)]
    ItemAdded {
        #[n(0)]
        line: u32,
    },
    #[n(2)]
    Submitted {
        #[n(0)]
        approvers: u32,
    },
    #[n(3)]
    AutoApproved,
    #[n(4)]
    Approved {
        #[n(0)]
        sequence: u32,
    },
    #[n(5)]
    Rejected {
        #[n(0)]
        sequence: u32,
    },
    #[n(6)]
    Cancelled,
    #[n(7)]
    FulfillmentStarted,
    #[n(8)]
    Fulfilled {
        #[n(0)]
        assets: u32,
    },
    #[n(9)]
    Closed,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct RequestEvent {
    #[n(0)]
    pub actor: String,
    #[n(1)]
    pub at: TimeStamp<Utc>,
    #[n(2)]
    pub kind: RequestEventKind,
}

// used for attaching items to a draft
#[derive(Debug, Clone)]
pub struct ItemDraft {
    category: Option<String>,
    asset_tag: Option<String>,
    quantity: u32,
    specifications: Option<String>,
    transfer_to: Option<String>,
}

impl Default for ItemDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemDraft {
    pub fn new() -> Self {
        Self {
            category: None,
            asset_tag: None,
            quantity: 1,
            specifications: None,
            transfer_to: None,
        }
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.trim().to_lowercase());
        self
    }
    pub fn set_asset(mut self, tag: &str) -> Self {
        self.asset_tag = Some(tag.trim().to_string());
        self
    }
    pub fn set_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_specifications(mut self, specifications: &str) -> Self {
        self.specifications = Some(specifications.to_string());
        self
    }
    pub fn set_transfer_to(mut self, user: &str) -> Self {
        self.transfer_to = Some(user.trim().to_string());
        self
    }
    pub fn asset_tag(&self) -> Option<&str> {
        self.asset_tag.as_deref()
    }
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
    fn validate(&self, request_type: RequestType, line: u32) -> Result<()> {
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity { line }.into());
        }
        let has_asset = self.asset_tag.as_deref().is_some_and(|t| !t.is_empty());
        let has_category = self.category.as_deref().is_some_and(|c| !c.is_empty());

        if request_type.requires_specific_asset() && !has_asset {
            return Err(ValidationError::MissingAsset { line }.into());
        }
        if !has_asset && !has_category {
            return Err(ValidationError::MissingCategory { line }.into());
        }
        // a specific asset is always a single unit
        if has_asset && self.quantity != 1 {
            return Err(ValidationError::InvalidQuantity { line }.into());
        }
        if request_type.requires_transfer_target()
            && self.transfer_to.as_deref().is_none_or(str::is_empty)
        {
            return Err(ValidationError::MissingTransferTarget { line }.into());
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AssetRequest {
    #[n(0)]
    pub request_number: String,
    #[n(1)]
    pub requester: String,
    #[n(2)]
    pub request_type: RequestType,
    #[n(3)]
    pub(crate) status: RequestStatus,
    #[n(4)]
    pub justification: Option<String>,
    #[n(5)]
    pub(crate) rejection_reason: Option<String>,
    #[n(6)]
    pub(crate) fulfilled_by: Option<String>,
    #[n(7)]
    pub(crate) fulfilled_at: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub(crate) fulfillment_notes: Option<String>,
    #[n(9)]
    pub(crate) items: Vec<AssetRequestItem>,
    #[n(10)]
    pub(crate) approvals: Vec<AssetRequestApproval>, // in decision order
    #[n(11)]
    pub(crate) history: Vec<RequestEvent>,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
    #[n(13)]
    pub(crate) updated_at: TimeStamp<Utc>,
}

impl AssetRequest {
    pub fn new(
        request_number: String,
        requester: String,
        request_type: RequestType,
        justification: Option<String>,
    ) -> Self {
        let now = TimeStamp::new();
        let mut request = Self {
            request_number,
            requester,
            request_type,
            status: RequestStatus::Draft,
            justification,
            rejection_reason: None,
            fulfilled_by: None,
            fulfilled_at: None,
            fulfillment_notes: None,
            items: vec![],
            approvals: vec![],
            history: vec![],
            created_at: now.clone(),
            updated_at: now,
        };
        let requester = request.requester.clone();
        request.record(&requester, RequestEventKind::Created);
        request
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }
    pub fn items(&self) -> &[AssetRequestItem] {
        &self.items
    }
    pub fn item(&self, line: u32) -> Option<&AssetRequestItem> {
        self.items.iter().find(|item| item.line == line)
    }
    pub fn approvals(&self) -> &[AssetRequestApproval] {
        &self.approvals
    }
    pub fn history(&self) -> &[RequestEvent] {
        &self.history
    }
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }
    pub fn fulfilled_by(&self) -> Option<&str> {
        self.fulfilled_by.as_deref()
    }
    pub fn fulfilled_at(&self) -> Option<&TimeStamp<Utc>> {
        self.fulfilled_at.as_ref()
    }
    pub fn fulfillment_notes(&self) -> Option<&str> {
        self.fulfillment_notes.as_deref()
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }

    /// The single approval row that may be decided now
    pub fn current_approval(&self) -> Option<&AssetRequestApproval> {
        if self.status != RequestStatus::PendingApproval {
            return None;
        }
        self.approvals
            .iter()
            .find(|a| a.status == ApprovalStatus::Pending)
    }
    pub fn current_approver(&self) -> Option<&str> {
        self.current_approval().map(|a| a.approver.as_str())
    }
    pub fn pending_count(&self) -> usize {
        self.approvals
            .iter()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .count()
    }
    /// Whether `user` appears anywhere in the approval chain
    pub fn is_approver(&self, user: &str) -> bool {
        self.approvals.iter().any(|a| a.approver == user)
    }

    /// Checks the approval chain shape against the request status:
    /// at most one pending row, every row before it approved, and a rejected
    /// row only on a rejected request.
    pub fn approval_chain_consistent(&self) -> bool {
        if self.pending_count() > 1 {
            return false;
        }
        let rejected = self
            .approvals
            .iter()
            .any(|a| a.status == ApprovalStatus::Rejected);
        if rejected != (self.status == RequestStatus::Rejected) {
            return false;
        }
        if let Some(pending) = self
            .approvals
            .iter()
            .position(|a| a.status == ApprovalStatus::Pending)
        {
            let earlier_approved = self.approvals[..pending]
                .iter()
                .all(|a| a.status == ApprovalStatus::Approved);
            if !earlier_approved || self.status != RequestStatus::PendingApproval {
                return false;
            }
        }
        self.approvals
            .iter()
            .enumerate()
            .all(|(i, a)| a.sequence as usize == i)
    }

    /// Fails `RequestClosed` on terminal requests and `InvalidRequestState`
    /// when `allowed` does not hold for the current status.
    pub fn ensure_status(
        &self,
        allowed: fn(RequestStatus) -> bool,
        operation: &'static str,
    ) -> Result<()> {
        if allowed(self.status) {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(WorkflowError::RequestClosed {
                request_id: self.request_number.clone(),
                status: self.status,
            });
        }
        Err(WorkflowError::InvalidRequestState {
            request_id: self.request_number.clone(),
            status: self.status,
            operation,
        })
    }

    fn ensure_requester(&self, actor: &str, action: &'static str) -> Result<()> {
        if actor != self.requester {
            return Err(WorkflowError::Unauthorized {
                actor: actor.to_string(),
                action,
            });
        }
        Ok(())
    }

    pub(crate) fn record(&mut self, actor: &str, kind: RequestEventKind) {
        let now = TimeStamp::new();
        self.updated_at = now.clone();
        self.history.push(RequestEvent {
            actor: actor.to_string(),
            at: now,
            kind,
        });
    }

    /// Attaches an item to a draft. Only the requester may edit.
    pub fn add_item(&mut self, actor: &str, draft: ItemDraft) -> Result<&AssetRequestItem> {
        self.ensure_status(RequestStatus::can_edit, "edit")?;
        self.ensure_requester(actor, "edit this request")?;

        let line = self.items.len() as u32 + 1;
        draft.validate(self.request_type, line)?;

        if let Some(tag) = draft.asset_tag.as_deref() {
            if self.referenced_assets().contains(&tag) {
                return Err(ValidationError::DuplicateAsset {
                    line,
                    asset_tag: tag.to_string(),
                }
                .into());
            }
        }

        self.items.push(AssetRequestItem {
            line,
            category: draft.category,
            asset_tag: draft.asset_tag,
            quantity: draft.quantity,
            specifications: draft.specifications,
            transfer_to: draft.transfer_to,
            fulfilled_assets: vec![],
        });
        self.record(actor, RequestEventKind::ItemAdded { line });

        let index = self.items.len() - 1;
        Ok(&self.items[index])
    }

    /// Preconditions of `submit` that do not depend on the approval chain
    pub fn check_submittable(&self, actor: &str) -> Result<()> {
        self.ensure_status(RequestStatus::can_submit, "submit")?;
        self.ensure_requester(actor, "submit this request")?;
        if self.items.is_empty() {
            return Err(WorkflowError::EmptyItems(self.request_number.clone()));
        }
        Ok(())
    }

    /// Moves a draft through `Submitted` into `PendingApproval`, or straight
    /// to `Approved` when `chain` is empty.
    pub fn submit(&mut self, actor: &str, chain: Vec<AssetRequestApproval>) -> Result<()> {
        self.check_submittable(actor)?;

        self.status = RequestStatus::Submitted;
        self.record(
            actor,
            RequestEventKind::Submitted {
                approvers: chain.len() as u32,
            },
        );

        if chain.is_empty() {
            self.status = RequestStatus::Approved;
            self.record(actor, RequestEventKind::AutoApproved);
        } else {
            self.approvals = chain;
            self.status = RequestStatus::PendingApproval;
        }
        debug_assert!(self.approval_chain_consistent());
        Ok(())
    }

    pub fn cancel(&mut self, actor: &str) -> Result<()> {
        self.ensure_status(RequestStatus::can_cancel, "cancel")?;
        self.ensure_requester(actor, "cancel this request")?;

        self.status = RequestStatus::Cancelled;
        self.record(actor, RequestEventKind::Cancelled);
        Ok(())
    }

    pub fn begin_fulfillment(&mut self, actor: &str) -> Result<()> {
        self.ensure_status(|s| s == RequestStatus::Approved, "start fulfilling")?;

        self.status = RequestStatus::PendingFulfillment;
        self.record(actor, RequestEventKind::FulfillmentStarted);
        Ok(())
    }

    /// Binds the allocated assets to their lines and finishes the request
    pub fn mark_fulfilled(
        &mut self,
        actor: &str,
        notes: Option<String>,
        allocations: Vec<(u32, Vec<String>)>,
    ) -> Result<()> {
        self.ensure_status(RequestStatus::can_fulfill, "fulfill")?;

        let mut assets = 0;
        for (line, tags) in allocations {
            if let Some(item) = self.items.iter_mut().find(|item| item.line == line) {
                assets += tags.len() as u32;
                item.fulfilled_assets = tags;
            }
        }

        self.status = RequestStatus::Fulfilled;
        self.fulfilled_by = Some(actor.to_string());
        self.fulfilled_at = Some(TimeStamp::new());
        self.fulfillment_notes = notes;
        self.record(actor, RequestEventKind::Fulfilled { assets });
        Ok(())
    }

    pub fn close(&mut self, actor: &str) -> Result<()> {
        self.ensure_status(RequestStatus::can_close, "close")?;

        self.status = RequestStatus::Closed;
        self.record(actor, RequestEventKind::Closed);
        Ok(())
    }

    /// Human readable audit trail of the request
    pub fn history_lines(&self) -> Vec<String> {
        self.history
            .iter()
            .map(|event| {
                let what = match &event.kind {
                    RequestEventKind::Created => "created".to_string(),
                    RequestEventKind::ItemAdded { line } => format!("added line {line}"),
                    RequestEventKind::Submitted { approvers } => {
                        format!("submitted ({approvers} approver(s))")
                    }
                    RequestEventKind::AutoApproved => "approved (no approval required)".into(),
                    RequestEventKind::Approved { sequence } => {
                        format!("approved at step {}", sequence + 1)
                    }
                    RequestEventKind::Rejected { sequence } => {
                        format!("rejected at step {}", sequence + 1)
                    }
                    RequestEventKind::Cancelled => "cancelled".into(),
                    RequestEventKind::FulfillmentStarted => "fulfillment started".into(),
                    RequestEventKind::Fulfilled { assets } => {
                        format!("fulfilled with {assets} asset(s)")
                    }
                    RequestEventKind::Closed => "closed".into(),
                };
                format!("{} {} {}", event.at, event.actor, what)
            })
            .collect()
    }

    /// Every specific asset this request touches, in line order
    pub fn referenced_assets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter_map(|item| item.asset_tag.as_deref())
            .filter(|tag| seen.insert(*tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(request_type: RequestType) -> AssetRequest {
        AssetRequest::new(
            "req_1test".into(),
            "alice".into(),
            request_type,
            Some("new starter".into()),
        )
    }

    #[test]
    fn new_request_is_draft_with_history() {
        let request = draft(RequestType::New);
        assert_eq!(request.status(), RequestStatus::Draft);
        assert_eq!(request.history().len(), 1);
        assert_eq!(request.history()[0].kind, RequestEventKind::Created);
    }

    #[test]
    fn submit_without_items_fails() {
        let mut request = draft(RequestType::New);
        let err = request.submit("alice", vec![]).unwrap_err();
        assert_eq!(err.code(), "EMPTY_ITEMS");
        assert_eq!(request.status(), RequestStatus::Draft);
    }

    #[test]
    fn submit_with_empty_chain_auto_approves() {
        let mut request = draft(RequestType::New);
        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap();
        request.submit("alice", vec![]).unwrap();
        assert_eq!(request.status(), RequestStatus::Approved);
        assert!(request.approvals().is_empty());
    }

    #[test]
    fn submit_with_chain_waits_for_first_approver() {
        let mut request = draft(RequestType::New);
        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap();
        let chain = vec![
            AssetRequestApproval::new(0, "bob".into()),
            AssetRequestApproval::new(1, "carol".into()),
        ];
        request.submit("alice", chain).unwrap();

        assert_eq!(request.status(), RequestStatus::PendingApproval);
        assert_eq!(request.current_approver(), Some("bob"));
        assert_eq!(request.pending_count(), 1);
        assert_eq!(request.approvals()[1].status, ApprovalStatus::Queued);
        assert!(request.approval_chain_consistent());
    }

    #[test]
    fn only_requester_edits_and_submits() {
        let mut request = draft(RequestType::New);
        let err = request
            .add_item("mallory", ItemDraft::new().set_category("laptop"))
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap();
        let err = request.submit("mallory", vec![]).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn items_are_validated_per_request_type() {
        let mut request = draft(RequestType::Transfer);
        let err = request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::MissingAsset { line: 1 })
        ));

        let err = request
            .add_item("alice", ItemDraft::new().set_asset("LAPTOP-001"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::MissingTransferTarget { line: 1 })
        ));

        request
            .add_item(
                "alice",
                ItemDraft::new()
                    .set_asset("LAPTOP-001")
                    .set_transfer_to("bob"),
            )
            .unwrap();
        let err = request
            .add_item(
                "alice",
                ItemDraft::new()
                    .set_asset("LAPTOP-001")
                    .set_transfer_to("carol"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::DuplicateAsset { line: 2, .. })
        ));

        let mut request = draft(RequestType::New);
        let err = request
            .add_item("alice", ItemDraft::new().set_category("laptop").set_quantity(0))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn cancel_is_requester_only_and_not_after_approval() {
        let mut request = draft(RequestType::New);
        assert_eq!(request.cancel("bob").unwrap_err().code(), "UNAUTHORIZED");
        request.cancel("alice").unwrap();
        assert_eq!(request.status(), RequestStatus::Cancelled);
        assert_eq!(request.cancel("alice").unwrap_err().code(), "REQUEST_CLOSED");

        let mut request = draft(RequestType::New);
        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap();
        request.submit("alice", vec![]).unwrap();
        assert_eq!(
            request.cancel("alice").unwrap_err().code(),
            "INVALID_REQUEST_STATE"
        );
    }

    #[test]
    fn terminal_requests_reject_edits() {
        let mut request = draft(RequestType::New);
        request.cancel("alice").unwrap();
        let err = request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap_err();
        assert_eq!(err.code(), "REQUEST_CLOSED");
        assert_eq!(request.close("alice").unwrap_err().code(), "REQUEST_CLOSED");
    }

    #[test]
    fn fulfilled_request_can_only_be_closed() {
        let mut request = draft(RequestType::New);
        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .unwrap();
        request.submit("alice", vec![]).unwrap();
        request.begin_fulfillment("admin").unwrap();
        assert_eq!(request.status(), RequestStatus::PendingFulfillment);
        request
            .mark_fulfilled("admin", None, vec![(1, vec!["LAPTOP-001".into()])])
            .unwrap();
        assert_eq!(request.status(), RequestStatus::Fulfilled);
        assert_eq!(request.items()[0].fulfilled_assets, vec!["LAPTOP-001"]);
        assert_eq!(request.fulfilled_by(), Some("admin"));

        assert_eq!(request.cancel("alice").unwrap_err().code(), "REQUEST_CLOSED");
        request.close("alice").unwrap();
        assert_eq!(request.status(), RequestStatus::Closed);
        assert_eq!(request.history_lines().len(), request.history().len());
    }
}
