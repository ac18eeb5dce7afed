//! Service layer API for asset lifecycle and request workflow operations.
//!
//! Every mutating call is one sled transaction: the live rows, the movement
//! ledger and the request record change together or not at all. Concurrent
//! callers touching the same asset or request are serialised by sled's conflict
//! detection; the loser re-reads and fails on the winner's result.
use crate::approval::{self, ApprovalChainResolver, DecisionOutcome, Directory};
use crate::asset::{Asset, AssetDetails};
use crate::config::ServiceConfig;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::fulfillment::{self, Allocation, FulfillmentKind};
use crate::lifecycle::{self, AssetAction, TransitionContext};
use crate::movement::{self, AssetMovement, LedgerReport};
use crate::policy::{self, Actor};
use crate::request::{AssetRequest, ItemDraft};
use crate::status::{Decision, RequestStatus, RequestType};
use crate::store::{Store, Tx, TxResult, abort};
use crate::utils;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct AssetService {
    store: Store,
    directory: Arc<dyn Directory>,
    config: ServiceConfig,
}

impl AssetService {
    pub fn new(
        instance: Arc<sled::Db>,
        directory: Arc<dyn Directory>,
        config: ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Store::new(instance)?,
            directory,
            config,
        })
    }

    /// Opens the database named in `config.storage`
    pub fn open(config: ServiceConfig, directory: Arc<dyn Directory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Store::open(&config.storage)?,
            directory,
            config,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ---- assets ----

    /// Register a new asset in stock and open its ledger
    #[instrument(skip_all, fields(actor = %actor.id))]
    pub fn register_asset(
        &self,
        actor: &Actor,
        details: AssetDetails,
        notes: Option<&str>,
    ) -> Result<Asset> {
        policy::ensure(actor, policy::can_manage_assets(actor), "register assets")
            .inspect_err(|e| log_refusal("register_asset", e))?;
        let asset = details.validate_and_finalise()?;
        let ctx = TransitionContext::new(&actor.id).with_notes(notes);

        let asset = self
            .store
            .transaction(|tx| {
                if tx.asset(&asset.tag)?.is_some() {
                    return abort(ValidationError::DuplicateTag(asset.tag.clone()));
                }
                let mut asset = asset.clone();
                let opening = lifecycle::registration(&asset, &ctx);
                tx.commit_movement(&mut asset, opening)?;
                Ok(asset)
            })
            .inspect_err(|e| log_refusal("register_asset", e))?;

        info!(tag = %asset.tag, category = %asset.category, "asset registered");
        Ok(asset)
    }

    /// Apply a lifecycle action to one asset and append its movement
    #[instrument(skip_all, fields(actor = %actor.id, tag = %tag, action = action.name()))]
    pub fn transition(
        &self,
        actor: &Actor,
        tag: &str,
        action: AssetAction,
        notes: Option<&str>,
    ) -> Result<Asset> {
        policy::ensure(actor, policy::can_manage_assets(actor), "change assets")
            .inspect_err(|e| log_refusal("transition", e))?;
        let ctx = TransitionContext::new(&actor.id).with_notes(notes);

        let (asset, movement) = self
            .store
            .transaction(|tx| {
                let current = tx.require_asset(tag)?;
                let transition = lifecycle::apply(&current, &action, &ctx).or_else(abort)?;
                let mut next = transition.asset;
                let recorded = tx.commit_movement(&mut next, transition.movement)?;
                Ok((next, recorded))
            })
            .inspect_err(|e| log_refusal("transition", e))?;

        info!(
            tag = %asset.tag,
            movement = %movement.movement_type,
            from = ?movement.from_status,
            to = %movement.to_status,
            holder = ?asset.current_holder(),
            "asset transitioned"
        );
        Ok(asset)
    }

    pub fn assign(&self, actor: &Actor, tag: &str, user: &str, notes: Option<&str>) -> Result<Asset> {
        let action = AssetAction::Assign {
            user: user.to_string(),
        };
        self.transition(actor, tag, action, notes)
    }

    pub fn return_asset(
        &self,
        actor: &Actor,
        tag: &str,
        location: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Asset> {
        let action = AssetAction::Return {
            location: location.map(str::to_string),
        };
        self.transition(actor, tag, action, notes)
    }

    pub fn transfer(
        &self,
        actor: &Actor,
        tag: &str,
        user: &str,
        notes: Option<&str>,
    ) -> Result<Asset> {
        let action = AssetAction::Transfer {
            user: user.to_string(),
        };
        self.transition(actor, tag, action, notes)
    }

    pub fn repair(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::Repair, notes)
    }

    pub fn complete_repair(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::RepairComplete, notes)
    }

    pub fn retire(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::Retire, notes)
    }

    pub fn mark_lost(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::MarkLost, notes)
    }

    pub fn mark_found(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::MarkFound, notes)
    }

    pub fn dispose(&self, actor: &Actor, tag: &str, notes: Option<&str>) -> Result<Asset> {
        self.transition(actor, tag, AssetAction::Dispose, notes)
    }

    /// The asset register is readable by any caller
    pub fn get_asset(&self, tag: &str) -> Result<Asset> {
        self.store.asset(tag)?.ok_or_else(|| WorkflowError::NotFound {
            kind: "asset",
            id: tag.to_string(),
        })
    }

    pub fn assets_held_by(&self, user: &str) -> Result<Vec<Asset>> {
        Ok(self
            .store
            .assets()?
            .into_iter()
            .filter(|asset| asset.current_holder() == Some(user))
            .collect())
    }

    /// The ledger of one asset, oldest first. Unrestricted, like the register.
    pub fn movements(&self, tag: &str) -> Result<Vec<AssetMovement>> {
        self.get_asset(tag)?;
        self.store.movements(tag)
    }

    pub fn movements_for_request(&self, request_id: &str) -> Result<Vec<AssetMovement>> {
        Ok(self
            .store
            .all_movements()?
            .into_iter()
            .filter(|m| m.request_id.as_deref() == Some(request_id))
            .collect())
    }

    /// Re-walk the digest chain of an asset's ledger
    pub fn verify_ledger(&self, tag: &str) -> Result<LedgerReport> {
        let asset = self.get_asset(tag)?;
        let ledger = self.store.movements(tag)?;
        let report = movement::verify_chain(asset.ledger_head(), &ledger)?;
        if !report.intact {
            error!(tag, first_break = ?report.first_break, "asset ledger does not verify");
        }
        Ok(report)
    }

    // ---- requests ----

    /// Create a draft request, optionally with its first items
    #[instrument(skip_all, fields(actor = %actor.id, request_type = %request_type))]
    pub fn create_request(
        &self,
        actor: &Actor,
        request_type: RequestType,
        justification: Option<&str>,
        items: Vec<ItemDraft>,
    ) -> Result<AssetRequest> {
        policy::ensure(actor, policy::can_create_request(actor), "create requests")
            .inspect_err(|e| log_refusal("create_request", e))?;
        let request_number =
            utils::new_request_number().map_err(|e| WorkflowError::Codec(e.to_string()))?;

        let request = self
            .store
            .transaction(|tx| {
                let mut request = AssetRequest::new(
                    request_number.clone(),
                    actor.id.clone(),
                    request_type,
                    justification.map(str::to_string),
                );
                for item in &items {
                    let item = snapshot_category(tx, item.clone())?;
                    request.add_item(&actor.id, item).or_else(abort)?;
                }
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("create_request", e))?;

        info!(request_id = %request.request_number, items = request.items().len(), "request created");
        Ok(request)
    }

    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id))]
    pub fn add_item(&self, actor: &Actor, request_id: &str, item: ItemDraft) -> Result<AssetRequest> {
        policy::ensure(actor, actor.is_active(), "edit requests")
            .inspect_err(|e| log_refusal("add_item", e))?;

        let request = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                let item = snapshot_category(tx, item.clone())?;
                request.add_item(&actor.id, item).or_else(abort)?;
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("add_item", e))?;

        debug!(request_id, items = request.items().len(), "item added");
        Ok(request)
    }

    /// Submit a draft: resolve its approval chain and start waiting on it
    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id))]
    pub fn submit_request(&self, actor: &Actor, request_id: &str) -> Result<AssetRequest> {
        policy::ensure(actor, actor.is_active(), "submit requests")
            .inspect_err(|e| log_refusal("submit_request", e))?;
        let resolver = ApprovalChainResolver::new(self.directory.as_ref(), &self.config.approval);

        let request = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                request.check_submittable(&actor.id).or_else(abort)?;
                let chain = resolver.resolve(&request).or_else(abort)?;
                request.submit(&actor.id, chain).or_else(abort)?;
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("submit_request", e))?;

        info!(
            request_id,
            status = %request.status(),
            approvers = request.approvals().len(),
            current = ?request.current_approver(),
            "request submitted"
        );
        Ok(request)
    }

    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id))]
    pub fn cancel_request(&self, actor: &Actor, request_id: &str) -> Result<AssetRequest> {
        policy::ensure(actor, actor.is_active(), "cancel requests")
            .inspect_err(|e| log_refusal("cancel_request", e))?;

        let request = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                request.cancel(&actor.id).or_else(abort)?;
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("cancel_request", e))?;

        info!(request_id, "request cancelled");
        Ok(request)
    }

    /// Record the current approver's decision
    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id, decision = ?decision))]
    pub fn decide(
        &self,
        actor: &Actor,
        request_id: &str,
        decision: Decision,
        remarks: Option<&str>,
    ) -> Result<AssetRequest> {
        policy::ensure(actor, actor.is_active(), "decide on requests")
            .inspect_err(|e| log_refusal("decide", e))?;

        let (request, outcome) = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                let outcome = approval::decide(
                    &mut request,
                    &actor.id,
                    decision,
                    remarks.map(str::to_string),
                )
                .or_else(abort)?;
                tx.put_request(&request)?;
                Ok((request, outcome))
            })
            .inspect_err(|e| log_refusal("decide", e))?;

        match &outcome {
            DecisionOutcome::Advanced { next_approver } => {
                info!(request_id, next_approver = %next_approver, "approval step passed")
            }
            DecisionOutcome::Approved => info!(request_id, "request approved"),
            DecisionOutcome::Rejected => {
                info!(request_id, reason = ?request.rejection_reason(), "request rejected")
            }
        }
        Ok(request)
    }

    pub fn approve_request(
        &self,
        actor: &Actor,
        request_id: &str,
        remarks: Option<&str>,
    ) -> Result<AssetRequest> {
        self.decide(actor, request_id, Decision::Approve, remarks)
    }

    /// Rejections must carry a reason; it becomes the request's rejection reason
    pub fn reject_request(&self, actor: &Actor, request_id: &str, reason: &str) -> Result<AssetRequest> {
        self.decide(actor, request_id, Decision::Reject, Some(reason))
    }

    /// Acknowledge an approved request as being worked on
    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id))]
    pub fn begin_fulfillment(&self, actor: &Actor, request_id: &str) -> Result<AssetRequest> {
        ensure_fulfiller(actor).inspect_err(|e| log_refusal("begin_fulfillment", e))?;

        let request = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                request.begin_fulfillment(&actor.id).or_else(abort)?;
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("begin_fulfillment", e))?;

        info!(request_id, "fulfillment started");
        Ok(request)
    }

    /// Assign the allocated stock to a `New` request's lines
    pub fn fulfill(
        &self,
        actor: &Actor,
        request_id: &str,
        allocation: Allocation,
        notes: Option<&str>,
    ) -> Result<AssetRequest> {
        self.fulfill_with(actor, request_id, FulfillmentKind::New { allocation }, notes)
    }

    pub fn fulfill_return(
        &self,
        actor: &Actor,
        request_id: &str,
        location: Option<&str>,
        notes: Option<&str>,
    ) -> Result<AssetRequest> {
        let kind = FulfillmentKind::Return {
            location: location.map(str::to_string),
        };
        self.fulfill_with(actor, request_id, kind, notes)
    }

    pub fn fulfill_transfer(
        &self,
        actor: &Actor,
        request_id: &str,
        notes: Option<&str>,
    ) -> Result<AssetRequest> {
        self.fulfill_with(actor, request_id, FulfillmentKind::Transfer, notes)
    }

    pub fn fulfill_repair(
        &self,
        actor: &Actor,
        request_id: &str,
        notes: Option<&str>,
    ) -> Result<AssetRequest> {
        self.fulfill_with(actor, request_id, FulfillmentKind::Repair, notes)
    }

    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id, kind = %kind.request_type()))]
    fn fulfill_with(
        &self,
        actor: &Actor,
        request_id: &str,
        kind: FulfillmentKind,
        notes: Option<&str>,
    ) -> Result<AssetRequest> {
        ensure_fulfiller(actor).inspect_err(|e| log_refusal("fulfill", e))?;
        let ctx = TransitionContext::new(&actor.id).with_notes(notes);

        let (request, moved) = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                fulfillment::check_request(&request, &kind).or_else(abort)?;

                let mut assets = BTreeMap::new();
                for tag in fulfillment::tags_needed(&request, &kind) {
                    if let Some(asset) = tx.asset(&tag)? {
                        assets.insert(tag, asset);
                    }
                }

                let plan = fulfillment::plan(&request, &kind, &assets, &ctx).or_else(abort)?;
                let moved = plan.moves.len();
                for planned in plan.moves {
                    let mut asset = planned.transition.asset;
                    tx.commit_movement(&mut asset, planned.transition.movement)?;
                }

                request
                    .mark_fulfilled(&actor.id, notes.map(str::to_string), plan.allocations)
                    .or_else(abort)?;
                tx.put_request(&request)?;
                Ok((request, moved))
            })
            .inspect_err(|e| log_refusal("fulfill", e))?;

        info!(request_id, assets = moved, "request fulfilled");
        Ok(request)
    }

    #[instrument(skip_all, fields(actor = %actor.id, request_id = %request_id))]
    pub fn close_request(&self, actor: &Actor, request_id: &str) -> Result<AssetRequest> {
        let request = self
            .store
            .transaction(|tx| {
                let mut request = tx.require_request(request_id)?;
                // status problems take precedence over who is asking
                request
                    .ensure_status(RequestStatus::can_close, "close")
                    .or_else(abort)?;
                policy::ensure(actor, policy::can_close(actor, &request), "close this request")
                    .or_else(abort)?;
                request.close(&actor.id).or_else(abort)?;
                tx.put_request(&request)?;
                Ok(request)
            })
            .inspect_err(|e| log_refusal("close_request", e))?;

        info!(request_id, "request closed");
        Ok(request)
    }

    pub fn get_request(&self, actor: &Actor, request_id: &str) -> Result<AssetRequest> {
        let request = self
            .store
            .request(request_id)?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "request",
                id: request_id.to_string(),
            })?;
        policy::ensure(actor, policy::can_view(actor, &request), "view this request")
            .inspect_err(|e| log_refusal("get_request", e))?;
        Ok(request)
    }

    /// Requests raised by `requester`, oldest first
    pub fn requests_for(&self, actor: &Actor, requester: &str) -> Result<Vec<AssetRequest>> {
        policy::ensure(
            actor,
            actor.is_active() && (actor.id == requester || actor.is_admin()),
            "list these requests",
        )?;
        let mut requests: Vec<AssetRequest> = self
            .store
            .requests()?
            .into_iter()
            .filter(|r| r.requester == requester)
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    /// Requests waiting on `actor`'s decision; empty for inactive actors
    pub fn pending_approvals(&self, actor: &Actor) -> Result<Vec<AssetRequest>> {
        Ok(self
            .store
            .requests()?
            .into_iter()
            .filter(|r| policy::can_decide(actor, r))
            .collect())
    }
}

fn ensure_fulfiller(actor: &Actor) -> Result<()> {
    policy::ensure(actor, actor.is_active() && actor.is_admin(), "fulfill requests")
}

// items naming a specific asset carry that asset's category
fn snapshot_category(tx: &Tx<'_>, item: ItemDraft) -> TxResult<ItemDraft> {
    let Some(tag) = item.asset_tag().filter(|t| !t.is_empty()).map(str::to_string) else {
        return Ok(item);
    };
    let asset = tx.require_asset(&tag)?;
    Ok(item.set_category(&asset.category))
}

fn log_refusal(operation: &'static str, err: &WorkflowError) {
    match err {
        WorkflowError::Unauthorized { .. } | WorkflowError::NotCurrentApprover { .. } => {
            warn!(operation, code = err.code(), %err, "operation refused")
        }
        err if err.is_user_correctable() => {
            debug!(operation, code = err.code(), %err, "operation rejected")
        }
        err => error!(operation, code = err.code(), %err, "operation failed"),
    }
}
