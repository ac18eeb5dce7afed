//! Fulfillment coordinator.
//!
//! Planning is pure and all-or-nothing: every line of the request is turned into
//! lifecycle transitions against a working copy of the assets, and the first
//! failing line fails the whole plan. Nothing is written unless the complete
//! plan succeeds; the service then commits it in a single transaction.
use crate::asset::Asset;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::lifecycle::{self, AssetAction, Transition, TransitionContext};
use crate::request::{AssetRequest, AssetRequestItem};
use crate::status::{RequestStatus, RequestType};
use std::collections::BTreeMap;

/// Asset tags chosen for each request line, keyed by line number
pub type Allocation = BTreeMap<u32, Vec<String>>;

#[derive(Debug, Clone)]
pub enum FulfillmentKind {
    /// Hand out stock for a `New` request
    New { allocation: Allocation },
    /// Take back the referenced assets, optionally into a location
    Return { location: Option<String> },
    /// Move the referenced assets to each line's transfer target
    Transfer,
    /// Send the referenced assets for repair
    Repair,
}

impl FulfillmentKind {
    pub fn request_type(&self) -> RequestType {
        match self {
            FulfillmentKind::New { .. } => RequestType::New,
            FulfillmentKind::Return { .. } => RequestType::Return,
            FulfillmentKind::Transfer => RequestType::Transfer,
            FulfillmentKind::Repair => RequestType::Repair,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub line: u32,
    pub transition: Transition,
}

#[derive(Debug, Clone)]
pub struct FulfillmentPlan {
    pub moves: Vec<PlannedMove>,
    pub allocations: Vec<(u32, Vec<String>)>,
}

/// Every asset tag the plan will read
pub fn tags_needed(request: &AssetRequest, kind: &FulfillmentKind) -> Vec<String> {
    match kind {
        FulfillmentKind::New { allocation } => {
            let mut tags: Vec<String> = allocation.values().flatten().cloned().collect();
            tags.sort();
            tags.dedup();
            tags
        }
        _ => request
            .referenced_assets()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// Checks the request can be fulfilled this way before any asset is looked at
pub fn check_request(request: &AssetRequest, kind: &FulfillmentKind) -> Result<()> {
    request.ensure_status(RequestStatus::can_fulfill, "fulfill")?;
    if request.request_type != kind.request_type() {
        return Err(ValidationError::RequestTypeMismatch {
            expected: kind.request_type(),
            actual: request.request_type,
        }
        .into());
    }
    if let FulfillmentKind::New { allocation } = kind {
        if let Some(line) = allocation.keys().find(|line| request.item(**line).is_none()) {
            return Err(ValidationError::UnknownLine(*line).into());
        }
    }
    Ok(())
}

/// Plans the transitions for every line of `request`.
///
/// `assets` holds the current state of every tag from [`tags_needed`] that
/// exists; a missing tag fails its line with `NotFound`.
pub fn plan(
    request: &AssetRequest,
    kind: &FulfillmentKind,
    assets: &BTreeMap<String, Asset>,
    ctx: &TransitionContext,
) -> Result<FulfillmentPlan> {
    check_request(request, kind)?;

    let ctx = ctx.clone().for_request(&request.request_number);
    let mut working = assets.clone();
    let mut moves = vec![];
    let mut allocations = vec![];

    for item in request.items() {
        let planned = plan_line(request, item, kind, &mut working, &ctx).map_err(|reason| {
            WorkflowError::FulfillmentFailed {
                request_id: request.request_number.clone(),
                line: item.line,
                reason: Box::new(reason),
            }
        })?;
        allocations.push((
            item.line,
            planned
                .iter()
                .map(|t| t.asset.tag.clone())
                .collect::<Vec<_>>(),
        ));
        moves.extend(planned.into_iter().map(|transition| PlannedMove {
            line: item.line,
            transition,
        }));
    }

    Ok(FulfillmentPlan { moves, allocations })
}

fn plan_line(
    request: &AssetRequest,
    item: &AssetRequestItem,
    kind: &FulfillmentKind,
    working: &mut BTreeMap<String, Asset>,
    ctx: &TransitionContext,
) -> Result<Vec<Transition>> {
    let line = item.line;

    let tags: Vec<String> = match kind {
        FulfillmentKind::New { allocation } => {
            let tags = allocation.get(&line).cloned().unwrap_or_default();
            if tags.len() != item.quantity as usize {
                return Err(ValidationError::AllocationMismatch {
                    line,
                    expected: item.quantity,
                    provided: tags.len(),
                }
                .into());
            }
            tags
        }
        _ => match &item.asset_tag {
            Some(tag) => vec![tag.clone()],
            None => return Err(ValidationError::MissingAsset { line }.into()),
        },
    };

    let mut transitions = vec![];
    for tag in tags {
        let asset = working.get(&tag).ok_or_else(|| WorkflowError::NotFound {
            kind: "asset",
            id: tag.clone(),
        })?;

        let action = match kind {
            FulfillmentKind::New { .. } => {
                if let Some(expected) = &item.asset_tag {
                    if expected != &tag {
                        return Err(ValidationError::AssetMismatch {
                            line,
                            expected: expected.clone(),
                            provided: tag,
                        }
                        .into());
                    }
                }
                if let Some(category) = &item.category {
                    if category != &asset.category {
                        return Err(ValidationError::CategoryMismatch {
                            line,
                            asset_tag: tag,
                            expected: category.clone(),
                            actual: asset.category.clone(),
                        }
                        .into());
                    }
                }
                AssetAction::Assign {
                    user: request.requester.clone(),
                }
            }
            FulfillmentKind::Return { location } => {
                ensure_held_by_requester(request, asset, line)?;
                AssetAction::Return {
                    location: location.clone(),
                }
            }
            FulfillmentKind::Transfer => {
                ensure_held_by_requester(request, asset, line)?;
                let user = item
                    .transfer_to
                    .clone()
                    .ok_or(ValidationError::MissingTransferTarget { line })?;
                AssetAction::Transfer { user }
            }
            FulfillmentKind::Repair => {
                ensure_held_by_requester(request, asset, line)?;
                AssetAction::Repair
            }
        };

        let transition = lifecycle::apply(asset, &action, ctx)?;
        working.insert(tag, transition.asset.clone());
        transitions.push(transition);
    }
    Ok(transitions)
}

fn ensure_held_by_requester(request: &AssetRequest, asset: &Asset, line: u32) -> Result<()> {
    // an asset that is not assigned at all is a lifecycle problem, not a holder problem
    if asset.current_holder().is_some()
        && asset.current_holder() != Some(request.requester.as_str())
    {
        return Err(ValidationError::NotHeldByRequester {
            line,
            asset_tag: asset.tag.clone(),
        }
        .into());
    }
    Ok(())
}
