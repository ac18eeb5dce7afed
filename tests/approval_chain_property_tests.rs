//! Property-based tests for approval chain progression
//!
//! A submitted request is driven by arbitrary decisions from arbitrary users,
//! in and out of turn. Whatever the order, the chain must never have more than
//! one row awaiting a decision, and a request that has left PENDING_APPROVAL
//! must refuse every further decision.

use proptest::prelude::*;
use asset_lifecycle::{
    approval::{self, ApprovalChainResolver, DecisionOutcome, StaticDirectory},
    config::ApprovalConfig,
    request::{AssetRequest, AssetRequestApproval, ItemDraft},
    status::{ApprovalStatus, Decision, RequestStatus, RequestType},
};

// These property tests cover:
//
// 1. Single pending row - at most one approval row is PENDING at any time
// 2. Order - approved rows always precede the pending row
// 3. Terminal stability - decided requests reject every later decision
// 4. Rejection freezes the tail - rows after a rejection stay QUEUED
// 5. Resolver bounds - chains respect max depth and never include the requester
//

fn submitted_request(chain_len: usize) -> AssetRequest {
    let mut request =
        AssetRequest::new("req_1prop".into(), "alice".into(), RequestType::New, None);
    request
        .add_item("alice", ItemDraft::new().set_category("laptop"))
        .expect("draft accepts items");
    let chain = (0..chain_len)
        .map(|i| AssetRequestApproval::new(i as u32, format!("mgr{i}")))
        .collect();
    request.submit("alice", chain).expect("submit");
    request
}

/// Strategy for one decision: who decides, what, and with what remarks
fn decision_strategy() -> impl Strategy<Value = (usize, Decision, Option<String>)> {
    (
        0usize..6,
        prop_oneof![Just(Decision::Approve), Just(Decision::Reject)],
        prop::option::of("[a-z ]{0,8}"),
    )
}

proptest! {
    #[test]
    fn at_most_one_pending_row(
        chain_len in 1usize..5,
        decisions in prop::collection::vec(decision_strategy(), 0..20),
    ) {
        let mut request = submitted_request(chain_len);
        prop_assert_eq!(request.pending_count(), 1);

        for (who, decision, remarks) in decisions {
            let approver = format!("mgr{who}");
            let before = request.clone();
            let result = approval::decide(&mut request, &approver, decision, remarks);

            if result.is_err() {
                prop_assert_eq!(&request, &before);
            }
            prop_assert!(request.pending_count() <= 1);
            prop_assert_eq!(
                request.pending_count() == 1,
                request.status() == RequestStatus::PendingApproval
            );
            prop_assert!(request.approval_chain_consistent());

            // approved rows form a prefix of the chain
            let approved = request
                .approvals()
                .iter()
                .take_while(|a| a.status == ApprovalStatus::Approved)
                .count();
            prop_assert!(request.approvals()[approved..]
                .iter()
                .all(|a| a.status != ApprovalStatus::Approved));
        }
    }

    #[test]
    fn decided_requests_stay_decided(
        chain_len in 1usize..5,
        reject_at in 0usize..5,
        later in prop::collection::vec(decision_strategy(), 1..10),
    ) {
        let mut request = submitted_request(chain_len);
        let reject_at = reject_at.min(chain_len);

        for step in 0..chain_len {
            let approver = format!("mgr{step}");
            if step == reject_at {
                let outcome = approval::decide(
                    &mut request,
                    &approver,
                    Decision::Reject,
                    Some("no budget".into()),
                );
                prop_assert_eq!(outcome.ok(), Some(DecisionOutcome::Rejected));
                break;
            }
            approval::decide(&mut request, &approver, Decision::Approve, None)
                .expect("current approver approves");
        }

        let expected = if reject_at < chain_len {
            RequestStatus::Rejected
        } else {
            RequestStatus::Approved
        };
        prop_assert_eq!(request.status(), expected);
        if expected == RequestStatus::Rejected {
            prop_assert!(request.approvals()[reject_at + 1..]
                .iter()
                .all(|a| a.status == ApprovalStatus::Queued));
        }

        let settled = request.clone();
        for (who, decision, remarks) in later {
            let approver = format!("mgr{who}");
            prop_assert!(approval::decide(&mut request, &approver, decision, remarks).is_err());
        }
        prop_assert_eq!(request, settled);
    }

    #[test]
    fn resolved_chain_is_bounded(
        depth in 1usize..4,
        managers in prop::collection::vec("[a-e]", 0..6),
    ) {
        let mut directory = StaticDirectory::new().with_category("laptop", true);
        let mut current = "alice".to_string();
        for manager in &managers {
            directory = directory.with_manager(&current, manager);
            current = manager.clone();
        }
        let config = ApprovalConfig {
            max_chain_depth: depth,
            skip_request_types: vec![],
            fallback_approvers: vec!["it-lead".into()],
        };
        let resolver = ApprovalChainResolver::new(&directory, &config);

        let mut request =
            AssetRequest::new("req_1prop".into(), "alice".into(), RequestType::New, None);
        request
            .add_item("alice", ItemDraft::new().set_category("laptop"))
            .expect("draft accepts items");

        let chain = resolver.resolve(&request).expect("fallback guarantees an approver");
        prop_assert!(!chain.is_empty());
        prop_assert!(chain.len() <= depth);
        prop_assert!(chain.iter().all(|row| row.approver != "alice"));
        prop_assert_eq!(chain[0].status, ApprovalStatus::Pending);
        prop_assert!(chain[1..].iter().all(|row| row.status == ApprovalStatus::Queued));
        for (index, row) in chain.iter().enumerate() {
            prop_assert_eq!(row.sequence as usize, index);
        }
    }
}
