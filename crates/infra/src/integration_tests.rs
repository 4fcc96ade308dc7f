//! Integration tests for the engines over the in-memory store.
//!
//! Tests: Engine → UnitOfWork → Store → Notifier → Queries
//!
//! Verifies:
//! - Stock never goes negative, including under concurrent issuance
//! - Failed operations leave no partial state behind
//! - The request state machine only moves forward
//! - Notifier failures never affect the mutation

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use storekeep_core::{DomainError, ItemId, MAX_QUANTITY, UserId};
    use storekeep_inventory::{ItemDraft, ItemPatch, IssueStock, NewCategory};
    use storekeep_requests::{
        ApproverSelection, FulfilledLine, NewApprover, NewRequest, NewRequestLine, Request,
        RequestStatus, RequestType, RequesterInfo,
    };

    use crate::catalog::CatalogService;
    use crate::error::{OperationError, StoreError};
    use crate::issuance::IssuanceEngine;
    use crate::notify::{Notifier, NotifyError, Signal};
    use crate::queries::{ItemsOutFilter, QueryService, RequestFilter};
    use crate::store::{InMemoryStore, InventoryStore};
    use crate::workflow::{DecisionInput, WorkflowEngine};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Signal>>,
    }

    impl Recorder {
        fn signals(&self) -> Vec<Signal> {
            self.seen.lock().unwrap().clone()
        }

        fn low_stock_count(&self) -> usize {
            self.signals()
                .iter()
                .filter(|s| matches!(s, Signal::LowStock { .. } | Signal::LowStockSnapshot { .. }))
                .count()
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, signal: &Signal) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(signal.clone());
            Ok(())
        }
    }

    struct AlwaysFails;

    impl Notifier for AlwaysFails {
        fn notify(&self, _signal: &Signal) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("mailer offline".into()))
        }
    }

    struct Harness {
        store: Arc<dyn InventoryStore>,
        catalog: CatalogService,
        issuance: IssuanceEngine,
        workflow: WorkflowEngine,
        queries: QueryService,
        recorder: Arc<Recorder>,
    }

    fn harness() -> Harness {
        let recorder = Arc::new(Recorder::default());
        let mut h = harness_with(recorder.clone());
        h.recorder = recorder;
        h
    }

    fn harness_with(notifier: Arc<dyn Notifier>) -> Harness {
        let store: Arc<dyn InventoryStore> = Arc::new(InMemoryStore::new());
        Harness {
            catalog: CatalogService::new(store.clone(), notifier.clone()),
            issuance: IssuanceEngine::new(store.clone(), notifier.clone()),
            workflow: WorkflowEngine::new(store.clone(), notifier),
            queries: QueryService::new(store.clone()),
            store,
            recorder: Arc::new(Recorder::default()),
        }
    }

    fn draft(name: &str, quantity: i64, threshold: i64) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            category_id: None,
            quantity,
            low_stock_threshold: threshold,
            description: None,
            unit: Some("pcs".to_string()),
            location: None,
        }
    }

    fn issue(person: &str, item_id: ItemId, quantity: i64) -> IssueStock {
        IssueStock {
            person_name: person.to_string(),
            item_id,
            quantity,
        }
    }

    async fn quantity(h: &Harness, id: ItemId) -> i64 {
        h.store.item(id).await.unwrap().unwrap().quantity()
    }

    async fn approvers(h: &Harness, n: usize) -> Vec<UserId> {
        let mut ids = Vec::new();
        for i in 0..n {
            let a = h
                .catalog
                .register_approver(NewApprover {
                    user_id: UserId::new(),
                    name: format!("Approver {i}"),
                    email: None,
                })
                .await
                .unwrap();
            ids.push(a.user_id);
        }
        ids
    }

    fn new_request(request_type: RequestType, lines: &[(ItemId, i64)]) -> NewRequest {
        NewRequest {
            request_type,
            requester: RequesterInfo {
                requester_name: "Dana".into(),
                team: Some("Maintenance".into()),
                purpose: Some("Pump overhaul".into()),
                contact: None,
            },
            lines: lines
                .iter()
                .map(|(item_id, quantity)| NewRequestLine {
                    item_id: *item_id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    fn fulfil(request: &Request, quantities: &[i64]) -> Vec<FulfilledLine> {
        request
            .lines
            .iter()
            .zip(quantities)
            .map(|(line, q)| FulfilledLine {
                request_item_id: line.id,
                quantity: *q,
            })
            .collect()
    }

    #[tokio::test]
    async fn alice_then_bob_scenario() {
        let h = harness();
        let x = h.catalog.create_item(draft("Cable ties", 10, 5)).await.unwrap();
        assert_eq!(h.recorder.low_stock_count(), 0);

        let record = h.issuance.issue(UserId::new(), issue("Alice", x.id, 6)).await.unwrap();
        assert_eq!(record.quantity, 6);
        assert_eq!(quantity(&h, x.id).await, 4);
        assert_eq!(h.recorder.low_stock_count(), 1);

        let err = h.issuance.issue(UserId::new(), issue("Bob", x.id, 10)).await.unwrap_err();
        assert!(err.to_string().contains("only 4 available"), "{err}");
        assert!(matches!(
            err,
            OperationError::Domain(DomainError::InsufficientStock {
                requested: 10,
                available: 4,
                ..
            })
        ));
        assert_eq!(quantity(&h, x.id).await, 4);
    }

    #[tokio::test]
    async fn failed_issue_changes_nothing() {
        let h = harness();
        let x = h.catalog.create_item(draft("Gloves", 3, 0)).await.unwrap();

        assert!(h.issuance.issue(UserId::new(), issue("Eve", x.id, 4)).await.is_err());
        assert!(h.issuance.issue(UserId::new(), issue("Eve", x.id, 0)).await.is_err());
        assert!(h.issuance.issue(UserId::new(), issue(" ", x.id, 1)).await.is_err());

        assert_eq!(quantity(&h, x.id).await, 3);
        assert!(h.store.issuances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn issuing_unknown_item_is_not_found() {
        let h = harness();
        let err = h.issuance.issue(UserId::new(), issue("Eve", ItemId::new(), 1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_issues_never_oversell() {
        let h = harness();
        let x = h.catalog.create_item(draft("Helmet", 5, 0)).await.unwrap();
        let item_id = x.id;

        let a = h.issuance.clone();
        let b = h.issuance.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.issue(UserId::new(), issue("A", item_id, 5)).await }),
            tokio::spawn(async move { b.issue(UserId::new(), issue("B", item_id, 5)).await }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_insufficient_stock()))
            .count();
        assert_eq!((ok, short), (1, 1));
        assert_eq!(quantity(&h, x.id).await, 0);
        assert_eq!(h.store.issuances().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_small_issues_drain_exactly() {
        let h = harness();
        let x = h.catalog.create_item(draft("Bolts", 10, 0)).await.unwrap();
        let item_id = x.id;

        let mut tasks = Vec::new();
        for i in 0..25 {
            let engine = h.issuance.clone();
            tasks.push(tokio::spawn(async move {
                engine.issue(UserId::new(), issue(&format!("p{i}"), item_id, 1)).await
            }));
        }
        let mut ok = 0;
        for t in tasks {
            if t.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 10);
        assert_eq!(quantity(&h, x.id).await, 0);
    }

    #[tokio::test]
    async fn request_scenario_partial_fulfilment() {
        let h = harness();
        let x = h.catalog.create_item(draft("Filters", 10, 1)).await.unwrap();
        let assigned = approvers(&h, 2).await;
        let actor = UserId::new();

        let req = h
            .workflow
            .create_request(
                actor,
                new_request(RequestType::MaterialRequest, &[(x.id, 3)]),
                ApproverSelection::Explicit(assigned.clone()),
            )
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(quantity(&h, x.id).await, 10);

        let req = h
            .workflow
            .approve(req.id, assigned[1], DecisionInput::default())
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Approved);

        let req = h
            .workflow
            .finalize(req.id, actor, fulfil(&req, &[2]), "Store keeper".into())
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Completed);
        assert_eq!(req.lines[0].quantity_received, Some(2));
        assert_eq!(quantity(&h, x.id).await, 8);

        let stored = h.store.request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(stored.lines[0].quantity_received, Some(2));
        assert_eq!(stored.released_by.as_deref(), Some("Store keeper"));
        assert_eq!(stored.approvals.len(), 1);
    }

    #[tokio::test]
    async fn decisions_follow_the_state_machine() {
        let h = harness();
        let x = h.catalog.create_item(draft("Tape", 10, 0)).await.unwrap();
        let assigned = approvers(&h, 1).await;

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();

        let err = h
            .workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[1]), "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidState(_))));

        let err = h
            .workflow
            .approve(req.id, UserId::new(), DecisionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::Forbidden(_))));

        let err = h
            .workflow
            .approve(storekeep_core::RequestId::new(), assigned[0], DecisionInput::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        h.workflow
            .reject(
                req.id,
                assigned[0],
                DecisionInput {
                    comment: Some("not budgeted".into()),
                    signature: None,
                },
            )
            .await
            .unwrap();

        let err = h
            .workflow
            .approve(req.id, assigned[0], DecisionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidState(_))));

        let err = h
            .workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[1]), "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidState(_))));

        let stored = h.store.request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.approvals.len(), 1);
        assert_eq!(quantity(&h, x.id).await, 10);
    }

    #[tokio::test]
    async fn short_line_rolls_back_whole_finalize() {
        let h = harness();
        let plenty = h.catalog.create_item(draft("Screws", 50, 0)).await.unwrap();
        let scarce = h.catalog.create_item(draft("Valves", 1, 0)).await.unwrap();
        let assigned = approvers(&h, 1).await;

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(plenty.id, 10), (scarce.id, 3)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        let req = h
            .workflow
            .approve(req.id, assigned[0], DecisionInput::default())
            .await
            .unwrap();

        let err = h
            .workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[10, 3]), "Store".into())
            .await
            .unwrap_err();
        assert!(err.is_insufficient_stock());

        assert_eq!(quantity(&h, plenty.id).await, 50);
        assert_eq!(quantity(&h, scarce.id).await, 1);
        let stored = h.store.request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.lines[0].quantity_received, None);

        // A smaller fulfilment goes through; unlisted lines record zero.
        let done = h
            .workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[10]), "Store".into())
            .await
            .unwrap();
        assert_eq!(done.lines[1].quantity_received, Some(0));
        assert_eq!(quantity(&h, plenty.id).await, 40);
        assert_eq!(quantity(&h, scarce.id).await, 1);
    }

    #[tokio::test]
    async fn return_finalize_raises_stock() {
        let h = harness();
        let x = h.catalog.create_item(draft("Drill", 2, 3)).await.unwrap();
        let assigned = approvers(&h, 1).await;

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::ItemReturn, &[(x.id, 4), (x.id, 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        let req = h
            .workflow
            .approve(req.id, assigned[0], DecisionInput::default())
            .await
            .unwrap();
        let req = h
            .workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[4, 1]), "Store".into())
            .await
            .unwrap();

        assert_eq!(quantity(&h, x.id).await, 7);
        assert_eq!(req.lines[0].quantity_returned, Some(4));
        assert_eq!(req.lines[1].quantity_returned, Some(1));
    }

    #[tokio::test]
    async fn finalize_emits_low_stock_snapshot() {
        let h = harness();
        let x = h.catalog.create_item(draft("Fuses", 6, 5)).await.unwrap();
        let already_low = h.catalog.create_item(draft("Lamps", 0, 2)).await.unwrap();
        let assigned = approvers(&h, 1).await;

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 2)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        let req = h
            .workflow
            .approve(req.id, assigned[0], DecisionInput::default())
            .await
            .unwrap();
        h.workflow
            .finalize(req.id, UserId::new(), fulfil(&req, &[2]), "Store".into())
            .await
            .unwrap();

        let snapshot = h
            .recorder
            .signals()
            .into_iter()
            .find_map(|s| match s {
                Signal::LowStockSnapshot { alerts, .. } => Some(alerts),
                _ => None,
            })
            .expect("snapshot emitted");
        let ids: Vec<ItemId> = snapshot.iter().map(|a| a.item_id).collect();
        assert!(ids.contains(&x.id));
        assert!(ids.contains(&already_low.id));
    }

    #[tokio::test]
    async fn create_request_validates_before_persisting() {
        let h = harness();
        let x = h.catalog.create_item(draft("Paint", 5, 0)).await.unwrap();

        // No approvers registered yet.
        let err = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));

        approvers(&h, 1).await;
        let err = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(ItemId::new(), 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));

        let err = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));

        assert!(h.store.requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_approver_is_not_resolved() {
        let h = harness();
        let x = h.catalog.create_item(draft("Rope", 5, 0)).await.unwrap();
        let ids = approvers(&h, 2).await;
        h.catalog.deactivate_approver(ids[0]).await.unwrap();

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        assert_eq!(req.assigned_approvers, vec![ids[1]]);

        let err = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 1)]),
                ApproverSelection::Explicit(vec![ids[0]]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn referenced_item_cannot_be_deleted() {
        let h = harness();
        let used = h.catalog.create_item(draft("Used", 5, 0)).await.unwrap();
        let unused = h.catalog.create_item(draft("Unused", 5, 0)).await.unwrap();
        h.issuance.issue(UserId::new(), issue("Sam", used.id, 1)).await.unwrap();

        let err = h.catalog.delete_item(used.id).await.unwrap_err();
        assert!(matches!(err, OperationError::Store(StoreError::Conflict(_))));
        assert!(h.store.item(used.id).await.unwrap().is_some());

        h.catalog.delete_item(unused.id).await.unwrap();
        assert!(h.store.item(unused.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_category_detaches_its_items() {
        let h = harness();
        let cat = h
            .catalog
            .create_category(NewCategory {
                name: "Electrical".into(),
                description: None,
            })
            .await
            .unwrap();

        let dup = h
            .catalog
            .create_category(NewCategory {
                name: "electrical".into(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, OperationError::Store(StoreError::Conflict(_))));

        let mut d = draft("Breaker", 4, 0);
        d.category_id = Some(cat.id);
        let item = h.catalog.create_item(d).await.unwrap();

        let views = h.queries.list_items().await.unwrap();
        assert_eq!(views[0].category_name.as_deref(), Some("Electrical"));

        assert_eq!(h.catalog.delete_category(cat.id).await.unwrap(), 1);
        let stored = h.store.item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.category_id, None);
        assert_eq!(stored.quantity(), 4);
        assert!(h.store.categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn item_with_missing_category_is_refused() {
        let h = harness();
        let mut d = draft("Ghost", 1, 0);
        d.category_id = Some(storekeep_core::CategoryId::new());
        let err = h.catalog.create_item(d).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(h.store.items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn threshold_update_and_adjustment() {
        let h = harness();
        let x = h.catalog.create_item(draft("Oil", 8, 2)).await.unwrap();

        let updated = h
            .catalog
            .update_item(
                x.id,
                ItemPatch {
                    low_stock_threshold: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_low());
        assert_eq!(h.recorder.low_stock_count(), 1);

        let restocked = h.catalog.adjust_stock(x.id, 12).await.unwrap();
        assert_eq!(restocked.quantity(), 20);

        let err = h.catalog.adjust_stock(x.id, -21).await.unwrap_err();
        assert!(err.is_insufficient_stock());
        assert!(h.catalog.adjust_stock(x.id, 0).await.is_err());
        assert_eq!(quantity(&h, x.id).await, 20);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_undo_the_issue() {
        let h = harness_with(Arc::new(AlwaysFails));
        let x = h.catalog.create_item(draft("Masks", 3, 5)).await.unwrap();

        h.issuance.issue(UserId::new(), issue("Kim", x.id, 2)).await.unwrap();
        assert_eq!(quantity(&h, x.id).await, 1);
        assert_eq!(h.store.issuances().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reports_join_names_and_sort_newest_first() {
        let h = harness();
        let x = h.catalog.create_item(draft("Cable", 20, 2)).await.unwrap();
        let y = h.catalog.create_item(draft("Switch", 20, 2)).await.unwrap();
        h.issuance.issue(UserId::new(), issue("First", x.id, 1)).await.unwrap();
        h.issuance.issue(UserId::new(), issue("Second", y.id, 2)).await.unwrap();

        let rows = h.queries.list_items_out(&ItemsOutFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].person_name, "Second");
        assert_eq!(rows[0].item_name, "Switch");

        let only_x = h
            .queries
            .list_items_out(&ItemsOutFilter {
                item_id: Some(x.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_x.len(), 1);

        let stats = h.queries.dashboard().await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.total_units, 37);
        assert_eq!(stats.issuances_total, 2);
        assert_eq!(stats.units_issued_today, 3);
        assert_eq!(stats.recent_issuances.len(), 2);
    }

    #[tokio::test]
    async fn request_listing_and_details() {
        let h = harness();
        let x = h.catalog.create_item(draft("Pipe", 9, 0)).await.unwrap();
        let assigned = approvers(&h, 2).await;

        let first = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::MaterialRequest, &[(x.id, 2), (x.id, 3)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        h.workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::ItemReturn, &[(x.id, 1)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        h.workflow
            .approve(first.id, assigned[0], DecisionInput::default())
            .await
            .unwrap();

        let all = h.queries.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let approved = h
            .queries
            .list_requests(&RequestFilter {
                status: Some(RequestStatus::Approved),
                request_type: None,
            })
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].item_count, 2);
        assert_eq!(approved[0].total_quantity, 5);

        let details = h.queries.request_details(first.id).await.unwrap().unwrap();
        assert_eq!(details.lines[0].item_name.as_deref(), Some("Pipe"));
        assert_eq!(details.approvers.len(), 2);
        assert!(details.approvers.iter().any(|a| a.decision.is_some()));

        assert!(h
            .queries
            .request_details(storekeep_core::RequestId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn oversized_return_is_refused_and_moves_nothing() {
        let h = harness();
        let x = h.catalog.create_item(draft("Ladder", 10, 0)).await.unwrap();
        let assigned = approvers(&h, 1).await;

        let err = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::ItemReturn, &[(x.id, i64::MAX), (x.id, i64::MAX)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));
        assert!(h.store.requests().await.unwrap().is_empty());

        let req = h
            .workflow
            .create_request(
                UserId::new(),
                new_request(RequestType::ItemReturn, &[(x.id, MAX_QUANTITY), (x.id, MAX_QUANTITY)]),
                ApproverSelection::AllCurrent,
            )
            .await
            .unwrap();
        let req = h
            .workflow
            .approve(req.id, assigned[0], DecisionInput::default())
            .await
            .unwrap();

        let err = h
            .workflow
            .finalize(
                req.id,
                UserId::new(),
                fulfil(&req, &[MAX_QUANTITY, MAX_QUANTITY]),
                "Store".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));
        assert_eq!(quantity(&h, x.id).await, 10);
        let stored = h.store.request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);

        let listed = h.queries.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(listed[0].total_quantity, 2 * MAX_QUANTITY);
    }

    #[tokio::test]
    async fn extreme_adjustments_are_invalid_input() {
        let h = harness();
        let x = h.catalog.create_item(draft("Rope", 3, 0)).await.unwrap();

        for delta in [i64::MIN, i64::MAX, MAX_QUANTITY + 1, -(MAX_QUANTITY + 1)] {
            let err = h.catalog.adjust_stock(x.id, delta).await.unwrap_err();
            assert!(
                matches!(err, OperationError::Domain(DomainError::InvalidInput(_))),
                "{delta}: {err}"
            );
        }
        let err = h.catalog.adjust_stock(x.id, MAX_QUANTITY).await.unwrap_err();
        assert!(matches!(err, OperationError::Domain(DomainError::InvalidInput(_))));
        assert_eq!(quantity(&h, x.id).await, 3);
    }

    #[tokio::test]
    async fn dashboard_totals_at_the_quantity_cap() {
        let h = harness();
        for name in ["Sand", "Gravel"] {
            h.catalog.create_item(draft(name, MAX_QUANTITY, 0)).await.unwrap();
        }
        let stats = h.queries.dashboard().await.unwrap();
        assert_eq!(stats.total_units, 2 * MAX_QUANTITY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_decisions_record_exactly_one() {
        let h = harness();
        let x = h.catalog.create_item(draft("Hoses", 10, 0)).await.unwrap();
        let assigned = approvers(&h, 2).await;

        for _ in 0..10 {
            let req = h
                .workflow
                .create_request(
                    UserId::new(),
                    new_request(RequestType::MaterialRequest, &[(x.id, 1)]),
                    ApproverSelection::Explicit(assigned.clone()),
                )
                .await
                .unwrap();

            let id = req.id;
            let (approver, rejecter) = (h.workflow.clone(), h.workflow.clone());
            let (a, b) = (assigned[0], assigned[1]);
            let (ra, rb) = tokio::join!(
                tokio::spawn(async move { approver.approve(id, a, DecisionInput::default()).await }),
                tokio::spawn(async move { rejecter.reject(id, b, DecisionInput::default()).await }),
            );
            let (ra, rb) = (ra.unwrap(), rb.unwrap());

            assert_eq!(ra.is_ok() as usize + rb.is_ok() as usize, 1);
            let loser = if ra.is_ok() { &rb } else { &ra };
            assert!(matches!(
                loser,
                Err(OperationError::Domain(DomainError::InvalidState(_)))
            ));

            let stored = h.store.request(id).await.unwrap().unwrap();
            assert_eq!(stored.approvals.len(), 1);
            let expected = if ra.is_ok() {
                RequestStatus::Approved
            } else {
                RequestStatus::Rejected
            };
            assert_eq!(stored.status, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finalize_and_issue_race_without_overselling() {
        let h = harness();
        let assigned = approvers(&h, 1).await;

        for round in 0..10 {
            let x = h
                .catalog
                .create_item(draft(&format!("Pumps {round}"), 5, 0))
                .await
                .unwrap();
            let req = h
                .workflow
                .create_request(
                    UserId::new(),
                    new_request(RequestType::MaterialRequest, &[(x.id, 4)]),
                    ApproverSelection::AllCurrent,
                )
                .await
                .unwrap();
            let req = h
                .workflow
                .approve(req.id, assigned[0], DecisionInput::default())
                .await
                .unwrap();

            let (id, item_id) = (req.id, x.id);
            let workflow = h.workflow.clone();
            let issuance = h.issuance.clone();
            let lines = fulfil(&req, &[4]);
            let (rf, ri) = tokio::join!(
                tokio::spawn(async move { workflow.finalize(id, UserId::new(), lines, "Store".into()).await }),
                tokio::spawn(async move { issuance.issue(UserId::new(), issue("Walk-in", item_id, 3)).await }),
            );
            let (rf, ri) = (rf.unwrap(), ri.unwrap());

            assert_eq!(rf.is_ok() as usize + ri.is_ok() as usize, 1);
            let left = quantity(&h, x.id).await;
            assert!(left >= 0);
            if rf.is_ok() {
                assert!(matches!(&ri, Err(e) if e.is_insufficient_stock()));
                assert_eq!(left, 1);
            } else {
                assert!(matches!(&rf, Err(e) if e.is_insufficient_stock()));
                assert_eq!(left, 2);
                let stored = h.store.request(id).await.unwrap().unwrap();
                assert_eq!(stored.status, RequestStatus::Approved);
            }
        }
    }
}
