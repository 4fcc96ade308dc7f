use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use storekeep_core::{ItemId, MAX_QUANTITY, UserId};
use storekeep_infra::{
    CatalogService, InMemoryStore, InventoryStore, IssuanceEngine, QueryService, TracingNotifier,
    WorkflowEngine,
};
use storekeep_inventory::{ItemDraft, IssueStock};
use storekeep_requests::{
    ApproverSelection, FulfilledLine, NewApprover, NewRequest, NewRequestLine, RequestType,
    RequesterInfo,
};
use tokio::runtime::Runtime;

struct Fixture {
    catalog: CatalogService,
    issuance: IssuanceEngine,
    workflow: WorkflowEngine,
    queries: QueryService,
}

fn fixture() -> Fixture {
    let store: Arc<dyn InventoryStore> = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(TracingNotifier);
    Fixture {
        catalog: CatalogService::new(store.clone(), notifier.clone()),
        issuance: IssuanceEngine::new(store.clone(), notifier.clone()),
        workflow: WorkflowEngine::new(store.clone(), notifier),
        queries: QueryService::new(store),
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap()
}

fn draft(name: String, quantity: i64) -> ItemDraft {
    ItemDraft {
        name,
        category_id: None,
        quantity,
        low_stock_threshold: 0,
        description: None,
        unit: None,
        location: None,
    }
}

async fn seed(f: &Fixture, n: usize, quantity: i64) -> Vec<ItemId> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        ids.push(f.catalog.create_item(draft(format!("item-{i}"), quantity)).await.unwrap().id);
    }
    ids
}

fn bench_issue_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("issue_latency");
    group.sample_size(500);

    group.bench_function("single_item", |b| {
        let f = fixture();
        let ids = rt.block_on(seed(&f, 1, MAX_QUANTITY));
        let actor = UserId::new();
        b.iter(|| {
            rt.block_on(f.issuance.issue(
                actor,
                IssueStock {
                    person_name: "bench".into(),
                    item_id: ids[0],
                    quantity: 1,
                },
            ))
            .unwrap();
        });
    });

    group.bench_function("insufficient_stock_rejected", |b| {
        let f = fixture();
        let ids = rt.block_on(seed(&f, 1, 0));
        let actor = UserId::new();
        b.iter(|| {
            let res = rt.block_on(f.issuance.issue(
                actor,
                IssueStock {
                    person_name: "bench".into(),
                    item_id: ids[0],
                    quantity: 1,
                },
            ));
            black_box(res.is_err());
        });
    });

    group.finish();
}

/// Many tasks issuing against the same row; measures lock contention.
fn bench_contended_issue(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended_issue");

    for tasks in [2usize, 8, 32] {
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            let f = fixture();
            let ids = rt.block_on(seed(&f, 1, MAX_QUANTITY));
            b.iter(|| {
                rt.block_on(async {
                    let mut handles = Vec::with_capacity(tasks);
                    for _ in 0..tasks {
                        let engine = f.issuance.clone();
                        let item_id = ids[0];
                        handles.push(tokio::spawn(async move {
                            engine
                                .issue(
                                    UserId::new(),
                                    IssueStock {
                                        person_name: "bench".into(),
                                        item_id,
                                        quantity: 1,
                                    },
                                )
                                .await
                        }));
                    }
                    for h in handles {
                        h.await.unwrap().unwrap();
                    }
                });
            });
        });
    }

    group.finish();
}

/// Create, approve and finalize a request with N lines.
fn bench_request_lifecycle(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("request_lifecycle");

    for lines in [1usize, 10, 50] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, &lines| {
            let f = fixture();
            let ids = rt.block_on(seed(&f, lines, MAX_QUANTITY));
            let approver = rt
                .block_on(f.catalog.register_approver(NewApprover {
                    user_id: UserId::new(),
                    name: "bench approver".into(),
                    email: None,
                }))
                .unwrap()
                .user_id;

            b.iter(|| {
                rt.block_on(async {
                    let new = NewRequest {
                        request_type: RequestType::MaterialRequest,
                        requester: RequesterInfo {
                            requester_name: "bench".into(),
                            team: None,
                            purpose: None,
                            contact: None,
                        },
                        lines: ids
                            .iter()
                            .map(|id| NewRequestLine {
                                item_id: *id,
                                quantity: 1,
                            })
                            .collect(),
                    };
                    let actor = UserId::new();
                    let req = f
                        .workflow
                        .create_request(actor, new, ApproverSelection::AllCurrent)
                        .await
                        .unwrap();
                    let req = f.workflow.approve(req.id, approver, Default::default()).await.unwrap();
                    let fulfilled = req
                        .lines
                        .iter()
                        .map(|l| FulfilledLine {
                            request_item_id: l.id,
                            quantity: 1,
                        })
                        .collect();
                    black_box(
                        f.workflow
                            .finalize(req.id, actor, fulfilled, "bench".into())
                            .await
                            .unwrap(),
                    );
                });
            });
        });
    }

    group.finish();
}

fn bench_dashboard(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("dashboard");

    for items in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            let f = fixture();
            let ids = rt.block_on(seed(&f, items, 1_000));
            rt.block_on(async {
                for id in ids.iter().take(50) {
                    f.issuance
                        .issue(
                            UserId::new(),
                            IssueStock {
                                person_name: "bench".into(),
                                item_id: *id,
                                quantity: 3,
                            },
                        )
                        .await
                        .unwrap();
                }
            });
            b.iter(|| black_box(rt.block_on(f.queries.dashboard()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_issue_latency,
    bench_contended_issue,
    bench_request_lifecycle,
    bench_dashboard
);
criterion_main!(benches);
