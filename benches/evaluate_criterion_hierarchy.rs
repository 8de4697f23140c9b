use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use treetop_authz::{
    BatchOptions, BatchRequest, Entities, Entity, EntityUid, Expr, HierarchyCache, Policy,
    PolicyEngine, PolicySet, Request, ScopeConstraint, Term, Value,
};

fn node(idx: usize) -> EntityUid {
    EntityUid::new("Node", idx.to_string())
}

/// `depth` diamonds stacked on each other: every node reaches the next one
/// through two parents, so a naive walk visits 2^depth paths.
fn diamond_store(depth: usize) -> Entities {
    let mut entities = Vec::with_capacity(depth * 3 + 1);
    for idx in 0..depth {
        let left = EntityUid::new("Side", format!("l{idx}"));
        let right = EntityUid::new("Side", format!("r{idx}"));
        entities.push(Entity::new(node(idx)).with_parents([left.clone(), right.clone()]));
        entities.push(Entity::new(left).with_parent(node(idx + 1)));
        entities.push(Entity::new(right).with_parent(node(idx + 1)));
    }
    entities.push(Entity::new(node(depth)));
    Entities::from_entities(entities).expect("generated entities are unique")
}

fn benchmark_hierarchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy");
    group.sample_size(40);

    for depth in [10_usize, 50, 100] {
        let store = diamond_store(depth);
        let missing = EntityUid::new("Node", "missing");
        group.bench_with_input(BenchmarkId::new("reachable", depth), &depth, |b, &depth| {
            b.iter(|| {
                let cache = HierarchyCache::new();
                black_box(cache.is_ancestor(&store, black_box(&node(0)), &node(depth)))
            });
        });
        group.bench_with_input(BenchmarkId::new("unreachable", depth), &depth, |b, _| {
            b.iter(|| {
                let cache = HierarchyCache::new();
                black_box(cache.is_ancestor(&store, black_box(&node(0)), &missing))
            });
        });
    }

    group.finish();
}

fn action(idx: usize) -> EntityUid {
    EntityUid::new("Action", format!("a{idx}"))
}

fn grid_engine() -> PolicyEngine {
    let mut policies = PolicySet::new();
    for idx in 0..20 {
        let policy = Policy::permit()
            .with_principal(ScopeConstraint::In(node(idx)))
            .with_action(ScopeConstraint::Eq(action(idx)))
            .when(Expr::less(
                Expr::get_attr(Expr::context(), "level"),
                Expr::val(idx as i64),
            ));
        policies
            .add(format!("p{idx}"), policy)
            .expect("generated ids are unique");
    }
    PolicyEngine::new(policies)
}

fn grid_request() -> BatchRequest {
    BatchRequest::new(
        Term::variable("who"),
        Term::variable("verb"),
        EntityUid::new("Doc", "d"),
        Term::record([("level", Term::variable("level"))]),
    )
    .with_variable("who", (0..20).map(|idx| Value::EntityUid(node(idx))))
    .with_variable("verb", (0..20).map(|idx| Value::EntityUid(action(idx))))
    .with_variable("level", (0..5_i64).map(Value::Long))
}

fn benchmark_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.sample_size(20);

    let engine = grid_engine();
    let store = diamond_store(20);
    let request = grid_request();

    for prune in [true, false] {
        let mut options = BatchOptions::default();
        options.config.prune = prune;
        let name = if prune { "pruned" } else { "unpruned" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut allowed = 0_usize;
                engine
                    .batch_authorize(&store, &request, &options, |result| {
                        allowed += usize::from(result.response.is_allowed());
                    })
                    .expect("benchmark batch is valid");
                black_box(allowed)
            });
        });
    }

    let single = Request::new(node(0), action(19), EntityUid::new("Doc", "d"))
        .with_context(Value::record([("level", Value::Long(1))]))
        .expect("context is a record");
    group.bench_function("single", |b| {
        b.iter(|| {
            engine
                .is_authorized(&store, black_box(&single))
                .expect("benchmark request is valid")
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_hierarchy, benchmark_batch);
criterion_main!(benches);
