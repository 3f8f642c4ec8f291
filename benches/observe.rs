//! Benchmarks for member path observation.
//!
//! These benchmarks measure the performance of:
//! - Resolving a path of increasing depth for the first time
//! - Re-walking a path after an intermediate change, with and without
//!   `STABLE_PATH`
//! - Fanning a terminal change out to many listeners
//! - Collecting member paths out of an expression tree

use std::{cell::RefCell, hint::black_box, rc::Rc};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use floem_observe::{
    BindingError, CachedResolver, ChangeEvent, ListenerRef, MemberPath, MemberPathCollector,
    MemberRegistry, MemberResolver, Object, ObserverFlags, ObserverListener, PathObserver,
    Property,
    expr::{BinaryToken, Expr},
};

#[derive(Default)]
struct Link {
    next: RefCell<Option<Object>>,
    next_changed: ChangeEvent,
    value: RefCell<i64>,
    value_changed: ChangeEvent,
}

fn resolver() -> Rc<dyn MemberResolver> {
    let mut registry = MemberRegistry::new();
    registry
        .add(
            Property::<Link>::new("Next")
                .get(|l| l.next.borrow().clone())
                .observe(|l| &l.next_changed),
        )
        .add(
            Property::<Link>::new("Value")
                .get(|l| Some(Object::new(*l.value.borrow())))
                .observe(|l| &l.value_changed),
        );
    Rc::new(CachedResolver::new(registry))
}

/// A chain of `depth` links; returns the root and the last link.
fn create_chain(depth: usize) -> (Object, Object) {
    let root = Object::new(Link::default());
    let mut last = root.clone();
    for _ in 0..depth {
        let next = Object::new(Link::default());
        if let Some(link) = last.downcast_ref::<Link>() {
            *link.next.borrow_mut() = Some(next.clone());
        }
        last = next;
    }
    (root, last)
}

/// `Next.Next. ... .Value`
fn create_path(depth: usize) -> MemberPath {
    let mut text = "Next.".repeat(depth);
    text.push_str("Value");
    MemberPath::parse(&text).expect("valid path")
}

struct Sink;

impl ObserverListener for Sink {
    fn on_path_members_changed(&self, observer: &PathObserver) {
        black_box(observer);
    }

    fn on_last_member_changed(&self, observer: &PathObserver) {
        black_box(observer);
    }

    fn on_error(&self, _: &PathObserver, error: &BindingError) {
        black_box(error);
    }
}

fn bench_first_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe_first_resolution");
    let resolver = resolver();

    for depth in [1, 4, 8, 16].iter() {
        let (root, _) = create_chain(*depth);
        let path = create_path(*depth);
        group.bench_with_input(BenchmarkId::new("value", depth), depth, |b, _| {
            b.iter(|| {
                let observer = PathObserver::new(
                    resolver.clone(),
                    &root,
                    path.clone(),
                    ObserverFlags::default(),
                );
                black_box(observer.value(None).ok());
            });
        });
    }

    group.finish();
}

fn bench_intermediate_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe_intermediate_change");
    let resolver = resolver();

    for (name, flags) in [
        ("plain", ObserverFlags::default()),
        ("stable", ObserverFlags::default() | ObserverFlags::STABLE_PATH),
    ] {
        for depth in [4, 16].iter() {
            let (root, _) = create_chain(*depth);
            let observer = PathObserver::new(resolver.clone(), &root, create_path(*depth), flags);
            observer.add_listener(Rc::new(Sink));
            group.bench_with_input(BenchmarkId::new(name, depth), depth, |b, _| {
                b.iter(|| {
                    if let Some(link) = root.downcast_ref::<Link>() {
                        black_box(link.next_changed.raise(Some(&root)));
                    }
                });
            });
        }
    }

    group.finish();
}

fn bench_last_member_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe_last_member_fan_out");
    let resolver = resolver();

    for listeners in [1, 2, 16, 64].iter() {
        let (root, last) = create_chain(4);
        let observer = PathObserver::new(
            resolver.clone(),
            &root,
            create_path(4),
            ObserverFlags::default(),
        );
        for _ in 0..*listeners {
            let listener: ListenerRef = Rc::new(Sink);
            observer.add_listener(listener);
        }
        group.bench_with_input(BenchmarkId::new("raise", listeners), listeners, |b, _| {
            b.iter(|| {
                if let Some(link) = last.downcast_ref::<Link>() {
                    *link.value.borrow_mut() += 1;
                    black_box(link.value_changed.raise(None));
                }
            });
        });
    }

    group.finish();
}

fn bench_collect_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression_collect_paths");

    for terms in [2, 8, 32].iter() {
        let chain = |i: usize| {
            Expr::member(
                Some(Expr::member(Some(Expr::member(None, "Next")), "Next")),
                if i % 2 == 0 { "Value" } else { "Other" },
            )
        };
        let expr = (1..*terms).fold(chain(0), |acc, i| {
            Expr::binary(BinaryToken::Add, acc, chain(i))
        });
        group.bench_with_input(BenchmarkId::new("collect", terms), terms, |b, _| {
            b.iter(|| {
                let mut collector = MemberPathCollector::new();
                black_box(collector.collect(&expr).ok());
                black_box(collector.paths().len());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_first_resolution,
    bench_intermediate_change,
    bench_last_member_fan_out,
    bench_collect_paths,
);
criterion_main!(benches);
