use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use odiag::{AsyncExplorer, ExploreOptions, PendingOps, SharedReferences};
use odiag_remote::{ManualAsyncRemote, MockAsyncRemote, MockRemote, ObjectId};
use proptest::prelude::*;
use proptest::sample::Index;
use tokio_util::sync::CancellationToken;

use crate::fixtures::*;

type Edges = Vec<Vec<Option<usize>>>;

/// Up to seven nodes with up to three reference fields each; cycles and
/// shared targets are common.
fn graph() -> impl Strategy<Value = Edges> {
    (1usize..8).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(prop::option::of(0..n), 0..4), n)
    })
}

/// Ids within `depth` field hops of the frame roots of [`graph_heap`].
fn within(edges: &Edges, depth: usize) -> BTreeSet<ObjectId> {
    let mut hops = BTreeMap::new();
    let mut queue = VecDeque::new();
    for root in [0, edges.len() - 1] {
        if hops.insert(root, 0).is_none() {
            queue.push_back(root);
        }
    }
    while let Some(index) = queue.pop_front() {
        let next = hops[&index] + 1;
        if next > depth {
            continue;
        }
        for target in edges[index].iter().flatten() {
            if !hops.contains_key(target) {
                hops.insert(*target, next);
                queue.push_back(*target);
            }
        }
    }
    hops.keys().map(|index| *index as ObjectId + 1).collect()
}

fn root_ids(edges: &Edges) -> BTreeSet<ObjectId> {
    BTreeSet::from([1, edges.len() as ObjectId])
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn sync_exploration_emits_each_reachable_object_once(edges in graph()) {
        let first = explore_sync(graph_heap(&edges), ExploreOptions::default());
        let second = explore_sync(graph_heap(&edges), ExploreOptions::default());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.object_ids(), reachable(&edges));

        // Without shared links the diagram is a forest rooted at `this`.
        let mut incoming = BTreeMap::<ObjectId, usize>::new();
        for link in first.links() {
            prop_assert!(first.contains_object(link.from));
            prop_assert!(first.contains_object(link.to));
            *incoming.entry(link.to).or_default() += 1;
        }
        prop_assert!(incoming.values().all(|count| *count == 1));
        prop_assert!(!incoming.contains_key(&1));
        prop_assert_eq!(first.primitive_root_values().len(), 1);
    }

    #[test]
    fn linking_existing_nodes_never_adds_objects(edges in graph()) {
        let options = ExploreOptions {
            shared_references: SharedReferences::LinkExisting,
            ..ExploreOptions::default()
        };
        let dropped = explore_sync(graph_heap(&edges), ExploreOptions::default());
        let linked = explore_sync(graph_heap(&edges), options);

        prop_assert_eq!(dropped.objects(), linked.objects());
        prop_assert!(dropped.links().is_subset(linked.links()));
        let edge_count: BTreeSet<_> = edges
            .iter()
            .enumerate()
            .filter(|(index, _)| linked.contains_object(*index as ObjectId + 1))
            .flat_map(|(index, targets)| {
                targets
                    .iter()
                    .enumerate()
                    .filter_map(move |(slot, target)| target.map(|t| (index, slot, t)))
            })
            .collect();
        prop_assert_eq!(linked.links().len(), edge_count.len());
    }

    #[test]
    fn async_exploration_respects_the_depth_budget(edges in graph(), depth in 0u32..4) {
        let heap = graph_heap(&edges);
        let roots = capture(&mut MockRemote::new(heap.clone()));
        let options = ExploreOptions {
            loading_depth: depth,
            ..ExploreOptions::default()
        };
        let remote = Arc::new(MockAsyncRemote::new(heap));

        let diagram = runtime()
            .block_on(
                AsyncExplorer::new(remote, options)
                    .start(roots, CancellationToken::new())
                    .wait(),
            )
            .unwrap();

        prop_assert_eq!(diagram.object_ids(), within(&edges, depth as usize));
        let hops = hops_from(&diagram, &root_ids(&edges));
        prop_assert!(hops.values().all(|hop| *hop <= depth as usize));
    }

    #[test]
    fn async_completion_waits_for_every_request(
        edges in graph(),
        picks in prop::collection::vec(any::<Index>(), 1..16),
    ) {
        let heap = graph_heap(&edges);
        let roots = capture(&mut MockRemote::new(heap.clone()));
        let options = ExploreOptions {
            loading_depth: 3,
            ..ExploreOptions::default()
        };
        let remote = Arc::new(ManualAsyncRemote::new(heap));
        let snapshot = AsyncExplorer::new(remote.clone(), options)
            .start(roots, CancellationToken::new());

        let mut queue = Vec::new();
        let mut step = 0;
        loop {
            queue.extend(remote.take_pending());
            if queue.is_empty() {
                break;
            }
            prop_assert!(!snapshot.is_complete());
            let pick = picks[step % picks.len()].index(queue.len());
            queue.swap_remove(pick).deliver_in_batches(1 + step % 2);
            step += 1;
        }

        let stats = snapshot.stats();
        prop_assert!(stats.completed);
        prop_assert_eq!(stats.outstanding, 0);
        prop_assert_eq!(stats.increments, stats.decrements);
        prop_assert_eq!(stats.increments, remote.requests() as u64 + 1);

        let diagram = runtime().block_on(snapshot.wait()).unwrap();
        prop_assert_eq!(diagram.object_ids(), within(&edges, 3));
    }

    #[test]
    fn pending_ops_fire_once_in_any_release_order(
        parents in prop::collection::vec(any::<Index>(), 0..24),
        order in Just((0..25usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        let ops = PendingOps::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let mut tokens = vec![Some(ops.begin())];
        for (offset, parent) in parents.iter().enumerate() {
            let parent = parent.index(offset + 1);
            let child = tokens[parent].as_ref().map(|token| token.child());
            tokens.push(child);
        }

        let live: Vec<_> = order.into_iter().filter(|index| *index < tokens.len()).collect();
        for (released, index) in live.iter().enumerate() {
            prop_assert_eq!(fired.load(Ordering::SeqCst), 0);
            if let Some(token) = tokens[*index].take() {
                token.complete();
            }
            let expected = usize::from(released + 1 == live.len());
            prop_assert_eq!(fired.load(Ordering::SeqCst), expected);
        }
        prop_assert_eq!(ops.stats().increments, tokens.len() as u64);
    }
}
