use std::collections::BTreeSet;

use odiag::{
    ExploreError, ExploreOptions, Link, NestedContainers, SharedReferences, SyncExplorer,
};
use odiag_remote::{MockField, MockHeap, MockObject, MockRemote, RemoteError, RemoteValue};
use pretty_assertions::assert_eq;

use crate::fixtures::*;

fn self_loop() -> MockHeap {
    let mut heap = MockHeap::new();
    heap.insert(
        1,
        MockObject::plain(
            "com.example.Node",
            vec![MockField::new("next", "com.example.Node", obj(1, "com.example.Node"))],
        ),
    );
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    heap
}

/// `this` holds the same Material through two fields.
fn shared_material() -> MockHeap {
    let mut heap = MockHeap::new();
    heap.insert(
        1,
        MockObject::plain(
            PRODUCT,
            vec![
                MockField::new("primary", MATERIAL, obj(3, MATERIAL)),
                MockField::new("backup", MATERIAL, obj(3, MATERIAL)),
            ],
        ),
    );
    heap.insert(3, material(5));
    heap.insert(5, MockObject::string("steel"));
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    heap
}

#[test]
fn self_reference_terminates_with_one_node() {
    let diagram = explore_sync(self_loop(), ExploreOptions::default());
    assert_eq!(diagram.object_ids(), BTreeSet::from([1]));
    assert!(diagram.links().is_empty());
}

#[test]
fn self_reference_is_drawn_when_linking_existing_nodes() {
    let options = ExploreOptions {
        shared_references: SharedReferences::LinkExisting,
        ..ExploreOptions::default()
    };
    let diagram = explore_sync(self_loop(), options);
    assert_eq!(diagram.object_ids(), BTreeSet::from([1]));
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![Link::new(1, 1, "next")]
    );
}

#[test]
fn second_path_to_a_shared_object_is_dropped_by_default() {
    let diagram = explore_sync(shared_material(), ExploreOptions::default());
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![Link::new(1, 3, "primary")]
    );
    assert_eq!(diagram.object(3).unwrap().name, "primary");
}

#[test]
fn second_path_to_a_shared_object_can_be_linked() {
    let options = ExploreOptions {
        shared_references: SharedReferences::LinkExisting,
        ..ExploreOptions::default()
    };
    let diagram = explore_sync(shared_material(), options);
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![Link::new(1, 3, "backup"), Link::new(1, 3, "primary")]
    );
    assert_eq!(diagram.objects().len(), 2);
}

#[test]
fn inline_placement_reuses_the_owner_node() {
    let mut heap = product_heap();
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    let options = ExploreOptions {
        nested_containers: NestedContainers::Inline,
        ..ExploreOptions::default()
    };

    let diagram = explore_sync(heap, options);

    assert_eq!(diagram.object_ids(), BTreeSet::from([1, 3, 4]));
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![Link::new(1, 3, "parts"), Link::new(1, 4, "parts")]
    );
}

#[test]
fn root_level_array_links_elements_by_index() {
    let mut heap = MockHeap::new();
    heap.insert(
        30,
        MockObject::array(MATERIAL, vec![obj(3, MATERIAL), RemoteValue::Null]),
    );
    heap.insert(31, MockObject::array("int", vec![RemoteValue::Int(4), RemoteValue::Int(9)]));
    heap.insert(3, material(5));
    heap.insert(5, MockObject::string("steel"));
    heap.push_frame(
        THREAD,
        frame(
            None,
            vec![
                odiag_remote::MockLocal::new("stock", "com.example.Material[]", obj(30, "com.example.Material[]")),
                odiag_remote::MockLocal::new("sizes", "int[]", obj(31, "int[]")),
            ],
        ),
    );

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert_eq!(diagram.object_ids(), BTreeSet::from([3, 30, 31]));
    assert!(diagram.links().contains(&Link::new(30, 3, "0")));
    let stock = diagram.object(30).unwrap();
    assert_eq!(stock.attribute("1").unwrap().value, "null");
    assert_eq!(stock.attribute("1").unwrap().declared_type, MATERIAL);
    let sizes = diagram.object(31).unwrap();
    assert_eq!(sizes.attribute("0").unwrap().value, "4");
    assert_eq!(sizes.attribute("1").unwrap().value, "9");
}

#[test]
fn user_type_implementing_list_is_walked_by_field() {
    let mut heap = MockHeap::new();
    heap.insert(
        1,
        MockObject::plain(
            "com.example.PartList",
            vec![MockField::new("size", "int", RemoteValue::Int(0))],
        )
        .with_interfaces(["java.util.List", "java.util.Collection"]),
    );
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    let mut remote = MockRemote::new(heap);
    let roots = capture(&mut remote);

    let diagram = SyncExplorer::new(&mut remote, THREAD, ExploreOptions::default())
        .explore(roots)
        .unwrap();

    assert!(remote.invocations().is_empty());
    assert_eq!(diagram.object(1).unwrap().attribute("size").unwrap().value, "0");
}

#[test]
fn remote_failure_aborts_the_snapshot() {
    let mut heap = product_heap();
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    let mut remote = MockRemote::new(heap);
    let roots = capture(&mut remote);
    remote.fail_object(4);

    let result = SyncExplorer::new(&mut remote, THREAD, ExploreOptions::default()).explore(roots);
    assert!(matches!(
        result,
        Err(ExploreError::RemoteAccess(RemoteError::InvalidObject(4)))
    ));
}

#[test]
fn disconnect_during_expansion_aborts_the_snapshot() {
    let mut heap = product_heap();
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    let mut remote = MockRemote::new(heap);
    let roots = capture(&mut remote);
    remote.disconnect();

    let result = SyncExplorer::new(&mut remote, THREAD, ExploreOptions::default()).explore(roots);
    assert!(matches!(
        result,
        Err(ExploreError::RemoteAccess(RemoteError::Disconnected))
    ));
}

#[test]
fn every_container_call_runs_on_the_suspended_thread() {
    let mut heap = product_heap();
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    let mut remote = MockRemote::new(heap);
    let roots = capture(&mut remote);
    SyncExplorer::new(&mut remote, THREAD, ExploreOptions::default())
        .explore(roots)
        .unwrap();

    let methods: Vec<_> = remote
        .invocations()
        .iter()
        .map(|call| {
            assert_eq!(call.thread, THREAD);
            call.method.as_str()
        })
        .collect();
    assert_eq!(methods, vec!["iterator", "hasNext", "next", "hasNext", "next", "hasNext"]);
}

#[test]
fn long_chains_are_walked_without_recursion() {
    const LENGTH: u64 = 100_000;
    let mut heap = MockHeap::new();
    for id in 1..=LENGTH {
        let next = if id == LENGTH {
            RemoteValue::Null
        } else {
            obj(id + 1, "com.example.Node")
        };
        heap.insert(
            id,
            MockObject::plain(
                "com.example.Node",
                vec![MockField::new("next", "com.example.Node", next)],
            ),
        );
    }
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert_eq!(diagram.objects().len(), LENGTH as usize);
    assert_eq!(diagram.links().len(), LENGTH as usize - 1);
    assert!(diagram.links().contains(&Link::new(LENGTH - 1, LENGTH, "next")));
    let tail = diagram.object(LENGTH).unwrap();
    assert_eq!(tail.name, "next");
    assert_eq!(tail.attribute("next").unwrap().value, "null");
}

/// List(2) holds Node(3) then Node(4); both point at Node(5).
fn siblings_sharing_a_target() -> MockHeap {
    let mut heap = MockHeap::new();
    heap.insert(
        1,
        MockObject::plain(
            PRODUCT,
            vec![MockField::new("nodes", "java.util.List", obj(2, "java.util.ArrayList"))],
        ),
    );
    heap.insert(
        2,
        MockObject::list(
            "java.util.ArrayList",
            vec![obj(3, "com.example.Node"), obj(4, "com.example.Node")],
        ),
    );
    for id in [3, 4] {
        heap.insert(
            id,
            MockObject::plain(
                "com.example.Node",
                vec![MockField::new("shared", "com.example.Node", obj(5, "com.example.Node"))],
            ),
        );
    }
    heap.insert(5, MockObject::plain("com.example.Node", Vec::new()));
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));
    heap
}

#[test]
fn first_element_in_index_order_keeps_the_shared_link() {
    let diagram = explore_sync(siblings_sharing_a_target(), ExploreOptions::default());

    assert_eq!(diagram.object_ids(), BTreeSet::from([1, 2, 3, 4, 5]));
    assert!(diagram.links().contains(&Link::new(3, 5, "shared")));
    assert!(!diagram.links().contains(&Link::new(4, 5, "shared")));
    assert_eq!(diagram.object(3).unwrap().name, "0");
    assert_eq!(diagram.object(4).unwrap().name, "1");
}

#[test]
fn map_entries_convert_key_before_value() {
    let mut heap = MockHeap::new();
    heap.insert(
        1,
        MockObject::plain(
            PRODUCT,
            vec![MockField::new("index", "java.util.Map", obj(2, "java.util.HashMap"))],
        ),
    );
    heap.insert(2, MockObject::map("java.util.HashMap", vec![3, 4]));
    heap.insert(
        3,
        MockObject::map_entry(
            "java.util.HashMap$Node",
            obj(5, "com.example.Node"),
            obj(6, "com.example.Node"),
        ),
    );
    heap.insert(
        4,
        MockObject::map_entry(
            "java.util.HashMap$Node",
            obj(6, "com.example.Node"),
            RemoteValue::Int(2),
        ),
    );
    heap.insert(5, MockObject::plain("com.example.Node", Vec::new()));
    heap.insert(6, MockObject::plain("com.example.Node", Vec::new()));
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert_eq!(diagram.object_ids(), BTreeSet::from([1, 2, 3, 4, 5, 6]));
    assert!(diagram.links().contains(&Link::new(2, 3, "0")));
    assert!(diagram.links().contains(&Link::new(2, 4, "1")));
    assert!(diagram.links().contains(&Link::new(3, 5, "key")));
    // Node 6 is first reached as the value of entry 0.
    assert!(diagram.links().contains(&Link::new(3, 6, "value")));
    assert!(!diagram.links().contains(&Link::new(4, 6, "key")));
    assert_eq!(diagram.object(6).unwrap().name, "value");
    assert_eq!(diagram.object(4).unwrap().attribute("value").unwrap().value, "2");
}
