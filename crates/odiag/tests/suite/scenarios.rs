use std::collections::BTreeSet;

use odiag::{ExploreOptions, Link, PrimitiveRootValue, SyncExplorer};
use odiag_remote::{MockField, MockHeap, MockLocal, MockObject, MockRemote, RemoteAccess, RemoteError, RemoteValue};
use pretty_assertions::assert_eq;

use crate::fixtures::*;

#[test]
fn product_with_a_list_of_materials() {
    let mut heap = product_heap();
    heap.push_frame(THREAD, frame(Some(1), Vec::new()));

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert_eq!(diagram.object_ids(), BTreeSet::from([1, 2, 3, 4]));
    assert_eq!(diagram.object(1).unwrap().type_name, PRODUCT);
    assert_eq!(diagram.object(1).unwrap().name, "this");
    assert_eq!(diagram.object(2).unwrap().type_name, "java.util.ArrayList");
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![
            Link::new(1, 2, "parts"),
            Link::new(2, 3, "0"),
            Link::new(2, 4, "1"),
        ]
    );

    let steel = diagram.object(3).unwrap();
    assert_eq!(steel.attribute("name").unwrap().value, "\"steel\"");
    assert_eq!(steel.attribute("name").unwrap().declared_type, "java.lang.String");
    assert_eq!(steel.attribute("weight").unwrap().value, "1.5");
    assert!(diagram.primitive_root_values().is_empty());
}

#[test]
fn primitive_local_becomes_a_root_value() {
    let mut heap = MockHeap::new();
    heap.push_frame(
        THREAD,
        frame(None, vec![MockLocal::new("count", "int", RemoteValue::Int(5))]),
    );

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert!(diagram.objects().is_empty());
    assert_eq!(
        diagram.primitive_root_values().iter().cloned().collect::<Vec<_>>(),
        vec![PrimitiveRootValue::new("count", "int", "5")]
    );
}

#[test]
fn map_with_one_entry() {
    let mut heap = MockHeap::new();
    heap.insert(20, MockObject::map("java.util.HashMap", vec![21]));
    heap.insert(
        21,
        MockObject::map_entry(
            "java.util.HashMap$Node",
            obj(22, "java.lang.String"),
            obj(23, "java.lang.Integer"),
        ),
    );
    heap.insert(22, MockObject::string("k"));
    heap.insert(23, MockObject::boxed("java.lang.Integer", RemoteValue::Int(1)));
    heap.push_frame(
        THREAD,
        frame(
            None,
            vec![MockLocal::new("index", "java.util.Map", obj(20, "java.util.HashMap"))],
        ),
    );

    let diagram = explore_sync(heap, ExploreOptions::default());

    assert_eq!(diagram.object_ids(), BTreeSet::from([20, 21]));
    assert_eq!(diagram.object(20).unwrap().name, "index");
    assert_eq!(
        diagram.links().iter().cloned().collect::<Vec<_>>(),
        vec![Link::new(20, 21, "0")]
    );
    let entry = diagram.object(21).unwrap();
    assert_eq!(entry.name, "0");
    assert_eq!(entry.attribute("key").unwrap().value, "\"k\"");
    assert_eq!(entry.attribute("value").unwrap().value, "1");
    assert_eq!(entry.attribute("value").unwrap().declared_type, "java.lang.Integer");
}

#[test]
fn roots_are_captured_before_any_invocation() {
    let mut heap = product_heap();
    heap.insert(
        7,
        MockObject::plain(
            "com.example.Holder",
            vec![MockField::new("materials", "java.util.Set", obj(8, "java.util.HashSet"))],
        ),
    );
    heap.insert(8, MockObject::set("java.util.HashSet", vec![obj(9, MATERIAL)]));
    heap.insert(9, material(5));
    heap.insert(10, material(6));
    heap.push_frame(
        THREAD,
        frame(
            Some(1),
            vec![
                MockLocal::new("x", "int", RemoteValue::Int(2)),
                MockLocal::new("y", MATERIAL, obj(10, MATERIAL)),
                MockLocal::new("h", "com.example.Holder", obj(7, "com.example.Holder")),
            ],
        ),
    );
    let mut remote = MockRemote::new(heap);

    let roots = capture(&mut remote);
    assert!(remote.invocations().is_empty());
    let names: BTreeSet<_> = roots.names().into_iter().collect();
    assert_eq!(names, BTreeSet::from(["this", "x", "y", "h"]));

    let diagram = SyncExplorer::new(&mut remote, THREAD, ExploreOptions::default())
        .explore(roots)
        .unwrap();

    // Expansion ran code on the thread, so the frame is no longer readable;
    // the captured `x` is unaffected.
    assert!(!remote.invocations().is_empty());
    assert!(matches!(
        remote.visible_variables(FRAME),
        Err(RemoteError::InvalidFrame(FRAME))
    ));
    assert!(diagram
        .primitive_root_values()
        .contains(&PrimitiveRootValue::new("x", "int", "2")));
    assert_eq!(diagram.object(10).unwrap().name, "y");
    assert!(diagram.links().contains(&Link::new(7, 8, "materials")));
    assert!(diagram.links().contains(&Link::new(8, 9, "0")));
}
