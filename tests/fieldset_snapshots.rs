use clausal::{ClausalError, FieldMap, FieldSet, FieldSets, Record, Value};

fn setup() -> (FieldSets, clausal::FieldSetId) {
    let mut sets = FieldSets::new();
    let root = sets.keep(FieldSet::from_scope(
        &Record::new().with("k", 1).with("a", "alpha").with_null("b"),
    ));
    (sets, root)
}

#[test]
fn clone_does_not_see_later_writes() {
    let (mut sets, f) = setup();
    let g = sets.clone_set(f).expect("clone of live set");
    sets.write(g, "k", Some(Value::Int(2))).expect("write ok");
    assert_eq!(sets.read(f, "k"), Some(&Value::Int(1)));
    assert_eq!(sets.read(g, "k"), Some(&Value::Int(2)));
    // and the other way around
    sets.write(f, "a", Some(Value::from("beta"))).expect("write ok");
    assert_eq!(sets.read(g, "a").and_then(Value::as_str), Some("alpha"));
}

#[test]
fn structural_clone_copies_on_write() {
    let f = FieldSet::from_scope(&Record::new().with("k", 1));
    let mut g = f.clone();
    g.write("k", Some(Value::Int(2)));
    g.write("fresh", Some(Value::Bool(true)));
    assert_eq!(f.read("k"), Some(&Value::Int(1)));
    assert_eq!(f.read("fresh"), None);
    assert_eq!(g.read("fresh"), Some(&Value::Bool(true)));
}

#[test]
fn destroyed_sets_read_null() {
    let (mut sets, f) = setup();
    let watermark = sets.len();
    let g = sets.clone_set(f).expect("clone of live set");
    assert_eq!(sets.destroy_from(watermark), 1);
    assert!(sets.is_destroyed(g));
    assert_eq!(sets.read(g, "k"), None);
    assert_eq!(sets.read(g, "a"), None);
    assert!(sets.result(g).is_empty());
    assert_eq!(sets.read(f, "k"), Some(&Value::Int(1)));

    // a set kept in the same slot later does not revive the stale id
    let h = sets.clone_set(f).expect("clone of live set");
    assert_ne!(g, h);
    assert!(sets.is_destroyed(g));
    assert_eq!(sets.read(h, "k"), Some(&Value::Int(1)));
    assert!(sets.write(g, "k", Some(Value::Int(3))).is_err());
}

#[test]
fn destroying_nothing_keeps_ids_valid() {
    let (mut sets, f) = setup();
    assert_eq!(sets.destroy_from(sets.len()), 0);
    assert!(!sets.is_destroyed(f));
}

#[test]
fn push_reads_through_renames_and_pop_writes_back() {
    let (mut sets, parent) = setup();
    let map = FieldMap::new([("x", "k"), ("y", "b")]).expect("valid map");
    let child = sets.push(&map, parent).expect("push");
    assert_eq!(sets.read(child, "x"), Some(&Value::Int(1)));
    assert_eq!(sets.read(child, "y"), None);
    // the child sees only its own locals
    assert_eq!(sets.read(child, "a"), None);
    assert_eq!(sets.get(child).and_then(FieldSet::next), Some(parent));

    sets.write(child, "y", Some(Value::Int(7))).expect("write ok");
    let popped = sets.pop(child).expect("pop");
    assert_eq!(sets.read(popped, "b"), Some(&Value::Int(7)));
    assert_eq!(sets.read(popped, "k"), Some(&Value::Int(1)));
    assert_eq!(sets.read(popped, "a").and_then(Value::as_str), Some("alpha"));
    // the caller's pre-call snapshot is untouched
    assert_eq!(sets.read(parent, "b"), None);
}

#[test]
fn pop_leaves_out_nulls_the_parent_never_had() {
    let (mut sets, parent) = setup();
    let map = FieldMap::new([("x", "k"), ("t", "missing"), ("y", "b")]).expect("valid map");
    let child = sets.push(&map, parent).expect("push");
    let popped = sets.pop(child).expect("pop");
    let expected = Record::new().with("k", 1).with("a", "alpha").with_null("b");
    assert_eq!(sets.result(popped), expected);
}

#[test]
fn pop_of_top_level_set_is_an_error() {
    let (mut sets, root) = setup();
    assert!(matches!(sets.pop(root), Err(ClausalError::Invariant(_))));
}

#[test]
fn result_holds_predeclared_and_named_overflow_keys() {
    let (mut sets, root) = setup();
    sets.write(root, "c", Some(Value::Int(3))).expect("write ok");
    let answer = sets.result(root);
    let expected = Record::new()
        .with("k", 1)
        .with("a", "alpha")
        .with_null("b")
        .with("c", 3);
    assert_eq!(answer, expected);
}

#[test]
fn field_maps_validate_names() {
    assert!(matches!(
        FieldMap::new([("1x", "a")]),
        Err(ClausalError::Construction(_))
    ));
    assert!(matches!(
        FieldMap::new([("x", "not valid")]),
        Err(ClausalError::Construction(_))
    ));
    assert!(matches!(
        FieldMap::new([("x", "a"), ("x", "b")]),
        Err(ClausalError::Construction(_))
    ));
    // several locals may alias one outer name
    let map = FieldMap::new([("x", "a"), ("y", "a")]).expect("aliases are fine");
    assert_eq!(map.outer("x"), Some("a"));
    assert_eq!(map.outer("y"), Some("a"));
    assert_eq!(map.outer("a"), None);
    assert_eq!(map.to_string(), "x=a, y=a");

    let identity = FieldMap::identity(["a", "b"]).expect("valid names");
    assert_eq!(identity.iter().collect::<Vec<_>>(), vec![("a", "a"), ("b", "b")]);
    assert!(FieldMap::empty().is_empty());
}
