use std::sync::Arc;
use tessera_model::{
    DecoratorPayload, DirtySet, EditorState, ElementDirt, Node, NodeKey, NodeRegistry,
    NodeTypeDescriptor, Point, Selection, TextNode,
};
use tessera_reconciler::{
    HostOp, PresentationHost, ReconcileError, ReconcileInput, ReconcileSummary, Reconciler,
    RecordingHost, RenderConfig, ResolvedSelection,
};

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    registry
        .register(NodeTypeDescriptor::decorator("image", false, |node| {
            let payload: DecoratorPayload = Arc::new(node.prop_str("src").unwrap_or_default().to_string());
            payload
        }))
        .unwrap();
    registry
}

fn append(state: &mut EditorState, parent: &str, mut node: Node) {
    let parent_key = NodeKey::from(parent);
    node.parent = Some(parent_key.clone());
    let key = node.key.clone();
    state.nodes.insert(node);
    state
        .nodes
        .make_mut(&parent_key)
        .and_then(Node::as_element_mut)
        .unwrap()
        .children
        .push(key);
}

fn text(key: &str, content: &str) -> Node {
    Node::text(NodeKey::from(key), TextNode::new(content))
}

/// root → p1("Hello"), p2("World"), p3("!")
fn three_paragraphs(registry: &NodeRegistry) -> EditorState {
    let mut state = EditorState::new();
    for (p, t, content) in [("p1", "t1", "Hello"), ("p2", "t2", "World"), ("p3", "t3", "!")] {
        append(&mut state, "root", registry.create("paragraph", NodeKey::from(p)).unwrap());
        append(&mut state, p, text(t, content));
    }
    state
}

struct Harness {
    registry: NodeRegistry,
    config: RenderConfig,
    reconciler: Reconciler,
    host: RecordingHost,
    current: EditorState,
}

impl Harness {
    fn mount(state: EditorState) -> Self {
        let mut harness = Harness {
            registry: registry(),
            config: RenderConfig::default(),
            reconciler: Reconciler::new(),
            host: RecordingHost::new(),
            current: EditorState::new(),
        };
        harness.commit(state, DirtySet::full()).unwrap();
        harness.host.take_ops();
        harness
    }

    fn commit(
        &mut self,
        next: EditorState,
        dirty: DirtySet,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut host = self.host.clone();
        let result = self.reconciler.reconcile(
            &mut host as &mut dyn PresentationHost,
            ReconcileInput {
                prev: &self.current,
                next: &next,
                dirty: &dirty,
                registry: &self.registry,
                config: &self.config,
            },
        );
        self.current = next;
        result
    }
}

fn structural(ops: &[HostOp]) -> Vec<&HostOp> {
    ops.iter().filter(|op| op.is_structural()).collect()
}

#[test]
fn test_first_commit_builds_everything() {
    let registry = registry();
    let harness = Harness::mount(three_paragraphs(&registry));
    assert_eq!(
        harness.host.render(),
        "<root><paragraph>Hello</paragraph><paragraph>World</paragraph><paragraph>!</paragraph></root>"
    );
    assert_eq!(harness.reconciler.mounted_len(), 7);
}

#[test]
fn test_leaf_change_is_a_single_update() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    let mut next = harness.current.clone();
    next.nodes.make_mut(&"t2".into()).unwrap().as_text_mut().unwrap().text = "There".into();
    let mut dirty = DirtySet::new();
    dirty.mark_leaf("t2".into());
    dirty.mark_element("p2".into(), ElementDirt::Ancestor);
    dirty.mark_element(NodeKey::root(), ElementDirt::Ancestor);

    let summary = harness.commit(next, dirty)?;
    let ops = harness.host.take_ops();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created + summary.destroyed + summary.moved, 0);
    assert_eq!(
        structural(&ops),
        vec![&HostOp::Update {
            key: "t2".into(),
            handle: harness.reconciler.handle(&"t2".into()).unwrap()
        }]
    );
    assert!(harness.host.render().contains("<paragraph>There</paragraph>"));
    Ok(())
}

#[test]
fn test_untouched_subtrees_are_not_visited() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    // t1 changes but nothing marks it dirty: it must not be looked at.
    let mut next = harness.current.clone();
    next.nodes.make_mut(&"t1".into()).unwrap().as_text_mut().unwrap().text = "Ignored".into();
    let summary = harness.commit(next, DirtySet::new())?;
    assert!(summary.is_noop());
    assert!(harness.host.render().contains("Hello"));
    Ok(())
}

#[test]
fn test_rotation_moves_one_child() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    let mut next = harness.current.clone();
    let root = next.nodes.make_mut(&NodeKey::root()).unwrap().as_element_mut().unwrap();
    root.children.rotate_left(1);
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Changed);

    let summary = harness.commit(next, dirty)?;
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.created + summary.destroyed, 0);
    assert_eq!(
        harness.host.render(),
        "<root><paragraph>World</paragraph><paragraph>!</paragraph><paragraph>Hello</paragraph></root>"
    );
    Ok(())
}

#[test]
fn test_removal_and_insertion() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    let mut next = harness.current.clone();
    let root = next.nodes.make_mut(&NodeKey::root()).unwrap().as_element_mut().unwrap();
    root.children.retain(|k| k.as_str() != "p2");
    next.nodes.remove(&"p2".into());
    next.nodes.remove(&"t2".into());
    append(&mut next, "root", registry.create("quote", NodeKey::from("q")).unwrap());
    append(&mut next, "q", text("tq", "Quoted"));
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Changed);
    dirty.mark_element("q".into(), ElementDirt::Changed);
    dirty.mark_leaf("tq".into());

    let summary = harness.commit(next, dirty)?;
    assert_eq!(summary.destroyed, 1);
    assert_eq!(summary.created, 2);
    assert_eq!(harness.reconciler.handle(&"t2".into()), None);
    assert_eq!(
        harness.host.render(),
        "<root><paragraph>Hello</paragraph><paragraph>!</paragraph><quote>Quoted</quote></root>"
    );
    Ok(())
}

#[test]
fn test_cross_parent_move_recreates() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));
    let old_handle = harness.reconciler.handle(&"t3".into()).unwrap();

    let mut next = harness.current.clone();
    next.nodes.make_mut(&"p3".into()).unwrap().as_element_mut().unwrap().children.clear();
    next.nodes.make_mut(&"p1".into()).unwrap().as_element_mut().unwrap().children.push("t3".into());
    next.nodes.make_mut(&"t3".into()).unwrap().parent = Some("p1".into());
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Ancestor);
    dirty.mark_element("p1".into(), ElementDirt::Changed);
    dirty.mark_element("p3".into(), ElementDirt::Changed);
    dirty.mark_leaf("t3".into());

    let summary = harness.commit(next, dirty)?;
    assert_eq!(summary.created, 1);
    assert_eq!(summary.destroyed, 1);
    assert_ne!(harness.reconciler.handle(&"t3".into()), Some(old_handle));
    assert_eq!(
        harness.host.render(),
        "<root><paragraph>Hello!</paragraph><paragraph>World</paragraph><paragraph/></root>"
    );
    Ok(())
}

#[test]
fn test_update_hook_can_request_recreate() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));
    harness.host.recreate_on_update("paragraph");

    let mut next = harness.current.clone();
    next.nodes.make_mut(&"p2".into()).unwrap().as_element_mut().unwrap().indent = 2;
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Ancestor);
    dirty.mark_element("p2".into(), ElementDirt::Changed);

    let summary = harness.commit(next, dirty)?;
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.destroyed, 1);
    assert_eq!(summary.created, 2);
    assert!(harness.host.render().contains("<paragraph>World</paragraph>"));
    Ok(())
}

#[test]
fn test_host_failure_forces_full_rebuild() {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));
    harness.host.fail_on(Some("t1".into()));

    let mut next = harness.current.clone();
    next.nodes.make_mut(&"t1".into()).unwrap().as_text_mut().unwrap().text = "Boom".into();
    let mut dirty = DirtySet::new();
    dirty.mark_leaf("t1".into());
    dirty.mark_element("p1".into(), ElementDirt::Ancestor);
    dirty.mark_element(NodeKey::root(), ElementDirt::Ancestor);
    assert!(harness.commit(next.clone(), dirty).is_err());
    assert!(harness.reconciler.needs_full());

    harness.host.fail_on(None);
    let summary = harness.commit(next, DirtySet::new()).unwrap();
    assert!(summary.full);
    assert!(harness.host.render().contains("Boom"));
}

#[test]
fn test_decorator_delta_is_handed_off() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    let mut next = harness.current.clone();
    let mut image = registry.create("image", NodeKey::from("img"))?;
    image.props_mut().unwrap().insert("src".into(), serde_json::json!("cat.png"));
    append(&mut next, "root", image);
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Changed);
    dirty.mark_leaf("img".into());
    harness.commit(next, dirty)?;

    let deltas = harness.host.take_decorator_deltas();
    assert_eq!(deltas.len(), 1);
    let added = &deltas[0].added[0];
    assert_eq!(added.key, NodeKey::from("img"));
    let payload = added.payload.as_ref().unwrap().downcast_ref::<String>().unwrap();
    assert_eq!(payload, "cat.png");

    // Decorator content changes never reach the update hook.
    harness.host.take_ops();
    let mut next = harness.current.clone();
    next.nodes
        .make_mut(&"img".into())
        .unwrap()
        .props_mut()
        .unwrap()
        .insert("src".into(), serde_json::json!("dog.png"));
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Ancestor);
    dirty.mark_leaf("img".into());
    let summary = harness.commit(next, dirty)?;
    assert_eq!(summary.updated, 0);
    let deltas = harness.host.take_decorator_deltas();
    assert_eq!(deltas[0].changed.len(), 1);

    let mut next = harness.current.clone();
    next.nodes.make_mut(&NodeKey::root()).unwrap().as_element_mut().unwrap().children.pop();
    next.nodes.remove(&"img".into());
    let mut dirty = DirtySet::new();
    dirty.mark_element(NodeKey::root(), ElementDirt::Changed);
    harness.commit(next, dirty)?;
    let deltas = harness.host.take_decorator_deltas();
    assert_eq!(deltas[0].removed, vec![NodeKey::from("img")]);
    Ok(())
}

#[test]
fn test_selection_is_resolved_to_handles() -> anyhow::Result<()> {
    let registry = registry();
    let mut harness = Harness::mount(three_paragraphs(&registry));

    let mut next = harness.current.clone();
    next.selection = Some(Selection::range(Point::text("t1", 1), Point::text("t3", 1)));
    harness.commit(next, DirtySet::new())?;
    match harness.host.selection() {
        Some(ResolvedSelection::Range { anchor, focus }) => {
            assert_eq!(anchor.handle, harness.reconciler.handle(&"t1".into()).unwrap());
            assert_eq!(focus.offset, 1);
        }
        other => panic!("unexpected selection {other:?}"),
    }

    // A dangling point falls back to the start of the document.
    let mut next = harness.current.clone();
    next.selection = Some(Selection::caret(Point::text("gone", 0)));
    harness.commit(next, DirtySet::new())?;
    match harness.host.selection() {
        Some(ResolvedSelection::Range { anchor, .. }) => assert_eq!(anchor.key, NodeKey::from("t1")),
        other => panic!("unexpected selection {other:?}"),
    }
    Ok(())
}
