// Integration tests for the editor update cycle
//
// Tests cover:
// - Copy-on-write isolation of committed states
// - Queued, flushed and discrete updates
// - Node transforms and their round cap
// - Update and mutation listeners
// - Minimal reconciliation through an attached host
// - Serialization, commands and history

use std::cell::RefCell;
use std::rc::Rc;
use tessera_editor::{
    CommandPriority, Editor, EditorConfig, EditorError, History, MutationRecord, Txn, UpdateOptions,
    FORMAT_TEXT, INSERT_PARAGRAPH, INSERT_TEXT,
};
use tessera_model::{NodeKey, Point, TextFormat};
use tessera_reconciler::{HostOp, RecordingHost};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// root → paragraph("Hello"), paragraph("World"); caret at the end of "Hello".
fn two_paragraphs(editor: &mut Editor) -> (NodeKey, NodeKey, NodeKey, NodeKey) {
    editor
        .update_discrete(|txn: &mut Txn<'_>| {
            let first = txn.create_paragraph()?;
            let hello = txn.create_text("Hello")?;
            txn.append(&first, &hello)?;
            txn.append(&NodeKey::root(), &first)?;

            let second = txn.create_paragraph()?;
            let world = txn.create_text("World")?;
            txn.append(&second, &world)?;
            txn.append(&NodeKey::root(), &second)?;

            txn.select_end(&hello)?;
            Ok((first, hello, second, world))
        })
        .unwrap()
}

#[test]
fn test_committed_state_is_isolated_from_later_updates() -> anyhow::Result<()> {
    let mut editor = Editor::new(EditorConfig::default());
    let (first, hello, second, world) = two_paragraphs(&mut editor);
    let before = editor.state();

    editor.update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Howdy"))?;

    let after = editor.state();
    assert_eq!(before.text_content(), "Hello\n\nWorld");
    assert_eq!(after.text_content(), "Howdy\n\nWorld");
    assert!(!after.nodes.shares(&before.nodes, &hello));
    assert!(after.nodes.shares(&before.nodes, &first));
    assert!(after.nodes.shares(&before.nodes, &second));
    assert!(after.nodes.shares(&before.nodes, &world));
    after.nodes.validate()?;
    Ok(())
}

#[test]
fn test_failed_mutator_discards_the_draft() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    let before = editor.state();

    let result = editor.update_discrete(|txn: &mut Txn<'_>| {
        txn.set_text(&hello, "changed")?;
        txn.remove(&NodeKey::root())
    });

    assert!(result.unwrap_err().is_invalid_structure());
    assert_eq!(editor.state().text_content(), before.text_content());
    assert!(editor.state().nodes.shares(&before.nodes, &hello));
}

#[test]
fn test_read_refuses_writes() {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);

    let text = editor
        .read(|txn: &mut Txn<'_>| Ok(txn.text_content(&NodeKey::root())))
        .unwrap();
    assert_eq!(text, "Hello\n\nWorld");

    let err = editor
        .read(|txn: &mut Txn<'_>| txn.create_paragraph())
        .unwrap_err();
    assert!(err.is_read_only_violation());
}

#[test]
fn test_queued_updates_commit_together_on_flush() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, world) = two_paragraphs(&mut editor);
    let commits = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&commits);
    editor.register_update_listener(move |payload| {
        seen.borrow_mut().push(payload.tags.clone());
    });

    let key = hello.clone();
    editor
        .update(
            move |txn: &mut Txn<'_>| txn.set_text(&key, "Hi"),
            UpdateOptions::tagged("first"),
        )
        .unwrap();
    let key = world.clone();
    editor
        .update(
            move |txn: &mut Txn<'_>| txn.set_text(&key, "There"),
            UpdateOptions::tagged("second"),
        )
        .unwrap();

    assert!(editor.has_pending_updates());
    assert_eq!(editor.state().text_content(), "Hello\n\nWorld");
    assert!(commits.borrow().is_empty());

    editor.flush().unwrap();
    assert!(!editor.has_pending_updates());
    assert_eq!(editor.state().text_content(), "Hi\n\nThere");
    assert_eq!(*commits.borrow(), vec![vec!["first".to_string(), "second".to_string()]]);
}

#[test]
fn test_discrete_update_flushes_the_queue_with_it() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, world) = two_paragraphs(&mut editor);
    let commits = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&commits);
    editor.register_update_listener(move |_| *seen.borrow_mut() += 1);

    editor
        .update(move |txn: &mut Txn<'_>| txn.set_text(&hello, "A"), UpdateOptions::default())
        .unwrap();
    editor
        .update(move |txn: &mut Txn<'_>| txn.set_text(&world, "B"), UpdateOptions::discrete())
        .unwrap();

    assert_eq!(editor.state().text_content(), "A\n\nB");
    assert_eq!(*commits.borrow(), 1);
}

#[test]
fn test_nested_updates_join_the_transaction() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, world) = two_paragraphs(&mut editor);
    let commits = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&commits);
    editor.register_update_listener(move |_| *seen.borrow_mut() += 1);

    editor
        .update_discrete(|txn: &mut Txn<'_>| {
            txn.set_text(&hello, "outer")?;
            txn.update(move |txn: &mut Txn<'_>| txn.set_text(&world, "inner"), UpdateOptions::default())
        })
        .unwrap();

    assert_eq!(editor.state().text_content(), "outer\n\ninner");
    assert_eq!(*commits.borrow(), 1);
}

#[test]
fn test_selection_only_change_still_commits() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    let dirty_counts = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&dirty_counts);
    editor.register_update_listener(move |payload| seen.borrow_mut().push(payload.dirty.len()));

    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.select_start(&hello))
        .unwrap();
    // Selecting the same point again changes nothing.
    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.select_start(&hello))
        .unwrap();

    assert_eq!(*dirty_counts.borrow(), vec![0]);
    let selection = editor.state().selection.clone().unwrap();
    assert_eq!(selection.as_range().unwrap().anchor, Point::text(hello, 0));
}

#[test]
fn test_removing_the_selected_node_repairs_the_selection() {
    init_tracing();
    let mut editor = Editor::new(EditorConfig::default());
    let (first, _, _, world) = two_paragraphs(&mut editor);

    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.remove(&first))
        .unwrap();

    let state = editor.state();
    assert_eq!(state.text_content(), "World");
    assert!(state.get(&first).is_none());
    let range = state.selection.as_ref().and_then(|s| s.as_range()).unwrap();
    assert_eq!(range.anchor, Point::text(world, 0));
    assert!(range.is_collapsed());
    state.nodes.validate().unwrap();
}

#[test]
fn test_transform_runs_once_per_dirty_node() {
    let mut editor = Editor::new(EditorConfig::default());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    editor
        .register_node_transform("text", move |_txn: &mut Txn<'_>, key: &NodeKey| {
            seen.borrow_mut().push(key.clone());
            Ok(())
        })
        .unwrap();

    let (_, hello, _, world) = two_paragraphs(&mut editor);
    let mut created = calls.borrow().clone();
    created.sort();
    let mut expected = vec![hello.clone(), world];
    expected.sort();
    assert_eq!(created, expected);

    calls.borrow_mut().clear();
    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Hey"))
        .unwrap();
    assert_eq!(*calls.borrow(), vec![hello]);
}

#[test]
fn test_transform_writes_trigger_another_round() {
    let mut editor = Editor::new(EditorConfig::default());
    editor
        .register_node_transform("text", |txn: &mut Txn<'_>, key: &NodeKey| {
            let text = txn.text(key)?.text.clone();
            if text.contains(":)") {
                txn.set_text(key, text.replace(":)", "🙂"))?;
            }
            Ok(())
        })
        .unwrap();

    let (_, hello, _, _) = two_paragraphs(&mut editor);
    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Hi :) :)"))
        .unwrap();
    assert_eq!(editor.state().text_content(), "Hi 🙂 🙂\n\nWorld");
}

#[test]
fn test_transform_that_never_settles_is_aborted() {
    init_tracing();
    let config = EditorConfig {
        max_transform_iterations: 5,
        ..Default::default()
    };
    let mut editor = Editor::new(config);
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    let before = editor.state();
    editor
        .register_node_transform("text", |txn: &mut Txn<'_>, key: &NodeKey| txn.mark_dirty(key))
        .unwrap();

    let err = editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "loop"))
        .unwrap_err();
    assert!(matches!(err, EditorError::InfiniteTransformLoop { iterations: 5 }));
    assert!(err.is_infinite_transform_loop());
    assert_eq!(editor.state().text_content(), before.text_content());
}

#[test]
fn test_transform_for_unknown_type_is_rejected() {
    let mut editor = Editor::new(EditorConfig::default());
    let err = editor
        .register_node_transform("nope", |_: &mut Txn<'_>, _: &NodeKey| Ok(()))
        .unwrap_err();
    assert!(err.is_unknown_node_type());
}

#[test]
fn test_removed_transform_stops_running() {
    let mut editor = Editor::new(EditorConfig::default());
    let calls = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&calls);
    let id = editor
        .register_node_transform("paragraph", move |_: &mut Txn<'_>, _: &NodeKey| {
            *seen.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    assert!(editor.remove_listener(id));
    assert!(!editor.remove_listener(id));

    two_paragraphs(&mut editor);
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn test_mutation_listener_reports_created_updated_destroyed() {
    let mut editor = Editor::new(EditorConfig::default());
    let records: Rc<RefCell<Vec<MutationRecord>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&records);
    editor
        .register_mutation_listener("paragraph", move |record| seen.borrow_mut().push(record.clone()))
        .unwrap();

    let (first, hello, second, _) = two_paragraphs(&mut editor);
    {
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        let mut created = vec![first.clone(), second.clone()];
        created.sort();
        assert_eq!(records[0].created, created);
        assert!(records[0].updated.is_empty());
    }

    // Editing a child leaves the paragraph itself untouched.
    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Hey"))
        .unwrap();
    assert_eq!(records.borrow().len(), 1);

    editor
        .update_discrete(|txn: &mut Txn<'_>| {
            let more = txn.create_text("!")?;
            txn.set_format(&more, TextFormat::BOLD)?;
            txn.append(&first, &more)
        })
        .unwrap();
    assert_eq!(records.borrow()[1].updated, vec![first.clone()]);

    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.remove(&second))
        .unwrap();
    assert_eq!(records.borrow()[2].destroyed, vec![second]);
}

#[test]
fn test_attached_host_receives_minimal_operations() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    let host = RecordingHost::new();

    let summary = editor.attach_host(Box::new(host.clone())).unwrap();
    assert!(summary.full);
    assert_eq!(summary.created, 5);
    assert_eq!(
        host.render(),
        "<root><paragraph>Hello</paragraph><paragraph>World</paragraph></root>"
    );
    host.take_ops();

    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Howdy"))
        .unwrap();

    let ops = host.take_ops();
    let structural: Vec<&HostOp> = ops.iter().filter(|op| op.is_structural()).collect();
    let handle = editor.reconciler().handle(&hello).unwrap();
    assert_eq!(structural, vec![&HostOp::Update { key: hello, handle }]);
    assert_eq!(
        host.render(),
        "<root><paragraph>Howdy</paragraph><paragraph>World</paragraph></root>"
    );
}

#[test]
fn test_failed_reconcile_keeps_the_commit_and_rebuilds_next_time() {
    init_tracing();
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, world) = two_paragraphs(&mut editor);
    let host = RecordingHost::new();
    editor.attach_host(Box::new(host.clone())).unwrap();
    let summaries = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&summaries);
    editor.register_update_listener(move |payload| seen.borrow_mut().push(payload.reconciled));

    host.fail_on(Some(hello.clone()));
    let err = editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&hello, "Broken"))
        .unwrap_err();
    assert!(matches!(err, EditorError::Reconcile(_)));
    assert_eq!(editor.state().text_content(), "Broken\n\nWorld");

    host.fail_on(None);
    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.set_text(&world, "Fixed"))
        .unwrap();
    let last = summaries.borrow().last().copied().flatten().unwrap();
    assert!(last.full);
    assert_eq!(
        host.render(),
        "<root><paragraph>Broken</paragraph><paragraph>Fixed</paragraph></root>"
    );
}

#[test]
fn test_serialized_document_round_trips() -> anyhow::Result<()> {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    editor.update_discrete(|txn: &mut Txn<'_>| {
        let bold = txn.create_text(" there")?;
        txn.set_format(&bold, TextFormat::BOLD | TextFormat::ITALIC)?;
        txn.insert_after(&hello, &bold)
    })?;
    let json = editor.to_json("tests")?;

    let mut other = Editor::new(EditorConfig::default());
    let state = other.parse_editor_state(&json)?;
    other.set_editor_state(state)?;

    assert_eq!(other.state().text_content(), "Hello there\n\nWorld");
    assert_eq!(
        other.export_document("tests")?.root,
        editor.export_document("tests")?.root
    );
    Ok(())
}

#[test]
fn test_set_editor_state_notifies_with_full_dirt() {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);
    let replacement = editor.state();

    let mut other = Editor::new(EditorConfig::default());
    let full = Rc::new(RefCell::new(false));
    let seen = Rc::clone(&full);
    other.register_update_listener(move |payload| *seen.borrow_mut() = payload.dirty.is_full_reconcile());
    other.set_editor_state(replacement).unwrap();

    assert!(*full.borrow());
    assert_eq!(other.state().text_content(), "Hello\n\nWorld");

    // Keys generated afterwards do not collide with the loaded ones.
    let key = other
        .update_discrete(|txn: &mut Txn<'_>| {
            let paragraph = txn.create_paragraph()?;
            txn.append(&NodeKey::root(), &paragraph)?;
            Ok(paragraph)
        })
        .unwrap();
    assert_eq!(other.state().nodes.len(), 6);
    assert!(other.state().nodes.contains(&key));
}

#[test]
fn test_built_in_commands_edit_at_the_caret() {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);

    assert!(editor.dispatch_command(INSERT_TEXT, ", friend".to_string()).unwrap());
    assert_eq!(editor.state().text_content(), "Hello, friend\n\nWorld");

    assert!(editor.dispatch_command(INSERT_PARAGRAPH, ()).unwrap());
    assert!(editor.dispatch_command(INSERT_TEXT, "New".to_string()).unwrap());
    assert_eq!(editor.state().text_content(), "Hello, friend\n\nNew\n\nWorld");
    editor.state().nodes.validate().unwrap();
}

#[test]
fn test_higher_priority_handler_wins() {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);
    let order = Rc::new(RefCell::new(Vec::new()));

    let seen = Rc::clone(&order);
    editor.register_command(INSERT_TEXT, CommandPriority::Low, move |_, _| {
        seen.borrow_mut().push("low");
        Ok(false)
    });
    let seen = Rc::clone(&order);
    editor.register_command(INSERT_TEXT, CommandPriority::High, move |txn, text: &String| {
        seen.borrow_mut().push("high");
        txn.insert_text(&text.to_uppercase())?;
        Ok(true)
    });

    assert!(editor.dispatch_command(INSERT_TEXT, "!".to_string()).unwrap());
    assert_eq!(*order.borrow(), vec!["high"]);
    assert_eq!(editor.state().text_content(), "Hello!\n\nWorld");

    order.borrow_mut().clear();
    assert!(editor.dispatch_command(INSERT_TEXT, "x".to_string()).unwrap());
    assert_eq!(editor.state().text_content(), "Hello!X\n\nWorld");
}

#[test]
fn test_unhandled_command_falls_through_to_built_in() {
    let mut editor = Editor::new(EditorConfig::default());
    let (_, hello, _, _) = two_paragraphs(&mut editor);
    let id = editor.register_command(FORMAT_TEXT, CommandPriority::Critical, |_, _| Ok(false));

    editor
        .update_discrete(|txn: &mut Txn<'_>| txn.select(Point::text(hello.clone(), 0), Point::text(hello.clone(), 5)))
        .unwrap();
    assert!(editor.dispatch_command(FORMAT_TEXT, TextFormat::BOLD).unwrap());
    let state = editor.state();
    assert!(state.get(&hello).unwrap().as_text().unwrap().has_format(TextFormat::BOLD));
    assert!(editor.remove_listener(id));
}

#[test]
fn test_commands_are_refused_when_not_editable() {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);
    editor.set_editable(false);

    let err = editor
        .dispatch_command(INSERT_TEXT, "nope".to_string())
        .unwrap_err();
    assert!(err.is_read_only_violation());
    assert_eq!(editor.state().text_content(), "Hello\n\nWorld");
}

#[test]
fn test_history_undoes_a_typed_word() -> anyhow::Result<()> {
    let mut editor = Editor::new(EditorConfig::default());
    two_paragraphs(&mut editor);
    let history = History::register(&mut editor);

    editor.dispatch_command(INSERT_TEXT, " there".to_string())?;
    assert_eq!(editor.state().text_content(), "Hello there\n\nWorld");

    assert!(history.undo(&mut editor)?);
    assert_eq!(editor.state().text_content(), "Hello\n\nWorld");
    assert!(history.redo(&mut editor)?);
    assert_eq!(editor.state().text_content(), "Hello there\n\nWorld");
    assert!(!history.redo(&mut editor)?);
    Ok(())
}
