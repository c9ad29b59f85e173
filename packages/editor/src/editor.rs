//! # Editor
//!
//! Owns the committed [`EditorState`] and runs the update cycle:
//!
//! ```text
//! update(f) ──queue──▶ flush ─┐
//! update(f, discrete) ────────┤
//!                             ▼
//!        draft = committed.clone()
//!        f(draft), nested updates
//!        transforms (rounds, capped)
//!        normalize text, collect detached nodes, repair selection
//!                             │
//!                             ▼
//!        swap committed ── reconcile ── mutation listeners ── update listeners
//!                             │
//!                             ▼
//!                    deferred discrete updates
//! ```
//!
//! A failing mutator or transform discards the draft; the committed state is
//! untouched. A failing reconciliation keeps the commit, reports the error and
//! makes the next reconciliation a full rebuild.

use crate::clipboard::{clone_selected_content, convert_selection_to_html, ClonedContent};
use crate::commands::{builtin_handlers, erase, Command, CommandPriority, CommandRegistry};
use crate::normalize::collect_garbage;
use crate::transaction::{Mutator, TxnOutcome};
use crate::transforms::TransformEngine;
use crate::{EditorConfig, EditorError, EditorResult, Txn, UpdateOptions};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tessera_model::{
    DirtySet, EditorState, KeyGenerator, NodeKey, NodeRegistry, NodeTypeDescriptor, SerializedDocument,
};
use tessera_reconciler::{PresentationHost, ReconcileInput, ReconcileSummary, Reconciler};
use tracing::{debug, info, instrument, warn};

/// Handle returned by every `register_*` call; pass it to
/// [`Editor::remove_listener`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// What an update listener is told about a commit.
#[derive(Debug, Clone)]
pub struct UpdatePayload {
    pub prev_state: Arc<EditorState>,
    pub next_state: Arc<EditorState>,
    pub dirty: DirtySet,
    pub tags: Vec<String>,
    /// `None` when no presentation host is attached.
    pub reconciled: Option<ReconcileSummary>,
}

impl UpdatePayload {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Nodes of one type touched by a commit, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub node_type: String,
    pub created: Vec<NodeKey>,
    pub updated: Vec<NodeKey>,
    pub destroyed: Vec<NodeKey>,
}

impl MutationRecord {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

pub type UpdateListener = Rc<dyn Fn(&UpdatePayload)>;
pub type MutationListener = Rc<dyn Fn(&MutationRecord)>;

pub struct Editor {
    config: EditorConfig,
    registry: NodeRegistry,
    keys: KeyGenerator,
    state: Arc<EditorState>,
    queue: VecDeque<(Mutator, UpdateOptions)>,
    transforms: TransformEngine,
    commands: CommandRegistry,
    update_listeners: Vec<(ListenerId, UpdateListener)>,
    mutation_listeners: Vec<(ListenerId, Arc<str>, MutationListener)>,
    host: Option<Box<dyn PresentationHost>>,
    reconciler: Reconciler,
    full_reconcile_pending: bool,
    next_listener: u64,
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("config", &self.config)
            .field("nodes", &self.state.nodes.len())
            .field("queued", &self.queue.len())
            .field("transforms", &self.transforms)
            .field("commands", &self.commands)
            .field("update_listeners", &self.update_listeners.len())
            .field("mutation_listeners", &self.mutation_listeners.len())
            .field("host", &self.host.is_some())
            .finish()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    /// An editor with the built-in node types and an empty document.
    pub fn new(config: EditorConfig) -> Self {
        Self::with_registry(config, NodeRegistry::with_builtins())
    }

    pub fn with_registry(config: EditorConfig, registry: NodeRegistry) -> Self {
        let mut editor = Self {
            config,
            registry,
            keys: KeyGenerator::new(),
            state: Arc::new(EditorState::new()),
            queue: VecDeque::new(),
            transforms: TransformEngine::new(),
            commands: CommandRegistry::default(),
            update_listeners: Vec::new(),
            mutation_listeners: Vec::new(),
            host: None,
            reconciler: Reconciler::new(),
            full_reconcile_pending: true,
            next_listener: 0,
        };
        for (name, handler) in builtin_handlers() {
            let id = editor.next_id();
            editor
                .commands
                .register(name, id, CommandPriority::Editor, handler);
        }
        editor
    }

    fn next_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Swap the configuration. A theme or namespace change rebuilds the
    /// presentation.
    pub fn set_config(&mut self, config: EditorConfig) -> EditorResult<()> {
        let refresh = self.config.affects_presentation(&config);
        self.config = config;
        if refresh {
            self.full_reconcile_pending = true;
            self.reconciler.mark_full();
            if self.host.is_some() {
                self.refresh_presentation()?;
            }
        }
        Ok(())
    }

    pub fn is_editable(&self) -> bool {
        self.config.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.config.editable = editable;
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn register_node_type(&mut self, descriptor: NodeTypeDescriptor) -> EditorResult<()> {
        Ok(self.registry.register(descriptor)?)
    }

    /// The committed state. Queued updates are not reflected until flushed.
    pub fn state(&self) -> Arc<EditorState> {
        Arc::clone(&self.state)
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Schedule `f`. Non-discrete updates wait for [`Editor::flush`] and are
    /// committed together; a discrete update flushes the queue right away,
    /// itself included.
    pub fn update(
        &mut self,
        f: impl FnOnce(&mut Txn<'_>) -> EditorResult<()> + 'static,
        options: UpdateOptions,
    ) -> EditorResult<()> {
        let discrete = options.discrete;
        self.queue.push_back((Box::new(f), options));
        if discrete {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit every queued update as one transaction.
    pub fn flush(&mut self) -> EditorResult<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut tags: Vec<String> = Vec::new();
        let mut mutators = Vec::with_capacity(self.queue.len());
        for (mutator, options) in self.queue.drain(..) {
            if let Some(tag) = options.tag {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            mutators.push(mutator);
        }
        debug!(count = mutators.len(), "flushing queued updates");
        self.commit_cycle(tags, move |txn| {
            for mutator in mutators {
                mutator(&mut *txn)?;
            }
            Ok(())
        })
    }

    /// Flush, then run `f` in its own transaction and commit it immediately.
    pub fn update_discrete<R>(&mut self, f: impl FnOnce(&mut Txn<'_>) -> EditorResult<R>) -> EditorResult<R> {
        self.flush()?;
        self.commit_cycle(Vec::new(), f)
    }

    /// Run `f` against the committed state. Writes fail with
    /// `ReadOnlyViolation`; queued updates are not flushed first.
    pub fn read<R>(&self, f: impl FnOnce(&mut Txn<'_>) -> EditorResult<R>) -> EditorResult<R> {
        let mut txn = Txn::read_only(&self.state, &self.registry);
        f(&mut txn)
    }

    #[instrument(skip_all, fields(tags = ?tags))]
    fn commit_cycle<R>(
        &mut self,
        tags: Vec<String>,
        f: impl FnOnce(&mut Txn<'_>) -> EditorResult<R>,
    ) -> EditorResult<R> {
        let prev = Arc::clone(&self.state);
        let (value, outcome, removed) = {
            let mut txn = Txn::writable((*prev).clone(), &self.registry, &mut self.keys, tags);
            let value = f(&mut txn)?;
            loop {
                txn.run_nested()?;
                self.transforms
                    .run(&mut txn, self.config.max_transform_iterations)?;
                if !txn.has_nested() {
                    break;
                }
            }
            let removed = collect_garbage(&mut txn)?;
            txn.repair_selection()?;
            let outcome = txn.into_outcome().ok_or(EditorError::ReadOnlyViolation)?;
            (value, outcome, removed)
        };

        let TxnOutcome {
            state,
            mut dirty,
            tags,
            deferred,
        } = outcome;
        if dirty.is_empty() && state.selection == prev.selection {
            debug!("nothing changed, skipping commit");
            self.run_deferred(deferred)?;
            return Ok(value);
        }

        let next = Arc::new(state);
        self.state = Arc::clone(&next);
        let reconciled = self.reconcile_with(&prev, &next, &mut dirty);
        self.notify_mutations(&prev, &next, &dirty, &removed);
        let payload = UpdatePayload {
            prev_state: prev,
            next_state: next,
            dirty,
            tags,
            reconciled: reconciled.as_ref().ok().copied().flatten(),
        };
        self.notify_update(&payload);

        let deferred = self.run_deferred(deferred);
        reconciled?;
        deferred?;
        Ok(value)
    }

    fn run_deferred(&mut self, deferred: Vec<(Mutator, UpdateOptions)>) -> EditorResult<()> {
        for (mutator, options) in deferred {
            self.commit_cycle(options.tag.into_iter().collect(), mutator)?;
        }
        Ok(())
    }

    fn reconcile_with(
        &mut self,
        prev: &EditorState,
        next: &EditorState,
        dirty: &mut DirtySet,
    ) -> EditorResult<Option<ReconcileSummary>> {
        let Some(host) = self.host.as_deref_mut() else {
            return Ok(None);
        };
        if self.full_reconcile_pending {
            dirty.mark_full_reconcile();
        }
        let config = self.config.render_config();
        let summary = self.reconciler.reconcile(
            host,
            ReconcileInput {
                prev,
                next,
                dirty,
                registry: &self.registry,
                config: &config,
            },
        )?;
        self.full_reconcile_pending = false;
        Ok(Some(summary))
    }

    fn refresh_presentation(&mut self) -> EditorResult<Option<ReconcileSummary>> {
        let state = Arc::clone(&self.state);
        let mut dirty = DirtySet::full();
        self.reconcile_with(&state, &state, &mut dirty)
    }

    fn notify_update(&self, payload: &UpdatePayload) {
        for (_, listener) in &self.update_listeners {
            listener(payload);
        }
    }

    fn notify_mutations(&self, prev: &EditorState, next: &EditorState, dirty: &DirtySet, removed: &[NodeKey]) {
        if self.mutation_listeners.is_empty() {
            return;
        }
        let mut dirty_keys: Vec<&NodeKey> = dirty.keys().collect();
        dirty_keys.sort();
        dirty_keys.dedup();

        for (_, node_type, listener) in &self.mutation_listeners {
            let mut record = MutationRecord {
                node_type: node_type.to_string(),
                ..Default::default()
            };
            for key in &dirty_keys {
                let Some(node) = next.get(key) else {
                    continue;
                };
                if node.node_type() != &**node_type {
                    continue;
                }
                if !prev.nodes.contains(key) {
                    record.created.push((*key).clone());
                } else if !next.nodes.shares(&prev.nodes, key) {
                    record.updated.push((*key).clone());
                }
            }
            for key in removed {
                if prev.get(key).is_some_and(|node| node.node_type() == &**node_type) {
                    record.destroyed.push(key.clone());
                }
            }
            record.destroyed.sort();
            if !record.is_empty() {
                listener(&record);
            }
        }
    }

    /// Mount `host` and build the whole document in it.
    pub fn attach_host(&mut self, host: Box<dyn PresentationHost>) -> EditorResult<ReconcileSummary> {
        self.host = Some(host);
        self.reconciler.reset();
        self.full_reconcile_pending = true;
        let summary = self.refresh_presentation()?.unwrap_or_default();
        info!(created = summary.created, "attached presentation host");
        Ok(summary)
    }

    pub fn detach_host(&mut self) -> Option<Box<dyn PresentationHost>> {
        self.reconciler.reset();
        self.full_reconcile_pending = true;
        self.host.take()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Replace the committed state wholesale, e.g. after loading a document.
    pub fn set_editor_state(&mut self, state: impl Into<Arc<EditorState>>) -> EditorResult<()> {
        self.replace_state(state.into(), Vec::new())
    }

    pub fn set_editor_state_with_tag(
        &mut self,
        state: impl Into<Arc<EditorState>>,
        tag: impl Into<String>,
    ) -> EditorResult<()> {
        self.replace_state(state.into(), vec![tag.into()])
    }

    fn replace_state(&mut self, next: Arc<EditorState>, tags: Vec<String>) -> EditorResult<()> {
        self.flush()?;
        next.nodes.validate()?;
        for key in next.nodes.keys() {
            self.keys.observe(key);
        }
        let prev = std::mem::replace(&mut self.state, Arc::clone(&next));
        self.full_reconcile_pending = true;
        let mut dirty = DirtySet::full();
        let reconciled = self.reconcile_with(&prev, &next, &mut dirty);
        info!(nodes = next.nodes.len(), "replaced editor state");
        let payload = UpdatePayload {
            prev_state: prev,
            next_state: next,
            dirty,
            tags,
            reconciled: reconciled.as_ref().ok().copied().flatten(),
        };
        self.notify_update(&payload);
        reconciled.map(|_| ())
    }

    /// Parse serialized JSON into a state without installing it.
    pub fn parse_editor_state(&mut self, json: &str) -> EditorResult<EditorState> {
        Ok(EditorState::from_json(&self.registry, &mut self.keys, json)?)
    }

    pub fn export_document(&self, source: &str) -> EditorResult<SerializedDocument> {
        Ok(self.state.to_document(source)?)
    }

    pub fn to_json(&self, source: &str) -> EditorResult<String> {
        Ok(self.state.to_json(source)?)
    }

    /// Run `transform` for every intentionally dirty node of `node_type`
    /// before each commit.
    pub fn register_node_transform(
        &mut self,
        node_type: &str,
        transform: impl Fn(&mut Txn<'_>, &NodeKey) -> EditorResult<()> + 'static,
    ) -> EditorResult<ListenerId> {
        self.registry.require(node_type)?;
        let id = self.next_id();
        self.transforms.register(id, node_type, Rc::new(transform));
        Ok(id)
    }

    pub fn register_update_listener(&mut self, listener: impl Fn(&UpdatePayload) + 'static) -> ListenerId {
        let id = self.next_id();
        self.update_listeners.push((id, Rc::new(listener)));
        id
    }

    /// Called after each commit that created, changed or destroyed nodes of
    /// `node_type`. Wholesale state replacement does not report mutations.
    pub fn register_mutation_listener(
        &mut self,
        node_type: &str,
        listener: impl Fn(&MutationRecord) + 'static,
    ) -> EditorResult<ListenerId> {
        self.registry.require(node_type)?;
        let id = self.next_id();
        self.mutation_listeners
            .push((id, Arc::from(node_type), Rc::new(listener)));
        Ok(id)
    }

    pub fn register_command<P: 'static>(
        &mut self,
        command: Command<P>,
        priority: CommandPriority,
        handler: impl Fn(&mut Txn<'_>, &P) -> EditorResult<bool> + 'static,
    ) -> ListenerId {
        let id = self.next_id();
        self.commands
            .register(command.name(), id, priority, erase(command, handler));
        id
    }

    /// Run the handlers of `command` in one discrete transaction until one
    /// returns `true`. Returns whether any handler did.
    pub fn dispatch_command<P: 'static>(&mut self, command: Command<P>, payload: P) -> EditorResult<bool> {
        if !self.config.editable {
            warn!(command = command.name(), "editor is not editable, ignoring command");
            return Err(EditorError::ReadOnlyViolation);
        }
        let handlers = self.commands.handlers_for(command.name());
        if handlers.is_empty() {
            return Ok(false);
        }
        self.update_discrete(move |txn| {
            let payload: &dyn Any = &payload;
            for handler in &handlers {
                if handler(&mut *txn, payload)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    /// Unregister a transform, listener or command handler.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.update_listeners.len() + self.mutation_listeners.len();
        self.update_listeners.retain(|(listener, _)| *listener != id);
        self.mutation_listeners.retain(|(listener, _, _)| *listener != id);
        let removed = before != self.update_listeners.len() + self.mutation_listeners.len();
        let transform = self.transforms.unregister(id);
        let command = self.commands.unregister(id);
        removed || transform || command
    }

    /// Copy of the selected content of the committed state.
    pub fn clone_selection(&self) -> EditorResult<Option<ClonedContent>> {
        match &self.state.selection {
            Some(selection) => Ok(Some(clone_selected_content(&self.state, selection)?)),
            None => Ok(None),
        }
    }

    pub fn selection_to_html(&self) -> EditorResult<Option<String>> {
        match &self.state.selection {
            Some(selection) => Ok(Some(convert_selection_to_html(&self.state, selection)?)),
            None => Ok(None),
        }
    }
}
