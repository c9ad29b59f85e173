//! # Commands
//!
//! A command is a typed identifier. Handlers register for a command with a
//! priority; dispatching runs them inside one transaction, highest priority
//! first (registration order breaks ties), until one reports the command as
//! handled.

use crate::{EditorError, EditorResult, ListenerId, Txn};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tessera_model::TextFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    /// Built-in behaviour; anything else registered for the command wins.
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

/// Identifier of a command carrying a `P` payload.
pub struct Command<P> {
    name: &'static str,
    _payload: PhantomData<fn(P)>,
}

impl<P> Command<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Command<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Command<P> {}

impl<P> fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self.name)
    }
}

/// Type-erased handler; the payload is downcast back to the command's `P`.
pub type CommandHandler = Rc<dyn Fn(&mut Txn<'_>, &dyn Any) -> EditorResult<bool>>;

/// Insert text at the selection.
pub const INSERT_TEXT: Command<String> = Command::new("insert-text");
/// Delete one character; the payload is `true` for backward.
pub const DELETE_CHARACTER: Command<bool> = Command::new("delete-character");
/// Delete one word; the payload is `true` for backward.
pub const DELETE_WORD: Command<bool> = Command::new("delete-word");
/// Delete to the line edge; the payload is `true` for backward.
pub const DELETE_LINE: Command<bool> = Command::new("delete-line");
pub const FORMAT_TEXT: Command<TextFormat> = Command::new("format-text");
pub const INSERT_PARAGRAPH: Command<()> = Command::new("insert-paragraph");
pub const INSERT_LINE_BREAK: Command<()> = Command::new("insert-line-break");
pub const REMOVE_TEXT: Command<()> = Command::new("remove-text");

#[derive(Clone)]
struct Registered {
    id: ListenerId,
    priority: CommandPriority,
    handler: CommandHandler,
}

#[derive(Clone, Default)]
pub(crate) struct CommandRegistry {
    handlers: HashMap<&'static str, Vec<Registered>>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(name, handlers)| (name, handlers.len())))
            .finish()
    }
}

impl CommandRegistry {
    pub fn register(
        &mut self,
        name: &'static str,
        id: ListenerId,
        priority: CommandPriority,
        handler: CommandHandler,
    ) {
        self.handlers.entry(name).or_default().push(Registered {
            id,
            priority,
            handler,
        });
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let mut found = false;
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|registered| registered.id != id);
            found |= handlers.len() != before;
        }
        found
    }

    /// Handlers for `name`, in dispatch order.
    pub fn handlers_for(&self, name: &str) -> Vec<CommandHandler> {
        let Some(registered) = self.handlers.get(name) else {
            return Vec::new();
        };
        let mut ordered: Vec<&Registered> = registered.iter().collect();
        // Stable: equal priorities keep registration order.
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
            .into_iter()
            .map(|registered| Rc::clone(&registered.handler))
            .collect()
    }
}

/// Wrap a typed handler so it can be stored next to handlers of other commands.
pub(crate) fn erase<P: 'static>(
    command: Command<P>,
    handler: impl Fn(&mut Txn<'_>, &P) -> EditorResult<bool> + 'static,
) -> CommandHandler {
    let name = command.name();
    Rc::new(move |txn: &mut Txn<'_>, payload: &dyn Any| {
        let payload = payload
            .downcast_ref::<P>()
            .ok_or(EditorError::CommandPayload(name))?;
        handler(txn, payload)
    })
}

/// Default handlers for the built-in commands, at `Editor` priority.
pub(crate) fn builtin_handlers() -> Vec<(&'static str, CommandHandler)> {
    vec![
        (
            INSERT_TEXT.name(),
            erase(INSERT_TEXT, |txn: &mut Txn<'_>, text: &String| {
                txn.insert_text(text)?;
                Ok(true)
            }),
        ),
        (
            DELETE_CHARACTER.name(),
            erase(DELETE_CHARACTER, |txn: &mut Txn<'_>, backward: &bool| {
                txn.delete_character(*backward)?;
                Ok(true)
            }),
        ),
        (
            DELETE_WORD.name(),
            erase(DELETE_WORD, |txn: &mut Txn<'_>, backward: &bool| {
                txn.delete_word(*backward)?;
                Ok(true)
            }),
        ),
        (
            DELETE_LINE.name(),
            erase(DELETE_LINE, |txn: &mut Txn<'_>, backward: &bool| {
                txn.delete_line(*backward)?;
                Ok(true)
            }),
        ),
        (
            FORMAT_TEXT.name(),
            erase(FORMAT_TEXT, |txn: &mut Txn<'_>, flag: &TextFormat| {
                txn.format_text(*flag)?;
                Ok(true)
            }),
        ),
        (
            INSERT_PARAGRAPH.name(),
            erase(INSERT_PARAGRAPH, |txn: &mut Txn<'_>, _: &()| {
                txn.insert_paragraph()?;
                Ok(true)
            }),
        ),
        (
            INSERT_LINE_BREAK.name(),
            erase(INSERT_LINE_BREAK, |txn: &mut Txn<'_>, _: &()| {
                txn.insert_line_break()?;
                Ok(true)
            }),
        ),
        (
            REMOVE_TEXT.name(),
            erase(REMOVE_TEXT, |txn: &mut Txn<'_>, _: &()| {
                txn.remove_text()?;
                Ok(true)
            }),
        ),
    ]
}
