//! Pipelined command scheduling
//!
//! Commands are queued together with an opaque tag naming the party that
//! wants the reply. When the server advertised PIPELINING, consecutive
//! pipelinable commands are written as one group and flushed once; the
//! replies are then drained in issue order and paired with their tags.
//! Synchronization points (and every command when PIPELINING was not
//! advertised) form groups of one.

use std::fmt::Display;

use crate::commands::is_pipelinable;

pub(crate) struct Pending<T> {
    pub(crate) text: String,
    pub(crate) tag: T,
    pub(crate) pipelinable: bool,
}

/// FIFO of commands waiting to be issued
pub(crate) struct CommandQueue<T> {
    items: Vec<Pending<T>>,
}

impl<T> CommandQueue<T> {
    pub(crate) fn new() -> CommandQueue<T> {
        CommandQueue { items: Vec::new() }
    }

    /// Appends a command; its batching class is derived from the verb
    pub(crate) fn push<C: Display>(&mut self, command: C, tag: T) {
        let text = command.to_string();
        let pipelinable = is_pipelinable(&text);
        self.items.push(Pending {
            text,
            tag,
            pipelinable,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Splits the queue into wire groups.
    ///
    /// With pipelining, a group is a maximal run of pipelinable commands,
    /// or a single synchronization point. Without it, every command is its
    /// own group.
    pub(crate) fn into_groups(self, pipelining: bool) -> Vec<Vec<Pending<T>>> {
        let mut groups: Vec<Vec<Pending<T>>> = Vec::new();

        for item in self.items {
            let start_group = match groups.last() {
                Some(group) => {
                    !pipelining || !item.pipelinable || !group.last().unwrap().pipelinable
                }
                None => true,
            };
            if start_group {
                groups.push(Vec::new());
            }
            groups.last_mut().unwrap().push(item);
        }

        groups
    }
}
