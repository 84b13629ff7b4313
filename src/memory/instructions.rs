//! General-scope instruction log
//!
//! Instructions are addressed by a stable [`InstructionId`], never by position:
//! commit appends, revert deletes by id, and the execution cursor always
//! moves to the first surviving id greater than the last one executed.

use std::fmt;
use std::rc::Rc;

use crate::ast::Stmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub u64);

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructionLog {
    entries: Vec<(InstructionId, Rc<Stmt>)>,
    next_id: u64,
    version: u64,
}

impl InstructionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn commit(&mut self, stmt: Stmt) -> InstructionId {
        let id = InstructionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Rc::new(stmt)));
        self.version += 1;
        id
    }

    /// Delete an instruction. Returns it if it existed.
    pub fn revert(&mut self, id: InstructionId) -> Option<Rc<Stmt>> {
        let pos = self.entries.iter().position(|(i, _)| *i == id)?;
        self.version += 1;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, id: InstructionId) -> Option<&Rc<Stmt>> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    /// The first instruction after `cursor` (or the first one overall)
    pub fn next_after(&self, cursor: Option<InstructionId>) -> Option<(InstructionId, Rc<Stmt>)> {
        self.entries
            .iter()
            .find(|(id, _)| cursor.map_or(true, |c| *id > c))
            .map(|(id, stmt)| (*id, Rc::clone(stmt)))
    }

    pub fn ids(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Bumped by every commit and revert
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
