//! Arena-backed instruction list for one basic block.
//!
//! Nodes live in a `Vec` and link to each other by [`NodeId`]. A node is either linked into the
//! list or detached (fresh from [`BlockModel::clone_node`], or unlinked by `replace`/`remove`).
//! Slots are never freed, so a handle stays valid for the life of the model.

use core::fmt;

use remopt_protocol::{InstructionDelta, InstructionRecord, PatchDelta, PatchEntry, PatchSet};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("{0} does not belong to this block")]
    UnknownNode(NodeId),

    #[error("{0} is not linked into the list")]
    NotLinked(NodeId),

    #[error("{0} is already linked into the list")]
    AlreadyLinked(NodeId),

    #[error("opcode {opcode} is not a direct conditional branch")]
    NotBranch { opcode: i32 },
}

pub type Result<T, E = BlockError> = core::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct Node {
    record: InstructionRecord,
    original_index: u32,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    linked: bool,
}

impl Node {
    pub fn record(&self) -> &InstructionRecord {
        &self.record
    }

    /// Arrival position of the instruction this node was cloned from. Never changes.
    pub fn original_index(&self) -> u32 {
        self.original_index
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockModel {
    originals: Vec<InstructionRecord>,
    nodes: Vec<Node>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    fallthrough: Option<u64>,
}

impl BlockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(instructions: usize) -> Self {
        Self {
            originals: Vec::with_capacity(instructions),
            nodes: Vec::with_capacity(instructions),
            ..Self::default()
        }
    }

    pub fn from_records<I: IntoIterator<Item = InstructionRecord>>(records: I) -> Self {
        let mut block = Self::new();
        for record in records {
            block.push_original(record);
        }
        block
    }

    /// Record the next arriving instruction and link it at the tail.
    pub fn push_original(&mut self, record: InstructionRecord) -> NodeId {
        let original_index = self.originals.len() as u32;
        self.originals.push(record.clone());
        let id = self.alloc(record, original_index);
        self.link_tail(id);
        id
    }

    pub fn originals(&self) -> &[InstructionRecord] {
        &self.originals
    }

    pub fn original(&self, index: u32) -> Option<&InstructionRecord> {
        self.originals.get(index as usize)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(BlockError::UnknownNode(id))
    }

    pub fn record_mut(&mut self, id: NodeId) -> Result<&mut InstructionRecord> {
        self.node_mut(id).map(|node| &mut node.record)
    }

    /// Deep copy of `id`'s current record, carrying the same original index. The copy starts
    /// detached.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.node(id)?;
        let (record, original_index) = (node.record.clone(), node.original_index);
        Ok(self.alloc(record, original_index))
    }

    pub fn append(&mut self, id: NodeId) -> Result<()> {
        self.ensure_detached(id)?;
        self.link_tail(id);
        Ok(())
    }

    /// Splice detached `id` directly after linked `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, id: NodeId) -> Result<()> {
        if !self.node(anchor)?.linked {
            return Err(BlockError::NotLinked(anchor));
        }
        self.ensure_detached(id)?;

        let after = self.nodes[anchor.0 as usize].next;
        {
            let node = &mut self.nodes[id.0 as usize];
            node.prev = Some(anchor);
            node.next = after;
            node.linked = true;
        }
        self.nodes[anchor.0 as usize].next = Some(id);
        match after {
            Some(next) => self.nodes[next.0 as usize].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        Ok(())
    }

    /// Put detached `new` where linked `old` is. Returns `old`, now detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<NodeId> {
        if !self.node(old)?.linked {
            return Err(BlockError::NotLinked(old));
        }
        self.ensure_detached(new)?;

        let (prev, next) = {
            let node = &mut self.nodes[old.0 as usize];
            let links = (node.prev.take(), node.next.take());
            node.linked = false;
            links
        };
        {
            let node = &mut self.nodes[new.0 as usize];
            node.prev = prev;
            node.next = next;
            node.linked = true;
        }
        match prev {
            Some(p) => self.nodes[p.0 as usize].next = Some(new),
            None => self.head = Some(new),
        }
        match next {
            Some(n) => self.nodes[n.0 as usize].prev = Some(new),
            None => self.tail = Some(new),
        }
        Ok(old)
    }

    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if !self.node(id)?.linked {
            return Err(BlockError::NotLinked(id));
        }
        let (prev, next) = {
            let node = &mut self.nodes[id.0 as usize];
            let links = (node.prev.take(), node.next.take());
            node.linked = false;
            links
        };
        match prev {
            Some(p) => self.nodes[p.0 as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.0 as usize].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        Ok(())
    }

    pub fn first(&self) -> Option<NodeId> {
        self.head
    }

    pub fn last(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.next)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.prev)
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            block: self,
            cursor: self.head,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.next(id);
            Some(id)
        })
    }

    /// Replacement fallthrough target; `None` leaves the client's alone.
    pub fn fallthrough(&self) -> Option<u64> {
        self.fallthrough
    }

    pub fn set_fallthrough(&mut self, fallthrough: Option<u64>) {
        self.fallthrough = fallthrough;
    }

    /// Address following the last original instruction.
    pub fn end_address(&self) -> Option<u64> {
        self.originals.last().and_then(InstructionRecord::end_address)
    }

    /// Discard every edit: one untouched node per original, in arrival order.
    pub fn restore_original(&mut self) {
        let originals = core::mem::take(&mut self.originals);
        *self = Self::from_records(originals);
    }

    /// Current list contents.
    pub fn records(&self) -> Vec<InstructionRecord> {
        self.iter().map(|node| node.record.clone()).collect()
    }

    /// Describe the current list as edits of the originals, one entry per linked node.
    pub fn patch_set(&self) -> PatchSet {
        self.iter()
            .map(|node| {
                let original = &self.originals[node.original_index as usize];
                match diff(&node.record, original) {
                    None => PatchEntry::clean(node.original_index),
                    Some(delta) => PatchEntry::with_delta(node.original_index, delta),
                }
            })
            .collect()
    }

    fn alloc(&mut self, record: InstructionRecord, original_index: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            record,
            original_index,
            prev: None,
            next: None,
            linked: false,
        });
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or(BlockError::UnknownNode(id))
    }

    fn ensure_detached(&self, id: NodeId) -> Result<()> {
        if self.node(id)?.linked {
            return Err(BlockError::AlreadyLinked(id));
        }
        Ok(())
    }

    fn link_tail(&mut self, id: NodeId) {
        let prev = self.tail;
        {
            let node = &mut self.nodes[id.0 as usize];
            node.prev = prev;
            node.next = None;
            node.linked = true;
        }
        match prev {
            Some(p) => self.nodes[p.0 as usize].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }
}

// Records can only diverge from their original in address, opcode and sources.
fn diff(current: &InstructionRecord, original: &InstructionRecord) -> Option<PatchDelta> {
    if current == original {
        return None;
    }
    let instruction = (current.address() != original.address()
        || current.opcode() != original.opcode())
    .then(|| InstructionDelta {
        address: current.address(),
        opcode: current.opcode(),
    });
    let sources = current
        .sources()
        .iter()
        .zip(original.sources())
        .map(|(now, was)| (now != was).then_some(*now))
        .collect();
    Some(PatchDelta {
        instruction,
        sources,
    })
}

pub struct Iter<'a> {
    block: &'a BlockModel,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.block.get(self.cursor?)?;
        self.cursor = node.next;
        Some(node)
    }
}

impl<'a> IntoIterator for &'a BlockModel {
    type Item = &'a Node;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
