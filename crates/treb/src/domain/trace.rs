//! C6 — trace extractor.
//!
//! Extracts, for each hydrated transaction, the one matching subtree from
//! the shared call-trace arena the script emits per scope.

use {
    crate::domain::transaction::Transaction,
    alloy_primitives::{Address, Bytes, address},
    std::collections::HashSet,
};

/// `vm.prank`'s well-known cheatcode address.
pub const VM_CHEATCODE_ADDRESS: Address = address!("7109709ECfa91a80626fF3989D68f67F5b1DD12D");
/// `vm.prank(address)` selector.
pub const VM_PRANK_SELECTOR: [u8; 4] = [0xca, 0x66, 0x9f, 0xa7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
    Create,
    Create2,
    Other,
}

#[derive(Debug, Clone)]
pub struct CallInfo {
    pub kind: CallKind,
    pub caller: Address,
    pub address: Address,
    pub data: Bytes,
    pub value: alloy_primitives::U256,
}

#[derive(Debug, Clone)]
pub struct TraceNode {
    pub idx: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub trace: CallInfo,
    pub logs: Vec<crate::domain::event::RawLog>,
}

/// The full monolithic arena as emitted for one scope. Node `idx`s are
/// array indices; `parent`/`children` reference other entries by `idx`.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    pub nodes: Vec<TraceNode>,
}

impl Arena {
    /// Returns the pranked caller for `node`, if its immediate predecessor
    /// within the same parent is a `vm.prank(address)` call on the
    /// cheatcode address. This is the only lookahead the extractor performs
    /// within the same parent.
    fn node(&self, idx: usize) -> Option<&TraceNode> {
        self.nodes.iter().find(|n| n.idx == idx)
    }

    fn pranked_caller(&self, node: &TraceNode) -> Option<Address> {
        let siblings: Vec<usize> = match node.parent {
            Some(parent) => self.node(parent)?.children.clone(),
            None => self
                .nodes
                .iter()
                .filter(|n| n.parent.is_none())
                .map(|n| n.idx)
                .collect(),
        };
        let position = siblings.iter().position(|i| *i == node.idx)?;
        let predecessor_idx = *siblings.get(position.checked_sub(1)?)?;
        let predecessor = self.nodes.iter().find(|n| n.idx == predecessor_idx)?;
        if predecessor.trace.kind != CallKind::Call {
            return None;
        }
        if predecessor.trace.address != VM_CHEATCODE_ADDRESS {
            return None;
        }
        let data = &predecessor.trace.data;
        if data.len() < 4 + 32 || data[..4] != VM_PRANK_SELECTOR {
            return None;
        }
        Some(Address::from_slice(&data[4 + 12..4 + 32]))
    }

    fn matches(&self, node: &TraceNode, tx: &Transaction) -> bool {
        let kind_matches = matches!(
            node.trace.kind,
            CallKind::Call | CallKind::Create | CallKind::Create2
        );
        if !kind_matches {
            return false;
        }
        if node.trace.kind == CallKind::Call && node.trace.address != tx.to {
            return false;
        }
        if node.trace.data != tx.data {
            return false;
        }
        if node.trace.caller == tx.sender {
            return true;
        }
        self.pranked_caller(node) == Some(tx.sender)
    }

    /// Clones the subtree reachable from `root`, renumbering indices
    /// densely starting at 0.
    fn extract_subtree(&self, root: usize) -> TraceNode {
        fn collect(arena: &Arena, idx: usize, out: &mut Vec<TraceNode>) -> usize {
            let node = arena.nodes.iter().find(|n| n.idx == idx).expect("valid idx");
            let new_idx = out.len();
            out.push(TraceNode {
                idx: new_idx,
                parent: None, // filled in below for non-roots
                children: vec![],
                trace: node.trace.clone(),
                logs: node.logs.clone(),
            });
            let mut child_indices = vec![];
            for &child in &node.children {
                let child_new_idx = collect(arena, child, out);
                out[child_new_idx].parent = Some(new_idx);
                child_indices.push(child_new_idx);
            }
            out[new_idx].children = child_indices;
            new_idx
        }
        let mut flattened = vec![];
        collect(self, root, &mut flattened);
        // Root is always index 0 after the recursive collection above.
        flattened.swap_remove(0)
    }

    /// Matches and extracts subtrees for each transaction in `transactions`,
    /// DFS order, first-unmatched-wins; each transaction matches at most
    /// once and matched nodes are reserved so later transactions skip them.
    pub fn extract_for(&self, transactions: &mut [Transaction]) {
        let roots: Vec<usize> = self
            .nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| n.idx)
            .collect();
        let mut dfs_order = vec![];
        for root in roots {
            self.dfs(root, &mut dfs_order);
        }

        let mut reserved: HashSet<usize> = HashSet::new();
        for tx in transactions.iter_mut() {
            for &idx in &dfs_order {
                if reserved.contains(&idx) {
                    continue;
                }
                let node = self.nodes.iter().find(|n| n.idx == idx).unwrap();
                if self.matches(node, tx) {
                    reserved.insert(idx);
                    tx.trace_subtree = Some(self.extract_subtree(idx));
                    break;
                }
            }
        }
    }

    fn dfs(&self, idx: usize, out: &mut Vec<usize>) {
        out.push(idx);
        let node = self.nodes.iter().find(|n| n.idx == idx).unwrap();
        for &child in &node.children {
            self.dfs(child, out);
        }
    }
}
