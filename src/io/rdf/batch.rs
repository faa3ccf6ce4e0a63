//! Grouping of serialized statements into per-graph batches.
//!
//! A group is flushed when it reaches `max_statements`. When a statement for a
//! new graph arrives while `max_graphs` groups are already open, the largest
//! open group is flushed first (the earliest opened wins a tie). Every
//! statement ends up in exactly one batch.

use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub graph: String,
    pub statements: Vec<String>,
}

#[derive(Debug)]
pub struct GraphBatcher {
    max_statements: usize,
    max_graphs: usize,
    /// Open groups in the order they were opened.
    open: Vec<Batch>,
    ready: VecDeque<Batch>,
}

impl GraphBatcher {
    pub fn new(max_statements: usize, max_graphs: usize) -> Self {
        Self {
            max_statements: max_statements.max(1),
            max_graphs: max_graphs.max(1),
            open: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn push(&mut self, graph: &str, statement: String) {
        let idx = match self.open.iter().position(|b| b.graph == graph) {
            Some(i) => i,
            None => {
                if self.open.len() >= self.max_graphs {
                    self.evict_largest();
                }
                self.open.push(Batch {
                    graph: graph.to_string(),
                    statements: Vec::new(),
                });
                self.open.len() - 1
            }
        };
        self.open[idx].statements.push(statement);
        if self.open[idx].statements.len() >= self.max_statements {
            let full = self.open.remove(idx);
            self.ready.push_back(full);
        }
    }

    fn evict_largest(&mut self) {
        let largest = self
            .open
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, b)| b.statements.len())
            .map(|(i, _)| i);
        if let Some(i) = largest {
            let batch = self.open.remove(i);
            tracing::trace!(graph = %batch.graph, size = batch.statements.len(), "evicting largest graph group");
            self.ready.push_back(batch);
        }
    }

    /// Move every open group to the ready queue.
    pub fn finish(&mut self) {
        self.ready.extend(self.open.drain(..));
    }

    pub fn next_ready(&mut self) -> Option<Batch> {
        self.ready.pop_front()
    }

    pub fn open_groups(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(b: &mut GraphBatcher) -> Vec<(String, usize)> {
        std::iter::from_fn(|| b.next_ready())
            .map(|batch| (batch.graph, batch.statements.len()))
            .collect()
    }

    #[test]
    fn single_graph_batches_by_size() {
        let mut b = GraphBatcher::new(100, 100);
        for i in 0..250 {
            b.push("g", format!("t{i}"));
        }
        b.finish();
        let sizes: Vec<_> = drain(&mut b).into_iter().map(|(_, n)| n).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn evicts_largest_group_when_too_many_graphs_open() {
        let mut b = GraphBatcher::new(10, 2);
        b.push("a", "1".into());
        b.push("b", "2".into());
        b.push("b", "3".into());
        b.push("c", "4".into());
        assert_eq!(drain(&mut b), vec![("b".to_string(), 2)]);
        assert_eq!(b.open_groups(), 2);
        b.finish();
        assert_eq!(
            drain(&mut b),
            vec![("a".to_string(), 1), ("c".to_string(), 1)]
        );
        assert!(b.is_empty());
    }

    #[test]
    fn tie_goes_to_earliest_group() {
        let mut b = GraphBatcher::new(10, 2);
        b.push("a", "1".into());
        b.push("b", "2".into());
        b.push("c", "3".into());
        assert_eq!(drain(&mut b), vec![("a".to_string(), 1)]);
    }
}
