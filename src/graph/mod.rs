//! # Navigation Graph
//!
//! Adjacency-list graph over dense state ids. Built once from trial
//! configuration and immutable afterwards.
//!
//! Adjacency is stored per state, in configuration order. The order is
//! observable: rendering and "first successor" affordances depend on it.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::StateId;
use crate::{Error, Result};

type Successors = SmallVec<[StateId; 4]>;

/// Directed adjacency list. Logically undirected graphs list each edge
/// from both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<StateId>>", into = "Vec<Vec<StateId>>")]
pub struct Graph {
    adjacency: Vec<Successors>,
}

/// Options for [`Graph::bfs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BfsOptions {
    /// Randomize successor exploration order at every node.
    pub shuffle_successors: bool,
}

impl Graph {
    /// Build a graph, rejecting successor ids outside `0..N`.
    pub fn new(adjacency: Vec<Vec<StateId>>) -> Result<Self> {
        let n = adjacency.len();
        for (state, succ) in adjacency.iter().enumerate() {
            if let Some(bad) = succ.iter().find(|s| s.index() >= n) {
                return Err(Error::InvalidGraph(format!(
                    "state {state} lists successor {bad}, but the graph has {n} states"
                )));
            }
        }
        Ok(Self {
            adjacency: adjacency.into_iter().map(SmallVec::from_vec).collect(),
        })
    }

    /// Convenience constructor from raw indices.
    pub fn from_lists<I, J>(lists: I) -> Result<Self>
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = usize>,
    {
        Self::new(
            lists
                .into_iter()
                .map(|l| l.into_iter().map(StateId).collect())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn contains(&self, state: StateId) -> bool {
        state.index() < self.adjacency.len()
    }

    /// All states, `0..N`.
    pub fn states(&self) -> impl ExactSizeIterator<Item = StateId> + '_ {
        (0..self.adjacency.len()).map(StateId)
    }

    /// Outgoing neighbors in configuration order. Unknown states have none.
    pub fn successors(&self, state: StateId) -> &[StateId] {
        self.adjacency
            .get(state.index())
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_successor(&self, from: StateId, to: StateId) -> bool {
        self.successors(from).contains(&to)
    }

    /// Undirected edge pairs `(a, b)` with `a < b`, one per rendered edge.
    pub fn edge_pairs(&self) -> impl Iterator<Item = (StateId, StateId)> + '_ {
        self.states().flat_map(move |s| {
            self.successors(s)
                .iter()
                .filter(move |succ| s < **succ)
                .map(move |succ| (s, *succ))
        })
    }

    /// Shortest path from `start` to `goal`, both included.
    pub fn bfs(&self, start: StateId, goal: StateId, options: BfsOptions) -> Result<Vec<StateId>> {
        self.bfs_with_rng(start, goal, options, &mut rand::thread_rng())
    }

    /// [`Graph::bfs`] with a caller-supplied RNG for the shuffle.
    pub fn bfs_with_rng<R: Rng + ?Sized>(
        &self,
        start: StateId,
        goal: StateId,
        options: BfsOptions,
        rng: &mut R,
    ) -> Result<Vec<StateId>> {
        for s in [start, goal] {
            if !self.contains(s) {
                return Err(Error::InvalidGraph(format!(
                    "state {s} is not in a graph of {} states",
                    self.len()
                )));
            }
        }

        let mut parent: Vec<Option<StateId>> = vec![None; self.len()];
        let mut seen = vec![false; self.len()];
        let mut queue = VecDeque::from([start]);
        seen[start.index()] = true;

        while let Some(tip) = queue.pop_front() {
            if tip == goal {
                let mut path = vec![goal];
                let mut cur = goal;
                while let Some(p) = parent[cur.index()] {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Ok(path);
            }

            let mut next: Successors = self.successors(tip).iter().copied().collect();
            if options.shuffle_successors {
                next.shuffle(rng);
            }
            for succ in next {
                if !seen[succ.index()] {
                    seen[succ.index()] = true;
                    parent[succ.index()] = Some(tip);
                    queue.push_back(succ);
                }
            }
        }

        Err(Error::NoPath { start, goal })
    }
}

impl TryFrom<Vec<Vec<StateId>>> for Graph {
    type Error = Error;

    fn try_from(adjacency: Vec<Vec<StateId>>) -> Result<Self> {
        Self::new(adjacency)
    }
}

impl From<Graph> for Vec<Vec<StateId>> {
    fn from(graph: Graph) -> Self {
        graph.adjacency.into_iter().map(|s| s.into_vec()).collect()
    }
}
