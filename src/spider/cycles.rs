use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

/// Strongly connected components that contain a cycle.
#[derive(Debug, Clone)]
pub struct CycleReport<N> {
    /// Each component's members sorted; components sorted by their first member.
    pub components: Vec<Vec<N>>,
    /// Union of all components.
    pub nodes: HashSet<N>,
}

impl<N: Eq + Hash> CycleReport<N> {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.nodes.contains(node)
    }

    /// Whether `a` and `b` belong to the same cyclic component.
    pub fn same_component(&self, a: &N, b: &N) -> bool {
        self.components
            .iter()
            .any(|members| members.contains(a) && members.contains(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

struct Frame {
    node: NodeIndex,
    successors: Vec<NodeIndex>,
    next: usize,
}

/// Find every node that takes part in a directed cycle.
///
/// Iterative DFS with white/gray/black coloring and Tarjan low-link bookkeeping, so
/// deep import chains cannot overflow the stack. A component counts when it has more
/// than one member or a self-loop.
pub fn find_cycle_nodes<N>(edges: &[(N, N)]) -> CycleReport<N>
where
    N: Clone + Eq + Hash + Ord,
{
    let mut graph: StableDiGraph<N, ()> = StableDiGraph::new();
    let mut ids: HashMap<N, NodeIndex> = HashMap::new();
    for (from, to) in edges {
        let a = *ids
            .entry(from.clone())
            .or_insert_with(|| graph.add_node(from.clone()));
        let b = *ids.entry(to.clone()).or_insert_with(|| graph.add_node(to.clone()));
        if graph.find_edge(a, b).is_none() {
            graph.add_edge(a, b, ());
        }
    }

    let count = graph.node_count();
    let mut color = vec![Color::White; count];
    let mut index = vec![0usize; count];
    let mut low = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<NodeIndex> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<N>> = Vec::new();

    let roots: Vec<NodeIndex> = graph.node_indices().collect();
    for root in roots {
        if color[root.index()] != Color::White {
            continue;
        }

        let mut call_stack: Vec<Frame> = Vec::new();
        enter(root, &mut color, &mut index, &mut low, &mut next_index);
        stack.push(root);
        on_stack[root.index()] = true;
        call_stack.push(frame(root, &graph));

        while let Some(top) = call_stack.last_mut() {
            let v = top.node;
            if let Some(&w) = top.successors.get(top.next) {
                top.next += 1;
                match color[w.index()] {
                    Color::White => {
                        enter(w, &mut color, &mut index, &mut low, &mut next_index);
                        stack.push(w);
                        on_stack[w.index()] = true;
                        call_stack.push(frame(w, &graph));
                    }
                    Color::Gray | Color::Black if on_stack[w.index()] => {
                        low[v.index()] = low[v.index()].min(index[w.index()]);
                    }
                    _ => {}
                }
                continue;
            }

            call_stack.pop();
            color[v.index()] = Color::Black;
            if let Some(parent) = call_stack.last() {
                let p = parent.node.index();
                low[p] = low[p].min(low[v.index()]);
            }

            if low[v.index()] == index[v.index()] {
                let mut members = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w.index()] = false;
                    members.push(w);
                    if w == v {
                        break;
                    }
                }
                let cyclic = members.len() > 1 || graph.find_edge(v, v).is_some();
                if cyclic {
                    let mut names: Vec<N> = members.iter().map(|&m| graph[m].clone()).collect();
                    names.sort();
                    components.push(names);
                }
            }
        }
    }

    components.sort();
    let nodes = components.iter().flatten().cloned().collect();
    CycleReport { components, nodes }
}

fn enter(
    node: NodeIndex,
    color: &mut [Color],
    index: &mut [usize],
    low: &mut [usize],
    next_index: &mut usize,
) {
    color[node.index()] = Color::Gray;
    index[node.index()] = *next_index;
    low[node.index()] = *next_index;
    *next_index += 1;
}

fn frame<N>(node: NodeIndex, graph: &StableDiGraph<N, ()>) -> Frame {
    let mut successors: Vec<NodeIndex> = graph.neighbors(node).collect();
    // `neighbors` yields the most recent edge first.
    successors.reverse();
    Frame {
        node,
        successors,
        next: 0,
    }
}
