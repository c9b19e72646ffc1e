use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use petgraph::Direction;

// link index -> link index, parent to child
pub(super) type LinkGraph = DiGraphMap<usize, ()>;

// breadth-first link order from `root`, every parent before its children
pub(super) fn bfs(graph: &LinkGraph, root: usize) -> Vec<usize> {
    let mut visit = Bfs::new(graph, root);
    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(link) = visit.next(graph) {
        order.push(link);
    }
    order
}

// nodes without a parent, in ascending order
pub(super) fn roots(graph: &LinkGraph) -> Vec<usize> {
    let mut roots = graph
        .nodes()
        .filter(|n| {
            graph
                .neighbors_directed(*n, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect::<Vec<_>>();
    roots.sort_unstable();
    roots
}

pub(super) fn parent(graph: &LinkGraph, node: usize) -> Option<usize> {
    graph.neighbors_directed(node, Direction::Incoming).next()
}
