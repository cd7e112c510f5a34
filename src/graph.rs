use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::action::Index;
use crate::error::{GroupingError, Result};
use crate::model::group::{Group, Solution};
use crate::model::roster::Roster;

/// Upper bound on path extensions tried from a single start node.
const SEARCH_BUDGET: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Finished,
    Claimed,
}

#[derive(Debug, Clone)]
struct Node {
    participant: Index,
    neighbors: Vec<Index>,
    color: Color,
    discovered: usize,
    finished: usize,
    parent: Option<Index>,
}

/// Directed "wants to be grouped with" graph over one shuffled roster order.
///
/// Node `k` stands for participant `order[k]`; edges point at node indices.
struct PreferenceGraph {
    nodes: Vec<Node>,
}

impl PreferenceGraph {
    fn new(roster: &Roster, order: &[Index]) -> PreferenceGraph {
        let mut node_of = vec![0; order.len()];
        for (node, &participant) in order.iter().enumerate() {
            node_of[participant] = node;
        }
        let nodes = order
            .iter()
            .map(|&participant| Node {
                participant,
                neighbors: roster
                    .preferences(participant)
                    .iter()
                    .map(|&target| node_of[target])
                    .collect(),
                color: Color::Unvisited,
                discovered: 0,
                finished: 0,
                parent: None,
            })
            .collect();
        PreferenceGraph { nodes }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Stamps discovery and finish times on every node.
    ///
    /// Iterative so that long preference chains cannot exhaust the stack. Only
    /// unvisited nodes are ever entered, which makes cycles harmless.
    fn depth_first(&mut self) {
        let mut time = 0;
        let mut stack: Vec<(Index, usize)> = Vec::new();
        for root in 0..self.len() {
            if self.nodes[root].color != Color::Unvisited {
                continue;
            }
            time += 1;
            self.enter(root, None, time);
            stack.push((root, 0));

            while let Some(&(u, cursor)) = stack.last() {
                match self.nodes[u].neighbors.get(cursor).copied() {
                    Some(v) => {
                        let top = stack.len() - 1;
                        stack[top].1 += 1;
                        if self.nodes[v].color == Color::Unvisited {
                            time += 1;
                            self.enter(v, Some(u), time);
                            stack.push((v, 0));
                        }
                    }
                    None => {
                        time += 1;
                        let node = &mut self.nodes[u];
                        node.finished = time;
                        node.color = Color::Finished;
                        stack.pop();
                    }
                }
            }
        }
        debug_assert!(self.nodes.iter().all(|node| node.discovered < node.finished));
    }

    /// Number of depth-first trees, i.e. nodes the search had to restart from.
    fn tree_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.parent.is_none()).count()
    }

    fn enter(&mut self, node: Index, parent: Option<Index>, time: usize) {
        let node = &mut self.nodes[node];
        node.color = Color::InProgress;
        node.discovered = time;
        node.parent = parent;
    }

    /// Node indices, latest discovered first.
    fn discovery_order(&self) -> Vec<Index> {
        (0..self.len())
            .sorted_by(|&a, &b| self.nodes[b].discovered.cmp(&self.nodes[a].discovered))
            .collect()
    }

    fn is_claimed(&self, node: Index) -> bool {
        self.nodes[node].color == Color::Claimed
    }

    fn claim(&mut self, members: &[Index]) {
        for &member in members {
            self.nodes[member].color = Color::Claimed;
        }
    }

    /// Every member of `candidate` must point at some member of it. `inside`
    /// marks exactly the candidate's nodes.
    fn is_connected(&self, candidate: &[Index], inside: &[bool]) -> bool {
        candidate
            .iter()
            .all(|&member| self.nodes[member].neighbors.iter().any(|&n| inside[n]))
    }

    /// Backtracking search for a simple path of exactly `size` unclaimed nodes
    /// starting at `start` that also passes [`Self::is_connected`].
    ///
    /// The path never grows past `size`, so `size` is the depth ceiling.
    fn find_group(&self, start: Index, size: usize) -> Option<Vec<Index>> {
        if size == 0 {
            return None;
        }
        let mut path = vec![start];
        let mut on_path = vec![false; self.len()];
        on_path[start] = true;
        if size == 1 {
            return self.is_connected(&path, &on_path).then_some(path);
        }
        let mut cursors = vec![0usize];
        let mut budget = SEARCH_BUDGET;

        while let Some(&top) = path.last() {
            let cursor = cursors.len() - 1;
            match self.nodes[top].neighbors.get(cursors[cursor]).copied() {
                Some(next) => {
                    cursors[cursor] += 1;
                    if on_path[next] || self.is_claimed(next) {
                        continue;
                    }
                    if budget == 0 {
                        return None;
                    }
                    budget -= 1;
                    path.push(next);
                    on_path[next] = true;
                    if path.len() < size {
                        cursors.push(0);
                    } else if self.is_connected(&path, &on_path) {
                        return Some(path);
                    } else {
                        path.pop();
                        on_path[next] = false;
                    }
                }
                None => {
                    path.pop();
                    cursors.pop();
                    on_path[top] = false;
                }
            }
        }
        None
    }
}

/// Builds one complete partition of `roster` into `group_count` groups.
///
/// Preference-connected groups of `n / group_count` members are grown first,
/// scanning nodes from the most recently discovered; whoever is left is packed
/// into fallback groups. Every group ends up with `n / group_count` or one more
/// member, and there are `min(group_count, n)` groups.
pub fn build_partition<R: Rng + ?Sized>(
    roster: &Roster,
    group_count: usize,
    rng: &mut R,
) -> Result<Solution> {
    build_partition_until(roster, group_count, rng, || false)
}

/// [`build_partition`] that polls `stop` before each start node. Once it
/// returns true the preference search ends and everyone still unclaimed goes
/// to fallback groups, so the result is complete either way.
pub fn build_partition_until<R, F>(
    roster: &Roster,
    group_count: usize,
    rng: &mut R,
    stop: F,
) -> Result<Solution>
where
    R: Rng + ?Sized,
    F: Fn() -> bool,
{
    if group_count == 0 {
        return Err(GroupingError::InvalidArgument(
            "group count must be positive".to_string(),
        ));
    }
    if roster.is_empty() {
        return Err(GroupingError::InvalidArgument(
            "cannot group an empty participant set".to_string(),
        ));
    }
    let n = roster.len();
    let base_size = n / group_count;
    let remainder = n % group_count;

    let mut order: Vec<Index> = (0..n).collect();
    order.shuffle(rng);
    let mut graph = PreferenceGraph::new(roster, &order);
    graph.depth_first();

    let mut groups: Vec<Vec<Index>> = Vec::with_capacity(group_count.min(n));
    if base_size > 0 {
        for start in graph.discovery_order() {
            if groups.len() == group_count || stop() {
                break;
            }
            if graph.is_claimed(start) {
                continue;
            }
            if let Some(candidate) = graph.find_group(start, base_size) {
                graph.claim(&candidate);
                groups.push(candidate);
            }
        }
    }
    let preference_groups = groups.len();

    let leftovers: Vec<Index> = (0..n).filter(|&node| !graph.is_claimed(node)).collect();
    graph.claim(&leftovers);
    let open = group_count - groups.len();
    let oversized = remainder.min(open);
    let mut rest = leftovers.into_iter();
    for slot in 0..open {
        let size = if slot < oversized { base_size + 1 } else { base_size };
        let chunk: Vec<Index> = rest.by_ref().take(size).collect();
        if chunk.is_empty() {
            break;
        }
        groups.push(chunk);
    }
    for node in rest {
        let smallest = groups
            .iter()
            .position_min_by_key(|group| group.len())
            .ok_or_else(|| GroupingError::InvariantViolation("no group to absorb into".to_string()))?;
        groups[smallest].push(node);
    }

    let solution = Solution::new(
        groups
            .into_iter()
            .map(|group| Group::new(group.into_iter().map(|node| graph.nodes[node].participant).collect()))
            .collect(),
    );
    solution.check_partition(n)?;
    debug!(
        participants = n,
        group_count,
        dfs_trees = graph.tree_count(),
        preference_groups,
        fallback_groups = solution.group_count() - preference_groups,
        "built initial partition"
    );
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::model::entity::Participant;

    fn people(edges: &[(&str, &[&str])]) -> Vec<Participant> {
        edges
            .iter()
            .map(|(id, prefs)| Participant::new(*id, *id).with_preferences(prefs.iter().copied()))
            .collect()
    }

    fn as_sets(solution: &Solution) -> BTreeSet<BTreeSet<Index>> {
        solution
            .groups
            .iter()
            .map(|group| group.members.iter().copied().collect())
            .collect()
    }

    #[test]
    fn depth_first_stamps_every_node_once() {
        let participants = people(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        let roster = Roster::new(&participants).unwrap();
        let mut graph = PreferenceGraph::new(&roster, &[0, 1, 2, 3]);
        graph.depth_first();

        let mut stamps: Vec<usize> = graph
            .nodes
            .iter()
            .flat_map(|node| [node.discovered, node.finished])
            .collect();
        stamps.sort_unstable();
        assert_eq!(stamps, (1..=8).collect::<Vec<_>>());
        assert!(graph.nodes.iter().all(|node| node.color == Color::Finished));
        assert!(graph.nodes.iter().all(|node| node.discovered < node.finished));
        assert_eq!(graph.nodes[1].parent, Some(0));
        assert_eq!(graph.nodes[2].parent, Some(1));
        assert_eq!(graph.nodes[0].parent, None);
        assert_eq!(graph.nodes[3].parent, None);
        assert_eq!(graph.discovery_order(), vec![3, 2, 1, 0]);
        assert_eq!(graph.tree_count(), 2);
    }

    #[test]
    fn depth_first_survives_long_chains() {
        let ids: Vec<String> = (0..20_000).map(|i| i.to_string()).collect();
        let participants: Vec<Participant> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let next = ids[(i + 1) % ids.len()].clone();
                Participant::new(id.clone(), id.clone()).with_preferences([next])
            })
            .collect();
        let roster = Roster::new(&participants).unwrap();
        let order: Vec<Index> = (0..ids.len()).collect();
        let mut graph = PreferenceGraph::new(&roster, &order);
        graph.depth_first();
        assert_eq!(graph.nodes[ids.len() - 1].discovered, ids.len());
    }

    #[test]
    fn connected_candidate_needs_an_inbound_edge_for_every_member() {
        let participants = people(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let roster = Roster::new(&participants).unwrap();
        let graph = PreferenceGraph::new(&roster, &[0, 1, 2]);
        assert!(!graph.is_connected(&[0, 1, 2], &[true, true, true]));
        assert!(graph.find_group(0, 3).is_none());
        assert!(graph.find_group(0, 2).is_none());
    }

    #[test]
    fn find_group_backtracks_past_dead_ends() {
        // a -> c is a dead end for size 2, a -> b closes the pair
        let participants = people(&[("a", &["c", "b"]), ("b", &["a"]), ("c", &[])]);
        let roster = Roster::new(&participants).unwrap();
        let graph = PreferenceGraph::new(&roster, &[0, 1, 2]);
        assert_eq!(graph.find_group(0, 2), Some(vec![0, 1]));
    }

    #[test]
    fn mutual_pairs_are_grouped_together() {
        let participants = people(&[
            ("1", &["2"]),
            ("2", &["1"]),
            ("3", &["4"]),
            ("4", &["3"]),
            ("5", &[]),
            ("6", &[]),
        ]);
        let roster = Roster::new(&participants).unwrap();
        let expected: BTreeSet<BTreeSet<Index>> =
            [[0, 1], [2, 3], [4, 5]].iter().map(|g| g.iter().copied().collect()).collect();
        for seed in 0..10 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let solution = build_partition(&roster, 3, &mut rng).unwrap();
            assert_eq!(as_sets(&solution), expected, "seed {seed}");
        }
    }

    #[test]
    fn preference_cycle_terminates_with_complete_partition() {
        let participants = people(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let roster = Roster::new(&participants).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        for group_count in 1..=3 {
            let solution = build_partition(&roster, group_count, &mut rng).unwrap();
            assert!(solution.check_partition(3).is_ok());
            assert_eq!(solution.group_count(), group_count);
        }
    }

    #[test]
    fn remainder_spreads_one_extra_member() {
        let ids: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        let participants: Vec<Participant> = (0..7)
            .map(|i| {
                Participant::new(ids[i].clone(), ids[i].clone())
                    .with_preferences([ids[(i + 1) % 7].clone(), ids[(i + 6) % 7].clone()])
            })
            .collect();
        let roster = Roster::new(&participants).unwrap();
        for seed in 0..10 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let solution = build_partition(&roster, 3, &mut rng).unwrap();
            let mut sizes = solution.group_sizes();
            sizes.sort_unstable();
            assert_eq!(sizes, vec![2, 2, 3]);
        }
    }

    #[test]
    fn stopped_search_still_yields_balanced_partition() {
        let participants = people(&[
            ("1", &["2"]),
            ("2", &["1"]),
            ("3", &["4"]),
            ("4", &["3"]),
            ("5", &[]),
        ]);
        let roster = Roster::new(&participants).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        let solution = build_partition_until(&roster, 2, &mut rng, || true).unwrap();
        assert!(solution.check_partition(5).is_ok());
        assert_eq!(solution.group_sizes(), vec![3, 2]);
    }

    #[test]
    fn single_member_group_needs_a_self_preference() {
        let participants = people(&[("a", &["a"]), ("b", &["a"])]);
        let roster = Roster::new(&participants).unwrap();
        let graph = PreferenceGraph::new(&roster, &[0, 1]);
        assert_eq!(graph.find_group(0, 1), Some(vec![0]));
        assert!(graph.find_group(1, 1).is_none());
    }

    #[test]
    fn more_groups_than_participants_gives_singletons() {
        let participants = people(&[("a", &["b"]), ("b", &["a"])]);
        let roster = Roster::new(&participants).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let solution = build_partition(&roster, 5, &mut rng).unwrap();
        assert_eq!(solution.group_sizes(), vec![1, 1]);
    }

    #[test]
    fn rejects_bad_arguments() {
        let participants = people(&[("a", &[])]);
        let roster = Roster::new(&participants).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            build_partition(&roster, 0, &mut rng),
            Err(GroupingError::InvalidArgument(_))
        ));

        let empty: Vec<Participant> = Vec::new();
        let roster = Roster::new(&empty).unwrap();
        assert!(matches!(
            build_partition(&roster, 2, &mut rng),
            Err(GroupingError::InvalidArgument(_))
        ));
    }
}
