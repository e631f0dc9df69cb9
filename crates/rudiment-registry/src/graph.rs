//! Dependency graph construction and ordering

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{ComponentDescriptor, ComponentId, RegistryError, Result};

struct Node {
    descriptor: ComponentDescriptor,
    /// Indices of the nodes this node depends on
    dependencies: Vec<usize>,
}

/// Graph of selected implementations, one node per identity
///
/// Edges point from an implementation to the identities it depends on.
/// Node indices follow declaration order (the position at which an identity
/// first appeared), which is also the tie-break of the topological sort.
pub struct DependencyGraph {
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Select one implementation per identity and validate every edge
    ///
    /// Inactive descriptors (condition evaluated to false) are dropped before
    /// candidate selection.
    pub fn build(descriptors: Vec<ComponentDescriptor>) -> Result<Self> {
        let mut groups: Vec<(ComponentId, Vec<ComponentDescriptor>)> = Vec::new();
        let mut group_index: HashMap<ComponentId, usize> = HashMap::new();

        for mut descriptor in descriptors {
            if !descriptor.take_condition() {
                debug!(
                    "Skipping inactive component {}",
                    descriptor.implementation()
                );
                continue;
            }

            let id = descriptor.id();
            let slot = *group_index.entry(id).or_insert_with(|| {
                groups.push((id, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(descriptor);
        }

        let mut selected = Vec::with_capacity(groups.len());
        for (id, candidates) in groups {
            selected.push(select_primary(id, candidates)?);
        }

        let mut nodes = Vec::with_capacity(selected.len());
        for descriptor in selected {
            let mut dependencies = Vec::with_capacity(descriptor.dependencies().len());
            for dependency in descriptor.dependencies() {
                let index = group_index.get(dependency).copied().ok_or_else(|| {
                    RegistryError::MissingDependency {
                        component: descriptor.implementation().to_string(),
                        dependency: dependency.name().to_string(),
                    }
                })?;
                dependencies.push(index);
            }
            nodes.push(Node {
                descriptor,
                dependencies,
            });
        }

        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identities in declaration order
    pub fn identities(&self) -> Vec<ComponentId> {
        self.nodes.iter().map(|node| node.descriptor.id()).collect()
    }

    /// Initialization order: every identity appears after all of its dependencies
    pub fn topological_order(&self) -> Result<Vec<ComponentId>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .map(|index| self.nodes[index].descriptor.id())
            .collect())
    }

    /// Consume the graph, yielding descriptors in initialization order
    pub(crate) fn into_ordered(self) -> Result<Vec<ComponentDescriptor>> {
        let order = self.sorted_indices()?;
        let mut slots: Vec<Option<ComponentDescriptor>> = self
            .nodes
            .into_iter()
            .map(|node| Some(node.descriptor))
            .collect();

        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }

    /// Kahn's algorithm; the ready set is ordered so the lowest declaration
    /// index is always taken first
    fn sorted_indices(&self) -> Result<Vec<usize>> {
        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.dependencies.len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for &dependency in &node.dependencies {
                dependents[dependency].push(index);
            }
        }

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| index)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(RegistryError::CyclicDependency {
                cycle: self.find_cycle(&remaining),
            });
        }

        Ok(order)
    }

    /// Walk unresolved edges from the first blocked node until a node repeats
    ///
    /// Every blocked node still has at least one blocked dependency, so the
    /// walk always closes a cycle.
    fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
        let blocked = |index: usize| remaining[index] > 0;
        let Some(start) = (0..self.nodes.len()).find(|&index| blocked(index)) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&next) = self.nodes[current]
                .dependencies
                .iter()
                .find(|&&dependency| blocked(dependency))
            else {
                break;
            };

            if let Some(position) = path.iter().position(|&visited| visited == next) {
                let mut cycle: Vec<String> = path[position..]
                    .iter()
                    .map(|&index| self.nodes[index].descriptor.implementation().to_string())
                    .collect();
                cycle.push(self.nodes[next].descriptor.implementation().to_string());
                return cycle;
            }

            path.push(next);
            current = next;
        }

        path.iter()
            .map(|&index| self.nodes[index].descriptor.implementation().to_string())
            .collect()
    }
}

fn select_primary(
    id: ComponentId,
    mut candidates: Vec<ComponentDescriptor>,
) -> Result<ComponentDescriptor> {
    if candidates.len() == 1 {
        return Ok(candidates.remove(0));
    }

    let primaries = candidates.iter().filter(|c| c.is_primary()).count();
    if primaries != 1 {
        return Err(RegistryError::AmbiguousComponent {
            identity: id.name().to_string(),
            candidates: candidates
                .iter()
                .map(|c| c.implementation().to_string())
                .collect(),
            primaries,
        });
    }

    let position = candidates
        .iter()
        .position(|c| c.is_primary())
        .unwrap_or_default();
    let chosen = candidates.swap_remove(position);
    debug!(
        "Selected primary {} for {} over {} other candidate(s)",
        chosen.implementation(),
        id,
        candidates.len()
    );
    Ok(chosen)
}
