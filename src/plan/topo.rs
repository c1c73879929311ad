// ABOUTME: Stable topological ordering of catalog stacks.
// ABOUTME: Kahn's algorithm that always emits the earliest ready stack in declaration order.

use std::collections::HashMap;

use super::PlanError;
use crate::catalog::StackDefinition;

/// Order `stacks` so every dependency precedes its dependents.
///
/// Among stacks whose dependencies are all emitted, the one declared first
/// goes next. Every referenced stack must be present in `stacks`.
pub(crate) fn stable_order(stacks: &[StackDefinition]) -> Result<Vec<usize>, PlanError> {
    let index: HashMap<_, _> = stacks
        .iter()
        .enumerate()
        .map(|(i, stack)| (&stack.name, i))
        .collect();

    let deps: Vec<Vec<usize>> = stacks
        .iter()
        .map(|stack| {
            stack
                .depends_on()
                .iter()
                .filter_map(|name| index.get(name).copied())
                .collect()
        })
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stacks.len()];
    for (i, stack_deps) in deps.iter().enumerate() {
        for &dep in stack_deps {
            dependents[dep].push(i);
        }
    }

    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut emitted = vec![false; stacks.len()];
    let mut order = Vec::with_capacity(stacks.len());

    while order.len() < stacks.len() {
        let Some(next) = (0..stacks.len()).find(|&i| !emitted[i] && pending[i] == 0) else {
            let cycle = find_cycle(&deps, &emitted);
            return Err(PlanError::CyclicDependency {
                stacks: cycle.into_iter().map(|i| stacks[i].name.clone()).collect(),
            });
        };

        emitted[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
        }
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first blocked stack until one repeats.
///
/// Every blocked stack has at least one blocked dependency, so the walk
/// always closes a cycle.
fn find_cycle(deps: &[Vec<usize>], emitted: &[bool]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|&i| !emitted[i]) else {
        return Vec::new();
    };

    let mut position: Vec<Option<usize>> = vec![None; deps.len()];
    let mut path = Vec::new();
    let mut current = start;

    loop {
        if let Some(at) = position[current] {
            return path.split_off(at);
        }
        position[current] = Some(path.len());
        path.push(current);

        match deps[current].iter().copied().find(|&d| !emitted[d]) {
            Some(next) => current = next,
            None => return path,
        }
    }
}
