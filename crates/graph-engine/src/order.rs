//! Execution ordering
//!
//! Dependency-first order over the graph's wires plus one virtual edge from
//! every buffer writer to every buffer reader, so indirectly coupled nodes
//! see fresh values in the same tick. The visit marks nodes before recursing,
//! which turns cycles into "run in discovery order" instead of an error.

use std::collections::{HashMap, HashSet};

use crate::model::ConnectionRecord;

/// Compute the order nodes step in for one tick.
///
/// `node_ids` carries document order, which breaks ties deterministically.
/// `writers` and `readers` are the ids of buffer-writing and buffer-reading
/// nodes; every writer is treated as an implicit dependency of every reader,
/// and a reader pulls its writers in document order.
#[must_use]
pub fn execution_order(
    node_ids: &[String],
    connections: &[ConnectionRecord],
    writers: &HashSet<String>,
    readers: &HashSet<String>,
) -> Vec<String> {
    let known: HashSet<&String> = node_ids.iter().collect();

    // target -> wired sources, dangling endpoints dropped
    let mut sources: HashMap<&String, Vec<&String>> = HashMap::new();
    for connection in connections {
        if known.contains(&connection.source) && known.contains(&connection.target) {
            sources
                .entry(&connection.target)
                .or_default()
                .push(&connection.source);
        }
    }

    // Writers in document order, never in set iteration order
    let writer_order: Vec<&String> = node_ids
        .iter()
        .filter(|id| writers.contains(*id))
        .collect();

    fn visit<'a>(
        id: &'a String,
        sources: &HashMap<&'a String, Vec<&'a String>>,
        writer_order: &[&'a String],
        readers: &HashSet<String>,
        visited: &mut HashSet<&'a String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(id) {
            return;
        }
        if readers.contains(id) {
            for &writer in writer_order {
                if writer != id {
                    visit(writer, sources, writer_order, readers, visited, order);
                }
            }
        }
        if let Some(deps) = sources.get(id) {
            for dep in deps {
                visit(dep, sources, writer_order, readers, visited, order);
            }
        }
        order.push(id.clone());
    }

    let mut visited: HashSet<&String> = HashSet::new();
    let mut order = Vec::with_capacity(node_ids.len());
    for id in node_ids {
        visit(id, &sources, &writer_order, readers, &mut visited, &mut order);
    }
    order
}
