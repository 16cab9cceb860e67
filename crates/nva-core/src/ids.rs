//! Deterministic identifiers derived from labels
//!
//! Agents, graphs and blob entries get stable ids: UUIDv5 under the
//! organization namespace, named by the concatenation of the scoping labels.
//! The same labels always map to the same id, so a node can be addressed
//! before the remote store has acknowledged it.

use uuid::Uuid;

/// UUIDv5 of the concatenated `parts` under the `org` namespace.
pub fn namespaced_id(org: &Uuid, parts: &[&str]) -> Uuid {
    let name = parts.concat();
    Uuid::new_v5(org, name.as_bytes())
}

pub fn agent_id(org: &Uuid, agent_label: &str) -> Uuid {
    namespaced_id(org, &[agent_label])
}

pub fn graph_id(org: &Uuid, graph_label: &str) -> Uuid {
    namespaced_id(org, &[graph_label])
}

/// Id of a variable or factor inside an agent's graph.
pub fn node_id(org: &Uuid, agent_label: &str, graph_label: &str, node_label: &str) -> Uuid {
    namespaced_id(org, &[agent_label, graph_label, node_label])
}

/// Id of a blob entry attached directly to an agent.
pub fn agent_entry_id(org: &Uuid, agent_label: &str, entry_label: &str) -> Uuid {
    namespaced_id(org, &[agent_label, entry_label])
}

/// Id of a blob entry attached to a variable inside an agent's graph.
pub fn variable_entry_id(
    org: &Uuid,
    agent_label: &str,
    graph_label: &str,
    variable_label: &str,
    entry_label: &str,
) -> Uuid {
    namespaced_id(org, &[agent_label, graph_label, variable_label, entry_label])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_deterministic() {
        let org = Uuid::new_v4();
        assert_eq!(agent_id(&org, "robot1"), agent_id(&org, "robot1"));
        assert_ne!(agent_id(&org, "robot1"), agent_id(&org, "Robot1"));
    }

    #[test]
    fn test_ids_depend_on_namespace() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(graph_id(&a, "session"), graph_id(&b, "session"));
    }

    #[test]
    fn test_node_and_entry_ids_differ() {
        let org = Uuid::new_v4();
        let var = node_id(&org, "robot1", "session1", "x0");
        let entry = variable_entry_id(&org, "robot1", "session1", "x0", "LEFTCAM_1");
        assert_ne!(var, entry);
    }

    #[test]
    fn test_agent_entry_id_matches_concatenation() {
        let org = Uuid::new_v4();
        assert_eq!(
            agent_entry_id(&org, "robot1", "LEFTCAM_1"),
            Uuid::new_v5(&org, b"robot1LEFTCAM_1")
        );
    }
}
