use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::branch_model::BranchModel;
use super::model::TreeItem;

/// A node the host tree widget holds.
///
/// Ids are stable across refreshes and hierarchical: a node is an ancestor
/// of every id that starts with its own id followed by `/`.
#[async_trait]
pub trait ResourceGroupsItem: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Children are recomputed on every call.
    async fn get_children(&self) -> Result<Vec<TreeNodeRef>>;

    async fn get_tree_item(&self) -> Result<TreeItem>;

    async fn get_parent(&self) -> Result<Option<TreeNodeRef>> {
        Ok(None)
    }

    async fn resolve_tree_item(&self, item: TreeItem) -> Result<TreeItem> {
        Ok(item)
    }

    /// Whether the node with `id` sits somewhere below this node.
    fn is_ancestor_of(&self, id: &str) -> bool {
        is_ancestor_id(self.id(), id)
    }

    /// The provider model behind the node, for nodes that wrap one.
    fn branch_item(&self) -> Option<BranchModel> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

pub type TreeNodeRef = Arc<dyn ResourceGroupsItem>;

/// Case-insensitive id equality.
pub fn ids_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Case-insensitive `candidate` starts with `ancestor + "/"`.
pub fn is_ancestor_id(ancestor: &str, candidate: &str) -> bool {
    let ancestor = ancestor.trim_end_matches('/');
    if ancestor.is_empty() || candidate.len() <= ancestor.len() {
        return false;
    }
    candidate.is_char_boundary(ancestor.len())
        && candidate[..ancestor.len()].eq_ignore_ascii_case(ancestor)
        && candidate[ancestor.len()..].starts_with('/')
}

/// Join two id segments with exactly one `/` at the boundary.
pub fn join_id(prefix: &str, id: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let id = id.trim_start_matches('/');
    if prefix.is_empty() {
        return format!("/{}", id);
    }
    if id.is_empty() {
        return prefix.to_string();
    }
    format!("{}/{}", prefix, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ancestor_id() {
        assert!(is_ancestor_id("/subscriptions/S", "/subscriptions/S/resourceGroups/RG"));
        assert!(is_ancestor_id("/Subscriptions/s", "/subscriptions/S/resourceGroups/RG"));
        assert!(is_ancestor_id("/subscriptions/S/", "/subscriptions/S/x"));
        assert!(!is_ancestor_id("/subscriptions/S", "/subscriptions/S"));
        assert!(!is_ancestor_id("/subscriptions/S", "/subscriptions/S2/x"));
        assert!(!is_ancestor_id("", "/anything"));
    }

    #[test]
    fn test_join_id_keeps_one_separator() {
        assert_eq!(join_id("tenant", "/subscriptions/S"), "tenant/subscriptions/S");
        assert_eq!(join_id("tenant/", "/subscriptions/S"), "tenant/subscriptions/S");
        assert_eq!(join_id("tenant", "subscriptions/S"), "tenant/subscriptions/S");
        assert_eq!(join_id("/subscriptions/S", "resourceGroups/rg"), "/subscriptions/S/resourceGroups/rg");
        assert_eq!(join_id("", "x"), "/x");
        assert_eq!(join_id("a", ""), "a");
    }
}
