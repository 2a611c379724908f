//! Pseudo-nodes that stand in for content the tree could not resolve.

use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;

use super::errors::{parse_error, ParsedError};
use super::model::{CollapsibleState, Resource, TreeItem};
use super::tree_node::{join_id, ResourceGroupsItem, TreeNodeRef};

pub const INVALID_RESOURCE_CONTEXT: &str = "invalidResource";
pub const SEPARATOR_CONTEXT: &str = "separator";

/// Node rendered in place of a resource whose branch item failed to resolve.
#[derive(Debug, Clone)]
pub struct InvalidItem {
    id: String,
    label: String,
    error: ParsedError,
}

impl InvalidItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            error: parse_error(error),
        }
    }

    /// Placeholder for `resource`, keeping the id the real node would have had.
    pub fn for_resource(id_prefix: Option<&str>, resource: &Resource, error: &anyhow::Error) -> Self {
        let id = match id_prefix {
            Some(prefix) => join_id(prefix, &resource.id),
            None => resource.id.clone(),
        };
        Self::new(id, resource.name.clone(), error)
    }

    pub fn error(&self) -> &ParsedError {
        &self.error
    }
}

#[async_trait]
impl ResourceGroupsItem for InvalidItem {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        Ok(Vec::new())
    }

    async fn get_tree_item(&self) -> Result<TreeItem> {
        let mut item = TreeItem::new(self.label.clone())
            .with_description(format!("{}: {}", self.error.error_type, self.error.message))
            .with_icon("error")
            .with_collapsible_state(CollapsibleState::None)
            .with_context_value(INVALID_RESOURCE_CONTEXT);
        item.id = Some(self.id.clone());
        item.tooltip = Some(self.error.message.clone());
        Ok(item)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Visual divider between blocks of members from different sources.
#[derive(Debug, Clone)]
pub struct SeparatorItem {
    id: String,
}

impl SeparatorItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ResourceGroupsItem for SeparatorItem {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        Ok(Vec::new())
    }

    async fn get_tree_item(&self) -> Result<TreeItem> {
        let mut item = TreeItem::new("")
            .with_collapsible_state(CollapsibleState::None)
            .with_context_value(SEPARATOR_CONTEXT);
        item.id = Some(self.id.clone());
        Ok(item)
    }

    // Separators never contain anything.
    fn is_ancestor_of(&self, _id: &str) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
