//! Tree Data Provider Tests
//!
//! End-to-end tests for the per-view orchestrator, driven through the host.
//!
//! # Test Coverage
//!
//! - **Provider registration**: default rendering until the real provider registers
//! - **Find by id**: walking source and group nodes, case-insensitive, round trip
//! - **Change translation**: branch, resource, refresh and settings changes
//! - **Reveal**: native and legacy targets, with and without a host widget
//! - **Node state**: pinned items and temporary descriptions

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

use resource_tree::app::resource_groups::{
    BranchChange, BranchModel, GroupBySetting, RefreshRequest, RefreshState, Resource,
    ResourceGroupsHost, ResourceGroupsItem, RevealTarget, StaticResourceProvider, TreeChange,
    TreeNodeRef, TreeSettings,
};

/// `None` for a full refresh, else the ids of the changed nodes.
fn summarize(changes: &Arc<Mutex<Vec<TreeChange>>>) -> Vec<Option<Vec<String>>> {
    changes
        .lock()
        .unwrap()
        .iter()
        .map(|change| match change {
            TreeChange::All => None,
            TreeChange::Items(nodes) => Some(nodes.iter().map(|n| n.id().to_string()).collect()),
        })
        .collect()
}

/// Every node reachable from the cloud root, depth-first.
async fn render_all(host: &ResourceGroupsHost) -> Vec<TreeNodeRef> {
    let mut rendered = Vec::new();
    let mut stack = host.cloud_tree().get_children(None).await.unwrap();
    while let Some(node) = stack.pop() {
        stack.extend(host.cloud_tree().get_children(Some(&node)).await.unwrap());
        rendered.push(node);
    }
    rendered
}

// ============================================================================
// Branch data provider registration
// ============================================================================

#[tokio::test]
async fn test_registration_replaces_default_rendering() {
    let site = resource("web", "shop", SITES_TYPE);
    let test = host_with(vec![site.clone()], TreeSettings::default());
    let host = &test.host;
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    let (_, groups) = source_and_groups(host).await;
    let members = host.cloud_tree().get_children(Some(&groups[0])).await.unwrap();
    let before = host.cloud_tree().get_tree_item(&members[0]).await.unwrap();
    assert!(before.has_context_value("resource"));
    assert!(!host.cloud_branch_providers().has_provider(SITES_TYPE));

    let (registrations, _registrations) = record(host.cloud_branch_providers().on_did_change_providers());
    let provider = Arc::new(ScriptedBranchProvider::new());
    let _registration = host.register_cloud_branch_data_provider(SITES_TYPE, provider.clone());

    assert_eq!(*registrations.lock().unwrap(), vec!["microsoft.web/sites".to_string()]);
    assert_eq!(summarize(&changes), vec![Some(vec![groups[0].id().to_string()])]);

    let members = host.cloud_tree().get_children(Some(&groups[0])).await.unwrap();
    let after = host.cloud_tree().get_tree_item(&members[0]).await.unwrap();
    assert!(after.has_context_value("scripted"));
    assert_eq!(after.id.as_deref(), Some(site.id.as_str()));
    assert_eq!(provider.resolve_count(), 1);
}

#[tokio::test]
async fn test_disposing_registration_falls_back_to_default() {
    let test = host_with(vec![resource("web", "shop", SITES_TYPE)], TreeSettings::default());
    let host = &test.host;
    let registration = host.register_cloud_branch_data_provider(SITES_TYPE, Arc::new(ScriptedBranchProvider::new()));
    assert!(host.cloud_branch_providers().has_provider("microsoft.web/SITES"));

    registration.dispose();

    assert!(!host.cloud_branch_providers().has_provider(SITES_TYPE));
    let (_, groups) = source_and_groups(host).await;
    let members = host.cloud_tree().get_children(Some(&groups[0])).await.unwrap();
    let item = host.cloud_tree().get_tree_item(&members[0]).await.unwrap();
    assert!(item.has_context_value("resource"));
}

// ============================================================================
// Find by id
// ============================================================================

#[tokio::test]
async fn test_find_item_walks_source_and_group() {
    let target = resource("RG", "foo", STORAGE_TYPE);
    let test = host_with(
        vec![resource("other", "bar", STORAGE_TYPE), target.clone()],
        TreeSettings::default(),
    );
    let tree = test.host.cloud_tree();

    let found = tree.find_item_by_id(&target.id).await.unwrap().unwrap();
    assert_eq!(found.id(), target.id);

    let lower = tree.find_item_by_id(&target.id.to_lowercase()).await.unwrap().unwrap();
    assert_eq!(lower.id(), target.id);

    let group = tree
        .find_item_by_id("/subscriptions/S/resourceGroups/RG")
        .await
        .unwrap()
        .unwrap();
    assert!(group.is_ancestor_of(&target.id));

    let missing = tree
        .find_item_by_id("/subscriptions/S/resourceGroups/RG/providers/Microsoft.Storage/storageAccounts/nope")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_find_item_descends_into_branch_children() {
    let site = resource("web", "app", SITES_TYPE);
    let slot_id = format!("{}/slots/staging", site.id);
    let test = host_with(vec![site.clone()], TreeSettings::default());
    let provider = ScriptedBranchProvider::new().with_children(&site.id, &[(Some(slot_id.as_str()), "staging")]);
    let _registration = test.host.register_cloud_branch_data_provider(SITES_TYPE, Arc::new(provider));

    let found = test.host.cloud_tree().find_item_by_id(&slot_id).await.unwrap().unwrap();

    assert_eq!(found.id(), slot_id);
    let item = test.host.cloud_tree().get_tree_item(&found).await.unwrap();
    assert_eq!(item.label, "staging");
}

#[tokio::test]
async fn test_find_item_round_trips_every_rendered_node() {
    let test = host_with(
        vec![
            container("rg1"),
            resource("rg1", "alpha", STORAGE_TYPE),
            resource("rg1", "beta", SITES_TYPE),
            resource("rg2", "gamma", STORAGE_TYPE),
        ],
        TreeSettings::default(),
    );
    let host = &test.host;

    let rendered = render_all(host).await;
    assert_eq!(rendered.len(), 6);

    for node in &rendered {
        let found = host.cloud_tree().find_item_by_id(node.id()).await.unwrap();
        assert_eq!(found.map(|n| n.id().to_string()), Some(node.id().to_string()));
    }
}

#[tokio::test]
async fn test_children_ids_extend_parent_ids() {
    let site = resource("web", "app", SITES_TYPE);
    let test = host_with(
        vec![site.clone(), resource("data", "store", STORAGE_TYPE)],
        TreeSettings::default(),
    );
    let slot = format!("{}/slots/a", site.id);
    let provider = ScriptedBranchProvider::new().with_children(&site.id, &[(None, "Logs"), (Some(slot.as_str()), "a")]);
    let _registration = test.host.register_cloud_branch_data_provider(SITES_TYPE, Arc::new(provider));
    let tree = test.host.cloud_tree();

    let mut stack = tree.get_children(None).await.unwrap();
    let mut checked = 0;
    while let Some(node) = stack.pop() {
        for child in tree.get_children(Some(&node)).await.unwrap() {
            assert!(
                child.id().starts_with(&format!("{}/", node.id())),
                "{} is not below {}",
                child.id(),
                node.id()
            );
            checked += 1;
            stack.push(child);
        }
    }
    assert_eq!(checked, 6);
}

#[tokio::test]
async fn test_location_groups_contain_members_without_id_prefix() {
    let target = resource("rg", "alpha", STORAGE_TYPE).with_location("westeurope");
    let settings = TreeSettings {
        group_by: GroupBySetting::Location,
        ..Default::default()
    };
    let test = host_with(vec![target.clone()], settings);

    // Resolved before anything is rendered, so the search has to descend.
    let found = test.host.cloud_tree().find_item_by_id(&target.id).await.unwrap();
    assert_eq!(found.map(|n| n.id().to_string()), Some(target.id.clone()));

    let (source, groups) = source_and_groups(&test.host).await;
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.id(), "/subscriptions/S/locations/westeurope");
    assert!(group.id().starts_with(&format!("{}/", source.id())));

    // Member ids keep their own hierarchy; membership stands in for the prefix.
    let members = test.host.cloud_tree().get_children(Some(group)).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id(), target.id);
    assert!(!members[0].id().starts_with(&format!("{}/", group.id())));
    assert!(group.is_ancestor_of(members[0].id()));
}

#[tokio::test]
async fn test_find_does_not_start_new_generation() {
    let target = resource("rg", "alpha", STORAGE_TYPE);
    let test = host_with(vec![target.clone()], TreeSettings::default());
    let tree = test.host.cloud_tree();
    render_all(&test.host).await;
    let generation = tree.item_cache().generation();

    let first = tree.find_item_by_id(&target.id).await.unwrap().unwrap();
    let second = tree.find_item_by_id(&target.id).await.unwrap().unwrap();

    assert_eq!(tree.item_cache().generation(), generation);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(tree.refresh_state(), RefreshState::Idle);
}

// ============================================================================
// Change translation
// ============================================================================

#[tokio::test]
async fn test_branch_change_maps_to_rendered_node() {
    let target = resource("rg", "alpha", STORAGE_TYPE);
    let test = host_with(vec![target.clone()], TreeSettings::default());
    let host = &test.host;
    let provider = Arc::new(ScriptedBranchProvider::new());
    let _registration = host.register_cloud_branch_data_provider(STORAGE_TYPE, provider.clone());
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    let (_, groups) = source_and_groups(host).await;
    let members = host.cloud_tree().get_children(Some(&groups[0])).await.unwrap();
    let model = members[0].branch_item().unwrap();

    provider.changes.fire(&BranchChange::Items(vec![model]));
    provider
        .changes
        .fire(&BranchChange::Items(vec![BranchModel::native(TestModel::new(Some("/never/rendered"), "x"))]));
    provider.changes.fire(&BranchChange::All);

    assert_eq!(summarize(&changes), vec![Some(vec![target.id.clone()]), None]);
}

#[tokio::test]
async fn test_resource_change_refreshes_lists() {
    let test = host_with(vec![resource("rg1", "alpha", STORAGE_TYPE)], TreeSettings::default());
    let host = &test.host;
    let (source, groups) = source_and_groups(host).await;
    assert_eq!(groups.len(), 1);
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    test.resources.set_resources(vec![
        resource("rg1", "alpha", STORAGE_TYPE),
        resource("rg2", "beta", STORAGE_TYPE),
    ]);

    assert_eq!(summarize(&changes), vec![None]);
    let groups = host.cloud_tree().get_children(Some(&source)).await.unwrap();
    assert_eq!(labels(host, &groups).await, vec!["rg1", "rg2"]);
}

#[tokio::test]
async fn test_refresh_requests_reach_both_trees() {
    let test = host_with(vec![resource("rg1", "alpha", STORAGE_TYPE)], TreeSettings::default());
    let host = &test.host;
    let (_, groups) = source_and_groups(host).await;
    let (cloud, _cloud_sub) = record(host.cloud_tree().on_did_change_tree_data());
    let (workspace, _workspace_sub) = record(host.workspace_tree().on_did_change_tree_data());

    host.refresh(RefreshRequest::Item(groups[0].id().to_uppercase()));
    host.refresh(RefreshRequest::Item("/not/rendered".to_string()));
    host.refresh(RefreshRequest::All);

    assert_eq!(
        summarize(&cloud),
        vec![Some(vec![groups[0].id().to_string()]), None, None]
    );
    assert_eq!(summarize(&workspace), vec![None, None, None]);
}

#[tokio::test]
async fn test_settings_update_regroups_cloud_tree() {
    let test = host_with(
        vec![
            resource("rg1", "alpha", STORAGE_TYPE).with_location("eastus"),
            resource("rg2", "beta", STORAGE_TYPE).with_location("eastus"),
        ],
        TreeSettings::default(),
    );
    let host = &test.host;
    let (_, groups) = source_and_groups(host).await;
    assert_eq!(groups.len(), 2);
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    host.update_settings(TreeSettings {
        group_by: GroupBySetting::Location,
        ..Default::default()
    });

    assert_eq!(summarize(&changes), vec![None]);
    assert_eq!(host.settings().group_by, GroupBySetting::Location);
    let (_, groups) = source_and_groups(host).await;
    assert_eq!(labels(host, &groups).await, vec!["eastus"]);
}

#[tokio::test]
async fn test_disposed_host_stops_forwarding() {
    let test = host_with(vec![resource("rg1", "alpha", STORAGE_TYPE)], TreeSettings::default());
    let host = &test.host;
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    host.dispose();
    host.dispose();
    host.refresh(RefreshRequest::All);
    test.resources.set_resources(Vec::new());

    assert!(host.is_disposed());
    assert!(changes.lock().unwrap().is_empty());
}

// ============================================================================
// Reveal
// ============================================================================

#[tokio::test]
async fn test_reveal_legacy_model_by_full_id() {
    let target = resource("rg", "alpha", STORAGE_TYPE);
    let test = host_with(vec![target.clone()], TreeSettings::default());
    let host = &test.host;
    let widget = Arc::new(RecordingTreeHost::default());
    host.cloud_tree().set_host(widget.clone());

    let legacy = BranchModel::legacy(TestLegacyModel {
        full_id: target.id.clone(),
    });
    let revealed = host.reveal(RevealTarget::Legacy(legacy)).await.unwrap();

    assert!(revealed);
    assert_eq!(*widget.revealed.lock().unwrap(), vec![target.id.clone()]);
}

#[tokio::test]
async fn test_reveal_without_widget_or_match() {
    let target = resource("rg", "alpha", STORAGE_TYPE);
    let test = host_with(vec![target.clone()], TreeSettings::default());
    let host = &test.host;

    let (source, _) = source_and_groups(host).await;
    assert!(!host.reveal(RevealTarget::Native(source)).await.unwrap());

    host.cloud_tree().set_host(Arc::new(RecordingTreeHost::default()));
    let unknown = BranchModel::legacy(TestLegacyModel {
        full_id: "/subscriptions/S/resourceGroups/rg/providers/X/y/missing".to_string(),
    });
    assert!(!host.reveal(RevealTarget::Legacy(unknown)).await.unwrap());
}

// ============================================================================
// Node state
// ============================================================================

#[tokio::test]
async fn test_pinned_group_gets_context_and_refresh() {
    let test = host_with(vec![resource("rg1", "alpha", STORAGE_TYPE)], TreeSettings::default());
    let host = &test.host;
    let (_, groups) = source_and_groups(host).await;
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    assert!(host.pinned_items().pin(groups[0].id()).unwrap());

    assert_eq!(summarize(&changes), vec![Some(vec![groups[0].id().to_string()])]);
    let item = host.cloud_tree().get_tree_item(&groups[0]).await.unwrap();
    assert!(item.has_context_value("pinned"));
    assert!(item.has_context_value("resourceGroup"));

    assert!(host.pinned_items().unpin(groups[0].id()).unwrap());
    let item = host.cloud_tree().get_tree_item(&groups[0]).await.unwrap();
    assert!(!item.has_context_value("pinned"));
}

#[tokio::test]
async fn test_temporary_description_shows_while_running() {
    let target = resource("rg1", "alpha", STORAGE_TYPE);
    let test = host_with(vec![target.clone()], TreeSettings::default());
    let host = &test.host;
    let (_, groups) = source_and_groups(host).await;
    let members = host.cloud_tree().get_children(Some(&groups[0])).await.unwrap();
    let node = Arc::clone(&members[0]);
    let (changes, _subscription) = record(host.cloud_tree().on_did_change_tree_data());

    let tree = Arc::clone(host.cloud_tree());
    let during = host
        .state_store()
        .run_with_temporary_description(&target.id, "Deleting...", async {
            tree.get_tree_item(&node).await.unwrap().description
        })
        .await;

    assert_eq!(during.as_deref(), Some("Deleting..."));
    let after = host.cloud_tree().get_tree_item(&node).await.unwrap();
    assert_eq!(after.description, None);
    assert_eq!(
        summarize(&changes),
        vec![Some(vec![target.id.clone()]), Some(vec![target.id.clone()])]
    );
}

// ============================================================================
// Workspace tree
// ============================================================================

#[tokio::test]
async fn test_workspace_tree_lists_local_resources() {
    let test = host_with(Vec::new(), TreeSettings::default());
    let host = &test.host;
    let local = Arc::new(StaticResourceProvider::new(vec![
        Resource::new("/workspace/folders/zeta", "zeta", "Local/folder"),
        Resource::new("/workspace/folders/alpha", "alpha", "Local/folder"),
    ]));
    let registration = host.register_workspace_resource_provider(local);

    let roots = host.workspace_tree().get_children(None).await.unwrap();

    let ids: Vec<&str> = roots.iter().map(|n| n.id()).collect();
    assert_eq!(ids, vec!["/workspace/folders/alpha", "/workspace/folders/zeta"]);
    assert!(host.cloud_tree().get_children(None).await.unwrap()[0]
        .get_children()
        .await
        .unwrap()
        .is_empty());

    registration.dispose();
    assert!(host.workspace_tree().get_children(None).await.unwrap().is_empty());
}
