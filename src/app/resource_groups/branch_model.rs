//! Provider-owned branch models.
//!
//! The tree layer never looks inside a model beyond the optional hints on
//! [`BranchItem`]. Models come in two generations: native models from the
//! current provider API and adapter models from the legacy API, which carry
//! a stable full id of their own.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::model::ViewProperties;

/// A node in a resource's provider-defined sub-tree.
pub trait BranchItem: Send + Sync + fmt::Debug + 'static {
    /// The provider's own id for the entity, if it has one.
    fn id(&self) -> Option<&str> {
        None
    }

    fn portal_url(&self) -> Option<&str> {
        None
    }

    fn view_properties(&self) -> Option<&ViewProperties> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A model produced through the legacy provider API adapter.
pub trait LegacyBranchItem: Send + Sync + fmt::Debug + 'static {
    /// Fully qualified id assigned by the legacy tree; already stable.
    fn full_id(&self) -> &str;

    fn portal_url(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Identity of one model instance. Two keys are equal only for the same
/// allocation, never for two instances describing the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKey(usize);

#[derive(Clone)]
pub enum BranchModel {
    Native(Arc<dyn BranchItem>),
    Legacy(Arc<dyn LegacyBranchItem>),
}

impl BranchModel {
    pub fn native<T: BranchItem>(item: T) -> Self {
        BranchModel::Native(Arc::new(item))
    }

    pub fn legacy<T: LegacyBranchItem>(item: T) -> Self {
        BranchModel::Legacy(Arc::new(item))
    }

    pub fn key(&self) -> ModelKey {
        let ptr = match self {
            BranchModel::Native(item) => Arc::as_ptr(item) as *const () as usize,
            BranchModel::Legacy(item) => Arc::as_ptr(item) as *const () as usize,
        };
        ModelKey(ptr)
    }

    /// Id the model brings with it: the legacy full id, else the native id.
    pub fn own_id(&self) -> Option<&str> {
        match self {
            BranchModel::Native(item) => item.id(),
            BranchModel::Legacy(item) => Some(item.full_id()),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, BranchModel::Legacy(_))
    }

    pub fn portal_url(&self) -> Option<&str> {
        match self {
            BranchModel::Native(item) => item.portal_url(),
            BranchModel::Legacy(item) => item.portal_url(),
        }
    }

    pub fn view_properties(&self) -> Option<&ViewProperties> {
        match self {
            BranchModel::Native(item) => item.view_properties(),
            BranchModel::Legacy(_) => None,
        }
    }

    /// Borrow the concrete model type a provider created.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            BranchModel::Native(item) => item.as_any().downcast_ref::<T>(),
            BranchModel::Legacy(item) => item.as_any().downcast_ref::<T>(),
        }
    }

    pub fn ptr_eq(&self, other: &BranchModel) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Debug for BranchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchModel::Native(item) => f.debug_tuple("Native").field(item).finish(),
            BranchModel::Legacy(item) => f.debug_tuple("Legacy").field(item).finish(),
        }
    }
}
