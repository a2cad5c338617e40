use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::graph::SymbolInfo;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("call hierarchy provider unavailable")]
    Unavailable,
    #[error("call hierarchy request failed: {0}")]
    Failed(String),
}

/// A position a provider can expand into outgoing calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyItem {
    pub name: String,
    pub file: PathBuf,
    /// 1-based line of the declaration.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingCall {
    pub to: HierarchyItem,
    /// 1-based lines in the caller where the call appears.
    pub from_lines: Vec<usize>,
}

/// An external call-hierarchy capability, typically an editor's language server.
///
/// Every operation may fail or stall; callers wrap them in a timeout.
#[async_trait]
pub trait CallHierarchyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `false` for the null provider; the engine's own analysis is used instead.
    fn is_available(&self) -> bool {
        true
    }

    async fn document_symbols(&self, file: &Path) -> Result<Vec<SymbolInfo>, ProviderError>;

    async fn prepare_call_hierarchy(
        &self,
        file: &Path,
        line: usize,
    ) -> Result<Vec<HierarchyItem>, ProviderError>;

    async fn outgoing_calls(&self, item: &HierarchyItem) -> Result<Vec<OutgoingCall>, ProviderError>;
}

/// Stands in when no call-hierarchy capability is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallHierarchy;

#[async_trait]
impl CallHierarchyProvider for NoCallHierarchy {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn document_symbols(&self, _file: &Path) -> Result<Vec<SymbolInfo>, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn prepare_call_hierarchy(
        &self,
        _file: &Path,
        _line: usize,
    ) -> Result<Vec<HierarchyItem>, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn outgoing_calls(&self, _item: &HierarchyItem) -> Result<Vec<OutgoingCall>, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}
