use std::sync::{Arc, OnceLock};

use shared::domain::CaseId;
use tracing::debug;

use crate::NavigationStateProvider;

/// An explicit id wins; the navigation parameter is only a fallback. Blank
/// values count as absent.
pub fn resolve_case_id(
    explicit: Option<&CaseId>,
    navigation: &dyn NavigationStateProvider,
    param: &str,
) -> Option<CaseId> {
    if let Some(id) = explicit.filter(|id| !id.as_str().trim().is_empty()) {
        return Some(id.clone());
    }

    let fallback = navigation
        .state_param(param)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(CaseId);
    debug!(param, found = fallback.is_some(), "case id taken from navigation state");
    fallback
}

/// Memoizes [`resolve_case_id`]; the navigation provider is consulted at most
/// once, and a missing id stays missing.
pub struct CaseIdResolver {
    explicit: Option<CaseId>,
    navigation: Arc<dyn NavigationStateProvider>,
    param: String,
    resolved: OnceLock<Option<CaseId>>,
}

impl CaseIdResolver {
    pub fn new(
        explicit: Option<CaseId>,
        navigation: Arc<dyn NavigationStateProvider>,
        param: impl Into<String>,
    ) -> Self {
        Self {
            explicit,
            navigation,
            param: param.into(),
            resolved: OnceLock::new(),
        }
    }

    pub fn resolve(&self) -> Option<&CaseId> {
        self.resolved
            .get_or_init(|| {
                resolve_case_id(self.explicit.as_ref(), self.navigation.as_ref(), &self.param)
            })
            .as_ref()
    }
}
