use domain::ingress::{DEFAULT_LIMIT, DEFAULT_PAGE};
use domain::Id;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Request body for sending a message to a chat.
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct SendParams {
    pub(crate) chat_id: Id,
    pub(crate) content: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct HistoryParams {
    /// 1-based page number, defaults to 1
    pub(crate) page: Option<u64>,
    /// Page size between 1 and 100, defaults to 20
    pub(crate) limit: Option<u64>,
}

impl HistoryParams {
    pub(crate) fn page(&self) -> u64 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}
