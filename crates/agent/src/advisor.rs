//! The advisor interface.

use async_trait::async_trait;

use crate::envelope::{AdvisedRequest, AdvisedResponse};

/// An interceptor around the model call.
///
/// `before` hooks run in ascending [`order`](Advisor::order) on the way in,
/// `after` hooks in descending order on the way out. Neither can fail: an
/// advisor that hits an error logs it and passes its input on, possibly with
/// a documented default filled in.
#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    /// Position in the chain. Lower runs first on the way in.
    fn order(&self) -> i32;

    async fn before(&self, request: AdvisedRequest) -> AdvisedRequest {
        request
    }

    /// Must tolerate a response without results or output.
    async fn after(&self, response: AdvisedResponse) -> AdvisedResponse {
        response
    }
}
