//! Route table of the group API.

use std::{future::Future, sync::Arc};

use tracing::debug;

use gim_core::{
    message::actions,
    router::{
        HandlerFuture, HandlerResult, Namespace, Param, RequestContext, RouteDef, RouterBuilder,
    },
};

use crate::state::ApiState;

mod group;
mod message;

pub use group::add_group_member;

/// Every route of the group API.
pub fn routes(api: &Arc<ApiState>) -> Vec<RouteDef> {
    vec![
        Namespace::new("group")
            .route("create", bind(api, group::create_group))
            .route("join", bind(api, group::join_group))
            .route("exit", bind(api, group::exit_group))
            .route("add_member", bind(api, group::add_member))
            .route("remove_member", bind(api, group::remove_member))
            .route("members", bind(api, group::get_group_members))
            .route("info", bind(api, group::get_group_info))
            .into(),
        Namespace::new("message")
            .route("group", bind(api, message::send_group_message))
            .into(),
    ]
}

pub fn register(builder: RouterBuilder, api: &Arc<ApiState>) -> RouterBuilder {
    routes(api).into_iter().fold(builder, |b, r| b.add(r))
}

/// Bind a state-taking handler into a route handler.
///
/// A failing handler answers the requester with `api.failed` before its
/// error is handed back to the router.
fn bind<P, F, Fut>(
    api: &Arc<ApiState>,
    f: F,
) -> impl Fn(RequestContext, P) -> HandlerFuture + Send + Sync + 'static
where
    P: Param,
    F: Fn(Arc<ApiState>, RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let api = api.clone();
    move |ctx: RequestContext, p: P| -> HandlerFuture {
        let api = api.clone();
        let call = f(api.clone(), ctx.clone(), p);
        Box::pin(async move {
            let result = call.await;
            if let Err(e) = &result {
                debug!(uid = %ctx.uid, action = %ctx.action, error = %e, "replying failure");
                api.respond(ctx.uid, ctx.seq, actions::FAILED, e.to_string())
                    .await;
            }
            result
        })
    }
}
