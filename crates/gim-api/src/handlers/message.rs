use std::sync::Arc;

use gim_core::{router::RequestContext, Error, Result};

use crate::{state::ApiState, types::SendGroupMessageParam};

pub(super) async fn send_group_message(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: SendGroupMessageParam,
) -> Result<()> {
    let group = api.registry.get(p.gid).await?;
    if !group.has_member(ctx.uid) {
        return Err(Error::business(format!("not a member of group {}", p.gid)));
    }
    // The sender is a member, so it receives the pushed message like everyone else.
    group.enqueue_message(ctx.uid, &p.message).await;
    Ok(())
}
