use std::{collections::HashMap, sync::Arc};

use tracing::{info, warn};

use gim_core::{
    domain::{GroupId, MemberKind, UserId},
    group::SUBSCRIBED,
    message::{actions, Message, NOTIFY_SEQ},
    ports::GroupMemberRecord,
    router::RequestContext,
    Error, Result,
};

use crate::{
    state::ApiState,
    types::{
        CreateGroupParam, GroupAddMemberNotice, GroupIdParam, GroupInfoParam,
        GroupMemberResponse, GroupRemovedNotice, GroupResponse, MembersParam,
    },
};

pub(super) async fn create_group(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: CreateGroupParam,
) -> Result<()> {
    let group = api.groups.create_group(p.name.trim(), ctx.uid).await?;
    api.groups
        .add_members(group.gid, MemberKind::Admin, &[ctx.uid])
        .await?;
    // Load the live group now so the owner is subscribed from the start.
    api.registry.get(group.gid).await?;
    info!(gid = %group.gid, cid = %group.chat_id, owner = %ctx.uid, "group created");

    if !p.member.is_empty() {
        let invite = MembersParam {
            gid: group.gid,
            uid: p.member,
        };
        let internal = RequestContext::internal(ctx.uid, "group.add_member");
        if let Err(e) = add_group_member(&api, &internal, &invite).await {
            api.respond(
                ctx.uid,
                NOTIFY_SEQ,
                actions::FAILED,
                format!("add member failed, {e}"),
            )
            .await;
        }
    }

    let members = api.groups.get_members(group.gid).await?;
    api.respond(
        ctx.uid,
        ctx.seq,
        actions::SUCCESS,
        GroupResponse { group, members },
    )
    .await;
    Ok(())
}

pub(super) async fn add_member(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: MembersParam,
) -> Result<()> {
    add_group_member(&api, &ctx, &p).await?;
    api.respond(ctx.uid, ctx.seq, actions::SUCCESS, "add member success")
        .await;
    Ok(())
}

/// Persist new members, subscribe them to the live group and tell every
/// member (old and new) who joined.
pub async fn add_group_member(
    api: &ApiState,
    ctx: &RequestContext,
    p: &MembersParam,
) -> Result<Vec<GroupMemberRecord>> {
    let group = api.groups.get_group(p.gid).await?;
    let added = persist_new_members(api, group.gid, &p.uid).await?;

    let subscribed: HashMap<UserId, i32> = added.iter().map(|m| (m.uid, SUBSCRIBED)).collect();
    api.registry.put_members(group.gid, &subscribed).await?;

    let notice = Message::notify(
        actions::GROUP_ADD_MEMBER,
        GroupAddMemberNotice {
            gid: group.gid,
            members: added.clone(),
        },
    );
    api.registry.dispatch_notify(group.gid, &notice).await?;

    info!(gid = %group.gid, by = %ctx.uid, added = added.len(), "members added");
    Ok(added)
}

async fn persist_new_members(
    api: &ApiState,
    gid: GroupId,
    uids: &[UserId],
) -> Result<Vec<GroupMemberRecord>> {
    let existing: Vec<UserId> = api
        .groups
        .get_members(gid)
        .await?
        .into_iter()
        .map(|m| m.uid)
        .collect();

    let mut fresh: Vec<UserId> = Vec::with_capacity(uids.len());
    for &uid in uids {
        if !existing.contains(&uid) && !fresh.contains(&uid) {
            fresh.push(uid);
        }
    }
    if fresh.is_empty() {
        return Err(Error::business("already added"));
    }

    if !api.groups.has_users(&fresh).await? {
        return Err(Error::business("user does not exist"));
    }

    api.groups.add_members(gid, MemberKind::User, &fresh).await
}

pub(super) async fn join_group(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: GroupIdParam,
) -> Result<()> {
    let group = api.groups.get_group(p.gid).await?;
    persist_new_members(&api, group.gid, &[ctx.uid]).await?;
    api.registry
        .put_members(group.gid, &HashMap::from([(ctx.uid, SUBSCRIBED)]))
        .await?;

    let members = api.groups.get_members(group.gid).await?;
    api.respond(
        ctx.uid,
        ctx.seq,
        actions::SUCCESS,
        GroupResponse { group, members },
    )
    .await;
    Ok(())
}

pub(super) async fn exit_group(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: GroupIdParam,
) -> Result<()> {
    api.registry.remove_member(p.gid, ctx.uid).await?;
    api.groups.remove_member(p.gid, ctx.uid).await?;

    let notice = Message::notify(
        actions::GROUP_EXIT_MEMBER,
        GroupRemovedNotice {
            gid: p.gid,
            by: ctx.uid,
        },
    );
    api.registry.dispatch_notify(p.gid, &notice).await?;

    api.respond(ctx.uid, ctx.seq, actions::SUCCESS, "exit group success")
        .await;
    Ok(())
}

pub(super) async fn remove_member(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: MembersParam,
) -> Result<()> {
    for &uid in &p.uid {
        api.groups.remove_member(p.gid, uid).await?;
        // The stored membership is gone already; a group that cannot be
        // brought live has no subscription left to drop.
        if let Err(e) = api.registry.remove_member(p.gid, uid).await {
            warn!(gid = %p.gid, %uid, error = %e, "live group unavailable while removing member");
        }
        api.respond(
            uid,
            NOTIFY_SEQ,
            actions::GROUP_REMOVE_MEMBER,
            GroupRemovedNotice {
                gid: p.gid,
                by: ctx.uid,
            },
        )
        .await;
    }

    api.respond(ctx.uid, ctx.seq, actions::SUCCESS, "remove member success")
        .await;
    Ok(())
}

pub(super) async fn get_group_members(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: GroupIdParam,
) -> Result<()> {
    let members = api.groups.get_members(p.gid).await?;
    let live = api.registry.get(p.gid).await?;

    let out: Vec<GroupMemberResponse> = members
        .into_iter()
        .map(|m| GroupMemberResponse {
            uid: m.uid,
            remark: m.remark,
            kind: m.kind,
            subscribed: live.has_member(m.uid),
        })
        .collect();

    api.respond(ctx.uid, ctx.seq, actions::SUCCESS, out).await;
    Ok(())
}

pub(super) async fn get_group_info(
    api: Arc<ApiState>,
    ctx: RequestContext,
    p: GroupInfoParam,
) -> Result<()> {
    let mut out = Vec::with_capacity(p.gid.len());
    for gid in p.gid {
        let group = api.groups.get_group(gid).await?;
        let members = api.groups.get_members(gid).await?;
        out.push(GroupResponse { group, members });
    }

    api.respond(ctx.uid, ctx.seq, actions::SUCCESS, out).await;
    Ok(())
}
