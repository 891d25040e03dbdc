//! Request parameters and reply bodies of the group API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gim_core::{
    domain::{GroupId, MemberKind, UserId},
    message::GroupMessage,
    ports::{GroupMemberRecord, GroupRecord},
    router::{invalid, Param},
    Result,
};

fn require_gid<P>(gid: GroupId) -> Result<()> {
    if gid.0 <= 0 {
        return Err(invalid::<P>(format!("gid must be positive, got {gid}")));
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateGroupParam {
    pub name: String,
    /// Users invited right away.
    #[serde(default)]
    pub member: Vec<UserId>,
}

impl Param for CreateGroupParam {
    const VALIDATES: bool = true;

    fn validate(&self, _raw: &Value) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid::<Self>("group name is required"));
        }
        Ok(())
    }
}

/// Parameter of the single-group actions (join, exit, members).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GroupIdParam {
    pub gid: GroupId,
}

impl Param for GroupIdParam {
    const VALIDATES: bool = true;

    fn validate(&self, _raw: &Value) -> Result<()> {
        require_gid::<Self>(self.gid)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MembersParam {
    pub gid: GroupId,
    pub uid: Vec<UserId>,
}

impl Param for MembersParam {
    const VALIDATES: bool = true;

    fn validate(&self, _raw: &Value) -> Result<()> {
        require_gid::<Self>(self.gid)?;
        if self.uid.is_empty() {
            return Err(invalid::<Self>("uid list is empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GroupInfoParam {
    pub gid: Vec<GroupId>,
}

impl Param for GroupInfoParam {
    const VALIDATES: bool = true;

    fn validate(&self, _raw: &Value) -> Result<()> {
        if self.gid.is_empty() {
            return Err(invalid::<Self>("gid list is empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SendGroupMessageParam {
    pub gid: GroupId,
    #[serde(flatten)]
    pub message: GroupMessage,
}

impl Param for SendGroupMessageParam {
    const VALIDATES: bool = true;

    fn validate(&self, _raw: &Value) -> Result<()> {
        require_gid::<Self>(self.gid)?;
        if self.message.message.is_empty() {
            return Err(invalid::<Self>("message is empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: GroupRecord,
    pub members: Vec<GroupMemberRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberResponse {
    pub uid: UserId,
    pub remark: String,
    pub kind: MemberKind,
    /// Whether the member currently receives the group's pushes.
    pub subscribed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupAddMemberNotice {
    pub gid: GroupId,
    pub members: Vec<GroupMemberRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRemovedNotice {
    pub gid: GroupId,
    pub by: UserId,
}
