// Group operations: lifecycle, membership, shared data, permissions, inputs.
//
// A group is a named server-side session with one host and any number of
// members. The client models it as a string identifier; everything else
// (roles, passwords, grants) lives on the server.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Knecht;
use crate::error::KnechtError;

/// Access level a host grants a member on a group data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// No access; revokes an earlier grant.
    None,
    /// The member may read the field.
    Read,
    /// The member may read and overwrite the field.
    Write,
}

impl Permission {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Permission::None => "none",
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }
}

impl Knecht {
    // ── Group lifecycle ──────────────────────────────────────────────

    /// Open a new group with the logged-in user as host. A `password`,
    /// when given, is required from joining members.
    pub async fn start_group(
        &self,
        group: &str,
        password: Option<&str>,
    ) -> Result<(), KnechtError> {
        // The password travels as the request body; a JSON null means an
        // open group.
        let body = match password {
            Some(p) => Value::String(p.to_string()),
            None => Value::Null,
        };
        self.with_relogin(|auth| {
            let body = &body;
            async move {
                let resp = self
                    .request_auth(
                        &auth,
                        Method::POST,
                        "/groups",
                        &[("group_name", group)],
                        Some(body),
                    )
                    .await;
                Self::check(resp).map(drop)
            }
        })
        .await?;
        tracing::info!("started group {group}");
        Ok(())
    }

    /// Close a group this user hosts. Members stop receiving updates.
    pub async fn close_group(&self, group: &str) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::DELETE,
                    "/groups",
                    &[("group_name", group)],
                    None,
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await?;
        tracing::info!("closed group {group}");
        Ok(())
    }

    // ── Membership ───────────────────────────────────────────────────

    /// Add `member` to a group, supplying the group password if it has
    /// one. The membership check itself is the server's concern.
    pub async fn add_member(
        &self,
        group: &str,
        member: &str,
        password: Option<&str>,
    ) -> Result<(), KnechtError> {
        self.with_relogin(|auth| {
            let mut extra: Vec<(&str, &str)> = vec![("group_name", group), ("member", member)];
            if let Some(password) = password {
                extra.push(("password", password));
            }
            async move {
                let resp = self
                    .request_auth(&auth, Method::POST, "/groups/members", &extra, None)
                    .await;
                Self::check(resp).map(drop)
            }
        })
        .await
    }

    /// Remove `member` from a group.
    pub async fn remove_member(&self, group: &str, member: &str) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::DELETE,
                    "/groups/members",
                    &[("group_name", group), ("member", member)],
                    None,
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await
    }

    // ── Group data ───────────────────────────────────────────────────

    /// Write `value` under `field` in the group's shared data. With
    /// `member`, the write targets that member's view only; `permission`
    /// applies a grant together with the write.
    pub async fn submit_group_data(
        &self,
        group: &str,
        field: &str,
        value: &Value,
        member: Option<&str>,
        permission: Option<Permission>,
    ) -> Result<(), KnechtError> {
        self.with_relogin(|auth| {
            let mut extra: Vec<(&str, &str)> = vec![("group_name", group), ("field", field)];
            if let Some(member) = member {
                extra.push(("member", member));
            }
            if let Some(permission) = permission {
                extra.push(("permission", permission.as_str()));
            }
            async move {
                let resp = self
                    .request_auth(&auth, Method::PUT, "/groups/data", &extra, Some(value))
                    .await;
                Self::check(resp).map(drop)
            }
        })
        .await
    }

    /// Read the value stored under `field` in the group's shared data.
    /// Hosts can pass `member` to read a member's view.
    pub async fn get_group_data(
        &self,
        group: &str,
        field: &str,
        member: Option<&str>,
    ) -> Result<Value, KnechtError> {
        self.with_relogin(|auth| {
            let mut extra: Vec<(&str, &str)> = vec![("group_name", group), ("field", field)];
            if let Some(member) = member {
                extra.push(("member", member));
            }
            async move {
                let resp = self
                    .request_auth(&auth, Method::GET, "/groups/data", &extra, None)
                    .await;
                Self::check(resp)?.field("data")
            }
        })
        .await
    }

    /// Grant or revoke a member's access to a group data field.
    pub async fn set_permission(
        &self,
        group: &str,
        field: &str,
        member: &str,
        permission: Permission,
    ) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::PUT,
                    "/groups/data/permissions",
                    &[
                        ("group_name", group),
                        ("field", field),
                        ("member", member),
                        ("permission", permission.as_str()),
                    ],
                    None,
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Send an input payload to the group's host. The host receives it
    /// through its input poll loop.
    pub async fn submit_input(&self, group: &str, input: &Value) -> Result<(), KnechtError> {
        self.with_relogin(|auth| async move {
            let resp = self
                .request_auth(
                    &auth,
                    Method::POST,
                    "/groups/input",
                    &[("group_name", group)],
                    Some(input),
                )
                .await;
            Self::check(resp).map(drop)
        })
        .await
    }
}
