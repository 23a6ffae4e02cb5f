//! Group collaborator and membership oracle.
//!
//! The message core only reads groups through [`GroupDirectory::get_group`] and
//! [`ensure_member`]; creation and membership changes are plain CRUD used by the
//! collaborator endpoints.

use async_trait::async_trait;
use chiacchiera_core::{models::Group, now_timestamp, utils::new_id};
use sqlx::{Row, SqlitePool};

use crate::auth::user_exists;
use crate::error::{ChatError, Result};

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// `NotFound` if the group does not exist.
    async fn get_group(&self, group_id: &str) -> Result<Group>;

    async fn create_group(&self, creator_id: &str, name: &str, members: &[String]) -> Result<Group>;

    /// Adds `user_id` to the group. Only the creator may do it; adding a member twice is a no-op.
    async fn add_member(&self, group_id: &str, actor_id: &str, user_id: &str) -> Result<Group>;

    /// Groups the user belongs to, oldest first.
    async fn groups_of(&self, user_id: &str) -> Result<Vec<Group>>;
}

/// "Is user U a member of group G": `NotFound` if G is absent, `Unauthorized` if U is not a member.
pub async fn ensure_member(groups: &dyn GroupDirectory, group_id: &str, user_id: &str) -> Result<Group> {
    let group = groups.get_group(group_id).await?;
    if !group.has_member(user_id) {
        return Err(ChatError::unauthorized("not a member of this group"));
    }
    Ok(group)
}

#[derive(Clone)]
pub struct SqliteGroups {
    pool: SqlitePool,
}

impl SqliteGroups {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn members_of(&self, group_id: &str) -> Result<Vec<String>> {
        let members: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM memberships WHERE group_id = ? ORDER BY joined_at, rowid",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }
}

#[async_trait]
impl GroupDirectory for SqliteGroups {
    async fn get_group(&self, group_id: &str) -> Result<Group> {
        let row = sqlx::query("SELECT group_id, name, creator_id, created_at FROM groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ChatError::not_found("group not found"))?;
        Ok(Group {
            group_id: row.try_get("group_id")?,
            name: row.try_get("name")?,
            creator_id: row.try_get("creator_id")?,
            created_at: row.try_get("created_at")?,
            members: self.members_of(group_id).await?,
        })
    }

    async fn create_group(&self, creator_id: &str, name: &str, members: &[String]) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::invalid("group name is required"));
        }
        // il creatore è sempre membro, senza duplicati
        let mut all = vec![creator_id.to_string()];
        for m in members {
            if !all.contains(m) {
                all.push(m.clone());
            }
        }
        for m in &all[1..] {
            if !user_exists(&self.pool, m).await? {
                return Err(ChatError::invalid(format!("unknown user {}", m)));
            }
        }

        let group_id = new_id();
        let created_at = now_timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO groups (group_id, name, creator_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(&group_id)
            .bind(name)
            .bind(creator_id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        for m in &all {
            sqlx::query("INSERT INTO memberships (membership_id, group_id, user_id, joined_at) VALUES (?, ?, ?, ?)")
                .bind(new_id())
                .bind(&group_id)
                .bind(m)
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(group_id = %group_id, creator = %creator_id, members = all.len(), "group created");
        Ok(Group {
            group_id,
            name: name.to_string(),
            creator_id: creator_id.to_string(),
            members: all,
            created_at,
        })
    }

    async fn add_member(&self, group_id: &str, actor_id: &str, user_id: &str) -> Result<Group> {
        let group = self.get_group(group_id).await?;
        if group.creator_id != actor_id {
            return Err(ChatError::unauthorized("only the group creator can add members"));
        }
        if !user_exists(&self.pool, user_id).await? {
            return Err(ChatError::not_found("user not found"));
        }
        sqlx::query(
            "INSERT OR IGNORE INTO memberships (membership_id, group_id, user_id, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(group_id)
        .bind(user_id)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        self.get_group(group_id).await
    }

    async fn groups_of(&self, user_id: &str) -> Result<Vec<Group>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT g.group_id FROM groups g JOIN memberships m ON m.group_id = g.group_id WHERE m.user_id = ? ORDER BY g.created_at, g.rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            groups.push(self.get_group(&id).await?);
        }
        Ok(groups)
    }
}
