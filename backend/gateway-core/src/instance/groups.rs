use crate::cache::ChatRecord;
use crate::error::instance::InstanceError;
use crate::instance::Instance;
use crate::jid;
use crate::protocol::{GroupAction, GroupMetadata, GroupSetting};

use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

const GROUP: &str = "Group";

/// Result of one participant in a paced membership update.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParticipantUpdateOutcome {
    Ok { participant: String, result: Value },
    Error { participant: String, error: String },
}

impl Instance {
    async fn require_group(&self, group_id: &str) -> Result<ChatRecord, InstanceError> {
        self.cache
            .read()
            .await
            .find_chat(group_id)
            .cloned()
            .ok_or_else(|| InstanceError::not_found(GROUP))
    }

    pub async fn get_all_groups(&self) -> Vec<ChatRecord> {
        self.cache.read().await.groups()
    }

    pub async fn create_group(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<GroupMetadata, InstanceError> {
        let session = self.logged_in_session().await?;
        let ids: Vec<String> = participants.iter().map(|p| jid::create_id(p)).collect();
        let group = session.group_create(subject, &ids).await?;
        info!("{} created group {} ({} members)", self.key, group.id, ids.len());
        Ok(group)
    }

    /// Applies `action` to each user in turn, sleeping the configured delay
    /// before every call. One failed participant never stops the rest.
    pub async fn update_group(
        &self,
        group_id: &str,
        users: &[String],
        action: GroupAction,
    ) -> Result<Vec<ParticipantUpdateOutcome>, InstanceError> {
        let group = self.require_group(group_id).await?;
        let session = self.logged_in_session().await?;
        let delay = self.deps.config.limits.group_update_delay();

        let mut outcomes = Vec::with_capacity(users.len());
        for user in users {
            tokio::time::sleep(delay).await;
            let participant = jid::create_id(user);
            let outcome = match session
                .group_participants_update(&group.id, std::slice::from_ref(&participant), action)
                .await
            {
                Ok(result) => ParticipantUpdateOutcome::Ok {
                    participant,
                    result,
                },
                Err(e) => {
                    warn!("{:?} of {} in {} failed: {}", action, participant, group.id, e);
                    ParticipantUpdateOutcome::Error {
                        participant,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub async fn change_group_settings(
        &self,
        group_id: &str,
        setting: GroupSetting,
    ) -> Result<(), InstanceError> {
        self.require_group(group_id).await?;
        let session = self.logged_in_session().await?;
        session.group_setting_update(group_id, setting).await?;
        Ok(())
    }

    pub async fn get_group_invite_code(&self, group_id: &str) -> Result<String, InstanceError> {
        self.require_group(group_id).await?;
        let session = self.logged_in_session().await?;
        Ok(session.group_invite_code(group_id).await?)
    }

    pub async fn leave_group(&self, group_id: &str) -> Result<(), InstanceError> {
        self.require_group(group_id).await?;
        let session = self.logged_in_session().await?;
        session.group_leave(group_id).await?;
        info!("{} left group {}", self.key, group_id);
        Ok(())
    }

    /// Fetches live metadata for a cached group. A failed fetch is
    /// `NotFound` when `raise_error` is set and `Ok(None)` otherwise.
    pub async fn get_group_info(
        &self,
        group_id: &str,
        raise_error: bool,
    ) -> Result<Option<GroupMetadata>, InstanceError> {
        self.require_group(group_id).await?;
        let session = self.logged_in_session().await?;
        match session.group_metadata(group_id).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if raise_error => {
                debug!("Metadata for {} unavailable: {}", group_id, e);
                Err(InstanceError::not_found(GROUP))
            }
            Err(e) => {
                debug!("Metadata for {} unavailable: {}", group_id, e);
                Ok(None)
            }
        }
    }

    /// Cached groups in which the logged-in account is an admin.
    pub async fn get_admin_groups(
        &self,
        with_participants: bool,
    ) -> Result<Vec<GroupMetadata>, InstanceError> {
        let user = self.require_login().await?;
        let own_id = jid::make_user_id(&user.id);

        let groups = self.get_all_groups().await;
        let lookups = join_all(groups.iter().map(|g| self.get_group_info(&g.id, false))).await;

        let mut admin_groups = Vec::new();
        for lookup in lookups {
            // Groups deleted since the listing come back as NotFound.
            let Ok(Some(mut metadata)) = lookup else {
                continue;
            };
            let is_admin = metadata
                .participants
                .iter()
                .any(|p| p.id == own_id && p.is_admin());
            if !is_admin {
                continue;
            }
            if !with_participants {
                metadata.participants.clear();
            }
            admin_groups.push(metadata);
        }
        Ok(admin_groups)
    }
}
