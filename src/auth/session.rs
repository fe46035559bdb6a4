use crate::entities::profile::Role;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

const TOKEN_LEN: usize = 48;

/// A server-side login session. The token is the only thing the client holds.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    #[serde(skip)]
    pub token: String,
    pub user_id: Uuid,
    pub branch_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Source of truth for sessions. Expiry is always judged against server time.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user_id: Uuid, branch_id: Uuid, role: Role, ttl: Duration) -> Session;

    /// Returns `None` for unknown or expired tokens.
    async fn get(&self, token: &str) -> Option<Session>;

    async fn revoke(&self, token: &str) -> bool;

    /// Revokes every session belonging to a user, returning how many were dropped.
    async fn revoke_user(&self, user_id: Uuid) -> usize;

    async fn purge_expired(&self) -> usize;
}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user_id: Uuid, branch_id: Uuid, role: Role, ttl: Duration) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            token: generate_token(),
            user_id,
            branch_id,
            role,
            created_at: now,
            expires_at: now + ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    async fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token).map(|s| s.clone())?;
        if session.is_expired_at(Utc::now()) {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    async fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    async fn revoke_user(&self, user_id: Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        before.saturating_sub(self.sessions.len())
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before.saturating_sub(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_session_round_trips_until_revoked() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = store
            .create(user, Uuid::new_v4(), Role::Sales, Duration::minutes(5))
            .await;
        assert_eq!(session.token.len(), TOKEN_LEN);

        let found = store.get(&session.token).await.unwrap();
        assert_eq!(found.user_id, user);

        assert!(store.revoke(&session.token).await);
        assert!(store.get(&session.token).await.is_none());
        assert!(!store.revoke(&session.token).await);
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let store = InMemorySessionStore::new();
        let expired = store
            .create(Uuid::new_v4(), Uuid::new_v4(), Role::Hr, Duration::seconds(-1))
            .await;
        let live = store
            .create(Uuid::new_v4(), Uuid::new_v4(), Role::Hr, Duration::hours(1))
            .await;

        assert!(store.get(&expired.token).await.is_none());
        assert_eq!(store.purge_expired().await, 0);
        assert!(store.get(&live.token).await.is_some());

        let stale = store
            .create(Uuid::new_v4(), Uuid::new_v4(), Role::Hr, Duration::seconds(-5))
            .await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get(&stale.token).await.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn revoke_user_drops_all_of_their_sessions() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let branch = Uuid::new_v4();
        store.create(user, branch, Role::Accounts, Duration::hours(1)).await;
        store.create(user, branch, Role::Accounts, Duration::hours(1)).await;
        let other = store
            .create(Uuid::new_v4(), branch, Role::Sales, Duration::hours(1))
            .await;

        assert_eq!(store.revoke_user(user).await, 2);
        assert!(store.get(&other.token).await.is_some());
    }
}
