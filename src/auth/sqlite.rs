use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{ AccountStore, NewUser, Session, User };
use crate::db::StoreError;

type UserRow = (i64, String, String, String, i64);
type SessionRow = (String, i64, String, i64, i64);

fn row_to_user((id, username, email, password_hash, created_at): UserRow) -> User {
    User { id, username, email, password_hash, created_at }
}

fn row_to_session((token, user_id, conversation_id, created_at, expires_at): SessionRow) -> Session {
    Session { token, user_id, conversation_id, created_at, expires_at }
}

#[derive(Clone, Debug)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let created_at = Utc::now().timestamp();
        let result = sqlx
            ::query(
                "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)"
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(created_at)
            .execute(&self.pool).await
            .map_err(StoreError::from_insert)?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx
            ::query_as(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE email = ?1"
            )
            .bind(email)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(row_to_user))
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx
            ::query_as("SELECT id, username, email, password_hash, created_at FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(row_to_user))
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, conversation_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        )
            .bind(&session.token)
            .bind(session.user_id)
            .bind(&session.conversation_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool).await
            .map_err(StoreError::from_insert)?;
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx
            ::query_as(
                "SELECT token, user_id, conversation_id, created_at, expires_at FROM sessions WHERE token = ?1"
            )
            .bind(token)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(row_to_session))
    }

    async fn set_conversation(&self, token: &str, conversation_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET conversation_id = ?1 WHERE token = ?2")
            .bind(conversation_id)
            .bind(token)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1").bind(token).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx
            ::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store() -> SqliteAccountStore {
        SqliteAccountStore::new(db::connect_in_memory().await.unwrap())
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "pbkdf2:sha256:1$s$00".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() {
        let store = store().await;
        store.create_user(new_user("ana", "ana@example.com")).await.unwrap();

        let err = store.create_user(new_user("ana2", "ana@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref f) if f == "email"), "{err:?}");

        let err = store.create_user(new_user("ana", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref f) if f == "username"), "{err:?}");
    }

    #[tokio::test]
    async fn users_are_found_by_email_and_id() {
        let store = store().await;
        let user = store.create_user(new_user("ana", "ana@example.com")).await.unwrap();
        assert_eq!(store.find_user_by_email("ana@example.com").await.unwrap(), Some(user.clone()));
        assert_eq!(store.find_user(user.id).await.unwrap(), Some(user));
        assert_eq!(store.find_user_by_email("nobody@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = store().await;
        let user = store.create_user(new_user("ana", "ana@example.com")).await.unwrap();
        let session = Session {
            token: "t1".into(),
            user_id: user.id,
            conversation_id: "c1".into(),
            created_at: 100,
            expires_at: 200,
        };
        store.create_session(&session).await.unwrap();
        assert_eq!(store.find_session("t1").await.unwrap(), Some(session.clone()));

        store.set_conversation("t1", "c2").await.unwrap();
        assert_eq!(store.find_session("t1").await.unwrap().unwrap().conversation_id, "c2");

        store.delete_session("t1").await.unwrap();
        assert_eq!(store.find_session("t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_sessions() {
        let store = store().await;
        let user = store.create_user(new_user("ana", "ana@example.com")).await.unwrap();
        for (token, expires_at) in [("old", 50), ("new", 500)] {
            store
                .create_session(
                    &(Session {
                        token: token.into(),
                        user_id: user.id,
                        conversation_id: "c".into(),
                        created_at: 0,
                        expires_at,
                    })
                ).await
                .unwrap();
        }

        assert_eq!(store.purge_expired_sessions(100).await.unwrap(), 1);
        assert!(store.find_session("old").await.unwrap().is_none());
        assert!(store.find_session("new").await.unwrap().is_some());
    }
}
