use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::db::{Database, IN_MEMORY};
use crate::error::ChatResult;
use crate::identity::{IdentityVerifier, JwtVerifier};
use crate::ids::{PostId, UserId};
use crate::models::UserSummary;
use crate::notifications::RoomNotifier;
use crate::posts::{PostInfo, SqlitePostDirectory};
use crate::services::{ChatDirectory, ChatLocks, MembershipSynchronizer, MessageService};
use crate::state::RoomRegistry;
use crate::users::SqliteUserDirectory;

/// Everything a request handler or gateway connection needs, wired once.
pub struct AppContext {
    pub db: Arc<Database>,
    pub users: Arc<SqliteUserDirectory>,
    pub posts: Arc<SqlitePostDirectory>,
    pub rooms: Arc<RoomRegistry>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub chats: Arc<ChatDirectory>,
    pub messages: Arc<MessageService>,
    pub membership: Arc<MembershipSynchronizer>,
}

impl AppContext {
    pub fn new(db: Database, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let db = Arc::new(db);
        let users = Arc::new(SqliteUserDirectory::new(db.clone()));
        let posts = Arc::new(SqlitePostDirectory::new(db.clone()));
        let rooms = Arc::new(RoomRegistry::new());
        let locks = Arc::new(ChatLocks::new());
        let notifier = Arc::new(RoomNotifier::new(rooms.clone()));

        let chats = Arc::new(ChatDirectory::new(
            db.clone(),
            users.clone(),
            posts.clone(),
            rooms.clone(),
            locks.clone(),
        ));
        let messages = Arc::new(MessageService::new(
            db.clone(),
            users.clone(),
            rooms.clone(),
            notifier,
            locks,
        ));
        let membership = Arc::new(MembershipSynchronizer::new(chats.clone(), posts.clone()));

        Self {
            db,
            users,
            posts,
            rooms,
            verifier,
            chats,
            messages,
            membership,
        }
    }

    pub fn from_config(config: &ServerConfig) -> ChatResult<Self> {
        let db = Database::open(&config.database_path, config.store_timeout)?;
        Ok(Self::new(db, Arc::new(JwtVerifier::new(&config.jwt_secret))))
    }

    /// Context over a private in-memory database, for tests and local runs.
    pub fn in_memory(jwt_secret: &str) -> ChatResult<Self> {
        let db = Database::open(IN_MEMORY, Duration::from_secs(5))?;
        Ok(Self::new(db, Arc::new(JwtVerifier::new(jwt_secret))))
    }

    pub async fn seed_user(&self, id: &str, username: &str) -> ChatResult<()> {
        self.users
            .upsert_user(UserSummary {
                id: UserId::from(id),
                username: username.to_string(),
                profile_image_url: None,
            })
            .await
    }

    pub async fn seed_post(
        &self,
        id: &str,
        author: &str,
        title: &str,
        is_event: bool,
        event_starts_at: Option<i64>,
    ) -> ChatResult<()> {
        self.posts
            .upsert_post(PostInfo {
                id: PostId::from(id),
                author_id: UserId::from(author),
                title: title.to_string(),
                is_event,
                event_starts_at,
            })
            .await
    }

    pub async fn seed_event(
        &self,
        id: &str,
        author: &str,
        title: &str,
        event_starts_at: Option<i64>,
    ) -> ChatResult<()> {
        self.seed_post(id, author, title, true, event_starts_at).await
    }
}
