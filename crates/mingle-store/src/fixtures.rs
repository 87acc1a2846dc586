//! Row builders shared by the unit tests of this crate.

use chrono::Utc;

use mingle_shared::types::{ChatId, UserId};

use crate::database::Database;
use crate::models::{Chat, ChatSettings, User};

pub(crate) fn sample_user(name: &str) -> User {
    User {
        id: UserId::new(),
        email: format!("{name}@mingle.test"),
        display_name: name.to_string(),
        avatar_url: None,
        online_at: None,
        created_at: Utc::now(),
    }
}

pub(crate) fn sample_chat(name: &str, owner: UserId) -> Chat {
    Chat {
        id: ChatId::new(),
        name: name.to_string(),
        is_group: false,
        created_by: owner,
        settings: ChatSettings::default(),
        created_at: Utc::now(),
    }
}

/// Database with one user and one chat owned by that user.
pub(crate) fn seeded() -> (Database, User, Chat) {
    let db = Database::open_in_memory().unwrap();
    let user = sample_user("owner");
    db.insert_user(&user).unwrap();
    let chat = sample_chat("Team", user.id);
    db.insert_chat(&chat).unwrap();
    (db, user, chat)
}
