use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Email invitations to a chat
CREATE TABLE IF NOT EXISTS invitations (
    id            TEXT PRIMARY KEY NOT NULL,
    chat_id       TEXT NOT NULL,
    inviter_id    TEXT NOT NULL,
    invitee_email TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending', -- pending | accepted | declined
    created_at    TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (inviter_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_invitations_chat_email ON invitations(chat_id, invitee_email);

-- One push token per user
CREATE TABLE IF NOT EXISTS user_push_tokens (
    user_id    TEXT PRIMARY KEY NOT NULL,
    push_token TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- Password credentials of the local auth provider
CREATE TABLE IF NOT EXISTS credentials (
    user_id       TEXT PRIMARY KEY NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- argon2 PHC string
    display_name  TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
