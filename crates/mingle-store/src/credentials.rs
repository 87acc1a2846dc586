//! Password credentials for the local auth provider.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use mingle_shared::types::UserId;

use crate::database::{fmt_ts, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: UserId,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Credential(e.to_string()))
}

/// `Ok(false)` on a wrong password, `Err` only if the stored hash is corrupt.
pub fn verify_password(password: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|e| StoreError::Credential(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl Database {
    pub fn insert_credential(&self, credential: &Credential) -> Result<()> {
        self.conn().execute(
            "INSERT INTO credentials (user_id, email, password_hash, display_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                credential.user_id.to_string(),
                credential.email,
                credential.password_hash,
                credential.display_name,
                fmt_ts(&credential.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_credential_by_email(&self, email: &str) -> Result<Option<Credential>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT user_id, email, password_hash, display_name, created_at
                 FROM credentials WHERE email = ?1",
                params![email],
                |row| {
                    let id_str: String = row.get(0)?;
                    let ts_str: String = row.get(4)?;
                    Ok(Credential {
                        user_id: UserId(parse_uuid(0, &id_str)?),
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                        display_name: row.get(3)?,
                        created_at: parse_ts(4, &ts_str)?,
                    })
                },
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let phc = hash_password("correct horse").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password("correct horse", &phc).unwrap());
        assert!(!verify_password("battery staple", &phc).unwrap());
    }

    #[test]
    fn email_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let credential = Credential {
            user_id: UserId::new(),
            email: "ada@mingle.test".into(),
            password_hash: hash_password("pw123456").unwrap(),
            display_name: "Ada".into(),
            created_at: Utc::now(),
        };
        db.insert_credential(&credential).unwrap();

        let mut twin = credential.clone();
        twin.user_id = UserId::new();
        assert!(db.insert_credential(&twin).is_err());

        let found = db.find_credential_by_email("ada@mingle.test").unwrap().unwrap();
        assert_eq!(found.user_id, credential.user_id);
        assert!(db.find_credential_by_email("nobody@x.io").unwrap().is_none());
    }
}
