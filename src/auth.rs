/*!
Identity database interaction.

The auth DB is deliberately separate from the data DB: it holds only
identities (email + argon2 password hash, keyed by a stable id issued at
sign-up) and the session keys handed out at sign-in.

```sql
CREATE TABLE identities (
    id    TEXT PRIMARY KEY,    /* UUID issued at sign-up */
    email TEXT UNIQUE NOT NULL,
    hash  TEXT NOT NULL        /* argon2 PHC string */
);

CREATE TABLE session_keys (
    email TEXT NOT NULL REFERENCES identities(email),
    key   TEXT NOT NULL
);
```
*/
use std::fmt::Write;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use rand::{Rng, distributions};
use tokio_postgres::{Client, NoTls};

const KEY_LENGTH: usize = 32;
const KEY_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'identities'",
        "CREATE TABLE identities (
            id    TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            hash  TEXT NOT NULL
        )",
        "DROP TABLE identities",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'session_keys'",
        "CREATE TABLE session_keys (
            email TEXT NOT NULL REFERENCES identities(email),
            key   TEXT NOT NULL
        )",
        "DROP TABLE session_keys",
    ),
];

#[derive(Debug, PartialEq)]
pub struct AuthError(String);

impl AuthError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for AuthError {
    fn from(e: tokio_postgres::error::Error) -> AuthError {
        let mut s = format!("Auth DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        AuthError(s)
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(e: argon2::password_hash::Error) -> AuthError {
        AuthError(format!("Password hashing: {}", &e))
    }
}

impl From<String> for AuthError {
    fn from(s: String) -> AuthError { AuthError(s) }
}

/// Outcome of the operations that aren't plain errors: the caller must
/// distinguish "the collaborator worked fine and said no".
#[derive(Debug, PartialEq)]
pub enum AuthResult {
    Ok,
    Key(String),
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

pub struct Db {
    connection_string: String,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    /// Generate a fresh random session key.
    fn generate_key(&self) -> String {
        let chars: Vec<char> = KEY_CHARS.chars().collect();
        // KEY_CHARS is a nonempty literal, so the distribution is valid.
        let dist = distributions::Slice::new(&chars).unwrap();
        let rng = rand::thread_rng();
        rng.sample_iter(&dist).take(KEY_LENGTH).collect()
    }

    async fn connect(&self) -> Result<Client, AuthError> {
        log::trace!(
            "auth::Db::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let autherr = AuthError::from(e);
                log::trace!("    ...connection failed: {:?}", &autherr);
                Err(autherr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| AuthError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| AuthError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Sign up a new identity.

    Hashes the password and stores the identity under a freshly generated
    stable id, which is returned so callers can link data records to it.
    */
    pub async fn add_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        log::trace!("auth::Db::add_user( {:?}, [ password ] ) called.", email);

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        let id = uuid::Uuid::new_v4().to_string();

        let client = self.connect().await?;
        let n = client.execute(
            "INSERT INTO identities (id, email, hash)
                VALUES ($1, $2, $3)",
            &[&id, &email, &hash]
        ).await.map_err(|e|
            AuthError::from(e).annotate("Error inserting new identity")
        )?;

        if n != 1 {
            log::warn!(
                "Inserting single identity {:?} affected {} rows.", email, &n
            );
        }

        log::trace!("Inserted identity {:?} ({}).", email, &id);
        Ok(id)
    }

    /// Password sign-in check, without issuing a key.
    pub async fn check_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_password( {:?}, [ password ] ) called.", email);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT hash FROM identities WHERE email = $1",
            &[&email]
        ).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(row) => row,
        };

        let hash_string: String = row.try_get("hash")?;
        let parsed = PasswordHash::new(&hash_string)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(AuthResult::Ok),
            Err(argon2::password_hash::Error::Password) => Ok(AuthResult::BadPassword),
            Err(e) => Err(AuthError::from(e)
                .annotate("Error verifying password")),
        }
    }

    /// Password sign-in. On success a session key is generated, stored,
    /// and returned as `AuthResult::Key`.
    pub async fn check_password_and_issue_key(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?}, [ password ] ) called.",
            email
        );

        match self.check_password(email, password).await? {
            AuthResult::Ok => {},
            x => { return Ok(x); },
        }

        let key = self.generate_key();
        let client = self.connect().await?;
        client.execute(
            "INSERT INTO session_keys (email, key)
                VALUES ($1, $2)",
            &[&email, &key]
        ).await.map_err(|e|
            AuthError::from(e).annotate("Error storing session key")
        )?;

        Ok(AuthResult::Key(key))
    }

    /// Current-session lookup: is `key` a live session key for `email`?
    pub async fn check_key(
        &self,
        email: &str,
        key: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_key( {:?}, [ key ] ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT key FROM session_keys WHERE email = $1 AND key = $2",
            &[&email, &key]
        ).await? {
            Some(_) => Ok(AuthResult::Ok),
            None => Ok(AuthResult::InvalidKey),
        }
    }

    /// Sign out: revoke the given session key. Revoking a key that was
    /// never issued is not an error.
    pub async fn rm_key(
        &self,
        email: &str,
        key: &str,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::rm_key( {:?}, [ key ] ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM session_keys WHERE email = $1 AND key = $2",
            &[&email, &key]
        ).await?;

        if n == 0 {
            log::warn!("rm_key() for {:?} matched no stored key.", email);
        }
        Ok(())
    }

    /**
    Drop all auth database tables to fully reset database state.

    This is only meant for cleanup after testing.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = AuthError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    /*!
    These tests assume a local Postgres instance with resources matching
    `TEST_CONNECTION`:

    ```text
    user: mentordesk_test
    password: mentordesk_test

    with write access to:

    database: mentordesk_auth_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    static TEST_CONNECTION: &str =
        "host=localhost user=mentordesk_test password='mentordesk_test' dbname=mentordesk_auth_test";

    /// For getting the database back to a blank slate if a test panics
    /// partway through and leaves it munged:
    ///
    /// ```bash
    /// cargo test reset_auth -- --ignored
    /// ```
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_auth() {
        ensure_logging();
        let db = Db::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn password_round_trip() {
        ensure_logging();

        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.add_user("admin@example.com", "hunter2").await.unwrap();
        assert!(!id.is_empty());

        assert_eq!(
            db.check_password("admin@example.com", "hunter2").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("admin@example.com", "wrong").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("nobody@example.com", "hunter2").await.unwrap(),
            AuthResult::NoSuchUser
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn key_lifecycle() {
        ensure_logging();

        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.add_user("admin@example.com", "hunter2").await.unwrap();

        let key = match db.check_password_and_issue_key(
            "admin@example.com", "hunter2"
        ).await.unwrap() {
            AuthResult::Key(k) => k,
            x => panic!("expected a key, got {:?}", x),
        };

        assert_eq!(
            db.check_key("admin@example.com", &key).await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_key("admin@example.com", "bogus").await.unwrap(),
            AuthResult::InvalidKey
        );

        db.rm_key("admin@example.com", &key).await.unwrap();
        assert_eq!(
            db.check_key("admin@example.com", &key).await.unwrap(),
            AuthResult::InvalidKey
        );

        db.nuke_database().await.unwrap();
    }
}
