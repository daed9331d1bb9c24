/*
`Store` methods for the base `users` table: the flat records shown in the
management view, plus the cross-table operations (the one-hop skills join,
the transactional delete, and the update-then-upsert of the update form).
*/
use tokio_postgres::{Row, types::ToSql};

use super::{Store, DbError};
use crate::user::*;

/**
Map a `users` row into the flat `User` shape.

`Ok(None)` means the row's type discriminant matched neither recognized
kind; such a row belongs to neither display group, so callers drop it
rather than failing the whole fetch.
*/
fn user_from_row(row: &Row) -> Result<Option<User>, DbError> {
    log::trace!("user_from_row( {:?} ) called", row);

    let kind_str: &str = row.try_get("user_type")?;
    let kind: UserKind = match kind_str.parse() {
        Ok(k) => k,
        Err(e) => {
            log::warn!("Dropping users row with unusable discriminant: {}", &e);
            return Ok(None);
        },
    };

    let status_str: &str = row.try_get("acc_status")?;
    let u = User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        dob: row.try_get("dob")?,
        kind,
        status: status_str.parse()?,
        auth_user_id: row.try_get("auth_user_id")?,
        skills: None,
    };

    Ok(Some(u))
}

impl Store {

    /// Inserts a fresh `users` row with status `active` and returns the
    /// assigned id. Exactly one insert call; optional fields go in as
    /// NULL, never as empty strings.
    pub async fn insert_user(&self, nu: &NewUser) -> Result<i64, DbError> {
        log::trace!("Store::insert_user( {:?} ) called.", nu);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO users
                (name, email, bio, dob, user_type, acc_status, auth_user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id",
            &[
                &nu.name,
                &nu.email,
                &nu.bio,
                &nu.dob,
                &nu.kind.to_string(),
                &AccountStatus::Active.to_string(),
                &nu.auth_user_id,
            ]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error inserting user")
        )?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted user {:?} with id {}.", &nu.email, &id);
        Ok(id)
    }

    /**
    Fetch every user, joined one hop against both related-skills tables,
    ordered by id ascending.

    Each row's skills come from whichever related table its discriminant
    selects; a missing related row leaves `skills` as `None`. Rows whose
    discriminant matches neither recognized kind are dropped (with a
    warning), so the result partitions cleanly into the two display
    groups.
    */
    pub async fn get_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT u.id, u.name, u.email, u.bio, u.dob, u.user_type,
                    u.acc_status, u.auth_user_id,
                    me.skills AS mentee_skills,
                    mo.skills AS mentor_skills
                FROM users u
                LEFT JOIN mentees me ON me.user_id = u.auth_user_id
                LEFT JOIN mentors mo ON mo.user_id = u.auth_user_id
                ORDER BY u.id ASC",
            &[]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let mut u = match user_from_row(row)? {
                Some(u) => u,
                None => { continue; },
            };
            u.skills = match u.kind {
                UserKind::Mentee => row.try_get("mentee_skills")?,
                UserKind::Mentor => row.try_get("mentor_skills")?,
            };
            users.push(u);
        }

        log::trace!("Store::get_users() returns {} users.", users.len());
        Ok(users)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_id( {} ) called.", id);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT * FROM users WHERE id = $1",
            &[&id]
        ).await? {
            None => { return Ok(None); },
            Some(row) => row,
        };

        match user_from_row(&row)? {
            Some(u) => Ok(Some(u)),
            None => Err(DbError(format!(
                "User {} has no recognizable type; no matching table.", id
            ))),
        }
    }

    /// Fetch the stored skills list for the related row keyed by the
    /// given identity reference. A "no rows" result is empty-but-valid
    /// (`Ok(None)`); any other failure propagates.
    pub async fn get_skills(
        &self,
        kind: UserKind,
        auth_user_id: &str,
    ) -> Result<Option<Vec<String>>, DbError> {
        log::trace!(
            "Store::get_skills( {}, {:?} ) called.", &kind, auth_user_id
        );

        let query = match kind {
            UserKind::Mentee => "SELECT skills FROM mentees WHERE user_id = $1",
            UserKind::Mentor => "SELECT skills FROM mentors WHERE user_id = $1",
        };

        let client = self.connect().await?;
        match client.query_opt(query, &[&auth_user_id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(row.try_get("skills")?)),
        }
    }

    /**
    The update form's whole write, in one transaction: update the user
    row, re-read its identity reference, pick the related table from the
    (possibly just-edited) kind, then update the related skills row if one
    exists or insert one otherwise.

    A missing user or a user with no identity reference is an error; the
    transaction never commits partially.
    */
    pub async fn update_user(
        &self,
        id: i64,
        upd: &UserUpdate,
        skills: &[String],
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::update_user( {}, {:?}, [ {} skills ] ) called.",
            id, upd, skills.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE users SET name = $1, email = $2, bio = $3, dob = $4,
                user_type = $5
                WHERE id = $6",
            &[
                &upd.name,
                &upd.email,
                &upd.bio,
                &upd.dob,
                &upd.kind.to_string(),
                &id,
            ]
        ).await?;
        if n == 0 {
            return Err(DbError(format!("There is no user with id {}.", id)));
        }

        let auth_ref: Option<String> = match t.query_opt(
            "SELECT auth_user_id FROM users WHERE id = $1",
            &[&id]
        ).await? {
            None => None,
            Some(row) => row.try_get("auth_user_id")?,
        };
        let auth_id = match auth_ref {
            Some(a) => a,
            None => {
                return Err(DbError(format!(
                    "User {} has no identity reference; cannot store skills.",
                    id
                )));
            },
        };

        let (check_stmt, update_stmt, insert_stmt) = match upd.kind {
            UserKind::Mentee => (
                "SELECT user_id FROM mentees WHERE user_id = $1",
                "UPDATE mentees SET skills = $1 WHERE user_id = $2",
                "INSERT INTO mentees (name, email, skills, target_roles, user_id)
                    VALUES ($1, $2, $3, '{}', $4)",
            ),
            UserKind::Mentor => (
                "SELECT user_id FROM mentors WHERE user_id = $1",
                "UPDATE mentors SET skills = $1 WHERE user_id = $2",
                "INSERT INTO mentors (name, email, skills, specialization_roles, user_id)
                    VALUES ($1, $2, $3, '{}', $4)",
            ),
        };

        // Upsert-by-existence; atomic because it shares the transaction
        // with the user update above.
        match t.query_opt(check_stmt, &[&auth_id]).await? {
            Some(_) => {
                t.execute(update_stmt, &[&skills, &auth_id]).await?;
                log::trace!("Updated existing skills row for {:?}.", &auth_id);
            },
            None => {
                t.execute(
                    insert_stmt,
                    &[&upd.name, &upd.email, &skills, &auth_id]
                ).await?;
                log::trace!("Inserted new skills row for {:?}.", &auth_id);
            },
        }

        t.commit().await?;
        Ok(())
    }

    /// Set a user's account status to `suspended`. Suspending an
    /// already-suspended user issues no update; there is no un-suspend.
    pub async fn suspend_user(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::suspend_user( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE users SET acc_status = $1
                WHERE id = $2 AND acc_status <> $1",
            &[&AccountStatus::Suspended.to_string(), &id]
        ).await?;

        match n {
            0 => { log::trace!("User {} already suspended (or absent).", id); },
            1 => { log::trace!("User {} suspended.", id); },
            n => {
                log::warn!(
                    "Suspending single user {} affected {} rows.", id, &n
                );
            },
        }
        Ok(())
    }

    /**
    Hard-deletes a user, regardless of kind.

    It's not clever; it shotgun-deletes any mentee and mentor rows keyed
    by the user's identity reference before deleting the `users` row,
    rather than querying the discriminant first. The whole thing runs in
    one transaction, so no orphaned skills row can survive it.
    */
    pub async fn delete_user(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let auth_ref: Option<String> = match t.query_opt(
            "SELECT auth_user_id FROM users WHERE id = $1",
            &[&id]
        ).await? {
            None => {
                return Err(DbError(format!("There is no user with id {}.", id)));
            },
            Some(row) => row.try_get("auth_user_id")?,
        };

        if let Some(ref auth_id) = auth_ref {
            let params: [&(dyn ToSql + Sync); 1] = [auth_id];

            let (me_del_res, mo_del_res) = tokio::join!(
                t.execute(
                    "DELETE FROM mentees WHERE user_id = $1",
                    &params[..]
                ),
                t.execute(
                    "DELETE FROM mentors WHERE user_id = $1",
                    &params[..]
                ),
            );

            match me_del_res {
                Err(e) => { return Err(e.into()); },
                Ok(0) => {},
                Ok(1) => { log::trace!("{} mentee record deleted.", id); },
                Ok(n) => {
                    log::warn!(
                        "Deleting single mentee record for user {} affected {} rows.",
                        id, &n
                    );
                },
            }
            match mo_del_res {
                Err(e) => { return Err(e.into()); },
                Ok(0) => {},
                Ok(1) => { log::trace!("{} mentor record deleted.", id); },
                Ok(n) => {
                    log::warn!(
                        "Deleting single mentor record for user {} affected {} rows.",
                        id, &n
                    );
                },
            }
        }

        let n = t.execute(
            "DELETE FROM users WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with id {}.", id)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    fn minimal_user(name: &str, email: &str, kind: UserKind) -> NewUser {
        NewUser {
            name: name.to_owned(),
            email: email.to_owned(),
            bio: None,
            dob: None,
            kind,
            auth_user_id: None,
        }
    }

    #[tokio::test]
    #[serial]
    async fn insert_fetch_partition_delete() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let a = db.insert_user(
            &minimal_user("Ada", "ada@example.com", UserKind::Mentee)
        ).await.unwrap();
        let b = db.insert_user(
            &minimal_user("Tom", "tom@example.com", UserKind::Mentor)
        ).await.unwrap();

        let users = db.get_users().await.unwrap();
        assert_eq!(users.len(), 2);
        // Ascending id order.
        assert!(users[0].id < users[1].id);
        // Mandatory-only creation stores optional fields as absent.
        for u in users.iter() {
            assert_eq!(u.bio, None);
            assert_eq!(u.dob, None);
            assert_eq!(u.skills, None);
            assert_eq!(u.status, AccountStatus::Active);
        }

        let n = users.len();
        let (mentees, mentors) = partition_by_kind(users);
        assert_eq!(mentees.len() + mentors.len(), n);
        assert_eq!(mentees[0].id, a);
        assert_eq!(mentors[0].id, b);

        db.delete_user(a).await.unwrap();
        db.delete_user(b).await.unwrap();
        assert!(db.get_users().await.unwrap().is_empty());
        assert!(db.delete_user(a).await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn fetch_drops_unusable_discriminants() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let good = db.insert_user(
            &minimal_user("Ada", "ada@example.com", UserKind::Mentee)
        ).await.unwrap();

        // Nothing in the application writes a discriminant like this,
        // but old hand-edited data might hold one.
        let client = db.connect().await.unwrap();
        let row = client.query_one(
            "INSERT INTO users (name, email, user_type, acc_status)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&"Odo", &"odo@example.com", &"wizard", &"active"]
        ).await.unwrap();
        let bad: i64 = row.try_get("id").unwrap();

        let users = db.get_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, good);

        // Singly fetched, where the kind is required, it's a hard error.
        assert!(db.get_user_by_id(bad).await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn fetch_joins_skills_from_related_row() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let draft = MenteeDraft {
            name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            bio: "".to_owned(),
            skills: "SQL, Python".to_owned(),
            target_roles: "".to_owned(),
            study_level: "".to_owned(),
            location: "".to_owned(),
        };
        let mut m = draft.into_mentee().unwrap();
        m.user_id = Some("auth-ada".to_owned());
        db.insert_mentee(&m).await.unwrap();

        let mut nu = minimal_user("Ada", "ada@example.com", UserKind::Mentee);
        nu.auth_user_id = Some("auth-ada".to_owned());
        db.insert_user(&nu).await.unwrap();
        // And one with no related row, whose skills stay absent.
        db.insert_user(
            &minimal_user("Tom", "tom@example.com", UserKind::Mentor)
        ).await.unwrap();

        let users = db.get_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(
            users[0].skills,
            Some(vec!["SQL".to_owned(), "Python".to_owned()])
        );
        assert_eq!(users[1].skills, None);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn suspend_is_sticky() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_user(
            &minimal_user("Ada", "ada@example.com", UserKind::Mentee)
        ).await.unwrap();

        db.suspend_user(id).await.unwrap();
        let u = db.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(u.status, AccountStatus::Suspended);

        // A second suspension is a no-op, not an error.
        db.suspend_user(id).await.unwrap();
        let u = db.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(u.status, AccountStatus::Suspended);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn update_upserts_skills() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut nu = minimal_user("Tom", "tom@example.com", UserKind::Mentor);
        nu.auth_user_id = Some("auth-tom".to_owned());
        let id = db.insert_user(&nu).await.unwrap();

        // No mentor row exists yet, so this first write must insert.
        let upd = UserUpdate {
            name: "Tom".to_owned(),
            email: "tom@example.com".to_owned(),
            bio: None,
            dob: None,
            kind: UserKind::Mentor,
        };
        let skills = vec!["Cryptography".to_owned()];
        db.update_user(id, &upd, &skills).await.unwrap();
        assert_eq!(
            db.get_skills(UserKind::Mentor, "auth-tom").await.unwrap(),
            Some(skills)
        );

        // Now a row exists, so the same call must update in place.
        let skills = vec!["Cryptography".to_owned(), "Cloud Security".to_owned()];
        db.update_user(id, &upd, &skills).await.unwrap();
        assert_eq!(
            db.get_skills(UserKind::Mentor, "auth-tom").await.unwrap(),
            Some(skills)
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn update_without_identity_reference_fails() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_user(
            &minimal_user("Ada", "ada@example.com", UserKind::Mentee)
        ).await.unwrap();

        let upd = UserUpdate {
            name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            bio: None,
            dob: None,
            kind: UserKind::Mentee,
        };
        assert!(
            db.update_user(id, &upd, &["SQL".to_owned()]).await.is_err()
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn delete_takes_related_rows_along() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut nu = minimal_user("Tom", "tom@example.com", UserKind::Mentor);
        nu.auth_user_id = Some("auth-tom".to_owned());
        let id = db.insert_user(&nu).await.unwrap();

        let upd = UserUpdate {
            name: "Tom".to_owned(),
            email: "tom@example.com".to_owned(),
            bio: None,
            dob: None,
            kind: UserKind::Mentor,
        };
        db.update_user(id, &upd, &["Go".to_owned()]).await.unwrap();
        assert!(
            db.get_skills(UserKind::Mentor, "auth-tom").await.unwrap().is_some()
        );

        db.delete_user(id).await.unwrap();
        assert!(db.get_user_by_id(id).await.unwrap().is_none());
        assert_eq!(
            db.get_skills(UserKind::Mentor, "auth-tom").await.unwrap(),
            None
        );

        db.nuke_database().await.unwrap();
    }
}
