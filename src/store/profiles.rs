/*
`Store` methods for the two related-skills tables, `mentees` and
`mentors`, as written by the creation forms.
*/
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::user::*;

fn mentee_from_row(row: &Row) -> Result<Mentee, DbError> {
    log::trace!("mentee_from_row( {:?} ) called", row);

    let study_level: Option<StudyLevel> = match row
        .try_get::<_, Option<&str>>("study_level")?
    {
        None => None,
        Some(s) => Some(s.parse()?),
    };

    Ok(Mentee {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        skills: row.try_get("skills")?,
        target_roles: row.try_get("target_roles")?,
        study_level,
        location: row.try_get("location")?,
        user_id: row.try_get("user_id")?,
    })
}

fn mentor_from_row(row: &Row) -> Result<Mentor, DbError> {
    log::trace!("mentor_from_row( {:?} ) called", row);

    let experience_level: Option<ExperienceLevel> = match row
        .try_get::<_, Option<&str>>("experience_level")?
    {
        None => None,
        Some(s) => Some(s.parse()?),
    };

    Ok(Mentor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        skills: row.try_get("skills")?,
        specialization_roles: row.try_get("specialization_roles")?,
        experience_level,
        location: row.try_get("location")?,
        user_id: row.try_get("user_id")?,
    })
}

impl Store {

    /// One insert call; returns the assigned id.
    pub async fn insert_mentee(&self, m: &Mentee) -> Result<i64, DbError> {
        log::trace!("Store::insert_mentee( {:?} ) called.", m);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO mentees
                (name, email, bio, skills, target_roles, study_level,
                 location, user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id",
            &[
                &m.name,
                &m.email,
                &m.bio,
                &m.skills,
                &m.target_roles,
                &m.study_level.map(|lvl| lvl.to_string()),
                &m.location,
                &m.user_id,
            ]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error inserting mentee")
        )?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted mentee {:?} with id {}.", &m.email, &id);
        Ok(id)
    }

    /// One insert call; returns the assigned id.
    pub async fn insert_mentor(&self, m: &Mentor) -> Result<i64, DbError> {
        log::trace!("Store::insert_mentor( {:?} ) called.", m);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO mentors
                (name, email, bio, skills, specialization_roles,
                 experience_level, location, user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id",
            &[
                &m.name,
                &m.email,
                &m.bio,
                &m.skills,
                &m.specialization_roles,
                &m.experience_level.map(|lvl| lvl.to_string()),
                &m.location,
                &m.user_id,
            ]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error inserting mentor")
        )?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted mentor {:?} with id {}.", &m.email, &id);
        Ok(id)
    }

    pub async fn get_mentee(&self, id: i64) -> Result<Option<Mentee>, DbError> {
        log::trace!("Store::get_mentee( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM mentees WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(mentee_from_row(&row)?)),
        }
    }

    pub async fn get_mentor(&self, id: i64) -> Result<Option<Mentor>, DbError> {
        log::trace!("Store::get_mentor( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM mentors WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(mentor_from_row(&row)?)),
        }
    }
}
