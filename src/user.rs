/*!
Domain types for the records the administrator manages, plus the one
normalization rule in the system (comma-delimited text into lists) and
the conversions from raw form drafts into storable records.
*/
use time::Date;

use crate::DATE_FMT;

/// The discriminant distinguishing which related-skills table a `User`
/// row maps to.
///
/// Older revisions of the data wrote `student`/`tutor` here, newer ones
/// `Mentee`/`Mentor`. Parsing accepts all four (case-insensitively);
/// rendering always produces the canonical `Mentee`/`Mentor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserKind {
    Mentee,
    Mentor,
}

impl std::fmt::Display for UserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            UserKind::Mentee => "Mentee",
            UserKind::Mentor => "Mentor",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for UserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mentee" | "student" => Ok(UserKind::Mentee),
            "mentor" | "tutor" => Ok(UserKind::Mentor),
            _ => Err(format!("{:?} is not a valid UserKind.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            _ => Err(format!("{:?} is not a valid AccountStatus.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StudyLevel {
    Undergraduate,
    Postgraduate,
    Bootcamp,
    SelfTaught,
    ProfessionalDevelopment,
    Other,
}

impl std::fmt::Display for StudyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            StudyLevel::Undergraduate => "Undergraduate",
            StudyLevel::Postgraduate => "Postgraduate",
            StudyLevel::Bootcamp => "Bootcamp",
            StudyLevel::SelfTaught => "Self-taught",
            StudyLevel::ProfessionalDevelopment => "Professional Development",
            StudyLevel::Other => "Other",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for StudyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Undergraduate" => Ok(StudyLevel::Undergraduate),
            "Postgraduate" => Ok(StudyLevel::Postgraduate),
            "Bootcamp" => Ok(StudyLevel::Bootcamp),
            "Self-taught" => Ok(StudyLevel::SelfTaught),
            "Professional Development" => Ok(StudyLevel::ProfessionalDevelopment),
            "Other" => Ok(StudyLevel::Other),
            _ => Err(format!("{:?} is not a valid StudyLevel.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExperienceLevel {
    MidLevel,
    Senior,
    Expert,
    Principal,
    Executive,
}

impl std::fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            ExperienceLevel::MidLevel => "Mid-level",
            ExperienceLevel::Senior => "Senior",
            ExperienceLevel::Expert => "Expert",
            ExperienceLevel::Principal => "Principal",
            ExperienceLevel::Executive => "Executive",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mid-level" => Ok(ExperienceLevel::MidLevel),
            "Senior" => Ok(ExperienceLevel::Senior),
            "Expert" => Ok(ExperienceLevel::Expert),
            "Principal" => Ok(ExperienceLevel::Principal),
            "Executive" => Ok(ExperienceLevel::Executive),
            _ => Err(format!("{:?} is not a valid ExperienceLevel.", s)),
        }
    }
}

/// A row of the `users` table, as presented in the management view.
///
/// `skills` is populated by the one-hop join against whichever of the
/// mentee/mentor tables the kind selects; `None` when no related row
/// exists.
#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub dob: Option<Date>,
    pub kind: UserKind,
    pub status: AccountStatus,
    /// Identity reference into the auth DB, when one has been linked.
    pub auth_user_id: Option<String>,
    pub skills: Option<Vec<String>>,
}

/// Field set for inserting a fresh `users` row. Status always starts
/// `active`; the id is assigned by the database.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub dob: Option<Date>,
    pub kind: UserKind,
    pub auth_user_id: Option<String>,
}

/// Editable field set for the update form. Suspension state and the
/// identity reference are not editable there.
#[derive(Clone, Debug)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub dob: Option<Date>,
    pub kind: UserKind,
}

#[derive(Clone, Debug)]
pub struct Mentee {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub target_roles: Vec<String>,
    pub study_level: Option<StudyLevel>,
    pub location: Option<String>,
    /// Identity reference of the linked `users` row, if any.
    pub user_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Mentor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub specialization_roles: Vec<String>,
    pub experience_level: Option<ExperienceLevel>,
    pub location: Option<String>,
    pub user_id: Option<String>,
}

/// Split a comma-delimited text field into a list: split on commas, trim
/// each segment, discard empties. This is the only normalization rule in
/// the system, and it is idempotent.
pub fn split_delimited(text: &str) -> Vec<String> {
    text.split(',')
        .map(|seg| seg.trim())
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.to_owned())
        .collect()
}

/// Optional form fields left empty are stored as absent, never as `""`.
pub fn blank_means_none(s: &str) -> Option<&str> {
    match s.trim() {
        "" => None,
        x => Some(x),
    }
}

/// Partition a fetched list by kind into (mentees, mentors). Total: every
/// `User` lands in exactly one group. (Rows whose stored discriminant
/// matched neither recognized literal were already dropped during row
/// mapping in the store.)
pub fn partition_by_kind(users: Vec<User>) -> (Vec<User>, Vec<User>) {
    let mut mentees: Vec<User> = Vec::with_capacity(users.len());
    let mut mentors: Vec<User> = Vec::new();

    for u in users.into_iter() {
        match u.kind {
            UserKind::Mentee => { mentees.push(u); },
            UserKind::Mentor => { mentors.push(u); },
        }
    }

    (mentees, mentors)
}

fn parse_optional_date(s: &str) -> Result<Option<Date>, String> {
    match blank_means_none(s) {
        None => Ok(None),
        Some(text) => match Date::parse(text, DATE_FMT) {
            Ok(d) => Ok(Some(d)),
            Err(e) => Err(format!("Unable to parse {:?} as a date: {}", text, &e)),
        },
    }
}

/// Raw form data from the generic create-user page. Every field arrives
/// as text; conversion applies the normalization rules above.
#[derive(Debug, serde::Deserialize)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub dob: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl UserDraft {
    pub fn into_new_user(self) -> Result<NewUser, String> {
        let kind: UserKind = self.kind.parse()?;
        let dob = parse_optional_date(&self.dob)?;

        Ok(NewUser {
            name: self.name,
            email: self.email,
            bio: blank_means_none(&self.bio).map(|s| s.to_owned()),
            dob,
            kind,
            auth_user_id: None,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct MenteeDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub target_roles: String,
    #[serde(default)]
    pub study_level: String,
    #[serde(default)]
    pub location: String,
}

impl MenteeDraft {
    pub fn into_mentee(self) -> Result<Mentee, String> {
        let study_level = match blank_means_none(&self.study_level) {
            None => None,
            Some(text) => Some(text.parse::<StudyLevel>()?),
        };

        Ok(Mentee {
            // Assigned upon database insertion.
            id: 0,
            name: self.name,
            email: self.email,
            bio: blank_means_none(&self.bio).map(|s| s.to_owned()),
            skills: split_delimited(&self.skills),
            target_roles: split_delimited(&self.target_roles),
            study_level,
            location: blank_means_none(&self.location).map(|s| s.to_owned()),
            user_id: None,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct MentorDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub specialization_roles: String,
    #[serde(default)]
    pub experience_level: String,
    #[serde(default)]
    pub location: String,
}

impl MentorDraft {
    pub fn into_mentor(self) -> Result<Mentor, String> {
        let experience_level = match blank_means_none(&self.experience_level) {
            None => None,
            Some(text) => Some(text.parse::<ExperienceLevel>()?),
        };

        Ok(Mentor {
            id: 0,
            name: self.name,
            email: self.email,
            bio: blank_means_none(&self.bio).map(|s| s.to_owned()),
            skills: split_delimited(&self.skills),
            specialization_roles: split_delimited(&self.specialization_roles),
            experience_level,
            location: blank_means_none(&self.location).map(|s| s.to_owned()),
            user_id: None,
        })
    }
}

/// Raw form data from the update page: the user fields plus the edited
/// skills as comma-delimited text.
#[derive(Debug, serde::Deserialize)]
pub struct UpdateDraft {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub dob: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub skills: String,
}

impl UpdateDraft {
    pub fn into_update(self) -> Result<(UserUpdate, Vec<String>), String> {
        let kind: UserKind = self.kind.parse()?;
        let dob = parse_optional_date(&self.dob)?;
        let skills = split_delimited(&self.skills);

        let upd = UserUpdate {
            name: self.name,
            email: self.email,
            bio: blank_means_none(&self.bio).map(|s| s.to_owned()),
            dob,
            kind,
        };

        Ok((upd, skills))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_discards_empty_segments() {
        assert_eq!(
            split_delimited("Python, , Go,Go "),
            vec!["Python".to_owned(), "Go".to_owned(), "Go".to_owned()]
        );
        assert_eq!(split_delimited(""), Vec::<String>::new());
        assert_eq!(split_delimited(" , ,, "), Vec::<String>::new());
    }

    #[test]
    fn split_is_idempotent() {
        let inputs = ["Python, , Go,Go ", "SQL, Python", "", "  a  ,b,  "];
        for input in inputs.iter() {
            let once = split_delimited(input);
            let again = split_delimited(&once.join(","));
            assert_eq!(once, again);
        }
    }

    #[test]
    fn blank_fields_become_none() {
        assert_eq!(blank_means_none(""), None);
        assert_eq!(blank_means_none("   "), None);
        assert_eq!(blank_means_none(" x "), Some("x"));
    }

    #[test]
    fn kind_parses_all_observed_literals() {
        assert_eq!("Mentee".parse::<UserKind>(), Ok(UserKind::Mentee));
        assert_eq!("Mentor".parse::<UserKind>(), Ok(UserKind::Mentor));
        assert_eq!("student".parse::<UserKind>(), Ok(UserKind::Mentee));
        assert_eq!("tutor".parse::<UserKind>(), Ok(UserKind::Mentor));
        assert_eq!("MENTOR".parse::<UserKind>(), Ok(UserKind::Mentor));
        assert!("boss".parse::<UserKind>().is_err());
    }

    fn dummy_user(id: i64, kind: UserKind) -> User {
        User {
            id,
            name: format!("User {}", id),
            email: format!("u{}@example.com", id),
            bio: None,
            dob: None,
            kind,
            status: AccountStatus::Active,
            auth_user_id: None,
            skills: None,
        }
    }

    #[test]
    fn partition_is_total() {
        let users = vec![
            dummy_user(1, UserKind::Mentee),
            dummy_user(2, UserKind::Mentor),
            dummy_user(3, UserKind::Mentee),
        ];
        let n = users.len();

        let (mentees, mentors) = partition_by_kind(users);
        assert_eq!(mentees.len() + mentors.len(), n);
        assert!(mentees.iter().all(|u| u.kind == UserKind::Mentee));
        assert!(mentors.iter().all(|u| u.kind == UserKind::Mentor));
    }

    #[test]
    fn mentee_draft_normalizes() {
        let draft = MenteeDraft {
            name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            bio: "".to_owned(),
            skills: "SQL, Python".to_owned(),
            target_roles: "".to_owned(),
            study_level: "Self-taught".to_owned(),
            location: "  ".to_owned(),
        };

        let m = draft.into_mentee().unwrap();
        assert_eq!(m.skills, vec!["SQL".to_owned(), "Python".to_owned()]);
        assert_eq!(m.target_roles, Vec::<String>::new());
        assert_eq!(m.bio, None);
        assert_eq!(m.location, None);
        assert_eq!(m.study_level, Some(StudyLevel::SelfTaught));
    }

    #[test]
    fn user_draft_requires_recognizable_kind() {
        let draft = UserDraft {
            name: "Bob".to_owned(),
            email: "bob@example.com".to_owned(),
            bio: "".to_owned(),
            dob: "1990-02-01".to_owned(),
            kind: "wizard".to_owned(),
        };
        assert!(draft.into_new_user().is_err());

        let draft = UserDraft {
            name: "Bob".to_owned(),
            email: "bob@example.com".to_owned(),
            bio: "".to_owned(),
            dob: "".to_owned(),
            kind: "tutor".to_owned(),
        };
        let nu = draft.into_new_user().unwrap();
        assert_eq!(nu.kind, UserKind::Mentor);
        assert_eq!(nu.dob, None);
        assert_eq!(nu.bio, None);
    }
}
