/*!
Handlers for the admin-facing pages: the session gate, the dashboard,
the three record-creation forms, the update form, and the listing view
with its suspend/delete row actions.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Form, Path},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::Glob;
use crate::{auth::AuthResult, user::*, DATE_FMT};
use super::*;

/**
The Session Gate. A request that already carries a live session is sent
straight to the dashboard; everybody else gets the credential form.
*/
pub async fn front_page(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    jar: CookieJar,
) -> Response {
    if let Some((email, key)) = session_from_jar(&jar) {
        let res = glob.read().await.auth().read().await.check_key(
            &email, &key
        ).await;
        if let Ok(AuthResult::Ok) = res {
            log::trace!("Live session for {:?}; redirecting to dashboard.", &email);
            return Redirect::to("/home").into_response();
        }
    }

    serve_template(StatusCode::OK, "login", &json!({}), vec![])
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    jar: CookieJar,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("admin::login( {:?}, [ password ] ) called.", &form.email);

    let auth_response = {
        glob.read().await.auth().read().await.check_password_and_issue_key(
            &form.email,
            &form.password,
        ).await
    };

    let auth_key = match auth_response {
        Err(e) => {
            log::error!(
                "Error: auth::Db::check_password_and_issue_key( {:?}, [ password ] ): {}",
                &form.email, &e
            );
            return html_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) | Ok(AuthResult::NoSuchUser) => {
            return respond_bad_password();
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?}, [ password ] ) returned {:?}, which shouldn't happen.",
                &form.email, &x
            );
            return respond_bad_password();
        },
    };

    let cookie = Cookie::build(
        SESSION_COOKIE,
        format!("{}|{}", &form.email, &auth_key)
    ).path("/").http_only(true).finish();

    (jar.add(cookie), Redirect::to("/home")).into_response()
}

/// Sign out: revoke the session key, clear the cookie, and land back on
/// the Session Gate.
pub async fn logout(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    jar: CookieJar,
) -> Response {
    if let Some((email, key)) = session_from_jar(&jar) {
        let res = {
            glob.read().await.auth().read().await.rm_key(&email, &key).await
        };
        if let Err(e) = res {
            // The session cookie gets cleared regardless.
            log::error!("Error revoking session key for {:?}: {}", &email, &e);
        }
    }

    let mut cookie = Cookie::named(SESSION_COOKIE);
    cookie.set_path("/");

    (jar.remove(cookie), Redirect::to("/")).into_response()
}

/// The dashboard shell: display name of the signed-in identity (its
/// email) plus navigation. The session was validated by the middleware.
pub async fn home(jar: CookieJar) -> Response {
    let email = match session_from_jar(&jar) {
        Some((email, _)) => email,
        None => { return Redirect::to("/").into_response(); },
    };

    serve_template(
        StatusCode::OK,
        "home",
        &json!({ "name": email }),
        vec![]
    )
}

/// One row of the listing view, flattened for the template.
#[derive(Debug, Serialize)]
struct RowDisplay {
    id: i64,
    name: String,
    bio: Option<String>,
    dob: Option<String>,
    skills: Vec<String>,
    suspended: bool,
}

fn display_row(u: &User) -> Result<RowDisplay, String> {
    let dob = match u.dob {
        None => None,
        Some(d) => Some(
            d.format(DATE_FMT)
                .map_err(|e| format!("Error formatting date: {}", &e))?
        ),
    };

    Ok(RowDisplay {
        id: u.id,
        name: u.name.clone(),
        bio: u.bio.clone(),
        dob,
        skills: u.skills.clone().unwrap_or_default(),
        suspended: u.status == AccountStatus::Suspended,
    })
}

/**
The listing/management view: every user, joined with skills, partitioned
into the students (mentees) and tutors (mentors) tables.
*/
pub async fn users_view(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    let res = {
        glob.read().await.data().read().await.get_users().await
    };

    let users = match res {
        Ok(users) => users,
        Err(e) => {
            log::error!("Error fetching users from data DB: {}", &e);
            return text_500(Some(format!("Unable to fetch users: {}", &e)));
        },
    };

    let (mentees, mentors) = partition_by_kind(users);

    let mut mentee_rows: Vec<RowDisplay> = Vec::with_capacity(mentees.len());
    let mut mentor_rows: Vec<RowDisplay> = Vec::with_capacity(mentors.len());
    for u in mentees.iter() {
        match display_row(u) {
            Ok(r) => { mentee_rows.push(r); },
            Err(e) => { log::error!("{}", &e); return html_500(); },
        }
    }
    for u in mentors.iter() {
        match display_row(u) {
            Ok(r) => { mentor_rows.push(r); },
            Err(e) => { log::error!("{}", &e); return html_500(); },
        }
    }

    let data = json!({
        "mentees": mentee_rows,
        "mentors": mentor_rows,
    });

    serve_template(StatusCode::OK, "viewusers", &data, vec![])
}

pub async fn create_user_page() -> Response {
    serve_template(StatusCode::OK, "create_user", &json!({}), vec![])
}

pub async fn add_mentee_page() -> Response {
    serve_template(StatusCode::OK, "add_mentee", &json!({}), vec![])
}

pub async fn add_mentor_page() -> Response {
    serve_template(StatusCode::OK, "add_mentor", &json!({}), vec![])
}

pub async fn create_user(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(draft): Form<UserDraft>,
) -> Response {
    log::trace!("admin::create_user( {:?} ) called.", &draft);

    let nu = match draft.into_new_user() {
        Ok(nu) => nu,
        Err(e) => { return respond_bad_request(e); },
    };

    let res = {
        glob.read().await.data().read().await.insert_user(&nu).await
    };

    match res {
        Ok(id) => {
            log::trace!("Inserted user {:?} (id {}).", &nu.email, &id);
            Redirect::to("/viewusers").into_response()
        },
        Err(e) => {
            log::error!("Error inserting new user ({:?}): {}", &nu, &e);
            text_500(Some(format!("Unable to insert user: {}", &e)))
        },
    }
}

pub async fn add_mentee(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(draft): Form<MenteeDraft>,
) -> Response {
    log::trace!("admin::add_mentee( {:?} ) called.", &draft);

    let m = match draft.into_mentee() {
        Ok(m) => m,
        Err(e) => { return respond_bad_request(e); },
    };

    let res = {
        glob.read().await.data().read().await.insert_mentee(&m).await
    };

    match res {
        Ok(id) => {
            log::trace!("Inserted mentee {:?} (id {}).", &m.email, &id);
            Redirect::to("/viewusers").into_response()
        },
        Err(e) => {
            log::error!("Error inserting new mentee ({:?}): {}", &m, &e);
            text_500(Some(format!("Unable to insert mentee: {}", &e)))
        },
    }
}

pub async fn add_mentor(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(draft): Form<MentorDraft>,
) -> Response {
    log::trace!("admin::add_mentor( {:?} ) called.", &draft);

    let m = match draft.into_mentor() {
        Ok(m) => m,
        Err(e) => { return respond_bad_request(e); },
    };

    let res = {
        glob.read().await.data().read().await.insert_mentor(&m).await
    };

    match res {
        Ok(id) => {
            log::trace!("Inserted mentor {:?} (id {}).", &m.email, &id);
            Redirect::to("/viewusers").into_response()
        },
        Err(e) => {
            log::error!("Error inserting new mentor ({:?}): {}", &m, &e);
            text_500(Some(format!("Unable to insert mentor: {}", &e)))
        },
    }
}

/**
The update form, loaded. Fetches the target user (absent user is a
terminal failure); the related skills row is looked up by the identity
reference and tolerated as empty when absent.
*/
pub async fn update_user_page(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::update_user_page( {} ) called.", id);

    let res = {
        glob.read().await.data().read().await.get_user_by_id(id).await
    };

    let u = match res {
        Err(e) => {
            log::error!("Error fetching user {}: {}", id, &e);
            return text_500(Some(format!("Unable to load user: {}", &e)));
        },
        Ok(None) => {
            return respond_bad_request(
                format!("There is no user with id {}.", id)
            );
        },
        Ok(Some(u)) => u,
    };

    let skills: Vec<String> = match &u.auth_user_id {
        // Nothing linked yet; the form starts with an empty skill list.
        None => Vec::new(),
        Some(auth_id) => {
            let res = {
                glob.read().await.data().read().await
                    .get_skills(u.kind, auth_id).await
            };
            match res {
                Ok(Some(skills)) => skills,
                Ok(None) => Vec::new(),
                Err(e) => {
                    log::error!(
                        "Error fetching skills for user {}: {}", id, &e
                    );
                    return text_500(Some(format!(
                        "Unable to load skills: {}", &e
                    )));
                },
            }
        },
    };

    let dob = match u.dob {
        None => String::new(),
        Some(d) => match d.format(DATE_FMT) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Error formatting date for user {}: {}", id, &e);
                return html_500();
            },
        },
    };

    let data = json!({
        "id": u.id,
        "name": u.name,
        "email": u.email,
        "bio": u.bio.unwrap_or_default(),
        "dob": dob,
        "is_mentee": u.kind == UserKind::Mentee,
        "is_mentor": u.kind == UserKind::Mentor,
        "skills": skills.join(", "),
    });

    serve_template(StatusCode::OK, "update_user", &data, vec![])
}

/// The update form, submitted. The user update and the skills upsert
/// happen in one `Store` transaction.
pub async fn update_user(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(draft): Form<UpdateDraft>,
) -> Response {
    log::trace!("admin::update_user( {}, {:?} ) called.", id, &draft);

    let (upd, skills) = match draft.into_update() {
        Ok(pair) => pair,
        Err(e) => { return respond_bad_request(e); },
    };

    let res = {
        glob.read().await.data().read().await
            .update_user(id, &upd, &skills).await
    };

    match res {
        Ok(()) => Redirect::to("/viewusers").into_response(),
        Err(e) => {
            log::error!("Error updating user {}: {}", id, &e);
            text_500(Some(format!("Unable to update user: {}", &e)))
        },
    }
}

/// Row action: set status to `suspended`, then bounce back to the
/// listing view, which re-fetches everything.
pub async fn suspend_user(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::suspend_user( {} ) called.", id);

    let res = {
        glob.read().await.data().read().await.suspend_user(id).await
    };

    match res {
        Ok(()) => Redirect::to("/viewusers").into_response(),
        Err(e) => {
            log::error!("Error suspending user {}: {}", id, &e);
            text_500(Some(format!("Unable to suspend user: {}", &e)))
        },
    }
}

/// Row action: hard delete. The browser-side confirmation lives in the
/// listing template; by the time this runs, the admin already said yes.
pub async fn delete_user(
    Path(id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::delete_user( {} ) called.", id);

    let res = {
        glob.read().await.data().read().await.delete_user(id).await
    };

    match res {
        Ok(()) => Redirect::to("/viewusers").into_response(),
        Err(e) => {
            log::error!("Error deleting user {}: {}", id, &e);
            text_500(Some(format!("Unable to delete user: {}", &e)))
        },
    }
}
