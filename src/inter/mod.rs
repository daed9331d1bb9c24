/*!
Interoperation between the client (administrator's browser) and server.

(Not the application and the databases; that's covered by `auth` and
`store`.)
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    http::{Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::auth::AuthResult;
use crate::config::Glob;

pub mod admin;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// Name of the cookie holding the current session, as `email|key`.
pub const SESSION_COOKIE: &str = "mentordesk_session";

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>mentordesk | Error</title>
<link rel="stylesheet" href="/static/mentordesk.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a front-page login request.
#[derive(serde::Deserialize, Debug)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

/**
Initializes the resources used in this module. This function should be
called before any functionality of this module or any of its submodules
is used.

Currently the only thing that happens here is loading the templates used
by `serve_template()`, which will panic unless `init()` has been called
first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// Re-render the sign-in form with the failure message from the identity
/// check.
pub fn respond_bad_password() -> Response {
    log::trace!("respond_bad_password() called.");

    let data = json!({
        "error_message": "Invalid email/password combination."
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "login",
        &data,
        vec![]
    )
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

/// Pull the `(email, key)` pair out of the session cookie, if present.
/// This is the one place the `email|key` format gets taken apart.
pub fn session_from_jar(jar: &CookieJar) -> Option<(String, String)> {
    let value = jar.get(SESSION_COOKIE)?.value();
    let (email, key) = value.split_once('|')?;
    Some((email.to_owned(), key.to_owned()))
}

/// Jar-less version for the middleware, which only has the raw headers.
pub fn session_from_headers(headers: &HeaderMap) -> Option<(String, String)> {
    session_from_jar(&CookieJar::from_headers(headers))
}

/**
Middleware function guarding every page but the sign-in pair: a request
without a live session key gets bounced back to the Session Gate.
*/
pub async fn session_authenticate<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: &Arc<RwLock<Glob>> = req.extensions().get().unwrap();

    let (email, key) = match session_from_headers(req.headers()) {
        Some(pair) => pair,
        None => { return Redirect::to("/").into_response(); },
    };

    // We return the result, then match on the returned value, instead of
    // matching on the huge-ass chain expression, so that the locks will
    // release.
    let res = glob.read().await.auth().read().await.check_key(
        &email, &key
    ).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key( {:?}, [ key ] ) returned error: {}",
                &email, &e
            );

            return text_500(None);
        },
        Ok(AuthResult::InvalidKey) => {
            return Redirect::to("/").into_response();
        },
        Ok(AuthResult::Ok) => {
            // This is the good path. We will just fall through and call
            // the next layer after the match.
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            return text_500(None);
        },
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::header;

    fn header_map_with_cookie(raw: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::COOKIE, HeaderValue::from_str(raw).unwrap());
        map
    }

    #[test]
    fn session_cookie_parses() {
        let map = header_map_with_cookie(
            "other=1; mentordesk_session=admin@example.com|abcDEF123; last=x"
        );
        assert_eq!(
            session_from_headers(&map),
            Some(("admin@example.com".to_owned(), "abcDEF123".to_owned()))
        );
    }

    #[test]
    fn absent_or_malformed_session_is_none() {
        assert_eq!(session_from_headers(&HeaderMap::new()), None);

        let map = header_map_with_cookie("other=1");
        assert_eq!(session_from_headers(&map), None);

        let map = header_map_with_cookie("mentordesk_session=nodelimiter");
        assert_eq!(session_from_headers(&map), None);
    }

    // Handlers go through the jar, the middleware through the raw
    // headers; both must take the cookie apart the same way.
    #[test]
    fn jar_and_header_parses_agree() {
        let map = header_map_with_cookie(
            "mentordesk_session=admin@example.com|abcDEF123"
        );
        let jar = CookieJar::from_headers(&map);
        assert_eq!(session_from_jar(&jar), session_from_headers(&map));
    }
}
