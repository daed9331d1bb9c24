/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    Router,
    routing::{get, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;
use tower_http::services::fs::ServeDir;

use mentordesk::config;
use mentordesk::inter;
use mentordesk::inter::admin;

static DEFAULT_CONFIG: &str = "mentordesk.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("mentordesk")
        .build();
    TermLogger::init(
        mentordesk::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();
    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    inter::init("templates/").unwrap();

    // Everything but the Session Gate sits behind the session check.
    let protected = Router::new()
        .route("/home", get(admin::home))
        .route("/logout", post(admin::logout))
        .route("/viewusers", get(admin::users_view))
        .route("/create-user",
            get(admin::create_user_page).post(admin::create_user))
        .route("/addmentee",
            get(admin::add_mentee_page).post(admin::add_mentee))
        .route("/addmentor",
            get(admin::add_mentor_page).post(admin::add_mentor))
        .route("/update-user/:id",
            get(admin::update_user_page).post(admin::update_user))
        .route("/suspend/:id", post(admin::suspend_user))
        .route("/delete/:id", post(admin::delete_user))
        .route_layer(middleware::from_fn(inter::session_authenticate));

    let app = Router::new()
        .route("/", get(admin::front_page))
        .route("/login", post(admin::login))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
