/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    auth, auth::AuthResult,
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=mentordesk_test password='mentordesk_test' dbname=mentordesk_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=mentordesk_test password='mentordesk_test' dbname=mentordesk_store_test".to_owned(),
            default_admin_email: "admin@mentordesk.not.an.address".to_owned(),
            default_admin_password: "toot".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy hauls around the global variables and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    auth_db: Arc<RwLock<auth::Db>>,
    data_db: Arc<RwLock<Store>>,
    pub addr: SocketAddr,
}

impl Glob {
    pub fn auth(&self) -> Arc<RwLock<auth::Db>> { self.auth_db.clone() }
    pub fn data(&self) -> Arc<RwLock<Store>> { self.data_db.clone() }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default admin identity.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    log::trace!("Checking state of auth DB...");
    let auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default admin in auth DB...");
    match auth_db.check_password(
        &cfg.default_admin_email,
        &cfg.default_admin_password,
    ).await {
        Err(e) => {
            let estr = format!(
                "Error checking existence of default admin in auth DB: {}", &e
            );
            return Err(estr);
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!(
                "Default admin ({}) not using default password.",
                &cfg.default_admin_email
            );
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!(
                "Default admin ({}) doesn't exist in auth DB; inserting.",
                &cfg.default_admin_email
            );
            if let Err(e) = auth_db.add_user(
                &cfg.default_admin_email,
                &cfg.default_admin_password,
            ).await {
                let estr = format!(
                    "Error inserting default admin into auth DB: {}", &e
                );
                return Err(estr);
            };
            log::trace!("Default admin inserted into auth DB.");
        },
        Ok(AuthResult::Ok) => {
            log::trace!("Default admin password check OK.");
        },
        Ok(x) => {
            let estr = format!(
                "Default admin password check resulted in {:?}, which just doesn't make sense.",
                &x
            );
            return Err(estr);
        },
    }
    log::trace!("Default admin OK in auth DB.");

    let glob = Glob {
        auth_db: Arc::new(RwLock::new(auth_db)),
        data_db: Arc::new(RwLock::new(data_db)),
        addr: cfg.addr,
    };

    Ok(glob)
}
