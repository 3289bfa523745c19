use crate::{
    api,
    setting::{Setting, SettingWrapper},
    Error, InvalidReason, Result, Service,
};
use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest},
    middleware, web, App as WebApp, HttpServer,
};
use sea_orm::{ConnectOptions, Database, DbConn};
use std::{path::Path, sync::Arc, time::Duration};
use tracing::{info, warn};

pub struct AppState {
    pub service: Service,
    pub setting: SettingWrapper,
}

impl AppState {
    pub async fn create<P: AsRef<Path>>(
        setting_path: Option<P>,
        setting_env_prefix: Option<String>,
    ) -> Result<Self> {
        let env_notice = setting_env_prefix
            .as_ref()
            .map(|s| {
                format!(
                    ", config will be overrided by ENV seting with prefix `{}_`",
                    s
                )
            })
            .unwrap_or_default();

        let setting = if let Some(path) = setting_path {
            info!("Load config {:?}{}", path.as_ref(), env_notice);
            SettingWrapper::watch(path.as_ref(), setting_env_prefix, |s| {
                info!("donation setting {:?}", s.read().donation);
            })?
        } else if let Some(prefix) = setting_env_prefix {
            info!("Load default config{}", env_notice);
            Setting::from_env(prefix)?.into()
        } else {
            info!("Load default config");
            Setting::default().into()
        };

        info!("{:?}", setting.read());

        Self::from_wrapper(setting).await
    }

    pub async fn from_setting(setting: Setting) -> Result<Self> {
        Self::from_wrapper(setting.into()).await
    }

    async fn from_wrapper(setting: SettingWrapper) -> Result<Self> {
        let current = setting.read().clone();
        let conn = connect(&current).await?;
        let service = Service::new(conn);
        Ok(Self { service, setting })
    }
}

/// create the process wide database pool
async fn connect(setting: &Setting) -> Result<DbConn> {
    let mut options = ConnectOptions::from(&setting.db_url);
    options
        .max_connections(setting.db.max_connections)
        .min_connections(setting.db.min_connections)
        .connect_timeout(Duration::from_secs(setting.db.connect_timeout))
        .acquire_timeout(Duration::from_secs(setting.db.acquire_timeout))
        .sqlx_logging(setting.db.sqlx_logging)
        .sqlx_logging_level(tracing::log::LevelFilter::Trace);
    Ok(Database::connect(options).await?)
}

pub fn create_web_app(
    data: web::Data<AppState>,
) -> WebApp<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    WebApp::new()
        .app_data(data)
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            Error::from(InvalidReason::Malformed(err.to_string())).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            Error::from(InvalidReason::Malformed(err.to_string())).into()
        }))
        .app_data(
            web::PathConfig::default()
                .error_handler(|_err, _req| Error::NotFound("resource").into()),
        )
        .wrap(middleware::Logger::default()) // enable logger
        .service(api::health)
        .service(
            api::scope().wrap(
                Cors::default()
                    .send_wildcard()
                    .allow_any_header()
                    .allow_any_origin()
                    .allow_any_method()
                    .max_age(86_400),
            ),
        )
}

/// start app
pub async fn start(state: AppState) -> Result<()> {
    let state = web::Data::new(state);

    let c_data = state.clone();
    let server = HttpServer::new(move || create_web_app(c_data.clone()));
    let (num, host, port) = {
        let setting = state.setting.read();
        let num = if setting.thread.http == 0 {
            num_cpus::get()
        } else {
            setting.thread.http
        };
        (num, setting.network.host.clone(), setting.network.port)
    };
    info!("Start http server {}:{}", host, port);
    server.workers(num).bind((host, port))?.run().await?;

    match Arc::try_unwrap(state.into_inner()) {
        Ok(state) => {
            state.service.close().await?;
            info!("Database pool closed");
        }
        Err(_) => warn!("Database pool still in use at shutdown"),
    }
    Ok(())
}
