#![allow(unused)]

use actix_http::{body::MessageBody, header::AUTHORIZATION, Method, Request};
use actix_web::{
    dev::{Service, ServiceResponse},
    test::{call_service, read_body, TestRequest},
};
use anyhow::Result;
use fundbox::{
    auth::{JwtToken, Role},
    setting::Setting,
    AppState, NewDonation, NewEvent,
};
use migration::{Migrator, MigratorTrait};
use serde_json::{json, Value};
use tempfile::TempDir;

/// App state on a fresh sqlite database, the dir must outlive the state.
pub async fn create_test_state() -> Result<(AppState, TempDir)> {
    let dir = tempfile::Builder::new().prefix("fundbox-test").tempdir()?;
    let mut setting = Setting::default();
    setting.db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("fundbox.sqlite").display()
    );
    let state = AppState::from_setting(setting).await?;
    Migrator::up(state.service.db(), None).await?;
    Ok((state, dir))
}

pub async fn create_event(state: &AppState, target: i64) -> Result<i32> {
    let event = state
        .service
        .create_event(NewEvent::new(
            "Bakti Sosial Mahasiswa",
            "Penggalangan dana untuk kegiatan bakti sosial di desa binaan.",
            &json!(target),
            "user_abc123".to_owned(),
        )?)
        .await?;
    Ok(event.id)
}

pub fn donation(name: &str, amount: i64) -> NewDonation {
    NewDonation::new(name, None, &json!(amount), 1000).unwrap()
}

pub fn token(state: &AppState, role: Role) -> String {
    let secret = state.setting.read().auth.secret.clone();
    JwtToken::generate("user_abc123", role, 3600, secret.as_bytes()).unwrap()
}

pub fn get_req(path: &str) -> TestRequest {
    TestRequest::with_uri(path)
}

pub fn post_req(path: &str, data: Value) -> TestRequest {
    TestRequest::with_uri(path)
        .method(Method::POST)
        .set_json(data)
}

pub fn put_req(path: &str, data: Value) -> TestRequest {
    TestRequest::with_uri(path)
        .method(Method::PUT)
        .set_json(data)
}

pub fn delete_req(path: &str) -> TestRequest {
    TestRequest::with_uri(path).method(Method::DELETE)
}

pub fn bearer(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header((AUTHORIZATION, format!("Bearer {}", token)))
}

pub async fn call<S, B>(req: TestRequest, app: &S) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let res = call_service(app, req.to_request()).await;
    let status = res.status().as_u16();
    let body = read_body(res).await;
    let val = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((val, status))
}

pub async fn get<S, B>(app: &S, path: &str) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    call(get_req(path), app).await
}

pub async fn post<S, B>(app: &S, path: &str, data: Value) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    call(post_req(path, data), app).await
}
