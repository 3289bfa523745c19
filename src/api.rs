//! http api

use crate::{
    auth,
    service::DonationQuery,
    AppState, DonationRevision, Error, NewDonation, NewEvent, Result,
};
use actix_web::{delete, get, post, put, web, Responder, Scope};
use entity::{donation, event};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::warn;

pub fn scope() -> Scope {
    web::scope("/events")
        .service(list_events)
        .service(create_event)
        .service(get_event)
        .service(donate)
        .service(export_donations)
        .service(list_donations)
        .service(revise_donation)
        .service(remove_donation)
        .service(reconcile_event)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRes {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub target_amount: i64,
    pub collected_amount: i64,
    pub created_by: String,
    pub created_at: i64,
}

impl From<event::Model> for EventRes {
    fn from(value: event::Model) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            target_amount: value.target_amount,
            collected_amount: value.collected_amount,
            created_by: value.created_by,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRes {
    pub id: i32,
    pub event_id: i32,
    pub donor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor_email: Option<String>,
    pub amount: i64,
    pub created_at: i64,
}

impl DonationRes {
    /// donor emails are only shown to admins
    fn new(value: donation::Model, with_email: bool) -> Self {
        Self {
            id: value.id,
            event_id: value.event_id,
            donor_name: value.donor_name,
            donor_email: if with_email { value.donor_email } else { None },
            amount: value.amount,
            created_at: value.created_at,
        }
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> Result<impl Responder, Error> {
    state.service.ping().await?;
    Ok(web::Json(json!({"status": "ok"})))
}

#[get("")]
pub async fn list_events(state: web::Data<AppState>) -> Result<impl Responder, Error> {
    let events = state
        .service
        .list_events()
        .await?
        .into_iter()
        .map(EventRes::from)
        .collect::<Vec<_>>();
    Ok(web::Json(json!({ "events": events })))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateEventReq {
    title: Option<String>,
    description: Option<String>,
    target_amount: Value,
}

#[post("")]
pub async fn create_event(
    state: web::Data<AppState>,
    organizer: auth::Organizer,
    data: web::Json<CreateEventReq>,
) -> Result<impl Responder, Error> {
    let new = NewEvent::new(
        data.title.as_deref().unwrap_or_default(),
        data.description.as_deref().unwrap_or_default(),
        &data.target_amount,
        organizer.0.token.sub,
    )
    .map_err(|reason| {
        warn!(reason = reason.code(), "reject event");
        reason
    })?;
    let event = state.service.create_event(new).await?;
    Ok(web::Json(json!({
        "success": true,
        "event": EventRes::from(event),
    })))
}

#[get("/{event_id}")]
pub async fn get_event(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let event = state.service.get_event(path.into_inner()).await?;
    Ok(web::Json(json!({ "event": EventRes::from(event) })))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DonateReq {
    #[serde(alias = "name")]
    donor_name: Option<String>,
    #[serde(alias = "email")]
    donor_email: Option<String>,
    amount: Value,
}

/// public donation form
#[post("/{event_id}/donate")]
pub async fn donate(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    data: web::Json<DonateReq>,
) -> Result<impl Responder, Error> {
    let event_id = path.into_inner();
    let min_amount = state.setting.read().donation.min_amount;
    let new = NewDonation::new(
        data.donor_name.as_deref().unwrap_or_default(),
        data.donor_email.as_deref(),
        &data.amount,
        min_amount,
    )
    .map_err(|reason| {
        warn!(event_id, reason = reason.code(), "reject donation");
        reason
    })?;

    let recorded = state.service.record_donation(event_id, new).await?;
    Ok(web::Json(json!({
        "success": true,
        "collectedAmount": recorded.collected_amount,
        "donation": DonationRes::new(recorded.donation, true),
    })))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ListDonationsReq {
    search: Option<String>,
    page: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

fn number<T: FromStr>(s: &Option<String>) -> Option<T> {
    s.as_deref().and_then(|s| s.trim().parse().ok())
}

impl ListDonationsReq {
    fn query(&self) -> DonationQuery {
        DonationQuery {
            search: self.search.clone(),
            from: number(&self.from),
            to: number(&self.to),
        }
    }
}

#[get("/{event_id}/donations")]
pub async fn list_donations(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    admin: Option<auth::Admin>,
    data: web::Query<ListDonationsReq>,
) -> Result<impl Responder, Error> {
    let page_size = state.setting.read().donation.page_size;
    let page = number(&data.page).unwrap_or(1);
    let list = state
        .service
        .list_donations(path.into_inner(), &data.query(), page, page_size)
        .await?;

    let with_email = admin.is_some();
    let donations = list
        .donations
        .into_iter()
        .map(|d| DonationRes::new(d, with_email))
        .collect::<Vec<_>>();
    Ok(web::Json(json!({
        "donations": donations,
        "page": list.page,
        "pageSize": list.page_size,
        "total": list.total,
        "totalPages": list.total_pages,
    })))
}

/// all matching donations for the print and pdf report
#[get("/{event_id}/donations/export")]
pub async fn export_donations(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    _admin: auth::Admin,
    data: web::Query<ListDonationsReq>,
) -> Result<impl Responder, Error> {
    let export = state
        .service
        .export_donations(path.into_inner(), &data.query())
        .await?;
    let donations = export
        .donations
        .into_iter()
        .map(|d| DonationRes::new(d, true))
        .collect::<Vec<_>>();
    Ok(web::Json(json!({
        "event": EventRes::from(export.event),
        "donations": donations,
        "total": export.total,
    })))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviseDonationReq {
    #[serde(alias = "name")]
    donor_name: Option<String>,
    #[serde(alias = "email")]
    donor_email: Option<String>,
    amount: Value,
}

#[put("/{event_id}/donations/{donation_id}")]
pub async fn revise_donation(
    state: web::Data<AppState>,
    path: web::Path<(i32, i32)>,
    _admin: auth::Admin,
    data: web::Json<ReviseDonationReq>,
) -> Result<impl Responder, Error> {
    let (event_id, donation_id) = path.into_inner();
    let revision = DonationRevision::new(
        data.donor_name.as_deref().unwrap_or_default(),
        data.donor_email.as_deref(),
        &data.amount,
    )
    .map_err(|reason| {
        warn!(
            event_id,
            donation_id,
            reason = reason.code(),
            "reject donation revision"
        );
        reason
    })?;

    state
        .service
        .revise_donation(event_id, donation_id, revision)
        .await?;
    Ok(web::Json(json!({"success": true})))
}

#[delete("/{event_id}/donations/{donation_id}")]
pub async fn remove_donation(
    state: web::Data<AppState>,
    path: web::Path<(i32, i32)>,
    _admin: auth::Admin,
) -> Result<impl Responder, Error> {
    let (event_id, donation_id) = path.into_inner();
    state
        .service
        .remove_donation(event_id, donation_id)
        .await?;
    Ok(web::Json(json!({"success": true})))
}

/// recompute the collected amount from all donations
#[post("/{event_id}/reconcile")]
pub async fn reconcile_event(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    _admin: auth::Admin,
) -> Result<impl Responder, Error> {
    let reconciled = state.service.reconcile_event(path.into_inner()).await?;
    Ok(web::Json(json!({
        "success": true,
        "previous": reconciled.previous,
        "collectedAmount": reconciled.collected_amount,
        "drift": reconciled.drift(),
    })))
}
