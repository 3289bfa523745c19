use crate::{now, DonationRevision, Error, InvalidReason, NewDonation, NewEvent, Result};
use entity::{donation, event};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use tracing::{info, warn};

/// A recorded donation and the collected amount of its event right after it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub donation: donation::Model,
    pub collected_amount: i64,
}

/// Donation list filter.
#[derive(Debug, Clone, Default)]
pub struct DonationQuery {
    /// case-insensitive substring of the donor name
    pub search: Option<String>,
    /// created at or after, unix seconds
    pub from: Option<i64>,
    /// created at or before, unix seconds
    pub to: Option<i64>,
}

impl DonationQuery {
    fn select(&self, event_id: i32) -> Select<donation::Entity> {
        let mut select = donation::Entity::find().filter(donation::Column::EventId.eq(event_id));
        if let Some(search) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(donation::Column::DonorName)))
                    .like(LikeExpr::new(pattern).escape('\\')),
            );
        }
        if let Some(from) = self.from {
            select = select.filter(donation::Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.to {
            select = select.filter(donation::Column::CreatedAt.lte(to));
        }
        // newest first, id keeps the order total when timestamps collide
        select
            .order_by_desc(donation::Column::CreatedAt)
            .order_by_desc(donation::Column::Id)
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One page of donations, pages are numbered from 1.
#[derive(Debug, Clone)]
pub struct DonationPage {
    pub donations: Vec<donation::Model>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// All donations matching a query, for reports.
#[derive(Debug, Clone)]
pub struct DonationExport {
    pub event: event::Model,
    pub donations: Vec<donation::Model>,
    /// sum of the exported amounts
    pub total: i64,
}

/// Result of recomputing an event's collected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub previous: i64,
    pub collected_amount: i64,
}

impl Reconciled {
    pub fn drift(&self) -> i64 {
        self.previous - self.collected_amount
    }
}

/// Donation ledger service.
///
/// Owns the database pool. Every mutation of a donation adjusts the
/// collected amount of its event in the same transaction, with the
/// adjustment computed by the database from the stored value.
pub struct Service {
    conn: DbConn,
}

impl Service {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    /// check the database is reachable
    pub async fn ping(&self) -> Result<()> {
        Ok(self.conn.ping().await?)
    }

    /// close the pool
    pub async fn close(self) -> Result<()> {
        Ok(self.conn.close().await?)
    }

    pub async fn create_event(&self, new: NewEvent) -> Result<event::Model> {
        let time = now() as i64;
        let model = event::ActiveModel {
            id: NotSet,
            title: Set(new.title),
            description: Set(new.description),
            target_amount: Set(new.target_amount),
            collected_amount: Set(0),
            created_by: Set(new.created_by),
            created_at: Set(time),
            updated_at: Set(time),
        }
        .insert(self.db())
        .await?;
        info!(
            event_id = model.id,
            target_amount = model.target_amount,
            "event created"
        );
        Ok(model)
    }

    pub async fn get_event(&self, id: i32) -> Result<event::Model> {
        find_event(self.db(), id).await
    }

    pub async fn list_events(&self) -> Result<Vec<event::Model>> {
        Ok(event::Entity::find()
            .order_by_desc(event::Column::CreatedAt)
            .order_by_desc(event::Column::Id)
            .all(self.db())
            .await?)
    }

    pub async fn get_donation(&self, event_id: i32, id: i32) -> Result<donation::Model> {
        find_donation(self.db(), event_id, id).await
    }

    /// Record a donation and add its amount to the event.
    pub async fn record_donation(&self, event_id: i32, new: NewDonation) -> Result<Recorded> {
        let amount = new.amount;
        let time = now() as i64;

        let txn = self.db().begin().await?;
        // increase collected amount first, it also locks the event row
        adjust_collected(&txn, event_id, amount).await?;

        let donation = donation::ActiveModel {
            id: NotSet,
            event_id: Set(event_id),
            donor_name: Set(new.donor_name),
            donor_email: Set(new.donor_email),
            amount: Set(amount),
            created_at: Set(time),
            updated_at: Set(time),
        }
        .insert(&txn)
        .await?;

        let event = find_event(&txn, event_id).await?;
        txn.commit().await?;

        info!(
            event_id,
            donation_id = donation.id,
            amount,
            collected_amount = event.collected_amount,
            "donation recorded"
        );
        Ok(Recorded {
            donation,
            collected_amount: event.collected_amount,
        })
    }

    /// Replace donor and amount of a donation, the event is adjusted by the difference.
    pub async fn revise_donation(
        &self,
        event_id: i32,
        donation_id: i32,
        revision: DonationRevision,
    ) -> Result<donation::Model> {
        let time = now() as i64;
        let txn = self.db().begin().await?;
        lock_event(&txn, event_id).await?;
        let old = find_donation(&txn, event_id, donation_id).await?;

        let delta = revision.amount - old.amount;
        let donor_email = match revision.donor_email {
            Some(email) => email,
            None => old.donor_email.clone(),
        };

        donation::Entity::update_many()
            .set(donation::ActiveModel {
                donor_name: Set(revision.donor_name.clone()),
                donor_email: Set(donor_email.clone()),
                amount: Set(revision.amount),
                updated_at: Set(time),
                ..Default::default()
            })
            .filter(donation::Column::Id.eq(old.id))
            .exec(&txn)
            .await?;

        if delta != 0 {
            adjust_collected(&txn, event_id, delta).await?;
        }
        txn.commit().await?;

        info!(
            event_id,
            donation_id,
            old_amount = old.amount,
            amount = revision.amount,
            delta,
            "donation revised"
        );
        Ok(donation::Model {
            donor_name: revision.donor_name,
            donor_email,
            amount: revision.amount,
            updated_at: time,
            ..old
        })
    }

    /// Subtract the donation's amount from the event, then delete the donation.
    pub async fn remove_donation(&self, event_id: i32, donation_id: i32) -> Result<()> {
        let txn = self.db().begin().await?;
        lock_event(&txn, event_id).await?;
        // the amount is only known from the record about to be deleted
        let old = find_donation(&txn, event_id, donation_id).await?;

        adjust_collected(&txn, event_id, -old.amount).await?;
        donation::Entity::delete_by_id(old.id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            event_id,
            donation_id,
            amount = old.amount,
            "donation removed"
        );
        Ok(())
    }

    pub async fn list_donations(
        &self,
        event_id: i32,
        query: &DonationQuery,
        page: u64,
        page_size: u64,
    ) -> Result<DonationPage> {
        find_event(self.db(), event_id).await?;
        let page = page.max(1);
        let page_size = page_size.max(1);

        let paginator = query.select(event_id).paginate(self.db(), page_size);
        let total = paginator.num_items().await?;
        let total_pages = if total == 0 {
            0
        } else {
            (total - 1) / page_size + 1
        };
        // no query past the last page, its offset may overflow
        let donations = if page > total_pages {
            vec![]
        } else {
            paginator.fetch_page(page - 1).await?
        };

        Ok(DonationPage {
            donations,
            page,
            page_size,
            total,
            total_pages,
        })
    }

    pub async fn export_donations(
        &self,
        event_id: i32,
        query: &DonationQuery,
    ) -> Result<DonationExport> {
        let event = find_event(self.db(), event_id).await?;
        let donations = query.select(event_id).all(self.db()).await?;
        let total = donations.iter().map(|d| d.amount).sum();
        Ok(DonationExport {
            event,
            donations,
            total,
        })
    }

    /// Recompute the collected amount of an event from all of its donations.
    pub async fn reconcile_event(&self, event_id: i32) -> Result<Reconciled> {
        let txn = self.db().begin().await?;
        lock_event(&txn, event_id).await?;
        let event = find_event(&txn, event_id).await?;
        let amounts: Vec<i64> = donation::Entity::find()
            .select_only()
            .column(donation::Column::Amount)
            .filter(donation::Column::EventId.eq(event_id))
            .into_tuple()
            .all(&txn)
            .await?;
        let collected_amount: i64 = amounts.iter().sum();

        if collected_amount != event.collected_amount {
            event::Entity::update_many()
                .col_expr(
                    event::Column::CollectedAmount,
                    SimpleExpr::Value(collected_amount.into()),
                )
                .col_expr(event::Column::UpdatedAt, SimpleExpr::Value((now() as i64).into()))
                .filter(event::Column::Id.eq(event_id))
                .exec(&txn)
                .await?;
            warn!(
                event_id,
                previous = event.collected_amount,
                collected_amount,
                "collected amount drift repaired"
            );
        }
        txn.commit().await?;

        Ok(Reconciled {
            previous: event.collected_amount,
            collected_amount,
        })
    }
}

async fn find_event<C: ConnectionTrait>(conn: &C, id: i32) -> Result<event::Model> {
    event::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(Error::NotFound("event"))
}

async fn find_donation<C: ConnectionTrait>(
    conn: &C,
    event_id: i32,
    id: i32,
) -> Result<donation::Model> {
    donation::Entity::find_by_id(id)
        .filter(donation::Column::EventId.eq(event_id))
        .one(conn)
        .await?
        .ok_or(Error::NotFound("donation"))
}

/// Take the write lock on an event row before reading anything else.
///
/// Every mutation starts with a write to the event, so operations on the
/// same event queue up on the row instead of failing on lock upgrades.
async fn lock_event<C: ConnectionTrait>(conn: &C, event_id: i32) -> Result<()> {
    let res = event::Entity::update_many()
        .col_expr(event::Column::UpdatedAt, SimpleExpr::Value((now() as i64).into()))
        .filter(event::Column::Id.eq(event_id))
        .exec(conn)
        .await?;
    if res.rows_affected != 1 {
        return Err(Error::NotFound("event"));
    }
    Ok(())
}

/// Add `delta` to the collected amount, keeping it within `0..=i64::MAX`.
async fn adjust_collected<C: ConnectionTrait>(conn: &C, event_id: i32, delta: i64) -> Result<()> {
    let bound = if delta < 0 {
        event::Column::CollectedAmount.gte(-delta)
    } else {
        event::Column::CollectedAmount.lte(i64::MAX - delta)
    };
    let res = event::Entity::update_many()
        .col_expr(
            event::Column::CollectedAmount,
            Expr::col(event::Column::CollectedAmount).add(delta),
        )
        .col_expr(event::Column::UpdatedAt, SimpleExpr::Value((now() as i64).into()))
        .filter(event::Column::Id.eq(event_id))
        .filter(bound)
        .exec(conn)
        .await?;
    if res.rows_affected == 1 {
        return Ok(());
    }

    let event = find_event(conn, event_id).await?;
    if delta < 0 {
        Err(Error::Conflict(
            "The collected amount of the event can't drop below zero.".to_owned(),
        ))
    } else {
        Err(InvalidReason::AmountTooHigh {
            max: i64::MAX - event.collected_amount,
        }
        .into())
    }
}
