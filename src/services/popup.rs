use crate::{
    error::{AppError, AppResult},
    models::{popup, Popup, PopupModel},
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};

#[derive(Debug, Clone, Default)]
pub struct NewPopup {
    pub title: String,
    pub content: String,
    pub start_date: Option<chrono::NaiveDateTime>,
    pub end_date: Option<chrono::NaiveDateTime>,
    pub is_active: bool,
}

/// Outer `None` leaves a date alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PopupChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub start_date: Option<Option<chrono::NaiveDateTime>>,
    pub end_date: Option<Option<chrono::NaiveDateTime>>,
    pub is_active: Option<bool>,
}

fn check_window(
    start: Option<chrono::NaiveDateTime>,
    end: Option<chrono::NaiveDateTime>,
) -> AppResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(AppError::Validation(
            "start_date must not be after end_date".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Taken first in every transaction that may activate a popup, before it
/// writes anything. On Postgres the table lock also covers inserts into an
/// empty table, where there are no rows to lock yet. SQLite allows a single
/// writer, so it needs nothing here.
async fn lock_for_activation(txn: &DatabaseTransaction) -> AppResult<()> {
    if txn.get_database_backend() == DbBackend::Postgres {
        txn.execute_unprepared("LOCK TABLE popups IN SHARE ROW EXCLUSIVE MODE")
            .await?;
    }
    Ok(())
}

/// The only place `is_active` becomes true. Callers hold
/// `lock_for_activation`; the popup rows are locked as well.
async fn activate(txn: &DatabaseTransaction, id: i32) -> AppResult<PopupModel> {
    let locked = Popup::find().lock_exclusive().all(txn).await?;
    let target = locked
        .into_iter()
        .find(|p| p.id == id)
        .ok_or(AppError::NotFound)?;

    let now = chrono::Utc::now().naive_utc();
    let result = Popup::update_many()
        .col_expr(popup::Column::IsActive, Expr::value(false))
        .col_expr(popup::Column::UpdatedAt, Expr::value(now))
        .filter(popup::Column::IsActive.eq(true))
        .filter(popup::Column::Id.ne(id))
        .exec(txn)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(
            "Deactivated {} popup(s) before activating {}",
            result.rows_affected,
            id
        );
    }

    if target.is_active {
        return Ok(target);
    }
    let mut active: popup::ActiveModel = target.into();
    active.is_active = sea_orm::ActiveValue::Set(true);
    active.updated_at = sea_orm::ActiveValue::Set(now);
    Ok(active.update(txn).await?)
}

/// Turning a popup off never affects the others.
async fn deactivate(txn: &DatabaseTransaction, id: i32) -> AppResult<PopupModel> {
    let target = Popup::find_by_id(id)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if !target.is_active {
        return Ok(target);
    }
    let mut active: popup::ActiveModel = target.into();
    active.is_active = sea_orm::ActiveValue::Set(false);
    active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
    Ok(active.update(txn).await?)
}

pub struct PopupService {
    db: DatabaseConnection,
}

impl PopupService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The newest active popup whose window contains now.
    pub async fn active(&self) -> AppResult<Option<PopupModel>> {
        self.active_at(chrono::Utc::now().naive_utc()).await
    }

    /// Active popups are few (normally one), so the window is checked in memory.
    pub async fn active_at(&self, now: chrono::NaiveDateTime) -> AppResult<Option<PopupModel>> {
        let candidates = Popup::find()
            .filter(popup::Column::IsActive.eq(true))
            .order_by_desc(popup::Column::CreatedAt)
            .order_by_desc(popup::Column::Id)
            .all(&self.db)
            .await?;
        Ok(candidates.into_iter().find(|p| p.is_within_window(now)))
    }

    pub async fn list_all(&self) -> AppResult<Vec<PopupModel>> {
        let popups = Popup::find()
            .order_by_desc(popup::Column::CreatedAt)
            .order_by_desc(popup::Column::Id)
            .all(&self.db)
            .await?;
        Ok(popups)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<PopupModel> {
        Popup::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn count_active(&self) -> AppResult<u64> {
        Ok(Popup::find()
            .filter(popup::Column::IsActive.eq(true))
            .count(&self.db)
            .await?)
    }

    pub async fn create(&self, input: NewPopup) -> AppResult<PopupModel> {
        check_window(input.start_date, input.end_date)?;
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        if input.is_active {
            lock_for_activation(&txn).await?;
        }

        let created = popup::ActiveModel {
            title: sea_orm::ActiveValue::Set(input.title),
            content: sea_orm::ActiveValue::Set(input.content),
            start_date: sea_orm::ActiveValue::Set(input.start_date),
            end_date: sea_orm::ActiveValue::Set(input.end_date),
            is_active: sea_orm::ActiveValue::Set(false),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let created = if input.is_active {
            activate(&txn, created.id).await?
        } else {
            created
        };

        txn.commit().await?;
        tracing::info!("Popup created: {} (active: {})", created.id, created.is_active);
        Ok(created)
    }

    pub async fn update(&self, id: i32, changes: PopupChanges) -> AppResult<PopupModel> {
        let txn = self.db.begin().await?;
        if changes.is_active == Some(true) {
            lock_for_activation(&txn).await?;
        }
        let existing = Popup::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        let start_date = changes.start_date.unwrap_or(existing.start_date);
        let end_date = changes.end_date.unwrap_or(existing.end_date);
        check_window(start_date, end_date)?;

        let mut active: popup::ActiveModel = existing.into();
        if let Some(title) = changes.title {
            active.title = sea_orm::ActiveValue::Set(title);
        }
        if let Some(content) = changes.content {
            active.content = sea_orm::ActiveValue::Set(content);
        }
        active.start_date = sea_orm::ActiveValue::Set(start_date);
        active.end_date = sea_orm::ActiveValue::Set(end_date);
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
        let mut updated = active.update(&txn).await?;

        match changes.is_active {
            Some(true) => updated = activate(&txn, id).await?,
            Some(false) => updated = deactivate(&txn, id).await?,
            None => {}
        }

        txn.commit().await?;
        Ok(updated)
    }

    pub async fn toggle(&self, id: i32) -> AppResult<PopupModel> {
        let txn = self.db.begin().await?;
        lock_for_activation(&txn).await?;
        let existing = Popup::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        let toggled = if existing.is_active {
            deactivate(&txn, id).await?
        } else {
            activate(&txn, id).await?
        };

        txn.commit().await?;
        tracing::info!("Popup {} toggled (active: {})", id, toggled.is_active);
        Ok(toggled)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let existing = self.get_by_id(id).await?;
        Popup::delete_by_id(existing.id).exec(&self.db).await?;
        tracing::info!("Popup deleted: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn inverted_window_is_rejected() {
        let day = |d| {
            NaiveDate::from_ymd_opt(2025, 5, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        assert!(check_window(Some(day(2)), Some(day(1))).is_err());
        assert!(check_window(Some(day(1)), Some(day(1))).is_ok());
        assert!(check_window(None, Some(day(1))).is_ok());
    }
}
