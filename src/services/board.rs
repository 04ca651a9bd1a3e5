use crate::{
    error::{AppError, AppResult},
    models::{attachment, board, post, Attachment, Board, BoardModel, BoardType},
    services::{
        cache::{CacheService, DEFAULT_TTL_SECS, KEY_NAVIGATION, KEY_VISIBLE_BOARDS},
        storage::FileStore,
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, RelationTrait,
};
use sea_orm::sea_query::{JoinType, SelectStatement};

pub const DEFAULT_POSTS_PER_PAGE: i32 = 20;
pub const MAX_POSTS_PER_PAGE: i32 = 100;

#[derive(Debug, Clone)]
pub struct NewBoard {
    pub code: String,
    pub name: String,
    pub board_type: BoardType,
    pub description: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    pub posts_per_page: Option<i32>,
    pub allow_attachment: Option<bool>,
    pub require_auth: Option<bool>,
}

/// Partial update. `code` is immutable and has no field here.
#[derive(Debug, Clone, Default)]
pub struct BoardChanges {
    pub name: Option<String>,
    pub board_type: Option<BoardType>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    pub posts_per_page: Option<i32>,
    pub allow_attachment: Option<bool>,
    pub require_auth: Option<bool>,
}

/// Which boards a reader may see content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardScope {
    /// Editor panel: every board, hidden or restricted.
    All,
    /// Visible boards; restricted ones only for a signed-in reader.
    Public { signed_in: bool },
}

impl BoardScope {
    pub fn public(signed_in: bool) -> Self {
        Self::Public { signed_in }
    }

    /// A hidden board does not exist for visitors. A restricted one needs a
    /// signed-in reader.
    pub fn check(&self, board: &BoardModel) -> AppResult<()> {
        match *self {
            Self::All => Ok(()),
            Self::Public { signed_in } => {
                if !board.is_visible {
                    return Err(AppError::NotFound);
                }
                if board.require_auth && !signed_in {
                    return Err(AppError::Unauthorized);
                }
                Ok(())
            }
        }
    }

    /// Ids of the boards in scope as a subquery; `None` means no filter.
    pub fn board_ids(&self) -> Option<SelectStatement> {
        match *self {
            Self::All => None,
            Self::Public { signed_in } => {
                let mut query = Board::find()
                    .select_only()
                    .column(board::Column::Id)
                    .filter(board::Column::IsVisible.eq(true));
                if !signed_in {
                    query = query.filter(board::Column::RequireAuth.eq(false));
                }
                Some(query.into_query())
            }
        }
    }
}

pub struct BoardService {
    db: DatabaseConnection,
    cache: Option<CacheService>,
}

impl BoardService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, cache: None }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn get_by_code(&self, code: &str) -> AppResult<BoardModel> {
        Board::find()
            .filter(board::Column::Code.eq(code))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<BoardModel> {
        Board::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_visible(&self) -> AppResult<Vec<BoardModel>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get::<Vec<BoardModel>>(KEY_VISIBLE_BOARDS).await {
                return Ok(cached);
            }
        }

        let boards = Board::find()
            .filter(board::Column::IsVisible.eq(true))
            .order_by_asc(board::Column::DisplayOrder)
            .order_by_asc(board::Column::Id)
            .all(&self.db)
            .await?;

        if let Some(cache) = &self.cache {
            cache
                .set(KEY_VISIBLE_BOARDS, &boards, DEFAULT_TTL_SECS)
                .await;
        }

        Ok(boards)
    }

    /// Every board including hidden ones, for the admin panel.
    pub async fn list_all(&self) -> AppResult<Vec<BoardModel>> {
        let boards = Board::find()
            .order_by_asc(board::Column::DisplayOrder)
            .order_by_asc(board::Column::Id)
            .all(&self.db)
            .await?;
        Ok(boards)
    }

    pub async fn list_by_type(&self, board_type: BoardType) -> AppResult<Vec<BoardModel>> {
        let boards = Board::find()
            .filter(board::Column::BoardType.eq(board_type))
            .filter(board::Column::IsVisible.eq(true))
            .order_by_asc(board::Column::DisplayOrder)
            .all(&self.db)
            .await?;
        Ok(boards)
    }

    pub async fn create(&self, input: NewBoard) -> AppResult<BoardModel> {
        let posts_per_page = input.posts_per_page.unwrap_or(DEFAULT_POSTS_PER_PAGE);
        check_posts_per_page(posts_per_page)?;

        let exists = Board::find()
            .filter(board::Column::Code.eq(input.code.as_str()))
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            return Err(AppError::Conflict(format!(
                "Board code '{}' already exists",
                input.code
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let conflict_message = format!("Board code '{}' already exists", input.code);

        let new_board = board::ActiveModel {
            code: sea_orm::ActiveValue::Set(input.code),
            name: sea_orm::ActiveValue::Set(input.name),
            board_type: sea_orm::ActiveValue::Set(input.board_type),
            description: sea_orm::ActiveValue::Set(input.description),
            display_order: sea_orm::ActiveValue::Set(input.display_order.unwrap_or(0)),
            is_visible: sea_orm::ActiveValue::Set(input.is_visible.unwrap_or(true)),
            posts_per_page: sea_orm::ActiveValue::Set(posts_per_page),
            allow_attachment: sea_orm::ActiveValue::Set(input.allow_attachment.unwrap_or(true)),
            require_auth: sea_orm::ActiveValue::Set(input.require_auth.unwrap_or(false)),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        // The pre-check can race with a concurrent insert; the unique index decides.
        let board = new_board
            .insert(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, &conflict_message))?;

        tracing::info!("Board created: {} ({})", board.code, board.id);
        self.invalidate_list_cache().await;
        Ok(board)
    }

    pub async fn update(&self, code: &str, changes: BoardChanges) -> AppResult<BoardModel> {
        let existing = self.get_by_code(code).await?;
        if let Some(n) = changes.posts_per_page {
            check_posts_per_page(n)?;
        }

        let mut active: board::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = sea_orm::ActiveValue::Set(name);
        }
        if let Some(board_type) = changes.board_type {
            active.board_type = sea_orm::ActiveValue::Set(board_type);
        }
        if let Some(description) = changes.description {
            active.description = sea_orm::ActiveValue::Set(Some(description));
        }
        if let Some(order) = changes.display_order {
            active.display_order = sea_orm::ActiveValue::Set(order);
        }
        if let Some(visible) = changes.is_visible {
            active.is_visible = sea_orm::ActiveValue::Set(visible);
        }
        if let Some(n) = changes.posts_per_page {
            active.posts_per_page = sea_orm::ActiveValue::Set(n);
        }
        if let Some(allow) = changes.allow_attachment {
            active.allow_attachment = sea_orm::ActiveValue::Set(allow);
        }
        if let Some(require) = changes.require_auth {
            active.require_auth = sea_orm::ActiveValue::Set(require);
        }
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());

        let updated = active.update(&self.db).await?;
        self.invalidate_list_cache().await;
        Ok(updated)
    }

    pub async fn set_display_order(&self, code: &str, order: i32) -> AppResult<BoardModel> {
        self.update(
            code,
            BoardChanges {
                display_order: Some(order),
                ..Default::default()
            },
        )
        .await
    }

    /// Deletes the board; posts and attachment rows go with it through the
    /// foreign keys. Attachment files are removed afterwards, best-effort.
    pub async fn delete(&self, code: &str, files: &FileStore) -> AppResult<()> {
        let existing = self.get_by_code(code).await?;

        let stored: Vec<String> = Attachment::find()
            .select_only()
            .column(attachment::Column::FilePath)
            .join(JoinType::InnerJoin, attachment::Relation::Post.def())
            .filter(post::Column::BoardId.eq(existing.id))
            .into_tuple()
            .all(&self.db)
            .await?;

        Board::delete_by_id(existing.id).exec(&self.db).await?;

        for path in &stored {
            files.discard(path).await;
        }

        tracing::info!(
            "Board deleted: {} ({} attachment files removed)",
            existing.code,
            stored.len()
        );
        self.invalidate_list_cache().await;
        Ok(())
    }

    /// Navigation embeds board names, so it goes stale with the board list.
    async fn invalidate_list_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(KEY_VISIBLE_BOARDS).await;
            cache.invalidate(KEY_NAVIGATION).await;
        }
    }
}

fn check_posts_per_page(n: i32) -> AppResult<()> {
    if (1..=MAX_POSTS_PER_PAGE).contains(&n) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "posts_per_page must be between 1 and {}",
            MAX_POSTS_PER_PAGE
        )))
    }
}
