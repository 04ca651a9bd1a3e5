use crate::{
    error::{AppError, AppResult},
    models::{attachment, post, Attachment, AttachmentModel, Board, BoardModel, Post, PostModel},
    response::{clamp_page, page_count},
    services::{
        board::{BoardScope, MAX_POSTS_PER_PAGE},
        storage::FileStore,
    },
};
use sea_orm::sea_query::{Condition, Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};
use serde::Serialize;

pub const DEFAULT_AUTHOR_NAME: &str = "관리자";

/// One page of a board: pinned notices in full plus a window of regular posts.
#[derive(Debug, Clone, Serialize)]
pub struct BoardPostPage {
    pub notices: Vec<PostModel>,
    pub posts: Vec<PostModel>,
    /// Count of regular (non-notice) published posts only.
    pub total: u64,
    pub pages: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Adjacent {
    pub prev: Option<PostModel>,
    pub next: Option<PostModel>,
}

#[derive(Debug, Clone)]
pub struct PostView {
    pub post: PostModel,
    pub board: BoardModel,
    pub attachments: Vec<AttachmentModel>,
    pub adjacent: Adjacent,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author_name: Option<String>,
    pub user_id: Option<String>,
    pub is_notice: Option<bool>,
    pub is_published: Option<bool>,
    pub published_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author_name: Option<String>,
    pub is_notice: Option<bool>,
    pub is_published: Option<bool>,
    pub published_at: Option<chrono::NaiveDateTime>,
}

/// Page size for a board listing: the caller's choice if positive, else the
/// board's own, never above `MAX_POSTS_PER_PAGE`.
pub fn resolve_per_page(board: &BoardModel, requested: Option<u64>) -> u64 {
    requested
        .filter(|n| *n > 0)
        .unwrap_or_else(|| board.per_page())
        .min(MAX_POSTS_PER_PAGE as u64)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn published_in(board_id: i32) -> Select<Post> {
    Post::find()
        .filter(post::Column::BoardId.eq(board_id))
        .filter(post::Column::IsPublished.eq(true))
}

pub struct PostService {
    db: DatabaseConnection,
}

impl PostService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_by_board(
        &self,
        board: &BoardModel,
        page: u64,
        per_page: Option<u64>,
    ) -> AppResult<BoardPostPage> {
        let per_page = resolve_per_page(board, per_page);
        let page = clamp_page(page, per_page);

        let notices = published_in(board.id)
            .filter(post::Column::IsNotice.eq(true))
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .all(&self.db)
            .await?;

        let paginator = published_in(board.id)
            .filter(post::Column::IsNotice.eq(false))
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let posts = paginator.fetch_page(page - 1).await?;

        Ok(BoardPostPage {
            notices,
            posts,
            total,
            pages: page_count(total, per_page),
            page,
            per_page,
        })
    }

    /// Editor view of a board: drafts included, newest first.
    pub async fn list_for_editor(
        &self,
        board_id: i32,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<PostModel>, u64)> {
        let per_page = per_page.clamp(1, MAX_POSTS_PER_PAGE as u64);
        let paginator = Post::find()
            .filter(post::Column::BoardId.eq(board_id))
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let posts = paginator.fetch_page(clamp_page(page, per_page) - 1).await?;
        Ok((posts, total))
    }

    /// Case-insensitive substring match over title, content and author.
    /// Notices are not separated out.
    pub async fn search(
        &self,
        board: &BoardModel,
        keyword: &str,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<PostModel>, u64)> {
        let per_page = per_page.clamp(1, MAX_POSTS_PER_PAGE as u64);
        let pattern = format!("%{}%", escape_like(&keyword.trim().to_lowercase()));
        let matches = |col: post::Column| {
            Expr::expr(Func::lower(Expr::col(col))).like(LikeExpr::new(pattern.clone()).escape('\\'))
        };

        let paginator = published_in(board.id)
            .filter(
                Condition::any()
                    .add(matches(post::Column::Title))
                    .add(matches(post::Column::Content))
                    .add(matches(post::Column::AuthorName)),
            )
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .paginate(&self.db, per_page);

        let total = paginator.num_items().await?;
        let posts = paginator.fetch_page(clamp_page(page, per_page) - 1).await?;
        Ok((posts, total))
    }

    /// Public lookup. Unpublished posts are indistinguishable from missing ones.
    pub async fn get_by_id(&self, id: i32, bump_view: bool) -> AppResult<PostModel> {
        let post = Post::find_by_id(id)
            .filter(post::Column::IsPublished.eq(true))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if !bump_view {
            return Ok(post);
        }

        self.increment_view_count(id).await?;
        Post::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Any post regardless of publication state, for editors.
    pub async fn find(&self, id: i32) -> AppResult<PostModel> {
        Post::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Published post together with its board, if `scope` may read that board.
    pub async fn get_readable(
        &self,
        id: i32,
        scope: BoardScope,
    ) -> AppResult<(PostModel, BoardModel)> {
        let (post, board) = Post::find_by_id(id)
            .filter(post::Column::IsPublished.eq(true))
            .find_also_related(Board)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let board = board.ok_or(AppError::NotFound)?;
        scope.check(&board)?;
        Ok((post, board))
    }

    /// Everything the public post page shows, counting the view.
    pub async fn view(&self, id: i32, scope: BoardScope) -> AppResult<PostView> {
        let (_, board) = self.get_readable(id, scope).await?;

        let post = self.get_by_id(id, true).await?;
        let attachments = Attachment::find()
            .filter(attachment::Column::PostId.eq(id))
            .order_by_asc(attachment::Column::DisplayOrder)
            .order_by_asc(attachment::Column::CreatedAt)
            .all(&self.db)
            .await?;
        let adjacent = self.adjacent(&post).await?;

        Ok(PostView {
            post,
            board,
            attachments,
            adjacent,
        })
    }

    /// Neighbours by `published_at` within the same board. Posts sharing the
    /// exact same timestamp are not neighbours of each other.
    pub async fn adjacent(&self, post: &PostModel) -> AppResult<Adjacent> {
        let Some(published_at) = post.published_at else {
            return Ok(Adjacent::default());
        };

        let prev = published_in(post.board_id)
            .filter(post::Column::PublishedAt.lt(published_at))
            .order_by_desc(post::Column::PublishedAt)
            .one(&self.db)
            .await?;

        let next = published_in(post.board_id)
            .filter(post::Column::PublishedAt.gt(published_at))
            .order_by_asc(post::Column::PublishedAt)
            .one(&self.db)
            .await?;

        Ok(Adjacent { prev, next })
    }

    pub async fn create(&self, board_id: i32, input: NewPost) -> AppResult<PostModel> {
        Board::find_by_id(board_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = chrono::Utc::now().naive_utc();
        let is_published = input.is_published.unwrap_or(true);
        let published_at = match input.published_at {
            Some(at) => Some(at),
            None if is_published => Some(now),
            None => None,
        };
        let author_name = input
            .author_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string());

        let new_post = post::ActiveModel {
            board_id: sea_orm::ActiveValue::Set(board_id),
            title: sea_orm::ActiveValue::Set(input.title),
            content: sea_orm::ActiveValue::Set(input.content),
            author_name: sea_orm::ActiveValue::Set(author_name),
            user_id: sea_orm::ActiveValue::Set(input.user_id),
            view_count: sea_orm::ActiveValue::Set(0),
            is_notice: sea_orm::ActiveValue::Set(input.is_notice.unwrap_or(false)),
            is_published: sea_orm::ActiveValue::Set(is_published),
            published_at: sea_orm::ActiveValue::Set(published_at),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        let post = new_post.insert(&self.db).await?;
        tracing::info!("Post created: {} in board {}", post.id, board_id);
        Ok(post)
    }

    pub async fn update(&self, id: i32, changes: PostChanges) -> AppResult<PostModel> {
        let existing = self.find(id).await?;
        let now = chrono::Utc::now().naive_utc();

        let is_published = changes.is_published.unwrap_or(existing.is_published);
        let published_at = changes.published_at.or(existing.published_at);
        let published_at = match published_at {
            None if is_published => Some(now),
            other => other,
        };

        let mut active: post::ActiveModel = existing.into();
        if let Some(title) = changes.title {
            active.title = sea_orm::ActiveValue::Set(title);
        }
        if let Some(content) = changes.content {
            active.content = sea_orm::ActiveValue::Set(content);
        }
        if let Some(author_name) = changes.author_name {
            active.author_name = sea_orm::ActiveValue::Set(author_name);
        }
        if let Some(is_notice) = changes.is_notice {
            active.is_notice = sea_orm::ActiveValue::Set(is_notice);
        }
        active.is_published = sea_orm::ActiveValue::Set(is_published);
        active.published_at = sea_orm::ActiveValue::Set(published_at);
        active.updated_at = sea_orm::ActiveValue::Set(now);

        let updated = active.update(&self.db).await?;
        Ok(updated)
    }

    /// Removes the post row (attachments cascade), then the attachment files.
    pub async fn delete(&self, id: i32, files: &FileStore) -> AppResult<()> {
        let existing = self.find(id).await?;

        let stored: Vec<String> = Attachment::find()
            .select_only()
            .column(attachment::Column::FilePath)
            .filter(attachment::Column::PostId.eq(id))
            .into_tuple()
            .all(&self.db)
            .await?;

        Post::delete_by_id(existing.id).exec(&self.db).await?;
        for path in &stored {
            files.discard(path).await;
        }

        tracing::info!("Post deleted: {}", id);
        Ok(())
    }

    pub async fn count_by_board(&self, board_id: i32, published_only: bool) -> AppResult<u64> {
        let mut query = Post::find().filter(post::Column::BoardId.eq(board_id));
        if published_only {
            query = query.filter(post::Column::IsPublished.eq(true));
        }
        Ok(query.count(&self.db).await?)
    }

    pub async fn count_all(&self) -> AppResult<u64> {
        Ok(Post::find().count(&self.db).await?)
    }

    pub async fn recent(
        &self,
        limit: u64,
        board_id: Option<i32>,
        scope: BoardScope,
    ) -> AppResult<Vec<PostModel>> {
        let mut query = Post::find().filter(post::Column::IsPublished.eq(true));
        if let Some(board_id) = board_id {
            query = query.filter(post::Column::BoardId.eq(board_id));
        }
        if let Some(readable) = scope.board_ids() {
            query = query.filter(post::Column::BoardId.in_subquery(readable));
        }
        let posts = query
            .order_by_desc(post::Column::PublishedAt)
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(posts)
    }

    pub async fn popular(
        &self,
        limit: u64,
        board_id: Option<i32>,
        scope: BoardScope,
    ) -> AppResult<Vec<PostModel>> {
        let mut query = Post::find().filter(post::Column::IsPublished.eq(true));
        if let Some(board_id) = board_id {
            query = query.filter(post::Column::BoardId.eq(board_id));
        }
        if let Some(readable) = scope.board_ids() {
            query = query.filter(post::Column::BoardId.in_subquery(readable));
        }
        let posts = query
            .order_by_desc(post::Column::ViewCount)
            .order_by_desc(post::Column::PublishedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(posts)
    }

    pub async fn toggle_publish(&self, id: i32) -> AppResult<PostModel> {
        let existing = self.find(id).await?;
        self.update(
            id,
            PostChanges {
                is_published: Some(!existing.is_published),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn toggle_notice(&self, id: i32) -> AppResult<PostModel> {
        let existing = self.find(id).await?;
        let mut active: post::ActiveModel = existing.clone().into();
        active.is_notice = sea_orm::ActiveValue::Set(!existing.is_notice);
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
        let updated = active.update(&self.db).await?;
        Ok(updated)
    }

    async fn increment_view_count(&self, id: i32) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::ViewCount,
                Expr::col(post::Column::ViewCount).add(1),
            )
            .filter(post::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("주일"), "주일");
    }
}
