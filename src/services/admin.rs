use crate::{
    error::AppResult,
    config::upload::UploadConfig,
    models::{board, Board, BoardModel, PostModel},
    services::{
        attachment::AttachmentService, board::BoardScope, menu::MenuService,
        post::PostService,
    },
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashMap;

const RECENT_POSTS_LIMIT: u64 = 10;

pub struct BoardPostCount {
    pub board: BoardModel,
    pub published_posts: u64,
}

pub struct RecentPost {
    pub post: PostModel,
    pub board_name: Option<String>,
}

pub struct DashboardStats {
    pub boards: Vec<BoardPostCount>,
    pub total_posts: u64,
    pub visible_boards: u64,
    pub total_attachments: u64,
    pub total_attachment_bytes: i64,
    pub total_menus: u64,
    pub recent_posts: Vec<RecentPost>,
}

pub struct AdminService {
    db: DatabaseConnection,
    upload: UploadConfig,
}

impl AdminService {
    pub fn new(db: DatabaseConnection, upload: UploadConfig) -> Self {
        Self { db, upload }
    }

    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let posts = PostService::new(self.db.clone());
        let attachments = AttachmentService::new(self.db.clone(), &self.upload);
        let menus = MenuService::new(self.db.clone());

        let visible = Board::find()
            .filter(board::Column::IsVisible.eq(true))
            .order_by_asc(board::Column::DisplayOrder)
            .all(&self.db)
            .await?;

        let mut boards = Vec::with_capacity(visible.len());
        for b in visible {
            let published_posts = posts.count_by_board(b.id, true).await?;
            boards.push(BoardPostCount {
                board: b,
                published_posts,
            });
        }

        let board_names: HashMap<i32, String> = Board::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|b| (b.id, b.name))
            .collect();
        let recent_posts = posts
            .recent(RECENT_POSTS_LIMIT, None, BoardScope::All)
            .await?
            .into_iter()
            .map(|post| RecentPost {
                board_name: board_names.get(&post.board_id).cloned(),
                post,
            })
            .collect();

        Ok(DashboardStats {
            visible_boards: boards.len() as u64,
            boards,
            total_posts: posts.count_all().await?,
            total_attachments: attachments.count().await?,
            total_attachment_bytes: attachments.total_file_size().await?,
            total_menus: menus.count().await?,
            recent_posts,
        })
    }
}
