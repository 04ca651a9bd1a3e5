use crate::{
    config::upload::UploadConfig,
    error::{AppError, AppResult},
    models::{attachment, post, Attachment, AttachmentModel, Board, FileType, Post},
    services::{
        board::BoardScope,
        storage::{neutralize, probe_dimensions, thumbnail_path, FileStore},
    },
    utils::sniff,
};
use chrono::Datelike;
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

pub const MAX_ORIGINAL_NAME_CHARS: usize = 255;

/// One file as it arrived over the wire.
#[derive(Debug, Clone, Default)]
pub struct IncomingFile {
    pub original_name: String,
    pub data: Vec<u8>,
    /// Set when the transfer itself failed (truncated body, transport limit).
    pub transfer_error: Option<String>,
}

impl IncomingFile {
    pub fn new(original_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            data,
            transfer_error: None,
        }
    }

    pub fn failed(original_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            data: Vec::new(),
            transfer_error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedUpload {
    pub original_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchUpload {
    pub uploaded: Vec<AttachmentModel>,
    pub failed: Vec<FailedUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Disposition::Inline
        } else {
            Disposition::Attachment
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedFile {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub disposition: Disposition,
}

/// What the bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Inspected {
    mime: &'static str,
    file_type: FileType,
    extension: &'static str,
}

/// Steps that need nothing but the upload itself, in the order they are enforced.
fn inspect(file: &IncomingFile, max_file_size: u64) -> AppResult<Inspected> {
    if let Some(reason) = &file.transfer_error {
        return Err(AppError::Validation(format!("Upload failed: {}", reason)));
    }
    if file.data.is_empty() {
        return Err(AppError::Validation("No file provided".to_string()));
    }
    if file.data.len() as u64 > max_file_size {
        return Err(AppError::Validation(format!(
            "File exceeds the maximum size of {} bytes",
            max_file_size
        )));
    }

    let mime = sniff::sniff_mime(&file.data).unwrap_or(sniff::MIME_OCTET_STREAM);
    let extension = sniff::extension_for(mime)
        .filter(|_| sniff::is_allowed(mime))
        .ok_or_else(|| AppError::Validation(format!("File type not allowed: {}", mime)))?;

    if file.original_name.chars().count() > MAX_ORIGINAL_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "File name exceeds {} characters",
            MAX_ORIGINAL_NAME_CHARS
        )));
    }

    Ok(Inspected {
        mime,
        file_type: sniff::classify(mime),
        extension,
    })
}

pub struct AttachmentService {
    db: DatabaseConnection,
    files: FileStore,
    max_file_size: u64,
    thumbnails: bool,
}

impl AttachmentService {
    pub fn new(db: DatabaseConnection, config: &UploadConfig) -> Self {
        Self {
            db,
            files: FileStore::new(config.upload_dir.clone()),
            max_file_size: config.max_file_size,
            thumbnails: config.thumbnails,
        }
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<AttachmentModel> {
        Attachment::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn upload(&self, post_id: i32, file: IncomingFile) -> AppResult<AttachmentModel> {
        self.check_post_accepts_files(post_id).await?;
        self.store(post_id, file).await
    }

    /// Each file is tried on its own; a failure is recorded and the batch moves on.
    pub async fn upload_many(
        &self,
        post_id: i32,
        files: Vec<IncomingFile>,
    ) -> AppResult<BatchUpload> {
        self.check_post_accepts_files(post_id).await?;

        let mut batch = BatchUpload::default();
        for file in files {
            let original_name = file.original_name.clone();
            match self.store(post_id, file).await {
                Ok(saved) => batch.uploaded.push(saved),
                Err(e) => {
                    tracing::warn!("Skipping upload '{}': {}", original_name, e);
                    batch.failed.push(FailedUpload {
                        original_name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(batch)
    }

    async fn check_post_accepts_files(&self, post_id: i32) -> AppResult<()> {
        let post = Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let board = Board::find_by_id(post.board_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        if !board.allow_attachment {
            return Err(AppError::Validation(format!(
                "Board '{}' does not accept attachments",
                board.code
            )));
        }
        Ok(())
    }

    async fn store(&self, post_id: i32, file: IncomingFile) -> AppResult<AttachmentModel> {
        let inspected = inspect(&file, self.max_file_size)?;

        let now = chrono::Utc::now().naive_utc();
        let dir = format!("{:04}/{:02}", now.year(), now.month());
        let saved_name = format!("{}.{}", Uuid::new_v4().simple(), inspected.extension);
        let relative = format!("{}/{}", dir, saved_name);

        let file_size = self.files.write(&dir, &saved_name, &file.data).await?;

        let dimensions = if inspected.file_type == FileType::Image {
            let probed = probe_dimensions(&file.data);
            if probed.is_none() {
                tracing::warn!("Could not read image dimensions of {}", relative);
            }
            probed
        } else {
            None
        };

        if self.thumbnails && inspected.file_type == FileType::Image {
            if let Err(e) = self.files.write_thumbnail(&relative, file.data).await {
                tracing::warn!("Thumbnail for {} not generated: {}", relative, e);
            }
        }

        let display_order = match self.next_display_order(post_id).await {
            Ok(order) => order,
            Err(e) => {
                self.files.discard(&relative).await;
                return Err(e);
            }
        };

        let new_attachment = attachment::ActiveModel {
            post_id: sea_orm::ActiveValue::Set(post_id),
            original_name: sea_orm::ActiveValue::Set(file.original_name),
            saved_name: sea_orm::ActiveValue::Set(saved_name),
            file_path: sea_orm::ActiveValue::Set(relative.clone()),
            file_size: sea_orm::ActiveValue::Set(file_size as i64),
            mime_type: sea_orm::ActiveValue::Set(inspected.mime.to_string()),
            file_type: sea_orm::ActiveValue::Set(inspected.file_type),
            image_width: sea_orm::ActiveValue::Set(dimensions.map(|(w, _)| w as i32)),
            image_height: sea_orm::ActiveValue::Set(dimensions.map(|(_, h)| h as i32)),
            download_count: sea_orm::ActiveValue::Set(0),
            display_order: sea_orm::ActiveValue::Set(display_order),
            created_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        match new_attachment.insert(&self.db).await {
            Ok(saved) => {
                tracing::info!(
                    "Attachment stored: {} -> {} ({} bytes, {})",
                    saved.original_name,
                    saved.file_path,
                    saved.file_size,
                    saved.mime_type
                );
                Ok(saved)
            }
            Err(e) => {
                self.files.discard(&relative).await;
                Err(e.into())
            }
        }
    }

    async fn next_display_order(&self, post_id: i32) -> AppResult<i32> {
        let last = Attachment::find()
            .filter(attachment::Column::PostId.eq(post_id))
            .order_by_desc(attachment::Column::DisplayOrder)
            .one(&self.db)
            .await?;
        Ok(last.map_or(0, |a| a.display_order + 1))
    }

    /// Removes the file (missing is fine) and then the row.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let existing = self.get_by_id(id).await?;
        self.files.remove(&existing.file_path).await?;
        self.files
            .remove(&thumbnail_path(&existing.file_path))
            .await?;
        Attachment::delete_by_id(existing.id).exec(&self.db).await?;
        tracing::info!("Attachment deleted: {} ({})", existing.id, existing.file_path);
        Ok(())
    }

    /// Outside the editor panel a file is only as readable as its post:
    /// published, on a board the reader may see.
    async fn check_readable(&self, existing: &AttachmentModel, scope: BoardScope) -> AppResult<()> {
        if scope == BoardScope::All {
            return Ok(());
        }
        let (_, board) = Post::find_by_id(existing.post_id)
            .filter(post::Column::IsPublished.eq(true))
            .find_also_related(Board)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        scope.check(&board.ok_or(AppError::NotFound)?)
    }

    /// Reads the stored bytes and counts the download.
    pub async fn serve(&self, id: i32, scope: BoardScope) -> AppResult<ServedFile> {
        let existing = self.get_by_id(id).await?;
        self.check_readable(&existing, scope).await?;
        let data = self.files.read(&existing.file_path).await?;

        Attachment::update_many()
            .col_expr(
                attachment::Column::DownloadCount,
                Expr::col(attachment::Column::DownloadCount).add(1),
            )
            .filter(attachment::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        Ok(ServedFile {
            data,
            disposition: Disposition::for_mime(&existing.mime_type),
            mime_type: existing.mime_type,
            file_name: existing.original_name,
        })
    }

    /// Legacy `/files/path/...` links. Traversal segments are dropped before
    /// the path is joined to the upload root.
    pub async fn serve_by_relative_path(
        &self,
        raw: &str,
        scope: BoardScope,
    ) -> AppResult<ServedFile> {
        let relative = neutralize(raw)
            .ok_or_else(|| AppError::Validation("File path is required".to_string()))?;
        let relative = relative.to_string_lossy().replace('\\', "/");

        let known = Attachment::find()
            .filter(attachment::Column::FilePath.eq(relative.as_str()))
            .one(&self.db)
            .await?;
        if let Some(existing) = known {
            self.check_readable(&existing, scope).await?;
        }

        let data = self.files.read(&relative).await?;
        let mime = sniff::sniff_mime(&data).unwrap_or(sniff::MIME_OCTET_STREAM);
        let file_name = relative
            .rsplit('/')
            .next()
            .unwrap_or(relative.as_str())
            .to_string();

        Ok(ServedFile {
            data,
            mime_type: mime.to_string(),
            file_name,
            disposition: Disposition::for_mime(mime),
        })
    }

    pub async fn list_by_post(&self, post_id: i32) -> AppResult<Vec<AttachmentModel>> {
        let attachments = Attachment::find()
            .filter(attachment::Column::PostId.eq(post_id))
            .order_by_asc(attachment::Column::DisplayOrder)
            .order_by_asc(attachment::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(attachments)
    }

    pub async fn images_by_post(&self, post_id: i32) -> AppResult<Vec<AttachmentModel>> {
        let attachments = Attachment::find()
            .filter(attachment::Column::PostId.eq(post_id))
            .filter(attachment::Column::FileType.eq(FileType::Image))
            .order_by_asc(attachment::Column::DisplayOrder)
            .all(&self.db)
            .await?;
        Ok(attachments)
    }

    pub async fn list_by_type(
        &self,
        file_type: FileType,
        limit: u64,
    ) -> AppResult<Vec<AttachmentModel>> {
        let attachments = Attachment::find()
            .filter(attachment::Column::FileType.eq(file_type))
            .order_by_desc(attachment::Column::CreatedAt)
            .order_by_desc(attachment::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(attachments)
    }

    pub async fn most_downloaded(&self, limit: u64) -> AppResult<Vec<AttachmentModel>> {
        let attachments = Attachment::find()
            .order_by_desc(attachment::Column::DownloadCount)
            .order_by_desc(attachment::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(attachments)
    }

    pub async fn count(&self) -> AppResult<u64> {
        Ok(Attachment::find().count(&self.db).await?)
    }

    /// Sum of stored sizes in bytes.
    pub async fn total_file_size(&self) -> AppResult<i64> {
        // SUM(bigint) is numeric on PostgreSQL; cast back so both backends decode an i64.
        let total: Option<Option<i64>> = Attachment::find()
            .select_only()
            .column_as(
                SimpleExpr::from(Func::cast_as(
                    Func::coalesce([
                        SimpleExpr::from(Func::sum(Expr::col(attachment::Column::FileSize))),
                        Expr::val(0).into(),
                    ]),
                    Alias::new("BIGINT"),
                )),
                "total",
            )
            .into_tuple()
            .one(&self.db)
            .await?;
        Ok(total.flatten().unwrap_or(0))
    }

    pub async fn set_display_order(&self, id: i32, order: i32) -> AppResult<AttachmentModel> {
        let existing = self.get_by_id(id).await?;
        let mut active: attachment::ActiveModel = existing.into();
        active.display_order = sea_orm::ActiveValue::Set(order);
        let updated = active.update(&self.db).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn transfer_error_wins_over_everything() {
        let err = inspect(&IncomingFile::failed("a.png", "truncated"), 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("truncated")));
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(
            inspect(&IncomingFile::new("a.txt", Vec::new()), 10),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn size_checked_before_type() {
        let file = IncomingFile::new("big.bin", vec![0u8; 11]);
        let err = inspect(&file, 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("maximum size")));
    }

    #[test]
    fn html_named_jpg_is_rejected_on_content() {
        let file = IncomingFile::new("photo.jpg", b"<html><body>x</body></html>".to_vec());
        let err = inspect(&file, 1024).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("text/html")));
    }

    #[test]
    fn long_names_are_rejected() {
        let file = IncomingFile::new("가".repeat(256), PNG_HEADER.to_vec());
        assert!(inspect(&file, 1024).is_err());

        let file = IncomingFile::new("가".repeat(255), PNG_HEADER.to_vec());
        assert!(inspect(&file, 1024).is_ok());
    }

    #[test]
    fn classification_ignores_extension() {
        let file = IncomingFile::new("notes.png", "plain words".as_bytes().to_vec());
        let inspected = inspect(&file, 1024).unwrap();
        assert_eq!(inspected.mime, "text/plain");
        assert_eq!(inspected.file_type, FileType::Document);
        assert_eq!(inspected.extension, "txt");
    }

    #[test]
    fn disposition_by_mime() {
        assert_eq!(Disposition::for_mime("image/png"), Disposition::Inline);
        assert_eq!(
            Disposition::for_mime("application/pdf"),
            Disposition::Attachment
        );
        assert_eq!(Disposition::Inline.as_str(), "inline");
    }
}
