//! Turning task-result attachment references into downloadable files.
//!
//! References are resolved one by one and failures are skipped, so a single
//! broken attachment never costs the others.

use crate::logging::{LogLevel, Logger};
use crate::remote::{CommentAttachment, CrmClient, RemoteError};
use crate::types::{AttachmentReference, FileReference, ResolvedFile};
use serde_json::json;

pub struct AttachmentResolver<'a> {
    client: &'a CrmClient,
    logger: Logger,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(client: &'a CrmClient) -> Self {
        Self {
            client,
            logger: client.logger().child("attachments"),
        }
    }

    /// Resolve references to file references, preserving order.
    ///
    /// `n<id>` references name a file directly. Others are matched against the
    /// originating comment's attached objects, then looked up one at a time.
    /// When the comment lists files but none of the references match them,
    /// the comment's files are used as-is.
    pub async fn resolve(
        &self,
        task_id: i64,
        references: &[AttachmentReference],
        comment_id: Option<&str>,
    ) -> Vec<FileReference> {
        if references.is_empty() {
            return Vec::new();
        }

        let index = match comment_id {
            Some(comment_id) => self.comment_index(task_id, comment_id).await,
            None => {
                self.logger.debug("Result has no commentId");
                Vec::new()
            }
        };

        let locally_resolvable = references
            .iter()
            .any(|r| r.direct_file_id().is_some() || lookup(&index, r).is_some());
        if !index.is_empty() && !locally_resolvable {
            let files: Vec<FileReference> = index.into_iter().map(|a| a.file).collect();
            self.logger.log_with_data(
                LogLevel::Info,
                "Using file ids from comment attachments",
                json!({ "file_ids": files }),
            );
            return files;
        }

        let mut files = Vec::with_capacity(references.len());
        for reference in references {
            if let Some(file) = reference.direct_file_id() {
                files.push(file);
                continue;
            }
            if let Some(file) = lookup(&index, reference) {
                files.push(file.clone());
                continue;
            }
            match self.client.attached_object_file(reference.as_str()).await {
                Ok(file) => files.push(file),
                Err(e) => self.logger.log_with_data(
                    LogLevel::Warning,
                    "Attachment reference could not be resolved",
                    json!({ "reference": reference, "error": e.to_string() }),
                ),
            }
        }

        self.logger.log_with_data(
            LogLevel::Info,
            "Attachment references resolved",
            json!({ "requested": references.len(), "resolved": files }),
        );
        files
    }

    async fn comment_index(&self, task_id: i64, comment_id: &str) -> Vec<CommentAttachment> {
        match self.client.comment_attachments(task_id, comment_id).await {
            Ok(attachments) => {
                if attachments.is_empty() {
                    self.logger
                        .warning("Comment attached objects carry no FILE_ID");
                }
                attachments
            }
            Err(e) => {
                self.logger.log_with_data(
                    LogLevel::Warning,
                    "Comment attachments unavailable",
                    json!({ "comment_id": comment_id, "error": e.to_string() }),
                );
                Vec::new()
            }
        }
    }

    /// Download every file. Files whose metadata or content cannot be
    /// fetched are left out.
    pub async fn fetch_contents(&self, files: &[FileReference]) -> Vec<ResolvedFile> {
        let mut resolved = Vec::with_capacity(files.len());
        for file in files {
            match self.fetch_one(file).await {
                Ok(f) => resolved.push(f),
                Err(e) => self.logger.log_with_data(
                    LogLevel::Warning,
                    "File preparation failed",
                    json!({ "file_id": file, "error": e.to_string() }),
                ),
            }
        }
        resolved
    }

    async fn fetch_one(&self, file: &FileReference) -> Result<ResolvedFile, RemoteError> {
        let info = self.client.file_info(file).await?;
        let content = self.client.download(&info.download_url).await?;
        Ok(ResolvedFile {
            file: file.clone(),
            name: info.name,
            content,
        })
    }
}

fn lookup<'i>(index: &'i [CommentAttachment], reference: &AttachmentReference) -> Option<&'i FileReference> {
    index
        .iter()
        .find(|a| a.attachment_id.as_deref() == Some(reference.as_str()))
        .map(|a| &a.file)
}
