use crate::config::ObjectStoreConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Storage track an upload is routed to. Determines the key prefix and how
/// the object store treats the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Any `image/*` media type
    Image,
    /// Fixed allow-list of document types, stored as opaque bytes
    Document,
}

impl UploadKind {
    /// Classify a declared media type into a storage track.
    /// Returns None for anything outside the supported set.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        if media_type.starts_with("image/") {
            return Some(Self::Image);
        }
        match media_type {
            "application/pdf"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "text/plain" => Some(Self::Document),
            _ => None,
        }
    }

    /// Per-category folder under the owner's prefix
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Image => "Images",
            Self::Document => "Documents",
        }
    }
}

/// Handle to a stored object, recorded in metadata and required for deletion
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Public URL of the object
    pub url: String,
    /// Opaque object key, used to delete the object later
    pub key: String,
}

/// Remote object storage used by the upload and delete workflows
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes under the owner's partition. `quality_transform` asks
    /// the store to apply its own best-effort quality transformation.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        owner_email: &str,
        kind: UploadKind,
        media_type: &str,
        quality_transform: bool,
    ) -> Result<StoredObject>;

    /// Delete an object by its opaque key
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-backed object store with per-user/per-category key partitioning
pub struct ObjectStore {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    root_folder: String,
}

impl ObjectStore {
    /// Create a new object store client
    pub async fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Object store client initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            root_folder: config.root_folder.clone(),
        })
    }

    /// Generate an object key partitioned by owner and category.
    /// Format: {root}/{owner_email}/{Images|Documents}/{uuid}.{ext}
    pub fn generate_key(&self, owner_email: &str, kind: UploadKind, media_type: &str) -> String {
        format!(
            "{root}/{owner}/{folder}/{id}.{ext}",
            root = self.root_folder,
            owner = sanitize_path_component(owner_email),
            folder = kind.folder(),
            id = Uuid::new_v4(),
            ext = extension_for(media_type),
        )
    }

    /// Public URL for a stored key
    fn object_url(&self, key: &str) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }
}

#[async_trait]
impl ObjectStorage for ObjectStore {
    /// The transformation request is recorded as an object tag for the
    /// bucket's processing pipeline to act on.
    #[instrument(skip(self, bytes), fields(owner = %owner_email, kind = ?kind, size_bytes = bytes.len()))]
    async fn upload(
        &self,
        bytes: Vec<u8>,
        owner_email: &str,
        kind: UploadKind,
        media_type: &str,
        quality_transform: bool,
    ) -> Result<StoredObject> {
        let key = self.generate_key(owner_email, kind, media_type);

        debug!(key = %key, "Uploading object");

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(media_type)
            .metadata("owner-email", owner_email);

        if quality_transform {
            request = request.tagging("transform=quality-auto");
        }

        request
            .send()
            .await
            .context("Failed to upload object to store")?;

        let url = self.object_url(&key);

        info!(key = %key, "Object uploaded successfully");
        metrics::counter!("upload.objects.stored").increment(1);

        Ok(StoredObject { url, key })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete object from store")?;

        debug!(key = %key, "Object deleted from store");
        metrics::counter!("upload.objects.deleted").increment(1);
        Ok(())
    }
}

/// Sanitize a path component to prevent path traversal. Keeps the characters
/// that commonly appear in email addresses.
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '@' | '.' | '+' => c,
            _ => '_',
        })
        .collect()
}

/// File extension for a declared media type
fn extension_for(media_type: &str) -> &str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_image_types() {
        assert_eq!(UploadKind::from_media_type("image/jpeg"), Some(UploadKind::Image));
        assert_eq!(UploadKind::from_media_type("image/png"), Some(UploadKind::Image));
        assert_eq!(UploadKind::from_media_type("image/x-obscure"), Some(UploadKind::Image));
    }

    #[test]
    fn test_classify_document_types() {
        assert_eq!(
            UploadKind::from_media_type("application/pdf"),
            Some(UploadKind::Document)
        );
        assert_eq!(
            UploadKind::from_media_type(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            Some(UploadKind::Document)
        );
        assert_eq!(UploadKind::from_media_type("text/plain"), Some(UploadKind::Document));
    }

    #[test]
    fn test_classify_unsupported_types() {
        assert_eq!(UploadKind::from_media_type("application/zip"), None);
        assert_eq!(UploadKind::from_media_type("video/mp4"), None);
        assert_eq!(UploadKind::from_media_type("text/html"), None);
        assert_eq!(UploadKind::from_media_type(""), None);
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("a@x.com"), "a@x.com");
        assert_eq!(sanitize_path_component("user+tag@mail.co"), "user+tag@mail.co");
        assert_eq!(sanitize_path_component("evil/../path"), "evil_.._path");
        assert_eq!(sanitize_path_component("space name"), "space_name");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }

    #[test]
    fn test_folder_per_kind() {
        assert_eq!(UploadKind::Image.folder(), "Images");
        assert_eq!(UploadKind::Document.folder(), "Documents");
    }
}
