use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mingle_shared::constants::{
    BUCKET_CHAT_FILES, BUCKET_CHAT_IMAGES, DOCUMENT_MIME_TYPES, IMAGE_MIME_TYPES,
};
use mingle_shared::types::{ChatId, MessageId};
use mingle_shared::BackendError;
use mingle_store::models::{ContentType, Message, NewMessage};

use crate::error::{ClientError, ClientResult};
use crate::state::AppState;

/// A file picked for sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Bucket and message content type for an accepted MIME type.
pub fn classify(mime_type: &str) -> Option<(&'static str, ContentType)> {
    let mime = mime_type.trim().to_ascii_lowercase();
    if IMAGE_MIME_TYPES.contains(&mime.as_str()) {
        Some((BUCKET_CHAT_IMAGES, ContentType::Image))
    } else if DOCUMENT_MIME_TYPES.contains(&mime.as_str()) {
        Some((BUCKET_CHAT_FILES, ContentType::File))
    } else {
        None
    }
}

/// Lowercase extension of `file_name`, falling back to the MIME subtype.
fn extension(file_name: &str, mime_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match from_name {
        Some(ext) => ext.to_ascii_lowercase(),
        None => mime_type
            .rsplit('/')
            .next()
            .unwrap_or("bin")
            .to_ascii_lowercase(),
    }
}

/// Content-addressed object key: `{blake3 hex}.{ext}`.
pub fn object_key(attachment: &Attachment) -> String {
    let digest = blake3::hash(&attachment.bytes);
    format!(
        "{}.{}",
        hex::encode(digest.as_bytes()),
        extension(&attachment.file_name, &attachment.mime_type)
    )
}

/// Check and upload an attachment. Returns its content type and public URL.
///
/// Identical bytes map to the same key, so an upload that finds the object
/// already present counts as done.
pub async fn upload_attachment(state: &AppState, attachment: &Attachment) -> ClientResult<(ContentType, String)> {
    let size = attachment.bytes.len();
    if size > state.config.max_file_size {
        return Err(ClientError::FileTooLarge {
            size,
            max: state.config.max_file_size,
        });
    }
    let (bucket, content_type) = classify(&attachment.mime_type)
        .ok_or_else(|| ClientError::UnsupportedFileType(attachment.mime_type.clone()))?;

    let key = object_key(attachment);
    let path = match state
        .services
        .objects
        .upload(bucket, &key, attachment.bytes.clone())
        .await
    {
        Ok(path) => path,
        Err(BackendError::Conflict(_)) => {
            debug!(bucket, key = %key, "attachment already uploaded");
            key.clone()
        }
        Err(e) => return Err(e.into()),
    };

    info!(bucket, key = %path, size, "attachment uploaded");
    Ok((content_type, state.services.objects.public_url(bucket, &path)))
}

/// Build the row to insert, uploading the attachment first if there is one.
pub async fn prepare_message(
    state: &AppState,
    chat: ChatId,
    text: &str,
    attachment: Option<&Attachment>,
) -> ClientResult<NewMessage> {
    let content = text.trim().to_string();
    if content.is_empty() && attachment.is_none() {
        return Err(ClientError::Invalid("a message needs text or an attachment".into()));
    }

    let (content_type, media_url) = match attachment {
        Some(attachment) => {
            let (content_type, url) = upload_attachment(state, attachment).await?;
            (content_type, Some(url))
        }
        None => (ContentType::Text, None),
    };

    Ok(NewMessage {
        chat_id: chat,
        content,
        content_type,
        media_url,
    })
}

/// Send without an open thread. The stored row is returned; views pick it
/// up from the change feed.
pub async fn send_message(
    state: &AppState,
    chat: ChatId,
    text: &str,
    attachment: Option<&Attachment>,
) -> ClientResult<Message> {
    let viewer = state.viewer()?;
    let new = prepare_message(state, chat, text, attachment).await?;
    let message = state.services.store.send_message(viewer, new).await?;
    debug!(message_id = %message.id, chat_id = %chat, "message sent");
    Ok(message)
}

pub async fn delete_message(state: &AppState, id: MessageId) -> ClientResult<()> {
    let viewer = state.viewer()?;
    state.services.store.delete_message(viewer, id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::chats::create_chat;
    use crate::fixtures::{backend, device};

    fn png(bytes: &[u8]) -> Attachment {
        Attachment {
            file_name: "Photo.PNG".into(),
            mime_type: "image/png".into(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn mime_classification() {
        assert_eq!(classify("image/webp"), Some((BUCKET_CHAT_IMAGES, ContentType::Image)));
        assert_eq!(classify("application/pdf"), Some((BUCKET_CHAT_FILES, ContentType::File)));
        assert_eq!(classify("video/mp4"), None);
    }

    #[test]
    fn keys_are_content_addressed() {
        let a = object_key(&png(b"same"));
        let b = object_key(&Attachment {
            file_name: "other.png".into(),
            ..png(b"same")
        });
        assert_eq!(a, b);
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), 64 + ".png".len());
        assert_ne!(a, object_key(&png(b"different")));

        let no_ext = Attachment {
            file_name: "README".into(),
            mime_type: "text/plain".into(),
            bytes: b"x".to_vec(),
        };
        assert!(object_key(&no_ext).ends_with(".plain"));
    }

    #[tokio::test]
    async fn send_text_and_attachment() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        let text = send_message(&ada, chat.id, "  hi  ", None).await.unwrap();
        assert_eq!(text.content, "hi");
        assert_eq!(text.content_type, ContentType::Text);

        let photo = send_message(&ada, chat.id, "", Some(&png(b"\x89PNG")))
            .await
            .unwrap();
        assert_eq!(photo.content_type, ContentType::Image);
        let url = photo.media_url.unwrap();
        assert!(url.contains(BUCKET_CHAT_IMAGES));

        // Same bytes again: the existing object is reused.
        let again = send_message(&ada, chat.id, "again", Some(&png(b"\x89PNG")))
            .await
            .unwrap();
        assert_eq!(again.media_url.unwrap(), url);
    }

    #[tokio::test]
    async fn rejects_before_uploading() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let chat = create_chat(&ada, "Team", true).await.unwrap();

        assert!(matches!(
            send_message(&ada, chat.id, "  ", None).await,
            Err(ClientError::Invalid(_))
        ));

        let video = Attachment {
            file_name: "clip.mp4".into(),
            mime_type: "video/mp4".into(),
            bytes: vec![0; 4],
        };
        assert_eq!(
            send_message(&ada, chat.id, "", Some(&video)).await.unwrap_err(),
            ClientError::UnsupportedFileType("video/mp4".into())
        );

        let huge = png(&vec![0; ada.config.max_file_size + 1]);
        assert!(matches!(
            send_message(&ada, chat.id, "", Some(&huge)).await,
            Err(ClientError::FileTooLarge { .. })
        ));
    }
}
