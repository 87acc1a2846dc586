use tracing::{info, warn};

use mingle_shared::constants::{BUCKET_AVATARS, IMAGE_MIME_TYPES};
use mingle_shared::BackendError;
use mingle_store::models::{ProfilePatch, User};

use crate::commands::messaging::{object_key, Attachment};
use crate::error::{ClientError, ClientResult};
use crate::state::AppState;

pub async fn get_profile(state: &AppState) -> ClientResult<User> {
    let viewer = state.viewer()?;
    Ok(state.services.store.get_user(viewer).await?)
}

pub async fn update_display_name(state: &AppState, name: &str) -> ClientResult<User> {
    let viewer = state.viewer()?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::Invalid("display name cannot be empty".into()));
    }
    let user = state
        .services
        .store
        .update_profile(
            viewer,
            ProfilePatch {
                display_name: Some(name.to_string()),
                avatar_url: None,
            },
        )
        .await?;
    info!(user_id = %viewer, "display name updated");
    Ok(user)
}

/// Upload a new avatar under `{user_id}/` and drop the previous object.
pub async fn upload_avatar(state: &AppState, image: &Attachment) -> ClientResult<User> {
    let viewer = state.viewer()?;
    if !IMAGE_MIME_TYPES.contains(&image.mime_type.as_str()) {
        return Err(ClientError::UnsupportedFileType(image.mime_type.clone()));
    }
    let size = image.bytes.len();
    if size > state.config.max_file_size {
        return Err(ClientError::FileTooLarge {
            size,
            max: state.config.max_file_size,
        });
    }

    let store = &state.services.store;
    let objects = &state.services.objects;
    let previous = store.get_user(viewer).await?.avatar_url;

    let key = format!("{viewer}/{}", object_key(image));
    let path = match objects.upload(BUCKET_AVATARS, &key, image.bytes.clone()).await {
        Ok(path) => path,
        Err(BackendError::Conflict(_)) => key.clone(),
        Err(e) => return Err(e.into()),
    };

    let user = store
        .update_profile(
            viewer,
            ProfilePatch {
                display_name: None,
                avatar_url: Some(Some(path.clone())),
            },
        )
        .await?;

    if let Some(old) = previous.filter(|old| *old != path) {
        // A stale object is only wasted space.
        if let Err(e) = objects.remove(BUCKET_AVATARS, &[old]).await {
            warn!(user_id = %viewer, error = %e, "could not remove old avatar");
        }
    }

    info!(user_id = %viewer, "avatar updated");
    Ok(user)
}

pub async fn remove_avatar(state: &AppState) -> ClientResult<User> {
    let viewer = state.viewer()?;
    let store = &state.services.store;
    let previous = store.get_user(viewer).await?.avatar_url;

    let user = store
        .update_profile(
            viewer,
            ProfilePatch {
                display_name: None,
                avatar_url: Some(None),
            },
        )
        .await?;

    if let Some(old) = previous {
        state.services.objects.remove(BUCKET_AVATARS, &[old]).await?;
    }
    Ok(user)
}

/// Public URL of a user's avatar, if they have one.
pub fn avatar_url(state: &AppState, user: &User) -> Option<String> {
    user.avatar_url
        .as_deref()
        .map(|path| state.services.objects.public_url(BUCKET_AVATARS, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{backend, device};

    fn image(bytes: &[u8]) -> Attachment {
        Attachment {
            file_name: "me.jpg".into(),
            mime_type: "image/jpeg".into(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn display_name_round_trip() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        assert_eq!(update_display_name(&ada, " Ada L. ").await.unwrap().display_name, "Ada L.");
        assert_eq!(get_profile(&ada).await.unwrap().display_name, "Ada L.");
        assert!(matches!(
            update_display_name(&ada, "").await,
            Err(ClientError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn replacing_avatar_removes_the_old_object() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let viewer = ada.viewer().unwrap();

        let first = upload_avatar(&ada, &image(b"one")).await.unwrap();
        let first_path = first.avatar_url.clone().unwrap();
        assert!(first_path.starts_with(&viewer.to_string()));
        assert!(backend.objects().get(BUCKET_AVATARS, &first_path).await.is_ok());

        let second = upload_avatar(&ada, &image(b"two")).await.unwrap();
        let second_path = second.avatar_url.clone().unwrap();
        assert_ne!(first_path, second_path);
        assert!(backend.objects().get(BUCKET_AVATARS, &first_path).await.is_err());

        let url = avatar_url(&ada, &second).unwrap();
        assert!(url.ends_with(&format!("{BUCKET_AVATARS}/{second_path}")));

        let cleared = remove_avatar(&ada).await.unwrap();
        assert!(cleared.avatar_url.is_none());
        assert!(avatar_url(&ada, &cleared).is_none());
        assert!(backend.objects().get(BUCKET_AVATARS, &second_path).await.is_err());
    }

    #[tokio::test]
    async fn avatar_must_be_an_image() {
        let backend = backend();
        let ada = device(&backend, "ada").await;
        let pdf = Attachment {
            file_name: "cv.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        };
        assert!(matches!(
            upload_avatar(&ada, &pdf).await,
            Err(ClientError::UnsupportedFileType(_))
        ));
    }
}
