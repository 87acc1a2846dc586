/// Application name, used in notification titles and invitation mails.
pub const APP_NAME: &str = "Mingle";

/// Reaction vocabulary offered by the picker, in display order.
pub const EMOJI_LIST: [&str; 6] = ["👍", "❤️", "😂", "😮", "😢", "🙏"];

/// A user counts as online while their last heartbeat is younger than this.
pub const PRESENCE_WINDOW_SECS: i64 = 5 * 60;

/// Interval between presence heartbeats of an active session.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 4 * 60;

/// Maximum attachment size in bytes (10 MiB)
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// MIME types accepted as inline images.
pub const IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// MIME types accepted as downloadable documents.
pub const DOCUMENT_MIME_TYPES: [&str; 7] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "application/zip",
];

/// Object storage buckets
pub const BUCKET_CHAT_IMAGES: &str = "chat-images";
pub const BUCKET_CHAT_FILES: &str = "chat-files";
pub const BUCKET_AVATARS: &str = "avatars";

/// Display name used when a reactor's profile has not been loaded.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Path segment of invitation links: `{site}/invite/{chat_id}`
pub const INVITE_PATH_SEGMENT: &str = "invite";
