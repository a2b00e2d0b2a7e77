/// Validation helpers shared by the API and WS layers.

pub const MAX_NICKNAME_LEN: usize = 64;
pub const MAX_CHANNEL_NAME_LEN: usize = 64;
pub const MAX_SERVER_NAME_LEN: usize = 100;
/// Base64-encoded chat ciphertext size limit (4 MiB of plaintext bytes, §4.1).
pub const MAX_CHAT_CIPHERTEXT_LEN: usize = 4 * 1024 * 1024;
/// Avatar/icon upload cap (§6 REST surface).
pub const MAX_AVATAR_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

pub fn is_nonempty_trimmed(s: &str, max_len: usize) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= max_len
}

pub fn allowed_avatar_mime(mime: &str) -> bool {
    matches!(mime, "image/png" | "image/jpeg" | "image/webp" | "image/gif")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_oversized_names() {
        assert!(!is_nonempty_trimmed("   ", MAX_SERVER_NAME_LEN));
        assert!(!is_nonempty_trimmed(&"a".repeat(200), MAX_SERVER_NAME_LEN));
        assert!(is_nonempty_trimmed("Lobby", MAX_CHANNEL_NAME_LEN));
    }

    #[test]
    fn avatar_mime_allowlist() {
        assert!(allowed_avatar_mime("image/png"));
        assert!(!allowed_avatar_mime("image/svg+xml"));
    }
}
