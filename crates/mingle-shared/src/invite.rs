//! Invitation links and email list parsing.

use crate::constants::INVITE_PATH_SEGMENT;
use crate::error::InviteError;
use crate::types::ChatId;

/// Build the shareable link for a chat: `{site_url}/invite/{chat_id}`.
pub fn invite_url(site_url: &str, chat_id: ChatId) -> String {
    format!(
        "{}/{}/{}",
        site_url.trim_end_matches('/'),
        INVITE_PATH_SEGMENT,
        chat_id
    )
}

/// Extract the chat id from an invitation link or a bare `/invite/<id>` path.
pub fn parse_invite_link(link: &str) -> Result<ChatId, InviteError> {
    let marker = format!("/{INVITE_PATH_SEGMENT}/");
    let rest = link
        .find(&marker)
        .map(|at| &link[at + marker.len()..])
        .ok_or_else(|| InviteError::InvalidLink(link.to_string()))?;

    let id = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();

    ChatId::parse(id).map_err(|_| InviteError::InvalidLink(link.to_string()))
}

/// Loose `local@domain.tld` check: no whitespace, exactly one `@`, and a dot
/// inside the domain part.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Split a free-form list on `,`, `;` or newlines, trimming blanks.
///
/// All malformed addresses are reported together.
pub fn parse_email_list(input: &str) -> Result<Vec<String>, InviteError> {
    let emails: Vec<String> = input
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect();

    if emails.is_empty() {
        return Err(InviteError::Empty);
    }

    let invalid: Vec<String> = emails
        .iter()
        .filter(|e| !is_valid_email(e))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(InviteError::InvalidEmails(invalid));
    }

    Ok(emails)
}
