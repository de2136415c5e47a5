//! Login inference for git signatures

use crate::models::LoginSource;

/// Extract the login from a platform noreply address.
///
/// Handles both `<id>+<login>@users.noreply.<host>` and the older
/// `<login>@users.noreply.<host>`.
pub fn login_from_noreply(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if !domain.starts_with("users.noreply.") {
        return None;
    }
    let login = match local.split_once('+') {
        Some((_, login)) => login,
        None => local,
    };
    if login.is_empty() {
        None
    } else {
        Some(login.to_string())
    }
}

/// Lowercase, alphanumerics kept, every other run collapsed to one `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Best login guess for a git signature.
pub fn infer_login(name: &str, email: &str) -> (String, LoginSource) {
    if let Some(login) = login_from_noreply(email) {
        return (login, LoginSource::Noreply);
    }
    (slugify(name), LoginSource::NameSlug)
}
