//! Input normalization shared by the login and registration flows.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

pub const MAX_FIELD_LEN: usize = 255;

const FIRST_NAME_FALLBACK: &str = "Usuario";
const LAST_NAME_FALLBACK: &str = "Google";

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.chars().count() <= MAX_FIELD_LEN && EMAIL_RE.is_match(email)
}

/// Keeps only absolute http(s) URLs; anything else is dropped.
pub fn sanitize_avatar(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(raw.to_string()),
        _ => None,
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_FIELD_LEN).collect()
}

fn name_or(part: Option<&str>, fallback: &str) -> String {
    match part.map(str::trim) {
        Some(p) if p.chars().count() >= 2 => truncate(p),
        _ => fallback.to_string(),
    }
}

/// Splits a provider display name into `(first, last)` on the first space.
pub fn split_display_name(display_name: Option<&str>) -> (String, String) {
    let trimmed = display_name.map(str::trim).unwrap_or_default();
    let (first, last) = match trimmed.split_once(' ') {
        Some((f, l)) => (Some(f), Some(l)),
        None if !trimmed.is_empty() => (Some(trimmed), None),
        None => (None, None),
    };
    (
        name_or(first, FIRST_NAME_FALLBACK),
        name_or(last, LAST_NAME_FALLBACK),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert_eq!(normalize_email("  Marco@Roma.IT "), "marco@roma.it");
        assert!(is_valid_email("marco@roma.it"));
        assert!(!is_valid_email("marco@roma"));
        assert!(!is_valid_email("marco roma@it.com"));
        assert!(!is_valid_email(""));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(!is_valid_email(&long));
    }

    #[test]
    fn avatar_urls() {
        assert_eq!(
            sanitize_avatar(Some("https://lh3.googleusercontent.com/a/x.png")).as_deref(),
            Some("https://lh3.googleusercontent.com/a/x.png")
        );
        assert_eq!(sanitize_avatar(Some("not a url")), None);
        assert_eq!(sanitize_avatar(Some("javascript:alert(1)")), None);
        assert_eq!(sanitize_avatar(Some("ftp://files.example.com/a.png")), None);
        assert_eq!(sanitize_avatar(None), None);
    }

    #[test]
    fn display_name_split() {
        assert_eq!(
            split_display_name(Some("Marco Aurelio Antonino")),
            ("Marco".into(), "Aurelio Antonino".into())
        );
        assert_eq!(
            split_display_name(Some("Epicteto")),
            ("Epicteto".into(), "Google".into())
        );
        assert_eq!(split_display_name(None), ("Usuario".into(), "Google".into()));
        assert_eq!(split_display_name(Some("   ")), ("Usuario".into(), "Google".into()));
        assert_eq!(split_display_name(Some("A B")), ("Usuario".into(), "Google".into()));
    }

    #[test]
    fn display_name_is_capped() {
        let long = "x".repeat(400);
        let (first, _) = split_display_name(Some(&format!("{long} Y")));
        assert_eq!(first.chars().count(), MAX_FIELD_LEN);
    }
}
