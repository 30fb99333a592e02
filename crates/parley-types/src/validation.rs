//! Boundary predicates shared by the HTTP layer, tools and storage.

pub const THREAD_TITLE_MIN: usize = 2;
pub const THREAD_TITLE_MAX: usize = 64;

/// `^[a-z0-9]{2,16}$`
pub fn is_valid_tenant_slug(slug: &str) -> bool {
    (2..=16).contains(&slug.len())
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// A single `@`, non-empty local part, dotted domain without empty labels,
/// no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

pub fn is_valid_thread_title(title: &str) -> bool {
    (THREAD_TITLE_MIN..=THREAD_TITLE_MAX).contains(&title.trim().chars().count())
}

/// Title for a thread created from its first prompt: first letter upper-cased,
/// prompts of 28 characters or more cut to 25 characters plus `...`.
pub fn derive_thread_title(prompt: &str) -> String {
    let prompt = prompt.trim();
    let mut chars = prompt.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    if capitalized.chars().count() >= 28 {
        let head: String = capitalized.chars().take(25).collect();
        format!("{head}...")
    } else {
        capitalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_slug() {
        assert!(is_valid_tenant_slug("acme"));
        assert!(is_valid_tenant_slug("a1"));
        assert!(!is_valid_tenant_slug("a"));
        assert!(!is_valid_tenant_slug("Acme"));
        assert!(!is_valid_tenant_slug("acme-corp"));
        assert!(!is_valid_tenant_slug("abcdefghijklmnopq"));
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("ana@acme.io"));
        assert!(!is_valid_email("ana@acme"));
        assert!(!is_valid_email("@acme.io"));
        assert!(!is_valid_email("ana@@acme.io"));
        assert!(!is_valid_email("ana @acme.io"));
        assert!(!is_valid_email("ana@acme..io"));
    }

    #[test]
    fn test_thread_title_bounds() {
        assert!(!is_valid_thread_title("a"));
        assert!(is_valid_thread_title("ab"));
        assert!(is_valid_thread_title(&"x".repeat(64)));
        assert!(!is_valid_thread_title(&"x".repeat(65)));
    }

    #[test]
    fn test_derive_thread_title() {
        assert_eq!(derive_thread_title("find my invoices"), "Find my invoices");
        assert_eq!(derive_thread_title(&"a".repeat(27)), format!("A{}", "a".repeat(26)));

        let long = derive_thread_title("search dropbox for the quarterly report");
        assert_eq!(long, "Search dropbox for the qu...");
        assert_eq!(long.chars().count(), 28);
    }

    #[test]
    fn test_derive_thread_title_multibyte() {
        let title = derive_thread_title(&"é".repeat(40));
        assert!(title.starts_with('É'));
        assert!(title.ends_with("..."));
    }
}
