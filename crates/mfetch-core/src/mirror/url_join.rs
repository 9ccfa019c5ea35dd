/// Join a mirror base URL and an origin-relative fragment with exactly one `/`.
pub fn join_url(base: &str, fragment: &str) -> String {
    let base = base.trim_end_matches('/');
    let fragment = fragment.trim_start_matches('/');
    if fragment.is_empty() {
        return format!("{}/", base);
    }
    format!("{}/{}", base, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_separator() {
        assert_eq!(join_url("http://h/base/", "/a/b"), "http://h/base/a/b");
        assert_eq!(join_url("http://h/base", "a/b"), "http://h/base/a/b");
        assert_eq!(join_url("http://h", ""), "http://h/");
    }
}
