/// One public path rule, parsed from `"/path"`, `"/dir/*"` or `"METHOD:/path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PublicPath {
    method: Option<String>,
    target: PathTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathTarget {
    /// `/test/*` keeps `/test/` and matches anything starting with it.
    Prefix(String),
    Exact(String),
}

impl PublicPath {
    fn parse(rule: &str) -> Self {
        let parts: Vec<&str> = rule.split(':').collect();
        let (method, path) = match parts.as_slice() {
            [method, path] => (Some(method.to_ascii_uppercase()), *path),
            _ => (None, rule),
        };
        let target = match path.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => PathTarget::Prefix(prefix.to_string()),
            _ => PathTarget::Exact(path.to_string()),
        };
        PublicPath { method, target }
    }

    fn matches(&self, path: &str, method: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .is_none_or(|m| m.eq_ignore_ascii_case(method));
        let path_ok = match &self.target {
            PathTarget::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathTarget::Exact(exact) => path == exact,
        };
        method_ok && path_ok
    }
}

/// Allow-list of paths that skip authorization.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    public: Vec<PublicPath>,
}

impl PathPolicy {
    pub fn new<S: AsRef<str>>(rules: &[S]) -> Self {
        let public = rules
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(PublicPath::parse)
            .collect();
        PathPolicy { public }
    }

    pub fn is_protected(&self, path: &str, method: &str) -> bool {
        !self.public.iter().any(|rule| rule.matches(path, method))
    }
}

/// One-shot form of [`PathPolicy::is_protected`].
pub fn is_protected<S: AsRef<str>>(public_paths: &[S], path: &str, method: &str) -> bool {
    PathPolicy::new(public_paths).is_protected(path, method)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: [&str; 4] = ["/login", "POST:/logout", "/register/", "/test/*"];

    #[test]
    fn protected_resource() {
        assert!(is_protected(&RULES, "/user", "GET"));
        assert!(is_protected(&RULES, "/system/", "get"));
    }

    #[test]
    fn exact_match_is_public_for_any_method() {
        assert!(!is_protected(&RULES, "/login", "POST"));
        assert!(!is_protected(&RULES, "/login", "get"));
    }

    #[test]
    fn method_qualified_rule() {
        assert!(!is_protected(&RULES, "/logout", "POST"));
        assert!(!is_protected(&RULES, "/logout", "post"));
        assert!(is_protected(&RULES, "/logout", "DELETE"));
        assert!(!is_protected(&["post:/logout"], "/logout", "POST"));
    }

    #[test]
    fn trailing_slash_is_significant() {
        assert!(!is_protected(&RULES, "/register/", "GET"));
        assert!(is_protected(&RULES, "/register", "GET"));
    }

    #[test]
    fn prefix_rule() {
        assert!(!is_protected(&RULES, "/test/anything", "POST"));
        assert!(!is_protected(&RULES, "/test/12aA3", "PUT"));
        assert!(!is_protected(&RULES, "/test/", "GET"));
        assert!(!is_protected(&RULES, "/test/123/abc", "GET"));
        assert!(is_protected(&RULES, "/test", "DELETE"));
        assert!(is_protected(&RULES, "/testing", "GET"));
    }

    #[test]
    fn empty_policy_protects_everything() {
        let policy = PathPolicy::new::<&str>(&[]);
        assert!(policy.is_protected("/", "GET"));

        let policy = PathPolicy::new(&["", "  "]);
        assert!(policy.is_protected("/", "GET"));
    }
}
