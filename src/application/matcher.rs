//! Path templates and route matching.
//!
//! Templates are plain paths whose segments may be `{name}` placeholders:
//! `/users/{id}/pets/{pet_id}`. A placeholder matches exactly one non-empty
//! segment. When several templates match a path, the one registered first wins.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{HttpMethod, MockError};

/// Collapse repeated slashes, drop the trailing slash and guarantee a single
/// leading slash. The root path normalizes to `/`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, MockError> {
        let normalized = normalize_path(template);
        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for raw in normalized.split('/').filter(|s| !s.is_empty()) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    if name.is_empty() || name.contains(['{', '}']) {
                        return Err(MockError::MalformedInput(format!(
                            "invalid parameter segment '{}' in '{}'",
                            raw, template
                        )));
                    }
                    if names.contains(&name) {
                        return Err(MockError::MalformedInput(format!(
                            "parameter '{}' appears twice in '{}'",
                            name, template
                        )));
                    }
                    names.push(name);
                    Segment::Param(name.to_string())
                }
                None if raw.contains(['{', '}']) => {
                    return Err(MockError::MalformedInput(format!(
                        "parameters must span a whole segment: '{}' in '{}'",
                        raw, template
                    )));
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Align a normalized path segment-by-segment, returning parameter bindings.
    pub fn bind(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut bindings = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    bindings.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(bindings)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => write!(f, "/{}", literal)?,
                Segment::Param(name) => write!(f, "/{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// Identity of a contract: normalized template text plus method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub path: String,
    pub method: HttpMethod,
}

impl RouteKey {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Matched {
        key: RouteKey,
        bindings: BTreeMap<String, String>,
    },
    /// The path matches at least one template, but none for this method
    MethodNotAllowed { allowed: Vec<HttpMethod> },
    NotFound,
}

/// Ordered index of registered templates
#[derive(Debug, Default)]
pub struct PathMatcher {
    routes: Vec<(PathTemplate, HttpMethod)>,
}

impl PathMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: &str, method: HttpMethod) -> Result<RouteKey, MockError> {
        let parsed = PathTemplate::parse(template)?;
        let path = parsed.to_string();
        if self
            .routes
            .iter()
            .any(|(existing, m)| *m == method && existing.to_string() == path)
        {
            return Err(MockError::DuplicateRoute { path, method });
        }
        self.routes.push((parsed, method));
        Ok(RouteKey::new(path, method))
    }

    /// Remove a route. Returns whether it was present.
    pub fn unregister(&mut self, key: &RouteKey) -> bool {
        let before = self.routes.len();
        self.routes
            .retain(|(template, method)| !(*method == key.method && template.to_string() == key.path));
        self.routes.len() != before
    }

    pub fn match_route(&self, path: &str, method: HttpMethod) -> RouteMatch {
        let path = normalize_path(path);
        let mut allowed = Vec::new();

        for (template, route_method) in &self.routes {
            let Some(bindings) = template.bind(&path) else {
                continue;
            };
            if *route_method == method {
                return RouteMatch::Matched {
                    key: RouteKey::new(template.to_string(), method),
                    bindings,
                };
            }
            if !allowed.contains(route_method) {
                allowed.push(*route_method);
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            allowed.sort();
            RouteMatch::MethodNotAllowed { allowed }
        }
    }

    /// Registered routes in registration order
    pub fn keys(&self) -> impl Iterator<Item = RouteKey> + '_ {
        self.routes
            .iter()
            .map(|(template, method)| RouteKey::new(template.to_string(), *method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("users/"), "/users");
        assert_eq!(normalize_path("//users//42/"), "/users/42");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_parse_template() {
        let template = PathTemplate::parse("/users/{id}/pets/{pet_id}/").unwrap();
        assert_eq!(template.to_string(), "/users/{id}/pets/{pet_id}");
        assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["id", "pet_id"]);
    }

    #[test]
    fn test_parse_rejects_bad_templates() {
        assert!(PathTemplate::parse("/users/{id}/{id}").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/users/user-{id}").is_err());
        assert!(PathTemplate::parse("/users/{id").is_err());
    }

    #[test]
    fn test_match_binds_parameters() {
        let mut matcher = PathMatcher::new();
        matcher.register("/users/{id}", HttpMethod::Get).unwrap();

        match matcher.match_route("/users/42", HttpMethod::Get) {
            RouteMatch::Matched { key, bindings } => {
                assert_eq!(key.path, "/users/{id}");
                assert_eq!(bindings.get("id").map(String::as_str), Some("42"));
            }
            other => panic!("unexpected match result: {:?}", other),
        }
        assert_eq!(matcher.match_route("/users", HttpMethod::Get), RouteMatch::NotFound);
        assert_eq!(matcher.match_route("/users/42/pets", HttpMethod::Get), RouteMatch::NotFound);
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let mut matcher = PathMatcher::new();
        matcher.register("/pet", HttpMethod::Post).unwrap();
        matcher.register("/pet", HttpMethod::Get).unwrap();

        assert_eq!(
            matcher.match_route("/pet/", HttpMethod::Delete),
            RouteMatch::MethodNotAllowed {
                allowed: vec![HttpMethod::Get, HttpMethod::Post]
            }
        );
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut matcher = PathMatcher::new();
        matcher.register("/users/{id}", HttpMethod::Get).unwrap();
        let err = matcher.register("users/{id}/", HttpMethod::Get).unwrap_err();
        assert!(matches!(err, MockError::DuplicateRoute { .. }));
        assert!(matcher.register("/users/{id}", HttpMethod::Put).is_ok());
    }

    #[test]
    fn test_first_registered_wins() {
        let mut matcher = PathMatcher::new();
        matcher.register("/users/{id}", HttpMethod::Get).unwrap();
        matcher.register("/users/me", HttpMethod::Get).unwrap();

        let RouteMatch::Matched { key, .. } = matcher.match_route("/users/me", HttpMethod::Get) else {
            panic!("expected a match");
        };
        assert_eq!(key.path, "/users/{id}");
    }

    #[test]
    fn test_unregister() {
        let mut matcher = PathMatcher::new();
        let key = matcher.register("/a/{x}", HttpMethod::Get).unwrap();
        assert!(matcher.keys().any(|k| k == key));
        assert!(matcher.unregister(&key));
        assert!(!matcher.unregister(&key));
        assert_eq!(matcher.keys().count(), 0);
        assert_eq!(matcher.match_route("/a/1", HttpMethod::Get), RouteMatch::NotFound);
    }
}
