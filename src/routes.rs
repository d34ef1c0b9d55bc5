//! Route tree: builder, validator, and resolver
//!
//! Routes mirror a filesystem layout: each path segment is either a literal
//! directory name or a dynamic slug written `[name]` that binds to any value
//! at match time. The tree is built once before the server accepts
//! connections and is immutable afterwards, shared read-only by every
//! connection thread.
//!
//! Build-time invariants (violations abort the build, never a request):
//! - segments are limited to a filename-safe charset (alnum, `.`, `_`, `-`)
//! - a path must not bind the same slug name twice
//! - a directory level holds at most one slug child
//! - no two registered paths may normalize (slug names erased) to the same
//!   tree path

use std::collections::{BTreeMap, HashMap};

use crate::endpoint::EndpointTable;

/// Build-time route configuration errors; all fatal
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route segment {segment:?} in {path:?}")]
    InvalidSegment { path: String, segment: String },
    #[error("slug name {name:?} bound twice in {path:?}")]
    DuplicateSlugName { path: String, name: String },
    #[error("conflicting slug directories [{existing}] and [{incoming}] under {path:?}")]
    AmbiguousSlug { path: String, existing: String, incoming: String },
}

/// One parsed segment of a route path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slug(String),
}

/// Characters allowed inside a segment or slug name
fn segment_charset_ok(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn parse_segments(path: &str) -> Result<Vec<Segment>, RouteError> {
    let mut segments = Vec::new();
    let mut seen_slugs: Vec<&str> = Vec::new();

    for raw in path.split('/').filter(|s| !s.is_empty()) {
        let segment = if let Some(name) =
            raw.strip_prefix('[').and_then(|r| r.strip_suffix(']'))
        {
            if !segment_charset_ok(name) {
                return Err(RouteError::InvalidSegment {
                    path: path.to_string(),
                    segment: raw.to_string(),
                });
            }
            if seen_slugs.contains(&name) {
                return Err(RouteError::DuplicateSlugName {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
            seen_slugs.push(name);
            Segment::Slug(name.to_string())
        } else {
            if !segment_charset_ok(raw) {
                return Err(RouteError::InvalidSegment {
                    path: path.to_string(),
                    segment: raw.to_string(),
                });
            }
            Segment::Literal(raw.to_string())
        };
        segments.push(segment);
    }

    Ok(segments)
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<String, Node>,
    /// At most one dynamic child per level: slug name and its subtree
    slug: Option<(String, Box<Node>)>,
    endpoints: EndpointTable,
}

impl Node {
    fn child_for(&mut self, segment: &Segment, path: &str) -> Result<&mut Node, RouteError> {
        match segment {
            Segment::Literal(name) => Ok(self.children.entry(name.clone()).or_default()),
            Segment::Slug(name) => {
                if let Some((existing, _)) = &self.slug {
                    if existing != name {
                        // a/[x] and a/[y] normalize to the same shape
                        return Err(RouteError::AmbiguousSlug {
                            path: path.to_string(),
                            existing: existing.clone(),
                            incoming: name.clone(),
                        });
                    }
                }
                let (_, node) = self.slug.get_or_insert_with(|| (name.clone(), Box::default()));
                Ok(node)
            }
        }
    }
}

/// Accumulates route registrations and validates them into a [`RouteTree`]
#[derive(Debug, Default)]
pub struct RouteTreeBuilder {
    root: Node,
}

impl RouteTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an endpoint table at the given route path.
    ///
    /// The path is directory-shaped (`users/[id]/profile`); a leading or
    /// trailing slash is tolerated. Registering the same path twice unions
    /// the tables (incoming handlers win on duplicate operation names).
    pub fn insert(&mut self, path: &str, table: EndpointTable) -> Result<(), RouteError> {
        let segments = parse_segments(path)?;

        let mut node = &mut self.root;
        for segment in &segments {
            node = node.child_for(segment, path)?;
        }
        node.endpoints.merge(table);
        Ok(())
    }

    /// Finalize the tree, keeping only operations claimed by a registered
    /// protocol. Unclaimed operation names loaded into a table are dropped,
    /// not an error.
    pub fn build(mut self, claimed: &[String]) -> RouteTree {
        retain_claimed(&mut self.root, claimed);
        RouteTree { root: self.root }
    }
}

fn retain_claimed(node: &mut Node, claimed: &[String]) {
    node.endpoints.retain_claimed(claimed);
    for child in node.children.values_mut() {
        retain_claimed(child, claimed);
    }
    if let Some((_, slug)) = &mut node.slug {
        retain_claimed(slug, claimed);
    }
}

/// A resolved route: the leaf's endpoint table and the slug bindings
/// captured on the way down
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub endpoints: &'a EndpointTable,
    pub slugs: HashMap<String, String>,
}

/// Immutable route lookup structure, shared by all connection threads
#[derive(Debug, Default)]
pub struct RouteTree {
    root: Node,
}

impl RouteTree {
    /// Resolve a request path to an endpoint table and slug bindings.
    ///
    /// At each level an exact literal match is preferred; the (single) slug
    /// child is the fallback, binding the slug name to the literal value. If
    /// a literal branch dead-ends deeper down, resolution backtracks into the
    /// slug branch. A node with an empty endpoint table is a dead end.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut slugs = HashMap::new();
        let endpoints = Self::walk(&self.root, &segments, &mut slugs)?;
        Some(RouteMatch { endpoints, slugs })
    }

    fn walk<'a>(
        node: &'a Node,
        segments: &[&str],
        slugs: &mut HashMap<String, String>,
    ) -> Option<&'a EndpointTable> {
        let Some((head, rest)) = segments.split_first() else {
            return (!node.endpoints.is_empty()).then_some(&node.endpoints);
        };

        if let Some(child) = node.children.get(*head) {
            if let Some(found) = Self::walk(child, rest, slugs) {
                return Some(found);
            }
        }

        if let Some((name, slug_child)) = &node.slug {
            slugs.insert(name.clone(), (*head).to_string());
            if let Some(found) = Self::walk(slug_child, rest, slugs) {
                return Some(found);
            }
            slugs.remove(name);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Response};

    fn table() -> EndpointTable {
        EndpointTable::new().on(Method::GET, |_| Ok(Response::ok()))
    }

    fn claimed() -> Vec<String> {
        vec!["GET".to_string()]
    }

    #[test]
    fn test_literal_wins_over_slug() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("users/[id]", table()).unwrap();
        builder.insert("users/settings", table()).unwrap();
        let tree = builder.build(&claimed());

        let m = tree.resolve("/users/settings").unwrap();
        assert!(m.slugs.is_empty());

        let m = tree.resolve("/users/42").unwrap();
        assert_eq!(m.slugs.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_backtracks_from_literal_dead_end() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("users/settings", table()).unwrap();
        builder.insert("users/[id]/profile", table()).unwrap();
        let tree = builder.build(&claimed());

        // "settings" matches the literal child, but the literal branch has no
        // "profile" below it; the slug branch must be retried
        let m = tree.resolve("/users/settings/profile").unwrap();
        assert_eq!(m.slugs.get("id").map(String::as_str), Some("settings"));
    }

    #[test]
    fn test_unresolved_and_partial_paths_miss() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("a/b/c", table()).unwrap();
        let tree = builder.build(&claimed());

        assert!(tree.resolve("/a/b/c").is_some());
        assert!(tree.resolve("/a/b").is_none());
        assert!(tree.resolve("/a/b/c/d").is_none());
        assert!(tree.resolve("/x").is_none());
    }

    #[test]
    fn test_root_path_resolves_to_root_table() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("/", table()).unwrap();
        let tree = builder.build(&claimed());

        assert!(tree.resolve("/").is_some());
    }

    #[test]
    fn test_empty_endpoint_table_is_a_miss() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("a", EndpointTable::new()).unwrap();
        let tree = builder.build(&claimed());

        assert!(tree.resolve("/a").is_none());
    }

    #[test]
    fn test_unclaimed_operations_are_dropped() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("a", table()).unwrap();
        // nothing claims GET, so the leaf ends up empty
        let tree = builder.build(&["WEBSOCKET".to_string()]);
        assert!(tree.resolve("/a").is_none());
    }

    #[test]
    fn test_two_slugs_at_one_level_fail_the_build() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("a/[x]/path", table()).unwrap();
        let err = builder.insert("a/[y]/path", table()).unwrap_err();
        assert!(matches!(err, RouteError::AmbiguousSlug { .. }));
    }

    #[test]
    fn test_slug_name_reuse_in_one_path_fails() {
        let mut builder = RouteTreeBuilder::new();
        let err = builder.insert("a/[x]/b/[x]", table()).unwrap_err();
        assert!(matches!(err, RouteError::DuplicateSlugName { .. }));
    }

    #[test]
    fn test_invalid_segment_characters_fail() {
        let mut builder = RouteTreeBuilder::new();
        assert!(matches!(
            builder.insert("a/b c", table()),
            Err(RouteError::InvalidSegment { .. })
        ));
        assert!(matches!(
            builder.insert("a/[x!]", table()),
            Err(RouteError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn test_same_path_registered_twice_merges() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("a", table()).unwrap();
        builder
            .insert("a", EndpointTable::new().on(Method::POST, |_| Ok(Response::ok())))
            .unwrap();
        let tree = builder.build(&["GET".to_string(), "POST".to_string()]);

        let m = tree.resolve("/a").unwrap();
        assert!(m.endpoints.get("GET").is_some());
        assert!(m.endpoints.get("POST").is_some());
    }

    #[test]
    fn test_nested_slug_bindings() {
        let mut builder = RouteTreeBuilder::new();
        builder.insert("orgs/[org]/repos/[repo]", table()).unwrap();
        let tree = builder.build(&claimed());

        let m = tree.resolve("/orgs/acme/repos/widget").unwrap();
        assert_eq!(m.slugs.get("org").map(String::as_str), Some("acme"));
        assert_eq!(m.slugs.get("repo").map(String::as_str), Some("widget"));
    }
}
