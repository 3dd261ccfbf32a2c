//! Segment trie used for both routes and filters.
//!
//! Every node owns its literal children, at most one wildcard child and the leaves
//! terminating at it. Literal segments become ordinary children keyed by the segment
//! text, so identical literal prefixes share nodes. The first non-literal segment
//! descends into the single wildcard child, where every following placeholder is
//! collected into the leaf's [`Slot`] list. Segments carrying a regex compile the
//! whole remaining placeholder path into one expression with ordered captures.
//!
//! Matching walks the literal child first and falls back to the wildcard child, so a
//! literal route always beats a wildcard sibling at the same depth. Among several
//! leaves on one node the first registered leaf whose regex (if any) matches wins.

mod segment;

pub use segment::Slot;

use crate::error::RouterError;
use crate::params::{Params, SPLAT};
use regex::Regex;
use segment::{split_path, split_segment, Segment};

#[derive(Debug)]
pub struct Tree<T> {
    prefix: String,
    fixed: Vec<Tree<T>>,
    wildcard: Option<Box<Tree<T>>>,
    leaves: Vec<Leaf<T>>,
}

/// A trie terminal binding a compiled pattern to a value.
#[derive(Debug)]
pub struct Leaf<T> {
    value: T,
    slots: Vec<Slot>,
    regex: Option<Regex>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), fixed: Vec::new(), wildcard: None, leaves: Vec::new() }
    }

    /// The literal segment leading to this node, empty for the root and wildcard nodes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Literal children in registration order.
    pub fn fixed(&self) -> &[Tree<T>] {
        &self.fixed
    }

    pub fn wildcard(&self) -> Option<&Tree<T>> {
        self.wildcard.as_deref()
    }

    pub fn leaves(&self) -> &[Leaf<T>] {
        &self.leaves
    }

    /// Total number of leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
            + self.fixed.iter().map(Tree::leaf_count).sum::<usize>()
            + self.wildcard.as_ref().map_or(0, |w| w.leaf_count())
    }

    /// Total number of nodes in this subtree, the node itself included.
    pub fn node_count(&self) -> usize {
        1 + self.fixed.iter().map(Tree::node_count).sum::<usize>() + self.wildcard.as_ref().map_or(0, |w| w.node_count())
    }

    /// Matches a concrete path, returning the bound value and the captured parameters.
    ///
    /// Paths not starting with `/` never match.
    pub fn find(&self, path: &str) -> Option<(&T, Params)> {
        if !path.starts_with('/') {
            return None;
        }

        let segments = split_path(path);
        let mut values = Vec::with_capacity(segments.len());
        self.find_in(&segments, &mut values)
    }

    fn fixed_child(&self, segment: &str) -> Option<&Tree<T>> {
        self.fixed.iter().find(|child| child.prefix == segment)
    }

    fn find_in<'p>(&self, segments: &[&'p str], values: &mut Vec<&'p str>) -> Option<(&T, Params)> {
        let Some((&segment, rest)) = segments.split_first() else {
            return self
                .leaves
                .iter()
                .chain(self.wildcard.iter().flat_map(|wildcard| wildcard.leaves.iter()))
                .find_map(|leaf| leaf.matches(values).map(|params| (&leaf.value, params)));
        };

        let mut found = None;
        if let Some(child) = self.fixed_child(segment) {
            found = child.find_in(rest, values);
        } else if rest.is_empty() {
            // `/api/list.json` falls back to `/api/list` and records the extension
            if let Some((stem, ext)) = segment.rsplit_once('.') {
                if let Some((value, mut params)) = self.fixed_child(stem).and_then(|child| child.find_in(rest, values)) {
                    params.insert("ext", ext);
                    return Some((value, params));
                }
            }
        }

        if found.is_none() {
            if let Some(wildcard) = &self.wildcard {
                values.push(segment);
                found = wildcard.find_in(rest, values);
                values.pop();
            }
        }

        if found.is_none() {
            let mut all = values.clone();
            all.extend_from_slice(segments);
            found = self.leaves.iter().find_map(|leaf| leaf.matches(&all).map(|params| (&leaf.value, params)));
        }

        found
    }
}

impl<T: Clone + PartialEq> Tree<T> {
    /// Compiles `pattern` into the trie and binds it to `value`.
    ///
    /// Inserting a pattern already bound to an equal value leaves the trie unchanged.
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<(), RouterError> {
        if !pattern.starts_with('/') {
            return Err(RouterError::invalid_pattern(pattern, "pattern must start with '/'"));
        }

        let segments = split_path(pattern);
        self.add_segments(pattern, &segments, value, Vec::new(), String::new())
    }

    fn add_segments(
        &mut self,
        pattern: &str,
        segments: &[&str],
        value: T,
        wildcards: Vec<Slot>,
        reg: String,
    ) -> Result<(), RouterError> {
        let Some((&segment, rest)) = segments.split_first() else {
            return self.push_leaf(pattern, value, wildcards, &reg);
        };

        let Segment { mut wild, slots, regex: mut expr } = split_segment(segment);

        // an optional placeholder also registers the route without it
        if slots.first() == Some(&Slot::Optional) {
            self.add_segments(pattern, rest, value.clone(), wildcards.clone(), reg.clone())?;
        }

        // `/login/*/access`: literals after a splat are matched by the regex
        if !wild && wildcards.contains(&Slot::Splat) {
            wild = true;
            expr = segment.to_owned();
        }

        // `/user/:id/*`
        if segment == "*" && !wildcards.is_empty() && reg.is_empty() {
            expr = "(.+)".into();
        }

        if !wild {
            let index = match self.fixed.iter().position(|child| child.prefix == segment) {
                Some(index) => index,
                None => {
                    self.fixed.push(Tree::with_prefix(segment));
                    self.fixed.len() - 1
                }
            };
            return self.fixed[index].add_segments(pattern, rest, value, wildcards, reg);
        }

        if !expr.is_empty() {
            if reg.is_empty() {
                let mut prefix = wildcards.iter().map(leading_group).collect::<String>();
                prefix.push_str(&expr);
                expr = prefix;
            } else {
                expr.insert(0, '/');
            }
        } else if !reg.is_empty() {
            expr = slots.iter().map(trailing_group).collect();
        }

        let mut next = wildcards;
        next.extend(slots);
        let wildcard = self.wildcard.get_or_insert_with(|| Box::new(Tree::new()));
        wildcard.add_segments(pattern, rest, value, next, reg + &expr)
    }

    fn push_leaf(&mut self, pattern: &str, value: T, slots: Vec<Slot>, reg: &str) -> Result<(), RouterError> {
        let regex = if reg.is_empty() {
            None
        } else {
            let source = format!("^{reg}$");
            let regex = Regex::new(&source).map_err(|source| RouterError::InvalidRegex {
                pattern: pattern.to_owned(),
                regex: reg.to_owned(),
                source,
            })?;
            Some(regex)
        };

        let exists = self.leaves.iter().any(|leaf| {
            leaf.value == value && leaf.slots == slots && leaf.regex_source() == regex.as_ref().map(Regex::as_str)
        });
        if !exists {
            self.leaves.push(Leaf { value, slots, regex });
        }
        Ok(())
    }
}

/// Regex group standing for a placeholder captured before the first regex segment.
fn leading_group(slot: &Slot) -> &'static str {
    match slot {
        Slot::Optional | Slot::Dot => "",
        Slot::Named(_) | Slot::Ext => "([^/]+)/",
        Slot::Splat => "(.+)/",
        Slot::Path => r"([^/.]+)\.",
    }
}

/// Regex group standing for a placeholder following a regex segment.
fn trailing_group(slot: &Slot) -> &'static str {
    match slot {
        Slot::Optional | Slot::Dot => "",
        Slot::Named(_) => "/([^/]+)",
        Slot::Splat => "/(.+)",
        Slot::Path => "/([^/.]+)",
        Slot::Ext => r"\.([^/]+)",
    }
}

impl<T> Leaf<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Placeholders of the pattern in declaration order, markers included.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    fn regex_source(&self) -> Option<&str> {
        self.regex.as_ref().map(Regex::as_str)
    }

    fn captures(&self) -> Vec<&Slot> {
        self.slots.iter().filter(|slot| !slot.is_marker()).collect()
    }

    /// Matches the collected wildcard values against this leaf.
    fn matches(&self, values: &[&str]) -> Option<Params> {
        let captures = self.captures();

        let Some(regex) = &self.regex else {
            return match_plain(&captures, values);
        };

        let joined = values.join("/");
        let groups = regex.captures(&joined)?;
        let mut params = Params::new();
        // an optional group that did not participate leaves its key unset
        for (slot, group) in captures.iter().zip(groups.iter().skip(1)) {
            if let (Some(key), Some(group)) = (slot.key(), group) {
                params.insert(key, group.as_str());
            }
        }
        Some(params)
    }
}

fn match_plain(captures: &[&Slot], values: &[&str]) -> Option<Params> {
    if values.is_empty() && captures.is_empty() {
        return Some(Params::new());
    }

    if let [Slot::Splat] = captures {
        return Some(Params::from_iter([(SPLAT, values.join("/"))]));
    }

    let n = captures.len();
    if n >= 2 && *captures[n - 2] == Slot::Path && *captures[n - 1] == Slot::Ext {
        let (last, head) = values.split_last()?;
        let positional = n - 2;
        if head.len() < positional {
            return None;
        }

        let mut params = Params::new();
        for (slot, value) in captures[..positional].iter().zip(head) {
            if let Some(key) = slot.key() {
                params.insert(key, *value);
            }
        }

        let (stem, ext) = match last.split_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (*last, None),
        };
        let mut path = head[positional..].to_vec();
        path.push(stem);
        params.insert("path", path.join("/"));
        if let Some(ext) = ext {
            params.insert("ext", ext);
        }
        return Some(params);
    }

    if n != values.len() {
        return None;
    }

    Some(captures.iter().zip(values).filter_map(|(slot, value)| slot.key().map(|key| (key, *value))).collect())
}

#[cfg(test)]
mod tests {
    use super::Tree;
    use crate::params::Params;

    fn tree(patterns: &[&'static str]) -> Tree<&'static str> {
        let mut tree = Tree::new();
        for pattern in patterns {
            tree.insert(pattern, *pattern).unwrap();
        }
        tree
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn static_routes() {
        let tree = tree(&["/", "/admin", "/admin/users"]);

        assert_eq!(tree.find("/").map(|(v, _)| *v), Some("/"));
        assert_eq!(tree.find("/admin").map(|(v, _)| *v), Some("/admin"));
        assert_eq!(tree.find("/admin/users/").map(|(v, _)| *v), Some("/admin/users"));
        assert!(tree.find("/admin/groups").is_none());
        assert!(tree.find("admin").is_none());
    }

    #[test]
    fn named_param() {
        let tree = tree(&["/user/:id"]);

        let (value, p) = tree.find("/user/42").unwrap();
        assert_eq!(*value, "/user/:id");
        assert_eq!(p, params(&[("id", "42")]));

        assert!(tree.find("/user").is_none());
        assert!(tree.find("/user/42/extra").is_none());
    }

    #[test]
    fn literal_beats_wildcard_regardless_of_order() {
        let wildcard_first = tree(&["/user/:id", "/user/admin"]);
        let literal_first = tree(&["/user/admin", "/user/:id"]);

        for tree in [wildcard_first, literal_first] {
            assert_eq!(tree.find("/user/admin").map(|(v, _)| *v), Some("/user/admin"));
            assert_eq!(tree.find("/user/7").map(|(v, _)| *v), Some("/user/:id"));
        }
    }

    #[test]
    fn literal_miss_falls_back_to_wildcard() {
        let tree = tree(&["/user/admin/list", "/user/:id/:action"]);

        let (value, p) = tree.find("/user/admin/edit").unwrap();
        assert_eq!(*value, "/user/:id/:action");
        assert_eq!(p, params(&[("id", "admin"), ("action", "edit")]));
    }

    #[test]
    fn splat_captures_remainder() {
        let tree = tree(&["/files/*"]);

        let (_, p) = tree.find("/files/a/b/c").unwrap();
        assert_eq!(p.get(":splat"), Some("a/b/c"));

        let (_, p) = tree.find("/files").unwrap();
        assert_eq!(p.get(":splat"), Some(""));
    }

    #[test]
    fn splat_followed_by_literal() {
        let tree = tree(&["/login/*/access"]);

        let (_, p) = tree.find("/login/2009/11/access").unwrap();
        assert_eq!(p.get(":splat"), Some("2009/11"));
        assert!(tree.find("/login/2009/11/denied").is_none());
    }

    #[test]
    fn named_then_splat() {
        let tree = tree(&["/user/:id/*"]);

        let (_, p) = tree.find("/user/42/a/b").unwrap();
        assert_eq!(p, params(&[("id", "42"), (":splat", "a/b")]));
    }

    #[test]
    fn path_and_extension() {
        let tree = tree(&["/static/*.*"]);

        let (_, p) = tree.find("/static/css/site.min.css").unwrap();
        assert_eq!(p.get("path"), Some("css/site"));
        assert_eq!(p.get("ext"), Some("min.css"));
    }

    #[test]
    fn typed_params() {
        let tree = tree(&["/v1/:id:int", "/v2/:name:string"]);

        assert_eq!(tree.find("/v1/123").unwrap().1, params(&[("id", "123")]));
        assert!(tree.find("/v1/abc").is_none());
        assert_eq!(tree.find("/v2/bob_1").unwrap().1, params(&[("name", "bob_1")]));
        assert!(tree.find("/v2/bob-1").is_none());
    }

    #[test]
    fn regex_constrained_params() {
        let tree = tree(&["/v1/:id([0-9]+)/detail", "/cms_:id(.+)_:page.html"]);

        assert_eq!(tree.find("/v1/5/detail").unwrap().1, params(&[("id", "5")]));
        assert!(tree.find("/v1/x/detail").is_none());

        let (_, p) = tree.find("/cms_123_5.html").unwrap();
        assert_eq!(p, params(&[("id", "123"), ("page", "5")]));
    }

    #[test]
    fn regex_after_named_param() {
        let tree = tree(&["/shop/:category/:id:int"]);

        let (_, p) = tree.find("/shop/books/9").unwrap();
        assert_eq!(p, params(&[("category", "books"), ("id", "9")]));
        assert!(tree.find("/shop/books/nine").is_none());
    }

    #[test]
    fn optional_param() {
        let tree = tree(&["/user/?:id"]);

        assert_eq!(tree.find("/user").unwrap().1, Params::new());
        assert_eq!(tree.find("/user/3").unwrap().1, params(&[("id", "3")]));
    }

    #[test]
    fn extension_fallback() {
        let tree = tree(&["/api/list"]);

        let (value, p) = tree.find("/api/list.json").unwrap();
        assert_eq!(*value, "/api/list");
        assert_eq!(p, params(&[("ext", "json")]));
    }

    #[test]
    fn first_registered_leaf_wins() {
        let mut tree = Tree::new();
        tree.insert("/item/:id:int", "numeric").unwrap();
        tree.insert("/item/:name", "named").unwrap();
        tree.insert("/item/:other", "never").unwrap();

        assert_eq!(tree.find("/item/1").map(|(v, _)| *v), Some("numeric"));
        assert_eq!(tree.find("/item/abc").map(|(v, _)| *v), Some("named"));
    }

    #[test]
    fn reinsert_does_not_duplicate_structure() {
        let mut tree = tree(&["/user/:id", "/user/admin"]);
        let (nodes, leaves) = (tree.node_count(), tree.leaf_count());

        tree.insert("/user/:id", "/user/:id").unwrap();
        tree.insert("/user/admin", "/user/admin").unwrap();

        assert_eq!(tree.node_count(), nodes);
        assert_eq!(tree.leaf_count(), leaves);
    }

    #[test]
    fn shared_literal_prefix() {
        let tree = tree(&["/api/users", "/api/groups", "/api/users/:id"]);

        assert_eq!(tree.fixed().len(), 1);
        assert_eq!(tree.fixed()[0].prefix(), "api");
        assert_eq!(tree.fixed()[0].fixed().len(), 2);
    }

    #[test]
    fn invalid_patterns() {
        let mut tree = Tree::new();
        assert!(tree.insert("no-slash", ()).is_err());
        assert!(tree.insert("/bad/:id([0-9+)", ()).is_err());
    }
}
