//! Reverse resolution: builds a url from a controller endpoint and parameter values.

use super::{parse_method, RouteInfo, RouteKind, Router, HTTP_METHODS};
use crate::params::Params;
use crate::tree::{Leaf, Slot, Tree};
use crate::utils::join_path;
use http::Method;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const URL_PLACEHOLDER: &str = "{{placeholder}}";

impl Router {
    /// Builds the url of a controller capability.
    ///
    /// `endpoint` is `path.Controller.Capability`, where the `.` separated path is matched
    /// as a suffix of the controller's `package/Name`. `values` is a flat list of key and
    /// value pairs filling the pattern placeholders; the pairs left over are appended as a
    /// query string. An empty string is returned when no route can produce a url.
    ///
    /// ```
    /// use micro_router::controller::{Controller, ControllerType};
    /// use micro_router::{Router, RouterConfig};
    ///
    /// #[derive(Default)]
    /// struct UserController;
    /// impl Controller for UserController {}
    ///
    /// let user = ControllerType::<UserController>::new().with_package("app").into_ref();
    /// let router = Router::builder(RouterConfig::default()).add("/user/:id", &user, "get:Get")?.build();
    ///
    /// assert_eq!(router.url_for("app.UserController.Get", &["id", "7"]), "/user/7");
    /// assert_eq!(router.url_for("UserController.Get", &["id", "7", "tab", "info"]), "/user/7?tab=info");
    /// assert_eq!(router.url_for("UserController.Post", &["id", "7"]), "");
    /// # Ok::<(), micro_router::RouterError>(())
    /// ```
    pub fn url_for(&self, endpoint: &str, values: &[&str]) -> String {
        let Some((path, capability)) = endpoint.rsplit_once('.') else {
            warn!(endpoint, "url_for endpoint must be like path.controller.method");
            return String::new();
        };
        let Some(params) = Params::from_flat(values) else {
            warn!(endpoint, "url_for params must be key-value pairs");
            return String::new();
        };
        let controller = path.replace('.', "/");

        let target = Target { controller: &controller, capability };
        for method in &HTTP_METHODS {
            let Some(tree) = self.routers.get(method) else {
                continue;
            };
            if let Some(url) = target.resolve(tree, "/", method, &params) {
                return url;
            }
        }
        String::new()
    }
}

struct Target<'a> {
    controller: &'a str,
    capability: &'a str,
}

impl Target<'_> {
    /// Walks the tree depth first, literal children before the wildcard child before the
    /// node's own leaves, and returns the first url a leaf can produce.
    fn resolve(&self, tree: &Tree<Arc<RouteInfo>>, url: &str, method: &Method, params: &Params) -> Option<String> {
        for child in tree.fixed() {
            if let Some(found) = self.resolve(child, &join_path(&[url, child.prefix()]), method, params) {
                return Some(found);
            }
        }

        if let Some(wildcard) = tree.wildcard() {
            if let Some(found) = self.resolve(wildcard, &join_path(&[url, URL_PLACEHOLDER]), method, params) {
                return Some(found);
            }
        }

        tree.leaves().iter().find_map(|leaf| self.fill(leaf, url, method, params))
    }

    fn fill(&self, leaf: &Leaf<Arc<RouteInfo>>, url: &str, method: &Method, params: &Params) -> Option<String> {
        let RouteKind::Controller { controller, methods } = leaf.value().kind() else {
            return None;
        };
        if !controller.qualified_name().ends_with(self.controller) || !self.is_mapped(methods, method) {
            return None;
        }

        let params = params.clone();
        match leaf.regex() {
            Some(regex) => fill_regex(regex, leaf.slots(), url, params),
            None => fill_plain(leaf.slots(), url, params),
        }
    }

    /// Whether the leaf's verb mapping runs the capability for `method`.
    fn is_mapped(&self, methods: &HashMap<String, String>, method: &Method) -> bool {
        let upper = self.capability.to_uppercase();
        if parse_method(&upper).is_some()
            && (methods.is_empty()
                || methods.get(&upper).is_some_and(|c| *c == upper)
                || methods.get("*").is_some_and(|c| c == self.capability))
        {
            return true;
        }

        methods.iter().any(|(verb, capability)| (verb == "*" || verb == method.as_str()) && capability == self.capability)
    }
}

fn fill_plain(slots: &[Slot], url: &str, mut params: Params) -> Option<String> {
    let skip_placeholder = format!("/{URL_PLACEHOLDER}");

    let url = match slots {
        [] => url.replacen(&skip_placeholder, "", 1),
        [slot] => {
            let value = params.remove(slot.key()?)?;
            url.replacen(URL_PLACEHOLDER, &value, 1)
        }
        [Slot::Dot, Slot::Path, Slot::Ext] if params.contains_key("path") && params.contains_key("ext") => {
            let path = params.remove("path")?;
            let ext = params.remove("ext")?;
            url.replace(URL_PLACEHOLDER, &format!("{path}.{ext}"))
        }
        _ => {
            let mut url = url.to_owned();
            let mut can_skip = false;
            for slot in slots {
                if *slot == Slot::Optional {
                    can_skip = true;
                    continue;
                }
                match slot.key().and_then(|key| params.remove(key)) {
                    Some(value) => url = url.replacen(URL_PLACEHOLDER, &value, 1),
                    // a single optional placeholder may stay unfilled
                    None if can_skip => {
                        can_skip = false;
                        url = url.replacen(&skip_placeholder, "", 1);
                    }
                    None => return None,
                }
            }
            url
        }
    };

    Some(url + &params.to_query())
}

/// Rebuilds a concrete path from the leaf regex by replacing every group with the value of
/// its placeholder, then spreads the path segments over the url placeholders.
fn fill_regex(regex: &Regex, slots: &[Slot], url: &str, mut params: Params) -> Option<String> {
    let keys = slots.iter().filter_map(Slot::key).collect::<Vec<_>>();
    let source = regex.as_str().trim_start_matches('^').trim_end_matches('$');

    let mut path = String::new();
    let mut in_group = false;
    let mut index = 0;
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_group => {
                if let Some(escaped) = chars.next() {
                    path.push(escaped);
                }
            }
            '(' => in_group = true,
            ')' if in_group => {
                in_group = false;
                let Some(value) = keys.get(index).and_then(|key| params.remove(key)) else {
                    break;
                };
                path.push_str(&value);
                index += 1;
            }
            _ if in_group => {}
            c => path.push(c),
        }
    }

    if !regex.is_match(&path) {
        return None;
    }

    let mut url = url.to_owned();
    for part in path.split('/') {
        url = url.replacen(URL_PLACEHOLDER, part, 1);
    }
    Some(url + &params.to_query())
}
