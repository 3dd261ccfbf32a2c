//! Route pattern segment compiler.
//!
//! A pattern is split on `/` and every segment is classified:
//!
//! | segment                | wild | slots                  | regex                   |
//! |------------------------|------|------------------------|-------------------------|
//! | `admin`                | no   |                        |                         |
//! | `:id`                  | yes  | `id`                   |                         |
//! | `?:id`                 | yes  | optional, `id`         |                         |
//! | `:id:int`              | yes  | `id`                   | `([0-9]+)`              |
//! | `:name:string`         | yes  | `name`                 | `([\w]+)`               |
//! | `:id([0-9]+)`          | yes  | `id`                   | `([0-9]+)`              |
//! | `:id([0-9]+)_:name`    | yes  | `id`, `name`           | `([0-9]+)_(.+)`         |
//! | `cms_:id(.+)_:page.html` | yes | `id`, `page`          | `cms_(.+)_(.+).html`    |
//! | `*`                    | yes  | splat                  |                         |
//! | `*.*`                  | yes  | dot, path, ext         |                         |

use crate::params::SPLAT;

/// One placeholder of a compiled pattern, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Marks the following placeholder as optional.
    Optional,
    /// Separator marker of a `*.*` segment.
    Dot,
    Named(String),
    Splat,
    Path,
    Ext,
}

impl Slot {
    /// The parameter key a captured value is stored under, `None` for markers.
    pub fn key(&self) -> Option<&str> {
        match self {
            Slot::Optional | Slot::Dot => None,
            Slot::Named(name) => Some(name.as_str()),
            Slot::Splat => Some(SPLAT),
            Slot::Path => Some("path"),
            Slot::Ext => Some("ext"),
        }
    }

    #[inline]
    pub fn is_marker(&self) -> bool {
        matches!(self, Slot::Optional | Slot::Dot)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) wild: bool,
    pub(crate) slots: Vec<Slot>,
    pub(crate) regex: String,
}

impl Segment {
    fn literal() -> Self {
        Self { wild: false, slots: Vec::new(), regex: String::new() }
    }

    fn wild(slots: Vec<Slot>, regex: String) -> Self {
        Self { wild: true, slots, regex }
    }
}

/// Splits a path into its non-empty outer segments, `"/a/b/"` becomes `["a", "b"]`.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches(|c| c == '/' || c == ' ');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').collect()
}

#[inline]
fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Compiles one pattern segment.
pub(crate) fn split_segment(key: &str) -> Segment {
    if key.starts_with('*') {
        if key == "*.*" {
            return Segment::wild(vec![Slot::Dot, Slot::Path, Slot::Ext], String::new());
        }
        return Segment::wild(vec![Slot::Splat], String::new());
    }

    if !key.contains(':') {
        return Segment::literal();
    }

    let chars = key.chars().collect::<Vec<_>>();
    let mut slots = Vec::new();
    let mut out = String::new();
    let mut param = String::new();
    let mut expr = String::new();
    let mut in_param = false;
    let mut in_expr = false;
    let mut params_num = 0_usize;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if in_param {
            if c == ':' {
                let rest = chars[i + 1..].iter().collect::<String>();
                if rest.starts_with("int") {
                    out.push_str("([0-9]+)");
                    slots.push(Slot::Named(std::mem::take(&mut param)));
                    params_num += 1;
                    in_param = false;
                    i += 1 + "int".len();
                    continue;
                }
                if rest.starts_with("string") {
                    out.push_str(r"([\w]+)");
                    slots.push(Slot::Named(std::mem::take(&mut param)));
                    params_num += 1;
                    in_param = false;
                    i += 1 + "string".len();
                    continue;
                }
            }

            if is_param_char(c) {
                param.push(c);
                i += 1;
                continue;
            }

            if c != '(' {
                out.push_str("(.+)");
                slots.push(Slot::Named(std::mem::take(&mut param)));
                params_num += 1;
                in_param = false;
            }
        }

        if in_expr && c != ')' {
            expr.push(c);
            i += 1;
            continue;
        }

        if i > 0 && chars[i - 1] == '\\' {
            out.push(c);
        } else {
            match c {
                ':' => {
                    param.clear();
                    in_param = true;
                }
                '(' => {
                    in_expr = true;
                    in_param = false;
                    if !param.is_empty() {
                        slots.push(Slot::Named(std::mem::take(&mut param)));
                    }
                    params_num += 1;
                    expr.clear();
                    expr.push('(');
                }
                ')' => {
                    in_expr = false;
                    expr.push(')');
                    out.push_str(&expr);
                    param.clear();
                }
                '?' => slots.push(Slot::Optional),
                _ => out.push(c),
            }
        }

        i += 1;
    }

    if !param.is_empty() {
        if params_num > 0 {
            out.push_str("(.+)");
        }
        slots.push(Slot::Named(param));
    }

    Segment::wild(slots, out)
}

#[cfg(test)]
mod tests {
    use super::{split_path, split_segment, Segment, Slot};

    fn named(name: &str) -> Slot {
        Slot::Named(name.into())
    }

    #[test]
    fn split_path_trims_slashes() {
        assert_eq!(split_path("/"), Vec::<&str>::new());
        assert_eq!(split_path("/admin/users/"), vec!["admin", "users"]);
        assert_eq!(split_path(" /a "), vec!["a"]);
    }

    #[test]
    fn literal_segment() {
        let segment = split_segment("admin");
        assert_eq!(segment, Segment { wild: false, slots: vec![], regex: String::new() });
    }

    #[test]
    fn named_segments() {
        let segment = split_segment(":id");
        assert!(segment.wild);
        assert_eq!(segment.slots, vec![named("id")]);
        assert_eq!(segment.regex, "");

        let segment = split_segment("?:id");
        assert_eq!(segment.slots, vec![Slot::Optional, named("id")]);
        assert_eq!(segment.regex, "");
    }

    #[test]
    fn typed_segments() {
        let segment = split_segment(":id:int");
        assert_eq!(segment.slots, vec![named("id")]);
        assert_eq!(segment.regex, "([0-9]+)");

        let segment = split_segment(":name:string");
        assert_eq!(segment.slots, vec![named("name")]);
        assert_eq!(segment.regex, r"([\w]+)");
    }

    #[test]
    fn regex_segments() {
        let segment = split_segment(":id([0-9]+)");
        assert_eq!(segment.slots, vec![named("id")]);
        assert_eq!(segment.regex, "([0-9]+)");

        let segment = split_segment(":id([0-9]+)_:name");
        assert_eq!(segment.slots, vec![named("id"), named("name")]);
        assert_eq!(segment.regex, "([0-9]+)_(.+)");
    }

    #[test]
    fn mixed_segment() {
        let segment = split_segment("cms_:id(.+)_:page.html");
        assert_eq!(segment.slots, vec![named("id"), named("page")]);
        assert_eq!(segment.regex, "cms_(.+)_(.+).html");
    }

    #[test]
    fn splat_segments() {
        assert_eq!(split_segment("*").slots, vec![Slot::Splat]);
        assert_eq!(split_segment("*.*").slots, vec![Slot::Dot, Slot::Path, Slot::Ext]);
    }

    #[test]
    fn slot_keys() {
        assert_eq!(Slot::Splat.key(), Some(":splat"));
        assert_eq!(named("id").key(), Some("id"));
        assert_eq!(Slot::Optional.key(), None);
        assert!(Slot::Dot.is_marker());
    }
}
