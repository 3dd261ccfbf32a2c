/// Lexically normalizes a slash separated path: repeated slashes collapse, `.` elements
/// disappear and `..` removes the preceding element. A trailing slash is dropped.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".into();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".into()
    } else {
        joined
    }
}

/// Joins the non empty elements with `/` and cleans the result; all empty gives `""`.
pub(crate) fn join_path(elements: &[&str]) -> String {
    let elements = elements.iter().copied().filter(|e| !e.is_empty()).collect::<Vec<_>>();
    if elements.is_empty() {
        return String::new();
    }
    clean_path(&elements.join("/"))
}

#[cfg(test)]
mod tests {
    use super::{clean_path, join_path};

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/../a"), "/a");
        assert_eq!(clean_path("a/../.."), "..");
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["/", "user", "*"]), "/user/*");
        assert_eq!(join_path(&["/api/", "/v1"]), "/api/v1");
        assert_eq!(join_path(&["", ""]), "");
        assert_eq!(join_path(&["/user", "{{placeholder}}"]), "/user/{{placeholder}}");
    }
}
