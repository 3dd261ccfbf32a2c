/// A route table entry and a request path that resolves to it.
#[derive(Debug, Copy, Clone)]
pub struct RouteCase {
    name: &'static str,
    group: RouteGroup,
    pattern: &'static str,
    path: &'static str,
}

impl RouteCase {
    pub const fn new(name: &'static str, group: RouteGroup, pattern: &'static str, path: &'static str) -> Self {
        Self { name, group, pattern, path }
    }

    pub const fn fixed(name: &'static str, pattern: &'static str) -> Self {
        Self::new(name, RouteGroup::Fixed, pattern, pattern)
    }

    pub const fn named(name: &'static str, pattern: &'static str, path: &'static str) -> Self {
        Self::new(name, RouteGroup::Named, pattern, path)
    }

    pub const fn regex(name: &'static str, pattern: &'static str, path: &'static str) -> Self {
        Self::new(name, RouteGroup::Regex, pattern, path)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> RouteGroup {
        self.group
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn path(&self) -> &'static str {
        self.path
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteGroup {
    Fixed,
    Named,
    Regex,
}

/// A route table shaped like a small REST api.
pub const ROUTES: [RouteCase; 8] = [
    RouteCase::fixed("root", "/"),
    RouteCase::fixed("health", "/api/health"),
    RouteCase::named("user", "/api/users/:id", "/api/users/42"),
    RouteCase::named("user_repo", "/api/users/:id/repos/:repo", "/api/users/42/repos/micro"),
    RouteCase::named("static_file", "/static/*", "/static/css/site/main.css"),
    RouteCase::regex("article", "/articles/:year:int/:slug", "/articles/2024/routing"),
    RouteCase::regex("commit", "/repos/:sha([0-9a-f]+)", "/repos/1a2b3c4"),
    RouteCase::regex("download", "/download/*.*", "/download/files/archive.tar"),
];
