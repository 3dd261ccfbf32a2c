//! Router and dispatcher configuration.
//!
//! A single [`RouterConfig`] is handed to the [`RouterBuilder`](crate::RouterBuilder) and
//! shared with the [`Dispatcher`](crate::Dispatcher) built from it, so every request of a
//! process sees the same case folding, recovery and rendering rules.
//!
//! The configuration derives [`serde::Deserialize`]; missing keys fall back to the
//! defaults below, which lets a host load it from whatever format it already uses.

use serde::Deserialize;

/// The run mode decides whether diagnostics are rendered to clients.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Dev,
    Prod,
    Test,
}

impl RunMode {
    #[inline]
    pub fn is_dev(self) -> bool {
        self == RunMode::Dev
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// When false, patterns and request paths are lower-cased before matching.
    pub case_sensitive: bool,
    /// Call the controller `render` hook when a handler wrote nothing.
    pub auto_render: bool,
    pub enable_xsrf: bool,
    pub run_mode: RunMode,
    /// Recover handler failures at the dispatcher boundary instead of propagating them.
    pub recover_panic: bool,
    /// Map failures whose text equals a registered exception code to that error page.
    pub enable_errors_show: bool,
    /// Record request statistics through the configured sink.
    pub enable_admin: bool,
    pub access_logs: bool,
    pub copy_request_body: bool,
    /// Upper bound handed to the form parser, in bytes.
    pub max_memory: u64,
    pub session_on: bool,
    /// Url prefixes served as static files, skipped by the default access log filter.
    pub static_dirs: Vec<String>,
    /// Value of the `Server` response header in dev mode.
    pub server_name: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            auto_render: true,
            enable_xsrf: false,
            run_mode: RunMode::Dev,
            recover_panic: true,
            enable_errors_show: true,
            enable_admin: false,
            access_logs: false,
            copy_request_body: false,
            max_memory: 1 << 26,
            session_on: false,
            static_dirs: vec!["/static".into()],
            server_name: concat!("microRouter:", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl RouterConfig {
    pub fn prod() -> Self {
        Self { run_mode: RunMode::Prod, ..Self::default() }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn auto_render(mut self, auto_render: bool) -> Self {
        self.auto_render = auto_render;
        self
    }

    pub fn enable_xsrf(mut self, enable_xsrf: bool) -> Self {
        self.enable_xsrf = enable_xsrf;
        self
    }

    pub fn run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn recover_panic(mut self, recover_panic: bool) -> Self {
        self.recover_panic = recover_panic;
        self
    }

    pub fn enable_admin(mut self, enable_admin: bool) -> Self {
        self.enable_admin = enable_admin;
        self
    }

    pub fn access_logs(mut self, access_logs: bool) -> Self {
        self.access_logs = access_logs;
        self
    }

    pub fn session_on(mut self, session_on: bool) -> Self {
        self.session_on = session_on;
        self
    }

    pub fn enable_errors_show(mut self, enable_errors_show: bool) -> Self {
        self.enable_errors_show = enable_errors_show;
        self
    }

    pub fn copy_request_body(mut self, copy_request_body: bool) -> Self {
        self.copy_request_body = copy_request_body;
        self
    }

    pub fn static_dirs<I, S>(mut self, static_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_dirs = static_dirs.into_iter().map(Into::into).collect();
        self
    }
}
