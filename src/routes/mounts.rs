use tower_http::services::ServeDir;

use crate::config::StaticMount;

/// Where a request path is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Static mount at `index`, with the mount prefix stripped from the path
    Static { index: usize, rest: &'a str },
    /// Session endpoint; the identifier is the remainder of the path, verbatim
    Session { doc_id: &'a str },
    Landing,
}

struct StaticRoute {
    prefix: String,
    service: ServeDir,
}

/// Path-prefix dispatch table.
///
/// The longest matching prefix wins. A static mount wins over the session
/// endpoint when both prefixes are equally long.
pub struct MountTable {
    statics: Vec<StaticRoute>,
    session_prefix: String,
}

impl MountTable {
    pub fn new(session_prefix: impl Into<String>, mounts: Vec<StaticMount>) -> Self {
        let statics = mounts
            .into_iter()
            .map(|mount| StaticRoute {
                service: ServeDir::new(&mount.root),
                prefix: mount.prefix,
            })
            .collect();
        Self {
            statics,
            session_prefix: session_prefix.into(),
        }
    }

    pub fn session_prefix(&self) -> &str {
        &self.session_prefix
    }

    pub fn resolve<'a>(&self, path: &'a str) -> Route<'a> {
        let best_static = self
            .statics
            .iter()
            .enumerate()
            .filter(|(_, route)| path.starts_with(&route.prefix))
            .max_by_key(|(_, route)| route.prefix.len());

        let session = path.strip_prefix(self.session_prefix.as_str());

        match (best_static, session) {
            (Some((index, route)), Some(_)) if route.prefix.len() >= self.session_prefix.len() => Route::Static {
                index,
                rest: &path[route.prefix.len()..],
            },
            (_, Some(doc_id)) => Route::Session { doc_id },
            (Some((index, route)), None) => Route::Static {
                index,
                rest: &path[route.prefix.len()..],
            },
            (None, None) => Route::Landing,
        }
    }

    pub fn static_service(&self, index: usize) -> Option<ServeDir> {
        self.statics.get(index).map(|route| route.service.clone())
    }
}
