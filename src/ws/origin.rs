use std::fmt;
use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

type OriginPredicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Decides whether an upgrade from a given `Origin` is accepted.
///
/// Evaluated once per upgrade attempt. The default accepts every origin,
/// which suits local and demo deployments.
#[derive(Clone, Default)]
pub enum OriginPolicy {
    #[default]
    AllowAll,
    AllowList(Vec<String>),
    Custom(OriginPredicate),
}

impl OriginPolicy {
    /// Build from a comma separated origin list; `None` allows everything.
    pub fn from_config(origins: Option<&str>) -> Self {
        match origins {
            None => OriginPolicy::AllowAll,
            Some(list) => {
                let origins: Vec<String> = list
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect();
                if origins.iter().any(|o| o == "*") {
                    OriginPolicy::AllowAll
                } else {
                    OriginPolicy::AllowList(origins)
                }
            }
        }
    }

    pub fn custom(predicate: impl Fn(Option<&str>) -> bool + Send + Sync + 'static) -> Self {
        OriginPolicy::Custom(Arc::new(predicate))
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        match self {
            OriginPolicy::AllowAll => true,
            // Non-browser clients send no Origin header.
            OriginPolicy::AllowList(list) => match origin {
                None => true,
                Some(origin) => list.iter().any(|allowed| allowed == origin),
            },
            OriginPolicy::Custom(predicate) => predicate(origin),
        }
    }

    /// CORS layer for the polling exchange, mirroring the upgrade policy
    pub fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        match self {
            OriginPolicy::AllowAll => layer.allow_origin(Any),
            OriginPolicy::AllowList(list) => layer.allow_origin(
                list.iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<HeaderValue>>(),
            ),
            OriginPolicy::Custom(predicate) => {
                let predicate = predicate.clone();
                layer.allow_origin(AllowOrigin::predicate(move |origin, _| {
                    predicate(origin.to_str().ok())
                }))
            }
        }
    }
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginPolicy::AllowAll => write!(f, "AllowAll"),
            OriginPolicy::AllowList(list) => f.debug_tuple("AllowList").field(list).finish(),
            OriginPolicy::Custom(_) => write!(f, "Custom"),
        }
    }
}
