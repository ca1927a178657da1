//! Endpoint classification.
//!
//! # Responsibilities
//! - Map a (path, method) pair to a rate-limit category and quota
//! - Decide which requests bypass admission control entirely
//!
//! # Design Decisions
//! - Ordered table evaluated top-down, first match wins
//! - Predicates overlap (an admin path under `/api/` is also an API path),
//!   so the table order is part of the policy
//! - Quotas and the window are constants, not configuration

use std::fmt;
use std::time::Duration;

use axum::http::Method;

/// Rolling window shared by every category.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Policy category assigned to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Auth,
    Files,
    Admin,
    Read,
    Api,
}

impl Category {
    /// Stable lowercase label, used in keys, logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Auth => "auth",
            Category::Files => "files",
            Category::Admin => "admin",
            Category::Read => "read",
            Category::Api => "api",
        }
    }

    /// Quota and window for this category.
    pub fn policy(self) -> Policy {
        let max_requests = match self {
            Category::Auth => 10,
            Category::Files => 50,
            Category::Admin => 20,
            Category::Read => 200,
            Category::Api => 100,
        };
        Policy {
            max_requests,
            window: WINDOW,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-category limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_requests: usize,
    pub window: Duration,
}

/// Result of a successful classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub policy: Policy,
}

/// Path predicate of a single table row.
#[derive(Debug)]
enum PathRule {
    StartsWithAny(&'static [&'static str]),
    ContainsAny(&'static [&'static str]),
    StartsWith {
        prefix: &'static str,
        get_only: bool,
    },
}

impl PathRule {
    fn matches(&self, path: &str, method: &Method) -> bool {
        match self {
            PathRule::StartsWithAny(prefixes) => prefixes.iter().any(|p| path.starts_with(p)),
            PathRule::ContainsAny(markers) => markers.iter().any(|m| path.contains(m)),
            PathRule::StartsWith { prefix, get_only } => {
                path.starts_with(prefix) && (!*get_only || *method == Method::GET)
            }
        }
    }
}

#[derive(Debug)]
struct Rule {
    path: PathRule,
    category: Category,
}

const API_PREFIX: &str = "/api/";

static RULES: &[Rule] = &[
    Rule {
        path: PathRule::StartsWithAny(&["/api/auth/login", "/api/auth/validate-token"]),
        category: Category::Auth,
    },
    Rule {
        path: PathRule::StartsWithAny(&["/api/files/"]),
        category: Category::Files,
    },
    Rule {
        path: PathRule::ContainsAny(&["/create", "/update", "/delete", "/admin"]),
        category: Category::Admin,
    },
    Rule {
        path: PathRule::StartsWith {
            prefix: API_PREFIX,
            get_only: true,
        },
        category: Category::Read,
    },
    Rule {
        path: PathRule::StartsWith {
            prefix: API_PREFIX,
            get_only: false,
        },
        category: Category::Api,
    },
];

/// Classify a request. `None` means the request is not rate limited.
pub fn classify(path: &str, method: &Method) -> Option<Classification> {
    RULES
        .iter()
        .find(|rule| rule.path.matches(path, method))
        .map(|rule| Classification {
            category: rule.category,
            policy: rule.category.policy(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(path: &str, method: Method) -> Option<Category> {
        classify(path, &method).map(|c| c.category)
    }

    #[test]
    fn test_auth_endpoints() {
        assert_eq!(category("/api/auth/login", Method::POST), Some(Category::Auth));
        assert_eq!(
            category("/api/auth/validate-token", Method::GET),
            Some(Category::Auth)
        );
        assert_eq!(classify("/api/auth/login", &Method::POST).unwrap().policy.max_requests, 10);
    }

    #[test]
    fn test_other_auth_routes_fall_through() {
        // Only login and token validation are throttled as auth.
        assert_eq!(category("/api/auth/register", Method::POST), Some(Category::Api));
        assert_eq!(category("/api/auth/me", Method::GET), Some(Category::Read));
    }

    #[test]
    fn test_files_take_precedence_over_admin_markers() {
        assert_eq!(
            category("/api/files/delete/report.pdf", Method::DELETE),
            Some(Category::Files)
        );
    }

    #[test]
    fn test_admin_wins_over_api() {
        assert_eq!(category("/api/activities/create", Method::POST), Some(Category::Admin));
        assert_eq!(category("/api/levels/update/3", Method::PUT), Some(Category::Admin));
        assert_eq!(category("/api/admin/stats", Method::GET), Some(Category::Admin));
        assert_eq!(classify("/api/admin", &Method::GET).unwrap().policy.max_requests, 20);
    }

    #[test]
    fn test_admin_marker_outside_api() {
        assert_eq!(category("/admin/dashboard", Method::GET), Some(Category::Admin));
    }

    #[test]
    fn test_read_versus_write() {
        let read = classify("/api/activities", &Method::GET).unwrap();
        assert_eq!(read.category, Category::Read);
        assert_eq!(read.policy.max_requests, 200);

        let write = classify("/api/activities", &Method::POST).unwrap();
        assert_eq!(write.category, Category::Api);
        assert_eq!(write.policy.max_requests, 100);

        // HEAD is not a GET.
        assert_eq!(category("/api/activities", Method::HEAD), Some(Category::Api));
    }

    #[test]
    fn test_unclassified_paths_bypass() {
        assert_eq!(classify("/static/app.js", &Method::GET), None);
        assert_eq!(classify("/", &Method::GET), None);
        assert_eq!(classify("/api", &Method::GET), None);
        assert_eq!(classify("/health", &Method::GET), None);
    }

    #[test]
    fn test_every_category_uses_one_minute_window() {
        for c in [
            Category::Auth,
            Category::Files,
            Category::Admin,
            Category::Read,
            Category::Api,
        ] {
            assert_eq!(c.policy().window, Duration::from_secs(60));
        }
    }
}
