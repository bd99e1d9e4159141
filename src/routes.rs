/// Addressable views. Every route has a path form so deep links (and the
/// post-login return marker) can be parsed back; anything unknown renders
/// the not-found view instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Events,
    EventDetail { event_id: String },
    RegisterForm { event_id: String },
    TeamManagement { form_id: String, query: Vec<(String, String)> },
    CertificateDesigner { event_id: String },
    NotFound { path: String },
}

impl Route {
    pub fn parse(raw: &str) -> Route {
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (raw, Vec::new()),
        };

        let segments: Vec<&str> = path
            .trim()
            .trim_start_matches('/')
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Route::Events,
            ["login"] => Route::Login,
            ["events"] => Route::Events,
            ["events", event_id] => Route::EventDetail {
                event_id: (*event_id).to_string(),
            },
            ["events", event_id, "form"] => Route::RegisterForm {
                event_id: (*event_id).to_string(),
            },
            ["events", _, "team", form_id] | ["team", form_id] => Route::TeamManagement {
                form_id: (*form_id).to_string(),
                query,
            },
            ["events", event_id, "certificates"] => Route::CertificateDesigner {
                event_id: (*event_id).to_string(),
            },
            _ => Route::NotFound {
                path: raw.to_string(),
            },
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Events => "/events".to_string(),
            Route::EventDetail { event_id } => format!("/events/{event_id}"),
            Route::RegisterForm { event_id } => format!("/events/{event_id}/form"),
            Route::TeamManagement { form_id, query } => {
                let base = format!("/team/{form_id}");
                if query.is_empty() {
                    base
                } else {
                    let joined: Vec<String> = query
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect();
                    format!("{base}?{}", joined.join("&"))
                }
            }
            Route::CertificateDesigner { event_id } => {
                format!("/events/{event_id}/certificates")
            }
            Route::NotFound { path } => path.clone(),
        }
    }

    /// Routes behind the login guard.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Route::RegisterForm { .. }
                | Route::TeamManagement { .. }
                | Route::CertificateDesigner { .. }
        )
    }
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

pub fn query_param<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_paths_round_trip() {
        for path in [
            "/login",
            "/events",
            "/events/ev42",
            "/events/ev42/form",
            "/team/form9",
            "/events/ev42/certificates",
        ] {
            let route = Route::parse(path);
            assert!(!matches!(route, Route::NotFound { .. }), "{path}");
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn unknown_paths_render_not_found_not_a_failure() {
        assert!(matches!(
            Route::parse("/no/such/view"),
            Route::NotFound { .. }
        ));
        assert!(matches!(Route::parse("/events/a/b/c/d"), Route::NotFound { .. }));
    }

    #[test]
    fn root_defaults_to_events() {
        assert_eq!(Route::parse("/"), Route::Events);
        assert_eq!(Route::parse(""), Route::Events);
    }

    #[test]
    fn team_deep_link_keeps_query_params() {
        let route = Route::parse("/team/form9?toast=joined&name=Bina");
        match &route {
            Route::TeamManagement { form_id, query } => {
                assert_eq!(form_id, "form9");
                assert_eq!(query_param(query, "toast"), Some("joined"));
                assert_eq!(query_param(query, "name"), Some("Bina"));
            }
            other => panic!("unexpected route {other:?}"),
        }
        assert!(route.requires_auth());
    }

    #[test]
    fn guard_covers_exactly_the_protected_views() {
        assert!(!Route::parse("/events").requires_auth());
        assert!(!Route::parse("/events/e1").requires_auth());
        assert!(!Route::parse("/login").requires_auth());
        assert!(Route::parse("/events/e1/form").requires_auth());
        assert!(Route::parse("/events/e1/certificates").requires_auth());
    }
}
