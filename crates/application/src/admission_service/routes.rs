//! Request-path classification for the admission guard.
//!
//! Routes are reduced to a normalized pattern so every concrete resource URL
//! for the same endpoint shares one bucket: `/api/leads/123` and
//! `/api/leads/456` both become `api/leads/{id}`.

use leadflow_domain::RateScope;

/// Placeholder replacing identifier-like path segments.
const ID_PLACEHOLDER: &str = "{id}";

const ADMIN_PREFIXES: [&[&str]; 2] = [&["admin"], &["api", "admin"]];
const WEBHOOK_PREFIXES: [&[&str]; 2] = [&["webhooks"], &["api", "webhooks"]];

/// Classifies a request path into a traffic scope.
///
/// Webhook paths additionally yield the upstream provider, taken from the
/// path segment following the webhook prefix (`/webhooks/salesforce/…`).
#[must_use]
pub fn classify_scope(path: &str) -> (RateScope, Option<String>) {
    let segments: Vec<&str> = path_segments(path).collect();

    for prefix in ADMIN_PREFIXES {
        if segments.starts_with(prefix) {
            return (RateScope::Admin, None);
        }
    }

    for prefix in WEBHOOK_PREFIXES {
        if segments.starts_with(prefix) {
            let provider = segments
                .get(prefix.len())
                .filter(|segment| !is_identifier_segment(segment))
                .map(|segment| (*segment).to_owned());
            return (RateScope::Webhook, provider);
        }
    }

    (RateScope::Api, None)
}

/// Collapses identifier-like path segments into a shared placeholder.
///
/// The result carries no leading slash and no query string.
#[must_use]
pub fn normalize_route_key(path: &str) -> String {
    let normalized: Vec<&str> = path_segments(path)
        .map(|segment| {
            if is_identifier_segment(segment) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect();

    if normalized.is_empty() {
        "root".to_owned()
    } else {
        normalized.join("/")
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|segment| !segment.is_empty())
}

/// Heuristic for segments that name a resource instance rather than a route:
/// numeric ids, UUIDs, and long opaque tokens.
fn is_identifier_segment(segment: &str) -> bool {
    if segment.chars().all(|character| character.is_ascii_digit()) {
        return true;
    }

    if is_uuid_segment(segment) {
        return true;
    }

    segment.len() >= 24
        && segment
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '-' || character == '_')
}

fn is_uuid_segment(segment: &str) -> bool {
    let hex_length = segment
        .chars()
        .filter(|character| character.is_ascii_hexdigit())
        .count();

    segment.len() == 36
        && hex_length == 32
        && segment
            .match_indices('-')
            .map(|(index, _)| index)
            .eq([8usize, 13, 18, 23])
}

#[cfg(test)]
mod tests {
    use leadflow_domain::RateScope;

    use super::{classify_scope, normalize_route_key};

    #[test]
    fn numeric_segments_collapse_to_placeholder() {
        assert_eq!(normalize_route_key("/api/leads/123"), "api/leads/{id}");
        assert_eq!(normalize_route_key("/api/leads/456"), "api/leads/{id}");
    }

    #[test]
    fn uuid_segments_collapse_to_placeholder() {
        assert_eq!(
            normalize_route_key("/api/leads/a1b2c3d4-e5f6-7890-abcd-ef0123456789/notes"),
            "api/leads/{id}/notes"
        );
    }

    #[test]
    fn opaque_tokens_collapse_to_placeholder() {
        assert_eq!(
            normalize_route_key("/api/playbooks/pb_9f8e7d6c5b4a392817263544"),
            "api/playbooks/{id}"
        );
    }

    #[test]
    fn plain_routes_are_preserved() {
        assert_eq!(normalize_route_key("/api/leads"), "api/leads");
        assert_eq!(normalize_route_key("/health"), "health");
    }

    #[test]
    fn query_strings_are_stripped() {
        assert_eq!(normalize_route_key("/api/leads?page=2"), "api/leads");
    }

    #[test]
    fn empty_path_normalizes_to_root() {
        assert_eq!(normalize_route_key("/"), "root");
    }

    #[test]
    fn admin_prefixes_classify_as_admin() {
        assert_eq!(classify_scope("/admin/tenants"), (RateScope::Admin, None));
        assert_eq!(
            classify_scope("/api/admin/rate-limits"),
            (RateScope::Admin, None)
        );
    }

    #[test]
    fn webhook_paths_extract_provider() {
        assert_eq!(
            classify_scope("/webhooks/salesforce/leads"),
            (RateScope::Webhook, Some("salesforce".to_owned()))
        );
        assert_eq!(
            classify_scope("/api/webhooks/hubspot"),
            (RateScope::Webhook, Some("hubspot".to_owned()))
        );
    }

    #[test]
    fn webhook_without_provider_segment() {
        assert_eq!(classify_scope("/webhooks"), (RateScope::Webhook, None));
    }

    #[test]
    fn everything_else_is_api_scope() {
        assert_eq!(classify_scope("/api/leads/123"), (RateScope::Api, None));
        assert_eq!(classify_scope("/health"), (RateScope::Api, None));
    }
}
