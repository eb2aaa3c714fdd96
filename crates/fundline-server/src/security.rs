//! Browser security headers.
//!
//! Equivalent of the usual Helmet defaults: a content security policy that
//! admits the site's own origin plus the analytics and embed hosts the
//! frontend loads, `nosniff`, same-origin framing, a referrer policy, and
//! HSTS in production. Headers already set by a handler are left alone.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Environment;

/// Content security policy for the marketing site.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' https://www.googletagmanager.com https://www.google-analytics.com \
    https://connect.facebook.net https://form.jotform.com https://assets.calendly.com; \
    style-src 'self' 'unsafe-inline' https://fonts.googleapis.com https://assets.calendly.com; \
    font-src 'self' data: https://fonts.gstatic.com; \
    img-src 'self' data: https:; \
    connect-src 'self' https://www.google-analytics.com https://region1.google-analytics.com \
    https://www.facebook.com https://api.jotform.com; \
    frame-src 'self' https://form.jotform.com https://calendly.com https://www.facebook.com; \
    object-src 'none'; \
    base-uri 'self'; \
    form-action 'self' https://submit.jotform.com";

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Wrap `router` with the security header layers for `environment`.
pub fn apply<S>(router: Router<S>, environment: Environment) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ));

    if environment.is_production() {
        router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS),
        ))
    } else {
        router
    }
}
