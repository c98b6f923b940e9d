/**
 * Visitor Routes
 * Lightweight analytics: a public tracking endpoint that records one row per
 * page view (classifying the user agent) and an admin stats summary.
 * Tracking failures never surface details to the client.
 */
use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;

use crate::db;
use crate::error::ApiError;
use crate::response::{self, Envelope};

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisitorStats {
    pub total: i64,
    pub unique: i64,
    pub today: i64,
    pub today_unique: i64,
    pub this_week: i64,
    pub this_month: i64,
}

/// Case-insensitive substring classification; checks run in a fixed order so
/// overlapping tokens (e.g. "android" contains no "tablet") resolve the same
/// way every time.
pub fn classify_device(user_agent: &str) -> &'static str {
    let ua = user_agent.to_lowercase();
    if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "Mobile"
    } else if ua.contains("tablet") || ua.contains("ipad") {
        "Tablet"
    } else {
        "Desktop"
    }
}

pub fn classify_browser(user_agent: &str) -> &'static str {
    let ua = user_agent.to_lowercase();
    if ua.contains("chrome") && !ua.contains("edg") {
        "Chrome"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("safari") && !ua.contains("chrome") {
        "Safari"
    } else if ua.contains("edg") {
        "Edge"
    } else if ua.contains("opera") || ua.contains("opr") {
        "Opera"
    } else {
        "Unknown"
    }
}

pub fn classify_platform(user_agent: &str) -> &'static str {
    let ua = user_agent.to_lowercase();
    if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac") || ua.contains("darwin") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("ios") || ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else {
        "Unknown"
    }
}

/// X-Forwarded-For first hop when present, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Start of the current server-local calendar day, in UTC.
fn local_day_start() -> DateTime<Utc> {
    let midnight = Local::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(Local::now);
    midnight.with_timezone(&Utc)
}

/// Start of the current server-local week (Monday), in UTC.
fn local_week_start() -> DateTime<Utc> {
    let today = Local::now().date_naive();
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let midnight = monday
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(Local::now);
    midnight.with_timezone(&Utc)
}

/// Start of the current server-local month, in UTC.
fn local_month_start() -> DateTime<Utc> {
    let today = Local::now().date_naive();
    let first = today.with_day(1).unwrap_or(today);
    let midnight = first
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(Local::now);
    midnight.with_timezone(&Utc)
}

struct VisitRecord {
    ip: String,
    user_agent: Option<String>,
    referer: Option<String>,
    path: String,
    device: &'static str,
    browser: &'static str,
    platform: &'static str,
    is_unique: bool,
}

/// Build the row to insert. A visit counts as unique only when the same IP
/// has not been seen yet during the server-local day.
fn build_visit(
    ip: String,
    user_agent: Option<String>,
    referer: Option<String>,
    path: String,
    seen_today: bool,
) -> VisitRecord {
    let (device, browser, platform) = match user_agent.as_deref() {
        Some(ua) => (classify_device(ua), classify_browser(ua), classify_platform(ua)),
        None => ("Unknown", "Unknown", "Unknown"),
    };

    VisitRecord {
        ip,
        user_agent,
        referer,
        path,
        device,
        browser,
        platform,
        is_unique: !seen_today,
    }
}

async fn record_visit(
    pool: &PgPool,
    headers: &HeaderMap,
    peer: SocketAddr,
    path: String,
) -> Result<(), sqlx::Error> {
    let ip = client_ip(headers, peer);
    let user_agent = header_str(headers, "user-agent");
    let referer = header_str(headers, "referer");

    // Check-then-insert; a concurrent same-IP request can double-count the
    // unique flag. Accepted for approximate analytics.
    let (seen_today,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM visitors WHERE ip_address = $1 AND visited_at >= $2)",
    )
    .bind(&ip)
    .bind(local_day_start())
    .fetch_one(pool)
    .await?;

    let visit = build_visit(ip, user_agent, referer, path, seen_today);

    sqlx::query(
        r#"INSERT INTO visitors
               (ip_address, user_agent, referer, path, device, browser, platform,
                is_unique, visited_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())"#,
    )
    .bind(&visit.ip)
    .bind(&visit.user_agent)
    .bind(&visit.referer)
    .bind(&visit.path)
    .bind(visit.device)
    .bind(visit.browser)
    .bind(visit.platform)
    .bind(visit.is_unique)
    .execute(pool)
    .await?;

    Ok(())
}

/// POST /api/v1/visitors/track - failures collapse into a generic 500
pub async fn track(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Option<Json<TrackPayload>>,
) -> Response {
    let path = payload
        .and_then(|Json(p)| p.path)
        .unwrap_or_else(|| "/".to_string());

    let result = match db::require_pool() {
        Ok(pool) => record_visit(pool.as_ref(), &headers, peer, path)
            .await
            .map_err(ApiError::from),
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => response::ok_message("Visitor tracked successfully").into_response(),
        Err(err) => {
            error!("Visitor tracking failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::<serde_json::Value> {
                    success: false,
                    data: None,
                    message: Some("Failed to track visitor".to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/admin/visitors/stats
pub async fn stats() -> Result<impl IntoResponse, ApiError> {
    let pool = db::require_pool()?;
    let day = local_day_start();
    let week = local_week_start();
    let month = local_month_start();

    let (total, unique, today, today_unique, this_week, this_month): (
        i64,
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        r#"SELECT
               COUNT(*),
               COUNT(*) FILTER (WHERE is_unique),
               COUNT(*) FILTER (WHERE visited_at >= $1),
               COUNT(*) FILTER (WHERE visited_at >= $1 AND is_unique),
               COUNT(*) FILTER (WHERE visited_at >= $2),
               COUNT(*) FILTER (WHERE visited_at >= $3)
           FROM visitors"#,
    )
    .bind(day)
    .bind(week)
    .bind(month)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(response::ok(VisitorStats {
        total,
        unique,
        today,
        today_unique,
        this_week,
        this_month,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const EDGE_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";
    const FIREFOX_TABLET: &str = "Mozilla/5.0 (Tablet; rv:68.0) Gecko/68.0 Firefox/68.0";

    #[test]
    fn test_classify_device() {
        assert_eq!(classify_device(CHROME_DESKTOP), "Desktop");
        assert_eq!(classify_device(SAFARI_IPHONE), "Mobile");
        assert_eq!(classify_device(FIREFOX_TABLET), "Tablet");
        assert_eq!(classify_device("some Android phone"), "Mobile");
    }

    #[test]
    fn test_classify_browser() {
        assert_eq!(classify_browser(CHROME_DESKTOP), "Chrome");
        assert_eq!(classify_browser(EDGE_DESKTOP), "Edge");
        assert_eq!(classify_browser(SAFARI_IPHONE), "Safari");
        assert_eq!(classify_browser(FIREFOX_LINUX), "Firefox");
        assert_eq!(classify_browser("curl/8.0"), "Unknown");
    }

    #[test]
    fn test_classify_platform() {
        assert_eq!(classify_platform(CHROME_DESKTOP), "Windows");
        assert_eq!(classify_platform(FIREFOX_LINUX), "Linux");
        assert_eq!(classify_platform("Mozilla/5.0 (iPhone)"), "iOS");
        assert_eq!(
            classify_platform("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5)"),
            "macOS"
        );
        assert_eq!(classify_platform("PlayStation 5"), "Unknown");
    }

    #[test]
    fn test_first_visit_of_the_day_is_unique_repeat_is_not() {
        let first = build_visit(
            "203.0.113.7".to_string(),
            Some(CHROME_DESKTOP.to_string()),
            None,
            "/".to_string(),
            false,
        );
        assert!(first.is_unique);
        assert_eq!(first.device, "Desktop");
        assert_eq!(first.browser, "Chrome");

        let repeat = build_visit(
            "203.0.113.7".to_string(),
            Some(CHROME_DESKTOP.to_string()),
            None,
            "/about".to_string(),
            true,
        );
        assert!(!repeat.is_unique);
    }

    #[test]
    fn test_missing_user_agent_classifies_unknown() {
        let visit = build_visit("203.0.113.7".to_string(), None, None, "/".to_string(), false);
        assert_eq!(visit.device, "Unknown");
        assert_eq!(visit.browser, "Unknown");
        assert_eq!(visit.platform, "Unknown");
        assert!(visit.is_unique);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "10.0.0.5:9999".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");

        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "10.0.0.5");
    }
}
