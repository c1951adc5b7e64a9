//! Twitter API client: application-only bearer-token exchange and status
//! search.
//!
//! The search API only indexes recent tweets, so a fetch window is inherently
//! bounded to whatever the platform is still serving for the handle.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

const TOKEN_ENDPOINT: &str = "https://api.twitter.com/oauth2/token";
const SEARCH_ENDPOINT: &str = "https://api.twitter.com/1.1/search/tweets.json";

/// App-only credentials for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl TwitterCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            consumer_key: std::env::var("TWITTER_CONSUMER_KEY").ok()?,
            consumer_secret: std::env::var("TWITTER_CONSUMER_SECRET").ok()?,
        })
    }
}

/// Author object nested in each search result.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserPayload {
    pub id_str: String,
    pub name: String,
    pub screen_name: String,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub statuses_count: i64,
    #[serde(default)]
    pub created_at: String,
}

/// One status from the search API.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StatusPayload {
    pub id_str: String,
    pub text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub created_at: String,
    pub user: UserPayload,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<StatusPayload>,
}

/// Exchange consumer key/secret for a bearer token.
///
/// The Basic credential is base64 of the percent-encoded key and secret
/// joined by a colon, per the app-only-auth flow. Any failure here is fatal
/// to the run that requested the token.
pub async fn request_bearer_token(
    client: &reqwest::Client,
    credentials: &TwitterCredentials,
) -> Result<String, String> {
    let response = client
        .post(TOKEN_ENDPOINT)
        .header(
            "Authorization",
            format!(
                "Basic {}",
                basic_credentials(&credentials.consumer_key, &credentials.consumer_secret)
            ),
        )
        .header(
            "Content-Type",
            "application/x-www-form-urlencoded;charset=UTF-8",
        )
        .body("grant_type=client_credentials")
        .send()
        .await
        .map_err(|e| format!("Token request failed: {}", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read token response: {}", e))?;

    if !status.is_success() {
        return Err(format!(
            "Token endpoint error ({}): {}",
            status,
            truncate_error(&body)
        ));
    }

    let json: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| format!("Invalid JSON from token endpoint: {}", e))?;

    match json.get("access_token").and_then(|v| v.as_str()) {
        Some(token) => Ok(token.to_string()),
        None => Err("Token response missing access_token".to_string()),
    }
}

/// Fetch up to `count` recent statuses authored by `handle`.
///
/// A failed or malformed response is an `Err`, distinguishable from a handle
/// with zero recent statuses (`Ok` with an empty vec).
pub async fn search_statuses(
    client: &reqwest::Client,
    token: &str,
    handle: &str,
    count: u32,
) -> Result<Vec<StatusPayload>, String> {
    let url = format!(
        "{}?q=from%3A{}&count={}",
        SEARCH_ENDPOINT,
        percent_encode(handle),
        count
    );

    let response = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .map_err(|e| format!("Search request failed: {}", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read search response: {}", e))?;

    if status.as_u16() == 429 {
        return Err("Rate limited by search API".to_string());
    }

    if !status.is_success() {
        return Err(format!(
            "Search API error ({}): {}",
            status,
            truncate_error(&body)
        ));
    }

    let parsed: SearchResponse =
        serde_json::from_str(&body).map_err(|e| format!("Invalid JSON from search API: {}", e))?;

    Ok(parsed.statuses)
}

pub fn basic_credentials(consumer_key: &str, consumer_secret: &str) -> String {
    BASE64.encode(format!(
        "{}:{}",
        percent_encode(consumer_key),
        percent_encode(consumer_secret)
    ))
}

/// Normalize a platform timestamp ("Tue Mar 25 12:05:00 +0000 2014") to
/// "YYYY-MM-DD HH:MM:SS" UTC.
pub fn parse_platform_timestamp(raw: &str) -> Option<String> {
    chrono::DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| {
            dt.with_timezone(&chrono::Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
}

fn percent_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

fn truncate_error(s: &str) -> &str {
    if s.len() <= 200 {
        return s;
    }
    // Back off to a char boundary so multi-byte bodies can't panic the slice.
    let mut end = 200;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_leaves_unreserved_alone() {
        assert_eq!(percent_encode("rustlang_2024.x-~"), "rustlang_2024.x-~");
        assert_eq!(percent_encode("a b&c"), "a%20b%26c");
        assert_eq!(percent_encode("key:secret"), "key%3Asecret");
    }

    #[test]
    fn basic_credentials_encodes_joined_pair() {
        // base64("key:secret")
        assert_eq!(basic_credentials("key", "secret"), "a2V5OnNlY3JldA==");
        // Reserved characters are percent-encoded before joining.
        assert_eq!(
            basic_credentials("k&y", "s:t"),
            BASE64.encode("k%26y:s%3At")
        );
    }

    #[test]
    fn platform_timestamp_normalizes_to_utc() {
        assert_eq!(
            parse_platform_timestamp("Tue Mar 25 12:05:00 +0000 2014").as_deref(),
            Some("2014-03-25 12:05:00")
        );
        assert_eq!(
            parse_platform_timestamp("Tue Mar 25 12:05:00 +1100 2014").as_deref(),
            Some("2014-03-25 01:05:00")
        );
        assert!(parse_platform_timestamp("not a timestamp").is_none());
        assert!(parse_platform_timestamp("").is_none());
    }

    #[test]
    fn truncate_error_respects_char_boundaries() {
        let short = "tiny body";
        assert_eq!(truncate_error(short), short);

        // 199 ASCII bytes followed by a multi-byte char straddling byte 200.
        let long = format!("{}é and plenty more after that", "x".repeat(199));
        let truncated = truncate_error(&long);
        assert!(truncated.len() <= 200);
        assert_eq!(truncated, "x".repeat(199));

        let ascii_long = "y".repeat(300);
        assert_eq!(truncate_error(&ascii_long).len(), 200);
    }

    #[test]
    fn search_payload_deserializes() {
        let body = r#"{
            "statuses": [{
                "id_str": "448993416844288000",
                "text": "shipping it",
                "source": "<a href=\"http://twitter.com\">web</a>",
                "created_at": "Tue Mar 25 12:05:00 +0000 2014",
                "user": {
                    "id_str": "12345",
                    "name": "Rust Language",
                    "screen_name": "rustlang",
                    "followers_count": 100,
                    "friends_count": 50,
                    "statuses_count": 10,
                    "created_at": "Sat May 01 00:00:00 +0000 2010"
                }
            }],
            "search_metadata": {"count": 1}
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.statuses.len(), 1);
        let status = &parsed.statuses[0];
        assert_eq!(status.id_str, "448993416844288000");
        assert_eq!(status.user.screen_name, "rustlang");
        assert_eq!(status.user.followers_count, 100);
    }

    #[test]
    fn empty_search_response_is_zero_statuses() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"search_metadata": {}}"#).expect("parse");
        assert!(parsed.statuses.is_empty());
    }
}
