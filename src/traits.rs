use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait PlatformApi: Send + Sync {
    /// Mute `user_id` for `duration` seconds. A duration of 0 lifts the mute.
    async fn set_group_ban(
        &self,
        group_id: &str,
        user_id: &str,
        duration: i64,
        self_id: &str,
    ) -> Result<(), AppError>;

    async fn set_group_kick(
        &self,
        group_id: &str,
        user_id: &str,
        reject_add_request: bool,
        self_id: &str,
    ) -> Result<(), AppError>;

    async fn send_group_msg(&self, group_id: &str, message: &str) -> Result<(), AppError>;
}

/// OneBot v11 HTTP action client.
pub(crate) struct OneBotApi {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) access_token: Option<String>,
}

impl OneBotApi {
    async fn call_action(&self, action: &str, body: Value) -> Result<Value, AppError> {
        let url = format!("{}/{}", self.api_url.trim_end_matches('/'), action);
        let mut req = self.http.post(&url).json(&body);
        if let Some(ref token) = self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(action = action, status = %status, body = %body, "OneBot action failed");
            return Err(AppError::Platform(format!("{action} failed: HTTP {status}")));
        }

        let data: Value = resp.json().await?;
        match data["status"].as_str() {
            Some("ok") | Some("async") => {
                debug!(action = action, "OneBot action succeeded");
                Ok(data["data"].clone())
            }
            _ => {
                let retcode = data["retcode"].as_i64().unwrap_or(-1);
                let detail = data["wording"]
                    .as_str()
                    .or_else(|| data["msg"].as_str())
                    .unwrap_or("no detail");
                Err(AppError::Platform(format!(
                    "{action} failed: retcode {retcode} ({detail})"
                )))
            }
        }
    }
}

/// OneBot expects numeric QQ ids; pass anything non-numeric through as-is.
fn id_value(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn with_self_id(mut body: Value, self_id: &str) -> Value {
    if !self_id.is_empty() {
        body["self_id"] = id_value(self_id);
    }
    body
}

#[async_trait]
impl PlatformApi for OneBotApi {
    async fn set_group_ban(
        &self,
        group_id: &str,
        user_id: &str,
        duration: i64,
        self_id: &str,
    ) -> Result<(), AppError> {
        let body = json!({
            "group_id": id_value(group_id),
            "user_id": id_value(user_id),
            "duration": duration,
        });
        self.call_action("set_group_ban", with_self_id(body, self_id))
            .await?;
        Ok(())
    }

    async fn set_group_kick(
        &self,
        group_id: &str,
        user_id: &str,
        reject_add_request: bool,
        self_id: &str,
    ) -> Result<(), AppError> {
        let body = json!({
            "group_id": id_value(group_id),
            "user_id": id_value(user_id),
            "reject_add_request": reject_add_request,
        });
        self.call_action("set_group_kick", with_self_id(body, self_id))
            .await?;
        Ok(())
    }

    async fn send_group_msg(&self, group_id: &str, message: &str) -> Result<(), AppError> {
        let body = json!({
            "group_id": id_value(group_id),
            "message": message,
            "auto_escape": true,
        });
        self.call_action("send_group_msg", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer, token: Option<&str>) -> OneBotApi {
        OneBotApi {
            http: Client::new(),
            api_url: server.uri(),
            access_token: token.map(str::to_string),
        }
    }

    fn ok_response() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({"status": "ok", "retcode": 0, "data": null}))
    }

    #[test]
    fn test_id_value_numeric_and_text() {
        assert_eq!(id_value("123456"), json!(123456));
        assert_eq!(id_value("abc"), json!("abc"));
    }

    #[tokio::test]
    async fn test_set_group_ban_posts_onebot_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/set_group_ban"))
            .and(body_json(json!({
                "group_id": 777,
                "user_id": 10001,
                "duration": 180,
                "self_id": 42
            })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        api(&server, None)
            .set_group_ban("777", "10001", 180, "42")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_group_kick_does_not_reject_rejoin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/set_group_kick"))
            .and(body_json(json!({
                "group_id": 777,
                "user_id": 10001,
                "reject_add_request": false,
                "self_id": 42
            })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        api(&server, None)
            .set_group_kick("777", "10001", false, "42")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_access_token_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send_group_msg"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        api(&server, Some("s3cret"))
            .send_group_msg("777", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_status_is_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/set_group_ban"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "retcode": 102,
                "wording": "no permission"
            })))
            .mount(&server)
            .await;

        let err = api(&server, None)
            .set_group_ban("777", "10001", 60, "42")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Platform(_)));
        assert!(err.to_string().contains("retcode 102"));
        assert!(err.to_string().contains("no permission"));
    }

    #[tokio::test]
    async fn test_http_error_is_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = api(&server, None)
            .set_group_kick("777", "10001", false, "42")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Platform(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_api_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send_group_msg"))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        let client = OneBotApi {
            http: Client::new(),
            api_url: format!("{}/", server.uri()),
            access_token: None,
        };
        client.send_group_msg("777", "hi").await.unwrap();
    }
}
