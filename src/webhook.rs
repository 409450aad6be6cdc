use serde_json::Value;

/// Posts JSON payloads to an optional outbound webhook (n8n and friends).
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        WebhookNotifier {
            url: url.filter(|u| !u.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Returns true only for a 2xx response. Missing configuration and
    /// transport errors are logged and reported as failure.
    pub async fn post(&self, payload: &Value) -> bool {
        let Some(url) = &self.url else {
            tracing::warn!("webhook notifier: no URL configured");
            return false;
        };
        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!("webhook notifier: {url} answered {}", resp.status());
                false
            }
            Err(e) => {
                tracing::error!("webhook notifier error: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn post_without_url_fails() {
        let notifier = WebhookNotifier::new(None);
        assert!(!notifier.post(&json!({"message": "oi"})).await);
    }

    #[tokio::test]
    async fn post_reports_2xx_as_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", server.url())));
        assert!(notifier.post(&json!({"message": "oi"})).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_reports_5xx_as_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", server.url())));
        assert!(!notifier.post(&json!({"message": "oi"})).await);
    }
}
