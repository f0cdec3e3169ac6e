//! Upbit private-API authentication and the live order submitter.
//!
//! Every private call carries `Authorization: Bearer <jwt>` where the JWT is
//! HS256-signed with the secret key and, when a query/body is present,
//! includes a SHA-512 hash of the urlencoded parameter string.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use uuid::Uuid;

use crate::ExchangeError;

#[derive(Debug, Serialize)]
struct JwtClaims {
    access_key: String,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<&'static str>,
}

/// Build the bearer token for one request. `query` is the urlencoded
/// parameter string exactly as sent (empty for parameterless calls).
pub fn make_jwt(access_key: &str, secret_key: &str, query: &str) -> Result<String, ExchangeError> {
    let (query_hash, query_hash_alg) = if query.is_empty() {
        (None, None)
    } else {
        let mut hasher = Sha512::new();
        hasher.update(query.as_bytes());
        (Some(hex::encode(hasher.finalize())), Some("SHA512"))
    };

    let claims = JwtClaims {
        access_key: access_key.to_string(),
        nonce: Uuid::new_v4().to_string(),
        query_hash,
        query_hash_alg,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret_key.as_bytes()),
    )
    .map_err(|e| ExchangeError::Transport(format!("jwt encode failed: {e}")))
}

// ---------------------------------------------------------------------------
// Live submitter
// ---------------------------------------------------------------------------

/// One filled part of a live order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveFill {
    /// Coin quantity filled.
    pub qty: f64,
    /// Average fill price.
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    uuid: String,
    #[serde(default)]
    executed_volume: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
}

/// Authenticated client for `POST /v1/orders`.
///
/// Market BUYs are priced in KRW (`ord_type=price`), market SELLs in coin
/// quantity (`ord_type=market`), which is exactly the executor's size
/// contract.
#[derive(Clone)]
pub struct UpbitPrivateClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for UpbitPrivateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpbitPrivateClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UpbitPrivateClient {
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self::new_with_base_url(access_key, secret_key, crate::DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(access_key: String, secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url,
            access_key,
            secret_key,
        }
    }

    async fn submit(&self, params: Vec<(&str, String)>, fallback_price: f64) -> Result<LiveFill, ExchangeError> {
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let token = make_jwt(&self.access_key, &self.secret_key, &query)?;

        let body: serde_json::Value = params
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>()
            .into();

        let resp = self
            .http
            .post(format!("{}/v1/orders", self.base_url.trim_end_matches('/')))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Api { status: status.as_u16(), message });
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        let parse = |s: &Option<String>| s.as_deref().and_then(|v| v.parse::<f64>().ok());
        let price = parse(&order.avg_price)
            .or_else(|| parse(&order.price))
            .unwrap_or(fallback_price);
        let qty = parse(&order.executed_volume).unwrap_or(0.0);
        tracing::debug!(order_uuid = %order.uuid, qty, price, "live order accepted");
        Ok(LiveFill { qty, price })
    }
}

#[async_trait::async_trait]
impl crate::executor::OrderSubmitter for UpbitPrivateClient {
    async fn market_buy(&self, symbol: &str, krw_amount: f64) -> Result<LiveFill, ExchangeError> {
        let fill = self
            .submit(
                vec![
                    ("market", symbol.to_string()),
                    ("side", "bid".to_string()),
                    ("price", format!("{krw_amount:.0}")),
                    ("ord_type", "price".to_string()),
                ],
                0.0,
            )
            .await?;
        // a `price`-type order reports KRW spent; derive coin qty when the
        // venue has not yet reported executed volume
        if fill.qty > 0.0 {
            Ok(fill)
        } else if fill.price > 0.0 {
            Ok(LiveFill { qty: krw_amount / fill.price, price: fill.price })
        } else {
            Err(ExchangeError::Decode("order accepted without fill data".to_string()))
        }
    }

    async fn market_sell(&self, symbol: &str, qty: f64) -> Result<LiveFill, ExchangeError> {
        self.submit(
            vec![
                ("market", symbol.to_string()),
                ("side", "ask".to_string()),
                ("volume", format!("{qty:.8}")),
                ("ord_type", "market".to_string()),
            ],
            0.0,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn decode_claims(jwt: &str) -> serde_json::Value {
        let payload = jwt.split('.').nth(1).unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn jwt_without_query_omits_hash() {
        let jwt = make_jwt("ak", "sk", "").unwrap();
        let claims = decode_claims(&jwt);
        assert_eq!(claims["access_key"], "ak");
        assert!(claims.get("query_hash").is_none());
    }

    #[test]
    fn jwt_with_query_carries_sha512_hash() {
        let query = "market=KRW-BTC&side=bid";
        let jwt = make_jwt("ak", "sk", query).unwrap();
        let claims = decode_claims(&jwt);
        assert_eq!(claims["query_hash_alg"], "SHA512");

        let mut hasher = Sha512::new();
        hasher.update(query.as_bytes());
        assert_eq!(claims["query_hash"], hex::encode(hasher.finalize()));
    }

    #[test]
    fn nonces_are_unique_per_token() {
        let a = decode_claims(&make_jwt("ak", "sk", "").unwrap());
        let b = decode_claims(&make_jwt("ak", "sk", "").unwrap());
        assert_ne!(a["nonce"], b["nonce"]);
    }
}
