use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::EconomyError;
use crate::domain::ports::Economy;

#[derive(Debug, Serialize)]
struct BalanceRequest {
    player: Uuid,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

#[derive(Debug, Serialize)]
struct AmountRequest {
    player: Uuid,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

// Thin reqwest client for the economy service.
#[derive(Clone)]
pub struct EconomyClient {
    http: reqwest::Client,
    base_url: String,
}

impl EconomyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, EconomyError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| EconomyError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.is_client_error() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|error| error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(EconomyError::Rejected(message));
        }
        Err(EconomyError::Unavailable(status.to_string()))
    }
}

#[async_trait]
impl Economy for EconomyClient {
    async fn balance(&self, player: Uuid) -> Result<f64, EconomyError> {
        let response = self
            .post("/economy/balance", &BalanceRequest { player })
            .await?;
        response
            .json::<BalanceResponse>()
            .await
            .map(|body| body.balance)
            .map_err(|err| EconomyError::Unavailable(err.to_string()))
    }

    async fn withdraw(&self, player: Uuid, amount: f64) -> Result<(), EconomyError> {
        self.post("/economy/withdraw", &AmountRequest { player, amount })
            .await
            .map(|_| ())
    }

    async fn deposit(&self, player: Uuid, amount: f64) -> Result<(), EconomyError> {
        self.post("/economy/deposit", &AmountRequest { player, amount })
            .await
            .map(|_| ())
    }

    async fn cashback(&self, player: Uuid, spent: f64) -> Result<(), EconomyError> {
        self.post(
            "/economy/cashback",
            &AmountRequest {
                player,
                amount: spent,
            },
        )
        .await
        .map(|_| ())
    }
}

// Stand-in used when no economy service is configured: every paid action is refused.
pub struct DisabledEconomy;

#[async_trait]
impl Economy for DisabledEconomy {
    async fn balance(&self, _player: Uuid) -> Result<f64, EconomyError> {
        Ok(0.0)
    }

    async fn withdraw(&self, _player: Uuid, _amount: f64) -> Result<(), EconomyError> {
        Err(EconomyError::Unavailable("no economy service configured".to_string()))
    }

    async fn deposit(&self, _player: Uuid, _amount: f64) -> Result<(), EconomyError> {
        Err(EconomyError::Unavailable("no economy service configured".to_string()))
    }

    async fn cashback(&self, _player: Uuid, _spent: f64) -> Result<(), EconomyError> {
        Ok(())
    }
}
