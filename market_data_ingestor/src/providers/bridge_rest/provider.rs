use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shared_utils::env::{env_var_opt, get_env_var};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::{
    models::{bar::RawBar, timeframe::NativeTimeframe},
    providers::{
        ApiSnafu, ClientBuildSnafu, InstrumentUnavailableSnafu, InternalSnafu, InvalidConfigSnafu,
        MissingEnvVarSnafu, ProviderError, ProviderInitError, QuoteSource, ReqwestSnafu,
        bridge_rest::{
            params::{SessionRequest, construct_rates_query},
            response::{RatesResponse, SelectResponse, SessionResponse},
        },
    },
};

/// Environment variable holding the trading account password.
pub const PASSWORD_ENV: &str = "CANDLE_SYNC_SOURCE_PASSWORD";

const DEFAULT_RPS: NonZeroU32 = nonzero!(20u32);

/// Connection settings for the bridge. Secrets are read from the environment, never from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Bridge root, e.g. `http://127.0.0.1:8228`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Trading account number used for the session login.
    #[serde(default)]
    pub account: Option<u64>,
    /// Broker trade server name.
    #[serde(default)]
    pub server: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Client-side request budget.
    #[serde(default = "default_rps")]
    pub max_requests_per_second: u32,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8228".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_rps() -> u32 {
    DEFAULT_RPS.get()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account: None,
            server: None,
            request_timeout_ms: default_request_timeout_ms(),
            max_requests_per_second: default_rps(),
        }
    }
}

/// [`QuoteSource`] backed by the terminal's REST bridge.
pub struct BridgeRestProvider {
    client: Client,
    base_url: Url,
    account: Option<u64>,
    server: Option<String>,
    password: Option<SecretString>,
    limiter: DefaultDirectRateLimiter,
}

impl BridgeRestProvider {
    /// Creates a new bridge provider.
    ///
    /// When an `account` is configured the password is required and read from
    /// [`PASSWORD_ENV`]; without an account the bridge reuses whatever session the
    /// terminal already has.
    pub fn new(config: &BridgeConfig) -> Result<Self, ProviderInitError> {
        let base_url = match Url::parse(config.base_url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                return InvalidConfigSnafu {
                    message: format!("base_url must be an http(s) URL, got {:?}", config.base_url),
                }
                .fail();
            }
        };

        let password = match config.account {
            Some(_) => Some(SecretString::from(
                get_env_var(PASSWORD_ENV).context(MissingEnvVarSnafu)?,
            )),
            None => env_var_opt(PASSWORD_ENV).map(SecretString::from),
        };

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .user_agent(concat!("candle-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(ClientBuildSnafu)?;

        let rps = NonZeroU32::new(config.max_requests_per_second).unwrap_or(DEFAULT_RPS);

        Ok(Self {
            client,
            base_url,
            account: config.account,
            server: config.server.clone(),
            password,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// Logs the terminal into the configured account. Called once at startup; a failure
    /// here is not retried.
    pub async fn connect(&self) -> Result<(), ProviderError> {
        let body = SessionRequest {
            account: self.account,
            password: self.password.as_ref().map(|p| p.expose_secret()),
            server: self.server.as_deref(),
        };

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(self.endpoint(&["session"])?)
            .json(&body)
            .send()
            .await
            .context(ReqwestSnafu)?;
        let session = check_status(response)
            .await?
            .json::<SessionResponse>()
            .await
            .context(ReqwestSnafu)?;

        if !session.connected {
            return ApiSnafu {
                status: 401u16,
                message: session
                    .message
                    .unwrap_or_else(|| "terminal refused the session".to_string()),
            }
            .fail();
        }
        info!(
            account = ?self.account,
            terminal = session.terminal.as_deref().unwrap_or("unknown"),
            "connected to trading terminal"
        );
        Ok(())
    }
}

impl BridgeRestProvider {
    /// `{base_url}/api/v1/{segments..}`, each segment percent-encoded (symbols such as
    /// `#AAPL` or `US500/CASH` stay one segment).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                InternalSnafu {
                    message: format!("base_url {} cannot carry a path", self.base_url),
                }
                .build()
            })?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown API error".to_string());
    ApiSnafu { status, message }.fail()
}

#[async_trait]
impl QuoteSource for BridgeRestProvider {
    fn name(&self) -> &str {
        "terminal-bridge"
    }

    async fn select_instrument(&self, instrument: &str) -> Result<(), ProviderError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .post(self.endpoint(&["symbols", instrument, "select"])?)
            .send()
            .await
            .context(ReqwestSnafu)?;
        let selected = check_status(response)
            .await?
            .json::<SelectResponse>()
            .await
            .context(ReqwestSnafu)?;

        selected
            .selected
            .then_some(())
            .context(InstrumentUnavailableSnafu { instrument })
    }

    async fn fetch_recent_bars(
        &self,
        instrument: &str,
        timeframe: NativeTimeframe,
        max_count: usize,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let query = construct_rates_query(instrument, timeframe, max_count)?;

        self.limiter.until_ready().await;
        let response = self
            .client
            .get(self.endpoint(&["rates"])?)
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;
        let rates = check_status(response)
            .await?
            .json::<RatesResponse>()
            .await
            .context(ReqwestSnafu)?;

        debug!(instrument, %timeframe, bars = rates.rates.len(), "copied rates");
        Ok(rates.rates.into_iter().map(RawBar::from).collect())
    }
}
