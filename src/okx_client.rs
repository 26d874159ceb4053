// ===============================
// src/okx_client.rs
// ===============================
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::RawPosition;
use crate::fetch::{FetchError, PositionFetcher, TraderDirectory};
use crate::okx::{
    extract_unique_code, merge_new_traders, query_string, short_link, sign_request, timestamp_iso, Envelope, LeadTrader,
    LeadTraderPage, SubPosition, BALANCE_PATH, LEAD_TRADERS_PATH, LEAD_TRADER_MAX_PAGES, LEAD_TRADER_PAGE_SIZE,
    LEAD_TRADER_SORTS, SUBPOSITIONS_PATH,
};

#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

/// OKX copy-trading REST adapter. Position reads use the public endpoint;
/// credentials are only needed for `check_credentials`.
pub struct OkxClient {
    http: reqwest::Client,
    base_url: String,
    inst_type: String,
    credentials: Option<Credentials>,
}

impl OkxClient {
    pub fn new(
        base_url: &str,
        inst_type: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("copytrade_watch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            inst_type: inst_type.to_string(),
            credentials,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    async fn decode<T: serde::de::DeserializeOwned>(rsp: reqwest::Response) -> Result<Vec<T>, FetchError> {
        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = rsp.text().await?;
        let env: Envelope<T> = serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        if env.code != "0" {
            return Err(FetchError::Api { code: env.code, msg: env.msg });
        }
        Ok(env.data)
    }

    async fn get_public<T: serde::de::DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<T>, FetchError> {
        let url = format!("{}{}?{}", self.base_url, path, query_string(params));
        let rsp = self.http.get(url).send().await?;
        Self::decode(rsp).await
    }

    /// Follow a share link (reqwest follows redirects) and read the code off
    /// the landing URL. `Ok(None)` when it lands somewhere without one.
    pub async fn resolve_short_link(&self, link: &str) -> Result<Option<String>, FetchError> {
        let rsp = self.http.head(link).send().await?;
        let landed = rsp.url().as_str();
        debug!(link, landed, "share link resolved");
        Ok(extract_unique_code(landed))
    }

    /// Raw position rows of one trader.
    async fn subpositions(&self, trader_code: &str) -> Result<Vec<SubPosition>, FetchError> {
        self.get_public(SUBPOSITIONS_PATH, &[("instType", self.inst_type.as_str()), ("uniqueCode", trader_code)]).await
    }

    /// Walk the public ranking (by pnl, then by aum) until `limit` distinct
    /// traders are collected or a page adds nothing new. A failing page ends
    /// that sort order; the call only errors when nothing was collected.
    pub async fn lead_traders(&self, limit: usize) -> Result<Vec<LeadTrader>, FetchError> {
        let size = LEAD_TRADER_PAGE_SIZE.to_string();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut last_err = None;

        'sorts: for sort in LEAD_TRADER_SORTS {
            for page in 1..=LEAD_TRADER_MAX_PAGES {
                let page_no = page.to_string();
                let params = [("instType", self.inst_type.as_str()), ("sortType", sort), ("limit", size.as_str()), ("page", page_no.as_str())];
                match self.get_public::<LeadTraderPage>(LEAD_TRADERS_PATH, &params).await {
                    Ok(data) => {
                        let ranks = data.into_iter().next().map(|p| p.ranks).unwrap_or_default();
                        let added = merge_new_traders(&mut seen, ranks, &mut out);
                        if out.len() >= limit {
                            break 'sorts;
                        }
                        if added == 0 {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(sort, page, error = %e, "lead trader page failed");
                        last_err = Some(e);
                        break;
                    }
                }
            }
        }

        match last_err {
            Some(e) if out.is_empty() => Err(e),
            _ => {
                out.truncate(limit);
                Ok(out)
            }
        }
    }

    /// Signed GET on the account balance, only to prove the key set works.
    pub async fn check_credentials(&self) -> Result<(), FetchError> {
        let Some(cred) = &self.credentials else {
            return Err(FetchError::Api { code: "-1".into(), msg: "no credentials configured".into() });
        };
        let ts = timestamp_iso();
        let sig = sign_request(&cred.secret_key, &ts, "GET", BALANCE_PATH, "");
        let rsp = self
            .http
            .get(format!("{}{}", self.base_url, BALANCE_PATH))
            .header("OK-ACCESS-KEY", &cred.api_key)
            .header("OK-ACCESS-SIGN", sig)
            .header("OK-ACCESS-TIMESTAMP", ts)
            .header("OK-ACCESS-PASSPHRASE", &cred.passphrase)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        Self::decode::<serde_json::Value>(rsp).await.map(|_| ())
    }
}

#[async_trait]
impl PositionFetcher for OkxClient {
    async fn fetch_positions(&self, trader_code: &str) -> Result<Vec<RawPosition>, FetchError> {
        let rows = self.subpositions(trader_code).await?;
        debug!(trader = %trader_code, rows = rows.len(), "subpositions fetched");
        Ok(rows.into_iter().map(RawPosition::from).collect())
    }
}

#[async_trait]
impl TraderDirectory for OkxClient {
    async fn resolve_code(&self, input: &str) -> Option<String> {
        if let Some(link) = short_link(input) {
            match self.resolve_short_link(link).await {
                Ok(Some(code)) => return Some(code),
                Ok(None) => warn!(link, "share link did not lead to a trader profile"),
                Err(e) => warn!(link, error = %e, "share link resolution failed"),
            }
        }
        extract_unique_code(input)
    }

    async fn check_trader(&self, code: &str) -> Result<usize, FetchError> {
        Ok(self.subpositions(code).await?.len())
    }

    async fn lead_traders(&self, limit: usize) -> Result<Vec<LeadTrader>, FetchError> {
        OkxClient::lead_traders(self, limit).await
    }
}
