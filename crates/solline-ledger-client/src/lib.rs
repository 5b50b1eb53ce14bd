//! REST client for the solline backend ledger.
//!
//! The backend is the single source of truth for balances, invoices, and
//! the activity journal; this crate only moves bytes and decodes the
//! error envelope. Callers own caching and invalidation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LedgerApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("ledger api error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct LedgerErrorEnvelope {
    error: LedgerErrorBody,
}

#[derive(Debug, Deserialize)]
struct LedgerErrorBody {
    code: String,
    message: String,
}

/// Account activation state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub sol_balance: f64,
    pub usd_balance: f64,
    pub status: AccountStatus,
}

/// Invoice lifecycle states. `Paid`, `Cancelled`, and `Expired` are
/// terminal; the backend never resurrects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Paid,
    Cancelled,
    Expired,
}

impl InvoiceStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Expired)
    }

    /// Pending or processing: the invoice still blocks a new prepare.
    #[must_use]
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(alias = "invoice")]
    pub id: String,
    pub lamports: u64,
    pub to_address: String,
    #[serde(default)]
    pub memo: Option<String>,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Prepare response. The backend returns only the fields a payer needs;
/// the invoice row itself shows up in the next list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedInvoice {
    pub invoice: String,
    pub lamports: u64,
    pub to_address: String,
    #[serde(default)]
    pub memo: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePage {
    pub invoices: Vec<Invoice>,
    pub total: u64,
}

/// Some backend builds nest the single-invoice response under an
/// `invoice` key; both shapes must parse.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvoiceEnvelope {
    Nested { invoice: Invoice },
    Bare(Invoice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalKind {
    Deposit,
    Withdrawal,
    Call,
    Sms,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalMeta {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A backend-issued, append-only record of a balance-affecting event.
/// `lamports` is signed: deposits positive, usage debits negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub kind: JournalKind,
    pub lamports: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub meta: Option<JournalMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalPage {
    pub journal: Vec<JournalEntry>,
}

#[derive(Debug, Serialize)]
struct PrepareInvoiceRequest {
    lamports: u64,
}

#[derive(Debug, Serialize)]
struct CancelInvoiceRequest<'a> {
    invoice: &'a str,
}

#[derive(Debug, Serialize)]
struct CompleteInvoiceRequest<'a> {
    invoice: &'a str,
    signature: &'a str,
}

#[derive(Debug, Clone)]
pub struct LedgerApiClient {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
}

impl LedgerApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub async fn balance(&self) -> Result<BalanceResponse, LedgerApiError> {
        self.get_json("/v1/balance").await
    }

    pub async fn journal(&self, offset: u32, limit: u32) -> Result<JournalPage, LedgerApiError> {
        self.get_json(&format!("/v1/journal?offset={offset}&limit={limit}"))
            .await
    }

    pub async fn prepare_invoice(&self, lamports: u64) -> Result<PreparedInvoice, LedgerApiError> {
        self.post_json("/v1/invoices/prepare", &PrepareInvoiceRequest { lamports })
            .await
    }

    pub async fn cancel_invoice(&self, invoice: &str) -> Result<(), LedgerApiError> {
        self.post_ack("/v1/invoices/cancel", &CancelInvoiceRequest { invoice })
            .await
    }

    pub async fn list_invoices(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<InvoicePage, LedgerApiError> {
        self.get_json(&format!("/v1/invoices?offset={offset}&limit={limit}"))
            .await
    }

    pub async fn invoice(&self, id: &str) -> Result<Invoice, LedgerApiError> {
        let envelope: InvoiceEnvelope = self.get_json(&format!("/v1/invoices/{id}")).await?;
        Ok(match envelope {
            InvoiceEnvelope::Nested { invoice } | InvoiceEnvelope::Bare(invoice) => invoice,
        })
    }

    /// Report a submitted chain signature for an invoice. The response is
    /// an acknowledgement only; the backend verifies on-chain settlement
    /// asynchronously and the ack carries no final status.
    pub async fn complete_invoice(
        &self,
        invoice: &str,
        signature: &str,
    ) -> Result<(), LedgerApiError> {
        self.post_ack(
            "/v1/invoices/complete",
            &CompleteInvoiceRequest { invoice, signature },
        )
        .await
    }

    async fn get_json<TRes>(&self, path: &str) -> Result<TRes, LedgerApiError>
    where
        TRes: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = self.auth_token.as_ref() {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .map_err(|error| LedgerApiError::Transport(error.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<TReq, TRes>(&self, path: &str, body: &TReq) -> Result<TRes, LedgerApiError>
    where
        TReq: Serialize + ?Sized,
        TRes: for<'de> Deserialize<'de>,
    {
        let response = self.post_raw(path, body).await?;
        Self::decode(response).await
    }

    /// POST where a 2xx status is the whole answer; the body is dropped.
    async fn post_ack<TReq>(&self, path: &str, body: &TReq) -> Result<(), LedgerApiError>
    where
        TReq: Serialize + ?Sized,
    {
        let response = self.post_raw(path, body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::decode_error(status.as_u16(), response).await)
    }

    async fn post_raw<TReq>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<reqwest::Response, LedgerApiError>
    where
        TReq: Serialize + ?Sized,
    {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = self.auth_token.as_ref() {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        request
            .send()
            .await
            .map_err(|error| LedgerApiError::Transport(error.to_string()))
    }

    async fn decode<TRes>(response: reqwest::Response) -> Result<TRes, LedgerApiError>
    where
        TRes: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::decode_error(status.as_u16(), response).await);
        }
        response
            .json::<TRes>()
            .await
            .map_err(|error| LedgerApiError::Parse(error.to_string()))
    }

    async fn decode_error(status: u16, response: reqwest::Response) -> LedgerApiError {
        let body_bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return LedgerApiError::Transport(error.to_string()),
        };
        if let Ok(parsed) = serde_json::from_slice::<LedgerErrorEnvelope>(&body_bytes) {
            return LedgerApiError::Api {
                status,
                code: parsed.error.code,
                message: parsed.error.message,
            };
        }
        LedgerApiError::Api {
            status,
            code: "ledger_error".to_string(),
            message: String::from_utf8_lossy(body_bytes.as_ref()).to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
