use crate::{
    entities::order::PaymentMethod,
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use utoipa::ToSchema;

static UPI_VPA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*@[A-Za-z]{2,}$").expect("valid regex"));

/// Method-specific payment payload.
///
/// Modeled as a tagged union so the processor set is covered at compile time
/// instead of being an untyped blob.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInstrument {
    Cod,
    Card {
        number: String,
        expiry_month: u32,
        expiry_year: i32,
        cvv: String,
    },
    Upi {
        vpa: String,
    },
    NetBanking {
        bank_code: String,
    },
    Wallet {
        provider: String,
        phone: Option<String>,
    },
}

impl PaymentInstrument {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Cod => PaymentMethod::Cod,
            Self::Card { .. } => PaymentMethod::Card,
            Self::Upi { .. } => PaymentMethod::Upi,
            Self::NetBanking { .. } => PaymentMethod::NetBanking,
            Self::Wallet { .. } => PaymentMethod::Wallet,
        }
    }
}

/// Typed gateway metadata recorded with every payment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "gateway", rename_all = "snake_case")]
pub enum GatewayResponse {
    Cod {
        note: String,
    },
    Card {
        last4: String,
        auth_code: String,
    },
    Upi {
        vpa: String,
        rrn: String,
    },
    NetBanking {
        bank_code: String,
        reference: String,
    },
    Wallet {
        provider: String,
        reference: String,
    },
}

/// Result of a gateway charge attempt that reached the processor
#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    Approved {
        transaction_id: String,
        response: GatewayResponse,
    },
    Declined {
        reason: String,
        response: GatewayResponse,
    },
}

/// Pluggable payment processor boundary.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        instrument: &PaymentInstrument,
        amount: Decimal,
    ) -> Result<ChargeOutcome, ServiceError>;
}

/// Simulated gateway: validates nothing itself (payload shape is checked
/// before dispatch), sleeps to mimic processing latency, then resolves the
/// outcome from a configured approval probability.
pub struct SimulatedGateway {
    success_rate: f64,
    processing_delay: Duration,
}

impl SimulatedGateway {
    pub fn new(success_rate: f64, processing_delay: Duration) -> Self {
        Self {
            success_rate,
            processing_delay,
        }
    }

    fn roll(&self) -> bool {
        if self.success_rate >= 1.0 {
            return true;
        }
        if self.success_rate <= 0.0 {
            return false;
        }
        thread_rng().gen_bool(self.success_rate)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[instrument(skip(self, instrument))]
    async fn charge(
        &self,
        instrument: &PaymentInstrument,
        amount: Decimal,
    ) -> Result<ChargeOutcome, ServiceError> {
        tokio::time::sleep(self.processing_delay).await;

        let response = synthesize_response(instrument);
        if self.roll() {
            let transaction_id = new_transaction_id();
            info!(transaction_id = %transaction_id, %amount, "Gateway approved charge");
            Ok(ChargeOutcome::Approved {
                transaction_id,
                response,
            })
        } else {
            info!(%amount, "Gateway declined charge");
            Ok(ChargeOutcome::Declined {
                reason: "declined by issuer".to_string(),
                response,
            })
        }
    }
}

/// Validates an instrument's payload shape against `now`.
///
/// Rejections here happen before any gateway call or database write.
pub fn validate_instrument(
    instrument: &PaymentInstrument,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    match instrument {
        PaymentInstrument::Cod => Ok(()),
        PaymentInstrument::Card {
            number,
            expiry_month,
            expiry_year,
            cvv,
        } => {
            if number.len() != 16 || !number.chars().all(|c| c.is_ascii_digit()) {
                return Err(ServiceError::PaymentValidationFailed(
                    "card number must be 16 digits".to_string(),
                ));
            }
            if !(1..=12).contains(expiry_month) {
                return Err(ServiceError::PaymentValidationFailed(
                    "card expiry month must be between 1 and 12".to_string(),
                ));
            }
            let expired = *expiry_year < now.year()
                || (*expiry_year == now.year() && *expiry_month < now.month());
            if expired {
                return Err(ServiceError::PaymentValidationFailed(
                    "card has expired".to_string(),
                ));
            }
            if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
                return Err(ServiceError::PaymentValidationFailed(
                    "cvv must be 3 or 4 digits".to_string(),
                ));
            }
            Ok(())
        }
        PaymentInstrument::Upi { vpa } => {
            if !UPI_VPA.is_match(vpa) {
                return Err(ServiceError::PaymentValidationFailed(
                    "upi id must look like user@handle".to_string(),
                ));
            }
            Ok(())
        }
        PaymentInstrument::NetBanking { bank_code } => {
            if bank_code.trim().is_empty() {
                return Err(ServiceError::PaymentValidationFailed(
                    "bank code is required".to_string(),
                ));
            }
            Ok(())
        }
        PaymentInstrument::Wallet { provider, .. } => {
            if provider.trim().is_empty() {
                return Err(ServiceError::PaymentValidationFailed(
                    "wallet provider is required".to_string(),
                ));
            }
            Ok(())
        }
    }
}

/// Builds the typed gateway metadata for an instrument.
fn synthesize_response(instrument: &PaymentInstrument) -> GatewayResponse {
    match instrument {
        PaymentInstrument::Cod => GatewayResponse::Cod {
            note: "collect on delivery".to_string(),
        },
        PaymentInstrument::Card { number, .. } => GatewayResponse::Card {
            last4: number.chars().rev().take(4).collect::<Vec<_>>().iter().rev().collect(),
            auth_code: random_token(6),
        },
        PaymentInstrument::Upi { vpa } => GatewayResponse::Upi {
            vpa: vpa.clone(),
            rrn: random_token(12),
        },
        PaymentInstrument::NetBanking { bank_code } => GatewayResponse::NetBanking {
            bank_code: bank_code.clone(),
            reference: random_token(10),
        },
        PaymentInstrument::Wallet { provider, .. } => GatewayResponse::Wallet {
            provider: provider.clone(),
            reference: random_token(10),
        },
    }
}

/// Synthesizes a COD approval without touching any gateway.
pub fn cod_outcome() -> ChargeOutcome {
    ChargeOutcome::Approved {
        transaction_id: new_transaction_id(),
        response: GatewayResponse::Cod {
            note: "collect on delivery".to_string(),
        },
    }
}

pub fn new_transaction_id() -> String {
    format!("TXN-{}", random_token(16))
}

fn random_token(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}
