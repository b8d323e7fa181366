// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for webhook ingestion.

use thiserror::Error;

/// Errors raised while ingesting a courier webhook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WebhookError {
    /// The carrier code is not one of the supported couriers.
    #[error("Unsupported carrier: {0}")]
    UnknownCarrier(String),

    /// The signature header does not match the payload.
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    /// The payload is not valid JSON for the carrier dialect.
    #[error("Unparseable payload: {0}")]
    PayloadUnparseable(#[from] serde_json::Error),

    /// None of the tracking number fields carried a value.
    #[error("Missing tracking number")]
    MissingTrackingNumber,

    /// The normalizer failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Stable error code for response bodies and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownCarrier(_) => "UNKNOWN_CARRIER",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::PayloadUnparseable(_) => "PAYLOAD_UNPARSEABLE",
            Self::MissingTrackingNumber => "MISSING_TRACKING_NUMBER",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownCarrier(_) => 404,
            Self::SignatureInvalid => 401,
            Self::PayloadUnparseable(_) | Self::MissingTrackingNumber => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Whether the failure was caused by the request rather than by us.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

/// Result type using [`WebhookError`].
pub type Result<T> = std::result::Result<T, WebhookError>;
